//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Zi.
//! The Zi project belongs to the Dunimd Team.
//!
//! Licensed under the Apache License, Version 2.0 (the "License");
//! You may not use this file except in compliance with the License.
//! You may obtain a copy of the License at
//!
//!     http://www.apache.org/licenses/LICENSE-2.0
//!
//! Unless required by applicable law or agreed to in writing, software
//! distributed under the License is distributed on an "AS IS" BASIS,
//! WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//! See the License for the specific language governing permissions and
//! limitations under the License.

use std::io::Write;

use serde_json::json;
use zidef::{
    ZiCueGenerator, ZiDSLCompiler, ZiDSLParser, ZiError, ZiFieldTree, ZiInterpreter, ZiParamContext, ZiRenderer,
};

const SERVICE_PROGRAM: &str = r#"
helpers:
  - name: exposed
    value:
      kind: collection
      source: {kind: param, name: ports}
      ops:
        - op: filter
          condition:
            kind: compare
            subject: {kind: item_field, field: expose}
            op: "=="
            operand: true
        - op: map
          fields:
            port: port
            targetPort: port
            name: name
outputs:
  - kind: set
    path: metadata.name
    value: {kind: context, field: name}
  - kind: set
    path: spec.ports
    value: {kind: helper, name: exposed}
  - kind: set_if
    path: spec.replicas
    value: {kind: param, name: replicas, default: 1}
    guard:
      kind: not
      condition: {kind: truthy, value: {kind: param, name: autoscale}}
"#;

#[test]
fn ZiFTLoaderYamlFileRendersOnBothBackends() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(SERVICE_PROGRAM.as_bytes()).unwrap();

    let parsed = ZiDSLParser::new().parse_file(file.path()).unwrap();
    assert!(parsed.warnings.is_empty());
    let definition = ZiDSLCompiler::new().strict(true).compile(&parsed.program).unwrap();
    assert_eq!(definition.helpers().len(), 1);
    assert_eq!(definition.outputs().len(), 3);

    let ctx = ZiParamContext::from_params(json!({
        "ports": [
            {"port": 80, "name": "http", "expose": true},
            {"port": 9090, "name": "metrics", "expose": false}
        ]
    }))
    .unwrap()
    .with_name("frontend");
    let interpreter = ZiInterpreter::new(&ctx).with_helpers(definition.helpers());
    let result = ZiRenderer::new(&interpreter).render(definition.outputs()).unwrap();
    assert_eq!(
        result.into_value(),
        json!({
            "metadata": {"name": "frontend"},
            "spec": {
                "ports": [{"port": 80, "targetPort": 80, "name": "http"}],
                "replicas": 1
            }
        })
    );

    let tree = ZiFieldTree::build(definition.outputs()).unwrap();
    let text = ZiCueGenerator::new()
        .with_helpers(definition.helpers())
        .generate_template("output", &tree)
        .unwrap();
    assert_eq!(
        text,
        "exposed: [\n\
         \tfor v in parameter.ports if v.expose == true {\n\
         \t\tport: v.port\n\
         \t\ttargetPort: v.port\n\
         \t\tname: v.name\n\
         \t},\n\
         ]\n\
         output: {\n\
         \tmetadata: name: context.name\n\
         \tspec: {\n\
         \t\tports: exposed\n\
         \t\tif !(parameter.autoscale) {\n\
         \t\t\treplicas: parameter.replicas\n\
         \t\t}\n\
         \t}\n\
         }\n"
    );
}

#[test]
fn ZiFTLoaderJsonOutputList() {
    let source = r#"[
        {"kind": "set", "path": "spec.image", "value": {"kind": "concat", "name": "image", "suffix": ":latest"}},
        {"kind": "for_each", "path": "metadata.labels", "source": {"kind": "param", "name": "labels"}}
    ]"#;
    let parsed = ZiDSLParser::new().parse(source).unwrap();
    let definition = ZiDSLCompiler::new().compile(&parsed.program).unwrap();

    let ctx = ZiParamContext::from_params(json!({"image": "nginx", "labels": {"tier": "web"}})).unwrap();
    let interpreter = ZiInterpreter::new(&ctx);
    let result = ZiRenderer::new(&interpreter).render(definition.outputs()).unwrap();
    assert_eq!(result.get("spec.image"), Some(&json!("nginx:latest")));
    assert_eq!(result.get("metadata.labels.tier"), Some(&json!("web")));
}

#[test]
fn ZiFTLoaderRejectsUnknownKinds() {
    let parsed = ZiDSLParser::new()
        .parse(r#"{"outputs": [{"kind": "set", "path": "a", "value": {"kind": "call", "function": "strings.Reverse", "args": []}}]}"#)
        .unwrap();
    assert!(matches!(
        ZiDSLCompiler::new().compile(&parsed.program),
        Err(ZiError::Unsupported { .. })
    ));
}

#[test]
fn ZiFTLoaderStrictModes() {
    let source = r#"{"outputs": [], "version": 2}"#;
    assert_eq!(ZiDSLParser::new().parse(source).unwrap().warnings.len(), 1);
    assert!(matches!(
        ZiDSLParser::new().strict(true).parse(source),
        Err(ZiError::Validation { .. })
    ));

    let program = ZiDSLParser::new()
        .parse(
            r#"{"outputs": [{"kind": "set", "path": "spec.volumes", "value": {
                "kind": "multi_source",
                "parent": {"kind": "param", "name": "volumes"},
                "sources": ["pvc"],
                "map_by_source": {"secret": {"name": "name"}}
            }}]}"#,
        )
        .unwrap()
        .program;
    assert!(ZiDSLCompiler::new().compile(&program).is_ok());
    assert!(matches!(
        ZiDSLCompiler::new().strict(true).compile(&program),
        Err(ZiError::Validation { .. })
    ));
}
