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

use serde_json::json;
use zidef::{
    ZiCollection, ZiCondition, ZiCueGenerator, ZiFieldMap, ZiFieldTree, ZiFieldValue, ZiInterpreter,
    ZiMultiSource, ZiOutputOp, ZiParamContext, ZiParamRef, ZiRenderer,
};

fn exposed_ports() -> ZiCollection {
    ZiCollection::from(ZiParamRef::new("ports").value())
        .filter(ZiCondition::field_equals("expose", json!(true)))
        .map(ZiFieldMap::new()
            .field("port", ZiFieldValue::field("port"))
            .field("targetPort", ZiFieldValue::field("port"))
            .field("name", ZiFieldValue::field("name")))
}

fn merged_volumes() -> ZiMultiSource {
    ZiMultiSource::from_fields(ZiParamRef::new("volumes").value(), ["pvc", "configMap"])
        .map_source("pvc", ZiFieldMap::new().field("name", ZiFieldValue::field("name")))
        .map_source("configMap", ZiFieldMap::new().field("name", ZiFieldValue::field("name")))
        .dedupe("name")
}

#[test]
fn ZiFTScenarioExposedPorts() {
    let ctx = ZiParamContext::from_params(json!({
        "ports": [
            {"port": 80, "name": "http", "expose": true},
            {"port": 443, "name": "https", "expose": false},
            {"port": 8080, "name": "admin", "expose": true}
        ]
    }))
    .unwrap();
    let interpreter = ZiInterpreter::new(&ctx);
    assert_eq!(
        exposed_ports().collect(&interpreter).unwrap(),
        vec![
            json!({"port": 80, "targetPort": 80, "name": "http"}),
            json!({"port": 8080, "targetPort": 8080, "name": "admin"}),
        ]
    );

    let generator = ZiCueGenerator::new();
    assert_eq!(
        generator.generate_collection(&exposed_ports()).unwrap(),
        "[\n\tfor v in parameter.ports if v.expose == true {\n\t\tport: v.port\n\t\ttargetPort: v.port\n\t\tname: v.name\n\t},\n]"
    );

    let ops = vec![ZiOutputOp::set("spec.ports", exposed_ports().into())];
    let block = generator
        .generate_block("output", &ZiFieldTree::build(&ops).unwrap())
        .unwrap();
    assert_eq!(
        block,
        "output: {\n\tspec: ports: [\n\t\tfor v in parameter.ports if v.expose == true {\n\t\t\tport: v.port\n\t\t\ttargetPort: v.port\n\t\t\tname: v.name\n\t\t},\n\t]\n}\n"
    );
}

#[test]
fn ZiFTScenarioMergedVolumesDedupe() {
    let ctx = ZiParamContext::from_params(json!({
        "volumes": {
            "pvc": [{"name": "shared"}, {"name": "data"}],
            "configMap": [{"name": "shared"}, {"name": "config"}]
        }
    }))
    .unwrap();
    let interpreter = ZiInterpreter::new(&ctx);
    let ops = vec![ZiOutputOp::set("spec.volumes", merged_volumes().into())];
    let result = ZiRenderer::new(&interpreter).render(&ops).unwrap();
    assert_eq!(
        result.get("spec.volumes"),
        Some(&json!([{"name": "shared"}, {"name": "data"}, {"name": "config"}]))
    );

    let text = ZiCueGenerator::new().generate_multi_source(&merged_volumes()).unwrap();
    assert!(text.contains("if parameter.volumes != _|_ && parameter.volumes.pvc != _|_ for v in parameter.volumes.pvc {"));
    assert!(text.contains("for v in parameter.volumes.configMap {"));
    assert!(text.contains("if j < i if vi.name != _|_ if vj.name != _|_ if vi.name == vj.name {"));
    assert!(text.contains("if j < i if vi.name == _|_ if vj.name == _|_ {"));
    assert!(text.contains("] if val._ignore == _|_ {"));
    let pvc = text.find("volumes.pvc {").unwrap();
    let config = text.find("volumes.configMap {").unwrap();
    assert!(pvc < config);
}

#[test]
fn ZiFTScenarioDefaultFieldReplacesEmptyName() {
    let ports = ZiCollection::from(ZiParamRef::new("ports").value())
        .default_field("name", ZiFieldValue::literal(json!("default-port")));

    let ctx = ZiParamContext::from_params(json!({"ports": [{"port": 8080, "name": ""}]})).unwrap();
    let interpreter = ZiInterpreter::new(&ctx);
    assert_eq!(
        ports.collect(&interpreter).unwrap(),
        vec![json!({"port": 8080, "name": "default-port"})]
    );

    assert_eq!(
        ZiCueGenerator::new().generate_collection(&ports).unwrap(),
        "[\n\tfor v in parameter.ports {\n\t\tfor k, x in v if k != \"name\" { (k): x }\n\t\tname: [if v.name != _|_ if v.name != null if v.name != \"\" { v.name }, \"default-port\"][0]\n\t},\n]"
    );
}
