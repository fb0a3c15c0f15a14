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
    ZiCollection, ZiCondition, ZiContextField, ZiCueGenerator, ZiError, ZiFieldMap, ZiFieldTree, ZiFieldValue,
    ZiFunction, ZiGeneratorConfig, ZiHelperRegistry, ZiOutputOp, ZiParamRef, ZiStringPredicate, ZiValue,
};

fn ports() -> ZiCollection {
    ZiCollection::from(ZiParamRef::new("ports").value())
}

#[test]
fn ZiFTCueGenComprehensionForms() {
    let generator = ZiCueGenerator::new();

    assert_eq!(
        generator.generate_collection(&ports()).unwrap(),
        "[for v in parameter.ports { v }]"
    );
    assert_eq!(
        generator.generate_collection(&ports().wrap("port")).unwrap(),
        "[for v in parameter.ports { port: v }]"
    );
    assert_eq!(
        generator.generate_collection(&ports().pick(["name"])).unwrap(),
        "[\n\tfor v in parameter.ports {\n\t\tif v.name != _|_ { name: v.name }\n\t},\n]"
    );
    assert_eq!(
        generator
            .generate_collection(&ports().rename("port", "containerPort"))
            .unwrap(),
        "[\n\tfor v in parameter.ports {\n\
         \t\tfor k, x in v if k != \"port\" && k != \"containerPort\" { (k): x }\n\
         \t\tif v.port != _|_ { containerPort: v.port }\n\
         \t\tif v.port == _|_ if v.containerPort != _|_ { containerPort: v.containerPort }\n\
         \t},\n]"
    );
}

#[test]
fn ZiFTCueGenGuardsAndFlatten() {
    let generator = ZiCueGenerator::new();
    let enabled = ZiParamRef::new("enabled").truthy();

    let guarded = ports()
        .filter(ZiCondition::field_equals("expose", json!(true)))
        .guard(enabled.clone());
    assert_eq!(
        generator.generate_collection(&guarded).unwrap(),
        "[if parameter.enabled for v in parameter.ports if v.expose == true { v }]"
    );

    let groups = ZiCollection::from(ZiParamRef::new("groups").value()).flatten();
    assert_eq!(
        generator.generate_collection(&groups).unwrap(),
        "list.FlattenN(parameter.groups, 1)"
    );
    assert_eq!(
        generator.generate_collection(&groups.guard(enabled)).unwrap(),
        "[if parameter.enabled for v in list.FlattenN(parameter.groups, 1) { v }]"
    );
}

#[test]
fn ZiFTCueGenDedupeLayout() {
    let tags = ZiCollection::from(ZiParamRef::new("tags").value()).dedupe("name");
    assert_eq!(
        ZiCueGenerator::new().generate_collection(&tags).unwrap(),
        "[\n\
         \tfor val in [\n\
         \t\tfor i, vi in parameter.tags {\n\
         \t\t\tfor j, vj in parameter.tags if j < i if vi.name != _|_ if vj.name != _|_ if vi.name == vj.name {\n\
         \t\t\t\t_ignore: true\n\
         \t\t\t}\n\
         \t\t\tfor j, vj in parameter.tags if j < i if vi.name == _|_ if vj.name == _|_ {\n\
         \t\t\t\t_ignore: true\n\
         \t\t\t}\n\
         \t\t\tvi\n\
         \t\t},\n\
         \t] if val._ignore == _|_ {\n\
         \t\tval\n\
         \t},\n\
         ]"
    );
}

#[test]
fn ZiFTCueGenDefaultsCheckKindBeforeEmptyString() {
    let generator = ZiCueGenerator::new();

    let numeric = ports().default_field("port", ZiFieldValue::literal(json!(80)));
    assert_eq!(
        generator.generate_collection(&numeric).unwrap(),
        "[\n\tfor v in parameter.ports {\n\
         \t\tfor k, x in v if k != \"port\" { (k): x }\n\
         \t\tport: [if v.port != _|_ if v.port != null if (v.port & string) == _|_ { v.port }, \
         if (v.port & string) != _|_ if v.port != \"\" { v.port }, 80][0]\n\
         \t},\n]"
    );

    let named = ports().map(ZiFieldMap::new().field(
        "name",
        ZiFieldValue::field("name").or(ZiFieldValue::literal(json!("default"))),
    ));
    assert_eq!(
        generator.generate_collection(&named).unwrap(),
        "[\n\tfor v in parameter.ports {\n\
         \t\tname: [if v.name != _|_ if v.name != null if v.name != \"\" { v.name }, \"default\"][0]\n\
         \t},\n]"
    );
}

#[test]
fn ZiFTCueGenTreeLayout() {
    let labels = ZiParamRef::new("labels");
    let ops = vec![
        ZiOutputOp::set("metadata.name", ZiValue::Context(ZiContextField::Name)),
        ZiOutputOp::SpreadIf {
            path: "metadata.labels".into(),
            value: labels.value(),
            guard: Some(labels.is_set()),
        },
        ZiOutputOp::set("metadata.labels[app.oam.dev/component]", ZiValue::lit(json!("web"))),
        ZiOutputOp::set("spec.containers[0].image", ZiParamRef::new("image").value()),
        ZiOutputOp::set("spec.containers[0].name", ZiValue::Context(ZiContextField::Name)),
        ZiOutputOp::PatchKey {
            path: "spec.volumes".into(),
            key: "name".into(),
            elements: vec![ZiValue::lit(json!({"name": "data"}))],
            guard: None,
        },
        ZiOutputOp::set(
            "spec.selector.matchLabels[app.oam.dev/component]",
            ZiValue::Context(ZiContextField::Name),
        ),
    ];
    let tree = ZiFieldTree::build(&ops).unwrap();
    let text = ZiCueGenerator::new().generate_block("output", &tree).unwrap();

    let expected = "output: {\n\
         \tmetadata: {\n\
         \t\tname: context.name\n\
         \t\tlabels: {\n\
         \t\t\tif parameter.labels != _|_ {\n\
         \t\t\t\tparameter.labels\n\
         \t\t\t}\n\
         \t\t\t\"app.oam.dev/component\": \"web\"\n\
         \t\t}\n\
         \t}\n\
         \tspec: {\n\
         \t\tcontainers: [\n\
         \t\t\t{\n\
         \t\t\t\timage: parameter.image\n\
         \t\t\t\tname: context.name\n\
         \t\t\t},\n\
         \t\t]\n\
         \t\t// +patchKey=name\n\
         \t\tvolumes: [{\"name\":\"data\"}]\n\
         \t\tselector: matchLabels: \"app.oam.dev/component\": context.name\n\
         \t}\n\
         }\n";
    assert_eq!(text, expected);
}

#[test]
fn ZiFTCueGenListGapsAndMixedKeys() {
    let ops = vec![ZiOutputOp::set("args[2]", ZiValue::lit(json!("--verbose")))];
    let text = ZiCueGenerator::new()
        .generate_tree(&ZiFieldTree::build(&ops).unwrap())
        .unwrap();
    assert_eq!(text, "args: [\n\t{},\n\t{},\n\t\"--verbose\",\n]\n");

    let mixed = vec![
        ZiOutputOp::set("args[0]", ZiValue::lit(json!("a"))),
        ZiOutputOp::set("args.first", ZiValue::lit(json!("b"))),
    ];
    let tree = ZiFieldTree::build(&mixed).unwrap();
    assert!(matches!(
        ZiCueGenerator::new().generate_tree(&tree),
        Err(ZiError::Validation { .. })
    ));
}

#[test]
fn ZiFTCueGenCollectsImports() {
    let name = ZiParamRef::new("name");
    let ops = vec![
        ZiOutputOp::set("metadata.name", ZiValue::call(ZiFunction::ToLower, vec![name.value()])),
        ZiOutputOp::set(
            "spec.members",
            ZiCollection::from(ZiParamRef::new("groups").value()).flatten().into(),
        ),
        ZiOutputOp::set_if(
            "spec.tier",
            ZiValue::lit(json!("web")),
            ZiCondition::string(name.value(), ZiStringPredicate::HasPrefix("web".into())),
        ),
    ];
    let tree = ZiFieldTree::build(&ops).unwrap();
    let generator = ZiCueGenerator::new();
    assert_eq!(generator.required_imports(&tree), vec!["list", "strings"]);

    let template = generator.generate_template("output", &tree).unwrap();
    assert!(template.starts_with("import (\n\t\"list\"\n\t\"strings\"\n)\n\noutput: {\n"));

    let quiet = ZiCueGenerator::new().with_config(ZiGeneratorConfig::default().emit_imports(false));
    assert!(quiet.generate_template("output", &tree).unwrap().starts_with("output: {\n"));
}

#[test]
fn ZiFTCueGenPlacesHelpersAroundTheOutput() {
    let mut helpers = ZiHelperRegistry::new();
    let exposed = helpers.define("ports", ports()).unwrap();
    helpers
        .define_after_output("later", ZiCollection::from(exposed.value()))
        .unwrap();

    let ops = vec![ZiOutputOp::set("spec.ports", exposed.value())];
    let tree = ZiFieldTree::build(&ops).unwrap();
    let text = ZiCueGenerator::new()
        .with_helpers(&helpers)
        .generate_template("output", &tree)
        .unwrap();
    assert_eq!(
        text,
        "ports: [for v in parameter.ports { v }]\noutput: {\n\tspec: ports: ports\n}\nlater: [for v in ports { v }]\n"
    );
}

#[test]
fn ZiFTCueGenRejectsUnusableHelpers() {
    let mut helpers = ZiHelperRegistry::new();
    let reference = helpers.define("exposed-ports", ports()).unwrap();
    let generator = ZiCueGenerator::new().with_helpers(&helpers);
    assert!(matches!(generator.generate_helpers(false), Err(ZiError::Validation { .. })));

    let unbound = ZiCueGenerator::new();
    assert!(matches!(
        unbound.generate_value(&reference.value()),
        Err(ZiError::Pipeline { .. })
    ));
}

#[test]
fn ZiFTCueGenCustomItemVariable() {
    let generator = ZiCueGenerator::new().with_config(ZiGeneratorConfig::default().item_var("p").indent("  "));
    let collection = ports().pick(["name"]);
    assert_eq!(
        generator.generate_collection(&collection).unwrap(),
        "[\n  for p in parameter.ports {\n    if p.name != _|_ { name: p.name }\n  },\n]"
    );
}
