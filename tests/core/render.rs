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

use proptest::prelude::*;
use serde_json::json;
use zidef::{
    ZiCueGenerator, ZiError, ZiFieldNode, ZiFieldTree, ZiInterpreter, ZiOutputOp, ZiParamContext, ZiParamRef,
    ZiRenderer, ZiValue,
};

fn workload_ops() -> Vec<ZiOutputOp> {
    let labels = ZiParamRef::new("labels");
    vec![
        ZiOutputOp::set("kind", ZiValue::lit(json!("Deployment"))),
        ZiOutputOp::SpreadIf {
            path: "metadata.labels".into(),
            value: labels.value(),
            guard: Some(labels.is_set()),
        },
        ZiOutputOp::ForEach {
            path: "metadata.annotations".into(),
            source: ZiParamRef::new("annotations").value(),
            guard: None,
        },
        ZiOutputOp::PatchKey {
            path: "spec.volumes".into(),
            key: "name".into(),
            elements: vec![ZiValue::structure().with_field("name", ZiValue::lit(json!("data")), None)],
            guard: None,
        },
        ZiOutputOp::if_block(
            ZiParamRef::new("enabled").truthy(),
            vec![
                ZiOutputOp::set("spec.replicas", ZiParamRef::new("replicas").value()),
                ZiOutputOp::if_block(
                    ZiParamRef::new("paused").truthy(),
                    vec![ZiOutputOp::set("spec.paused", ZiValue::lit(json!(true)))],
                ),
            ],
        ),
    ]
}

#[test]
fn ZiFTRenderAppliesEveryOperationKind() {
    let ctx = ZiParamContext::from_params(json!({
        "labels": {"team": "core"},
        "annotations": {"owner": "ops"},
        "enabled": true,
        "paused": false,
        "replicas": 3
    }))
    .unwrap();
    let interpreter = ZiInterpreter::new(&ctx);
    let result = ZiRenderer::new(&interpreter).render(&workload_ops()).unwrap();

    assert_eq!(
        result.data(),
        &json!({
            "kind": "Deployment",
            "metadata": {
                "labels": {"team": "core"},
                "annotations": {"owner": "ops"}
            },
            "spec": {
                "volumes": [{"name": "data"}],
                "replicas": 3
            }
        })
    );
    assert_eq!(result.get("spec.volumes[0].name"), Some(&json!("data")));
    assert_eq!(result.get("spec.paused"), None);
}

#[test]
fn ZiFTRenderSkipsUnsetSourcesAndFalseGuards() {
    let ctx = ZiParamContext::new();
    let interpreter = ZiInterpreter::new(&ctx);
    let result = ZiRenderer::new(&interpreter).render(&workload_ops()).unwrap();
    assert_eq!(
        result.into_value(),
        json!({"kind": "Deployment", "spec": {"volumes": [{"name": "data"}]}})
    );
}

#[test]
fn ZiFTRenderForEachNeedsARecordSource() {
    let ctx = ZiParamContext::from_params(json!({"annotations": ["a"]})).unwrap();
    let interpreter = ZiInterpreter::new(&ctx);
    let ops = vec![ZiOutputOp::ForEach {
        path: "metadata.annotations".into(),
        source: ZiParamRef::new("annotations").value(),
        guard: None,
    }];
    assert!(matches!(
        ZiRenderer::new(&interpreter).render(&ops),
        Err(ZiError::Schema { .. })
    ));
}

fn mode_ops() -> Vec<ZiOutputOp> {
    vec![
        ZiOutputOp::set_if("spec.mode", ZiValue::lit(json!("first")), ZiParamRef::new("a").truthy()),
        ZiOutputOp::set_if("spec.mode", ZiValue::lit(json!("second")), ZiParamRef::new("b").truthy()),
    ]
}

#[test]
fn ZiFTRenderLaterGuardWinsOnBothBackends() {
    let ops = mode_ops();

    let ctx = ZiParamContext::from_params(json!({"a": true, "b": true})).unwrap();
    let interpreter = ZiInterpreter::new(&ctx);
    let result = ZiRenderer::new(&interpreter).render(&ops).unwrap();
    assert_eq!(result.get("spec.mode"), Some(&json!("second")));

    let tree = ZiFieldTree::build(&ops).unwrap();
    let text = ZiCueGenerator::new().generate_tree(&tree).unwrap();
    assert_eq!(
        text,
        "if (parameter.a) && (!(parameter.b)) {\n\tspec: mode: \"first\"\n}\nif parameter.b {\n\tspec: mode: \"second\"\n}\n"
    );
}

#[test]
fn ZiFTRenderGeneratedGuardsAgreeWithRenderer() {
    let ops = mode_ops();
    let tree = ZiFieldTree::build(&ops).unwrap();
    let writes = tree.node("spec.mode").unwrap().last_writes();

    for (a, b) in [(false, false), (true, false), (false, true), (true, true)] {
        let ctx = ZiParamContext::from_params(json!({"a": a, "b": b})).unwrap();
        let interpreter = ZiInterpreter::new(&ctx);
        let rendered = ZiRenderer::new(&interpreter).render(&ops).unwrap();

        let mut holding = Vec::new();
        for write in &writes {
            let holds = match &write.guard {
                Some(guard) => interpreter.condition(guard).unwrap(),
                None => true,
            };
            if holds {
                holding.push(interpreter.evaluate(write.value).unwrap());
            }
        }
        assert!(holding.len() <= 1, "a={a} b={b}: {holding:?}");
        assert_eq!(holding.pop().flatten().as_ref(), rendered.get("spec.mode"), "a={a} b={b}");
    }
}

#[test]
fn ZiFTRenderGuardedOverrideOfUnguardedBase() {
    let ops = vec![
        ZiOutputOp::set("spec.mode", ZiValue::lit(json!("base"))),
        ZiOutputOp::set_if("spec.mode", ZiValue::lit(json!("override")), ZiParamRef::new("b").truthy()),
    ];

    for (b, expected) in [(false, "base"), (true, "override")] {
        let ctx = ZiParamContext::from_params(json!({"b": b})).unwrap();
        let interpreter = ZiInterpreter::new(&ctx);
        let result = ZiRenderer::new(&interpreter).render(&ops).unwrap();
        assert_eq!(result.get("spec.mode"), Some(&json!(expected)));
    }

    let tree = ZiFieldTree::build(&ops).unwrap();
    let text = ZiCueGenerator::new().generate_tree(&tree).unwrap();
    assert_eq!(
        text,
        "if !(parameter.b) {\n\tspec: mode: \"base\"\n}\nif parameter.b {\n\tspec: mode: \"override\"\n}\n"
    );
}

#[test]
fn ZiFTRenderUnguardedWriteShadowsEarlierGuards() {
    let ops = vec![
        ZiOutputOp::set_if("spec.mode", ZiValue::lit(json!("first")), ZiParamRef::new("a").truthy()),
        ZiOutputOp::set("spec.mode", ZiValue::lit(json!("fixed"))),
    ];
    let tree = ZiFieldTree::build(&ops).unwrap();
    let text = ZiCueGenerator::new().generate_tree(&tree).unwrap();
    assert_eq!(text, "spec: mode: \"fixed\"\n");
}

#[test]
fn ZiFTRenderEmptyPathSpreadsIntoTheRoot() {
    let ops = vec![
        ZiOutputOp::set("kind", ZiValue::lit(json!("Service"))),
        ZiOutputOp::SpreadIf {
            path: String::new(),
            value: ZiParamRef::new("extra").value(),
            guard: None,
        },
    ];

    let ctx = ZiParamContext::from_params(json!({"extra": {"apiVersion": "v1"}})).unwrap();
    let interpreter = ZiInterpreter::new(&ctx);
    let result = ZiRenderer::new(&interpreter).render(&ops).unwrap();
    assert_eq!(result.into_value(), json!({"kind": "Service", "apiVersion": "v1"}));

    let tree = ZiFieldTree::build(&ops).unwrap();
    let text = ZiCueGenerator::new().generate_tree(&tree).unwrap();
    assert_eq!(text, "parameter.extra\nkind: \"Service\"\n");
}

const PATHS: &[&str] = &[
    "metadata.name",
    "metadata.labels[app.oam.dev/name]",
    "spec.replicas",
    "spec.template.spec.containers[0].image",
    "spec.template.spec.containers[1].name",
    "spec.selector.matchLabels.app",
];

fn shape(node: &ZiFieldNode) -> String {
    let mut children = node
        .children()
        .iter()
        .map(|(key, child)| format!("{key:?}{}", shape(child)))
        .collect::<Vec<_>>();
    children.sort();
    format!("({} {} [{}])", node.is_array(), node.values().len(), children.join(","))
}

fn tree_of(paths: &[&str]) -> ZiFieldTree {
    let mut tree = ZiFieldTree::new();
    for (index, path) in paths.iter().enumerate() {
        tree.insert(path, ZiValue::lit(json!(index)), None).unwrap();
    }
    tree
}

proptest! {
    #[test]
    fn ZiFTTreeShapeIgnoresInsertionOrder(order in Just(PATHS.to_vec()).prop_shuffle()) {
        let expected = shape(tree_of(PATHS).root());
        prop_assert_eq!(shape(tree_of(&order).root()), expected);
    }
}
