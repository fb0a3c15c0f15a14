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

use std::collections::BTreeSet;

use serde_json::json;
use zidef::{
    ZiArithOp, ZiCollection, ZiCollectionOp, ZiCompareOp, ZiCondition, ZiContextField, ZiCueGenerator, ZiError,
    ZiFieldMap, ZiFieldPath, ZiFieldValue, ZiFunction, ZiHelperRegistry, ZiInterpreter, ZiMultiSource,
    ZiOutputOp, ZiParamContext, ZiParamRef, ZiPathAccess, ZiStringPredicate, ZiValue,
};

fn sample_values(helpers: &mut ZiHelperRegistry) -> Vec<ZiValue> {
    let ports = ZiCollection::from(ZiParamRef::new("ports").value());
    let reference = helpers.define("ports", ports.clone()).unwrap();
    let name = ZiParamRef::new("name");
    vec![
        ZiValue::lit(json!(1)),
        name.value(),
        ZiParamRef::new("env").field("vars[0].name"),
        ZiParamRef::new("replicas").arith(ZiArithOp::Add, json!(1)),
        name.prefixed("app-"),
        ZiValue::Interpolation(vec![ZiValue::lit(json!("x-")), name.value()]),
        ZiValue::call(ZiFunction::ToUpper, vec![name.value()]),
        ZiValue::Context(ZiContextField::Name),
        ZiValue::item("port"),
        ports.into(),
        ZiMultiSource::from_fields(ZiParamRef::new("volumes").value(), ["pvc"]).into(),
        reference.value(),
        ZiValue::structure().with_field("name", name.value(), Some(name.is_set())),
    ]
}

fn sample_conditions() -> Vec<ZiCondition> {
    let name = ZiParamRef::new("name");
    let ports = ZiParamRef::new("ports");
    vec![
        name.is_set(),
        name.not_set(),
        ZiParamRef::new("replicas").compare(ZiCompareOp::Gt, json!(1)),
        ZiCondition::string(name.value(), ZiStringPredicate::HasPrefix("w".into())),
        ZiParamRef::new("flag").truthy(),
        ZiParamRef::new("flag").falsy(),
        name.is_in(vec![json!("web")]),
        ZiCondition::and(vec![]),
        ZiCondition::or(vec![]),
        name.is_set().negate(),
        ports.value().is_empty(),
        ports.value().not_empty(),
        ZiCondition::IterFieldExists { var: "v".into(), field: "port".into() },
        ZiCondition::IterFieldAbsent { var: "v".into(), field: "port".into() },
    ]
}

fn context() -> ZiParamContext {
    ZiParamContext::from_params(json!({
        "name": "web",
        "replicas": 2,
        "flag": true,
        "env": {"vars": [{"name": "A"}]},
        "ports": [{"port": 80}],
        "volumes": {"pvc": [{"name": "data"}]}
    }))
    .unwrap()
    .with_name("web")
}

#[test]
fn ZiFTModelEveryValueKindIsHandledByBothBackends() {
    let mut helpers = ZiHelperRegistry::new();
    let values = sample_values(&mut helpers);
    let kinds: BTreeSet<_> = values.iter().map(ZiValue::kind).collect();
    assert_eq!(kinds, ZiValue::KINDS.iter().copied().collect::<BTreeSet<_>>());

    let ctx = context();
    let interpreter = ZiInterpreter::new(&ctx).with_helpers(&helpers);
    let generator = ZiCueGenerator::new().with_helpers(&helpers);
    for value in &values {
        assert!(interpreter.evaluate(value).is_ok(), "interpreter rejected {}", value.kind());
        assert!(generator.generate_value(value).is_ok(), "generator rejected {}", value.kind());
    }
}

#[test]
fn ZiFTModelEveryConditionKindIsHandledByBothBackends() {
    let conditions = sample_conditions();
    let kinds: BTreeSet<_> = conditions.iter().map(ZiCondition::kind).collect();
    assert_eq!(kinds, ZiCondition::KINDS.iter().copied().collect::<BTreeSet<_>>());

    let ctx = context();
    let interpreter = ZiInterpreter::new(&ctx);
    let generator = ZiCueGenerator::new();
    for condition in &conditions {
        assert!(interpreter.condition(condition).is_ok(), "interpreter rejected {}", condition.kind());
        assert!(generator.generate_condition(condition).is_ok(), "generator rejected {}", condition.kind());
    }
}

#[test]
fn ZiFTModelEveryOperationKindIsListed() {
    let pipeline = ZiCollection::from(ZiValue::lit(json!([])))
        .filter(ZiCondition::field_exists("a"))
        .map(ZiFieldMap::new().field("a", ZiFieldValue::field("a")))
        .pick(["a"])
        .rename("a", "b")
        .wrap("item")
        .dedupe("item")
        .flatten()
        .default_field("item", ZiFieldValue::literal(json!("x")));
    let kinds: BTreeSet<_> = pipeline.ops().iter().map(ZiCollectionOp::name).collect();
    assert_eq!(kinds, ZiCollectionOp::KINDS.iter().copied().collect::<BTreeSet<_>>());

    let field_values = [
        ZiFieldValue::field("a"),
        ZiFieldValue::optional("a"),
        ZiFieldValue::literal(json!(1)),
        ZiFieldValue::field("a").or(ZiFieldValue::literal(json!(1))),
        ZiFieldValue::format("%v", vec![ZiFieldValue::field("a")]),
        ZiFieldValue::nested(ZiFieldMap::new()),
    ];
    let kinds: BTreeSet<_> = field_values.iter().map(ZiFieldValue::kind).collect();
    assert_eq!(kinds, ZiFieldValue::KINDS.iter().copied().collect::<BTreeSet<_>>());

    let op = ZiOutputOp::if_block(ZiCondition::and(vec![]), vec![ZiOutputOp::set("a", ZiValue::lit(json!(1)))]);
    assert!(ZiOutputOp::KINDS.contains(&op.kind()));
}

#[test]
fn ZiFTModelHelpersMustReferenceEarlierHelpers() {
    let mut first = ZiHelperRegistry::new();
    let ports = first
        .define("ports", ZiCollection::from(ZiParamRef::new("ports").value()))
        .unwrap();

    let mut second = ZiHelperRegistry::new();
    second
        .define("other", ZiCollection::from(ZiParamRef::new("other").value()))
        .unwrap();
    let dangling = second.define("exposed", ZiCollection::from(ports.value()));
    assert!(matches!(dangling, Err(ZiError::Validation { .. })));

    assert!(first.define("ports", ZiCollection::from(ZiValue::lit(json!([])))).is_err());
    assert!(first.define("scalar", ZiValue::lit(json!(1))).is_err());
}

#[test]
fn ZiFTModelDanglingHelperFailsInBothBackends() {
    let mut owner = ZiHelperRegistry::new();
    let reference = owner
        .define("ports", ZiCollection::from(ZiParamRef::new("ports").value()))
        .unwrap();
    let stranger = ZiHelperRegistry::new();

    let ctx = context();
    let interpreter = ZiInterpreter::new(&ctx).with_helpers(&stranger);
    assert!(matches!(interpreter.evaluate(&reference.value()), Err(ZiError::Pipeline { .. })));

    let generator = ZiCueGenerator::new().with_helpers(&stranger);
    assert!(matches!(generator.generate_value(&reference.value()), Err(ZiError::Pipeline { .. })));
}

#[test]
fn ZiFTModelPathGrammar() {
    let path = ZiFieldPath::parse("metadata.labels[app.oam.dev/name]").unwrap();
    assert_eq!(path.segments().len(), 2);
    assert_eq!(path.segments()[1].access, ZiPathAccess::Key("app.oam.dev/name".into()));

    let path = ZiFieldPath::parse("spec.containers[0].image").unwrap();
    assert_eq!(path.segments()[1].access, ZiPathAccess::Index(0));
    assert_eq!(path.to_string(), "spec.containers[0].image");

    let data = json!({"spec": {"containers": [{"image": "nginx"}]}});
    assert_eq!(path.resolve(&data), Some(&json!("nginx")));
    assert!(ZiFieldPath::parse("").is_err());
}

#[test]
fn ZiFTModelArithmeticAndCalls() {
    let ctx = context();
    let interpreter = ZiInterpreter::new(&ctx);
    let replicas = ZiParamRef::new("replicas");

    assert_eq!(interpreter.evaluate(&replicas.arith(ZiArithOp::Mul, json!(3))).unwrap(), Some(json!(6)));
    assert_eq!(interpreter.evaluate(&replicas.arith(ZiArithOp::Div, json!(4))).unwrap(), Some(json!(0.5)));
    assert!(interpreter.evaluate(&replicas.arith(ZiArithOp::Mod, json!(0))).is_err());

    let joined = ZiValue::call(
        ZiFunction::ListConcat,
        vec![ZiValue::lit(json!([1])), ZiParamRef::new("missing").value(), ZiValue::lit(json!([2]))],
    );
    assert_eq!(interpreter.evaluate(&joined).unwrap(), Some(json!([1, 2])));

    let radix = ZiValue::call(ZiFunction::FormatInt, vec![ZiValue::lit(json!(255)), ZiValue::lit(json!(16))]);
    assert_eq!(interpreter.evaluate(&radix).unwrap(), Some(json!("ff")));
}
