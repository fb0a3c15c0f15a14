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

//! # Zidef Interpreter Module
//!
//! Evaluates expressions and pipelines directly against a
//! [`ZiParamContext`], producing the records the generated CUE would produce
//! for the same parameters.
//!
//! ## Evaluation Model
//!
//! - Values evaluate to `Option<Value>`; `None` means absent. Absence is never
//!   an error.
//! - Conditions evaluate to `bool`; comparisons and predicates on absent
//!   subjects are false.
//! - Pipelines are lazy: [`ZiRecordIter`] pulls elements through the
//!   operation chain one at a time, so a consumer that stops early stops the
//!   whole chain. Each `iter` call re-runs the pipeline from its source.
//! - A sequence source that resolves to a non-array scalar or record is a
//!   structural [`ZiError::Schema`] error, unless `strict_sources` is off.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use regex::Regex;
use serde_json::{Map, Number, Value};

use crate::context::{json_type, ZiParamContext};
use crate::errors::{Result, ZiError};
use crate::expr::{
    parse_format_template, ZiAffix, ZiArithOp, ZiCompareOp, ZiCondition, ZiFieldMap, ZiFieldValue,
    ZiFormatPiece, ZiFunction, ZiParamCapability, ZiParamRef, ZiStringPredicate, ZiValue,
};
use crate::helper::ZiHelperRegistry;
use crate::path::ZiFieldPath;
use crate::pipeline::{check_format_arity, ZiCollection, ZiCollectionOp, ZiMultiSource, ZiMultiSourceOp};

/// Name the current element is bound to inside pipelines.
pub const DEFAULT_ITEM_VAR: &str = "v";

#[derive(Clone, Debug)]
pub struct ZiInterpreterConfig {
    /// Reject non-array collection sources instead of treating them as a
    /// one-element sequence.
    pub strict_sources: bool,
    /// Iteration variable name matched by `IterFieldExists` conditions.
    pub item_var: String,
}

impl Default for ZiInterpreterConfig {
    fn default() -> Self {
        Self {
            strict_sources: true,
            item_var: DEFAULT_ITEM_VAR.to_string(),
        }
    }
}

impl ZiInterpreterConfig {
    pub fn strict_sources(mut self, strict: bool) -> Self {
        self.strict_sources = strict;
        self
    }

    pub fn item_var(mut self, name: impl Into<String>) -> Self {
        self.item_var = name.into();
        self
    }
}

type ZiItemStream<'a> = Box<dyn Iterator<Item = Result<Value>> + 'a>;

/// Lazy, finite sequence of pipeline output elements.
pub struct ZiRecordIter<'a> {
    inner: ZiItemStream<'a>,
}

impl<'a> ZiRecordIter<'a> {
    fn new(inner: ZiItemStream<'a>) -> Self {
        Self { inner }
    }

    fn empty() -> Self {
        Self::new(Box::new(std::iter::empty()))
    }
}

impl Iterator for ZiRecordIter<'_> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

/// Direct evaluator for expressions and pipelines.
pub struct ZiInterpreter<'c> {
    context: &'c ZiParamContext,
    helpers: Option<&'c ZiHelperRegistry>,
    config: ZiInterpreterConfig,
    patterns: RefCell<HashMap<String, Regex>>,
}

impl<'c> ZiInterpreter<'c> {
    pub fn new(context: &'c ZiParamContext) -> Self {
        Self {
            context,
            helpers: None,
            config: ZiInterpreterConfig::default(),
            patterns: RefCell::new(HashMap::new()),
        }
    }

    pub fn with_helpers(mut self, helpers: &'c ZiHelperRegistry) -> Self {
        self.helpers = Some(helpers);
        self
    }

    pub fn with_config(mut self, config: ZiInterpreterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ZiInterpreterConfig {
        &self.config
    }

    /// Evaluates a value outside any pipeline element.
    pub fn evaluate(&self, value: &ZiValue) -> Result<Option<Value>> {
        self.eval_value(value, None)
    }

    /// Evaluates a sequence-producing value into its elements.
    pub fn evaluate_pipeline(&self, value: &ZiValue) -> Result<Vec<Value>> {
        self.sequence_of(value)
    }

    /// Evaluates a condition outside any pipeline element.
    pub fn condition(&self, condition: &ZiCondition) -> Result<bool> {
        self.eval_condition(condition, None)
    }

    pub(crate) fn iter_collection<'a>(&'a self, collection: &'a ZiCollection) -> Result<ZiRecordIter<'a>> {
        if let Some(guard) = collection.guard_condition() {
            if !self.eval_condition(guard, None)? {
                log::debug!("collection guard is false, yielding nothing");
                return Ok(ZiRecordIter::empty());
            }
        }

        let items = self.sequence_of(collection.source())?;
        log::debug!(
            "evaluating collection over {} item(s) with {} op(s)",
            items.len(),
            collection.ops().len()
        );

        let mut stream: ZiItemStream<'a> = Box::new(items.into_iter().map(Ok));
        for op in collection.ops() {
            log::trace!("chaining collection op '{}'", op.name());
            stream = self.apply_op(op, stream);
        }
        Ok(ZiRecordIter::new(stream))
    }

    pub(crate) fn iter_multi_source<'a>(&'a self, multi: &'a ZiMultiSource) -> Result<ZiRecordIter<'a>> {
        if let Some(guard) = multi.guard_condition() {
            if !self.eval_condition(guard, None)? {
                log::debug!("multi-source guard is false, yielding nothing");
                return Ok(ZiRecordIter::empty());
            }
        }

        let parent = match self.eval_value(multi.parent(), None)? {
            Some(Value::Object(parent)) => parent,
            _ => return Ok(ZiRecordIter::empty()),
        };

        let mut raw = Vec::new();
        for (index, name) in multi.sources().iter().enumerate() {
            if let Some(Value::Array(items)) = parent.get(name) {
                raw.extend(items.iter().cloned().map(|item| (index, item)));
            }
        }
        log::debug!(
            "evaluating multi-source over {} source(s), {} raw item(s)",
            multi.sources().len(),
            raw.len()
        );

        let mut stream: ZiItemStream<'a> = Box::new(
            raw.into_iter()
                .filter_map(move |(index, item)| self.project_source_item(multi, index, item).transpose()),
        );
        for op in multi.ops() {
            if let ZiMultiSourceOp::Dedupe(key) = op {
                stream = dedupe_stream(stream, key);
            }
        }
        Ok(ZiRecordIter::new(stream))
    }

    fn project_source_item(&self, multi: &ZiMultiSource, index: usize, item: Value) -> Result<Option<Value>> {
        let Value::Object(record) = &item else {
            return Ok(None);
        };
        let source = &multi.sources()[index];

        let mut out = if let Some(mapping) = multi.mapping_for(source) {
            self.apply_field_map(mapping, record)
                .map_err(|err| ZiError::operator("map_by_source", err.to_string()))?
        } else if let Some(fields) = multi.active_pick() {
            pick_fields(record, fields)
        } else {
            record.clone()
        };

        for (field, condition) in multi.pick_ifs() {
            let holds = self
                .eval_condition(condition, Some(&item))
                .map_err(|err| ZiError::operator("pick_if", err.to_string()))?;
            if holds {
                if let Some(value) = record.get(field) {
                    out.insert(field.to_string(), value.clone());
                }
            }
        }

        Ok(Some(Value::Object(out)))
    }

    fn apply_op<'a>(&'a self, op: &'a ZiCollectionOp, input: ZiItemStream<'a>) -> ZiItemStream<'a> {
        let name = op.name();
        match op {
            ZiCollectionOp::Filter(predicate) => Box::new(input.filter_map(move |item| {
                let item = match item {
                    Ok(item) if item.is_object() => item,
                    Ok(_) => return None,
                    Err(err) => return Some(Err(err)),
                };
                match self.eval_condition(predicate, Some(&item)) {
                    Ok(true) => Some(Ok(item)),
                    Ok(false) => None,
                    Err(err) => Some(Err(ZiError::operator(name, err.to_string()))),
                }
            })),
            ZiCollectionOp::Map(mapping) => Box::new(input.filter_map(move |item| match item {
                Ok(Value::Object(record)) => Some(
                    self.apply_field_map(mapping, &record)
                        .map(Value::Object)
                        .map_err(|err| ZiError::operator(name, err.to_string())),
                ),
                Ok(_) => None,
                Err(err) => Some(Err(err)),
            })),
            ZiCollectionOp::Pick(fields) => Box::new(input.filter_map(move |item| match item {
                Ok(Value::Object(record)) => Some(Ok(Value::Object(pick_fields(&record, fields)))),
                Ok(_) => None,
                Err(err) => Some(Err(err)),
            })),
            ZiCollectionOp::Rename { from, to } => Box::new(input.filter_map(move |item| match item {
                Ok(Value::Object(record)) => Some(Ok(Value::Object(rename_field(record, from, to)))),
                Ok(_) => None,
                Err(err) => Some(Err(err)),
            })),
            ZiCollectionOp::Wrap(key) => Box::new(input.map(move |item| {
                item.map(|value| {
                    let mut wrapped = Map::new();
                    wrapped.insert(key.clone(), value);
                    Value::Object(wrapped)
                })
            })),
            ZiCollectionOp::Dedupe(key) => dedupe_stream(input, key),
            ZiCollectionOp::Flatten => Box::new(input.flat_map(|item| match item {
                Ok(Value::Array(items)) => items.into_iter().map(Ok).collect::<Vec<_>>(),
                other => vec![other],
            })),
            ZiCollectionOp::DefaultField { field, fallback } => Box::new(input.filter_map(move |item| match item {
                Ok(Value::Object(record)) => Some(
                    self.default_field(record, field, fallback)
                        .map(Value::Object)
                        .map_err(|err| ZiError::operator(name, err.to_string())),
                ),
                Ok(_) => None,
                Err(err) => Some(Err(err)),
            })),
        }
    }

    fn default_field(&self, mut record: Map<String, Value>, field: &str, fallback: &ZiFieldValue) -> Result<Map<String, Value>> {
        if is_empty_value(record.get(field)) {
            if let Some(value) = self.resolve_field_value(fallback, &record)? {
                record.insert(field.to_string(), value);
            }
        }
        Ok(record)
    }

    fn sequence_of(&self, value: &ZiValue) -> Result<Vec<Value>> {
        match self.eval_value(value, None)? {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => Ok(items),
            Some(other) if !self.config.strict_sources => Ok(vec![other]),
            Some(other) => Err(ZiError::schema(format!(
                "{} source resolved to {}, expected an array",
                value.kind(),
                json_type(&other)
            ))),
        }
    }

    fn param_value(&self, param: &ZiParamRef) -> Option<Value> {
        match self.context.param(param.name()) {
            Some(value) if !value.is_null() => Some(value.clone()),
            _ => param.default_value().cloned(),
        }
    }

    fn eval_value(&self, value: &ZiValue, item: Option<&Value>) -> Result<Option<Value>> {
        match value {
            ZiValue::Literal(literal) => Ok(Some(literal.clone())),
            ZiValue::Param(param) => Ok(self.param_value(param)),
            ZiValue::ParamField { param, path } => {
                let Some(root) = self.param_value(param) else {
                    return Ok(None);
                };
                let path = ZiFieldPath::parse(path)?;
                Ok(path.resolve(&root).cloned())
            }
            ZiValue::Arith { param, op, operand } => match self.param_value(param) {
                Some(Value::Number(left)) => match operand {
                    Value::Number(right) => arithmetic(&left, *op, right).map(|n| n.map(Value::Number)),
                    _ => Ok(None),
                },
                _ => Ok(None),
            },
            ZiValue::Concat { param, affix } => match self.param_value(param) {
                Some(Value::String(text)) => Ok(Some(Value::String(match affix {
                    ZiAffix::Prefix(prefix) => format!("{prefix}{text}"),
                    ZiAffix::Suffix(suffix) => format!("{text}{suffix}"),
                }))),
                _ => Ok(None),
            },
            ZiValue::Interpolation(parts) => {
                let mut out = String::new();
                for part in parts {
                    match self.eval_value(part, item)? {
                        Some(value) => out.push_str(&display(&value)),
                        None => return Ok(None),
                    }
                }
                Ok(Some(Value::String(out)))
            }
            ZiValue::Call(function, args) => self.call(*function, args, item),
            ZiValue::Context(field) => Ok(self.context.context(*field).cloned()),
            ZiValue::ItemField(name) => Ok(item.and_then(|item| item.get(name)).cloned()),
            ZiValue::Collection(collection) => {
                let items = collection.iter(self)?.collect::<Result<Vec<_>>>()?;
                Ok(Some(Value::Array(items)))
            }
            ZiValue::MultiSource(multi) => {
                let items = multi.iter(self)?.collect::<Result<Vec<_>>>()?;
                Ok(Some(Value::Array(items)))
            }
            ZiValue::Helper(reference) => {
                let registry = self.helpers.ok_or_else(|| {
                    ZiError::pipeline(reference.name(), "no helper registry bound to the interpreter")
                })?;
                let helper = registry.get(reference)?;
                log::debug!("evaluating helper '{}'", helper.name());
                self.eval_value(helper.value(), None)
                    .map_err(|err| ZiError::pipeline(helper.name(), err.to_string()))
            }
            ZiValue::Struct(fields) => {
                let mut out = Map::new();
                for field in fields {
                    if let Some(guard) = &field.guard {
                        if !self.eval_condition(guard, item)? {
                            continue;
                        }
                    }
                    if let Some(value) = self.eval_value(&field.value, item)? {
                        out.insert(field.name.clone(), value);
                    }
                }
                Ok(Some(Value::Object(out)))
            }
        }
    }

    fn call(&self, function: ZiFunction, args: &[ZiValue], item: Option<&Value>) -> Result<Option<Value>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval_value(arg, item)?);
        }
        check_call_arity(function, values.len())?;

        match function {
            ZiFunction::ToLower | ZiFunction::ToUpper | ZiFunction::TrimSpace => {
                let Some(Value::String(text)) = &values[0] else {
                    return Ok(None);
                };
                let out = match function {
                    ZiFunction::ToLower => text.to_lowercase(),
                    ZiFunction::ToUpper => text.to_uppercase(),
                    _ => text.trim().to_string(),
                };
                Ok(Some(Value::String(out)))
            }
            ZiFunction::FormatInt => {
                let Some(number) = values[0].as_ref().and_then(Value::as_i64) else {
                    return Ok(None);
                };
                let base = match values.get(1) {
                    Some(Some(base)) => base
                        .as_u64()
                        .filter(|base| (2..=36).contains(base))
                        .ok_or_else(|| ZiError::validation("strconv.FormatInt base must be an integer in 2..=36"))?,
                    _ => 10,
                };
                Ok(Some(Value::String(format_radix(number, base as u32))))
            }
            ZiFunction::ListConcat => {
                let mut out = Vec::new();
                for value in values.into_iter().flatten() {
                    match value {
                        Value::Array(items) => out.extend(items),
                        Value::Null => {}
                        other => {
                            return Err(ZiError::schema(format!(
                                "list.Concat expects arrays, got {}",
                                json_type(&other)
                            )))
                        }
                    }
                }
                Ok(Some(Value::Array(out)))
            }
        }
    }

    fn eval_condition(&self, condition: &ZiCondition, item: Option<&Value>) -> Result<bool> {
        match condition {
            ZiCondition::IsSet(value) => Ok(is_present(self.eval_value(value, item)?.as_ref())),
            ZiCondition::NotSet(value) => Ok(!is_present(self.eval_value(value, item)?.as_ref())),
            ZiCondition::Compare { subject, op, operand } => {
                let left = self.eval_value(subject, item)?;
                let right = self.eval_value(operand, item)?;
                Ok(match (left, right) {
                    (Some(left), Some(right)) => compare(&left, *op, &right),
                    _ => false,
                })
            }
            ZiCondition::Str { subject, predicate } => {
                let Some(value) = self.eval_value(subject, item)? else {
                    return Ok(false);
                };
                self.string_predicate(&value, predicate)
            }
            ZiCondition::Truthy(value) => Ok(self.eval_value(value, item)? == Some(Value::Bool(true))),
            ZiCondition::Falsy(value) => Ok(self.eval_value(value, item)? != Some(Value::Bool(true))),
            ZiCondition::In { subject, values } => match self.eval_value(subject, item)? {
                Some(value) => Ok(values.iter().any(|candidate| json_equal(&value, candidate))),
                None => Ok(false),
            },
            ZiCondition::And(conditions) => {
                for condition in conditions {
                    if !self.eval_condition(condition, item)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            ZiCondition::Or(conditions) => {
                for condition in conditions {
                    if self.eval_condition(condition, item)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            ZiCondition::Not(inner) => Ok(!self.eval_condition(inner, item)?),
            ZiCondition::LenZero(value) => Ok(self.length_of(value, item)? == 0),
            ZiCondition::LenNotZero(value) => Ok(self.length_of(value, item)? != 0),
            ZiCondition::IterFieldExists { var, field } => Ok(self.iter_field_present(var, field, item)),
            ZiCondition::IterFieldAbsent { var, field } => Ok(!self.iter_field_present(var, field, item)),
        }
    }

    fn iter_field_present(&self, var: &str, field: &str, item: Option<&Value>) -> bool {
        var == self.config.item_var && is_present(item.and_then(|item| item.get(field)))
    }

    fn length_of(&self, value: &ZiValue, item: Option<&Value>) -> Result<usize> {
        match self.eval_value(value, item)? {
            None | Some(Value::Null) => Ok(0),
            Some(Value::Array(items)) => Ok(items.len()),
            Some(Value::Object(map)) => Ok(map.len()),
            Some(Value::String(text)) => Ok(text.len()),
            Some(other) => Err(ZiError::schema(format!(
                "len() is undefined for {}",
                json_type(&other)
            ))),
        }
    }

    fn apply_field_map(&self, mapping: &ZiFieldMap, record: &Map<String, Value>) -> Result<Map<String, Value>> {
        let mut out = Map::new();
        for (name, field_value) in mapping.iter() {
            let Some(value) = self.resolve_field_value(field_value, record)? else {
                continue;
            };
            if name.contains('.') {
                ZiFieldPath::parse(name)?.set_value(&mut out, value);
            } else {
                out.insert(name.clone(), value);
            }
        }
        Ok(out)
    }

    fn resolve_field_value(&self, field_value: &ZiFieldValue, record: &Map<String, Value>) -> Result<Option<Value>> {
        match field_value {
            ZiFieldValue::Field(name) | ZiFieldValue::Optional(name) => Ok(record.get(name).cloned()),
            ZiFieldValue::Literal(value) => Ok(Some(value.clone())),
            ZiFieldValue::Or { primary, fallback } => {
                let primary = self.resolve_field_value(primary, record)?;
                if is_empty_value(primary.as_ref()) {
                    self.resolve_field_value(fallback, record)
                } else {
                    Ok(primary)
                }
            }
            ZiFieldValue::Format { template, args } => {
                check_format_arity(template, args.len())?;
                let mut resolved = Vec::with_capacity(args.len());
                for arg in args {
                    match self.resolve_field_value(arg, record)? {
                        Some(value) => resolved.push(value),
                        None => return Ok(None),
                    }
                }
                let mut args = resolved.iter();
                let mut out = String::new();
                for piece in parse_format_template(template) {
                    match piece {
                        ZiFormatPiece::Text(text) => out.push_str(&text),
                        ZiFormatPiece::Arg => {
                            if let Some(arg) = args.next() {
                                out.push_str(&display(arg));
                            }
                        }
                    }
                }
                Ok(Some(Value::String(out)))
            }
            ZiFieldValue::Nested(mapping) => Ok(Some(Value::Object(self.apply_field_map(mapping, record)?))),
        }
    }
}

/// Validates argument counts shared by both backends.
pub(crate) fn check_call_arity(function: ZiFunction, args: usize) -> Result<()> {
    let accepted = match function {
        ZiFunction::ToLower | ZiFunction::ToUpper | ZiFunction::TrimSpace => args == 1,
        ZiFunction::FormatInt => args == 1 || args == 2,
        ZiFunction::ListConcat => args >= 1,
    };
    if accepted {
        Ok(())
    } else {
        Err(ZiError::validation(format!(
            "{}.{} does not accept {} argument(s)",
            function.package(),
            function.function(),
            args
        )))
    }
}

fn dedupe_stream<'a>(input: ZiItemStream<'a>, key: &'a str) -> ZiItemStream<'a> {
    let mut seen = HashSet::new();
    Box::new(input.filter_map(move |item| match item {
        Ok(Value::Object(record)) => {
            if seen.insert(dedupe_key(record.get(key))) {
                Some(Ok(Value::Object(record)))
            } else {
                None
            }
        }
        Ok(_) => None,
        Err(err) => Some(Err(err)),
    }))
}

/// Canonical text for a dedupe key. Absent and null share the empty class.
fn dedupe_key(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::Number(number)) => {
            if let Some(int) = number.as_i64() {
                format!("n:{int}")
            } else if let Some(uint) = number.as_u64() {
                format!("n:{uint}")
            } else {
                match number.as_f64() {
                    Some(float) if float.fract() == 0.0 && float.abs() < 9.0e15 => format!("n:{}", float as i64),
                    Some(float) => format!("n:{float}"),
                    None => format!("n:{number}"),
                }
            }
        }
        Some(other) => other.to_string(),
    }
}

fn pick_fields(record: &Map<String, Value>, fields: &[String]) -> Map<String, Value> {
    let mut out = Map::new();
    for field in fields {
        if let Some(value) = record.get(field) {
            out.insert(field.clone(), value.clone());
        }
    }
    out
}

fn rename_field(record: Map<String, Value>, from: &str, to: &str) -> Map<String, Value> {
    if !record.contains_key(from) || from == to {
        return record;
    }
    let mut out = Map::new();
    let moved = record.get(from).cloned();
    for (key, value) in record {
        if key == from {
            if let Some(moved) = &moved {
                out.insert(to.to_string(), moved.clone());
            }
        } else if key != to {
            out.insert(key, value);
        }
    }
    out
}

fn is_present(value: Option<&Value>) -> bool {
    matches!(value, Some(value) if !value.is_null())
}

/// Absent, null and the empty string all count as empty.
fn is_empty_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.is_empty(),
        Some(_) => false,
    }
}

pub(crate) fn json_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        (Value::Array(a), Value::Array(b)) => a.len() == b.len() && a.iter().zip(b).all(|(x, y)| json_equal(x, y)),
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len() && a.iter().all(|(k, x)| b.get(k).is_some_and(|y| json_equal(x, y)))
        }
        _ => left == right,
    }
}

fn compare(left: &Value, op: ZiCompareOp, right: &Value) -> bool {
    match op {
        ZiCompareOp::Eq => json_equal(left, right),
        ZiCompareOp::Ne => !json_equal(left, right),
        _ => {
            let ordering = match (left, right) {
                (Value::Number(a), Value::Number(b)) => a.as_f64().zip(b.as_f64()).and_then(|(a, b)| a.partial_cmp(&b)),
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => None,
            };
            ordering.is_some_and(|ordering| op.holds(ordering))
        }
    }
}

impl ZiInterpreter<'_> {
    fn string_predicate(&self, value: &Value, predicate: &ZiStringPredicate) -> Result<bool> {
        if let ZiStringPredicate::Length(op, length) = predicate {
            let actual = match value {
                Value::String(text) => text.len(),
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                _ => return Ok(false),
            };
            return Ok(op.holds(actual.cmp(length)));
        }

        let Value::String(text) = value else {
            return Ok(false);
        };
        Ok(match predicate {
            ZiStringPredicate::Contains(needle) => text.contains(needle.as_str()),
            ZiStringPredicate::HasPrefix(prefix) => text.starts_with(prefix.as_str()),
            ZiStringPredicate::HasSuffix(suffix) => text.ends_with(suffix.as_str()),
            ZiStringPredicate::Matches(pattern) => self.pattern(pattern)?.is_match(text),
            ZiStringPredicate::Length(..) => false,
        })
    }

    /// Compiles a `Matches` pattern once per interpreter.
    fn pattern(&self, source: &str) -> Result<Regex> {
        if let Some(regex) = self.patterns.borrow().get(source) {
            return Ok(regex.clone());
        }
        let regex = Regex::new(source)
            .map_err(|e| ZiError::validation(format!("invalid pattern '{source}': {e}")))?;
        log::trace!("compiled pattern '{source}'");
        self.patterns.borrow_mut().insert(source.to_string(), regex.clone());
        Ok(regex)
    }
}

fn arithmetic(left: &Number, op: ZiArithOp, right: &Number) -> Result<Option<Number>> {
    if let (Some(a), Some(b)) = (left.as_i64(), right.as_i64()) {
        let result = match op {
            ZiArithOp::Add => a.checked_add(b),
            ZiArithOp::Sub => a.checked_sub(b),
            ZiArithOp::Mul => a.checked_mul(b),
            ZiArithOp::Mod => {
                if b == 0 {
                    return Err(ZiError::validation("modulo by zero"));
                }
                Some(a.rem_euclid(b))
            }
            ZiArithOp::Div => None,
        };
        if op != ZiArithOp::Div {
            return result
                .map(|n| Some(Number::from(n)))
                .ok_or_else(|| ZiError::validation("integer overflow in arithmetic expression"));
        }
    }

    let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
        return Ok(None);
    };
    let result = match op {
        ZiArithOp::Add => a + b,
        ZiArithOp::Sub => a - b,
        ZiArithOp::Mul => a * b,
        ZiArithOp::Div => {
            if b == 0.0 {
                return Err(ZiError::validation("division by zero"));
            }
            a / b
        }
        ZiArithOp::Mod => {
            if b == 0.0 {
                return Err(ZiError::validation("modulo by zero"));
            }
            a.rem_euclid(b)
        }
    };
    Ok(Number::from_f64(result))
}

fn format_radix(number: i64, base: u32) -> String {
    if base == 10 {
        return number.to_string();
    }
    let negative = number < 0;
    let mut magnitude = number.unsigned_abs();
    if magnitude == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while magnitude > 0 {
        let digit = (magnitude % base as u64) as u32;
        digits.push(std::char::from_digit(digit, base).unwrap_or('?'));
        magnitude /= base as u64;
    }
    if negative {
        digits.push('-');
    }
    digits.iter().rev().collect()
}

/// Text form used by format strings and interpolation.
pub(crate) fn display(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}
