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

use serde_json::{Map, Value};

use crate::dsl::ir::ZiDSLProgram;
use crate::errors::{Result, ZiError};
use crate::expr::{
    ZiAffix, ZiArithOp, ZiCompareOp, ZiCondition, ZiContextField, ZiFieldMap, ZiFieldValue, ZiFunction,
    ZiParamRef, ZiStringPredicate, ZiStructField, ZiValue,
};
use crate::helper::ZiHelperRegistry;
use crate::pipeline::{ZiCollection, ZiMultiSource};
use crate::render::ZiOutputOp;

/// Helpers and output operations compiled from one program.
#[derive(Clone, Debug, Default)]
pub struct ZiCompiledDefinition {
    helpers: ZiHelperRegistry,
    outputs: Vec<ZiOutputOp>,
}

impl ZiCompiledDefinition {
    pub fn helpers(&self) -> &ZiHelperRegistry {
        &self.helpers
    }

    pub fn outputs(&self) -> &[ZiOutputOp] {
        &self.outputs
    }

    pub fn into_parts(self) -> (ZiHelperRegistry, Vec<ZiOutputOp>) {
        (self.helpers, self.outputs)
    }
}

#[derive(Debug, Default)]
pub struct ZiDSLCompiler {
    strict: bool,
}

impl ZiDSLCompiler {
    pub fn new() -> Self {
        Self { strict: false }
    }

    /// Strict compilation also runs `validate` on every pipeline.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn compile(&self, program: &ZiDSLProgram) -> Result<ZiCompiledDefinition> {
        let mut helpers = ZiHelperRegistry::new();
        for helper in &program.helpers {
            let value = self
                .compile_value(&helper.value, &helpers)
                .map_err(|e| ZiError::pipeline(helper.name.clone(), e.to_string()))?;
            if helper.after_output {
                helpers.define_after_output(helper.name.clone(), value)?;
            } else {
                helpers.define(helper.name.clone(), value)?;
            }
        }

        let mut outputs = Vec::with_capacity(program.outputs.len());
        for output in &program.outputs {
            outputs.push(self.compile_output(output, &helpers)?);
        }

        log::debug!(
            "compiled definition with {} helper(s) and {} output op(s)",
            helpers.len(),
            outputs.len()
        );
        Ok(ZiCompiledDefinition { helpers, outputs })
    }

    pub fn compile_output(&self, node: &Value, helpers: &ZiHelperRegistry) -> Result<ZiOutputOp> {
        let obj = as_object(node, "output")?;
        let kind = kind_of(obj)?;
        log::trace!("compiling output op '{}'", kind);
        match kind {
            "set" => Ok(ZiOutputOp::Set {
                path: required_str(obj, "path")?.to_string(),
                value: self.compile_value(required(obj, "value")?, helpers)?,
            }),
            "set_if" => Ok(ZiOutputOp::SetIf {
                path: required_str(obj, "path")?.to_string(),
                value: self.compile_value(required(obj, "value")?, helpers)?,
                guard: self.compile_condition(required(obj, "guard")?, helpers)?,
            }),
            "spread_if" => Ok(ZiOutputOp::SpreadIf {
                path: optional_str(obj, "path")?.unwrap_or_default().to_string(),
                value: self.compile_value(required(obj, "value")?, helpers)?,
                guard: self.optional_guard(obj, helpers)?,
            }),
            "for_each" => Ok(ZiOutputOp::ForEach {
                path: optional_str(obj, "path")?.unwrap_or_default().to_string(),
                source: self.compile_value(required(obj, "source")?, helpers)?,
                guard: self.optional_guard(obj, helpers)?,
            }),
            "patch_key" => Ok(ZiOutputOp::PatchKey {
                path: required_str(obj, "path")?.to_string(),
                key: required_str(obj, "key")?.to_string(),
                elements: required_array(obj, "elements")?
                    .iter()
                    .map(|element| self.compile_value(element, helpers))
                    .collect::<Result<_>>()?,
                guard: self.optional_guard(obj, helpers)?,
            }),
            "if_block" => Ok(ZiOutputOp::IfBlock {
                guard: self.compile_condition(required(obj, "guard")?, helpers)?,
                ops: required_array(obj, "ops")?
                    .iter()
                    .map(|op| self.compile_output(op, helpers))
                    .collect::<Result<_>>()?,
            }),
            other => Err(ZiError::unsupported(format!("output op '{}'", other))),
        }
    }

    /// Non-object JSON compiles to a literal; objects dispatch on `kind`.
    pub fn compile_value(&self, node: &Value, helpers: &ZiHelperRegistry) -> Result<ZiValue> {
        let obj = match node {
            Value::Object(obj) => obj,
            literal => return Ok(ZiValue::Literal(literal.clone())),
        };
        let kind = kind_of(obj)?;
        match kind {
            "literal" => Ok(ZiValue::Literal(obj.get("value").cloned().unwrap_or(Value::Null))),
            "param" => Ok(param_ref(obj)?.value()),
            "param_field" => Ok(param_ref(obj)?.field(required_str(obj, "path")?)),
            "arith" => {
                let symbol = required_str(obj, "op")?;
                let op = ZiArithOp::parse(symbol)
                    .ok_or_else(|| ZiError::validation(format!("unknown arithmetic operator '{}'", symbol)))?;
                Ok(param_ref(obj)?.arith(op, required(obj, "operand")?.clone()))
            }
            "concat" => {
                let param = param_ref(obj)?;
                let affix = match (optional_str(obj, "prefix")?, optional_str(obj, "suffix")?) {
                    (Some(prefix), None) => ZiAffix::Prefix(prefix.to_string()),
                    (None, Some(suffix)) => ZiAffix::Suffix(suffix.to_string()),
                    _ => return Err(ZiError::validation("concat needs exactly one of 'prefix' or 'suffix'")),
                };
                Ok(ZiValue::Concat { param, affix })
            }
            "interpolation" => Ok(ZiValue::Interpolation(self.compile_values(obj, "parts", helpers)?)),
            "call" => {
                let name = required_str(obj, "function")?;
                let function = ZiFunction::parse(name)
                    .ok_or_else(|| ZiError::unsupported(format!("function '{}'", name)))?;
                Ok(ZiValue::Call(function, self.compile_values(obj, "args", helpers)?))
            }
            "context" => {
                let key = required_str(obj, "field")?;
                ZiContextField::parse(key)
                    .map(ZiValue::Context)
                    .ok_or_else(|| ZiError::unsupported(format!("context field '{}'", key)))
            }
            "item_field" => Ok(ZiValue::item(required_str(obj, "field")?)),
            "collection" => Ok(self.compile_collection(obj, helpers)?.into()),
            "multi_source" => Ok(self.compile_multi_source(obj, helpers)?.into()),
            "helper" => {
                let name = required_str(obj, "name")?;
                helpers
                    .lookup(name)
                    .map(ZiValue::Helper)
                    .ok_or_else(|| ZiError::pipeline(name, "reference to an undefined or later helper"))
            }
            "struct" => {
                let mut fields = Vec::new();
                for field in required_array(obj, "fields")? {
                    let field = as_object(field, "struct field")?;
                    fields.push(ZiStructField {
                        name: required_str(field, "name")?.to_string(),
                        value: self.compile_value(required(field, "value")?, helpers)?,
                        guard: self.optional_guard(field, helpers)?,
                    });
                }
                Ok(ZiValue::Struct(fields))
            }
            other => Err(ZiError::unsupported(format!("value '{}'", other))),
        }
    }

    pub fn compile_condition(&self, node: &Value, helpers: &ZiHelperRegistry) -> Result<ZiCondition> {
        let obj = as_object(node, "condition")?;
        let kind = kind_of(obj)?;
        let value = |key: &str| self.compile_value(required(obj, key)?, helpers);
        match kind {
            "is_set" => Ok(ZiCondition::IsSet(value("value")?)),
            "not_set" => Ok(ZiCondition::NotSet(value("value")?)),
            "compare" => {
                let symbol = required_str(obj, "op")?;
                let op = ZiCompareOp::parse(symbol)
                    .ok_or_else(|| ZiError::validation(format!("unknown comparison operator '{}'", symbol)))?;
                Ok(ZiCondition::Compare {
                    subject: value("subject")?,
                    op,
                    operand: value("operand")?,
                })
            }
            "str" => Ok(ZiCondition::Str {
                subject: value("subject")?,
                predicate: string_predicate(obj)?,
            }),
            "truthy" => Ok(ZiCondition::Truthy(value("value")?)),
            "falsy" => Ok(ZiCondition::Falsy(value("value")?)),
            "in" => Ok(ZiCondition::In {
                subject: value("subject")?,
                values: required_array(obj, "values")?.clone(),
            }),
            "and" => Ok(ZiCondition::And(self.compile_conditions(obj, helpers)?)),
            "or" => Ok(ZiCondition::Or(self.compile_conditions(obj, helpers)?)),
            "not" => Ok(self.compile_condition(required(obj, "condition")?, helpers)?.negate()),
            "len_zero" => Ok(ZiCondition::LenZero(value("value")?)),
            "len_not_zero" => Ok(ZiCondition::LenNotZero(value("value")?)),
            "iter_field_exists" | "iter_field_absent" => {
                let var = optional_str(obj, "var")?
                    .unwrap_or(crate::interpreter::DEFAULT_ITEM_VAR)
                    .to_string();
                let field = required_str(obj, "field")?.to_string();
                Ok(if kind == "iter_field_exists" {
                    ZiCondition::IterFieldExists { var, field }
                } else {
                    ZiCondition::IterFieldAbsent { var, field }
                })
            }
            other => Err(ZiError::unsupported(format!("condition '{}'", other))),
        }
    }

    /// A bare string compiles to `Field(name)`.
    pub fn compile_field_value(&self, node: &Value) -> Result<ZiFieldValue> {
        let obj = match node {
            Value::String(name) => return Ok(ZiFieldValue::field(name.as_str())),
            other => as_object(other, "field value")?,
        };
        match kind_of(obj)? {
            "field" => Ok(ZiFieldValue::field(required_str(obj, "name")?)),
            "optional" => Ok(ZiFieldValue::optional(required_str(obj, "name")?)),
            "literal" => Ok(ZiFieldValue::literal(obj.get("value").cloned().unwrap_or(Value::Null))),
            "or" => Ok(self
                .compile_field_value(required(obj, "primary")?)?
                .or(self.compile_field_value(required(obj, "fallback")?)?)),
            "format" => {
                let args = required_array(obj, "args")?
                    .iter()
                    .map(|arg| self.compile_field_value(arg))
                    .collect::<Result<Vec<_>>>()?;
                Ok(ZiFieldValue::format(required_str(obj, "template")?, args))
            }
            "nested" => Ok(ZiFieldValue::nested(self.compile_field_map(required(obj, "fields")?)?)),
            other => Err(ZiError::unsupported(format!("field value '{}'", other))),
        }
    }

    pub fn compile_field_map(&self, node: &Value) -> Result<ZiFieldMap> {
        let obj = as_object(node, "field map")?;
        let mut mapping = ZiFieldMap::new();
        for (name, value) in obj {
            mapping = mapping.field(name.as_str(), self.compile_field_value(value)?);
        }
        Ok(mapping)
    }

    fn compile_collection(&self, obj: &Map<String, Value>, helpers: &ZiHelperRegistry) -> Result<ZiCollection> {
        let mut collection = ZiCollection::from(self.compile_value(required(obj, "source")?, helpers)?);
        if let Some(ops) = optional_array(obj, "ops")? {
            for op in ops {
                collection = self.compile_collection_op(collection, op, helpers)?;
            }
        }
        if let Some(guard) = self.optional_guard(obj, helpers)? {
            collection = collection.guard(guard);
        }
        if self.strict {
            collection.validate()?;
        }
        Ok(collection)
    }

    fn compile_collection_op(
        &self,
        collection: ZiCollection,
        node: &Value,
        helpers: &ZiHelperRegistry,
    ) -> Result<ZiCollection> {
        let obj = as_object(node, "collection op")?;
        let op = required_str(obj, "op")?;
        match op {
            "filter" => Ok(collection.filter(self.compile_condition(required(obj, "condition")?, helpers)?)),
            "map" => Ok(collection.map(self.compile_field_map(required(obj, "fields")?)?)),
            "pick" => Ok(collection.pick(string_list(obj, "fields")?)),
            "rename" => Ok(collection.rename(required_str(obj, "from")?, required_str(obj, "to")?)),
            "wrap" => Ok(collection.wrap(required_str(obj, "key")?)),
            "dedupe" => Ok(collection.dedupe(required_str(obj, "key")?)),
            "flatten" => Ok(collection.flatten()),
            "default_field" => Ok(collection.default_field(
                required_str(obj, "field")?,
                self.compile_field_value(required(obj, "fallback")?)?,
            )),
            other => Err(ZiError::unsupported(format!("collection op '{}'", other))),
        }
    }

    fn compile_multi_source(&self, obj: &Map<String, Value>, helpers: &ZiHelperRegistry) -> Result<ZiMultiSource> {
        let parent = self.compile_value(required(obj, "parent")?, helpers)?;
        let mut multi = ZiMultiSource::from_fields(parent, string_list(obj, "sources")?);
        if let Some(mappings) = obj.get("map_by_source") {
            for (source, mapping) in as_object(mappings, "map_by_source")? {
                multi = multi.map_source(source.as_str(), self.compile_field_map(mapping)?);
            }
        }
        if let Some(ops) = optional_array(obj, "ops")? {
            for node in ops {
                let op_obj = as_object(node, "multi-source op")?;
                multi = match required_str(op_obj, "op")? {
                    "pick" => multi.pick(string_list(op_obj, "fields")?),
                    "pick_if" => multi.pick_if(
                        required_str(op_obj, "field")?,
                        self.compile_condition(required(op_obj, "condition")?, helpers)?,
                    ),
                    "dedupe" => multi.dedupe(required_str(op_obj, "key")?),
                    other => return Err(ZiError::unsupported(format!("multi-source op '{}'", other))),
                };
            }
        }
        if let Some(guard) = self.optional_guard(obj, helpers)? {
            multi = multi.guard(guard);
        }
        if self.strict {
            multi.validate()?;
        }
        Ok(multi)
    }

    fn compile_values(&self, obj: &Map<String, Value>, key: &str, helpers: &ZiHelperRegistry) -> Result<Vec<ZiValue>> {
        required_array(obj, key)?
            .iter()
            .map(|node| self.compile_value(node, helpers))
            .collect()
    }

    fn compile_conditions(&self, obj: &Map<String, Value>, helpers: &ZiHelperRegistry) -> Result<Vec<ZiCondition>> {
        required_array(obj, "conditions")?
            .iter()
            .map(|node| self.compile_condition(node, helpers))
            .collect()
    }

    fn optional_guard(&self, obj: &Map<String, Value>, helpers: &ZiHelperRegistry) -> Result<Option<ZiCondition>> {
        match obj.get("guard") {
            None | Some(Value::Null) => Ok(None),
            Some(guard) => self.compile_condition(guard, helpers).map(Some),
        }
    }
}

fn param_ref(obj: &Map<String, Value>) -> Result<ZiParamRef> {
    let mut param = ZiParamRef::new(required_str(obj, "name")?);
    if let Some(default) = obj.get("default") {
        param = param.with_default(default.clone());
    }
    if let Some(required) = obj.get("required").and_then(Value::as_bool) {
        param = param.required(required);
    }
    Ok(param)
}

fn string_predicate(obj: &Map<String, Value>) -> Result<ZiStringPredicate> {
    let predicate = required_str(obj, "predicate")?;
    match predicate {
        "contains" => Ok(ZiStringPredicate::Contains(required_str(obj, "arg")?.to_string())),
        "matches" => Ok(ZiStringPredicate::Matches(required_str(obj, "arg")?.to_string())),
        "has_prefix" => Ok(ZiStringPredicate::HasPrefix(required_str(obj, "arg")?.to_string())),
        "has_suffix" => Ok(ZiStringPredicate::HasSuffix(required_str(obj, "arg")?.to_string())),
        "length" => {
            let symbol = required_str(obj, "op")?;
            let op = ZiCompareOp::parse(symbol)
                .ok_or_else(|| ZiError::validation(format!("unknown comparison operator '{}'", symbol)))?;
            let length = required(obj, "length")?
                .as_u64()
                .ok_or_else(|| ZiError::validation("'length' must be a non-negative integer"))?;
            Ok(ZiStringPredicate::Length(op, length as usize))
        }
        other => Err(ZiError::unsupported(format!("string predicate '{}'", other))),
    }
}

fn as_object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| ZiError::validation(format!("{} must be an object", what)))
}

fn kind_of(obj: &Map<String, Value>) -> Result<&str> {
    required_str(obj, "kind")
}

fn required<'a>(obj: &'a Map<String, Value>, key: &str) -> Result<&'a Value> {
    obj.get(key)
        .ok_or_else(|| ZiError::validation(format!("Missing '{}' field", key)))
}

fn required_str<'a>(obj: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    obj.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ZiError::validation(format!("'{}' must be a string", key)))
}

fn optional_str<'a>(obj: &'a Map<String, Value>, key: &str) -> Result<Option<&'a str>> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(ZiError::validation(format!("'{}' must be a string", key))),
    }
}

fn required_array<'a>(obj: &'a Map<String, Value>, key: &str) -> Result<&'a Vec<Value>> {
    obj.get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| ZiError::validation(format!("'{}' must be an array", key)))
}

fn optional_array<'a>(obj: &'a Map<String, Value>, key: &str) -> Result<Option<&'a Vec<Value>>> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => Ok(Some(items)),
        Some(_) => Err(ZiError::validation(format!("'{}' must be an array", key))),
    }
}

fn string_list(obj: &Map<String, Value>, key: &str) -> Result<Vec<String>> {
    required_array(obj, key)?
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| ZiError::validation(format!("'{}' must hold strings", key)))
        })
        .collect()
}
