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

//! # Zidef Pipeline Module
//!
//! Declarative collection pipelines. A [`ZiCollection`] applies an ordered
//! operation list to one source sequence; a [`ZiMultiSource`] unions several
//! same-shaped sibling sequences under one parent record before its own
//! operations run.
//!
//! Builders consume and return `self`, so a pipeline is owned by exactly one
//! caller until it is handed to a backend.
//!
//! ```rust
//! use zidef::expr::{ZiFieldMap, ZiFieldValue, ZiParamRef};
//! use zidef::pipeline::ZiMultiSource;
//!
//! let volumes = ZiParamRef::new("volumeMounts");
//! let mounts = ZiMultiSource::from_fields(volumes.value(), ["pvc", "configMap"])
//!     .map_source("pvc", ZiFieldMap::new().field("name", ZiFieldValue::field("name")))
//!     .dedupe("name");
//! ```

use indexmap::IndexMap;
use serde_json::Value;

use crate::errors::{Result, ZiError};
use crate::expr::{
    parse_format_template, ZiCondition, ZiFieldMap, ZiFieldValue, ZiFormatPiece, ZiValue,
};
use crate::interpreter::{ZiInterpreter, ZiRecordIter};

/// One step of a single-source pipeline.
#[derive(Clone, Debug, PartialEq)]
pub enum ZiCollectionOp {
    Filter(ZiCondition),
    Map(ZiFieldMap),
    Pick(Vec<String>),
    Rename { from: String, to: String },
    Wrap(String),
    Dedupe(String),
    Flatten,
    DefaultField { field: String, fallback: ZiFieldValue },
}

impl ZiCollectionOp {
    pub const KINDS: &'static [&'static str] = &[
        "filter",
        "map",
        "pick",
        "rename",
        "wrap",
        "dedupe",
        "flatten",
        "default_field",
    ];

    /// Operation name used in logs and error context.
    pub fn name(&self) -> &'static str {
        match self {
            ZiCollectionOp::Filter(_) => "filter",
            ZiCollectionOp::Map(_) => "map",
            ZiCollectionOp::Pick(_) => "pick",
            ZiCollectionOp::Rename { .. } => "rename",
            ZiCollectionOp::Wrap(_) => "wrap",
            ZiCollectionOp::Dedupe(_) => "dedupe",
            ZiCollectionOp::Flatten => "flatten",
            ZiCollectionOp::DefaultField { .. } => "default_field",
        }
    }
}

/// Single-source collection pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct ZiCollection {
    source: ZiValue,
    ops: Vec<ZiCollectionOp>,
    guard: Option<ZiCondition>,
}

impl ZiCollection {
    /// Starts a pipeline over `source`.
    pub fn from(source: ZiValue) -> Self {
        Self {
            source,
            ops: Vec::new(),
            guard: None,
        }
    }

    /// Alias of [`ZiCollection::from`].
    pub fn each(source: ZiValue) -> Self {
        Self::from(source)
    }

    pub fn filter(self, predicate: ZiCondition) -> Self {
        self.push(ZiCollectionOp::Filter(predicate))
    }

    pub fn map(self, mapping: ZiFieldMap) -> Self {
        self.push(ZiCollectionOp::Map(mapping))
    }

    pub fn pick<I, S>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(ZiCollectionOp::Pick(fields.into_iter().map(Into::into).collect()))
    }

    pub fn rename(self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.push(ZiCollectionOp::Rename {
            from: from.into(),
            to: to.into(),
        })
    }

    pub fn wrap(self, key: impl Into<String>) -> Self {
        self.push(ZiCollectionOp::Wrap(key.into()))
    }

    pub fn dedupe(self, key_field: impl Into<String>) -> Self {
        self.push(ZiCollectionOp::Dedupe(key_field.into()))
    }

    pub fn flatten(self) -> Self {
        self.push(ZiCollectionOp::Flatten)
    }

    pub fn default_field(self, field: impl Into<String>, fallback: ZiFieldValue) -> Self {
        self.push(ZiCollectionOp::DefaultField {
            field: field.into(),
            fallback,
        })
    }

    /// Gates the whole pipeline; a false guard yields an empty sequence.
    pub fn guard(mut self, condition: ZiCondition) -> Self {
        self.guard = Some(condition);
        self
    }

    fn push(mut self, op: ZiCollectionOp) -> Self {
        self.ops.push(op);
        self
    }

    pub fn source(&self) -> &ZiValue {
        &self.source
    }

    pub fn ops(&self) -> &[ZiCollectionOp] {
        &self.ops
    }

    pub fn guard_condition(&self) -> Option<&ZiCondition> {
        self.guard.as_ref()
    }

    /// Checks the operation list for problems both backends would hit.
    pub fn validate(&self) -> Result<()> {
        for op in &self.ops {
            match op {
                ZiCollectionOp::Filter(_) | ZiCollectionOp::Flatten => {}
                ZiCollectionOp::Map(mapping) => validate_field_map(op.name(), mapping)?,
                ZiCollectionOp::Pick(fields) => {
                    if fields.iter().any(String::is_empty) {
                        return Err(ZiError::operator(op.name(), "field names may not be empty"));
                    }
                }
                ZiCollectionOp::Rename { from, to } => {
                    if from.is_empty() || to.is_empty() {
                        return Err(ZiError::operator(op.name(), "rename requires both 'from' and 'to'"));
                    }
                }
                ZiCollectionOp::Wrap(key) | ZiCollectionOp::Dedupe(key) => {
                    if key.is_empty() {
                        return Err(ZiError::operator(op.name(), "key may not be empty"));
                    }
                }
                ZiCollectionOp::DefaultField { field, fallback } => {
                    if field.is_empty() {
                        return Err(ZiError::operator(op.name(), "field may not be empty"));
                    }
                    validate_field_value(op.name(), fallback)?;
                }
            }
        }
        Ok(())
    }

    /// Lazily evaluates the pipeline. Each call re-runs it from the source.
    pub fn iter<'a>(&'a self, interpreter: &'a ZiInterpreter<'_>) -> Result<ZiRecordIter<'a>> {
        interpreter.iter_collection(self)
    }

    /// Materializes every element.
    pub fn collect(&self, interpreter: &ZiInterpreter<'_>) -> Result<Vec<Value>> {
        self.iter(interpreter)?.collect()
    }

    pub fn count(&self, interpreter: &ZiInterpreter<'_>) -> Result<usize> {
        let mut count = 0;
        for item in self.iter(interpreter)? {
            item?;
            count += 1;
        }
        Ok(count)
    }

    /// First element, stopping the pipeline as soon as it is produced.
    pub fn first(&self, interpreter: &ZiInterpreter<'_>) -> Result<Option<Value>> {
        self.iter(interpreter)?.next().transpose()
    }
}

/// Operation accepted by a [`ZiMultiSource`].
#[derive(Clone, Debug, PartialEq)]
pub enum ZiMultiSourceOp {
    Pick(Vec<String>),
    /// Copies `field` from the original element when `condition` holds for it.
    PickIf { field: String, condition: ZiCondition },
    Dedupe(String),
}

impl ZiMultiSourceOp {
    pub const KINDS: &'static [&'static str] = &["pick", "pick_if", "dedupe"];

    pub fn name(&self) -> &'static str {
        match self {
            ZiMultiSourceOp::Pick(_) => "pick",
            ZiMultiSourceOp::PickIf { .. } => "pick_if",
            ZiMultiSourceOp::Dedupe(_) => "dedupe",
        }
    }
}

/// Union of several sibling sequences under one parent record.
#[derive(Clone, Debug, PartialEq)]
pub struct ZiMultiSource {
    parent: ZiValue,
    sources: Vec<String>,
    per_source: IndexMap<String, ZiFieldMap>,
    ops: Vec<ZiMultiSourceOp>,
    guard: Option<ZiCondition>,
}

impl ZiMultiSource {
    pub fn from_fields<I, S>(parent: ZiValue, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            parent,
            sources: sources.into_iter().map(Into::into).collect(),
            per_source: IndexMap::new(),
            ops: Vec::new(),
            guard: None,
        }
    }

    /// Replaces every per-source mapping.
    pub fn map_by_source<I, S>(mut self, mappings: I) -> Self
    where
        I: IntoIterator<Item = (S, ZiFieldMap)>,
        S: Into<String>,
    {
        self.per_source = mappings.into_iter().map(|(k, v)| (k.into(), v)).collect();
        self
    }

    /// Adds or replaces the mapping for one source name.
    pub fn map_source(mut self, source: impl Into<String>, mapping: ZiFieldMap) -> Self {
        self.per_source.insert(source.into(), mapping);
        self
    }

    /// Field subset for sources without a per-source mapping. Only the last
    /// `pick` in the chain takes effect, wherever it sits relative to
    /// `map_by_source`.
    pub fn pick<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ops
            .push(ZiMultiSourceOp::Pick(fields.into_iter().map(Into::into).collect()));
        self
    }

    pub fn pick_if(mut self, field: impl Into<String>, condition: ZiCondition) -> Self {
        self.ops.push(ZiMultiSourceOp::PickIf {
            field: field.into(),
            condition,
        });
        self
    }

    pub fn dedupe(mut self, key_field: impl Into<String>) -> Self {
        self.ops.push(ZiMultiSourceOp::Dedupe(key_field.into()));
        self
    }

    pub fn guard(mut self, condition: ZiCondition) -> Self {
        self.guard = Some(condition);
        self
    }

    pub fn parent(&self) -> &ZiValue {
        &self.parent
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn mapping_for(&self, source: &str) -> Option<&ZiFieldMap> {
        self.per_source.get(source)
    }

    pub fn ops(&self) -> &[ZiMultiSourceOp] {
        &self.ops
    }

    pub fn guard_condition(&self) -> Option<&ZiCondition> {
        self.guard.as_ref()
    }

    /// Projection used for sources without their own mapping: the last `Pick`.
    pub fn active_pick(&self) -> Option<&[String]> {
        self.ops.iter().rev().find_map(|op| match op {
            ZiMultiSourceOp::Pick(fields) => Some(fields.as_slice()),
            _ => None,
        })
    }

    pub fn pick_ifs(&self) -> impl Iterator<Item = (&str, &ZiCondition)> {
        self.ops.iter().filter_map(|op| match op {
            ZiMultiSourceOp::PickIf { field, condition } => Some((field.as_str(), condition)),
            _ => None,
        })
    }

    pub fn dedupe_keys(&self) -> impl Iterator<Item = &str> {
        self.ops.iter().filter_map(|op| match op {
            ZiMultiSourceOp::Dedupe(key) => Some(key.as_str()),
            _ => None,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(ZiError::validation("multi-source pipeline needs at least one source field"));
        }
        for (source, mapping) in &self.per_source {
            if !self.sources.contains(source) {
                return Err(ZiError::validation(format!(
                    "mapping given for '{source}', which is not a declared source"
                )));
            }
            validate_field_map("map_by_source", mapping)?;
        }
        Ok(())
    }

    pub fn iter<'a>(&'a self, interpreter: &'a ZiInterpreter<'_>) -> Result<ZiRecordIter<'a>> {
        interpreter.iter_multi_source(self)
    }

    pub fn collect(&self, interpreter: &ZiInterpreter<'_>) -> Result<Vec<Value>> {
        self.iter(interpreter)?.collect()
    }

    pub fn count(&self, interpreter: &ZiInterpreter<'_>) -> Result<usize> {
        let mut count = 0;
        for item in self.iter(interpreter)? {
            item?;
            count += 1;
        }
        Ok(count)
    }

    pub fn first(&self, interpreter: &ZiInterpreter<'_>) -> Result<Option<Value>> {
        self.iter(interpreter)?.next().transpose()
    }
}

fn validate_field_map(operator: &str, mapping: &ZiFieldMap) -> Result<()> {
    for (name, value) in mapping.iter() {
        if name.is_empty() || name.split('.').any(str::is_empty) {
            return Err(ZiError::operator(operator, format!("invalid target field name '{name}'")));
        }
        validate_field_value(operator, value)?;
    }
    Ok(())
}

fn validate_field_value(operator: &str, value: &ZiFieldValue) -> Result<()> {
    match value {
        ZiFieldValue::Field(_) | ZiFieldValue::Optional(_) | ZiFieldValue::Literal(_) => Ok(()),
        ZiFieldValue::Or { primary, fallback } => {
            validate_field_value(operator, primary)?;
            validate_field_value(operator, fallback)
        }
        ZiFieldValue::Format { template, args } => {
            check_format_arity(template, args.len()).map_err(|e| ZiError::operator(operator, e.to_string()))?;
            args.iter().try_for_each(|arg| validate_field_value(operator, arg))
        }
        ZiFieldValue::Nested(mapping) => validate_field_map(operator, mapping),
    }
}

/// Fails when a format template's slot count differs from its argument count.
pub fn check_format_arity(template: &str, args: usize) -> Result<()> {
    let slots = parse_format_template(template)
        .iter()
        .filter(|piece| matches!(piece, ZiFormatPiece::Arg))
        .count();
    if slots != args {
        return Err(ZiError::validation(format!(
            "format '{template}' has {slots} placeholder(s) but {args} argument(s)"
        )));
    }
    Ok(())
}
