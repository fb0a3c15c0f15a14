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

//! # Zidef Helper Module
//!
//! Named, reusable pipelines. A helper is defined once in a
//! [`ZiHelperRegistry`] and referenced from later expressions through the
//! [`ZiHelperRef`] returned by [`ZiHelperRegistry::define`]. References carry
//! their build-order index, and a new helper may only refer to helpers defined
//! before it, so helper graphs are acyclic by construction.

use crate::errors::{Result, ZiError};
use crate::expr::{ZiCondition, ZiValue};
use crate::pipeline::{ZiCollectionOp, ZiMultiSourceOp};

/// Build-order-indexed reference to a registered helper.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ZiHelperRef {
    index: usize,
    name: String,
}

impl ZiHelperRef {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> ZiValue {
        ZiValue::Helper(self.clone())
    }

    /// `len(helper) != 0`, used to suppress outputs fed by an empty helper.
    pub fn not_empty(&self) -> ZiCondition {
        ZiCondition::LenNotZero(self.value())
    }
}

/// A registered helper pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct ZiHelper {
    name: String,
    value: ZiValue,
    after_output: bool,
}

impl ZiHelper {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The helper body: a collection or multi-source pipeline.
    pub fn value(&self) -> &ZiValue {
        &self.value
    }

    /// Whether the generator places this helper after the output block.
    pub fn after_output(&self) -> bool {
        self.after_output
    }
}

/// Ordered store of helpers for one template invocation.
#[derive(Clone, Debug, Default)]
pub struct ZiHelperRegistry {
    helpers: Vec<ZiHelper>,
}

impl ZiHelperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a helper placed before the output block.
    pub fn define(&mut self, name: impl Into<String>, value: impl Into<ZiValue>) -> Result<ZiHelperRef> {
        self.register(name.into(), value.into(), false)
    }

    /// Registers a helper placed after the output block.
    pub fn define_after_output(&mut self, name: impl Into<String>, value: impl Into<ZiValue>) -> Result<ZiHelperRef> {
        self.register(name.into(), value.into(), true)
    }

    fn register(&mut self, name: String, value: ZiValue, after_output: bool) -> Result<ZiHelperRef> {
        if name.is_empty() {
            return Err(ZiError::validation("helper name may not be empty"));
        }
        if self.lookup(&name).is_some() {
            return Err(ZiError::validation(format!("helper '{name}' is already defined")));
        }
        match &value {
            ZiValue::Collection(_) | ZiValue::MultiSource(_) => {}
            other => {
                return Err(ZiError::validation(format!(
                    "helper '{name}' must be a collection or multi-source pipeline, got {}",
                    other.kind()
                )))
            }
        }

        let mut refs = Vec::new();
        collect_value_refs(&value, &mut refs);
        for reference in refs {
            self.check_earlier(&name, reference)?;
        }

        let index = self.helpers.len();
        log::debug!("registered helper '{}' at index {}", name, index);
        self.helpers.push(ZiHelper {
            name: name.clone(),
            value,
            after_output,
        });
        Ok(ZiHelperRef { index, name })
    }

    fn check_earlier(&self, defining: &str, reference: &ZiHelperRef) -> Result<()> {
        match self.helpers.get(reference.index) {
            Some(helper) if helper.name == reference.name => Ok(()),
            _ => Err(ZiError::validation(format!(
                "helper '{defining}' references '{}' (#{}), which is not an earlier helper",
                reference.name, reference.index
            ))),
        }
    }

    /// Resolves a reference, rejecting references issued by another registry.
    pub fn get(&self, reference: &ZiHelperRef) -> Result<&ZiHelper> {
        match self.helpers.get(reference.index) {
            Some(helper) if helper.name == reference.name => Ok(helper),
            _ => Err(ZiError::pipeline(
                reference.name.clone(),
                format!("dangling helper reference #{}", reference.index),
            )),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<ZiHelperRef> {
        self.helpers
            .iter()
            .position(|helper| helper.name == name)
            .map(|index| ZiHelperRef {
                index,
                name: name.to_string(),
            })
    }

    pub fn helpers(&self) -> &[ZiHelper] {
        &self.helpers
    }

    pub fn len(&self) -> usize {
        self.helpers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.helpers.is_empty()
    }
}

fn collect_value_refs<'a>(value: &'a ZiValue, out: &mut Vec<&'a ZiHelperRef>) {
    match value {
        ZiValue::Literal(_)
        | ZiValue::Param(_)
        | ZiValue::ParamField { .. }
        | ZiValue::Arith { .. }
        | ZiValue::Concat { .. }
        | ZiValue::Context(_)
        | ZiValue::ItemField(_) => {}
        ZiValue::Interpolation(parts) | ZiValue::Call(_, parts) => {
            parts.iter().for_each(|part| collect_value_refs(part, out));
        }
        ZiValue::Collection(collection) => {
            collect_value_refs(collection.source(), out);
            if let Some(guard) = collection.guard_condition() {
                collect_condition_refs(guard, out);
            }
            for op in collection.ops() {
                if let ZiCollectionOp::Filter(predicate) = op {
                    collect_condition_refs(predicate, out);
                }
            }
        }
        ZiValue::MultiSource(multi) => {
            collect_value_refs(multi.parent(), out);
            if let Some(guard) = multi.guard_condition() {
                collect_condition_refs(guard, out);
            }
            for op in multi.ops() {
                if let ZiMultiSourceOp::PickIf { condition, .. } = op {
                    collect_condition_refs(condition, out);
                }
            }
        }
        ZiValue::Helper(reference) => out.push(reference),
        ZiValue::Struct(fields) => {
            for field in fields {
                collect_value_refs(&field.value, out);
                if let Some(guard) = &field.guard {
                    collect_condition_refs(guard, out);
                }
            }
        }
    }
}

fn collect_condition_refs<'a>(condition: &'a ZiCondition, out: &mut Vec<&'a ZiHelperRef>) {
    match condition {
        ZiCondition::IsSet(value)
        | ZiCondition::NotSet(value)
        | ZiCondition::Truthy(value)
        | ZiCondition::Falsy(value)
        | ZiCondition::LenZero(value)
        | ZiCondition::LenNotZero(value)
        | ZiCondition::Str { subject: value, .. }
        | ZiCondition::In { subject: value, .. } => collect_value_refs(value, out),
        ZiCondition::Compare { subject, operand, .. } => {
            collect_value_refs(subject, out);
            collect_value_refs(operand, out);
        }
        ZiCondition::And(conditions) | ZiCondition::Or(conditions) => {
            conditions.iter().for_each(|c| collect_condition_refs(c, out));
        }
        ZiCondition::Not(inner) => collect_condition_refs(inner, out),
        ZiCondition::IterFieldExists { .. } | ZiCondition::IterFieldAbsent { .. } => {}
    }
}
