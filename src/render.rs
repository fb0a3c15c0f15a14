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

//! # Zidef Render Module
//!
//! Output operations describe where values land in the rendered resource.
//! The same operation list feeds both [`ZiRenderer`] (direct evaluation into
//! a JSON record) and [`crate::tree::ZiFieldTree::build`] (CUE field tree).
//!
//! Operations apply in list order. When two operations write the same path
//! and both guards hold, the later write wins.

use serde_json::{Map, Value};

use crate::context::json_type;
use crate::errors::{Result, ZiError};
use crate::expr::{ZiCondition, ZiValue};
use crate::interpreter::ZiInterpreter;
use crate::path::ZiFieldPath;

/// One placement of a value in the output resource.
///
/// An empty `path` on `SpreadIf` and `ForEach` targets the resource root.
#[derive(Clone, Debug, PartialEq)]
pub enum ZiOutputOp {
    Set {
        path: String,
        value: ZiValue,
    },
    SetIf {
        path: String,
        value: ZiValue,
        guard: ZiCondition,
    },
    /// Merges a record-valued expression into the record at `path`.
    SpreadIf {
        path: String,
        value: ZiValue,
        guard: Option<ZiCondition>,
    },
    /// Copies every key of a record-valued source into the record at `path`.
    ForEach {
        path: String,
        source: ZiValue,
        guard: Option<ZiCondition>,
    },
    /// Strategic-merge list keyed by `key`.
    PatchKey {
        path: String,
        key: String,
        elements: Vec<ZiValue>,
        guard: Option<ZiCondition>,
    },
    IfBlock {
        guard: ZiCondition,
        ops: Vec<ZiOutputOp>,
    },
}

impl ZiOutputOp {
    pub const KINDS: &'static [&'static str] = &["set", "set_if", "spread_if", "for_each", "patch_key", "if_block"];

    pub fn kind(&self) -> &'static str {
        match self {
            ZiOutputOp::Set { .. } => "set",
            ZiOutputOp::SetIf { .. } => "set_if",
            ZiOutputOp::SpreadIf { .. } => "spread_if",
            ZiOutputOp::ForEach { .. } => "for_each",
            ZiOutputOp::PatchKey { .. } => "patch_key",
            ZiOutputOp::IfBlock { .. } => "if_block",
        }
    }

    pub fn set(path: impl Into<String>, value: ZiValue) -> Self {
        ZiOutputOp::Set {
            path: path.into(),
            value,
        }
    }

    pub fn set_if(path: impl Into<String>, value: ZiValue, guard: ZiCondition) -> Self {
        ZiOutputOp::SetIf {
            path: path.into(),
            value,
            guard,
        }
    }

    pub fn if_block(guard: ZiCondition, ops: Vec<ZiOutputOp>) -> Self {
        ZiOutputOp::IfBlock { guard, ops }
    }
}

/// Rendered resource.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ZiRenderResult {
    data: Value,
}

impl ZiRenderResult {
    /// Dotted lookup, with the same bracket grammar as output paths.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let path = ZiFieldPath::parse(path).ok()?;
        path.resolve(&self.data)
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn into_value(self) -> Value {
        self.data
    }
}

/// Evaluates output operations into a JSON resource.
pub struct ZiRenderer<'i, 'c> {
    interpreter: &'i ZiInterpreter<'c>,
}

impl<'i, 'c> ZiRenderer<'i, 'c> {
    pub fn new(interpreter: &'i ZiInterpreter<'c>) -> Self {
        Self { interpreter }
    }

    pub fn render(&self, ops: &[ZiOutputOp]) -> Result<ZiRenderResult> {
        let mut data = Map::new();
        self.apply_all(ops, &mut data)?;
        log::debug!("rendered {} top-level field(s)", data.len());
        Ok(ZiRenderResult {
            data: Value::Object(data),
        })
    }

    fn apply_all(&self, ops: &[ZiOutputOp], data: &mut Map<String, Value>) -> Result<()> {
        for op in ops {
            log::trace!("applying output op '{}'", op.kind());
            self.apply(op, data)?;
        }
        Ok(())
    }

    fn guard_holds(&self, guard: Option<&ZiCondition>) -> Result<bool> {
        match guard {
            Some(guard) => self.interpreter.condition(guard),
            None => Ok(true),
        }
    }

    fn apply(&self, op: &ZiOutputOp, data: &mut Map<String, Value>) -> Result<()> {
        match op {
            ZiOutputOp::Set { path, value } => self.write(path, value, data),
            ZiOutputOp::SetIf { path, value, guard } => {
                if self.interpreter.condition(guard)? {
                    self.write(path, value, data)?;
                }
                Ok(())
            }
            ZiOutputOp::SpreadIf { path, value, guard } => {
                if !self.guard_holds(guard.as_ref())? {
                    return Ok(());
                }
                match self.interpreter.evaluate(value)? {
                    None | Some(Value::Null) => Ok(()),
                    Some(Value::Object(fields)) => {
                        target(path, data)?.extend(fields);
                        Ok(())
                    }
                    Some(other) => Err(ZiError::schema(format!(
                        "spread at '{path}' needs a record, got {}",
                        json_type(&other)
                    ))),
                }
            }
            ZiOutputOp::ForEach { path, source, guard } => {
                if !self.guard_holds(guard.as_ref())? {
                    return Ok(());
                }
                match self.interpreter.evaluate(source)? {
                    None | Some(Value::Null) => Ok(()),
                    Some(Value::Object(entries)) => {
                        let target = target(path, data)?;
                        for (key, value) in entries {
                            target.insert(key, value);
                        }
                        Ok(())
                    }
                    Some(other) => Err(ZiError::schema(format!(
                        "for-each at '{path}' needs a record source, got {}",
                        json_type(&other)
                    ))),
                }
            }
            ZiOutputOp::PatchKey {
                path, elements, guard, ..
            } => {
                if !self.guard_holds(guard.as_ref())? {
                    return Ok(());
                }
                let mut items = Vec::with_capacity(elements.len());
                for element in elements {
                    if let Some(value) = self.interpreter.evaluate(element)? {
                        items.push(value);
                    }
                }
                ZiFieldPath::parse(path)?.set_value(data, Value::Array(items));
                Ok(())
            }
            ZiOutputOp::IfBlock { guard, ops } => {
                if self.interpreter.condition(guard)? {
                    self.apply_all(ops, data)?;
                }
                Ok(())
            }
        }
    }

    fn write(&self, path: &str, value: &ZiValue, data: &mut Map<String, Value>) -> Result<()> {
        let path = ZiFieldPath::parse(path)?;
        if let Some(value) = self.interpreter.evaluate(value)? {
            path.set_value(data, value);
        }
        Ok(())
    }
}

fn target<'a>(path: &str, data: &'a mut Map<String, Value>) -> Result<&'a mut Map<String, Value>> {
    if path.is_empty() {
        return Ok(data);
    }
    Ok(ZiFieldPath::parse(path)?.ensure_object(data))
}
