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

//! # Zidef Context Module
//!
//! Concrete parameter values and runtime context fields bound for one
//! interpreter run. Built once per render with consuming builders.

use serde_json::{Map, Value};

use crate::errors::{Result, ZiError};
use crate::expr::ZiContextField;

/// Parameter values plus `context.*` fields for one render.
#[derive(Clone, Debug, Default)]
pub struct ZiParamContext {
    params: Map<String, Value>,
    context: Map<String, Value>,
}

impl ZiParamContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a context from a JSON object of parameter values.
    pub fn from_params(params: Value) -> Result<Self> {
        match params {
            Value::Object(params) => Ok(Self {
                params,
                context: Map::new(),
            }),
            Value::Null => Ok(Self::default()),
            other => Err(ZiError::validation(format!(
                "parameters must be an object, got {}",
                json_type(&other)
            ))),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: Value) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    pub fn with_context(mut self, field: ZiContextField, value: impl Into<String>) -> Self {
        self.context
            .insert(field.key().to_string(), Value::String(value.into()));
        self
    }

    pub fn with_name(self, name: impl Into<String>) -> Self {
        self.with_context(ZiContextField::Name, name)
    }

    pub fn with_namespace(self, namespace: impl Into<String>) -> Self {
        self.with_context(ZiContextField::Namespace, namespace)
    }

    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// True only for explicitly supplied values; defaults do not count.
    pub fn is_param_set(&self, name: &str) -> bool {
        self.params.get(name).is_some_and(|value| !value.is_null())
    }

    pub fn context(&self, field: ZiContextField) -> Option<&Value> {
        self.context.get(field.key())
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }
}

pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
