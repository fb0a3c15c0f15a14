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

//! # Zidef DSL IR Module
//!
//! Parsed but uncompiled definition program. Node bodies stay as raw JSON
//! until [`crate::dsl::ZiDSLCompiler`] dispatches them by `kind`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{Result, ZiError};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZiDSLHelper {
    pub name: String,
    #[serde(default)]
    pub after_output: bool,
    pub value: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ZiDSLProgram {
    #[serde(default)]
    pub helpers: Vec<ZiDSLHelper>,
    #[serde(default)]
    pub outputs: Vec<Value>,
}

impl ZiDSLProgram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_helper(mut self, helper: ZiDSLHelper) -> Self {
        self.helpers.push(helper);
        self
    }

    pub fn add_output(mut self, output: Value) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ZiError::internal(format!("Failed to serialize program: {}", e)))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ZiError::validation(format!("Invalid program JSON: {}", e)))
    }
}
