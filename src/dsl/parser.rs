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

use std::path::Path;

use serde_json::{Map, Value};

use crate::dsl::ir::{ZiDSLHelper, ZiDSLProgram};
use crate::errors::{Result, ZiError};

const PROGRAM_KEYS: &[&str] = &["helpers", "outputs"];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ZiDSLFormat {
    #[default]
    Json,
    Yaml,
}

#[derive(Clone, Debug)]
pub struct ZiParseResult {
    pub program: ZiDSLProgram,
    pub warnings: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct ZiDSLParserConfig {
    /// Reject malformed entries and unknown keys instead of warning.
    pub strict: bool,
    /// Format assumed for files without a `.json`/`.yaml`/`.yml` extension.
    pub default_format: ZiDSLFormat,
}

#[derive(Debug, Default)]
pub struct ZiDSLParser {
    config: ZiDSLParserConfig,
}

impl ZiDSLParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: ZiDSLParserConfig) -> Self {
        self.config = config;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.config.strict = strict;
        self
    }

    /// Sniffs the format: sources opening with `{` or `[` are JSON, anything
    /// else is read as YAML.
    pub fn parse(&self, source: &str) -> Result<ZiParseResult> {
        let trimmed = source.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            self.parse_json(source)
        } else {
            self.parse_yaml(source)
        }
    }

    pub fn parse_json(&self, source: &str) -> Result<ZiParseResult> {
        let value: Value =
            serde_json::from_str(source).map_err(|e| ZiError::validation(format!("Invalid JSON: {}", e)))?;
        self.parse_value(value)
    }

    pub fn parse_yaml(&self, source: &str) -> Result<ZiParseResult> {
        let yaml: serde_yaml::Value =
            serde_yaml::from_str(source).map_err(|e| ZiError::validation(format!("Invalid YAML: {}", e)))?;
        self.parse_value(yaml_to_json(&yaml))
    }

    pub fn parse_file(&self, path: &Path) -> Result<ZiParseResult> {
        let content = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        log::debug!("loading definition program from {}", path.display());
        match extension.as_str() {
            "json" => self.parse_json(&content),
            "yaml" | "yml" => self.parse_yaml(&content),
            _ => match self.config.default_format {
                ZiDSLFormat::Json => self.parse_json(&content),
                ZiDSLFormat::Yaml => self.parse_yaml(&content),
            },
        }
    }

    /// Accepts either a program object or a bare array of output operations.
    pub fn parse_value(&self, value: Value) -> Result<ZiParseResult> {
        let mut warnings = Vec::new();
        let program = match value {
            Value::Array(outputs) => ZiDSLProgram {
                helpers: Vec::new(),
                outputs: self.parse_outputs(&outputs, &mut warnings)?,
            },
            Value::Object(map) => self.parse_program(&map, &mut warnings)?,
            _ => return Err(ZiError::validation("Program must be an object or an array of outputs")),
        };
        Ok(ZiParseResult { program, warnings })
    }

    fn parse_program(&self, map: &Map<String, Value>, warnings: &mut Vec<String>) -> Result<ZiDSLProgram> {
        for key in map.keys() {
            if !PROGRAM_KEYS.contains(&key.as_str()) {
                self.report(format!("Unknown top-level key '{}'", key), warnings)?;
            }
        }

        let helpers = match map.get("helpers") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => self.parse_helpers(items, warnings)?,
            Some(_) => return Err(ZiError::validation("'helpers' must be an array")),
        };
        let outputs = match map.get("outputs") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => self.parse_outputs(items, warnings)?,
            Some(_) => return Err(ZiError::validation("'outputs' must be an array")),
        };
        Ok(ZiDSLProgram { helpers, outputs })
    }

    fn parse_helpers(&self, items: &[Value], warnings: &mut Vec<String>) -> Result<Vec<ZiDSLHelper>> {
        let mut helpers = Vec::new();
        for (idx, item) in items.iter().enumerate() {
            match parse_helper(item) {
                Ok(helper) => helpers.push(helper),
                Err(e) => self.report(format!("Helper {}: {}", idx, e), warnings)?,
            }
        }
        Ok(helpers)
    }

    fn parse_outputs(&self, items: &[Value], warnings: &mut Vec<String>) -> Result<Vec<Value>> {
        let mut outputs = Vec::new();
        for (idx, item) in items.iter().enumerate() {
            let has_kind = item.get("kind").and_then(Value::as_str).is_some();
            if has_kind {
                outputs.push(item.clone());
            } else {
                self.report(format!("Output {}: missing 'kind' field", idx), warnings)?;
            }
        }
        Ok(outputs)
    }

    /// Strict mode turns the message into an error; otherwise it is logged
    /// and collected.
    fn report(&self, message: String, warnings: &mut Vec<String>) -> Result<()> {
        if self.config.strict {
            return Err(ZiError::validation(message));
        }
        log::warn!("{}", message);
        warnings.push(message);
        Ok(())
    }
}

fn parse_helper(value: &Value) -> Result<ZiDSLHelper> {
    let map = value
        .as_object()
        .ok_or_else(|| ZiError::validation("Helper must be an object"))?;
    let name = map
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| ZiError::validation("Missing 'name' field"))?
        .to_string();
    let after_output = match map.get("after_output") {
        None => false,
        Some(Value::Bool(flag)) => *flag,
        Some(_) => return Err(ZiError::validation("'after_output' must be a boolean")),
    };
    let value = map
        .get("value")
        .cloned()
        .ok_or_else(|| ZiError::validation(format!("Helper '{}' is missing 'value'", name)))?;
    Ok(ZiDSLHelper {
        name,
        after_output,
        value,
    })
}

pub fn yaml_to_json(yaml: &serde_yaml::Value) -> Value {
    match yaml {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(*b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                Value::Number(u.into())
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        serde_yaml::Value::String(s) => Value::String(s.clone()),
        serde_yaml::Value::Sequence(seq) => Value::Array(seq.iter().map(yaml_to_json).collect()),
        serde_yaml::Value::Mapping(map) => {
            let mut obj = Map::new();
            for (k, v) in map {
                let key = match k {
                    serde_yaml::Value::String(s) => s.clone(),
                    other => match yaml_to_json(other) {
                        Value::String(s) => s,
                        scalar => scalar.to_string(),
                    },
                };
                obj.insert(key, yaml_to_json(v));
            }
            Value::Object(obj)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(&tagged.value),
    }
}
