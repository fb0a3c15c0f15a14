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

//! # Zidef Field Path Module
//!
//! Output paths are dot-separated segments, each optionally carrying one
//! bracketed suffix:
//!
//! - `spec.replicas`: plain nested fields
//! - `spec.containers[0].image`: numeric bracket, array element access
//! - `metadata.labels[app.oam.dev/name]`: non-numeric bracket, map-key access
//!
//! Dots inside brackets never split a segment. A bracket that is not closed at
//! the end of its segment leaves the whole segment as a plain name.

use std::fmt;

use serde_json::{Map, Value};

use crate::errors::{Result, ZiError};

/// Access carried by the bracket suffix of a segment.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ZiPathAccess {
    /// No bracket suffix.
    Field,
    /// `name[3]`
    Index(usize),
    /// `name[some.key]`
    Key(String),
}

/// One dot-separated segment of a [`ZiFieldPath`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ZiPathSegment {
    pub name: String,
    pub access: ZiPathAccess,
}

impl ZiPathSegment {
    fn parse(part: &str) -> Result<Self> {
        let Some(open) = part.find('[') else {
            return Ok(Self {
                name: part.to_string(),
                access: ZiPathAccess::Field,
            });
        };
        if !part.ends_with(']') {
            return Ok(Self {
                name: part.to_string(),
                access: ZiPathAccess::Field,
            });
        }

        let name = &part[..open];
        if name.is_empty() {
            return Err(ZiError::validation(format!(
                "path segment '{part}' has no field name before its bracket"
            )));
        }
        let content = &part[open + 1..part.len() - 1];
        let numeric = !content.is_empty() && content.bytes().all(|b| b.is_ascii_digit());
        let access = if numeric {
            let index = content.parse::<usize>().map_err(|e| {
                ZiError::validation(format!("array index '{content}' is out of range: {e}"))
            })?;
            ZiPathAccess::Index(index)
        } else {
            ZiPathAccess::Key(content.to_string())
        };

        Ok(Self {
            name: name.to_string(),
            access,
        })
    }
}

impl fmt::Display for ZiPathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.access {
            ZiPathAccess::Field => write!(f, "{}", self.name),
            ZiPathAccess::Index(index) => write!(f, "{}[{}]", self.name, index),
            ZiPathAccess::Key(key) => write!(f, "{}[{}]", self.name, key),
        }
    }
}

/// Parsed output path.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ZiFieldPath {
    segments: Vec<ZiPathSegment>,
}

impl ZiFieldPath {
    /// Parses a dotted path with optional bracket suffixes.
    pub fn parse(path: &str) -> Result<Self> {
        let segments = split_segments(path)
            .iter()
            .map(|part| ZiPathSegment::parse(part))
            .collect::<Result<Vec<_>>>()?;

        if segments.is_empty() {
            return Err(ZiError::validation("field path may not be empty"));
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[ZiPathSegment] {
        &self.segments
    }

    /// Looks up the value addressed by this path, or `None` when any segment
    /// is missing or crosses a non-container.
    pub fn resolve<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        let mut current = root;
        for segment in &self.segments {
            let next = current.as_object()?.get(&segment.name)?;
            current = match &segment.access {
                ZiPathAccess::Field => next,
                ZiPathAccess::Index(index) => next.as_array()?.get(*index)?,
                ZiPathAccess::Key(key) => next.as_object()?.get(key)?,
            };
        }
        Some(current)
    }

    /// Writes `value` at this path, creating intermediate records and arrays.
    ///
    /// Intermediate non-record values are replaced by empty records. Arrays
    /// grow to fit the requested index, padding with empty records.
    pub fn set_value(&self, root: &mut Map<String, Value>, value: Value) {
        let Some((last, parents)) = self.segments.split_last() else {
            return;
        };

        let mut current = root;
        for segment in parents {
            current = descend(current, segment);
        }

        match &last.access {
            ZiPathAccess::Field => {
                current.insert(last.name.clone(), value);
            }
            ZiPathAccess::Index(index) => {
                let items = array_slot(current, &last.name);
                pad_to(items, *index);
                items[*index] = value;
            }
            ZiPathAccess::Key(key) => {
                let map = object_slot(current, &last.name);
                map.insert(key.clone(), value);
            }
        }
    }

    /// Returns the record at this path, creating it (and its parents) when
    /// missing or when the current value is not a record.
    pub fn ensure_object<'a>(&self, root: &'a mut Map<String, Value>) -> &'a mut Map<String, Value> {
        let mut current = root;
        for segment in &self.segments {
            current = descend(current, segment);
        }
        current
    }
}

impl fmt::Display for ZiFieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

/// Splits a path on dots that sit outside brackets. Empty parts are skipped.
pub fn split_segments(path: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    for c in path.chars() {
        match c {
            '[' => {
                depth += 1;
                current.push(c);
            }
            ']' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            '.' if depth == 0 => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }

    parts
}

fn descend<'a>(current: &'a mut Map<String, Value>, segment: &ZiPathSegment) -> &'a mut Map<String, Value> {
    match &segment.access {
        ZiPathAccess::Field => object_slot(current, &segment.name),
        ZiPathAccess::Index(index) => {
            let items = array_slot(current, &segment.name);
            pad_to(items, *index);
            if !items[*index].is_object() {
                items[*index] = Value::Object(Map::new());
            }
            match &mut items[*index] {
                Value::Object(map) => map,
                _ => unreachable!("slot was just replaced by an object"),
            }
        }
        ZiPathAccess::Key(key) => {
            let map = object_slot(current, &segment.name);
            object_slot(map, key)
        }
    }
}

fn object_slot<'a>(map: &'a mut Map<String, Value>, name: &str) -> &'a mut Map<String, Value> {
    let slot = map
        .entry(name.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(inner) => inner,
        _ => unreachable!("slot was just replaced by an object"),
    }
}

fn array_slot<'a>(map: &'a mut Map<String, Value>, name: &str) -> &'a mut Vec<Value> {
    let slot = map
        .entry(name.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if !slot.is_array() {
        *slot = Value::Array(Vec::new());
    }
    match slot {
        Value::Array(items) => items,
        _ => unreachable!("slot was just replaced by an array"),
    }
}

fn pad_to(items: &mut Vec<Value>, index: usize) {
    while items.len() <= index {
        items.push(Value::Object(Map::new()));
    }
}
