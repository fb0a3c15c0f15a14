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

//! # Zidef CUE Generator Module
//!
//! Renders expressions, pipelines, helpers and field trees as CUE source
//! text. The generator is a pure function of its input: it never evaluates
//! parameters and never validates domain rules.
//!
//! ## Pipeline Forms
//!
//! | Operation | CUE |
//! |-----------|-----|
//! | pass / filter | `[for v in S if P { v }]` |
//! | map / pick / rename / default | `[for v in S { ...fields }]` |
//! | wrap | `[for v in S { key: v }]` |
//! | flatten | `list.FlattenN(S, 1)` |
//! | dedupe | nested self-join with an `_ignore` marker |
//!
//! Consecutive filters fuse into the `for` clause of the next projecting
//! stage. A pipeline guard becomes a leading `if GUARD` clause.
//!
//! ## Field Trees
//!
//! Within each record: spreads, then the for-each copy, then unconditional
//! fields in insertion order, then one `if GUARD { ... }` block per distinct
//! guard in order of first appearance. Several writes to one field are
//! emitted under mutually exclusive guards so the last applicable write wins.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::errors::{Result, ZiError};
use crate::expr::{
    parse_format_template, ZiAffix, ZiArithOp, ZiCondition, ZiFieldMap, ZiFieldValue, ZiFormatPiece, ZiFunction,
    ZiParamCapability, ZiParamRef, ZiStringPredicate, ZiValue,
};
use crate::helper::ZiHelperRegistry;
use crate::interpreter::{check_call_arity, DEFAULT_ITEM_VAR};
use crate::path::{ZiFieldPath, ZiPathAccess};
use crate::pipeline::{check_format_arity, ZiCollection, ZiCollectionOp, ZiMultiSource};
use crate::tree::{ZiChildKey, ZiFieldNode, ZiFieldTree, ZiPatchKey};

#[derive(Clone, Debug)]
pub struct ZiGeneratorConfig {
    pub indent: String,
    /// Iteration variable bound by generated comprehensions.
    pub item_var: String,
    /// Prepend an `import (...)` block to full templates.
    pub emit_imports: bool,
}

impl Default for ZiGeneratorConfig {
    fn default() -> Self {
        Self {
            indent: "\t".to_string(),
            item_var: DEFAULT_ITEM_VAR.to_string(),
            emit_imports: true,
        }
    }
}

impl ZiGeneratorConfig {
    pub fn indent(mut self, indent: impl Into<String>) -> Self {
        self.indent = indent.into();
        self
    }

    pub fn item_var(mut self, name: impl Into<String>) -> Self {
        self.item_var = name.into();
        self
    }

    pub fn emit_imports(mut self, emit: bool) -> Self {
        self.emit_imports = emit;
        self
    }
}

/// Whether `name` can be written as a bare CUE label.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// CUE label for a field name, quoted when it is not an identifier.
pub fn cue_label(name: &str) -> String {
    if is_identifier(name) {
        name.to_string()
    } else {
        quote(name)
    }
}

fn quote(text: &str) -> String {
    Value::String(text.to_string()).to_string()
}

/// Escaped string body without the surrounding quotes.
fn escape(text: &str) -> String {
    let quoted = quote(text);
    quoted[1..quoted.len() - 1].to_string()
}

fn selector(base: &str, name: &str) -> String {
    if is_identifier(name) {
        format!("{base}.{name}")
    } else {
        format!("{base}[{}]", quote(name))
    }
}

fn literal(value: &Value) -> String {
    value.to_string()
}

enum ZiStage<'a> {
    Source(&'a ZiValue),
    Comprehension {
        input: Box<ZiStage<'a>>,
        filters: Vec<&'a ZiCondition>,
        body: ZiStageBody<'a>,
    },
    Flatten(Box<ZiStage<'a>>),
    Dedupe(Box<ZiStage<'a>>, &'a str),
}

enum ZiStageBody<'a> {
    Item,
    Wrap(&'a str),
    Map(&'a ZiFieldMap),
    Pick(&'a [String]),
    Rename(&'a str, &'a str),
    Default(&'a str, &'a ZiFieldValue),
}

impl<'a> ZiStage<'a> {
    /// Groups filters with the projecting stage that follows them.
    fn plan(collection: &'a ZiCollection) -> Self {
        let mut stage = ZiStage::Source(collection.source());
        let mut filters: Vec<&'a ZiCondition> = Vec::new();

        for op in collection.ops() {
            let body = match op {
                ZiCollectionOp::Filter(predicate) => {
                    filters.push(predicate);
                    continue;
                }
                ZiCollectionOp::Map(mapping) => ZiStageBody::Map(mapping),
                ZiCollectionOp::Pick(fields) => ZiStageBody::Pick(fields),
                ZiCollectionOp::Rename { from, to } => ZiStageBody::Rename(from, to),
                ZiCollectionOp::Wrap(key) => ZiStageBody::Wrap(key),
                ZiCollectionOp::DefaultField { field, fallback } => ZiStageBody::Default(field, fallback),
                ZiCollectionOp::Dedupe(key) => {
                    stage = ZiStage::Dedupe(Box::new(Self::flush(stage, &mut filters)), key);
                    continue;
                }
                ZiCollectionOp::Flatten => {
                    stage = ZiStage::Flatten(Box::new(Self::flush(stage, &mut filters)));
                    continue;
                }
            };
            stage = ZiStage::Comprehension {
                input: Box::new(stage),
                filters: std::mem::take(&mut filters),
                body,
            };
        }

        if !filters.is_empty() || matches!(stage, ZiStage::Source(_)) {
            stage = ZiStage::Comprehension {
                input: Box::new(stage),
                filters,
                body: ZiStageBody::Item,
            };
        }
        stage
    }

    fn flush(stage: Self, filters: &mut Vec<&'a ZiCondition>) -> Self {
        if filters.is_empty() {
            stage
        } else {
            ZiStage::Comprehension {
                input: Box::new(stage),
                filters: std::mem::take(filters),
                body: ZiStageBody::Item,
            }
        }
    }
}

struct ZiEntry<'t> {
    labels: Vec<String>,
    guard: Option<ZiCondition>,
    body: ZiEntryBody<'t>,
}

enum ZiEntryBody<'t> {
    Value(&'t ZiValue),
    Record(&'t ZiFieldNode),
    List(&'t ZiFieldNode),
    PatchKey(&'t ZiPatchKey),
}

/// CUE text generator.
#[derive(Clone, Debug, Default)]
pub struct ZiCueGenerator<'r> {
    config: ZiGeneratorConfig,
    helpers: Option<&'r ZiHelperRegistry>,
}

impl<'r> ZiCueGenerator<'r> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: ZiGeneratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Binds the registry helper references resolve against.
    pub fn with_helpers(mut self, helpers: &'r ZiHelperRegistry) -> Self {
        self.helpers = Some(helpers);
        self
    }

    pub fn config(&self) -> &ZiGeneratorConfig {
        &self.config
    }

    pub fn generate_value(&self, value: &ZiValue) -> Result<String> {
        self.value_at(value, 0)
    }

    pub fn generate_condition(&self, condition: &ZiCondition) -> Result<String> {
        self.condition_at(condition, 0)
    }

    pub fn generate_collection(&self, collection: &ZiCollection) -> Result<String> {
        self.collection_at(collection, 0)
    }

    pub fn generate_multi_source(&self, multi: &ZiMultiSource) -> Result<String> {
        self.multi_source_at(multi, 0)
    }

    /// Fields of the tree root, without surrounding braces.
    pub fn generate_tree(&self, tree: &ZiFieldTree) -> Result<String> {
        let mut out = String::new();
        self.write_record(tree.root(), 0, &mut out)?;
        Ok(out)
    }

    /// `label: { ...tree... }`
    pub fn generate_block(&self, label: &str, tree: &ZiFieldTree) -> Result<String> {
        let mut out = format!("{}: {{\n", cue_label(label));
        self.write_record(tree.root(), 1, &mut out)?;
        out.push_str("}\n");
        Ok(out)
    }

    /// Helper definitions placed before (`after_output == false`) or after
    /// the output block, in registration order.
    pub fn generate_helpers(&self, after_output: bool) -> Result<String> {
        let Some(registry) = self.helpers else {
            return Ok(String::new());
        };
        let mut out = String::new();
        for helper in registry.helpers().iter().filter(|h| h.after_output() == after_output) {
            if !is_identifier(helper.name()) {
                return Err(ZiError::validation(format!(
                    "helper name '{}' is not a valid CUE identifier",
                    helper.name()
                )));
            }
            log::debug!("generating helper '{}'", helper.name());
            let value = self
                .value_at(helper.value(), 0)
                .map_err(|e| ZiError::pipeline(helper.name(), e.to_string()))?;
            out.push_str(&format!("{}: {}\n", helper.name(), value));
        }
        Ok(out)
    }

    /// Imports, leading helpers, the output block and trailing helpers.
    pub fn generate_template(&self, label: &str, tree: &ZiFieldTree) -> Result<String> {
        let mut out = String::new();
        if self.config.emit_imports {
            let imports = self.required_imports(tree);
            if !imports.is_empty() {
                out.push_str(&self.import_block(&imports));
                out.push('\n');
            }
        }
        out.push_str(&self.generate_helpers(false)?);
        out.push_str(&self.generate_block(label, tree)?);
        out.push_str(&self.generate_helpers(true)?);
        log::debug!("generated template '{}' ({} bytes)", label, out.len());
        Ok(out)
    }

    /// Standard-library packages the tree and bound helpers refer to, sorted.
    pub fn required_imports(&self, tree: &ZiFieldTree) -> Vec<&'static str> {
        let mut imports = BTreeSet::new();
        node_imports(tree.root(), &mut imports);
        if let Some(registry) = self.helpers {
            for helper in registry.helpers() {
                value_imports(helper.value(), &mut imports);
            }
        }
        imports.into_iter().collect()
    }

    pub fn required_imports_value(&self, value: &ZiValue) -> Vec<&'static str> {
        let mut imports = BTreeSet::new();
        value_imports(value, &mut imports);
        imports.into_iter().collect()
    }

    pub fn import_block(&self, imports: &[&str]) -> String {
        let mut out = String::from("import (\n");
        for import in imports {
            out.push_str(&format!("{}{}\n", self.config.indent, quote(import)));
        }
        out.push_str(")\n");
        out
    }

    fn pad(&self, depth: usize) -> String {
        self.config.indent.repeat(depth)
    }

    fn item(&self) -> &str {
        &self.config.item_var
    }

    fn param_path(&self, param: &ZiParamRef) -> String {
        selector("parameter", param.name())
    }

    fn value_at(&self, value: &ZiValue, depth: usize) -> Result<String> {
        match value {
            ZiValue::Literal(value) => Ok(literal(value)),
            ZiValue::Param(param) => Ok(self.param_path(param)),
            ZiValue::ParamField { param, path } => {
                let mut out = self.param_path(param);
                for segment in ZiFieldPath::parse(path)?.segments() {
                    out = selector(&out, &segment.name);
                    match &segment.access {
                        ZiPathAccess::Field => {}
                        ZiPathAccess::Index(index) => out.push_str(&format!("[{index}]")),
                        ZiPathAccess::Key(key) => out.push_str(&format!("[{}]", quote(key))),
                    }
                }
                Ok(out)
            }
            ZiValue::Arith { param, op, operand } => {
                let left = self.param_path(param);
                let right = literal(operand);
                Ok(match op {
                    ZiArithOp::Mod => format!("mod({left}, {right})"),
                    _ => format!("{left} {} {right}", op.symbol()),
                })
            }
            ZiValue::Concat { param, affix } => {
                let path = self.param_path(param);
                Ok(match affix {
                    ZiAffix::Prefix(prefix) => format!("{} + {path}", quote(prefix)),
                    ZiAffix::Suffix(suffix) => format!("{path} + {}", quote(suffix)),
                })
            }
            ZiValue::Interpolation(parts) => {
                let mut out = String::from("\"");
                for part in parts {
                    match part {
                        ZiValue::Literal(Value::String(text)) => out.push_str(&escape(text)),
                        other => {
                            out.push_str("\\(");
                            out.push_str(&self.value_at(other, depth)?);
                            out.push(')');
                        }
                    }
                }
                out.push('"');
                Ok(out)
            }
            ZiValue::Call(function, args) => self.call_at(*function, args, depth),
            ZiValue::Context(field) => Ok(format!("context.{}", field.key())),
            ZiValue::ItemField(name) => Ok(selector(self.item(), name)),
            ZiValue::Collection(collection) => self.collection_at(collection, depth),
            ZiValue::MultiSource(multi) => self.multi_source_at(multi, depth),
            ZiValue::Helper(reference) => {
                let registry = self.helpers.ok_or_else(|| {
                    ZiError::pipeline(reference.name(), "no helper registry bound to the generator")
                })?;
                Ok(registry.get(reference)?.name().to_string())
            }
            ZiValue::Struct(fields) => {
                if fields.is_empty() {
                    return Ok("{}".to_string());
                }
                let pad = self.pad(depth + 1);
                let mut out = String::from("{\n");
                for field in fields {
                    let label = cue_label(&field.name);
                    let value = self.value_at(&field.value, depth + 1)?;
                    match &field.guard {
                        Some(guard) => out.push_str(&format!(
                            "{pad}if {} {{ {label}: {value} }}\n",
                            self.condition_at(guard, depth + 1)?
                        )),
                        None => out.push_str(&format!("{pad}{label}: {value}\n")),
                    }
                }
                out.push_str(&self.pad(depth));
                out.push('}');
                Ok(out)
            }
        }
    }

    fn call_at(&self, function: ZiFunction, args: &[ZiValue], depth: usize) -> Result<String> {
        check_call_arity(function, args.len())?;
        let rendered = args
            .iter()
            .map(|arg| self.value_at(arg, depth))
            .collect::<Result<Vec<_>>>()?;
        let name = format!("{}.{}", function.package(), function.function());
        Ok(match function {
            ZiFunction::ListConcat => format!("{name}([{}])", rendered.join(", ")),
            ZiFunction::FormatInt if rendered.len() == 1 => format!("{name}({}, 10)", rendered[0]),
            _ => format!("{name}({})", rendered.join(", ")),
        })
    }

    fn condition_at(&self, condition: &ZiCondition, depth: usize) -> Result<String> {
        Ok(match condition {
            ZiCondition::IsSet(value) => format!("{} != _|_", self.value_at(value, depth)?),
            ZiCondition::NotSet(value) => format!("{} == _|_", self.value_at(value, depth)?),
            ZiCondition::Compare { subject, op, operand } => format!(
                "{} {} {}",
                self.value_at(subject, depth)?,
                op.symbol(),
                self.value_at(operand, depth)?
            ),
            ZiCondition::Str { subject, predicate } => {
                let subject = self.value_at(subject, depth)?;
                match predicate {
                    ZiStringPredicate::Contains(needle) => format!("strings.Contains({subject}, {})", quote(needle)),
                    ZiStringPredicate::Matches(pattern) => format!("{subject} =~ {}", quote(pattern)),
                    ZiStringPredicate::HasPrefix(prefix) => format!("strings.HasPrefix({subject}, {})", quote(prefix)),
                    ZiStringPredicate::HasSuffix(suffix) => format!("strings.HasSuffix({subject}, {})", quote(suffix)),
                    ZiStringPredicate::Length(op, length) => format!("len({subject}) {} {length}", op.symbol()),
                }
            }
            ZiCondition::Truthy(value) => self.value_at(value, depth)?,
            ZiCondition::Falsy(value) => format!("!{}", self.value_at(value, depth)?),
            ZiCondition::In { subject, values } => {
                if values.is_empty() {
                    return Ok("false".to_string());
                }
                let subject = self.value_at(subject, depth)?;
                values
                    .iter()
                    .map(|value| format!("{subject} == {}", literal(value)))
                    .collect::<Vec<_>>()
                    .join(" || ")
            }
            ZiCondition::And(conditions) => self.logical_at(conditions, " && ", "true", depth)?,
            ZiCondition::Or(conditions) => self.logical_at(conditions, " || ", "false", depth)?,
            ZiCondition::Not(inner) => format!("!({})", self.condition_at(inner, depth)?),
            ZiCondition::LenZero(value) => format!("len({}) == 0", self.value_at(value, depth)?),
            ZiCondition::LenNotZero(value) => format!("len({}) != 0", self.value_at(value, depth)?),
            ZiCondition::IterFieldExists { var, field } => format!("{} != _|_", selector(var, field)),
            ZiCondition::IterFieldAbsent { var, field } => format!("{} == _|_", selector(var, field)),
        })
    }

    fn logical_at(&self, conditions: &[ZiCondition], joiner: &str, empty: &str, depth: usize) -> Result<String> {
        if conditions.is_empty() {
            return Ok(empty.to_string());
        }
        let parts = conditions
            .iter()
            .map(|c| self.condition_at(c, depth).map(|text| format!("({text})")))
            .collect::<Result<Vec<_>>>()?;
        Ok(parts.join(joiner))
    }

    fn collection_at(&self, collection: &ZiCollection, depth: usize) -> Result<String> {
        let stage = ZiStage::plan(collection);
        let guard = collection
            .guard_condition()
            .map(|guard| self.condition_at(guard, depth + 1))
            .transpose()?;
        self.stage_at(&stage, depth, guard.as_deref())
    }

    fn guarded(&self, expr: String, guard: Option<&str>) -> String {
        match guard {
            Some(guard) => {
                let var = self.item();
                format!("[if {guard} for {var} in {expr} {{ {var} }}]")
            }
            None => expr,
        }
    }

    fn stage_at(&self, stage: &ZiStage<'_>, depth: usize, guard: Option<&str>) -> Result<String> {
        match stage {
            ZiStage::Source(value) => {
                let source = self.value_at(value, depth)?;
                Ok(self.guarded(source, guard))
            }
            ZiStage::Comprehension { input, filters, body } => {
                let var = self.item();
                let source = self.stage_at(input, depth + 1, None)?;
                let mut head = String::new();
                if let Some(guard) = guard {
                    head.push_str(&format!("if {guard} "));
                }
                head.push_str(&format!("for {var} in {source}"));
                for filter in filters {
                    head.push_str(&format!(" if {}", self.condition_at(filter, depth + 1)?));
                }
                match body {
                    ZiStageBody::Item => Ok(format!("[{head} {{ {var} }}]")),
                    ZiStageBody::Wrap(key) => Ok(format!("[{head} {{ {}: {var} }}]", cue_label(key))),
                    _ => {
                        let lines = self.body_lines(body, depth + 2)?;
                        let pad = self.pad(depth + 1);
                        Ok(format!("[\n{pad}{head} {{\n{lines}{pad}}},\n{}]", self.pad(depth)))
                    }
                }
            }
            ZiStage::Flatten(input) => {
                let inner = self.stage_at(input, depth, None)?;
                Ok(self.guarded(format!("list.FlattenN({inner}, 1)"), guard))
            }
            ZiStage::Dedupe(input, key) => {
                let inner = self.stage_at(input, depth + 2, None)?;
                Ok(self.guarded(self.dedupe_at(&inner, key, depth), guard))
            }
        }
    }

    fn body_lines(&self, body: &ZiStageBody<'_>, depth: usize) -> Result<String> {
        let pad = self.pad(depth);
        let var = self.item();
        Ok(match body {
            ZiStageBody::Item => format!("{pad}{var}\n"),
            ZiStageBody::Wrap(key) => format!("{pad}{}: {var}\n", cue_label(key)),
            ZiStageBody::Map(mapping) => self.field_map_lines(mapping, depth)?,
            ZiStageBody::Pick(fields) => self.pick_lines(fields, depth),
            ZiStageBody::Rename(from, to) => {
                let from_sel = selector(var, from);
                let to_sel = selector(var, to);
                let to_label = cue_label(to);
                format!(
                    "{pad}for k, x in {var} if k != {} && k != {} {{ (k): x }}\n\
                     {pad}if {from_sel} != _|_ {{ {to_label}: {from_sel} }}\n\
                     {pad}if {from_sel} == _|_ if {to_sel} != _|_ {{ {to_label}: {to_sel} }}\n",
                    quote(from),
                    quote(to)
                )
            }
            ZiStageBody::Default(field, fallback) => {
                let sel = selector(var, field);
                let chosen = self.first_present(&sel, fallback, depth)?;
                format!(
                    "{pad}for k, x in {var} if k != {} {{ (k): x }}\n\
                     {pad}{}: {chosen}\n",
                    quote(field),
                    cue_label(field)
                )
            }
        })
    }

    fn pick_lines(&self, fields: &[String], depth: usize) -> String {
        let pad = self.pad(depth);
        fields
            .iter()
            .map(|field| {
                let sel = selector(self.item(), field);
                format!("{pad}if {sel} != _|_ {{ {}: {sel} }}\n", cue_label(field))
            })
            .collect()
    }

    fn field_map_lines(&self, mapping: &ZiFieldMap, depth: usize) -> Result<String> {
        let pad = self.pad(depth);
        let mut out = String::new();
        for (name, field_value) in mapping.iter() {
            let labels = name.split('.').map(cue_label).collect::<Vec<_>>().join(": ");
            match field_value {
                ZiFieldValue::Optional(source) => {
                    let sel = selector(self.item(), source);
                    out.push_str(&format!(
                        "{pad}if {sel} != _|_ {{\n{}{labels}: {sel}\n{pad}}}\n",
                        self.pad(depth + 1)
                    ));
                }
                ZiFieldValue::Nested(inner) => {
                    out.push_str(&format!("{pad}{labels}: {{\n"));
                    out.push_str(&self.field_map_lines(inner, depth + 1)?);
                    out.push_str(&format!("{pad}}}\n"));
                }
                other => {
                    out.push_str(&format!("{pad}{labels}: {}\n", self.field_value_at(other, depth)?));
                }
            }
        }
        Ok(out)
    }

    fn field_value_at(&self, field_value: &ZiFieldValue, depth: usize) -> Result<String> {
        match field_value {
            ZiFieldValue::Field(name) | ZiFieldValue::Optional(name) => Ok(selector(self.item(), name)),
            ZiFieldValue::Literal(value) => Ok(literal(value)),
            ZiFieldValue::Or { primary, fallback } => {
                let primary = self.field_value_at(primary, depth)?;
                self.first_present(&primary, fallback, depth)
            }
            ZiFieldValue::Format { template, args } => {
                check_format_arity(template, args.len())?;
                let mut args = args.iter();
                let mut out = String::from("\"");
                for piece in parse_format_template(template) {
                    match piece {
                        ZiFormatPiece::Text(text) => out.push_str(&escape(&text)),
                        ZiFormatPiece::Arg => {
                            if let Some(arg) = args.next() {
                                out.push_str(&format!("\\({})", self.field_value_at(arg, depth)?));
                            }
                        }
                    }
                }
                out.push('"');
                Ok(out)
            }
            ZiFieldValue::Nested(mapping) => Ok(format!(
                "{{\n{}{}}}",
                self.field_map_lines(mapping, depth + 1)?,
                self.pad(depth)
            )),
        }
    }

    /// `primary` unless it is absent, null or the empty string. The string
    /// comparison is only valid against strings, so a fallback that is not
    /// string-valued gets a kind check first.
    fn first_present(&self, primary: &str, fallback: &ZiFieldValue, depth: usize) -> Result<String> {
        let f = self.field_value_at(fallback, depth)?;
        let p = primary;
        if is_string_valued(fallback) {
            return Ok(format!("[if {p} != _|_ if {p} != null if {p} != \"\" {{ {p} }}, {f}][0]"));
        }
        Ok(format!(
            "[if {p} != _|_ if {p} != null if ({p} & string) == _|_ {{ {p} }}, \
             if ({p} & string) != _|_ if {p} != \"\" {{ {p} }}, {f}][0]"
        ))
    }

    fn multi_source_at(&self, multi: &ZiMultiSource, depth: usize) -> Result<String> {
        let deduped = multi.dedupe_keys().next().is_some();
        let base = if deduped { depth + 2 } else { depth };
        let var = self.item();
        let parent = self.value_at(multi.parent(), base + 1)?;
        let guard = multi
            .guard_condition()
            .map(|guard| self.condition_at(guard, base + 1))
            .transpose()?;
        let pad = self.pad(base + 1);
        let inner_pad = self.pad(base + 2);

        let mut out = String::from("[\n");
        for source in multi.sources() {
            let src = selector(&parent, source);
            out.push_str(&pad);
            if let Some(guard) = &guard {
                out.push_str(&format!("if {guard} "));
            }
            out.push_str(&format!("if {parent} != _|_ && {src} != _|_ for {var} in {src} {{\n"));

            if let Some(mapping) = multi.mapping_for(source) {
                out.push_str(&self.field_map_lines(mapping, base + 2)?);
            } else if let Some(fields) = multi.active_pick() {
                out.push_str(&self.pick_lines(fields, base + 2));
            } else {
                out.push_str(&format!("{inner_pad}{var}\n"));
            }
            for (field, condition) in multi.pick_ifs() {
                out.push_str(&format!(
                    "{inner_pad}if {} {{ {}: {} }}\n",
                    self.condition_at(condition, base + 2)?,
                    cue_label(field),
                    selector(var, field)
                ));
            }
            out.push_str(&format!("{pad}}},\n"));
        }
        out.push_str(&self.pad(base));
        out.push(']');

        for key in multi.dedupe_keys() {
            out = self.dedupe_at(&out, key, depth);
        }
        Ok(out)
    }

    fn dedupe_at(&self, source: &str, key: &str, depth: usize) -> String {
        let [p0, p1, p2, p3, p4] = [0, 1, 2, 3, 4].map(|offset| self.pad(depth + offset));
        let left = selector("vi", key);
        let right = selector("vj", key);
        format!(
            "[\n\
             {p1}for val in [\n\
             {p2}for i, vi in {source} {{\n\
             {p3}for j, vj in {source} if j < i if {left} != _|_ if {right} != _|_ if {left} == {right} {{\n\
             {p4}_ignore: true\n\
             {p3}}}\n\
             {p3}for j, vj in {source} if j < i if {left} == _|_ if {right} == _|_ {{\n\
             {p4}_ignore: true\n\
             {p3}}}\n\
             {p3}vi\n\
             {p2}}},\n\
             {p1}] if val._ignore == _|_ {{\n\
             {p2}val\n\
             {p1}}},\n\
             {p0}]"
        )
    }

    fn collect_entries<'t>(&self, label: String, node: &'t ZiFieldNode, out: &mut Vec<ZiEntry<'t>>) {
        if node.is_plain() && node.children().len() == 1 {
            if let Some((key, child)) = node.children().iter().next() {
                let child_label = match key {
                    ZiChildKey::Field(name) => Some(cue_label(name)),
                    ZiChildKey::MapKey(key) => Some(quote(key)),
                    ZiChildKey::Index(_) => None,
                };
                if let Some(child_label) = child_label {
                    let mut inner = Vec::new();
                    self.collect_entries(child_label, child, &mut inner);
                    for mut entry in inner {
                        entry.labels.insert(0, label.clone());
                        out.push(entry);
                    }
                    return;
                }
            }
        }

        for write in node.last_writes() {
            out.push(ZiEntry {
                labels: vec![label.clone()],
                guard: write.guard,
                body: ZiEntryBody::Value(write.value),
            });
        }
        if node.is_array() {
            out.push(ZiEntry {
                labels: vec![label.clone()],
                guard: None,
                body: ZiEntryBody::List(node),
            });
        } else if !node.children().is_empty() || !node.spreads().is_empty() || node.for_each().is_some() {
            out.push(ZiEntry {
                labels: vec![label.clone()],
                guard: None,
                body: ZiEntryBody::Record(node),
            });
        }
        if let Some(patch) = node.patch_key() {
            out.push(ZiEntry {
                labels: vec![label],
                guard: patch.guard.clone(),
                body: ZiEntryBody::PatchKey(patch),
            });
        }
    }

    fn write_record(&self, node: &ZiFieldNode, depth: usize, out: &mut String) -> Result<()> {
        let pad = self.pad(depth);

        for spread in node.spreads() {
            match &spread.guard {
                Some(guard) => {
                    out.push_str(&format!("{pad}if {} {{\n", self.condition_at(guard, depth)?));
                    out.push_str(&format!(
                        "{}{}\n",
                        self.pad(depth + 1),
                        self.value_at(&spread.value, depth + 1)?
                    ));
                    out.push_str(&format!("{pad}}}\n"));
                }
                None => out.push_str(&format!("{pad}{}\n", self.value_at(&spread.value, depth)?)),
            }
        }

        if let Some(for_each) = node.for_each() {
            out.push_str(&pad);
            if let Some(guard) = &for_each.guard {
                out.push_str(&format!("if {} ", self.condition_at(guard, depth)?));
            }
            out.push_str(&format!(
                "for k, v in {} {{ (k): v }}\n",
                self.value_at(&for_each.value, depth)?
            ));
        }

        let mut entries = Vec::new();
        for (key, child) in node.children() {
            let label = match key {
                ZiChildKey::Field(name) => cue_label(name),
                ZiChildKey::MapKey(key) => quote(key),
                ZiChildKey::Index(index) => {
                    return Err(ZiError::validation(format!(
                        "index [{index}] used on a field that is not a list"
                    )))
                }
            };
            self.collect_entries(label, child, &mut entries);
        }

        for entry in entries.iter().filter(|entry| entry.guard.is_none()) {
            self.write_entry(entry, depth, out)?;
        }

        let mut groups: Vec<(String, &ZiCondition, Vec<&ZiEntry<'_>>)> = Vec::new();
        for entry in &entries {
            let Some(guard) = &entry.guard else {
                continue;
            };
            let key = self.condition_at(guard, 0)?;
            match groups.iter_mut().find(|(existing, _, _)| *existing == key) {
                Some((_, _, members)) => members.push(entry),
                None => groups.push((key, guard, vec![entry])),
            }
        }
        for (_, guard, members) in groups {
            out.push_str(&format!("{pad}if {} {{\n", self.condition_at(guard, depth)?));
            for entry in members {
                self.write_entry(entry, depth + 1, out)?;
            }
            out.push_str(&format!("{pad}}}\n"));
        }
        Ok(())
    }

    fn write_entry(&self, entry: &ZiEntry<'_>, depth: usize, out: &mut String) -> Result<()> {
        let pad = self.pad(depth);
        let labels = entry.labels.join(": ");
        match entry.body {
            ZiEntryBody::Value(value) => {
                out.push_str(&format!("{pad}{labels}: {}\n", self.value_at(value, depth)?));
            }
            ZiEntryBody::Record(node) => {
                out.push_str(&format!("{pad}{labels}: {{\n"));
                self.write_record(node, depth + 1, out)?;
                out.push_str(&format!("{pad}}}\n"));
            }
            ZiEntryBody::List(node) => {
                out.push_str(&format!("{pad}{labels}: {}\n", self.list_at(node, depth)?));
            }
            ZiEntryBody::PatchKey(patch) => {
                let elements = patch
                    .elements
                    .iter()
                    .map(|element| self.value_at(element, depth + 1))
                    .collect::<Result<Vec<_>>>()?;
                out.push_str(&format!("{pad}// +patchKey={}\n", patch.key));
                if elements.iter().any(|element| element.contains('\n')) {
                    out.push_str(&format!("{pad}{labels}: [\n"));
                    for element in elements {
                        out.push_str(&format!("{}{element},\n", self.pad(depth + 1)));
                    }
                    out.push_str(&format!("{pad}]\n"));
                } else {
                    out.push_str(&format!("{pad}{labels}: [{}]\n", elements.join(", ")));
                }
            }
        }
        Ok(())
    }

    fn list_at(&self, node: &ZiFieldNode, depth: usize) -> Result<String> {
        let mut last = None;
        for key in node.children().keys() {
            match key {
                ZiChildKey::Index(index) => last = last.max(Some(*index)),
                ZiChildKey::Field(name) | ZiChildKey::MapKey(name) => {
                    return Err(ZiError::validation(format!(
                        "list field mixes indexes with the named field '{name}'"
                    )))
                }
            }
        }
        let Some(last) = last else {
            return Ok("[]".to_string());
        };

        let pad = self.pad(depth + 1);
        let mut out = String::from("[\n");
        for index in 0..=last {
            out.push_str(&pad);
            match node.child(&ZiChildKey::Index(index)) {
                Some(element) => out.push_str(&self.element_at(element, depth + 1)?),
                None => out.push_str("{}"),
            }
            out.push_str(",\n");
        }
        out.push_str(&self.pad(depth));
        out.push(']');
        Ok(out)
    }

    fn element_at(&self, element: &ZiFieldNode, depth: usize) -> Result<String> {
        let bare = element.children().is_empty()
            && element.spreads().is_empty()
            && element.for_each().is_none()
            && element.patch_key().is_none();
        let writes = element.last_writes();
        if bare {
            match writes.as_slice() {
                [] => return Ok("{}".to_string()),
                [write] if write.guard.is_none() => return self.value_at(write.value, depth),
                _ => {}
            }
        }

        let pad = self.pad(depth + 1);
        let mut out = String::from("{\n");
        for write in &writes {
            let value = self.value_at(write.value, depth + 1)?;
            match &write.guard {
                Some(guard) => out.push_str(&format!(
                    "{pad}if {} {{ {value} }}\n",
                    self.condition_at(guard, depth + 1)?
                )),
                None => out.push_str(&format!("{pad}{value}\n")),
            }
        }
        self.write_record(element, depth + 1, &mut out)?;
        out.push_str(&self.pad(depth));
        out.push('}');
        Ok(out)
    }
}

fn is_string_valued(field_value: &ZiFieldValue) -> bool {
    match field_value {
        ZiFieldValue::Literal(Value::String(_)) | ZiFieldValue::Format { .. } => true,
        ZiFieldValue::Or { fallback, .. } => is_string_valued(fallback),
        _ => false,
    }
}

fn value_imports(value: &ZiValue, out: &mut BTreeSet<&'static str>) {
    match value {
        ZiValue::Literal(_)
        | ZiValue::Param(_)
        | ZiValue::ParamField { .. }
        | ZiValue::Arith { .. }
        | ZiValue::Concat { .. }
        | ZiValue::Context(_)
        | ZiValue::ItemField(_)
        | ZiValue::Helper(_) => {}
        ZiValue::Interpolation(parts) => parts.iter().for_each(|part| value_imports(part, out)),
        ZiValue::Call(function, args) => {
            out.insert(function.package());
            args.iter().for_each(|arg| value_imports(arg, out));
        }
        ZiValue::Collection(collection) => {
            value_imports(collection.source(), out);
            if let Some(guard) = collection.guard_condition() {
                condition_imports(guard, out);
            }
            for op in collection.ops() {
                match op {
                    ZiCollectionOp::Filter(predicate) => condition_imports(predicate, out),
                    ZiCollectionOp::Flatten => {
                        out.insert("list");
                    }
                    _ => {}
                }
            }
        }
        ZiValue::MultiSource(multi) => {
            value_imports(multi.parent(), out);
            if let Some(guard) = multi.guard_condition() {
                condition_imports(guard, out);
            }
            for (_, condition) in multi.pick_ifs() {
                condition_imports(condition, out);
            }
        }
        ZiValue::Struct(fields) => {
            for field in fields {
                value_imports(&field.value, out);
                if let Some(guard) = &field.guard {
                    condition_imports(guard, out);
                }
            }
        }
    }
}

fn condition_imports(condition: &ZiCondition, out: &mut BTreeSet<&'static str>) {
    match condition {
        ZiCondition::IsSet(value)
        | ZiCondition::NotSet(value)
        | ZiCondition::Truthy(value)
        | ZiCondition::Falsy(value)
        | ZiCondition::LenZero(value)
        | ZiCondition::LenNotZero(value)
        | ZiCondition::In { subject: value, .. } => value_imports(value, out),
        ZiCondition::Compare { subject, operand, .. } => {
            value_imports(subject, out);
            value_imports(operand, out);
        }
        ZiCondition::Str { subject, predicate } => {
            if matches!(
                predicate,
                ZiStringPredicate::Contains(_) | ZiStringPredicate::HasPrefix(_) | ZiStringPredicate::HasSuffix(_)
            ) {
                out.insert("strings");
            }
            value_imports(subject, out);
        }
        ZiCondition::And(conditions) | ZiCondition::Or(conditions) => {
            conditions.iter().for_each(|c| condition_imports(c, out));
        }
        ZiCondition::Not(inner) => condition_imports(inner, out),
        ZiCondition::IterFieldExists { .. } | ZiCondition::IterFieldAbsent { .. } => {}
    }
}

fn node_imports(node: &ZiFieldNode, out: &mut BTreeSet<&'static str>) {
    let guarded = node.values().iter().chain(node.spreads()).chain(node.for_each());
    for slot in guarded {
        value_imports(&slot.value, out);
        if let Some(guard) = &slot.guard {
            condition_imports(guard, out);
        }
    }
    if let Some(patch) = node.patch_key() {
        patch.elements.iter().for_each(|element| value_imports(element, out));
        if let Some(guard) = &patch.guard {
            condition_imports(guard, out);
        }
    }
    for child in node.children().values() {
        node_imports(child, out);
    }
}
