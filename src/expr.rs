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

//! # Zidef Expression Module
//!
//! The closed node sets consumed by both backends:
//!
//! - [`ZiValue`]: anything that produces data (literals, parameters,
//!   arithmetic, pipelines, helper references, struct literals)
//! - [`ZiCondition`]: boolean guards and filter predicates
//! - [`ZiFieldValue`]: per-element values used while mapping one record
//!
//! Nodes are pure data. Every kind is matched exhaustively by the interpreter
//! and by the CUE generator; `kind()` names each variant and the `KINDS`
//! tables list them all so tests can walk every kind through both backends.
//!
//! ## Example
//!
//! ```rust
//! use serde_json::json;
//! use zidef::expr::{ZiCondition, ZiFieldMap, ZiFieldValue, ZiParamRef};
//! use zidef::pipeline::ZiCollection;
//!
//! let ports = ZiParamRef::new("ports");
//! let exposed = ZiCollection::from(ports.value())
//!     .filter(ZiCondition::field_equals("expose", json!(true)))
//!     .map(ZiFieldMap::new()
//!         .field("port", ZiFieldValue::field("port"))
//!         .field("name", ZiFieldValue::field("name")));
//! ```

use indexmap::IndexMap;
use serde_json::Value;

use crate::helper::ZiHelperRef;
use crate::pipeline::{ZiCollection, ZiMultiSource};

/// Capability the parameter-schema layer exposes for each declared parameter.
pub trait ZiParamCapability {
    fn name(&self) -> &str;

    fn is_required(&self) -> bool;

    fn default_value(&self) -> Option<&Value>;

    fn has_default(&self) -> bool {
        self.default_value().is_some()
    }
}

/// Snapshot of a parameter capability, usable as an expression leaf.
#[derive(Clone, Debug, PartialEq)]
pub struct ZiParamRef {
    name: String,
    required: bool,
    default: Option<Value>,
}

impl ZiParamRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
            default: None,
        }
    }

    /// Copies name, required flag and default out of any capability.
    pub fn from_capability(capability: &dyn ZiParamCapability) -> Self {
        Self {
            name: capability.name().to_string(),
            required: capability.is_required(),
            default: capability.default_value().cloned(),
        }
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn value(&self) -> ZiValue {
        ZiValue::Param(self.clone())
    }

    /// `parameter.<name>.<path>`
    pub fn field(&self, path: impl Into<String>) -> ZiValue {
        ZiValue::ParamField {
            param: self.clone(),
            path: path.into(),
        }
    }

    pub fn arith(&self, op: ZiArithOp, operand: Value) -> ZiValue {
        ZiValue::Arith {
            param: self.clone(),
            op,
            operand,
        }
    }

    pub fn prefixed(&self, prefix: impl Into<String>) -> ZiValue {
        ZiValue::Concat {
            param: self.clone(),
            affix: ZiAffix::Prefix(prefix.into()),
        }
    }

    pub fn suffixed(&self, suffix: impl Into<String>) -> ZiValue {
        ZiValue::Concat {
            param: self.clone(),
            affix: ZiAffix::Suffix(suffix.into()),
        }
    }

    pub fn is_set(&self) -> ZiCondition {
        ZiCondition::IsSet(self.value())
    }

    pub fn not_set(&self) -> ZiCondition {
        ZiCondition::NotSet(self.value())
    }

    pub fn compare(&self, op: ZiCompareOp, operand: Value) -> ZiCondition {
        ZiCondition::Compare {
            subject: self.value(),
            op,
            operand: ZiValue::Literal(operand),
        }
    }

    pub fn equals(&self, operand: Value) -> ZiCondition {
        self.compare(ZiCompareOp::Eq, operand)
    }

    pub fn truthy(&self) -> ZiCondition {
        ZiCondition::Truthy(self.value())
    }

    pub fn falsy(&self) -> ZiCondition {
        ZiCondition::Falsy(self.value())
    }

    pub fn is_in(&self, values: Vec<Value>) -> ZiCondition {
        ZiCondition::In {
            subject: self.value(),
            values,
        }
    }
}

impl ZiParamCapability for ZiParamRef {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_required(&self) -> bool {
        self.required
    }

    fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZiArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ZiArithOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            ZiArithOp::Add => "+",
            ZiArithOp::Sub => "-",
            ZiArithOp::Mul => "*",
            ZiArithOp::Div => "/",
            ZiArithOp::Mod => "%",
        }
    }

    pub fn parse(symbol: &str) -> Option<Self> {
        match symbol {
            "+" => Some(ZiArithOp::Add),
            "-" => Some(ZiArithOp::Sub),
            "*" => Some(ZiArithOp::Mul),
            "/" => Some(ZiArithOp::Div),
            "%" => Some(ZiArithOp::Mod),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ZiAffix {
    Prefix(String),
    Suffix(String),
}

/// Runtime context fields exposed to templates as `context.<field>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZiContextField {
    Name,
    Namespace,
    AppName,
    AppRevision,
}

impl ZiContextField {
    pub fn key(&self) -> &'static str {
        match self {
            ZiContextField::Name => "name",
            ZiContextField::Namespace => "namespace",
            ZiContextField::AppName => "appName",
            ZiContextField::AppRevision => "appRevision",
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        match key {
            "name" => Some(ZiContextField::Name),
            "namespace" => Some(ZiContextField::Namespace),
            "appName" => Some(ZiContextField::AppName),
            "appRevision" => Some(ZiContextField::AppRevision),
            _ => None,
        }
    }
}

/// Builtin functions with a CUE standard-library counterpart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZiFunction {
    ToLower,
    ToUpper,
    TrimSpace,
    FormatInt,
    ListConcat,
}

impl ZiFunction {
    /// CUE package the function lives in; also the import it requires.
    pub fn package(&self) -> &'static str {
        match self {
            ZiFunction::ToLower | ZiFunction::ToUpper | ZiFunction::TrimSpace => "strings",
            ZiFunction::FormatInt => "strconv",
            ZiFunction::ListConcat => "list",
        }
    }

    pub fn function(&self) -> &'static str {
        match self {
            ZiFunction::ToLower => "ToLower",
            ZiFunction::ToUpper => "ToUpper",
            ZiFunction::TrimSpace => "TrimSpace",
            ZiFunction::FormatInt => "FormatInt",
            ZiFunction::ListConcat => "Concat",
        }
    }

    /// Accepts `package.Function` names.
    pub fn parse(qualified: &str) -> Option<Self> {
        match qualified {
            "strings.ToLower" => Some(ZiFunction::ToLower),
            "strings.ToUpper" => Some(ZiFunction::ToUpper),
            "strings.TrimSpace" => Some(ZiFunction::TrimSpace),
            "strconv.FormatInt" => Some(ZiFunction::FormatInt),
            "list.Concat" => Some(ZiFunction::ListConcat),
            _ => None,
        }
    }
}

/// One field of a struct literal, optionally gated by a guard.
#[derive(Clone, Debug, PartialEq)]
pub struct ZiStructField {
    pub name: String,
    pub value: ZiValue,
    pub guard: Option<ZiCondition>,
}

/// Data-producing expression node.
#[derive(Clone, Debug, PartialEq)]
pub enum ZiValue {
    Literal(Value),
    Param(ZiParamRef),
    ParamField { param: ZiParamRef, path: String },
    Arith { param: ZiParamRef, op: ZiArithOp, operand: Value },
    Concat { param: ZiParamRef, affix: ZiAffix },
    Interpolation(Vec<ZiValue>),
    Call(ZiFunction, Vec<ZiValue>),
    Context(ZiContextField),
    /// Field of the element currently bound to the item variable.
    ItemField(String),
    Collection(Box<ZiCollection>),
    MultiSource(Box<ZiMultiSource>),
    Helper(ZiHelperRef),
    Struct(Vec<ZiStructField>),
}

impl ZiValue {
    pub const KINDS: &'static [&'static str] = &[
        "literal",
        "param",
        "param_field",
        "arith",
        "concat",
        "interpolation",
        "call",
        "context",
        "item_field",
        "collection",
        "multi_source",
        "helper",
        "struct",
    ];

    pub fn kind(&self) -> &'static str {
        match self {
            ZiValue::Literal(_) => "literal",
            ZiValue::Param(_) => "param",
            ZiValue::ParamField { .. } => "param_field",
            ZiValue::Arith { .. } => "arith",
            ZiValue::Concat { .. } => "concat",
            ZiValue::Interpolation(_) => "interpolation",
            ZiValue::Call(..) => "call",
            ZiValue::Context(_) => "context",
            ZiValue::ItemField(_) => "item_field",
            ZiValue::Collection(_) => "collection",
            ZiValue::MultiSource(_) => "multi_source",
            ZiValue::Helper(_) => "helper",
            ZiValue::Struct(_) => "struct",
        }
    }

    pub fn lit(value: Value) -> Self {
        ZiValue::Literal(value)
    }

    pub fn item(name: impl Into<String>) -> Self {
        ZiValue::ItemField(name.into())
    }

    pub fn call(function: ZiFunction, args: Vec<ZiValue>) -> Self {
        ZiValue::Call(function, args)
    }

    /// Starts an empty struct literal; extend with [`ZiValue::with_field`].
    pub fn structure() -> Self {
        ZiValue::Struct(Vec::new())
    }

    /// Appends a field to a struct literal. Other kinds are returned unchanged
    /// with a warning.
    pub fn with_field(self, name: impl Into<String>, value: ZiValue, guard: Option<ZiCondition>) -> Self {
        match self {
            ZiValue::Struct(mut fields) => {
                fields.push(ZiStructField {
                    name: name.into(),
                    value,
                    guard,
                });
                ZiValue::Struct(fields)
            }
            other => {
                log::warn!("field '{}' dropped: {} value is not a struct", name.into(), other.kind());
                other
            }
        }
    }

    pub fn is_empty(self) -> ZiCondition {
        ZiCondition::LenZero(self)
    }

    pub fn not_empty(self) -> ZiCondition {
        ZiCondition::LenNotZero(self)
    }
}

impl From<ZiCollection> for ZiValue {
    fn from(collection: ZiCollection) -> Self {
        ZiValue::Collection(Box::new(collection))
    }
}

impl From<ZiMultiSource> for ZiValue {
    fn from(multi: ZiMultiSource) -> Self {
        ZiValue::MultiSource(Box::new(multi))
    }
}

impl From<ZiHelperRef> for ZiValue {
    fn from(helper: ZiHelperRef) -> Self {
        ZiValue::Helper(helper)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZiCompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ZiCompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            ZiCompareOp::Eq => "==",
            ZiCompareOp::Ne => "!=",
            ZiCompareOp::Lt => "<",
            ZiCompareOp::Le => "<=",
            ZiCompareOp::Gt => ">",
            ZiCompareOp::Ge => ">=",
        }
    }

    pub fn parse(symbol: &str) -> Option<Self> {
        match symbol {
            "==" => Some(ZiCompareOp::Eq),
            "!=" => Some(ZiCompareOp::Ne),
            "<" => Some(ZiCompareOp::Lt),
            "<=" => Some(ZiCompareOp::Le),
            ">" => Some(ZiCompareOp::Gt),
            ">=" => Some(ZiCompareOp::Ge),
            _ => None,
        }
    }

    /// Applies the operator to an already computed ordering.
    pub fn holds(&self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            ZiCompareOp::Eq => ordering == Equal,
            ZiCompareOp::Ne => ordering != Equal,
            ZiCompareOp::Lt => ordering == Less,
            ZiCompareOp::Le => ordering != Greater,
            ZiCompareOp::Gt => ordering == Greater,
            ZiCompareOp::Ge => ordering != Less,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ZiStringPredicate {
    Contains(String),
    Matches(String),
    HasPrefix(String),
    HasSuffix(String),
    Length(ZiCompareOp, usize),
}

/// Boolean node. An unset subject is always falsy, never an error.
#[derive(Clone, Debug, PartialEq)]
pub enum ZiCondition {
    IsSet(ZiValue),
    NotSet(ZiValue),
    Compare {
        subject: ZiValue,
        op: ZiCompareOp,
        operand: ZiValue,
    },
    Str {
        subject: ZiValue,
        predicate: ZiStringPredicate,
    },
    Truthy(ZiValue),
    Falsy(ZiValue),
    In {
        subject: ZiValue,
        values: Vec<Value>,
    },
    And(Vec<ZiCondition>),
    Or(Vec<ZiCondition>),
    Not(Box<ZiCondition>),
    LenZero(ZiValue),
    LenNotZero(ZiValue),
    IterFieldExists { var: String, field: String },
    IterFieldAbsent { var: String, field: String },
}

impl ZiCondition {
    pub const KINDS: &'static [&'static str] = &[
        "is_set",
        "not_set",
        "compare",
        "str",
        "truthy",
        "falsy",
        "in",
        "and",
        "or",
        "not",
        "len_zero",
        "len_not_zero",
        "iter_field_exists",
        "iter_field_absent",
    ];

    pub fn kind(&self) -> &'static str {
        match self {
            ZiCondition::IsSet(_) => "is_set",
            ZiCondition::NotSet(_) => "not_set",
            ZiCondition::Compare { .. } => "compare",
            ZiCondition::Str { .. } => "str",
            ZiCondition::Truthy(_) => "truthy",
            ZiCondition::Falsy(_) => "falsy",
            ZiCondition::In { .. } => "in",
            ZiCondition::And(_) => "and",
            ZiCondition::Or(_) => "or",
            ZiCondition::Not(_) => "not",
            ZiCondition::LenZero(_) => "len_zero",
            ZiCondition::LenNotZero(_) => "len_not_zero",
            ZiCondition::IterFieldExists { .. } => "iter_field_exists",
            ZiCondition::IterFieldAbsent { .. } => "iter_field_absent",
        }
    }

    /// Item predicate `v.<field> == <value>`.
    pub fn field_equals(field: impl Into<String>, value: Value) -> Self {
        ZiCondition::Compare {
            subject: ZiValue::ItemField(field.into()),
            op: ZiCompareOp::Eq,
            operand: ZiValue::Literal(value),
        }
    }

    /// Item predicate `v.<field> != _|_`.
    pub fn field_exists(field: impl Into<String>) -> Self {
        ZiCondition::IsSet(ZiValue::ItemField(field.into()))
    }

    pub fn string(subject: ZiValue, predicate: ZiStringPredicate) -> Self {
        ZiCondition::Str { subject, predicate }
    }

    pub fn and(conditions: Vec<ZiCondition>) -> Self {
        ZiCondition::And(conditions)
    }

    pub fn or(conditions: Vec<ZiCondition>) -> Self {
        ZiCondition::Or(conditions)
    }

    pub fn negate(self) -> Self {
        ZiCondition::Not(Box::new(self))
    }

    /// Conjunction of two optional guards.
    pub fn combine(outer: Option<ZiCondition>, inner: Option<ZiCondition>) -> Option<ZiCondition> {
        match (outer, inner) {
            (None, None) => None,
            (Some(cond), None) | (None, Some(cond)) => Some(cond),
            (Some(outer), Some(inner)) => Some(ZiCondition::And(vec![outer, inner])),
        }
    }
}

/// Per-element value used while mapping a single record.
#[derive(Clone, Debug, PartialEq)]
pub enum ZiFieldValue {
    /// Required source field. The interpreter drops the target key when the
    /// source is absent; generated CUE leaves the key incomplete instead.
    Field(String),
    /// Like `Field`, but an absent source drops the target entry entirely.
    Optional(String),
    Literal(Value),
    /// First non-empty (absent, null or `""` counts as empty) wins.
    Or {
        primary: Box<ZiFieldValue>,
        fallback: Box<ZiFieldValue>,
    },
    Format {
        template: String,
        args: Vec<ZiFieldValue>,
    },
    Nested(ZiFieldMap),
}

impl ZiFieldValue {
    pub const KINDS: &'static [&'static str] = &["field", "optional", "literal", "or", "format", "nested"];

    pub fn kind(&self) -> &'static str {
        match self {
            ZiFieldValue::Field(_) => "field",
            ZiFieldValue::Optional(_) => "optional",
            ZiFieldValue::Literal(_) => "literal",
            ZiFieldValue::Or { .. } => "or",
            ZiFieldValue::Format { .. } => "format",
            ZiFieldValue::Nested(_) => "nested",
        }
    }

    pub fn field(name: impl Into<String>) -> Self {
        ZiFieldValue::Field(name.into())
    }

    pub fn optional(name: impl Into<String>) -> Self {
        ZiFieldValue::Optional(name.into())
    }

    pub fn literal(value: Value) -> Self {
        ZiFieldValue::Literal(value)
    }

    pub fn format(template: impl Into<String>, args: Vec<ZiFieldValue>) -> Self {
        ZiFieldValue::Format {
            template: template.into(),
            args,
        }
    }

    pub fn nested(map: ZiFieldMap) -> Self {
        ZiFieldValue::Nested(map)
    }

    pub fn or(self, fallback: ZiFieldValue) -> Self {
        ZiFieldValue::Or {
            primary: Box::new(self),
            fallback: Box::new(fallback),
        }
    }
}

/// Ordered target-name to field-value mapping.
///
/// Target names containing dots build nested records
/// (`persistentVolumeClaim.claimName`).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ZiFieldMap {
    entries: IndexMap<String, ZiFieldValue>,
}

impl ZiFieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an entry; a replaced entry keeps its position.
    pub fn field(mut self, name: impl Into<String>, value: ZiFieldValue) -> Self {
        self.entries.insert(name.into(), value);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ZiFieldValue)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, ZiFieldValue)> for ZiFieldMap {
    fn from_iter<T: IntoIterator<Item = (K, ZiFieldValue)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Piece of a parsed `Format` template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ZiFormatPiece {
    Text(String),
    Arg,
}

/// Splits a printf-style template into literal text and argument slots.
///
/// Any `%` followed by a letter is one slot; `%%` is a literal percent sign.
pub fn parse_format_template(template: &str) -> Vec<ZiFormatPiece> {
    let mut pieces = Vec::new();
    let mut text = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            text.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('%') => {
                chars.next();
                text.push('%');
            }
            Some(verb) if verb.is_ascii_alphabetic() => {
                chars.next();
                if !text.is_empty() {
                    pieces.push(ZiFormatPiece::Text(std::mem::take(&mut text)));
                }
                pieces.push(ZiFormatPiece::Arg);
            }
            _ => text.push('%'),
        }
    }
    if !text.is_empty() {
        pieces.push(ZiFormatPiece::Text(text));
    }

    pieces
}
