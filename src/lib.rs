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

//! # Zidef Core Library
//!
//! Transformation and code-generation core for authoring declarative
//! deployment definitions. A fluent expression model describes how parameter
//! data is filtered, reshaped and placed into an output resource; the same
//! model is then either evaluated directly or compiled to CUE.
//!
//! ## Module Overview
//!
//! - **expr**: values, conditions and per-record field values
//! - **pipeline**: single-source collections and multi-source unions
//! - **helper**: named, build-order-indexed pipelines
//! - **context**: parameter values and runtime context for one render
//! - **interpreter**: direct evaluation, eager or lazy
//! - **render**: output operations and their interpreted result
//! - **tree**: field-path tree assembled from output operations
//! - **cuegen**: CUE text generation
//! - **dsl**: JSON/YAML definition loader
//! - **path**: the dotted/bracketed path grammar shared by all of the above
//!
//! ## Quick Start
//!
//! ```rust
//! use serde_json::json;
//! use zidef::{ZiCollection, ZiCondition, ZiFieldMap, ZiFieldValue, ZiInterpreter, ZiParamContext, ZiParamRef};
//!
//! let ports = ZiCollection::from(ZiParamRef::new("ports").value())
//!     .filter(ZiCondition::field_equals("expose", json!(true)))
//!     .map(ZiFieldMap::new().field("port", ZiFieldValue::field("port")));
//!
//! let ctx = ZiParamContext::from_params(json!({"ports": [{"port": 80, "expose": true}]})).unwrap();
//! let records = ports.collect(&ZiInterpreter::new(&ctx)).unwrap();
//! assert_eq!(records, vec![json!({"port": 80})]);
//! ```
//!
//! ## Backends
//!
//! 1. **Interpreter**: evaluates against concrete parameters, used for
//!    previews and tests
//! 2. **Generator**: emits CUE comprehensions computing the same result
//!
//! ## Error Handling
//!
//! All operations return `Result<T, ZiError>`. Absent data is never an
//! error; shape mismatches, bad paths and unknown node kinds are.

#![allow(non_snake_case)]

pub mod errors;
pub mod path;
pub mod expr;
pub mod pipeline;
pub mod helper;
pub mod context;
pub mod interpreter;
pub mod render;
pub mod tree;
pub mod cuegen;
pub mod dsl;

pub use errors::{Result, ZiError};
pub use path::{split_segments, ZiFieldPath, ZiPathAccess, ZiPathSegment};
pub use expr::{
    parse_format_template, ZiAffix, ZiArithOp, ZiCompareOp, ZiCondition, ZiContextField, ZiFieldMap,
    ZiFieldValue, ZiFormatPiece, ZiFunction, ZiParamCapability, ZiParamRef, ZiStringPredicate, ZiStructField,
    ZiValue,
};
pub use pipeline::{check_format_arity, ZiCollection, ZiCollectionOp, ZiMultiSource, ZiMultiSourceOp};
pub use helper::{ZiHelper, ZiHelperRef, ZiHelperRegistry};
pub use context::ZiParamContext;
pub use interpreter::{ZiInterpreter, ZiInterpreterConfig, ZiRecordIter, DEFAULT_ITEM_VAR};
pub use render::{ZiOutputOp, ZiRenderResult, ZiRenderer};
pub use tree::{ZiChildKey, ZiFieldNode, ZiFieldTree, ZiGuarded, ZiPatchKey};
pub use cuegen::{cue_label, is_identifier, ZiCueGenerator, ZiGeneratorConfig};
pub use dsl::{
    ZiCompiledDefinition, ZiDSLCompiler, ZiDSLFormat, ZiDSLHelper, ZiDSLParser, ZiDSLParserConfig, ZiDSLProgram,
    ZiParseResult,
};
