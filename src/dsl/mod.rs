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

//! # Zidef DSL Module
//!
//! Loads definition programs written in JSON or YAML and compiles them into
//! a helper registry plus an output operation list.
//!
//! ## Architecture
//!
//! - **Parser** ([parser.rs](parser/index.html)): reads the source, checks the
//!   program envelope and collects warnings
//! - **IR** ([ir.rs](ir/index.html)): the parsed program with raw JSON node bodies
//! - **Compiler** ([compiler.rs](compiler/index.html)): dispatches every node on
//!   its `kind` to a factory and builds the model types
//!
//! ## Program Layout (JSON)
//!
//! ```json
//! {
//!   "helpers": [
//!     {
//!       "name": "exposed",
//!       "value": {
//!         "kind": "collection",
//!         "source": {"kind": "param", "name": "ports"},
//!         "ops": [
//!           {"op": "filter", "condition": {"kind": "truthy", "value": {"kind": "item_field", "field": "expose"}}},
//!           {"op": "map", "fields": {"port": "port", "name": "name"}}
//!         ]
//!       }
//!     }
//!   ],
//!   "outputs": [
//!     {"kind": "set", "path": "spec.ports", "value": {"kind": "helper", "name": "exposed"}}
//!   ]
//! }
//! ```
//!
//! Non-object JSON in a value position is a literal. A bare string in a field
//! map is an item field reference.

pub mod compiler;
pub mod ir;
pub mod parser;

pub use compiler::{ZiCompiledDefinition, ZiDSLCompiler};
pub use ir::{ZiDSLHelper, ZiDSLProgram};
pub use parser::{yaml_to_json, ZiDSLFormat, ZiDSLParser, ZiDSLParserConfig, ZiParseResult};
