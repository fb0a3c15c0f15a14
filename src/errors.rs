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

//! # Zidef Error Module
//!
//! Error types shared by the expression model, both backends and the
//! definition loader.
//!
//! ## Error Categories
//!
//! - **Io**: Filesystem errors while loading definition programs
//! - **Schema**: Structural shape mismatches, e.g. a sequence source that
//!   resolves to a scalar
//! - **Validation**: Malformed paths, format templates, helper ordering and
//!   loader input
//! - **Operator**: A pipeline operation failed while applying to a batch
//! - **Pipeline**: A named helper failed to evaluate or generate
//! - **Serde**: Serialization/deserialization errors
//! - **Unsupported**: A node kind no backend recognizes
//! - **Internal**: Unexpected internal failures
//!
//! Absence of a field or parameter is never reported through this type; it
//! resolves to the documented "empty" behavior instead.
//!
//! ## Usage
//!
//! ```rust
//! use zidef::errors::{Result, ZiError};
//!
//! fn checked(path: &str) -> Result<&str> {
//!     if path.is_empty() {
//!         return Err(ZiError::validation("path may not be empty"));
//!     }
//!     Ok(path)
//! }
//! ```

use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenience result type used throughout Zidef.
pub type Result<T> = std::result::Result<T, ZiError>;

/// Canonical error enumeration for Zidef.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum ZiError {
    /// Errors originating from filesystem IO.
    #[error("io error: {0}")]
    Io(String),

    /// Structural incompatibility between a node and the data it receives.
    #[error("schema error: {message}")]
    Schema { message: String },

    /// Validation errors triggered by invalid parameters or inputs.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Any failure raised while applying a pipeline operation.
    #[error("operator '{operator}' failed: {message}")]
    Operator { operator: String, message: String },

    /// Failures attributed to a named helper stage.
    #[error("pipeline error at stage '{stage}': {message}")]
    Pipeline { stage: String, message: String },

    /// Wrapper for serde-style serialization issues.
    #[error("serialization error: {0}")]
    Serde(String),

    /// A node kind that neither backend recognizes.
    #[error("unsupported node kind '{kind}'")]
    Unsupported { kind: String },

    /// Catch-all variant for unexpected situations.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<io::Error> for ZiError {
    fn from(err: io::Error) -> Self {
        ZiError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ZiError {
    fn from(err: serde_json::Error) -> Self {
        ZiError::Serde(err.to_string())
    }
}

impl From<serde_yaml::Error> for ZiError {
    fn from(err: serde_yaml::Error) -> Self {
        ZiError::Serde(err.to_string())
    }
}

impl ZiError {
    /// Helper to construct simple validation errors.
    pub fn validation<T: Into<String>>(message: T) -> Self {
        ZiError::Validation {
            message: message.into(),
        }
    }

    /// Helper to construct schema errors.
    pub fn schema<T: Into<String>>(message: T) -> Self {
        ZiError::Schema {
            message: message.into(),
        }
    }

    /// Helper to construct operator errors.
    pub fn operator(name: impl Into<String>, message: impl Into<String>) -> Self {
        ZiError::Operator {
            operator: name.into(),
            message: message.into(),
        }
    }

    /// Helper to construct pipeline errors.
    pub fn pipeline(stage: impl Into<String>, message: impl Into<String>) -> Self {
        ZiError::Pipeline {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Helper to construct unsupported-kind errors.
    pub fn unsupported<T: Into<String>>(kind: T) -> Self {
        ZiError::Unsupported { kind: kind.into() }
    }

    /// Helper to construct internal errors.
    pub fn internal<T: Into<String>>(message: T) -> Self {
        ZiError::Internal(message.into())
    }
}
