// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Error types for the edges of the engine.
//!
//! The projection pipeline itself never fails: missing paths, unmatched
//! feedback and uncoercible values all degrade to an absent cell. Errors
//! only arise where the crate touches the filesystem or parses
//! configuration and stored schemas.

use thiserror::Error;

/// Result type for fallible evalview operations
pub type Result<T> = std::result::Result<T, EvalViewError>;

#[derive(Debug, Error)]
pub enum EvalViewError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Config parse error: {0}")]
    Config(String),

    #[error("Schema not found for experiment: {0}")]
    SchemaNotFound(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
}

impl From<serde_json::Error> for EvalViewError {
    fn from(e: serde_json::Error) -> Self {
        EvalViewError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for EvalViewError {
    fn from(e: toml::de::Error) -> Self {
        EvalViewError::Config(e.to_string())
    }
}
