// Copyright 2024 Wladimir Palant
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error type shared by all token modifier operations.

use std::path::PathBuf;

use crate::store::RuleId;

/// Errors produced while registering rules, loading configuration or writing modified values
/// back into a request
#[derive(Debug, thiserror::Error)]
pub enum TokenModifierError {
    /// The rule’s pattern could not be compiled
    #[error("invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        /// Pattern text as supplied
        pattern: String,
        /// Compilation error
        source: regex::Error,
    },

    /// A modified header value could not be stored in the request
    #[error("could not set header `{name}`: {message}")]
    InvalidHeader {
        /// Header name
        name: String,
        /// Reason reported by the request implementation
        message: String,
    },

    /// A modified query string produced an invalid URI
    #[error("could not set query string: {0}")]
    InvalidUri(String),

    /// No rule with this identifier exists, e.g. because the rules were cleared since
    #[error("unknown rule {0}")]
    UnknownRule(RuleId),

    /// A configuration file could not be read
    #[error("failed reading configuration file {}: {source}", path.display())]
    ConfigRead {
        /// Path of the configuration file
        path: PathBuf,
        /// I/O error
        source: std::io::Error,
    },

    /// Configuration could not be parsed
    #[error("failed parsing configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),
}
