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

//! Structures required to deserialize Token Modifier Module configuration from YAML
//! configuration files.

use clap::Args;
use log::debug;
use serde::Deserialize;
use std::path::Path;

use crate::rule::{Action, Location};
use crate::{TokenModifier, TokenModifierError};

/// Command line options of the token modifier module
#[derive(Debug, Default, Args)]
pub struct TokenModifierOpt {
    /// Enables token modification
    #[arg(long)]
    pub token_modifier_enabled: bool,

    /// Prefix to insert into Bearer tokens of the Authorization header
    #[arg(long)]
    pub bearer_token_prefix: Option<String>,

    /// Prefix to insert in front of JWT tokens sent as Authorization header
    #[arg(long)]
    pub jwt_prefix: Option<String>,
}

fn default_true() -> bool {
    true
}

/// A single token rule
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenRuleConf {
    /// Regular expression the value has to match for the rule to apply
    pub pattern: String,

    /// One of `replace`, `prefix`, `suffix`, `remove` or `extract`
    pub action: Action,

    /// Replacement, prefix or suffix text. For `replace` rules `$1` or `${name}` will be
    /// replaced by the corresponding capture group of the pattern.
    #[serde(default)]
    pub value: String,

    /// Label of the rule, used for logging and to enable or disable it
    #[serde(default)]
    pub description: String,

    /// One of `header`, `cookie`, `query` or `body`
    pub location: Location,

    /// Header or query parameter name, not used for cookie and body rules
    #[serde(default)]
    pub target: String,

    /// If `false`, the rule is registered but not applied
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Configuration file settings of the token modifier module
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TokenModifierConf {
    /// If `true`, requests will be modified
    pub token_modifier_enabled: bool,

    /// Prefix to insert into Bearer tokens of the Authorization header
    pub bearer_token_prefix: Option<String>,

    /// Prefix to insert in front of JWT tokens sent as Authorization header
    pub jwt_prefix: Option<String>,

    /// Descriptions of default rules to enable: `Add prefix to JWT tokens`,
    /// `Replace Bearer tokens`, `Modify Basic Auth tokens`
    pub enabled_default_rules: Vec<String>,

    /// Additional token rules, applied in the order listed
    pub token_rules: Vec<TokenRuleConf>,
}

impl TokenModifierConf {
    /// Parses configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, TokenModifierError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Loads and merges configuration from a number of YAML files.
    pub fn load_from_files<P: AsRef<Path>>(files: &[P]) -> Result<Self, TokenModifierError> {
        let mut result = Self::default();
        for path in files {
            let path = path.as_ref();
            debug!("Loading configuration file {}", path.display());
            let yaml =
                std::fs::read_to_string(path).map_err(|source| TokenModifierError::ConfigRead {
                    path: path.to_path_buf(),
                    source,
                })?;
            result.merge_with(Self::from_yaml(&yaml)?);
        }
        Ok(result)
    }

    /// Merges another configuration into this one. Rules are appended, settings present in
    /// `other` take precedence.
    pub fn merge_with(&mut self, other: Self) {
        self.token_modifier_enabled |= other.token_modifier_enabled;
        if other.bearer_token_prefix.is_some() {
            self.bearer_token_prefix = other.bearer_token_prefix;
        }
        if other.jwt_prefix.is_some() {
            self.jwt_prefix = other.jwt_prefix;
        }
        self.enabled_default_rules.extend(other.enabled_default_rules);
        self.token_rules.extend(other.token_rules);
    }

    /// Merges the command line options into the current configuration. Command line options
    /// present overwrite existing settings.
    pub fn merge_with_opt(&mut self, opt: TokenModifierOpt) {
        if opt.token_modifier_enabled {
            self.token_modifier_enabled = true;
        }
        if opt.bearer_token_prefix.is_some() {
            self.bearer_token_prefix = opt.bearer_token_prefix;
        }
        if opt.jwt_prefix.is_some() {
            self.jwt_prefix = opt.jwt_prefix;
        }
    }
}

impl TryFrom<TokenModifierConf> for TokenModifier {
    type Error = TokenModifierError;

    fn try_from(value: TokenModifierConf) -> Result<Self, Self::Error> {
        debug!("Token modifier configuration received: {value:#?}");

        let mut modifier = TokenModifier::new();
        for description in &value.enabled_default_rules {
            modifier.enable_rule(description);
        }

        if let Some(prefix) = &value.bearer_token_prefix {
            modifier.set_bearer_token_prefix(prefix)?;
        }
        if let Some(prefix) = &value.jwt_prefix {
            modifier.set_jwt_prefix(prefix)?;
        }

        for rule in &value.token_rules {
            let id = modifier.add_rule(
                &rule.pattern,
                rule.action,
                &rule.value,
                &rule.description,
                rule.location,
                &rule.target,
            )?;
            if !rule.enabled {
                modifier.set_rule_enabled(id, false)?;
            }
        }

        if value.token_modifier_enabled {
            modifier.enable();
        }
        Ok(modifier)
    }
}
