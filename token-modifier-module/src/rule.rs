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

//! Token rules and the engine threading a value through an ordered rule list.

use log::{debug, trace};
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::borrow::Borrow;
use std::fmt::Display;

use crate::TokenModifierError;

/// Upper bound for the size of a compiled pattern
const PATTERN_SIZE_LIMIT: usize = 1 << 20;

/// What a rule does to a value matched by its pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Replace the value by the rule value, `$1` or `${name}` refer to capture groups
    Replace,
    /// Put the rule value in front of the value
    Prefix,
    /// Append the rule value to the value
    Suffix,
    /// Empty the value
    Remove,
    /// Keep only the first capture group of the match
    Extract,
}

impl Action {
    /// Returns the action name as used in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Prefix => "prefix",
            Self::Suffix => "suffix",
            Self::Remove => "remove",
            Self::Extract => "extract",
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{}", self.name())
    }
}

/// The part of a request a rule is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    /// A named HTTP header
    Header,
    /// The values of all cookies
    Cookie,
    /// A named query parameter
    Query,
    /// The request body
    Body,
}

/// A single conditional token transformation
#[derive(Debug, Clone)]
pub struct Rule {
    pattern: Regex,
    action: Action,
    value: String,
    description: String,
    enabled: bool,
}

impl Rule {
    /// Compiles the pattern and creates an enabled rule.
    pub fn new(
        pattern: &str,
        action: Action,
        value: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self, TokenModifierError> {
        let compiled = RegexBuilder::new(pattern)
            .size_limit(PATTERN_SIZE_LIMIT)
            .build()
            .map_err(|source| TokenModifierError::InvalidPattern {
                pattern: pattern.to_owned(),
                source,
            })?;
        Ok(Self::with_regex(compiled, action, value, description))
    }

    pub(crate) fn with_regex(
        pattern: Regex,
        action: Action,
        value: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            pattern,
            action,
            value: value.into(),
            description: description.into(),
            enabled: true,
        }
    }

    /// Compiled pattern of the rule
    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    /// Action performed on match
    pub fn action(&self) -> Action {
        self.action
    }

    /// Replacement, prefix or suffix text
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Human-readable label of the rule
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Whether the rule takes part in rule evaluation
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub(crate) fn set_description(&mut self, description: String) {
        self.description = description;
    }

    /// Applies the rule to a value, returns `None` if the pattern doesn’t match or the action
    /// has nothing to do. The enabled flag is not considered here.
    pub fn apply(&self, value: &str) -> Option<String> {
        match self.action {
            Action::Replace => {
                let captures = self.pattern.captures(value)?;
                let mut result = String::new();
                captures.expand(&self.value, &mut result);
                Some(result)
            }
            Action::Prefix => self
                .pattern
                .is_match(value)
                .then(|| format!("{}{value}", self.value)),
            Action::Suffix => self
                .pattern
                .is_match(value)
                .then(|| format!("{value}{}", self.value)),
            Action::Remove => self.pattern.is_match(value).then(String::new),
            Action::Extract => {
                let captures = self.pattern.captures(value)?;
                captures.get(1).map(|group| group.as_str().to_owned())
            }
        }
    }
}

/// Runs a value through a list of rules in order. Each enabled rule sees the output of the
/// previous one, a rule emptying the value doesn’t stop the evaluation.
pub(crate) fn apply_rules<I>(value: &str, rules: I) -> String
where
    I: IntoIterator,
    I::Item: Borrow<Rule>,
{
    let mut result = value.to_owned();
    for rule in rules {
        let rule = rule.borrow();
        if !rule.enabled {
            continue;
        }

        if let Some(new_value) = rule.apply(&result) {
            debug!("Applied {} rule: {}", rule.action, rule.description);
            trace!("Value changed from {result:?} to {new_value:?}");
            result = new_value;
        }
    }
    result
}
