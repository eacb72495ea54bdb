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

//! A token modifier handle that can be shared between request handlers.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::request::MutableRequest;
use crate::rule::{Action, Location};
use crate::store::{ListedRule, RuleId};
use crate::{TokenModifier, TokenModifierError};

/// Cloneable handle to a token modifier guarded by a reader-writer lock
///
/// Request processing only takes the read lock, so concurrent requests don’t block each other.
/// Rule changes take the write lock and become visible to all requests started afterwards.
#[derive(Debug, Clone, Default)]
pub struct SharedTokenModifier {
    inner: Arc<RwLock<TokenModifier>>,
}

impl From<TokenModifier> for SharedTokenModifier {
    fn from(value: TokenModifier) -> Self {
        Self {
            inner: Arc::new(RwLock::new(value)),
        }
    }
}

impl SharedTokenModifier {
    /// See [`TokenModifier::enable`]
    pub fn enable(&self) {
        self.inner.write().enable();
    }

    /// See [`TokenModifier::disable`]
    pub fn disable(&self) {
        self.inner.write().disable();
    }

    /// See [`TokenModifier::is_enabled`]
    pub fn is_enabled(&self) -> bool {
        self.inner.read().is_enabled()
    }

    /// See [`TokenModifier::add_rule`]
    pub fn add_rule(
        &self,
        pattern: &str,
        action: Action,
        value: &str,
        description: &str,
        location: Location,
        target: &str,
    ) -> Result<RuleId, TokenModifierError> {
        self.inner
            .write()
            .add_rule(pattern, action, value, description, location, target)
    }

    /// See [`TokenModifier::find_rule`]
    pub fn find_rule(&self, description: &str) -> Option<RuleId> {
        self.inner.read().find_rule(description)
    }

    /// See [`TokenModifier::set_rule_enabled`]
    pub fn set_rule_enabled(&self, id: RuleId, enabled: bool) -> Result<(), TokenModifierError> {
        self.inner.write().set_rule_enabled(id, enabled)
    }

    /// See [`TokenModifier::enable_rule`]
    pub fn enable_rule(&self, description: &str) {
        self.inner.write().enable_rule(description);
    }

    /// See [`TokenModifier::disable_rule`]
    pub fn disable_rule(&self, description: &str) {
        self.inner.write().disable_rule(description);
    }

    /// See [`TokenModifier::list_rules`]
    pub fn list_rules(&self) -> Vec<ListedRule> {
        self.inner.read().list_rules()
    }

    /// See [`TokenModifier::clear_rules`]
    pub fn clear_rules(&self) {
        self.inner.write().clear_rules();
    }

    /// See [`TokenModifier::set_bearer_token_prefix`]
    pub fn set_bearer_token_prefix(&self, prefix: &str) -> Result<RuleId, TokenModifierError> {
        self.inner.write().set_bearer_token_prefix(prefix)
    }

    /// See [`TokenModifier::set_jwt_prefix`]
    pub fn set_jwt_prefix(&self, prefix: &str) -> Result<RuleId, TokenModifierError> {
        self.inner.write().set_jwt_prefix(prefix)
    }

    /// See [`TokenModifier::replace_token_value`]
    pub fn replace_token_value(
        &self,
        pattern: &str,
        new_value: &str,
        description: &str,
    ) -> Result<RuleId, TokenModifierError> {
        self.inner
            .write()
            .replace_token_value(pattern, new_value, description)
    }

    /// See [`TokenModifier::modify_request`]
    pub fn modify_request(&self, request: &mut impl MutableRequest) {
        self.inner.read().modify_request(request);
    }

    /// See [`TokenModifier::modify_body`]
    pub fn modify_body(&self, request: &mut impl MutableRequest, body: &mut Vec<u8>) -> bool {
        self.inner.read().modify_body(request, body)
    }
}
