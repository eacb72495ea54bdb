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

//! The token modifier: rule lifecycle and request mutation.

use http::header;
use log::{debug, info, trace, warn};

use crate::query::QueryString;
use crate::request::MutableRequest;
use crate::rule::{apply_rules, Action, Location, Rule};
use crate::store::{ListedRule, RuleId, RuleStore};
use crate::TokenModifierError;

const AUTHORIZATION: &str = "Authorization";

/// Rewrites token values in requests according to registered rules
///
/// A new token modifier is disabled and only knows the three default rules (JWT, Bearer and
/// Basic Auth patterns) which are disabled as well.
#[derive(Debug, Clone, Default)]
pub struct TokenModifier {
    store: RuleStore,
    enabled: bool,
}

impl TokenModifier {
    /// Creates a disabled token modifier with the default rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables request modification.
    pub fn enable(&mut self) {
        self.enabled = true;
        info!("Token modifier enabled");
    }

    /// Disables request modification, `modify_request()` won’t do anything.
    pub fn disable(&mut self) {
        self.enabled = false;
        info!("Token modifier disabled");
    }

    /// Returns whether request modification is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Compiles a pattern and registers an enabled rule for the given location.
    ///
    /// `target` is the header or query parameter name the rule applies to. It is ignored for
    /// cookie rules (these apply to all cookies) and body rules. Nothing is registered if
    /// the pattern is invalid.
    ///
    /// Header names are compared case-insensitively, so a rule for `authorization` joins the
    /// `Authorization` rules. These run before the global rules, while rules for other
    /// headers run after them.
    pub fn add_rule(
        &mut self,
        pattern: &str,
        action: Action,
        value: &str,
        description: &str,
        location: Location,
        target: &str,
    ) -> Result<RuleId, TokenModifierError> {
        let rule = Rule::new(pattern, action, value, description)?;
        let id = self.store.insert(rule, location, target);

        match location {
            Location::Header => info!("Added header rule for '{target}': {description}"),
            Location::Cookie => info!("Added cookie rule: {description}"),
            Location::Query => info!("Added query param rule for '{target}': {description}"),
            Location::Body => info!("Added body rule: {description}"),
        }
        Ok(id)
    }

    /// Returns the identifier of the first rule with this description.
    ///
    /// Global rules are considered first, then header, cookie, query and body rules.
    pub fn find_rule(&self, description: &str) -> Option<RuleId> {
        self.store.find_by_description(description)
    }

    /// Enables or disables a rule by its identifier.
    pub fn set_rule_enabled(
        &mut self,
        id: RuleId,
        enabled: bool,
    ) -> Result<(), TokenModifierError> {
        let rule = self
            .store
            .get_mut(id)
            .ok_or(TokenModifierError::UnknownRule(id))?;
        rule.set_enabled(enabled);
        Ok(())
    }

    fn toggle_rule(&mut self, description: &str, enabled: bool) {
        let rule = self
            .store
            .find_by_description(description)
            .and_then(|id| self.store.get_mut(id));
        if let Some(rule) = rule {
            rule.set_enabled(enabled);
            if enabled {
                info!("Enabled rule: {description}");
            } else {
                info!("Disabled rule: {description}");
            }
        } else {
            warn!("Rule not found: {description}");
        }
    }

    /// Enables the first rule with this description. An unknown description only produces a
    /// warning.
    pub fn enable_rule(&mut self, description: &str) {
        self.toggle_rule(description, true);
    }

    /// Disables the first rule with this description. An unknown description only produces a
    /// warning.
    pub fn disable_rule(&mut self, description: &str) {
        self.toggle_rule(description, false);
    }

    /// Returns copies of all rules, with descriptions suffixed by their location.
    pub fn list_rules(&self) -> Vec<ListedRule> {
        self.store.list()
    }

    /// Removes all rules and restores the disabled default rules.
    pub fn clear_rules(&mut self) {
        self.store.clear();
        info!("All token modification rules cleared");
    }

    /// Adds a rule inserting a prefix into Bearer tokens of the `Authorization` header.
    pub fn set_bearer_token_prefix(&mut self, prefix: &str) -> Result<RuleId, TokenModifierError> {
        self.add_rule(
            r"^Bearer\s+(.+)$",
            Action::Replace,
            &format!("Bearer {}${{1}}", escape_template(prefix)),
            "Add prefix to Bearer tokens",
            Location::Header,
            AUTHORIZATION,
        )
    }

    /// Adds a rule prefixing JWT tokens sent as the whole `Authorization` header value.
    pub fn set_jwt_prefix(&mut self, prefix: &str) -> Result<RuleId, TokenModifierError> {
        self.add_rule(
            r"^(ey[A-Za-z0-9_\-+/=]+\.[A-Za-z0-9_\-+/=]+\.[A-Za-z0-9_\-+/=]*)$",
            Action::Replace,
            &format!("{}${{1}}", escape_template(prefix)),
            "Add prefix to JWT tokens",
            Location::Header,
            AUTHORIZATION,
        )
    }

    /// Adds a rule replacing `Authorization` header values matching the pattern.
    pub fn replace_token_value(
        &mut self,
        pattern: &str,
        new_value: &str,
        description: &str,
    ) -> Result<RuleId, TokenModifierError> {
        self.add_rule(
            pattern,
            Action::Replace,
            new_value,
            description,
            Location::Header,
            AUTHORIZATION,
        )
    }

    /// Applies the rules to headers, cookies and query parameters of the request. Does nothing
    /// if the token modifier is disabled.
    ///
    /// The request body is not touched, see [`modify_body`](Self::modify_body).
    pub fn modify_request(&self, request: &mut impl MutableRequest) {
        if !self.enabled {
            return;
        }

        self.modify_headers(request);
        self.modify_cookies(request);
        self.modify_query(request);
    }

    fn write_header(request: &mut impl MutableRequest, name: &str, value: &str) -> bool {
        match request.set_header_value(name, value) {
            Ok(()) => true,
            Err(err) => {
                warn!("Failed writing back modified header: {err}");
                false
            }
        }
    }

    fn modify_headers(&self, request: &mut impl MutableRequest) {
        let authorization = request
            .header_value(AUTHORIZATION)
            .filter(|value| !value.is_empty())
            .map(str::to_owned);
        if let Some(mut current) = authorization {
            if let Some(rules) = self.store.header_rules(AUTHORIZATION) {
                let new_value = apply_rules(&current, rules);
                if new_value != current && Self::write_header(request, AUTHORIZATION, &new_value) {
                    debug!("Modified Authorization header");
                    current = new_value;
                }
            }

            // Global rules apply on top of the header-specific ones
            let new_value = apply_rules(&current, self.store.global_rules());
            if new_value != current && Self::write_header(request, AUTHORIZATION, &new_value) {
                debug!("Modified Authorization header with global rule");
            }
        }

        for name in self.store.header_targets() {
            if name.eq_ignore_ascii_case(AUTHORIZATION) {
                continue;
            }

            let Some(value) = request
                .header_value(name)
                .filter(|value| !value.is_empty())
                .map(str::to_owned)
            else {
                continue;
            };

            if let Some(rules) = self.store.header_rules(name) {
                let new_value = apply_rules(&value, rules);
                if new_value != value && Self::write_header(request, name, &new_value) {
                    debug!("Modified header '{name}'");
                }
            }
        }
    }

    fn modify_cookies(&self, request: &mut impl MutableRequest) {
        if !self.store.has_cookie_rules() {
            return;
        }

        let mut cookies = request.cookies();
        let mut modified = false;
        for cookie in &mut cookies {
            let new_value = apply_rules(&cookie.value, self.store.cookie_rules());
            if new_value != cookie.value {
                debug!("Modified cookie '{}'", cookie.name);
                cookie.value = new_value;
                modified = true;
            }
        }

        if modified {
            if let Err(err) = request.replace_cookies(&cookies) {
                warn!("Failed writing back modified cookies: {err}");
            }
        }
    }

    fn modify_query(&self, request: &mut impl MutableRequest) {
        let Some(raw) = request.query_string() else {
            return;
        };
        let mut query = QueryString::parse(raw);

        for (name, rules) in self.store.query_targets() {
            let values = query
                .get_all(name)
                .into_iter()
                .map(str::to_owned)
                .collect::<Vec<_>>();
            for (occurrence, value) in values.into_iter().enumerate() {
                let new_value = apply_rules(&value, rules.clone());
                if new_value != value {
                    debug!("Modified query param '{name}'");
                    query.set_value(name, occurrence, new_value);
                }
            }
        }

        if query.is_modified() {
            let encoded = query.encode();
            trace!("New query string: {encoded}");
            if let Err(err) = request.set_query_string(&encoded) {
                warn!("Failed writing back modified query: {err}");
            }
        }
    }

    /// Applies the body rules to a request body. Does nothing if the token modifier is
    /// disabled, the body isn’t valid UTF-8 or uses a `Content-Encoding` other than
    /// `identity`. If the body changes, the `Content-Length` header is updated if present.
    ///
    /// Returns `true` if the body was modified.
    pub fn modify_body(&self, request: &mut impl MutableRequest, body: &mut Vec<u8>) -> bool {
        if !self.enabled || !self.store.has_body_rules() {
            return false;
        }

        if let Some(encoding) = request.header_value(header::CONTENT_ENCODING.as_str()) {
            if !encoding.trim().eq_ignore_ascii_case("identity") {
                debug!("Not modifying body with content encoding {encoding}");
                return false;
            }
        }

        let Ok(text) = std::str::from_utf8(body.as_slice()) else {
            debug!("Not modifying body, not valid UTF-8");
            return false;
        };

        let new_text = apply_rules(text, self.store.body_rules());
        if new_text == text {
            return false;
        }

        *body = new_text.into_bytes();
        debug!("Modified request body");

        let content_length = header::CONTENT_LENGTH.as_str();
        if request.header_value(content_length).is_some() {
            Self::write_header(request, content_length, &body.len().to_string());
        }
        true
    }
}

/// Escapes `$` so that a literal value can be embedded into a replacement template.
fn escape_template(value: &str) -> String {
    value.replace('$', "$$")
}
