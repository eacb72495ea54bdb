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

//! Rule storage: an arena of rules plus the per-location lists referring into it.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::Display;

use crate::rule::{Action, Location, Rule};

static JWT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^ey[A-Za-z0-9_\-+/=]+\.[A-Za-z0-9_\-+/=]+\.[A-Za-z0-9_\-+/=]*$")
        .expect("JWT pattern is valid")
});
static BEARER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Bearer\s+(.+)$").expect("Bearer pattern is valid"));
static BASIC_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Basic\s+(.+)$").expect("Basic pattern is valid"));

/// Opaque identifier of a registered rule
///
/// Identifiers stay valid until the rules are cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleId {
    generation: u32,
    index: usize,
}

impl Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "#{}.{}", self.generation, self.index)
    }
}

/// The list a rule was registered in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleScope {
    /// Global rules, applied to the `Authorization` header
    Global,
    /// Rules for the named header
    Header(String),
    /// Rules for all cookies
    Cookie,
    /// Rules for the named query parameter
    Query(String),
    /// Rules for the request body
    Body,
}

impl RuleScope {
    fn decorate(&self, description: &str) -> String {
        match self {
            Self::Global => description.to_owned(),
            Self::Header(name) => format!("{description} (Header: {name})"),
            Self::Cookie => format!("{description} (Cookie)"),
            Self::Query(name) => format!("{description} (Query: {name})"),
            Self::Body => format!("{description} (Body)"),
        }
    }
}

/// A copy of a stored rule as returned by `list_rules()`
#[derive(Debug, Clone)]
pub struct ListedRule {
    /// Identifier of the stored rule
    pub id: RuleId,
    /// The list the rule belongs to
    pub scope: RuleScope,
    /// The rule, its description suffixed with the location
    pub rule: Rule,
}

/// Rules registered for a particular header or query parameter name
#[derive(Debug, Clone)]
struct TargetRules {
    target: String,
    rules: Vec<usize>,
}

/// Owns all rules of a token modifier
#[derive(Debug, Clone)]
pub(crate) struct RuleStore {
    generation: u32,
    rules: Vec<Rule>,
    global: Vec<usize>,
    headers: Vec<TargetRules>,
    cookies: Vec<usize>,
    query: Vec<TargetRules>,
    body: Vec<usize>,
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::with_generation(0)
    }
}

impl RuleStore {
    fn with_generation(generation: u32) -> Self {
        let mut store = Self {
            generation,
            rules: Vec::new(),
            global: Vec::new(),
            headers: Vec::new(),
            cookies: Vec::new(),
            query: Vec::new(),
            body: Vec::new(),
        };
        store.add_default_rules();
        store
    }

    fn add_default_rules(&mut self) {
        let defaults = [
            Rule::with_regex(
                JWT_PATTERN.clone(),
                Action::Prefix,
                "modified_",
                "Add prefix to JWT tokens",
            ),
            Rule::with_regex(
                BEARER_PATTERN.clone(),
                Action::Replace,
                "Bearer modified_token",
                "Replace Bearer tokens",
            ),
            Rule::with_regex(
                BASIC_PATTERN.clone(),
                Action::Prefix,
                "Basic modified_",
                "Modify Basic Auth tokens",
            ),
        ];
        for mut rule in defaults {
            rule.set_enabled(false);
            let index = self.push(rule);
            self.global.push(index);
        }
    }

    fn push(&mut self, rule: Rule) -> usize {
        self.rules.push(rule);
        self.rules.len() - 1
    }

    fn id(&self, index: usize) -> RuleId {
        RuleId {
            generation: self.generation,
            index,
        }
    }

    fn push_target(lists: &mut Vec<TargetRules>, target: &str, index: usize, fold_case: bool) {
        let existing = lists.iter_mut().find(|list| {
            if fold_case {
                list.target.eq_ignore_ascii_case(target)
            } else {
                list.target == target
            }
        });
        if let Some(list) = existing {
            list.rules.push(index);
        } else {
            lists.push(TargetRules {
                target: target.to_owned(),
                rules: vec![index],
            });
        }
    }

    /// Stores a rule in the list selected by `location`. `target` is the header or query
    /// parameter name, it is ignored for other locations.
    pub(crate) fn insert(&mut self, rule: Rule, location: Location, target: &str) -> RuleId {
        let index = self.push(rule);
        match location {
            Location::Header => Self::push_target(&mut self.headers, target, index, true),
            Location::Cookie => self.cookies.push(index),
            Location::Query => Self::push_target(&mut self.query, target, index, false),
            Location::Body => self.body.push(index),
        }
        self.id(index)
    }

    pub(crate) fn get_mut(&mut self, id: RuleId) -> Option<&mut Rule> {
        if id.generation == self.generation {
            self.rules.get_mut(id.index)
        } else {
            None
        }
    }

    /// Iterates over all rules in listing order: global, headers, cookies, query, body.
    fn entries(&self) -> impl Iterator<Item = (usize, RuleScope)> + '_ {
        let global = self.global.iter().map(|&index| (index, RuleScope::Global));
        let headers = self.headers.iter().flat_map(|list| {
            list.rules
                .iter()
                .map(move |&index| (index, RuleScope::Header(list.target.clone())))
        });
        let cookies = self.cookies.iter().map(|&index| (index, RuleScope::Cookie));
        let query = self.query.iter().flat_map(|list| {
            list.rules
                .iter()
                .map(move |&index| (index, RuleScope::Query(list.target.clone())))
        });
        let body = self.body.iter().map(|&index| (index, RuleScope::Body));
        global.chain(headers).chain(cookies).chain(query).chain(body)
    }

    /// Finds the first rule with the given description, global rules take precedence.
    pub(crate) fn find_by_description(&self, description: &str) -> Option<RuleId> {
        self.entries()
            .map(|(index, _)| index)
            .find(|&index| self.rules[index].description() == description)
            .map(|index| self.id(index))
    }

    pub(crate) fn list(&self) -> Vec<ListedRule> {
        self.entries()
            .map(|(index, scope)| {
                let mut rule = self.rules[index].clone();
                rule.set_description(scope.decorate(rule.description()));
                ListedRule {
                    id: self.id(index),
                    scope,
                    rule,
                }
            })
            .collect()
    }

    /// Drops all rules and restores the default rules. Identifiers issued before become invalid.
    pub(crate) fn clear(&mut self) {
        *self = Self::with_generation(self.generation.wrapping_add(1));
    }

    fn resolve<'a>(&'a self, indices: &'a [usize]) -> impl Iterator<Item = &'a Rule> + Clone + 'a {
        indices.iter().map(move |&index| &self.rules[index])
    }

    pub(crate) fn global_rules(&self) -> impl Iterator<Item = &Rule> + Clone + '_ {
        self.resolve(&self.global)
    }

    /// Rules for a header, header names are compared case-insensitively.
    pub(crate) fn header_rules(&self, name: &str) -> Option<impl Iterator<Item = &Rule> + '_> {
        self.headers
            .iter()
            .find(|list| list.target.eq_ignore_ascii_case(name))
            .map(|list| self.resolve(&list.rules))
    }

    /// Header names with rules, in registration order
    pub(crate) fn header_targets(&self) -> impl Iterator<Item = &str> + '_ {
        self.headers.iter().map(|list| list.target.as_str())
    }

    pub(crate) fn cookie_rules(&self) -> impl Iterator<Item = &Rule> + Clone + '_ {
        self.resolve(&self.cookies)
    }

    pub(crate) fn has_cookie_rules(&self) -> bool {
        !self.cookies.is_empty()
    }

    /// Query parameter names with their rules, in registration order
    pub(crate) fn query_targets(
        &self,
    ) -> impl Iterator<Item = (&str, impl Iterator<Item = &Rule> + Clone + '_)> + '_ {
        self.query
            .iter()
            .map(|list| (list.target.as_str(), self.resolve(&list.rules)))
    }

    pub(crate) fn body_rules(&self) -> impl Iterator<Item = &Rule> + Clone + '_ {
        self.resolve(&self.body)
    }

    pub(crate) fn has_body_rules(&self) -> bool {
        !self.body.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    fn rule(description: &str) -> Rule {
        Rule::new("^(.+)$", Action::Prefix, "modified_", description).unwrap()
    }

    fn descriptions(store: &RuleStore) -> Vec<String> {
        store
            .list()
            .into_iter()
            .map(|listed| listed.rule.description().to_owned())
            .collect()
    }

    const DEFAULTS: [&str; 3] = [
        "Add prefix to JWT tokens",
        "Replace Bearer tokens",
        "Modify Basic Auth tokens",
    ];

    #[test]
    fn defaults() {
        let store = RuleStore::default();
        let listed = store.list();
        assert_eq!(descriptions(&store), DEFAULTS);
        assert!(listed.iter().all(|listed| !listed.rule.is_enabled()));
        assert!(listed.iter().all(|listed| listed.scope == RuleScope::Global));
    }

    #[test]
    fn listing_order_and_decoration() {
        let mut store = RuleStore::default();
        store.insert(rule("q"), Location::Query, "token");
        store.insert(rule("h1"), Location::Header, "X-Token");
        store.insert(rule("b"), Location::Body, "");
        store.insert(rule("c"), Location::Cookie, "ignored");
        store.insert(rule("h2"), Location::Header, "Authorization");
        store.insert(rule("h3"), Location::Header, "x-token");

        assert_eq!(
            descriptions(&store)[3..],
            [
                "h1 (Header: X-Token)",
                "h3 (Header: X-Token)",
                "h2 (Header: Authorization)",
                "c (Cookie)",
                "q (Query: token)",
                "b (Body)",
            ]
        );

        // Listing works on copies
        assert_eq!(store.rules[3].description(), "q");
    }

    #[test]
    fn any_header_target() {
        let mut store = RuleStore::default();
        store.insert(rule("bad"), Location::Header, "Bad Header");
        store.insert(rule("empty"), Location::Header, "");
        assert_eq!(store.header_targets().collect::<Vec<_>>(), ["Bad Header", ""]);
        assert!(store.header_rules("bad header").is_some());
    }

    #[test]
    fn find_by_description() {
        let mut store = RuleStore::default();
        let first = store.insert(rule("dup"), Location::Cookie, "");
        store.insert(rule("dup"), Location::Body, "");
        assert_eq!(store.find_by_description("dup"), Some(first));
        assert_eq!(store.find_by_description("missing"), None);

        let global = store.find_by_description("Replace Bearer tokens").unwrap();
        assert_eq!(global.index, 1);
    }

    #[test]
    fn clear_invalidates_ids() {
        let mut store = RuleStore::default();
        let id = store.insert(rule("added"), Location::Cookie, "");
        assert!(store.get_mut(id).is_some());

        store.clear();
        assert_eq!(descriptions(&store), DEFAULTS);
        assert!(store.get_mut(id).is_none());
        assert!(!store.has_cookie_rules());
        assert_eq!(store.header_targets().count(), 0);
    }
}
