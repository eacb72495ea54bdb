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

//! # Token Modifier Module for Pandora Web Server
//!
//! This crate rewrites security tokens contained in requests before they are passed on: bearer
//! tokens, JWTs, Basic Auth credentials and session identifiers found in headers, cookies and
//! query parameters. This is useful to see how an upstream service reacts to tokens that were
//! modified in transit. A configuration could look like this:
//!
//! ```yaml
//! token_modifier_enabled: true
//! bearer_token_prefix: modified_
//! enabled_default_rules: [Modify Basic Auth tokens]
//! token_rules:
//! - pattern: "^(.+)$"
//!   action: prefix
//!   value: modified_
//!   description: Session cookies
//!   location: cookie
//! - pattern: "^[0-9a-f]{32}$"
//!   action: remove
//!   description: API keys
//!   location: query
//!   target: api_key
//! ```
//!
//! ## Rules
//!
//! Each rule consists of a regular expression `pattern`, an `action` to perform if the pattern
//! matches and a `value` used by the action:
//!
//! * `replace`: Replaces the value by `value`. Capture groups of the pattern can be referenced
//!   as `$1` or `${1}`, named groups as `${name}`.
//! * `prefix`: Puts `value` in front of the value.
//! * `suffix`: Appends `value` to the value.
//! * `remove`: Replaces the value by an empty string.
//! * `extract`: Keeps only the first capture group of the match.
//!
//! Rules are bound to a `location`: `header` and `query` rules apply to the header or query
//! parameter named in `target`, `cookie` rules apply to the values of all cookies. Rules of the
//! same location and target are applied in the order they were added, each rule seeing the
//! result of the previous one. A rule that doesn’t match leaves the value unchanged for the
//! next rule.
//!
//! The `Authorization` header also goes through the global rule list after its own rules. That
//! list contains three default rules which are disabled initially:
//!
//! * `Add prefix to JWT tokens`: Prefixes JWT token values with `modified_`
//! * `Replace Bearer tokens`: Replaces Bearer tokens by `Bearer modified_token`
//! * `Modify Basic Auth tokens`: Prefixes Basic Auth values with `Basic modified_`
//!
//! `body` rules can be applied to request bodies via [`TokenModifier::modify_body`] which has
//! to be called separately once the body has been read.
//!
//! ## Code example
//!
//! ```rust
//! use pingora_http::RequestHeader;
//! use token_modifier_module::{Action, Location, MutableRequest, TokenModifier};
//!
//! let mut modifier = TokenModifier::new();
//! modifier
//!     .add_rule(
//!         r"^Bearer\s+(.+)$",
//!         Action::Replace,
//!         "Bearer modified_$1",
//!         "Modify Bearer tokens",
//!         Location::Header,
//!         "Authorization",
//!     )
//!     .unwrap();
//! modifier.enable();
//!
//! let mut request = RequestHeader::build("GET", b"/", None).unwrap();
//! request.insert_header("Authorization", "Bearer abc123").unwrap();
//! modifier.modify_request(&mut request);
//! assert_eq!(request.header_value("Authorization"), Some("Bearer modified_abc123"));
//! ```
//!
//! A token modifier that has to be shared between request handlers can be wrapped into
//! [`SharedTokenModifier`].

pub mod configuration;
mod error;
mod handler;
mod query;
mod request;
mod rule;
mod shared;
mod store;

pub use error::TokenModifierError;
pub use handler::TokenModifier;
pub use query::QueryString;
pub use request::{Cookie, MutableRequest};
pub use rule::{Action, Location, Rule};
pub use shared::SharedTokenModifier;
pub use store::{ListedRule, RuleId, RuleScope};
