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

//! Decoding and encoding of `application/x-www-form-urlencoded` query strings.

use url::form_urlencoded;

#[derive(Debug, Clone, PartialEq, Eq)]
struct QueryPair {
    raw: String,
    name: String,
    value: String,
    modified: bool,
}

/// A query string decoded into its name/value pairs
///
/// Pairs keep their original order and encoding, only pairs changed via
/// [`set_value`](Self::set_value) are re-encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryString {
    pairs: Vec<QueryPair>,
}

fn encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

impl QueryString {
    /// Decodes a raw query string (without the leading `?`).
    pub fn parse(query: &str) -> Self {
        let pairs = query
            .split('&')
            .filter(|raw| !raw.is_empty())
            .map(|raw| {
                let (name, value) = form_urlencoded::parse(raw.as_bytes())
                    .next()
                    .unwrap_or_default();
                QueryPair {
                    raw: raw.to_owned(),
                    name: name.into_owned(),
                    value: value.into_owned(),
                    modified: false,
                }
            })
            .collect();
        Self { pairs }
    }

    /// Returns the first value of the named parameter.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|pair| pair.name == name)
            .map(|pair| pair.value.as_str())
    }

    /// Returns all values of the named parameter in order.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|pair| pair.name == name)
            .map(|pair| pair.value.as_str())
            .collect()
    }

    /// Number of values the named parameter has
    pub fn count(&self, name: &str) -> usize {
        self.pairs.iter().filter(|pair| pair.name == name).count()
    }

    /// Changes the `occurrence`-th value of the named parameter. Returns `false` if the
    /// parameter doesn’t have that many values.
    pub fn set_value(&mut self, name: &str, occurrence: usize, value: String) -> bool {
        if let Some(pair) = self
            .pairs
            .iter_mut()
            .filter(|pair| pair.name == name)
            .nth(occurrence)
        {
            if pair.value != value {
                pair.value = value;
                pair.modified = true;
            }
            true
        } else {
            false
        }
    }

    /// Returns `true` if any value was changed since parsing.
    pub fn is_modified(&self) -> bool {
        self.pairs.iter().any(|pair| pair.modified)
    }

    /// Encodes the query string again.
    pub fn encode(&self) -> String {
        let mut result = String::new();
        for pair in &self.pairs {
            if !result.is_empty() {
                result.push('&');
            }
            if pair.modified {
                result.push_str(&encode(&pair.name));
                result.push('=');
                result.push_str(&encode(&pair.value));
            } else {
                result.push_str(&pair.raw);
            }
        }
        result
    }
}
