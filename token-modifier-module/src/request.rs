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

//! The request abstraction token rules are applied to.

use http::uri::PathAndQuery;
use http::Uri;
use log::debug;
use pingora_http::RequestHeader;

use crate::TokenModifierError;

pub(crate) const COOKIE: &str = "Cookie";

/// A name/value pair from the `Cookie` request header
///
/// Cookies compare by name and value only.
#[derive(Debug, Clone)]
pub struct Cookie {
    /// Cookie name
    pub name: String,
    /// Cookie value, unquoted
    pub value: String,
    raw_value: Option<String>,
}

impl Cookie {
    /// Creates a new cookie.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            raw_value: None,
        }
    }

    fn encoded_value(&self) -> String {
        match &self.raw_value {
            Some(raw) if unquote(raw) == self.value => raw.clone(),
            _ => sanitize_cookie_value(&self.value),
        }
    }
}

impl PartialEq for Cookie {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.value == other.value
    }
}

impl Eq for Cookie {}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|value| value.strip_suffix('"'))
        .unwrap_or(value)
}

/// Parses `Cookie` header values into name/value pairs. Pairs without a name are skipped.
pub(crate) fn parse_cookies<I>(headers: I) -> Vec<Cookie>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut cookies = Vec::new();
    for header in headers {
        for pair in header.as_ref().split(';') {
            if let Some((name, value)) = pair.split_once('=') {
                let name = name.trim();
                if name.is_empty() {
                    continue;
                }

                let raw_value = value.trim();
                cookies.push(Cookie {
                    name: name.to_owned(),
                    value: unquote(raw_value).to_owned(),
                    raw_value: Some(raw_value.to_owned()),
                });
            }
        }
    }
    cookies
}

fn is_cookie_octet(c: char) -> bool {
    matches!(c, '\x21' | '\x23'..='\x2b' | '\x2d'..='\x3a' | '\x3c'..='\x5b' | '\x5d'..='\x7e')
}

/// Removes characters not allowed in a cookie value, values containing space or comma are
/// quoted.
fn sanitize_cookie_value(value: &str) -> String {
    let sanitized = value
        .chars()
        .filter(|&c| c == ' ' || c == ',' || is_cookie_octet(c))
        .collect::<String>();
    if sanitized.len() != value.len() {
        debug!("Dropped invalid characters from cookie value {value:?}");
    }

    if sanitized.contains(|c| c == ' ' || c == ',') {
        format!("\"{sanitized}\"")
    } else {
        sanitized
    }
}

/// Encodes a full cookie set into a single `Cookie` header value. Cookies keep their original
/// encoding unless their value changed.
pub(crate) fn encode_cookies(cookies: &[Cookie]) -> String {
    cookies
        .iter()
        .map(|cookie| format!("{}={}", cookie.name, cookie.encoded_value()))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Mutable view of an HTTP request
///
/// Header names are matched case-insensitively. Header values that cannot be decoded as text
/// are not exposed and have to be left alone.
pub trait MutableRequest {
    /// Returns the first value of a header if it can be decoded.
    fn header_value(&self, name: &str) -> Option<&str>;

    /// Returns all values of a header that can be decoded.
    fn header_values(&self, name: &str) -> Vec<&str>;

    /// Returns the names of all headers present.
    fn header_names(&self) -> Vec<String>;

    /// Replaces all values of a header by the given value.
    fn set_header_value(&mut self, name: &str, value: &str) -> Result<(), TokenModifierError>;

    /// Replaces the values returned by [`header_values`](Self::header_values) by a single
    /// value, `None` removes them. Values that cannot be decoded are kept.
    fn replace_header_text(
        &mut self,
        name: &str,
        value: Option<&str>,
    ) -> Result<(), TokenModifierError>;

    /// Returns the raw query string without the leading `?`.
    fn query_string(&self) -> Option<&str>;

    /// Replaces the query string, an empty string removes it.
    fn set_query_string(&mut self, query: &str) -> Result<(), TokenModifierError>;

    /// Returns all cookies sent with the request.
    fn cookies(&self) -> Vec<Cookie> {
        parse_cookies(self.header_values(COOKIE))
    }

    /// Replaces the `Cookie` headers by a single header encoding the given cookies.
    /// `Cookie` headers that cannot be decoded stay unchanged.
    fn replace_cookies(&mut self, cookies: &[Cookie]) -> Result<(), TokenModifierError> {
        if cookies.is_empty() {
            self.replace_header_text(COOKIE, None)
        } else {
            self.replace_header_text(COOKIE, Some(&encode_cookies(cookies)))
        }
    }
}

impl MutableRequest for RequestHeader {
    fn header_value(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect()
    }

    fn header_names(&self) -> Vec<String> {
        self.headers
            .keys()
            .map(|name| name.as_str().to_owned())
            .collect()
    }

    fn set_header_value(&mut self, name: &str, value: &str) -> Result<(), TokenModifierError> {
        self.insert_header(name.to_owned(), value)
            .map_err(|err| TokenModifierError::InvalidHeader {
                name: name.to_owned(),
                message: err.to_string(),
            })
    }

    fn replace_header_text(
        &mut self,
        name: &str,
        value: Option<&str>,
    ) -> Result<(), TokenModifierError> {
        let kept = self
            .headers
            .get_all(name)
            .iter()
            .filter(|header| header.to_str().is_err())
            .cloned()
            .collect::<Vec<_>>();

        if let Some(value) = value {
            self.set_header_value(name, value)?;
        } else {
            self.remove_header(name);
        }

        for header in kept {
            self.append_header(name.to_owned(), header)
                .map_err(|err| TokenModifierError::InvalidHeader {
                    name: name.to_owned(),
                    message: err.to_string(),
                })?;
        }
        Ok(())
    }

    fn query_string(&self) -> Option<&str> {
        self.uri.query()
    }

    fn set_query_string(&mut self, query: &str) -> Result<(), TokenModifierError> {
        let path = self.uri.path();
        let path_and_query = if query.is_empty() {
            path.to_owned()
        } else {
            format!("{path}?{query}")
        };
        let path_and_query = PathAndQuery::try_from(path_and_query)
            .map_err(|err| TokenModifierError::InvalidUri(err.to_string()))?;

        let mut parts = self.uri.clone().into_parts();
        parts.path_and_query = Some(path_and_query);
        let uri = Uri::from_parts(parts)
            .map_err(|err| TokenModifierError::InvalidUri(err.to_string()))?;
        self.set_uri(uri);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use http::HeaderValue;
    use test_log::test;

    #[test]
    fn cookie_parsing() {
        assert_eq!(
            parse_cookies(["session=abc123; theme=\"dark\"", "broken; =x;lang=en"]),
            [
                Cookie::new("session", "abc123"),
                Cookie::new("theme", "dark"),
                Cookie::new("lang", "en"),
            ]
        );
        assert!(parse_cookies(Vec::<&str>::new()).is_empty());
    }

    #[test]
    fn unchanged_cookies_keep_encoding() {
        let mut cookies = parse_cookies(["theme=\"dark\"; session=abc; spaced=\"a b\""]);
        assert_eq!(
            encode_cookies(&cookies),
            "theme=\"dark\"; session=abc; spaced=\"a b\""
        );

        cookies[1].value = "modified_abc".to_owned();
        cookies[2].value = "a b c".to_owned();
        assert_eq!(
            encode_cookies(&cookies),
            "theme=\"dark\"; session=modified_abc; spaced=\"a b c\""
        );
    }

    #[test]
    fn cookie_encoding() {
        assert_eq!(
            encode_cookies(&[
                Cookie::new("session", "modified_abc123"),
                Cookie::new("spaced", "a b"),
                Cookie::new("evil", "x;y\"z"),
            ]),
            "session=modified_abc123; spaced=\"a b\"; evil=xyz"
        );
    }

    #[test]
    fn request_header_access() {
        let mut request = RequestHeader::build("GET", b"/path?token=abc", None).unwrap();
        request.insert_header("Authorization", "Bearer abc").unwrap();
        request.append_header("Cookie", "a=1").unwrap();
        request.append_header("Cookie", "b=2").unwrap();

        assert_eq!(request.header_value("authorization"), Some("Bearer abc"));
        assert_eq!(request.header_values("cookie"), ["a=1", "b=2"]);
        assert_eq!(request.header_names(), ["authorization", "cookie"]);
        assert_eq!(request.query_string(), Some("token=abc"));

        request.set_header_value("Authorization", "Basic xyz").unwrap();
        assert_eq!(request.header_value("Authorization"), Some("Basic xyz"));
        assert!(matches!(
            request.set_header_value("Authorization", "line\nbreak"),
            Err(TokenModifierError::InvalidHeader { .. })
        ));

        request.set_query_string("token=def&x=1").unwrap();
        assert_eq!(request.uri.to_string(), "/path?token=def&x=1");
        request.set_query_string("").unwrap();
        assert_eq!(request.uri.to_string(), "/path");
    }

    #[test]
    fn replacing_cookies() {
        let mut request = RequestHeader::build("GET", b"/", None).unwrap();
        request.append_header("Cookie", "a=1").unwrap();
        request.append_header("Cookie", "b=2").unwrap();

        let mut cookies = request.cookies();
        cookies[1].value = "3".to_owned();
        request.replace_cookies(&cookies).unwrap();
        assert_eq!(request.header_values("Cookie"), ["a=1; b=3"]);

        request.replace_cookies(&[]).unwrap();
        assert!(request.header_values("Cookie").is_empty());
    }

    #[test]
    fn undecodable_cookie_headers_are_kept() {
        let mut request = RequestHeader::build("GET", b"/", None).unwrap();
        request.append_header("Cookie", "session=abc123").unwrap();
        request
            .append_header("Cookie", HeaderValue::from_bytes(b"pref=caf\xc3\xa9").unwrap())
            .unwrap();
        assert_eq!(request.cookies(), [Cookie::new("session", "abc123")]);

        request
            .replace_cookies(&[Cookie::new("session", "modified_abc123")])
            .unwrap();
        let values = request
            .headers
            .get_all("Cookie")
            .iter()
            .map(|value| value.as_bytes())
            .collect::<Vec<_>>();
        assert_eq!(
            values,
            [
                b"session=modified_abc123".as_slice(),
                b"pref=caf\xc3\xa9".as_slice()
            ]
        );

        request.replace_cookies(&[]).unwrap();
        assert_eq!(request.header_values("Cookie"), Vec::<&str>::new());
        assert_eq!(request.headers.get_all("Cookie").iter().count(), 1);
    }
}
