/* Portalgate (AGPL-3.0)

Copyright (C) 2026 - Portalgate Contributors

This program is free software: you can redistribute it and/or modify
it under the terms of the GNU Affero General Public License as published by
the Free Software Foundation, either version 3 of the License, or
(at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU Affero General Public License for more details.

You should have received a copy of the GNU Affero General Public License
along with this program.  If not, see <https://www.gnu.org/licenses/>.

*/

//! The forwarded-path grammar accepts fully qualified URLs embedded in the
//! gateway's path space (`/https://example.com/page`) as well as bare
//! domain-first forms (`/example.com/page`). `url::Url` refuses scheme-less
//! and netloc-less input, so this module carries its own five-part split with
//! generic-URI semantics; the `url` crate takes over once a target is known
//! to be absolute.

/// A structured target URL. Until it passes the guard, `scheme` and `domain`
/// may be empty; afterwards `scheme` is `http`/`https` and `domain` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetUrl {
    pub scheme: String,
    pub domain: String,
    pub path: String,
    pub query: String,
    pub fragment: String,
}

impl TargetUrl {
    /// Reassembles the URL text. Inverse of [`resolve`] for absolute inputs.
    pub fn geturl(&self) -> String {
        let mut url = self.path.clone();
        if !self.domain.is_empty() || url.starts_with("//") {
            if !url.is_empty() && !url.starts_with('/') {
                url = format!("/{url}");
            }
            url = format!("//{}{}", self.domain, url);
        }
        if !self.scheme.is_empty() {
            url = format!("{}:{}", self.scheme, url);
        }
        if !self.query.is_empty() {
            url = format!("{url}?{}", self.query);
        }
        if !self.fragment.is_empty() {
            url = format!("{url}#{}", self.fragment);
        }
        url
    }

    /// URL text without the query/fragment parts, for callers that splice in
    /// the browser's own query string.
    pub fn base_url(&self) -> String {
        let stripped = Self {
            query: String::new(),
            fragment: String::new(),
            ..self.clone()
        };
        stripped.geturl()
    }

    /// `scheme://domain` of this target.
    pub fn origin(&self) -> String {
        format!("{}://{}", self.scheme, self.domain)
    }
}

/// Parses a forwarded path into a [`TargetUrl`], applying an optional origin
/// override whose scheme and netloc replace the parsed ones unconditionally.
///
/// When the original string carried no netloc, the first path segment is
/// promoted to the domain and the remainder becomes the path, so both
/// `/example.com/page` and `/https://example.com/page` resolve. Purely
/// syntactic; no network or side effects.
pub fn resolve(raw: &str, origin_override: Option<&str>) -> TargetUrl {
    let mut parts = split_url(raw);

    if let Some(override_raw) = origin_override {
        let override_parts = split_url(override_raw);
        parts.scheme = override_parts.scheme;
        parts.domain = override_parts.domain;
    }

    if parts.domain.is_empty() {
        let trimmed = parts.path.trim_start_matches('/');
        match trimmed.split_once('/') {
            Some((domain, rest)) => {
                parts.domain = domain.to_string();
                parts.path = format!("/{rest}");
            }
            None => {
                parts.domain = trimmed.to_string();
                parts.path = String::new();
            }
        }
    }

    // A target with a domain but no path means the site root.
    if !parts.domain.is_empty() {
        if parts.path.is_empty() {
            parts.path = "/".to_string();
        } else if !parts.path.starts_with('/') {
            parts.path = format!("/{}", parts.path);
        }
    }

    parts
}

/// Generic five-part URI split (scheme, netloc, path, query, fragment).
fn split_url(raw: &str) -> TargetUrl {
    let (rest, fragment) = match raw.split_once('#') {
        Some((rest, fragment)) => (rest, fragment.to_string()),
        None => (raw, String::new()),
    };
    let (rest, query) = match rest.split_once('?') {
        Some((rest, query)) => (rest, query.to_string()),
        None => (rest, String::new()),
    };

    let (scheme, rest) = match rest.split_once(':') {
        Some((candidate, after)) if is_scheme(candidate) => {
            (candidate.to_ascii_lowercase(), after)
        }
        _ => (String::new(), rest),
    };

    let (domain, path) = if let Some(after) = rest.strip_prefix("//") {
        match after.find('/') {
            Some(idx) => (after[..idx].to_string(), after[idx..].to_string()),
            None => (after.to_string(), String::new()),
        }
    } else {
        (String::new(), rest.to_string())
    };

    TargetUrl {
        scheme,
        domain,
        path,
        query,
        fragment,
    }
}

/// RFC 3986 scheme: ALPHA *( ALPHA / DIGIT / "+" / "-" / "." ).
fn is_scheme(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        _ => false,
    }
}
