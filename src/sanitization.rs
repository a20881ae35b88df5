// Copyright 2025 Userhub Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Heuristic screening of query-string values on read-only endpoints.
//!
//! This is a deny-list keyword filter, not a parser. The store layer
//! always uses bound parameters, so this screen is purely defensive;
//! it rejects obviously hostile query strings before a handler runs.

use axum::{extract::Request, middleware::Next, response::Response};
use regex::Regex;
use std::sync::OnceLock;

use crate::api::ApiError;

/// Patterns flagged as suspicious: statement keywords, comment
/// markers, and always-true boolean shapes.
fn suspicious_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)\b(union|select|insert|delete|drop|update)\b",
            r"(--|/\*|\*/)",
            r"(?i)\bor\b.+=.+\bor\b|\band\b.+=.+\band\b",
        ]
        .iter()
        .map(|pattern| Regex::new(pattern).expect("pattern is valid"))
        .collect()
    })
}

/// Whether a single query-parameter value trips the deny list.
pub fn is_suspicious(value: &str) -> bool {
    suspicious_patterns().iter().any(|re| re.is_match(value))
}

/// Screen every value in a raw query string. Values are taken as the
/// text after each `=`; keys are not screened.
pub fn screen_query_string(query: &str) -> Result<(), ApiError> {
    for pair in query.split('&') {
        let value = pair.split_once('=').map_or(pair, |(_, v)| v);
        if is_suspicious(value) {
            return Err(ApiError::BadRequest(
                "Invalid query parameters detected".to_string(),
            ));
        }
    }
    Ok(())
}

/// Middleware applying the screen to GET requests carrying a query
/// string. Bodies take the full schema validator instead.
pub async fn screen_query_params(request: Request, next: Next) -> Result<Response, ApiError> {
    if request.method() == axum::http::Method::GET {
        if let Some(query) = request.uri().query() {
            screen_query_string(query)?;
        }
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statement_keywords_are_flagged() {
        assert!(is_suspicious("1 UNION SELECT password FROM users"));
        assert!(is_suspicious("drop table users"));
        assert!(is_suspicious("x; DELETE from t"));
    }

    #[test]
    fn comment_markers_are_flagged() {
        assert!(is_suspicious("admin'--"));
        assert!(is_suspicious("foo/*bar*/"));
    }

    #[test]
    fn tautologies_are_flagged() {
        assert!(is_suspicious("1 OR 1=1 OR 2=2"));
        assert!(is_suspicious("a AND 1=1 AND b=b"));
    }

    #[test]
    fn ordinary_values_pass() {
        assert!(!is_suspicious("alice"));
        assert!(!is_suspicious("alice@example.com"));
        assert!(!is_suspicious("page 2 of results"));
    }

    #[test]
    fn query_string_screen_checks_each_value() {
        assert!(screen_query_string("name=alice&page=2").is_ok());
        assert!(screen_query_string("name=1+UNION+SELECT").is_err());
    }
}
