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

//! Input validation for request bodies.
//!
//! Each body-accepting endpoint declares its shape here. Failures
//! collect every failing field into a `details` map rather than
//! stopping at the first.

use axum::body::Bytes;
use axum::http::{header, HeaderMap};
use serde_json::{Map, Value};

use crate::api::ApiError;
use crate::store::{NewUser, UserPatch};

/// Maximum tool name length accepted on the dispatch endpoint
pub const MAX_TOOL_NAME_LENGTH: usize = 100;

/// Minimum password length accepted at login
pub const MIN_PASSWORD_LENGTH: usize = 4;

/// Maximum length for any user-supplied text field
pub const MAX_FIELD_LENGTH: usize = 255;

/// Accumulates per-field failure messages in marshmallow's shape:
/// `{"field": ["message", ...]}`.
#[derive(Default)]
struct FieldErrors {
    fields: Map<String, Value>,
}

impl FieldErrors {
    fn push(&mut self, field: &str, message: impl Into<String>) {
        let entry = self
            .fields
            .entry(field.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(messages) = entry {
            messages.push(Value::String(message.into()));
        }
    }

    fn finish(self) -> Result<(), ApiError> {
        if self.fields.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation {
                details: Value::Object(self.fields),
            })
        }
    }
}

/// Parse a request body as JSON, rejecting wrong content types and
/// unparseable payloads before any schema check runs.
pub fn parse_json_body(headers: &HeaderMap, body: &Bytes) -> Result<Value, ApiError> {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        .unwrap_or(false);
    if !is_json {
        return Err(ApiError::BadRequest(
            "Content-Type must be application/json".to_string(),
        ));
    }

    serde_json::from_slice(body)
        .map_err(|_| ApiError::BadRequest("Invalid JSON payload".to_string()))
}

fn required_string<'a>(
    object: &'a Map<String, Value>,
    field: &str,
    errors: &mut FieldErrors,
) -> Option<&'a str> {
    match object.get(field) {
        None | Some(Value::Null) => {
            errors.push(field, "Missing required field");
            None
        }
        Some(Value::String(s)) => Some(s),
        Some(_) => {
            errors.push(field, "Must be a string");
            None
        }
    }
}

fn optional_string(
    object: &Map<String, Value>,
    field: &str,
    errors: &mut FieldErrors,
) -> Option<String> {
    match object.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => {
            if s.len() > MAX_FIELD_LENGTH {
                errors.push(field, format!("Must be at most {MAX_FIELD_LENGTH} characters"));
                None
            } else {
                Some(s.clone())
            }
        }
        Some(_) => {
            errors.push(field, "Must be a string");
            None
        }
    }
}

fn as_object<'a>(value: &'a Value) -> Result<&'a Map<String, Value>, ApiError> {
    value
        .as_object()
        .ok_or_else(|| ApiError::BadRequest("Request body must be a JSON object".to_string()))
}

/// Login body: `{username, password}`. Username must be non-empty after
/// trimming; password has a minimum length.
pub fn validate_login(body: &Value) -> Result<(String, String), ApiError> {
    let object = as_object(body)?;
    let mut errors = FieldErrors::default();

    let username = required_string(object, "username", &mut errors)
        .filter(|s| {
            if s.trim().is_empty() {
                errors.push("username", "Must not be empty");
                false
            } else {
                true
            }
        })
        .map(str::to_string);

    let password = required_string(object, "password", &mut errors)
        .filter(|s| {
            if s.len() < MIN_PASSWORD_LENGTH {
                errors.push(
                    "password",
                    format!("Must be at least {MIN_PASSWORD_LENGTH} characters"),
                );
                false
            } else {
                true
            }
        })
        .map(str::to_string);

    errors.finish()?;
    // Both are present once finish() passed.
    Ok((username.unwrap_or_default(), password.unwrap_or_default()))
}

/// Tool-call envelope: `{name, arguments?}`. Arguments default to an
/// empty mapping when absent.
pub fn validate_tool_call(body: &Value) -> Result<(String, Map<String, Value>), ApiError> {
    let object = as_object(body)?;
    let mut errors = FieldErrors::default();

    let name = required_string(object, "name", &mut errors)
        .filter(|s| {
            if s.trim().is_empty() || s.len() > MAX_TOOL_NAME_LENGTH {
                errors.push(
                    "name",
                    format!("Must be 1 to {MAX_TOOL_NAME_LENGTH} characters"),
                );
                false
            } else {
                true
            }
        })
        .map(str::to_string);

    let arguments = match object.get("arguments") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => {
            errors.push("arguments", "Must be an object");
            Map::new()
        }
    };

    errors.finish()?;
    Ok((name.unwrap_or_default(), arguments))
}

/// Arguments for `insert_user`: username and email required non-empty.
pub fn validate_insert_args(args: &Map<String, Value>) -> Result<NewUser, ApiError> {
    let mut errors = FieldErrors::default();

    let mut mandatory = |field: &str, errors: &mut FieldErrors| -> Option<String> {
        required_string(args, field, errors)
            .filter(|s| {
                if s.trim().is_empty() {
                    errors.push(field, "Must not be empty");
                    false
                } else if s.len() > MAX_FIELD_LENGTH {
                    errors.push(field, format!("Must be at most {MAX_FIELD_LENGTH} characters"));
                    false
                } else {
                    true
                }
            })
            .map(str::to_string)
    };

    let username = mandatory("username", &mut errors);
    let email = mandatory("email", &mut errors);
    let first_name = optional_string(args, "first_name", &mut errors);
    let last_name = optional_string(args, "last_name", &mut errors);

    errors.finish()?;
    Ok(NewUser {
        username: username.unwrap_or_default(),
        email: email.unwrap_or_default(),
        first_name,
        last_name,
    })
}

/// A positive 32-bit `user_id` argument.
pub fn validate_user_id(args: &Map<String, Value>) -> Result<i32, ApiError> {
    let mut errors = FieldErrors::default();

    let id = match args.get("user_id") {
        None | Some(Value::Null) => {
            errors.push("user_id", "Missing required field");
            None
        }
        Some(Value::Number(n)) => match n.as_i64() {
            Some(v) if v > 0 && v <= i32::MAX as i64 => Some(v as i32),
            _ => {
                errors.push("user_id", "Must be a positive 32-bit integer");
                None
            }
        },
        Some(_) => {
            errors.push("user_id", "Must be an integer");
            None
        }
    };

    errors.finish()?;
    Ok(id.unwrap_or_default())
}

/// Arguments for `update_user`: a user id plus any subset of the
/// updatable fields. The zero-field case is the store's to reject.
pub fn validate_update_args(args: &Map<String, Value>) -> Result<(i32, UserPatch), ApiError> {
    let id = validate_user_id(args)?;

    let mut errors = FieldErrors::default();
    let patch = UserPatch {
        username: optional_string(args, "username", &mut errors),
        email: optional_string(args, "email", &mut errors),
        first_name: optional_string(args, "first_name", &mut errors),
        last_name: optional_string(args, "last_name", &mut errors),
    };
    errors.finish()?;

    Ok((id, patch))
}

/// The natural-language `query` argument. Empty strings are allowed;
/// the model answers them as it sees fit.
pub fn validate_query_args(args: &Map<String, Value>) -> Result<String, ApiError> {
    let mut errors = FieldErrors::default();
    let query = required_string(args, "query", &mut errors).map(str::to_string);
    errors.finish()?;
    Ok(query.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn json_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        headers
    }

    #[test]
    fn rejects_wrong_content_type() {
        let err = parse_json_body(&HeaderMap::new(), &Bytes::from_static(b"{}")).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn rejects_malformed_json() {
        let err =
            parse_json_body(&json_headers(), &Bytes::from_static(b"{not json")).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn login_collects_all_failing_fields() {
        let err = validate_login(&json!({"username": "  ", "password": "abc"})).unwrap_err();
        match err {
            ApiError::Validation { details } => {
                let details = details.as_object().unwrap();
                assert!(details.contains_key("username"));
                assert!(details.contains_key("password"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn login_accepts_valid_credentials_payload() {
        let (username, password) =
            validate_login(&json!({"username": "admin", "password": "password"})).unwrap();
        assert_eq!(username, "admin");
        assert_eq!(password, "password");
    }

    #[test]
    fn tool_call_defaults_arguments_to_empty() {
        let (name, args) = validate_tool_call(&json!({"name": "get_users"})).unwrap();
        assert_eq!(name, "get_users");
        assert!(args.is_empty());
    }

    #[test]
    fn tool_call_requires_a_name() {
        let err = validate_tool_call(&json!({"arguments": {}})).unwrap_err();
        assert!(matches!(err, ApiError::Validation { .. }));
    }

    #[test]
    fn insert_args_require_username_and_email() {
        let args = json!({"email": "a@b.c"});
        let err = validate_insert_args(args.as_object().unwrap()).unwrap_err();
        match err {
            ApiError::Validation { details } => {
                assert!(details.as_object().unwrap().contains_key("username"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn user_id_must_be_a_positive_integer() {
        for bad in [json!({}), json!({"user_id": "7"}), json!({"user_id": -1})] {
            assert!(validate_user_id(bad.as_object().unwrap()).is_err());
        }
        assert_eq!(
            validate_user_id(json!({"user_id": 7}).as_object().unwrap()).unwrap(),
            7
        );
    }

    #[test]
    fn update_args_build_a_partial_patch() {
        let args = json!({"user_id": 3, "email": "new@example.com"});
        let (id, patch) = validate_update_args(args.as_object().unwrap()).unwrap();
        assert_eq!(id, 3);
        assert_eq!(patch.email.as_deref(), Some("new@example.com"));
        assert!(patch.username.is_none());
    }

    #[test]
    fn query_args_allow_empty_strings() {
        let args = json!({"query": ""});
        assert_eq!(validate_query_args(args.as_object().unwrap()).unwrap(), "");
        assert!(validate_query_args(json!({}).as_object().unwrap()).is_err());
    }
}
