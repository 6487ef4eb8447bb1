//! Wire batch envelope and sub-response classification.
//!
//! The directory API accepts at most [`WIRE_BATCH_CEILING`] sub-requests per
//! `$batch` call; the client chunks caller batches at this ceiling
//! regardless of the configured batch size.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{BatchItemFailure, BatchResult, UserProfile};
use crate::retry::parse_retry_after;

/// Maximum sub-requests per wire-level batch call.
pub const WIRE_BATCH_CEILING: usize = 20;

/// One sub-request inside a `$batch` envelope.
#[derive(Debug, Serialize)]
pub struct BatchSubRequest {
    pub id: String,
    pub method: String,
    pub url: String,
    pub body: Value,
    pub headers: serde_json::Map<String, Value>,
}

impl BatchSubRequest {
    /// A JSON POST sub-request.
    #[must_use]
    pub fn post(id: usize, url: impl Into<String>, body: Value) -> Self {
        let mut headers = serde_json::Map::new();
        headers.insert("Content-Type".into(), Value::from("application/json"));
        Self {
            id: id.to_string(),
            method: "POST".to_string(),
            url: url.into(),
            body,
            headers,
        }
    }
}

/// `$batch` request envelope.
#[derive(Debug, Serialize)]
pub struct BatchEnvelope {
    pub requests: Vec<BatchSubRequest>,
}

/// One sub-response inside a `$batch` response envelope.
#[derive(Debug, Deserialize)]
pub struct BatchSubResponse {
    pub id: String,
    pub status: u16,
    #[serde(default)]
    pub headers: serde_json::Map<String, Value>,
    #[serde(default)]
    pub body: Option<Value>,
}

impl BatchSubResponse {
    fn retry_after(&self) -> Option<u64> {
        self.headers
            .get("Retry-After")
            .and_then(Value::as_str)
            .and_then(parse_retry_after)
    }

    fn error_code_and_message(&self) -> (String, String) {
        let error = self.body.as_ref().and_then(|b| b.get("error"));
        let code = error
            .and_then(|e| e.get("code"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let message = error
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        (code, message)
    }
}

/// `$batch` response envelope.
#[derive(Debug, Deserialize)]
pub struct BatchResponseEnvelope {
    pub responses: Vec<BatchSubResponse>,
}

/// Whether an error sub-response is a duplicate-object conflict.
///
/// The structured error code is checked first; the message substring is a
/// fallback for responses that carry only human-readable text.
#[must_use]
pub fn is_duplicate_conflict(status: u16, code: &str, message: &str) -> bool {
    if !matches!(status, 400 | 409) {
        return false;
    }
    code == "Request_MultipleObjectsWithSameKeyValue"
        || message.contains("already exists")
        || message.contains("same value for property userPrincipalName")
        || message.contains("ObjectConflict")
}

/// Classifies one wire batch's sub-responses against the profiles submitted.
///
/// Duplicates are recorded as skips (with the source profile retained for
/// reconciliation), never as failures; any 429 sub-response flags the result
/// throttled.
#[must_use]
pub fn classify_responses(
    profiles: &[UserProfile],
    envelope: BatchResponseEnvelope,
) -> BatchResult {
    let mut result = BatchResult {
        total: profiles.len(),
        ..Default::default()
    };

    for response in envelope.responses {
        let index: usize = match response.id.parse() {
            Ok(i) => i,
            Err(_) => continue,
        };
        let item_id = profiles
            .get(index)
            .map(|p| p.log_name().to_string())
            .unwrap_or_else(|| format!("#{index}"));

        if (200..300).contains(&response.status) {
            result.success += 1;
            continue;
        }

        if response.status == 429 {
            result.throttled = true;
            let hint = response.retry_after();
            result.retry_after = match (result.retry_after, hint) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            };
        }

        let (code, message) = response.error_code_and_message();

        if is_duplicate_conflict(response.status, &code, &message) {
            result.skipped += 1;
            result.skipped_ids.push(item_id);
            if let Some(profile) = profiles.get(index) {
                result.duplicate_users.push(profile.clone());
            }
            continue;
        }

        result.failure += 1;
        result.failures.push(BatchItemFailure {
            index,
            item_id,
            status: response.status,
            message: if message.is_empty() { code } else { message },
        });
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn profile(upn: &str) -> UserProfile {
        UserProfile {
            user_principal_name: Some(upn.to_string()),
            ..Default::default()
        }
    }

    fn sub_response(id: usize, status: u16, body: Option<Value>) -> BatchSubResponse {
        BatchSubResponse {
            id: id.to_string(),
            status,
            headers: serde_json::Map::new(),
            body,
        }
    }

    #[test]
    fn test_all_success() {
        let profiles = vec![profile("a@t.com"), profile("b@t.com")];
        let envelope = BatchResponseEnvelope {
            responses: vec![
                sub_response(0, 201, None),
                sub_response(1, 201, None),
            ],
        };

        let result = classify_responses(&profiles, envelope);
        assert_eq!(result.total, 2);
        assert_eq!(result.success, 2);
        assert_eq!(result.failure, 0);
        assert_eq!(result.skipped, 0);
    }

    #[test]
    fn test_duplicates_are_skips_not_failures() {
        let profiles = vec![profile("a@t.com"), profile("b@t.com"), profile("c@t.com")];
        let duplicate_body = json!({
            "error": {
                "code": "Request_BadRequest",
                "message": "Another object with the same value for property userPrincipalName already exists."
            }
        });
        let envelope = BatchResponseEnvelope {
            responses: vec![
                sub_response(0, 201, None),
                sub_response(1, 400, Some(duplicate_body.clone())),
                sub_response(2, 400, Some(duplicate_body)),
            ],
        };

        let result = classify_responses(&profiles, envelope);
        assert_eq!(result.success + result.skipped, 3);
        assert_eq!(result.failure, 0);
        assert_eq!(result.skipped_ids, vec!["b@t.com", "c@t.com"]);
        assert_eq!(result.duplicate_users.len(), 2);
        assert_eq!(
            result.duplicate_users[0].user_principal_name.as_deref(),
            Some("b@t.com")
        );
    }

    #[test]
    fn test_structured_conflict_code_detected() {
        assert!(is_duplicate_conflict(
            409,
            "Request_MultipleObjectsWithSameKeyValue",
            ""
        ));
        assert!(is_duplicate_conflict(400, "", "object already exists"));
        assert!(!is_duplicate_conflict(500, "", "already exists"));
        assert!(!is_duplicate_conflict(400, "Request_BadRequest", "password too weak"));
    }

    #[test]
    fn test_real_failure_recorded_with_detail() {
        let profiles = vec![profile("a@t.com")];
        let envelope = BatchResponseEnvelope {
            responses: vec![sub_response(
                0,
                400,
                Some(json!({"error": {"code": "Request_BadRequest", "message": "Invalid value for accountEnabled."}})),
            )],
        };

        let result = classify_responses(&profiles, envelope);
        assert_eq!(result.failure, 1);
        assert_eq!(result.failures[0].status, 400);
        assert_eq!(result.failures[0].item_id, "a@t.com");
        assert!(result.failures[0].message.contains("accountEnabled"));
    }

    #[test]
    fn test_throttled_sub_response_sets_hint() {
        let profiles = vec![profile("a@t.com")];
        let mut headers = serde_json::Map::new();
        headers.insert("Retry-After".into(), Value::from("17"));
        let envelope = BatchResponseEnvelope {
            responses: vec![BatchSubResponse {
                id: "0".into(),
                status: 429,
                headers,
                body: None,
            }],
        };

        let result = classify_responses(&profiles, envelope);
        assert!(result.throttled);
        assert_eq!(result.retry_after, Some(17));
        assert_eq!(result.failure, 1);
    }

    #[test]
    fn test_envelope_serializes_to_wire_shape() {
        let envelope = BatchEnvelope {
            requests: vec![BatchSubRequest::post(0, "/users", json!({"displayName": "A"}))],
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["requests"][0]["id"], "0");
        assert_eq!(json["requests"][0]["method"], "POST");
        assert_eq!(json["requests"][0]["url"], "/users");
        assert_eq!(json["requests"][0]["headers"]["Content-Type"], "application/json");
    }
}
