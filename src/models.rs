//! Records stored in the key-value store, response bodies, and helpers for
//! reading loosely typed request fields.
//!
//! Both the server and the client speak these types, so they live outside
//! the `server` feature.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Storage key holding the license mapping.
pub const LICENSES_KEY: &str = "licenses";

/// Storage key holding the heartbeat mapping.
pub const HEARTBEATS_KEY: &str = "heartbeats";

/// A user counts as online while their last heartbeat is younger than this.
pub const ONLINE_THRESHOLD_MS: i64 = 20_000;

/// An issued license, keyed by license key in the `licenses` mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseRecord {
    pub owner: String,
    /// Milliseconds since the Unix epoch.
    pub created: i64,
    /// Stored as given (any truthy value, otherwise `null`). Nothing
    /// enforces it.
    #[serde(default)]
    pub expires: Value,
    /// Free-form hardware binding hint, not enforced.
    #[serde(default)]
    pub hwid: String,
}

/// Most recent heartbeat of a user, keyed by user in the `heartbeats` mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatRecord {
    /// License key used by the latest successful heartbeat.
    pub key: String,
    /// Milliseconds since the Unix epoch.
    pub last: i64,
    #[serde(default)]
    pub meta: Value,
}

impl HeartbeatRecord {
    /// `last` of a stored heartbeat entry, if it has a usable one.
    pub fn stored_last(entry: &Value) -> Option<i64> {
        let last = entry.get("last")?;
        last.as_i64().or_else(|| last.as_f64().map(|ms| ms as i64))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub ok: bool,
    pub valid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub ok: bool,
    pub saved: bool,
    /// Value written to the heartbeat record's `last`.
    pub timestamp: i64,
}

/// `last`, `human_last` and `meta` are only present when the user has a
/// heartbeat record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub ok: bool,
    pub online: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_last: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl StatusResponse {
    /// Response for a user that never sent a heartbeat.
    pub fn offline() -> Self {
        Self {
            ok: true,
            online: false,
            last: None,
            human_last: None,
            meta: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddLicenseResponse {
    pub ok: bool,
    pub added: bool,
    pub key: String,
    /// The stored license record.
    pub meta: LicenseRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListHeartbeatsResponse {
    pub ok: bool,
    /// The heartbeat mapping exactly as stored.
    pub heartbeats: Map<String, Value>,
}

/// JSON truthiness: `null`, `false`, `0` and `""` are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Field `name` of a request body, or `None` when the body is not an object
/// or the field is falsy.
pub fn truthy_field<'a>(body: &'a Value, name: &str) -> Option<&'a Value> {
    body.get(name).filter(|v| is_truthy(v))
}

/// Field `name` as a mapping key.
///
/// Strings are taken as-is and numbers or `true` by their JSON text.
/// Falsy values, arrays and objects yield `None`. Each field is read on its
/// own, so a wrongly typed neighbour never hides a usable one.
pub fn text_field(body: &Value, name: &str) -> Option<String> {
    match truthy_field(body, name)? {
        Value::String(s) => Some(s.clone()),
        scalar @ (Value::Number(_) | Value::Bool(_)) => Some(scalar.to_string()),
        _ => None,
    }
}

/// Treat empty strings the same as absent fields.
pub fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// `now - last < ONLINE_THRESHOLD_MS`.
pub fn is_online(last_ms: i64, now_ms: i64) -> bool {
    now_ms.saturating_sub(last_ms) < ONLINE_THRESHOLD_MS
}

/// Render epoch milliseconds as `YYYY-MM-DDTHH:MM:SS.sssZ`.
///
/// Out-of-range timestamps render as an empty string.
pub fn iso8601(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn online_threshold_is_strict() {
        assert!(is_online(1_000, 1_000));
        assert!(is_online(1_000, 1_000 + ONLINE_THRESHOLD_MS - 1));
        assert!(!is_online(1_000, 1_000 + ONLINE_THRESHOLD_MS));
        assert!(!is_online(1_000, 1_000 + ONLINE_THRESHOLD_MS + 1));
    }

    #[test]
    fn iso8601_matches_javascript_style() {
        assert_eq!(iso8601(0), "1970-01-01T00:00:00.000Z");
        assert_eq!(iso8601(1_700_000_000_123), "2023-11-14T22:13:20.123Z");
    }

    #[test]
    fn non_object_body_has_no_fields() {
        assert_eq!(text_field(&json!([1, 2, 3]), "key"), None);
        assert_eq!(text_field(&json!("ABC"), "key"), None);
    }

    #[test]
    fn fields_are_read_independently() {
        let body = json!({"key": "K", "owner": "alice", "expires": 1_700_000_000_000.0, "hwid": 7});
        assert_eq!(text_field(&body, "key").as_deref(), Some("K"));
        assert_eq!(text_field(&body, "owner").as_deref(), Some("alice"));
        assert_eq!(truthy_field(&body, "expires"), Some(&json!(1_700_000_000_000.0)));
        assert_eq!(text_field(&body, "hwid").as_deref(), Some("7"));
    }

    #[test]
    fn numeric_user_is_a_key() {
        assert_eq!(text_field(&json!({"user": 42}), "user").as_deref(), Some("42"));
        assert_eq!(text_field(&json!({"user": 0}), "user"), None);
        assert_eq!(text_field(&json!({"user": {"a": 1}}), "user"), None);
        assert_eq!(text_field(&json!({"user": ""}), "user"), None);
    }

    #[test]
    fn truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!(0.0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!("2030-01-01")));
        assert!(is_truthy(&json!([])));
        assert!(is_truthy(&json!({})));
    }

    #[test]
    fn stored_last_accepts_integral_and_float() {
        assert_eq!(HeartbeatRecord::stored_last(&json!({"last": 10})), Some(10));
        assert_eq!(HeartbeatRecord::stored_last(&json!({"last": 10.7})), Some(10));
        assert_eq!(HeartbeatRecord::stored_last(&json!({"last": "x"})), None);
        assert_eq!(HeartbeatRecord::stored_last(&json!("garbage")), None);
    }

    #[test]
    fn empty_string_is_not_present() {
        assert_eq!(present(Some("")), None);
        assert_eq!(present(Some("x")), Some("x"));
        assert_eq!(present(None), None);
    }

    #[test]
    fn license_record_serializes_null_expiry() {
        let record = LicenseRecord {
            owner: "alice".into(),
            created: 42,
            expires: Value::Null,
            hwid: String::new(),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({"owner": "alice", "created": 42, "expires": null, "hwid": ""})
        );
    }
}
