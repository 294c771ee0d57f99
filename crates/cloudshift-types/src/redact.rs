//! Redaction of sensitive attribute values
//!
//! Only the names of sensitive attributes survive discovery unless the caller
//! opts in with `include_sensitive`.

use serde_json::Value;

/// Placeholder written in place of a sensitive value
pub const REDACTED: &str = "***REDACTED***";

const SENSITIVE_NAMES: &[&str] = &[
    "password",
    "passwd",
    "secret",
    "token",
    "private_key",
    "privatekeydata",
    "api_key",
    "credentials",
    "startup_script",
    "user_data",
    "secret_data",
    "secretdata",
    "auth_string",
    "authstring",
];

const SENSITIVE_SUFFIXES: &[&str] = &[
    "password",
    "_secret",
    "_token",
    "private_key",
    "_api_key",
    "startup_script",
];

/// Heuristic: attribute names that carry secrets or bulk payloads
///
/// Identifiers that merely mention a secret (`secret_id`, `kms_key_name`)
/// are not sensitive.
pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.to_ascii_lowercase().replace('-', "_");
    SENSITIVE_NAMES.contains(&normalized.as_str())
        || SENSITIVE_SUFFIXES
            .iter()
            .any(|suffix| normalized.ends_with(suffix))
}

/// Replace values of sensitive keys with `REDACTED`, recursing into maps and lists
///
/// Returns the number of values replaced. Null values are left as they are.
pub fn redact_sensitive(value: &mut Value) -> usize {
    match value {
        Value::Object(map) => {
            let mut redacted = 0;
            for (key, entry) in map.iter_mut() {
                if is_sensitive_key(key) && !entry.is_null() {
                    *entry = Value::String(REDACTED.to_string());
                    redacted += 1;
                } else {
                    redacted += redact_sensitive(entry);
                }
            }
            redacted
        }
        Value::Array(items) => items.iter_mut().map(redact_sensitive).sum(),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sensitive_keys() {
        assert!(is_sensitive_key("root_password"));
        assert!(is_sensitive_key("startup-script"));
        assert!(is_sensitive_key("API_KEY"));
        assert!(is_sensitive_key("rootPassword"));
        assert!(is_sensitive_key("client_secret"));
        assert!(is_sensitive_key("metadata_startup_script"));
        assert!(!is_sensitive_key("machine_type"));
        assert!(!is_sensitive_key("secret_id"));
        assert!(!is_sensitive_key("token_uri_hint_enabled"));
    }

    #[test]
    fn test_redacts_nested_values_and_keeps_keys() {
        let mut value = json!({
            "name": "db",
            "settings": { "password": "hunter2", "tier": "db-f1-micro" },
            "users": [{ "name": "app", "password": "s3cret" }],
            "secret_ref": null
        });

        let count = redact_sensitive(&mut value);

        assert_eq!(count, 2);
        assert_eq!(value["settings"]["password"], REDACTED);
        assert_eq!(value["settings"]["tier"], "db-f1-micro");
        assert_eq!(value["users"][0]["password"], REDACTED);
        assert!(value["secret_ref"].is_null());
    }
}
