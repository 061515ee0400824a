//! Loading retry settings from configuration.

use std::time::Duration;
use steadfast::{RetryPolicyBuilder, RetrySettings};

#[test]
fn test_settings_json_roundtrip() {
    let settings = RetrySettings {
        attempts: 4,
        delay: Duration::from_millis(250),
        max_delay: Some(Duration::from_secs(5)),
        max_jitter: Duration::from_millis(50),
        last_error_only: true,
        wrap_cancel_with_last_error: false,
    };

    let json = serde_json::to_string(&settings).unwrap();
    let parsed: RetrySettings = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, settings);
}

#[test]
fn test_missing_fields_use_defaults() {
    let parsed: RetrySettings = serde_json::from_str(r#"{ "attempts": 0 }"#).unwrap();

    assert_eq!(parsed.attempts, 0);
    assert_eq!(parsed.delay, RetrySettings::default().delay);
    assert_eq!(parsed.max_delay, None);
}

#[test]
fn test_settings_seed_a_policy() {
    let parsed: RetrySettings = serde_json::from_str(
        r#"{ "attempts": 2, "max_delay": { "secs": 1, "nanos": 0 }, "last_error_only": true }"#,
    )
    .unwrap();

    let policy = RetryPolicyBuilder::<std::io::Error>::from_settings(parsed)
        .build()
        .unwrap();

    assert_eq!(policy.attempts(), 2);
    assert_eq!(policy.max_delay(), Some(Duration::from_secs(1)));
    assert!(policy.last_error_only());
}
