//! Shared proptest generators.
//!
//! This module provides reusable generators for connection parameters,
//! credentials and timing values.

use aws_connector::params::{AWS_REGIONS, ACCESS_KEY_ID_PARAM, REGION_NAME_PARAM, SECRET_ACCESS_KEY_PARAM};
use proptest::prelude::*;
use std::collections::HashMap;
use std::time::Duration;

/// Generate long-lived access key IDs.
pub fn access_key_id_strategy() -> impl Strategy<Value = String> {
    "AKIA[A-Z0-9]{16}"
}

/// Generate session access key IDs.
pub fn session_key_id_strategy() -> impl Strategy<Value = String> {
    "ASIA[A-Z0-9]{16}"
}

/// Generate secret access keys (40 characters).
pub fn secret_access_key_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9/+]{40}"
}

/// Generate known regions.
pub fn region_strategy() -> impl Strategy<Value = String> {
    proptest::sample::select(AWS_REGIONS).prop_map(str::to_string)
}

/// Generate session durations the provider accepts, in minutes.
pub fn session_duration_minutes_strategy() -> impl Strategy<Value = u32> {
    15u32..=2160
}

/// Generate session durations the provider rejects, in minutes.
pub fn invalid_session_duration_minutes_strategy() -> impl Strategy<Value = u32> {
    prop_oneof![0u32..15, 2161u32..100_000]
}

/// Generate session lifetimes the provider accepts.
pub fn session_duration_strategy() -> impl Strategy<Value = Duration> {
    session_duration_minutes_strategy().prop_map(|minutes| Duration::from_secs(u64::from(minutes) * 60))
}

/// Generate valid static connection parameters.
pub fn static_params_strategy() -> impl Strategy<Value = HashMap<String, String>> {
    (
        access_key_id_strategy(),
        secret_access_key_strategy(),
        region_strategy(),
    )
        .prop_map(|(access_key_id, secret, region)| {
            HashMap::from([
                (ACCESS_KEY_ID_PARAM.to_string(), access_key_id),
                (SECRET_ACCESS_KEY_PARAM.to_string(), secret),
                (REGION_NAME_PARAM.to_string(), region),
            ])
        })
}

/// Generate log levels.
pub fn log_level_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("trace".to_string()),
        Just("debug".to_string()),
        Just("info".to_string()),
        Just("warn".to_string()),
        Just("error".to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::strategy::ValueTree;
    use proptest::test_runner::TestRunner;

    #[test]
    fn test_access_key_id_format() {
        let mut runner = TestRunner::default();
        for _ in 0..10 {
            let value = access_key_id_strategy()
                .new_tree(&mut runner)
                .unwrap()
                .current();
            assert!(value.starts_with("AKIA"));
            assert_eq!(value.len(), 20);
        }
    }

    #[test]
    fn test_session_duration_range() {
        let mut runner = TestRunner::default();
        for _ in 0..10 {
            let value = session_duration_strategy()
                .new_tree(&mut runner)
                .unwrap()
                .current();
            assert!(value >= Duration::from_secs(15 * 60));
            assert!(value <= Duration::from_secs(2160 * 60));
        }
    }

    #[test]
    fn test_region_is_known() {
        let mut runner = TestRunner::default();
        for _ in 0..10 {
            let value = region_strategy().new_tree(&mut runner).unwrap().current();
            assert!(AWS_REGIONS.contains(&value.as_str()));
        }
    }
}
