//! Property-based tests for delay strategies

use proptest::prelude::*;
use std::time::Duration;
use steadfast::{backoff_delay, random_delay, DelaySettings, DelayStrategy, RetryPolicy};

const MAX_NANOS: u128 = i64::MAX as u128;

proptest! {
    #[test]
    fn prop_backoff_never_overflows(base_ns in 0u64..=u64::MAX, attempt in any::<u32>()) {
        let settings = DelaySettings::new(Duration::from_nanos(base_ns), Duration::ZERO);
        let delay = backoff_delay(attempt, &settings);
        prop_assert!(delay.as_nanos() <= MAX_NANOS);
        prop_assert!(delay >= Duration::from_nanos(1));
    }

    #[test]
    fn prop_backoff_is_monotonic(base_ms in 1u64..10_000, attempt in 0u32..200) {
        let settings = DelaySettings::new(Duration::from_millis(base_ms), Duration::ZERO);
        prop_assert!(backoff_delay(attempt + 1, &settings) >= backoff_delay(attempt, &settings));
    }

    #[test]
    fn prop_backoff_matches_shift(base_ms in 1u64..1_000, attempt in 0u32..20) {
        let settings = DelaySettings::new(Duration::from_millis(base_ms), Duration::ZERO);
        let expected = Duration::from_millis(base_ms) * (1u32 << attempt);
        prop_assert_eq!(backoff_delay(attempt, &settings), expected);
    }

    #[test]
    fn prop_random_delay_below_ceiling(ceiling_ns in 1u64..1_000_000_000) {
        let settings = DelaySettings::new(Duration::ZERO, Duration::from_nanos(ceiling_ns));
        prop_assert!(random_delay(&settings) < Duration::from_nanos(ceiling_ns));
    }

    #[test]
    fn prop_combine_saturates(parts in prop::collection::vec(any::<u64>(), 0..8)) {
        let settings = DelaySettings::new(Duration::ZERO, Duration::ZERO);
        let strategy = DelayStrategy::<()>::combine(parts.iter().map(|&ns| {
            DelayStrategy::custom(move |_, _, _| Duration::from_nanos(ns))
        }));

        let expected = parts
            .iter()
            .fold(0u128, |acc, &ns| (acc + ns as u128).min(MAX_NANOS));
        prop_assert_eq!(strategy.delay(0, &(), &settings).as_nanos(), expected);
    }

    #[test]
    fn prop_policy_delay_respects_cap(
        base_ms in 1u64..5_000,
        cap_ms in 1u64..60_000,
        attempt in any::<u32>(),
    ) {
        let policy = RetryPolicy::<()>::builder()
            .with_delay(Duration::from_millis(base_ms))
            .with_max_delay(Duration::from_millis(cap_ms))
            .build()
            .unwrap();
        prop_assert!(policy.delay_for(attempt, &()) <= Duration::from_millis(cap_ms));
    }
}
