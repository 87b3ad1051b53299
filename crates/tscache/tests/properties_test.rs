//! Property-based tests for the core invariants.
//!
//! Uses proptest to check canonicalization, the timestamp codec, range
//! containment, point uniqueness, ID monotonicity and structure gating over
//! arbitrary inputs.

use alopex_tscache::tree::canonicalize;
use alopex_tscache::{CacheError, CacheTree, OrderedTimeseries, TimeseriesRegistry, Timestamp};
use proptest::prelude::*;
use std::collections::BTreeSet;

/// Epoch milliseconds between 1970 and roughly 2100.
fn millis_strategy() -> impl Strategy<Value = i64> {
    0i64..4_102_444_800_000
}

/// Whole-hour and half-hour offsets in seconds, within ±14h.
fn offset_strategy() -> impl Strategy<Value = i32> {
    (-28i32..=28).prop_map(|half_hours| half_hours * 1_800)
}

fn timestamp_strategy() -> impl Strategy<Value = Timestamp> {
    (millis_strategy(), offset_strategy()).prop_map(|(millis, seconds)| {
        let offset = chrono::FixedOffset::east_opt(seconds).unwrap();
        Timestamp::with_offset(millis, offset)
    })
}

/// Distinct timestamps as canonical text.
fn timestamps_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set(millis_strategy(), 0..40).prop_map(|set| {
        set.into_iter()
            .map(|millis| Timestamp::from_millis(millis).format())
            .collect()
    })
}

fn attribute_names() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z_][a-z0-9_]{0,6}", 1..6)
}

proptest! {
    /// Any permutation of an attribute list canonicalizes to the same text.
    #[test]
    fn test_canonicalize_permutation_invariant(
        names in attribute_names(),
        seed in any::<u64>(),
    ) {
        let mut shuffled = names.clone();
        // Deterministic rotation by seed, then reversal.
        let len = shuffled.len();
        shuffled.rotate_left((seed as usize) % len);
        shuffled.reverse();

        let a = canonicalize(&names.join(","));
        let b = canonicalize(&shuffled.join(","));
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(canonicalize(&a), a);
    }

    /// Parsing a formatted timestamp yields the same instant and the same text.
    #[test]
    fn test_timestamp_round_trip(ts in timestamp_strategy()) {
        let text = ts.format();
        let parsed: Timestamp = text.parse().unwrap();
        prop_assert_eq!(parsed, ts);
        prop_assert_eq!(parsed.millis(), ts.millis());
        prop_assert_eq!(parsed.format(), text);
    }

    /// `range_between` returns exactly the stored keys in `[a, b]`, ascending.
    #[test]
    fn test_range_between_containment(
        timestamps in timestamps_strategy(),
        a in millis_strategy(),
        b in millis_strategy(),
    ) {
        let values: Vec<usize> = (0..timestamps.len()).collect();
        let series = OrderedTimeseries::new(&timestamps, values).unwrap();
        let (from, to) = (Timestamp::from_millis(a), Timestamp::from_millis(b));

        let range = series.range_between(from, to);
        let got: Vec<i64> = range.iter().map(|(ts, _)| ts.millis()).collect();
        let expected: Vec<i64> = series
            .iter()
            .map(|(ts, _)| ts.millis())
            .filter(|&m| a <= m && m <= b)
            .collect();

        prop_assert_eq!(got, expected);
        prop_assert!(range.windows(2).all(|pair| pair[0].0 < pair[1].0));
    }

    /// After `add_points`, old points are unchanged, new points appear once,
    /// and re-adding any overlap fails.
    #[test]
    fn test_add_points_uniqueness(
        existing in timestamps_strategy(),
        extra in timestamps_strategy(),
    ) {
        let existing_set: BTreeSet<&String> = existing.iter().collect();
        let fresh: Vec<String> = extra
            .into_iter()
            .filter(|ts| !existing_set.contains(ts))
            .collect();

        let old_values: Vec<String> = existing.iter().map(|ts| format!("old:{ts}")).collect();
        let mut series = OrderedTimeseries::new(&existing, old_values).unwrap();
        let new_values: Vec<String> = fresh.iter().map(|ts| format!("new:{ts}")).collect();
        series.add_points(&fresh, new_values).unwrap();

        prop_assert_eq!(series.size(), existing.len() + fresh.len());
        for ts in &existing {
            let key: Timestamp = ts.parse().unwrap();
            prop_assert_eq!(series.get_one(&key), Some(&format!("old:{ts}")));
        }

        if let Some(overlap) = existing.first().or(fresh.first()) {
            let result = series.add_points(&[overlap.clone()], vec!["again".to_string()]);
            prop_assert!(matches!(result, Err(CacheError::PointsAlreadyExist(_))));
        }
    }

    /// Every successful allocation takes exactly the next ID.
    #[test]
    fn test_allocation_ids_monotonic(
        origin in 0u64..1_000_000,
        batches in prop::collection::vec(timestamps_strategy(), 1..10),
    ) {
        let registry: TimeseriesRegistry<String> = TimeseriesRegistry::with_origin(origin);
        for (offset, timestamps) in batches.iter().enumerate() {
            let values = vec!["v".to_string(); timestamps.len()];
            let id = registry.allocate(timestamps, values).unwrap();
            prop_assert_eq!(id, origin + offset as u64);
        }
    }

    /// An instance key is accepted iff its attribute names match the definition.
    #[test]
    fn test_structure_gating(
        definition in attribute_names(),
        key_names in attribute_names(),
        value in "[a-z0-9]{0,4}",
    ) {
        let mut tree: CacheTree<String> = CacheTree::new();
        tree.add_namespace("ns").unwrap();
        tree.add_structure("ns", "st", &definition.join(",")).unwrap();

        let key = key_names
            .iter()
            .map(|name| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join(",");
        let result = tree.add_structure_instance("ns", "st", &key, None);

        let mut want = definition.clone();
        want.sort();
        let mut have = key_names.clone();
        have.sort();

        if want == have {
            prop_assert!(result.is_ok());
        } else {
            prop_assert!(matches!(result, Err(CacheError::StructureMismatch { .. })), "expected StructureMismatch, got {:?}", result);
        }
    }
}
