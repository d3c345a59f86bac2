//! Interval codec tests.
//!
//! The triple mapping must be a bijection over the whole year:
//! every hour decodes to exactly one key and encodes straight back.

use infraplan_core::{
    error::PlanError,
    interval::{self, IntervalKey, MAX_HOUR},
};
use std::collections::HashSet;

#[test]
fn every_hour_round_trips() {
    for h in 1..=MAX_HOUR {
        let key = interval::decode_triple(h).unwrap();
        let back = interval::encode_triple(key).unwrap();
        assert_eq!(back, h, "hour {h} decoded to {key:?} but encoded back to {back}");
    }
}

#[test]
fn no_two_hours_share_a_key() {
    let keys: HashSet<IntervalKey> = (1..=MAX_HOUR)
        .map(|h| interval::decode_triple(h).unwrap())
        .collect();
    assert_eq!(keys.len(), MAX_HOUR as usize, "duplicate interval keys produced");
}

#[test]
fn known_vectors() {
    let cases = [
        (1, (1, 1, 1)),
        (24, (1, 1, 24)),
        (25, (1, 2, 1)),
        (238, (2, 3, 22)),
        (670, (4, 7, 22)),
        (672, (4, 7, 24)),
    ];
    for (hour, (season, day, period)) in cases {
        assert_eq!(
            interval::decode_triple(hour).unwrap(),
            IntervalKey::new(season, day, period),
            "decode_triple({hour})"
        );
    }
}

#[test]
fn representative_weeks_end_at_hour_672() {
    assert!(interval::decode_triple(672).unwrap().is_representative());
    assert!(!interval::decode_triple(673).unwrap().is_representative());
    assert_eq!(interval::decode_triple(8760).unwrap(), IntervalKey::new(53, 1, 24));
}

#[test]
fn out_of_range_hours_are_rejected() {
    for h in [0, MAX_HOUR + 1] {
        match interval::decode_triple(h) {
            Err(PlanError::Range { hour, .. }) => assert_eq!(hour, h as i64),
            other => panic!("expected Range error for {h}, got {other:?}"),
        }
    }
}

#[test]
fn invalid_keys_are_rejected() {
    for key in [
        IntervalKey::new(0, 1, 1),
        IntervalKey::new(1, 8, 1),
        IntervalKey::new(1, 1, 25),
        IntervalKey::new(53, 2, 1), // past hour 8760
    ] {
        assert!(
            matches!(interval::encode_triple(key), Err(PlanError::KeyRange { .. })),
            "{key:?} should not encode"
        );
    }
}

#[test]
fn pair_keys_parse() {
    assert_eq!(interval::decode_pair("1_1").unwrap(), (1, 1));
    assert_eq!(interval::decode_pair("4_168").unwrap(), (4, 168));
    assert_eq!(interval::decode_pair("2_49").unwrap(), (2, 49));
}

#[test]
fn malformed_pair_keys_fail_with_format_error() {
    for key in ["", "1", "1_2_3", "a_1", "1_b", "1_0", "1_169"] {
        assert!(
            matches!(interval::decode_pair(key), Err(PlanError::Format { .. })),
            "'{key}' should be a format error"
        );
    }
}

#[test]
fn day_of_period_covers_the_week() {
    assert_eq!(interval::day_of_period(1), 1);
    assert_eq!(interval::day_of_period(24), 1);
    assert_eq!(interval::day_of_period(25), 2);
    assert_eq!(interval::day_of_period(168), 7);
}

#[test]
fn pair_and_triple_forms_agree() {
    for h in [1, 24, 25, 238, 670, 672, 4000, 8760] {
        let pair = interval::pair_from_hour(h).unwrap();
        assert_eq!(interval::hour_from_pair(&pair).unwrap(), h, "pair '{pair}' for hour {h}");
    }
    assert_eq!(interval::pair_from_hour(238).unwrap(), "2_70");
}
