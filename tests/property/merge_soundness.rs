//! Property tests for merge soundness.
//!
//! Inputs are generated value trees encoded by the fixture encoder; merger
//! output is validated with the fixture reference decoder, which follows
//! every emitted back-reference. The generators keep string literals at
//! length zero or >= 2: length-1 literals are deduplicated into `COPY`
//! tags that can be wider than the literal they replace, which is a
//! legitimate budget failure exercised deterministically in the scenario
//! suite instead.

use proptest::prelude::*;

use sereal_merge::Merger;

use crate::support::{self, Value};

fn value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Undef),
        Just(Value::True),
        Just(Value::False),
        any::<i64>().prop_map(Value::Int),
        any::<u32>().prop_map(Value::Float),
        any::<u64>().prop_map(Value::Double),
        Just(Value::Str(Vec::new())),
        prop::collection::vec(any::<u8>(), 2..24).prop_map(Value::Str),
    ];
    leaf.prop_recursive(3, 32, 6, |inner| {
        let key = prop::collection::vec(any::<u8>(), 2..10);
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::vec((key, inner.clone()), 0..5).prop_map(Value::Hash),
            ("[A-Za-z][A-Za-z0-9:]{2,12}", inner)
                .prop_map(|(class, payload)| Value::Object(class.into_bytes(), Box::new(payload))),
        ]
    })
}

proptest! {
    /// The decoded output is the concatenation of the appended top-level
    /// values, in order.
    #[test]
    fn merged_output_concatenates_inputs(tops in prop::collection::vec(value_strategy(), 1..5)) {
        let mut merger = Merger::new();
        for top in &tops {
            merger.append(&support::encode_doc(top)).unwrap();
        }
        let out = merger.finish().unwrap();
        prop_assert_eq!(support::decode_doc(out).unwrap(), tops);
    }

    /// A class name shared by two inputs is stored once; the second
    /// occurrence decodes through an `OBJECTV` back-reference.
    #[test]
    fn shared_class_is_stored_once(class in "[A-Za-z][A-Za-z0-9]{7,14}") {
        let class = class.into_bytes();
        let top_a = Value::Object(class.clone(), Box::new(Value::Int(1)));
        let top_b = Value::Object(class.clone(), Box::new(Value::Int(2)));

        let mut merger = Merger::new();
        merger.append(&support::encode_doc(&top_a)).unwrap();
        merger.append(&support::encode_doc(&top_b)).unwrap();
        let out = merger.finish().unwrap();

        let occurrences = out
            .windows(class.len())
            .filter(|w| *w == class.as_slice())
            .count();
        prop_assert_eq!(occurrences, 1);

        prop_assert_eq!(support::decode_doc(out).unwrap(), vec![top_a, top_b]);
    }

    /// A literal shared by two inputs occupies payload bytes once.
    #[test]
    fn shared_string_is_stored_once(payload in prop::collection::vec(any::<u8>(), 8..20)) {
        let top_a = Value::Array(vec![Value::Str(payload.clone()), Value::Int(1)]);
        let top_b = Value::Array(vec![Value::Str(payload.clone()), Value::Int(2)]);

        let mut merger = Merger::new();
        merger.append(&support::encode_doc(&top_a)).unwrap();
        merger.append(&support::encode_doc(&top_b)).unwrap();
        let out = merger.finish().unwrap();

        let occurrences = out
            .windows(payload.len())
            .filter(|w| *w == payload.as_slice())
            .count();
        prop_assert_eq!(occurrences, 1);

        prop_assert_eq!(support::decode_doc(out).unwrap(), vec![top_a, top_b]);
    }

    /// The merge depends only on body bytes: v1 and v3 raw documents with
    /// identical bodies produce byte-identical output.
    #[test]
    fn v1_and_v3_sources_merge_identically(tops in prop::collection::vec(value_strategy(), 1..4)) {
        let mut from_v3 = Merger::new();
        let mut from_v1 = Merger::new();
        for top in &tops {
            from_v3.append(&support::encode_doc(top)).unwrap();
            from_v1.append(&support::encode_doc_v1(top)).unwrap();
        }
        let v3_out = from_v3.finish().unwrap().to_vec();
        prop_assert_eq!(v3_out.as_slice(), from_v1.finish().unwrap());
    }

    /// `finish` is idempotent.
    #[test]
    fn finish_is_idempotent(tops in prop::collection::vec(value_strategy(), 0..4)) {
        let mut merger = Merger::new();
        for top in &tops {
            merger.append(&support::encode_doc(top)).unwrap();
        }
        let first = merger.finish().unwrap().to_vec();
        let second = merger.finish().unwrap().to_vec();
        prop_assert_eq!(first, second);
    }

    /// A rejected input leaves the output identical to never having
    /// offered it.
    #[test]
    fn failed_append_leaves_output_unchanged(
        good in prop::collection::vec(value_strategy(), 1..4),
        bad_top in value_strategy(),
        cut in 1..12usize,
    ) {
        let bad_doc = support::encode_doc(&bad_top);
        // Chop inside the body so at least the header survives.
        let cut_at = bad_doc.len().saturating_sub(cut).max(6);
        let bad_doc = &bad_doc[..cut_at];

        let mut merger = Merger::new();
        for top in &good {
            merger.append(&support::encode_doc(top)).unwrap();
        }

        let mut baseline = Merger::new();
        for top in &good {
            baseline.append(&support::encode_doc(top)).unwrap();
        }
        let baseline_out = baseline.finish().unwrap().to_vec();

        // Every strict prefix of a single-value body either fails (rolled
        // back) or is an empty body (appends nothing); the output is the
        // same either way.
        let _ = merger.append(bad_doc);
        prop_assert_eq!(merger.finish().unwrap(), baseline_out.as_slice());
    }
}
