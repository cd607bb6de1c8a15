//! Differential property tests against a `BTreeMap` oracle, generalized from
//! the teacher's `src/proptests.rs` harness (`Action::{Insert,Get,Remove}`
//! against a `Model`), adapted to `RadixTree`'s upsert/lookup/remove names
//! (see SPEC_FULL.md §10, spec.md §8 P1-P4/P7).

use std::collections::BTreeMap;

use proptest::prelude::*;
use proptest_derive::Arbitrary;

use radix_index::RadixTree;

#[derive(Default, Clone)]
struct Model {
    map: BTreeMap<Vec<u8>, u64>,
}

impl Model {
    fn upsert(&mut self, key: Vec<u8>, value: u64) -> Option<u64> {
        self.map.insert(key, value)
    }

    fn lookup(&self, key: &[u8]) -> Option<u64> {
        self.map.get(key).copied()
    }

    fn remove(&mut self, key: &[u8]) -> Option<u64> {
        self.map.remove(key)
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

#[derive(Arbitrary, Debug, Clone)]
enum Action {
    Upsert(KeyValue),
    Lookup(Key),
    Remove(Key),
}

#[derive(Debug, Clone)]
struct Key(Vec<u8>);

#[derive(Debug, Clone)]
struct KeyValue {
    key: Key,
    value: u64,
}

impl Arbitrary for Key {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        prop_oneof![
            Just(Key(vec![])),
            prop::collection::vec(any::<u8>(), 1..4).prop_map(Key),
            prop::collection::vec(any::<u8>(), 4..64).prop_map(Key),
            // keys with natural delimiters, to exercise prefix compression
            "[a-z]{4,8}/[a-z]{1,8}".prop_map(|s| Key(s.into_bytes())),
            "[a-z]{4,8}:[a-z]{1,8}".prop_map(|s| Key(s.into_bytes())),
            // keys sharing a prefix, to exercise shared-prefix node splits
            "[a-z]{4,8}".prop_map(|prefix| {
                let mut key = prefix.into_bytes();
                key.extend_from_slice(b"/suffix");
                Key(key)
            }),
        ]
        .boxed()
    }
}

impl Arbitrary for KeyValue {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (any::<Key>(), any::<u64>())
            .prop_map(|(key, value)| KeyValue { key, value })
            .boxed()
    }
}

#[derive(Default)]
struct Test {
    tree: RadixTree<u64>,
    model: Model,
}

impl Test {
    fn execute(&mut self, action: Action) {
        match action {
            Action::Upsert(kv) => {
                let key = kv.key.0.clone();
                let tree_result = self.tree.upsert(&key, kv.value);
                let model_result = self.model.upsert(key.clone(), kv.value);
                assert_eq!(
                    tree_result, model_result,
                    "upsert mismatch: key={:?}, tree={:?}, model={:?}",
                    key, tree_result, model_result
                );
            }
            Action::Lookup(key) => {
                let key_bytes = key.0.clone();
                let tree_result = self.tree.lookup(&key_bytes);
                let model_result = self.model.lookup(&key_bytes);
                assert_eq!(
                    tree_result, model_result,
                    "lookup mismatch: key={:?}, tree={:?}, model={:?}",
                    key_bytes, tree_result, model_result
                );
            }
            Action::Remove(key) => {
                let key_bytes = key.0.clone();
                let tree_result = self.tree.remove(&key_bytes);
                let model_result = self.model.remove(&key_bytes);
                assert_eq!(
                    tree_result, model_result,
                    "remove mismatch: key={:?}, tree={:?}, model={:?}",
                    key_bytes, tree_result, model_result
                );
            }
        }
        assert_eq!(
            self.tree.len(),
            self.model.len(),
            "size mismatch after action"
        );
        assert_eq!(self.tree.is_empty(), self.model.len() == 0);
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn matches_btreemap_oracle(actions in prop::collection::vec(any::<Action>(), 1..64)) {
        let mut test = Test::default();
        for action in actions {
            test.execute(action);
        }
    }
}
