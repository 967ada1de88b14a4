//! Property-based invariant tests for `watchize` and commit graphs.
//!
//! 1. `watchize(v).to_value() == v` for any JSON value.
//! 2. `Node::count` equals the number of JSON values in the input.
//! 3. A watch handle attaches every node of a fresh tree.
//! 4. Every leaf mutation commits exactly once.
//! 5. `Node::at` finds every leaf by its path.

use std::cell::Cell;
use std::rc::Rc;

use proptest::prelude::*;
use serde_json::{Map, Value};
use wbind_core::{Node, Path, Scalar, watch, watchize};

fn json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        (-1.0e9f64..1.0e9).prop_map(Value::from),
        "[a-z]{0,8}".prop_map(Value::String),
    ];
    leaf.prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            proptest::collection::btree_map("[a-z]{1,4}", inner, 0..6)
                .prop_map(|map| Value::Object(map.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

fn json_count(value: &Value) -> usize {
    1 + match value {
        Value::Array(items) => items.iter().map(json_count).sum(),
        Value::Object(map) => map.values().map(json_count).sum(),
        _ => 0,
    }
}

fn leaf_paths(value: &Value, path: Path, out: &mut Vec<(Path, Value)>) {
    match value {
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                leaf_paths(item, path.clone().push(i), out);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                leaf_paths(item, path.clone().push(key.as_str()), out);
            }
        }
        scalar => out.push((path, scalar.clone())),
    }
}

proptest! {
    #[test]
    fn watchize_round_trips(value in json_strategy()) {
        let node = watchize(&value);
        prop_assert_eq!(node.to_value().unwrap(), value.clone());
        prop_assert_eq!(node.count(), json_count(&value));
    }
}

proptest! {
    #[test]
    fn watch_attaches_all_and_commits_once_per_leaf(value in json_strategy()) {
        let node = watchize(&value);
        let commits = Rc::new(Cell::new(0u32));
        let counter = Rc::clone(&commits);
        let handle = watch(&node, move || counter.set(counter.get() + 1));
        prop_assert_eq!(handle.attached_count(), json_count(&value));

        let mut leaves = Vec::new();
        leaf_paths(&value, Path::root(), &mut leaves);
        for (expected, (path, original)) in leaves.iter().enumerate() {
            let leaf = node.at(path).unwrap();
            prop_assert_eq!(leaf.scalar_value(), Scalar::from_value(original));
            let cell = leaf.primitive().unwrap();
            let marker = Scalar::from(format!("changed-{expected}"));
            prop_assert!(cell.set(marker).unwrap());
            prop_assert_eq!(commits.get() as usize, expected + 1);
        }
        prop_assert_eq!(handle.commit_count() as usize, leaves.len());
        handle.unwatch().unwrap();
        prop_assert_eq!(handle.attached_count(), 0);
    }
}

proptest! {
    #[test]
    fn root_scalars_are_primitive(value in any::<i64>()) {
        let node = watchize(&Value::from(value));
        prop_assert!(matches!(node, Node::Primitive(_)));
        prop_assert_eq!(node.scalar_value(), Some(Scalar::from(value)));
    }
}
