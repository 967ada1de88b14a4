#![no_main]

use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use serde_json::{Value, json};
use wbind_core::{Node, watch, watchize};

const KEYS: [&str; 4] = ["a", "b", "c", "d"];

#[derive(Arbitrary, Debug)]
enum FuzzEdit {
    Append { key: u8, value: i64 },
    Insert { key: u8, index: u8, value: i64 },
    RemoveAt { key: u8, index: u8 },
    SetScalar { key: u8, value: i64 },
    RemoveKey { key: u8 },
    Read { key: u8 },
}

fn key(raw: u8) -> &'static str {
    KEYS[usize::from(raw) % KEYS.len()]
}

fuzz_target!(|edits: Vec<FuzzEdit>| {
    let node = watchize(&json!({}));
    let Some(object) = node.as_object().cloned() else {
        return;
    };
    let commits = Rc::new(Cell::new(0usize));
    let counter = Rc::clone(&commits);
    let handle = watch(&node, move || counter.set(counter.get() + 1));

    let mut model: BTreeMap<String, Value> = BTreeMap::new();
    let mut expected = 0usize;

    for edit in edits.into_iter().take(256) {
        match edit {
            FuzzEdit::Append { key: k, value } => {
                let k = key(k);
                let target = object.get(k);
                let entry = model.entry(k.to_owned()).or_insert_with(|| json!([]));
                if let (Some(list), Some(items)) = (target.as_list(), entry.as_array_mut()) {
                    list.append(Node::scalar(value)).unwrap();
                    items.push(json!(value));
                    expected += 1;
                }
            }
            FuzzEdit::Insert { key: k, index, value } => {
                let k = key(k);
                let target = object.get(k);
                let entry = model.entry(k.to_owned()).or_insert_with(|| json!([]));
                if let (Some(list), Some(items)) = (target.as_list(), entry.as_array_mut()) {
                    let index = usize::from(index);
                    let ok = list.insert(index, Node::scalar(value)).is_ok();
                    assert_eq!(ok, index <= items.len());
                    if ok {
                        items.insert(index, json!(value));
                        expected += 1;
                    }
                }
            }
            FuzzEdit::RemoveAt { key: k, index } => {
                let k = key(k);
                if let (Some(target), Some(items)) = (
                    object.peek(k),
                    model.get_mut(k).and_then(Value::as_array_mut),
                ) && let Some(list) = target.as_list()
                {
                    let index = usize::from(index);
                    let ok = list.remove_at(index).is_ok();
                    assert_eq!(ok, index < items.len());
                    if ok {
                        items.remove(index);
                        expected += 1;
                    }
                }
            }
            FuzzEdit::SetScalar { key: k, value } => {
                let k = key(k);
                let changed = model.get(k) != Some(&json!(value));
                assert_eq!(object.accessor(k).set(value).unwrap(), changed);
                model.insert(k.to_owned(), json!(value));
                if changed {
                    expected += 1;
                }
            }
            FuzzEdit::RemoveKey { key: k } => {
                let k = key(k);
                let removed = object.remove(k).unwrap().is_some();
                assert_eq!(removed, model.remove(k).is_some());
                if removed {
                    expected += 1;
                }
            }
            FuzzEdit::Read { key: k } => {
                let k = key(k);
                object.get(k);
                model.entry(k.to_owned()).or_insert_with(|| json!([]));
            }
        }
        assert_eq!(commits.get(), expected);
    }

    let serialized = node.to_value().unwrap();
    let model: serde_json::Map<String, Value> = model.into_iter().collect();
    assert_eq!(serialized, Value::Object(model));

    handle.unwatch().unwrap();
    object.accessor("a").set(-1).unwrap();
    assert_eq!(commits.get(), expected);
});
