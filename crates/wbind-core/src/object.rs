#![forbid(unsafe_code)]

//! Observable string-keyed mappings.
//!
//! # Auto-vivification
//!
//! [`WatchObject::get`] never returns "nothing": reading a missing key stores
//! an empty [`WatchList`] at that key and returns it. Later reads return the
//! same instance. Vivification is reported to observers as
//! [`ObjectEvent::Vivified`], distinct from [`ObjectEvent::Set`], so commit
//! hooks can start tracking the placeholder without treating a read as an
//! edit. Use [`WatchObject::peek`] for a plain lookup.
//!
//! Keys iterate in sorted order, matching `serde_json::Map`.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use tracing::{trace, warn};

use crate::accessor::KeyAccessor;
use crate::config::{NotifyPolicy, WatchConfig};
use crate::error::Result;
use crate::list::WatchList;
use crate::node::{Node, NodeId};
use crate::observable::{Dispatcher, Subscription};

/// A change delivered to [`WatchObject`] observers.
#[derive(Debug, Clone)]
pub enum ObjectEvent {
    /// `key` now holds `value`; `old` is the previous value, if any.
    Set {
        key: String,
        value: Node,
        old: Option<Node>,
    },
    /// A read of a missing key stored an empty placeholder list.
    Vivified { key: String, value: Node },
    /// `key` was removed.
    Removed { key: String, old: Node },
}

impl ObjectEvent {
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Set { key, .. } | Self::Vivified { key, .. } | Self::Removed { key, .. } => key,
        }
    }

    /// The value now stored at the key, `None` after a removal.
    #[must_use]
    pub fn value(&self) -> Option<&Node> {
        match self {
            Self::Set { value, .. } | Self::Vivified { value, .. } => Some(value),
            Self::Removed { .. } => None,
        }
    }

    /// The value that was replaced or removed.
    #[must_use]
    pub fn old(&self) -> Option<&Node> {
        match self {
            Self::Set { old, .. } => old.as_ref(),
            Self::Removed { old, .. } => Some(old),
            Self::Vivified { .. } => None,
        }
    }
}

type ObjectCallback = dyn Fn(&ObjectEvent, &WatchObject);

struct ObjectInner {
    id: NodeId,
    entries: RefCell<BTreeMap<String, Node>>,
    config: WatchConfig,
    dispatch: Dispatcher<ObjectEvent, ObjectCallback>,
}

/// An observable mapping from string keys to nodes.
///
/// Cloning a `WatchObject` creates a new handle to the **same** object.
#[derive(Clone)]
pub struct WatchObject {
    inner: Rc<ObjectInner>,
}

impl fmt::Debug for WatchObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchObject")
            .field("id", &self.inner.id)
            .field("keys", &self.keys())
            .finish()
    }
}

impl Default for WatchObject {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchObject {
    pub fn new() -> Self {
        Self::with_config(WatchConfig::default())
    }

    pub fn with_config(config: WatchConfig) -> Self {
        Self::from_entries(std::iter::empty(), config)
    }

    /// Build an object holding `entries` without emitting any events.
    pub fn from_entries(
        entries: impl IntoIterator<Item = (String, Node)>,
        config: WatchConfig,
    ) -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                id: NodeId::next(),
                entries: RefCell::new(entries.into_iter().collect()),
                config,
                dispatch: Dispatcher::new(),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    #[must_use]
    pub fn config(&self) -> WatchConfig {
        self.inner.config
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.borrow().is_empty()
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.entries.borrow().contains_key(key)
    }

    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.inner.entries.borrow().keys().cloned().collect()
    }

    /// Lookup without auto-vivification.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<Node> {
        self.inner.entries.borrow().get(key).cloned()
    }

    /// Value at `key`, creating an empty list there when absent.
    pub fn get(&self, key: &str) -> Node {
        if let Some(node) = self.peek(key) {
            return node;
        }
        let placeholder = Node::List(WatchList::with_config(self.inner.config));
        self.inner
            .entries
            .borrow_mut()
            .insert(key.to_owned(), placeholder.clone());
        trace!(object = %self.inner.id, key, "vivified placeholder list");
        let event = ObjectEvent::Vivified {
            key: key.to_owned(),
            value: placeholder.clone(),
        };
        // The placeholder is stored either way; a failed drain only affects
        // observers that re-entered this object.
        if let Err(err) = self.emit(event) {
            warn!(object = %self.inner.id, key, error = %err, "vivification drain failed");
        }
        placeholder
    }

    /// Store `value` at `key` and notify `(value, key, self, old)`.
    ///
    /// Re-setting the node already stored at `key` is a no-op under
    /// [`NotifyPolicy::OnChange`].
    pub fn set(&self, key: impl Into<String>, value: Node) -> Result<Option<Node>> {
        self.guard()?;
        let key = key.into();
        let old = {
            let mut entries = self.inner.entries.borrow_mut();
            if self.inner.config.notify == NotifyPolicy::OnChange
                && entries.get(&key).is_some_and(|current| current.ptr_eq(&value))
            {
                return Ok(Some(value));
            }
            entries.insert(key.clone(), value.clone())
        };
        trace!(object = %self.inner.id, key = %key, "key set");
        self.emit(ObjectEvent::Set {
            key,
            value,
            old: old.clone(),
        })?;
        Ok(old)
    }

    /// Remove `key`, returning the value it held.
    pub fn remove(&self, key: &str) -> Result<Option<Node>> {
        self.guard()?;
        let Some(old) = self.inner.entries.borrow_mut().remove(key) else {
            return Ok(None);
        };
        trace!(object = %self.inner.id, key, "key removed");
        self.emit(ObjectEvent::Removed {
            key: key.to_owned(),
            old: old.clone(),
        })?;
        Ok(Some(old))
    }

    /// Remove every key. Returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        let keys = self.keys();
        for key in &keys {
            self.remove(key)?;
        }
        Ok(keys.len())
    }

    /// Set every entry in turn; returns how many keys actually changed.
    pub fn update(&self, entries: impl IntoIterator<Item = (String, Node)>) -> Result<usize> {
        let mut changed = 0;
        for (key, value) in entries {
            let same = self
                .peek(&key)
                .is_some_and(|current| current.ptr_eq(&value));
            self.set(key, value)?;
            if !same {
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Snapshot of every entry.
    #[must_use]
    pub fn get_all(&self) -> BTreeMap<String, Node> {
        self.inner.entries.borrow().clone()
    }

    /// Scalar get/set/observe handle bound to `key`.
    #[must_use]
    pub fn accessor(&self, key: impl Into<String>) -> KeyAccessor {
        KeyAccessor::new(self.clone(), key)
    }

    pub fn observe(&self, f: impl Fn(&ObjectEvent, &WatchObject) + 'static) -> Subscription {
        let callback: Rc<ObjectCallback> = Rc::new(f);
        self.inner.dispatch.subscribe(callback)
    }

    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.inner.dispatch.live_count()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn guard(&self) -> Result<()> {
        self.inner
            .dispatch
            .check_reentry(self.inner.id, &self.inner.config)
    }

    fn emit(&self, event: ObjectEvent) -> Result<()> {
        self.inner
            .dispatch
            .dispatch(self.inner.id, &self.inner.config, event, |callback, event| {
                callback(event, self)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReentrancyPolicy;
    use crate::error::WatchError;
    use crate::node::{NodeKind, Scalar};
    use std::cell::RefCell;

    fn record(object: &WatchObject) -> (Rc<RefCell<Vec<ObjectEvent>>>, Subscription) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let sub = object.observe(move |event, _| sink.borrow_mut().push(event.clone()));
        (log, sub)
    }

    #[test]
    fn set_reports_value_key_and_old() {
        let object = WatchObject::new();
        let (log, _sub) = record(&object);

        let first = Node::scalar(1);
        let second = Node::scalar(2);
        assert_eq!(object.set("a", first.clone()).unwrap(), None);
        assert_eq!(object.set("a", second.clone()).unwrap(), Some(first.clone()));

        let log = log.borrow();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].key(), "a");
        assert_eq!(log[1].value(), Some(&second));
        assert_eq!(log[1].old(), Some(&first));
    }

    #[test]
    fn observer_receives_object_handle() {
        let object = WatchObject::new();
        let seen = Rc::new(RefCell::new(None));
        let seen_in = Rc::clone(&seen);
        let _sub = object.observe(move |_, this| *seen_in.borrow_mut() = Some(this.id()));
        object.set("k", Node::scalar(true)).unwrap();
        assert_eq!(*seen.borrow(), Some(object.id()));
    }

    #[test]
    fn get_vivifies_identity_stable_list() {
        let object = WatchObject::new();
        let (log, _sub) = record(&object);

        let first = object.get("missing");
        assert_eq!(first.kind(), NodeKind::List);
        assert!(first.list().unwrap().is_empty());
        let second = object.get("missing");
        assert!(first.ptr_eq(&second));
        assert!(object.contains_key("missing"));

        let log = log.borrow();
        assert_eq!(log.len(), 1);
        assert!(matches!(&log[0], ObjectEvent::Vivified { key, .. } if key == "missing"));
    }

    #[test]
    fn peek_does_not_vivify() {
        let object = WatchObject::new();
        assert!(object.peek("nope").is_none());
        assert!(object.is_empty());
    }

    #[test]
    fn resetting_same_node_is_noop() {
        let object = WatchObject::new();
        let node = Node::scalar("v");
        object.set("k", node.clone()).unwrap();
        let (log, _sub) = record(&object);
        object.set("k", node).unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn always_policy_renotifies_same_node() {
        let object =
            WatchObject::with_config(WatchConfig::default().with_notify(NotifyPolicy::Always));
        let node = Node::scalar("v");
        object.set("k", node.clone()).unwrap();
        let (log, _sub) = record(&object);
        object.set("k", node).unwrap();
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn remove_and_clear() {
        let object = WatchObject::new();
        object.set("a", Node::scalar(1)).unwrap();
        object.set("b", Node::scalar(2)).unwrap();
        let (log, _sub) = record(&object);

        assert!(object.remove("a").unwrap().is_some());
        assert!(object.remove("a").unwrap().is_none());
        assert_eq!(object.clear().unwrap(), 1);
        assert!(object.is_empty());
        let keys: Vec<_> = log.borrow().iter().map(|e| e.key().to_owned()).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert!(log.borrow().iter().all(|e| e.value().is_none()));
    }

    #[test]
    fn update_counts_changed_keys() {
        let object = WatchObject::new();
        let kept = Node::scalar(1);
        object.set("kept", kept.clone()).unwrap();

        let changed = object
            .update([
                ("kept".to_string(), kept),
                ("new".to_string(), Node::scalar(2)),
            ])
            .unwrap();
        assert_eq!(changed, 1);
        assert_eq!(object.keys(), vec!["kept", "new"]);
    }

    #[test]
    fn get_all_is_snapshot() {
        let object = WatchObject::new();
        object.set("x", Node::scalar(1)).unwrap();
        let snapshot = object.get_all();
        object.set("y", Node::scalar(2)).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(
            snapshot["x"].scalar_value(),
            Some(Scalar::from(1))
        );
    }

    #[test]
    fn reentrant_set_rejected() {
        let object =
            WatchObject::with_config(WatchConfig::default().with_reentrancy(ReentrancyPolicy::Reject));
        let outcome = Rc::new(RefCell::new(None));
        let outcome_in = Rc::clone(&outcome);
        let _sub = object.observe(move |_, this| {
            *outcome_in.borrow_mut() = Some(this.set("other", Node::scalar(0)));
        });
        object.set("k", Node::scalar(1)).unwrap();
        assert!(!object.contains_key("other"));
        assert!(matches!(
            outcome.borrow_mut().take(),
            Some(Err(WatchError::ReentrantMutation { .. }))
        ));
    }

    #[test]
    fn vivify_inside_rejecting_observer_still_works() {
        let object =
            WatchObject::with_config(WatchConfig::default().with_reentrancy(ReentrancyPolicy::Reject));
        let vivified = Rc::new(RefCell::new(None));
        let vivified_in = Rc::clone(&vivified);
        let _sub = object.observe(move |event, this| {
            if event.key() == "k" {
                *vivified_in.borrow_mut() = Some(this.get("lazy"));
            }
        });
        object.set("k", Node::scalar(1)).unwrap();
        assert!(vivified.borrow().is_some());
        assert!(object.contains_key("lazy"));
    }

    #[test]
    fn debug_lists_keys() {
        let object = WatchObject::new();
        object.set("alpha", Node::scalar(1)).unwrap();
        assert!(format!("{object:?}").contains("alpha"));
    }
}
