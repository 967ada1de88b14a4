#![forbid(unsafe_code)]

//! Keyed collection of loaded resources.
//!
//! Every loaded resource is watched: a commit anywhere in its graph marks the
//! id dirty and pushes the freshly serialized payload to the sinks registered
//! with [`ResourceStore::track`].
//!
//! # Revisions
//!
//! Loading a payload whose id is already present replaces the stored resource
//! when the incoming revision is newer, returns the stored resource unchanged
//! when the revision is equal, and fails with
//! [`ResourceError::StaleRevision`] when it is older. A replaced resource
//! keeps its sinks and starts clean.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use serde_json::Value;
use tracing::{debug, warn};
use wbind_core::{Node, WatchConfig, WatchHandle, watch};

use crate::error::{ResourceError, Result};
use crate::resource::{Payload, Resource};
use crate::sink::CommitSink;

struct Entry {
    resource: Rc<Resource>,
    _handle: WatchHandle,
}

pub(crate) struct StoreInner {
    config: WatchConfig,
    entries: RefCell<BTreeMap<String, Entry>>,
    sinks: RefCell<AHashMap<String, Vec<Rc<dyn CommitSink>>>>,
    dirty: RefCell<BTreeSet<String>>,
}

impl StoreInner {
    pub(crate) fn lookup(&self, id: &str) -> Option<Rc<Resource>> {
        self.entries
            .borrow()
            .get(id)
            .map(|entry| Rc::clone(&entry.resource))
    }

    fn committed(&self, resource: &Resource) {
        self.dirty.borrow_mut().insert(resource.id().to_owned());
        let sinks = self
            .sinks
            .borrow()
            .get(resource.id())
            .cloned()
            .unwrap_or_default();
        if sinks.is_empty() {
            return;
        }
        match resource.serialize() {
            Ok(payload) => {
                for sink in &sinks {
                    sink.commit(&payload);
                }
            }
            Err(err) => warn!(resource = resource.id(), error = %err, "commit not serialized"),
        }
    }
}

/// Owns resources by id and resolves references between them.
#[derive(Clone)]
pub struct ResourceStore {
    inner: Rc<StoreInner>,
}

impl fmt::Debug for ResourceStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceStore")
            .field("ids", &self.ids())
            .field("dirty", &self.dirty_ids())
            .finish()
    }
}

impl Default for ResourceStore {
    fn default() -> Self {
        Self::new(WatchConfig::default())
    }
}

impl ResourceStore {
    pub fn new(config: WatchConfig) -> Self {
        Self {
            inner: Rc::new(StoreInner {
                config,
                entries: RefCell::new(BTreeMap::new()),
                sinks: RefCell::new(AHashMap::new()),
                dirty: RefCell::new(BTreeSet::new()),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> WatchConfig {
        self.inner.config
    }

    /// Bind a payload into the store.
    pub fn load(&self, value: &Value) -> Result<Rc<Resource>> {
        let payload = Payload::from_value(value)?;
        if let Some(existing) = self.get(&payload.id) {
            if existing.revision() == payload.revision {
                debug!(resource = %payload.id, revision = payload.revision, "reload of current revision ignored");
                return Ok(existing);
            }
            if existing.revision() > payload.revision {
                warn!(
                    resource = %payload.id,
                    have = existing.revision(),
                    incoming = payload.revision,
                    "stale payload rejected"
                );
                return Err(ResourceError::StaleRevision {
                    id: payload.id,
                    have: existing.revision(),
                    want: payload.revision,
                });
            }
        }

        let id = payload.id.clone();
        let revision = payload.revision;
        let resource = Rc::new(Resource::bind(
            payload,
            &self.inner.config,
            Rc::downgrade(&self.inner),
        ));
        let handle = self.watch_resource(&resource);
        let replaced = self.inner.entries.borrow_mut().insert(
            id.clone(),
            Entry {
                resource: Rc::clone(&resource),
                _handle: handle,
            },
        );
        self.inner.dirty.borrow_mut().remove(&id);
        debug!(
            resource = %id,
            revision,
            replaced = replaced.is_some(),
            "resource loaded"
        );
        drop(replaced);
        Ok(resource)
    }

    fn watch_resource(&self, resource: &Rc<Resource>) -> WatchHandle {
        let store: Weak<StoreInner> = Rc::downgrade(&self.inner);
        let weak_resource = Rc::downgrade(resource);
        watch(&Node::Object(resource.root().clone()), move || {
            if let (Some(store), Some(resource)) = (store.upgrade(), weak_resource.upgrade()) {
                store.committed(&resource);
            }
        })
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Rc<Resource>> {
        self.inner.lookup(id)
    }

    /// Drop a resource with its sinks and dirty mark.
    pub fn remove(&self, id: &str) -> Option<Rc<Resource>> {
        let entry = self.inner.entries.borrow_mut().remove(id)?;
        self.inner.sinks.borrow_mut().remove(id);
        self.inner.dirty.borrow_mut().remove(id);
        debug!(resource = id, "resource removed");
        Some(Rc::clone(&entry.resource))
    }

    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.inner.entries.borrow().keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.borrow().is_empty()
    }

    /// Push the serialized payload of `id` to `sink` after every commit.
    pub fn track(&self, id: &str, sink: impl CommitSink + 'static) -> Result<()> {
        if !self.inner.entries.borrow().contains_key(id) {
            return Err(ResourceError::Unresolved { id: id.to_owned() });
        }
        self.inner
            .sinks
            .borrow_mut()
            .entry(id.to_owned())
            .or_default()
            .push(Rc::new(sink));
        debug!(resource = id, "sink attached");
        Ok(())
    }

    /// Detach every sink of `id`; returns how many were attached.
    pub fn untrack(&self, id: &str) -> usize {
        self.inner
            .sinks
            .borrow_mut()
            .remove(id)
            .map_or(0, |sinks| sinks.len())
    }

    /// Ids committed since they were loaded or last drained.
    #[must_use]
    pub fn dirty_ids(&self) -> Vec<String> {
        self.inner.dirty.borrow().iter().cloned().collect()
    }

    pub fn drain_dirty(&self) -> Vec<String> {
        std::mem::take(&mut *self.inner.dirty.borrow_mut())
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::ResourceReference;
    use crate::sink::CommitLog;
    use serde_json::json;

    fn payload(id: &str, revision: u64, data: Value) -> Value {
        json!({"id": id, "revision": revision, "data": data})
    }

    #[test]
    fn load_and_get() {
        let store = ResourceStore::default();
        let loaded = store.load(&payload("a", 1, json!({"x": 1}))).unwrap();
        assert!(Rc::ptr_eq(&loaded, &store.get("a").unwrap()));
        assert_eq!(store.ids(), vec!["a"]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn newer_revision_replaces_older_fails_equal_is_kept() {
        let store = ResourceStore::default();
        let first = store.load(&payload("a", 2, json!({"v": "two"}))).unwrap();
        let same = store.load(&payload("a", 2, json!({"v": "other"}))).unwrap();
        assert!(Rc::ptr_eq(&first, &same));

        let err = store.load(&payload("a", 1, json!({}))).unwrap_err();
        assert!(matches!(
            err,
            ResourceError::StaleRevision { have: 2, want: 1, .. }
        ));

        let newer = store.load(&payload("a", 3, json!({"v": "three"}))).unwrap();
        assert_eq!(store.get("a").unwrap().revision(), 3);
        assert_eq!(newer.accessor("v").get().as_str(), Some("three"));
    }

    #[test]
    fn commits_mark_dirty_and_reach_sinks() {
        let store = ResourceStore::default();
        let resource = store.load(&payload("a", 1, json!({"title": "x"}))).unwrap();
        let log = CommitLog::new();
        store.track("a", log.clone()).unwrap();

        resource.accessor("title").set("y").unwrap();
        resource.get("items").list().unwrap().append(Node::scalar(1)).unwrap();

        assert_eq!(store.dirty_ids(), vec!["a"]);
        assert_eq!(log.len(), 2);
        assert_eq!(
            log.last().unwrap(),
            payload("a", 1, json!({"title": "y", "items": [1]}))
        );
        assert_eq!(store.drain_dirty(), vec!["a"]);
        assert!(store.dirty_ids().is_empty());
    }

    #[test]
    fn track_unknown_id_fails() {
        let store = ResourceStore::default();
        assert!(matches!(
            store.track("ghost", CommitLog::new()),
            Err(ResourceError::Unresolved { .. })
        ));
    }

    #[test]
    fn replacement_keeps_sinks_and_stops_old_graph() {
        let store = ResourceStore::default();
        let old = store.load(&payload("a", 1, json!({"n": 1}))).unwrap();
        let log = CommitLog::new();
        store.track("a", log.clone()).unwrap();
        let new = store.load(&payload("a", 2, json!({"n": 1}))).unwrap();

        old.accessor("n").set(5).unwrap();
        assert!(log.is_empty());
        assert!(store.dirty_ids().is_empty());

        new.accessor("n").set(6).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(store.untrack("a"), 1);
        new.accessor("n").set(7).unwrap();
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn resolve_follows_revisions() {
        let store = ResourceStore::default();
        let contribution = store
            .load(&payload(
                "c",
                1,
                json!({"room": {"type": "reference", "id": "r", "value": 2}}),
            ))
            .unwrap();
        assert!(matches!(
            contribution.resolve("room"),
            Err(ResourceError::Unresolved { .. })
        ));

        store.load(&payload("r", 1, json!({"name": "Old"}))).unwrap();
        assert!(matches!(
            contribution.resolve("room"),
            Err(ResourceError::StaleRevision { have: 1, want: 2, .. })
        ));

        store.load(&payload("r", 3, json!({"name": "Aula"}))).unwrap();
        let room = contribution.resolve("room").unwrap().unwrap();
        assert_eq!(room.revision(), 3);

        contribution
            .set_reference("room", &ResourceReference::new("missing", 1))
            .unwrap();
        assert!(contribution.resolve("room").is_err());
    }

    #[test]
    fn dropped_store_leaves_references_unresolved() {
        let store = ResourceStore::default();
        let resource = store
            .load(&payload(
                "c",
                1,
                json!({"room": {"type": "reference", "id": "c", "value": 1}}),
            ))
            .unwrap();
        assert!(resource.resolve("room").unwrap().is_some());
        drop(store);
        assert!(matches!(
            resource.resolve("room"),
            Err(ResourceError::Unresolved { .. })
        ));
    }

    #[test]
    fn remove_forgets_everything() {
        let store = ResourceStore::default();
        let resource = store.load(&payload("a", 1, json!({"n": 1}))).unwrap();
        store.track("a", CommitLog::new()).unwrap();
        resource.accessor("n").set(2).unwrap();
        assert!(store.remove("a").is_some());
        assert!(store.is_empty());
        assert!(store.dirty_ids().is_empty());
        assert_eq!(store.untrack("a"), 0);
        assert!(store.remove("a").is_none());
    }
}
