#![forbid(unsafe_code)]

//! A server payload bound into an observable graph.
//!
//! # Lazy resolution
//!
//! A key holding a reference marker is resolved through the owning
//! [`ResourceStore`](crate::ResourceStore) only when [`Resource::resolve`] is
//! called. The resource holds a weak handle to its store, so resolution
//! fails with [`ResourceError::Unresolved`] once the store is gone.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use wbind_core::{KeyAccessor, Node, WatchConfig, WatchObject, watchize_with};

use crate::error::{ResourceError, Result};
use crate::reference::ResourceReference;
use crate::store::StoreInner;

/// Wire shape of a resource: `{"id", "revision", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub id: String,
    pub revision: u64,
    pub data: Map<String, Value>,
}

impl Payload {
    pub fn from_value(value: &Value) -> Result<Self> {
        Self::deserialize(value).map_err(|err| ResourceError::malformed(err.to_string()))
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("id".into(), Value::String(self.id.clone()));
        map.insert("revision".into(), Value::from(self.revision));
        map.insert("data".into(), Value::Object(self.data.clone()));
        Value::Object(map)
    }
}

pub struct Resource {
    id: String,
    revision: u64,
    root: WatchObject,
    store: Weak<StoreInner>,
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("id", &self.id)
            .field("revision", &self.revision)
            .field("keys", &self.root.keys())
            .field("attached", &(self.store.strong_count() > 0))
            .finish()
    }
}

impl Resource {
    /// A resource outside any store; references never resolve.
    pub fn from_payload(value: &Value, config: &WatchConfig) -> Result<Self> {
        Ok(Self::bind(Payload::from_value(value)?, config, Weak::new()))
    }

    pub(crate) fn bind(payload: Payload, config: &WatchConfig, store: Weak<StoreInner>) -> Self {
        let root = WatchObject::from_entries(
            payload
                .data
                .iter()
                .map(|(key, value)| (key.clone(), watchize_with(value, config))),
            *config,
        );
        Self {
            id: payload.id,
            revision: payload.revision,
            root,
            store,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// The observable `data` object.
    #[must_use]
    pub fn root(&self) -> &WatchObject {
        &self.root
    }

    /// Value at `key`, vivifying an empty list when absent.
    pub fn get(&self, key: &str) -> Node {
        self.root.get(key)
    }

    #[must_use]
    pub fn peek(&self, key: &str) -> Option<Node> {
        self.root.peek(key)
    }

    pub fn set(&self, key: impl Into<String>, value: Node) -> Result<Option<Node>> {
        Ok(self.root.set(key, value)?)
    }

    /// Watchize `value` with this resource's config and store it at `key`.
    pub fn set_value(&self, key: impl Into<String>, value: &Value) -> Result<Option<Node>> {
        self.set(key, watchize_with(value, &self.root.config()))
    }

    pub fn set_reference(
        &self,
        key: impl Into<String>,
        reference: &ResourceReference,
    ) -> Result<Option<Node>> {
        self.set(key, reference.to_node(&self.root.config()))
    }

    /// The reference stored at `key`, if the key holds a marker.
    #[must_use]
    pub fn reference(&self, key: &str) -> Option<ResourceReference> {
        self.root
            .peek(key)
            .and_then(|node| ResourceReference::from_node(&node))
    }

    /// Follow the reference at `key` through the owning store.
    ///
    /// `Ok(None)` when the key holds no reference.
    pub fn resolve(&self, key: &str) -> Result<Option<Rc<Resource>>> {
        let Some(reference) = self.reference(key) else {
            return Ok(None);
        };
        let unresolved = || ResourceError::Unresolved {
            id: reference.id.clone(),
        };
        let store = self.store.upgrade().ok_or_else(unresolved)?;
        let target = store.lookup(&reference.id).ok_or_else(unresolved)?;
        if target.revision < reference.revision {
            return Err(ResourceError::StaleRevision {
                id: reference.id,
                have: target.revision,
                want: reference.revision,
            });
        }
        Ok(Some(target))
    }

    #[must_use]
    pub fn accessor(&self, key: impl Into<String>) -> KeyAccessor {
        self.root.accessor(key)
    }

    #[must_use]
    pub fn get_all(&self) -> BTreeMap<String, Node> {
        self.root.get_all()
    }

    /// Current state in wire shape.
    pub fn to_payload(&self) -> Result<Payload> {
        let data = match Node::Object(self.root.clone()).to_value()? {
            Value::Object(map) => map,
            other => {
                return Err(ResourceError::malformed(format!(
                    "resource data serialized to non-object {other}"
                )));
            }
        };
        Ok(Payload {
            id: self.id.clone(),
            revision: self.revision,
            data,
        })
    }

    pub fn serialize(&self) -> Result<Value> {
        Ok(self.to_payload()?.to_value())
    }
}
