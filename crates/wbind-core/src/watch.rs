#![forbid(unsafe_code)]

//! Building observable graphs and hooking a commit callback across them.
//!
//! [`watchize`] converts plain JSON into a [`Node`] graph. [`watch`] attaches
//! a single commit callback to every node of a graph and returns a
//! [`WatchHandle`]; [`WatchHandle::unwatch`] (or dropping the handle) removes
//! every attachment again.
//!
//! # Invariants
//!
//! 1. `commit` runs exactly once per mutation anywhere in the watched graph:
//!    a primitive change, a list add/remove/replace, or an object
//!    set/remove.
//! 2. Each node holds at most one subscription per handle. Attachment is
//!    reference counted by [`NodeId`], so shared subtrees and cycles attach
//!    once.
//! 3. Subtrees added after `watch` are attached before `commit` runs;
//!    removed subtrees are detached once their last occurrence is gone.
//! 4. Vivified placeholders are attached without a commit.
//! 5. After `unwatch`, `commit` never runs again.
//!
//! # Failure Modes
//!
//! - **Cyclic graph with removals**: a node reachable only through a cycle
//!   keeps a positive reference count after being unlinked, so it stays
//!   attached until `unwatch`.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use serde_json::Value;
use tracing::{debug, trace};

use crate::config::WatchConfig;
use crate::error::{Result, WatchError};
use crate::list::{ListEvent, WatchList};
use crate::node::{Node, NodeId, Scalar};
use crate::object::{ObjectEvent, WatchObject};
use crate::observable::{Subscription, WatchValue};

/// Convert a plain JSON value into an observable graph with default policies.
#[must_use]
pub fn watchize(value: &Value) -> Node {
    watchize_with(value, &WatchConfig::default())
}

/// Convert a plain JSON value into an observable graph; every created node
/// carries `config`.
#[must_use]
pub fn watchize_with(value: &Value, config: &WatchConfig) -> Node {
    match value {
        Value::Array(items) => Node::List(WatchList::from_items(
            items.iter().map(|item| watchize_with(item, config)),
            *config,
        )),
        Value::Object(map) => Node::Object(WatchObject::from_entries(
            map.iter()
                .map(|(key, item)| (key.clone(), watchize_with(item, config))),
            *config,
        )),
        scalar => {
            let scalar = Scalar::from_value(scalar).unwrap_or_default();
            Node::Primitive(WatchValue::with_config(scalar, *config))
        }
    }
}

struct Attachment {
    refs: usize,
    _subscription: Subscription,
}

struct GraphShared {
    attachments: RefCell<AHashMap<NodeId, Attachment>>,
    commit: Box<dyn Fn()>,
    commits: Cell<u64>,
    disposed: Cell<bool>,
}

impl GraphShared {
    fn commit(&self) {
        if self.disposed.get() {
            return;
        }
        self.commits.set(self.commits.get() + 1);
        (self.commit)();
    }
}

/// Handle to a commit graph created by [`watch`].
///
/// Dropping the handle detaches every listener.
#[must_use = "dropping a WatchHandle detaches the commit graph immediately"]
pub struct WatchHandle {
    shared: Rc<GraphShared>,
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("attached", &self.attached_count())
            .field("commits", &self.commit_count())
            .field("active", &self.is_active())
            .finish()
    }
}

/// Attach `commit` to every node reachable from `root`.
pub fn watch(root: &Node, commit: impl Fn() + 'static) -> WatchHandle {
    let shared = Rc::new(GraphShared {
        attachments: RefCell::new(AHashMap::new()),
        commit: Box::new(commit),
        commits: Cell::new(0),
        disposed: Cell::new(false),
    });
    attach(&shared, root);
    debug!(
        root = %root.id(),
        attached = shared.attachments.borrow().len(),
        "commit graph attached"
    );
    WatchHandle { shared }
}

impl WatchHandle {
    /// Detach every listener. Fails if the graph was already detached.
    pub fn unwatch(&self) -> Result<()> {
        if self.shared.disposed.replace(true) {
            return Err(WatchError::DetachAfterDispose);
        }
        let released = std::mem::take(&mut *self.shared.attachments.borrow_mut());
        debug!(detached = released.len(), "commit graph detached");
        drop(released);
        Ok(())
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.shared.disposed.get()
    }

    /// Number of commits delivered so far.
    #[must_use]
    pub fn commit_count(&self) -> u64 {
        self.shared.commits.get()
    }

    /// Number of distinct nodes currently carrying a listener.
    #[must_use]
    pub fn attached_count(&self) -> usize {
        self.shared.attachments.borrow().len()
    }

    /// Whether `node` currently carries a listener from this handle.
    #[must_use]
    pub fn is_attached(&self, node: &Node) -> bool {
        self.shared.attachments.borrow().contains_key(&node.id())
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        if self.is_active() {
            let _ = self.unwatch();
        }
    }
}

fn attach(shared: &Rc<GraphShared>, node: &Node) {
    if shared.disposed.get() {
        return;
    }
    let id = node.id();
    if let Some(attachment) = shared.attachments.borrow_mut().get_mut(&id) {
        attachment.refs += 1;
        return;
    }
    let subscription = subscribe(Rc::downgrade(shared), node);
    shared.attachments.borrow_mut().insert(
        id,
        Attachment {
            refs: 1,
            _subscription: subscription,
        },
    );
    trace!(node = %id, kind = %node.kind(), "attached");
    for child in node.children() {
        attach(shared, &child);
    }
}

fn detach(shared: &Rc<GraphShared>, node: &Node) {
    let id = node.id();
    let released = {
        let mut attachments = shared.attachments.borrow_mut();
        let Some(attachment) = attachments.get_mut(&id) else {
            return;
        };
        if attachment.refs > 1 {
            attachment.refs -= 1;
            return;
        }
        attachments.remove(&id)
    };
    drop(released);
    trace!(node = %id, kind = %node.kind(), "detached");
    for child in node.children() {
        detach(shared, &child);
    }
}

fn subscribe(shared: Weak<GraphShared>, node: &Node) -> Subscription {
    match node {
        Node::Primitive(cell) => cell.observe(move |_, _| {
            if let Some(shared) = shared.upgrade() {
                shared.commit();
            }
        }),
        Node::List(list) => list.observe(move |event, _| {
            let Some(shared) = shared.upgrade() else {
                return;
            };
            match event {
                ListEvent::ItemAdded { item, .. } => {
                    attach(&shared, item);
                    shared.commit();
                }
                // The paired addition commits the replacement.
                ListEvent::ItemRemoved { item, replaced, .. } => {
                    detach(&shared, item);
                    if !replaced {
                        shared.commit();
                    }
                }
            }
        }),
        Node::Object(object) => object.observe(move |event, _| {
            let Some(shared) = shared.upgrade() else {
                return;
            };
            match event {
                ObjectEvent::Set { value, old, .. } => {
                    if let Some(old) = old {
                        detach(&shared, old);
                    }
                    attach(&shared, value);
                    shared.commit();
                }
                ObjectEvent::Vivified { value, .. } => attach(&shared, value),
                ObjectEvent::Removed { old, .. } => {
                    detach(&shared, old);
                    shared.commit();
                }
            }
        }),
    }
}
