//! Capability traits for readable, writable and observable slots.
//!
//! Widgets bind to "something that holds a `T`" without caring whether it is
//! a standalone [`WatchValue`] or a key of a [`WatchObject`]. Each capability
//! is a separate trait so read-only sources and write-only sinks can be
//! expressed.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::config::NotifyPolicy;
use crate::error::Result;
use crate::node::{Node, Scalar};
use crate::object::WatchObject;
use crate::observable::{Subscription, WatchValue};

pub trait Readable<T> {
    fn read(&self) -> T;
}

pub trait Writable<T> {
    /// Store `value`; `Ok(false)` when nothing changed.
    fn write(&self, value: T) -> Result<bool>;
}

pub trait Observe<T> {
    /// Call `f(new, old)` whenever the observed value changes.
    fn watch_changes(&self, f: Box<dyn Fn(&T, &T)>) -> Subscription;
}

impl<T: Clone + PartialEq + 'static> Readable<T> for WatchValue<T> {
    fn read(&self) -> T {
        self.get()
    }
}

impl<T: Clone + PartialEq + 'static> Writable<T> for WatchValue<T> {
    fn write(&self, value: T) -> Result<bool> {
        self.set(value)
    }
}

impl<T: Clone + PartialEq + 'static> Observe<T> for WatchValue<T> {
    fn watch_changes(&self, f: Box<dyn Fn(&T, &T)>) -> Subscription {
        self.observe(move |new, old| f(new, old))
    }
}

/// Scalar slot at one key of a [`WatchObject`].
///
/// Reading a missing key (or a key holding a container) yields
/// [`Scalar::Null`]; reading never vivifies. Writing updates the primitive
/// cell stored at the key in place, or stores a new primitive cell when the
/// key is missing or holds a container. Observers follow the object's
/// [`NotifyPolicy`].
#[derive(Debug, Clone)]
pub struct KeyAccessor {
    object: WatchObject,
    key: String,
}

impl KeyAccessor {
    pub fn new(object: WatchObject, key: impl Into<String>) -> Self {
        Self {
            object,
            key: key.into(),
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn object(&self) -> &WatchObject {
        &self.object
    }

    #[must_use]
    pub fn get(&self) -> Scalar {
        read_scalar(&self.object, &self.key)
    }

    pub fn set(&self, value: impl Into<Scalar>) -> Result<bool> {
        let value = value.into();
        match self.object.peek(&self.key) {
            Some(Node::Primitive(cell)) => cell.set(value),
            _ => {
                let cell = WatchValue::with_config(value, self.object.config());
                self.object.set(self.key.clone(), Node::Primitive(cell))?;
                Ok(true)
            }
        }
    }

    /// Observe the scalar at this key, whether it changes through the
    /// primitive cell or through the key being replaced or removed.
    pub fn observe(&self, f: impl Fn(&Scalar, &Scalar) + 'static) -> Subscription {
        let state = Rc::new(KeyObserver {
            notify: self.object.config().notify,
            last: RefCell::new(self.get()),
            leaf: RefCell::new(None),
            callback: Box::new(f),
        });
        KeyObserver::rebind(&state, &self.object, &self.key);

        let weak = Rc::downgrade(&state);
        let key = self.key.clone();
        let object_sub = self.object.observe(move |event, object| {
            if event.key() != key {
                return;
            }
            if let Some(state) = weak.upgrade() {
                KeyObserver::rebind(&state, object, &key);
                state.emit(read_scalar(object, &key));
            }
        });
        Subscription::bundle((state, object_sub))
    }
}

impl Readable<Scalar> for KeyAccessor {
    fn read(&self) -> Scalar {
        self.get()
    }
}

impl Writable<Scalar> for KeyAccessor {
    fn write(&self, value: Scalar) -> Result<bool> {
        self.set(value)
    }
}

impl Observe<Scalar> for KeyAccessor {
    fn watch_changes(&self, f: Box<dyn Fn(&Scalar, &Scalar)>) -> Subscription {
        self.observe(move |new, old| f(new, old))
    }
}

fn read_scalar(object: &WatchObject, key: &str) -> Scalar {
    object
        .peek(key)
        .and_then(|node| node.scalar_value())
        .unwrap_or_default()
}

struct KeyObserver {
    notify: NotifyPolicy,
    last: RefCell<Scalar>,
    leaf: RefCell<Option<Subscription>>,
    callback: Box<dyn Fn(&Scalar, &Scalar)>,
}

impl KeyObserver {
    /// Follow whichever primitive cell currently sits at `key`.
    fn rebind(state: &Rc<Self>, object: &WatchObject, key: &str) {
        let leaf = object.peek(key).and_then(|node| match node {
            Node::Primitive(cell) => {
                let weak: Weak<Self> = Rc::downgrade(state);
                Some(cell.observe(move |new, _| {
                    if let Some(state) = weak.upgrade() {
                        state.emit(new.clone());
                    }
                }))
            }
            _ => None,
        });
        trace!(key, following = leaf.is_some(), "accessor rebound");
        *state.leaf.borrow_mut() = leaf;
    }

    fn emit(&self, new: Scalar) {
        let old = self.last.replace(new.clone());
        if self.notify == NotifyPolicy::Always || old != new {
            (self.callback)(&new, &old);
        }
    }
}
