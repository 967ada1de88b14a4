#![forbid(unsafe_code)]

//! Ordered observable sequences.
//!
//! # Invariants
//!
//! 1. Every structural mutation emits exactly one event per affected item.
//! 2. `ItemAdded` carries the item's index *after* the mutation;
//!    `ItemRemoved` carries the index the item had *before* removal.
//! 3. The observable [`length`](WatchList::length) cell is updated before
//!    list observers run. The list counts as notifying while the length
//!    cell notifies, so mutations issued from a `length` observer are queued
//!    behind (or rejected by) the list's own event.
//! 4. Out-of-range indices and rejected re-entrant mutations fail before
//!    touching the list.
//! 5. `replace_at` delivers its `ItemRemoved`/`ItemAdded` pair within one
//!    cycle; the removal is flagged with `replaced: true`.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::{trace, warn};

use crate::config::WatchConfig;
use crate::error::{Result, WatchError};
use crate::node::NodeId;
use crate::observable::{Dispatcher, Subscription, WatchValue};

/// A structural change delivered to [`WatchList`] observers.
#[derive(Debug, Clone, PartialEq)]
pub enum ListEvent<T> {
    ItemAdded { item: T, index: usize },
    /// `replaced` is set when an `ItemAdded` at the same index follows as
    /// part of the same `replace_at`.
    ItemRemoved { item: T, index: usize, replaced: bool },
}

impl<T> ListEvent<T> {
    #[must_use]
    pub fn item(&self) -> &T {
        match self {
            Self::ItemAdded { item, .. } | Self::ItemRemoved { item, .. } => item,
        }
    }

    #[must_use]
    pub fn index(&self) -> usize {
        match self {
            Self::ItemAdded { index, .. } | Self::ItemRemoved { index, .. } => *index,
        }
    }

    #[must_use]
    pub fn is_added(&self) -> bool {
        matches!(self, Self::ItemAdded { .. })
    }

    /// Whether this is the removal half of a replacement.
    #[must_use]
    pub fn is_replacement(&self) -> bool {
        matches!(self, Self::ItemRemoved { replaced: true, .. })
    }
}

type ListCallback<T> = dyn Fn(&ListEvent<T>, &WatchList<T>);

struct ListInner<T> {
    id: NodeId,
    items: RefCell<Vec<T>>,
    length: WatchValue<usize>,
    config: WatchConfig,
    dispatch: Dispatcher<ListEvent<T>, ListCallback<T>>,
}

/// An ordered, observable sequence.
///
/// Cloning a `WatchList` creates a new handle to the **same** list.
pub struct WatchList<T> {
    inner: Rc<ListInner<T>>,
}

impl<T> Clone for WatchList<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for WatchList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchList")
            .field("id", &self.inner.id)
            .field("items", &self.inner.items.borrow())
            .finish()
    }
}

impl<T: Clone + 'static> Default for WatchList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> WatchList<T> {
    pub fn new() -> Self {
        Self::with_config(WatchConfig::default())
    }

    pub fn with_config(config: WatchConfig) -> Self {
        Self::from_items(Vec::new(), config)
    }

    /// Build a list holding `items` without emitting any events.
    pub fn from_items(items: impl IntoIterator<Item = T>, config: WatchConfig) -> Self {
        let items: Vec<T> = items.into_iter().collect();
        Self {
            inner: Rc::new(ListInner {
                id: NodeId::next(),
                length: WatchValue::with_config(items.len(), config),
                items: RefCell::new(items),
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
        self.inner.items.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.items.borrow().is_empty()
    }

    /// The observable length cell.
    #[must_use]
    pub fn length(&self) -> WatchValue<usize> {
        self.inner.length.clone()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<T> {
        self.inner.items.borrow().get(index).cloned()
    }

    /// Snapshot of every item in order.
    #[must_use]
    pub fn all_items(&self) -> Vec<T> {
        self.inner.items.borrow().clone()
    }

    /// Add `item` at the end; returns its index.
    pub fn append(&self, item: T) -> Result<usize> {
        let index = self.len();
        self.insert(index, item)?;
        Ok(index)
    }

    /// Insert `item` at `index` (`index == len` appends).
    pub fn insert(&self, index: usize, item: T) -> Result<()> {
        self.guard()?;
        let len = {
            let mut items = self.inner.items.borrow_mut();
            if index > items.len() {
                return Err(WatchError::IndexOutOfBounds {
                    index,
                    len: items.len(),
                });
            }
            items.insert(index, item.clone());
            items.len()
        };
        trace!(list = %self.inner.id, index, len, "item added");
        self.emit_resized(len, [ListEvent::ItemAdded { item, index }])
    }

    /// Remove and return the item at `index`.
    pub fn remove_at(&self, index: usize) -> Result<T> {
        self.guard()?;
        let (item, len) = {
            let mut items = self.inner.items.borrow_mut();
            if index >= items.len() {
                return Err(WatchError::IndexOutOfBounds {
                    index,
                    len: items.len(),
                });
            }
            let item = items.remove(index);
            (item, items.len())
        };
        trace!(list = %self.inner.id, index, len, "item removed");
        self.emit_resized(
            len,
            [ListEvent::ItemRemoved {
                item: item.clone(),
                index,
                replaced: false,
            }],
        )?;
        Ok(item)
    }

    /// Replace the item at `index`, emitting a removal then an addition at
    /// the same index in one cycle. Returns the previous item.
    pub fn replace_at(&self, index: usize, item: T) -> Result<T> {
        self.guard()?;
        let previous = {
            let mut items = self.inner.items.borrow_mut();
            let len = items.len();
            let slot = items
                .get_mut(index)
                .ok_or(WatchError::IndexOutOfBounds { index, len })?;
            std::mem::replace(slot, item.clone())
        };
        self.emit(
            || {},
            [
                ListEvent::ItemRemoved {
                    item: previous.clone(),
                    index,
                    replaced: true,
                },
                ListEvent::ItemAdded { item, index },
            ],
        )?;
        Ok(previous)
    }

    /// Remove every item, last first. Returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        while !self.is_empty() {
            self.remove_at(self.len() - 1)?;
            removed += 1;
        }
        Ok(removed)
    }

    pub fn observe(&self, f: impl Fn(&ListEvent<T>, &WatchList<T>) + 'static) -> Subscription {
        let callback: Rc<ListCallback<T>> = Rc::new(f);
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

    fn emit<const N: usize>(
        &self,
        before: impl FnOnce(),
        events: [ListEvent<T>; N],
    ) -> Result<()> {
        self.inner.dispatch.dispatch_batch(
            self.inner.id,
            &self.inner.config,
            before,
            events,
            |callback, event| callback(event, self),
        )
    }

    /// Emit after syncing the length cell. The items are already mutated, so
    /// a failing length drain is logged rather than returned.
    fn emit_resized<const N: usize>(
        &self,
        len: usize,
        events: [ListEvent<T>; N],
    ) -> Result<()> {
        let length = &self.inner.length;
        let list = self.inner.id;
        self.emit(
            || {
                if let Err(err) = length.set(len) {
                    warn!(list = %list, error = %err, "length observers failed");
                }
            },
            events,
        )
    }
}

impl<T: Clone + PartialEq + 'static> WatchList<T> {
    /// Position of the first item equal to `item`.
    #[must_use]
    pub fn index_of(&self, item: &T) -> Option<usize> {
        self.inner.items.borrow().iter().position(|candidate| candidate == item)
    }
}
