#![forbid(unsafe_code)]

//! Observable scalar cells and the notification machinery shared by every
//! node kind.
//!
//! # Design
//!
//! [`WatchValue<T>`] keeps its value and observer list in shared,
//! reference-counted storage. Observers are stored as `Weak` callbacks; the
//! strong side lives in the [`Subscription`] returned by `observe`, so
//! dropping the subscription detaches the observer. Dead entries are pruned
//! lazily at the start of each notification cycle.
//!
//! # Invariants
//!
//! 1. Version increments exactly once per notifying mutation.
//! 2. Observers are notified in registration order.
//! 3. Under [`NotifyPolicy::OnChange`], setting an equal value is a no-op.
//! 4. The observer list is snapshotted before each cycle: observers added
//!    during a cycle run from the next one, observers dropped during a cycle
//!    still see the event in flight.
//! 5. A node never delivers two notifications concurrently. A mutation issued
//!    from inside one of its own observers is queued (or rejected, per
//!    [`ReentrancyPolicy`]) and delivered after the current cycle.
//!
//! # Failure Modes
//!
//! - **Observer panics**: the notifying flag is reset by a drop guard, so the
//!   node stays usable. Queued notifications from the failed cycle are kept
//!   and delivered by the next outer cycle.
//! - **Cyclic updates**: queued notifications are drained at most
//!   `max_drain` times per outer mutation; the remainder is discarded and the
//!   outer call fails with [`WatchError::ReentrantMutation`].

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{trace, warn};

use crate::config::{NotifyPolicy, ReentrancyPolicy, WatchConfig};
use crate::error::{Result, WatchError};
use crate::node::NodeId;

/// RAII guard for a registered observer.
///
/// Dropping the guard (or calling [`unsubscribe`](Self::unsubscribe)) removes
/// the callback before the next notification cycle.
#[must_use = "dropping a Subscription detaches the observer immediately"]
pub struct Subscription {
    guard: Option<Box<dyn Any>>,
}

impl Subscription {
    pub(crate) fn new<F: ?Sized + 'static>(callback: Rc<F>) -> Self {
        Self {
            guard: Some(Box::new(callback)),
        }
    }

    /// Keep arbitrary state alive for as long as the subscription lives.
    ///
    /// Used for composite observers that own several inner subscriptions.
    pub fn bundle(state: impl Any) -> Self {
        Self {
            guard: Some(Box::new(state)),
        }
    }

    /// An inert subscription that owns nothing.
    pub fn detached() -> Self {
        Self { guard: None }
    }

    /// Whether this subscription still holds an observer.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.guard.is_some()
    }

    /// Detach the observer now.
    pub fn unsubscribe(mut self) {
        self.guard.take();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Resets the notifying flag even if an observer unwinds.
struct NotifyGuard<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> NotifyGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self { flag }
    }
}

impl Drop for NotifyGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

/// Observer list plus the re-entrancy queue of one node.
///
/// `E` is the event type, `F` the (unsized) callback type.
pub(crate) struct Dispatcher<E, F: ?Sized> {
    subscribers: RefCell<Vec<Weak<F>>>,
    pending: RefCell<VecDeque<E>>,
    notifying: Cell<bool>,
}

impl<E, F: ?Sized + 'static> Dispatcher<E, F> {
    pub(crate) fn new() -> Self {
        Self {
            subscribers: RefCell::new(Vec::new()),
            pending: RefCell::new(VecDeque::new()),
            notifying: Cell::new(false),
        }
    }

    pub(crate) fn subscribe(&self, callback: Rc<F>) -> Subscription {
        self.subscribers.borrow_mut().push(Rc::downgrade(&callback));
        Subscription::new(callback)
    }

    pub(crate) fn live_count(&self) -> usize {
        self.subscribers
            .borrow()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Fail early when a mutation would re-enter a node that rejects it.
    pub(crate) fn check_reentry(&self, node: NodeId, config: &WatchConfig) -> Result<()> {
        if self.notifying.get() && config.reentrancy == ReentrancyPolicy::Reject {
            return Err(WatchError::ReentrantMutation { node, depth: 1 });
        }
        Ok(())
    }

    fn snapshot(&self) -> Vec<Rc<F>> {
        let mut subscribers = self.subscribers.borrow_mut();
        subscribers.retain(|weak| weak.strong_count() > 0);
        subscribers.iter().filter_map(Weak::upgrade).collect()
    }

    fn deliver(&self, event: &E, call: &impl Fn(&F, &E)) {
        for callback in self.snapshot() {
            call(&*callback, event);
        }
    }

    /// Deliver `event` to every observer, then drain events queued by
    /// re-entrant mutations.
    pub(crate) fn dispatch(
        &self,
        node: NodeId,
        config: &WatchConfig,
        event: E,
        call: impl Fn(&F, &E),
    ) -> Result<()> {
        self.dispatch_batch(node, config, || {}, [event], call)
    }

    /// Deliver `events` in order within a single cycle.
    ///
    /// `before` runs once the node already counts as notifying, so anything
    /// it triggers on this node is queued behind `events`.
    pub(crate) fn dispatch_batch(
        &self,
        node: NodeId,
        config: &WatchConfig,
        before: impl FnOnce(),
        events: impl IntoIterator<Item = E>,
        call: impl Fn(&F, &E),
    ) -> Result<()> {
        if self.notifying.get() {
            before();
            trace!(node = %node, "queued re-entrant notification");
            self.pending.borrow_mut().extend(events);
            return Ok(());
        }

        let _guard = NotifyGuard::enter(&self.notifying);
        before();
        for event in events {
            self.deliver(&event, &call);
        }

        let mut drained = 0usize;
        loop {
            let next = self.pending.borrow_mut().pop_front();
            let Some(next) = next else { break };
            drained += 1;
            if drained > config.max_drain {
                let discarded = {
                    let mut pending = self.pending.borrow_mut();
                    let count = pending.len() + 1;
                    pending.clear();
                    count
                };
                warn!(
                    node = %node,
                    max_drain = config.max_drain,
                    discarded,
                    "re-entrant drain limit reached"
                );
                return Err(WatchError::ReentrantMutation {
                    node,
                    depth: drained,
                });
            }
            self.deliver(&next, &call);
        }
        Ok(())
    }
}

/// A change delivered to [`WatchValue`] observers.
#[derive(Debug, Clone)]
pub(crate) struct ValueChange<T> {
    new: T,
    old: T,
}

type ValueCallback<T> = dyn Fn(&T, &T);

struct ValueInner<T> {
    id: NodeId,
    value: RefCell<T>,
    version: Cell<u64>,
    config: WatchConfig,
    dispatch: Dispatcher<ValueChange<T>, ValueCallback<T>>,
}

/// A shared, version-tracked cell that notifies observers on change.
///
/// Cloning a `WatchValue` creates a new handle to the **same** cell.
pub struct WatchValue<T> {
    inner: Rc<ValueInner<T>>,
}

impl<T> Clone for WatchValue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for WatchValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchValue")
            .field("id", &self.inner.id)
            .field("value", &self.inner.value.borrow())
            .field("version", &self.inner.version.get())
            .finish()
    }
}

impl<T: Default + Clone + PartialEq + 'static> Default for WatchValue<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + PartialEq + 'static> WatchValue<T> {
    pub fn new(value: T) -> Self {
        Self::with_config(value, WatchConfig::default())
    }

    pub fn with_config(value: T, config: WatchConfig) -> Self {
        Self {
            inner: Rc::new(ValueInner {
                id: NodeId::next(),
                value: RefCell::new(value),
                version: Cell::new(0),
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

    /// Clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value without cloning.
    ///
    /// # Panics
    ///
    /// Panics if the closure calls `set` on the same cell.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Replace the value and notify observers with `(new, old)`.
    ///
    /// Returns `Ok(false)` when the value was unchanged and the policy is
    /// [`NotifyPolicy::OnChange`].
    pub fn set(&self, value: T) -> Result<bool> {
        let inner = &self.inner;
        inner.dispatch.check_reentry(inner.id, &inner.config)?;
        let old = {
            let mut current = inner.value.borrow_mut();
            if inner.config.notify == NotifyPolicy::OnChange && *current == value {
                return Ok(false);
            }
            std::mem::replace(&mut *current, value.clone())
        };
        self.notify(value, old)?;
        Ok(true)
    }

    /// Mutate the value in place, notifying if the result differs.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> Result<bool> {
        let inner = &self.inner;
        inner.dispatch.check_reentry(inner.id, &inner.config)?;
        let (new, old) = {
            let mut current = inner.value.borrow_mut();
            let old = current.clone();
            f(&mut current);
            if inner.config.notify == NotifyPolicy::OnChange && *current == old {
                return Ok(false);
            }
            (current.clone(), old)
        };
        self.notify(new, old)?;
        Ok(true)
    }

    fn notify(&self, new: T, old: T) -> Result<()> {
        let inner = &self.inner;
        inner.version.set(inner.version.get() + 1);
        trace!(node = %inner.id, version = inner.version.get(), "value changed");
        inner.dispatch.dispatch(
            inner.id,
            &inner.config,
            ValueChange { new, old },
            |callback, change| callback(&change.new, &change.old),
        )
    }

    /// Register an observer receiving `(new, old)`.
    pub fn observe(&self, f: impl Fn(&T, &T) + 'static) -> Subscription {
        let callback: Rc<ValueCallback<T>> = Rc::new(f);
        self.inner.dispatch.subscribe(callback)
    }

    /// Monotonic mutation counter.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// Number of observers whose subscriptions are still alive.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.inner.dispatch.live_count()
    }

    /// Whether both handles refer to the same cell.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}
