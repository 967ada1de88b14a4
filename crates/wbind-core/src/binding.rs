#![forbid(unsafe_code)]

//! Two-way and one-way synchronisation between slots.
//!
//! [`bind`] copies the source into the target, then keeps both in sync in
//! both directions. [`bind_with`] applies a [`Translation`] on the way, and
//! [`bind_map`] only propagates source changes to the target.
//!
//! # Invariants
//!
//! 1. After construction the target holds the (translated) source value.
//! 2. A binding never re-propagates a change it is currently applying, so a
//!    two-way binding settles after one hop in each direction.
//! 3. Dropping the [`Binding`] stops propagation in both directions.
//!
//! Errors raised while propagating from inside an observer cannot be returned
//! to the caller; they are logged at `warn` level and the slot keeps its
//! previous value.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use tracing::warn;

use crate::accessor::{Observe, Readable, Writable};
use crate::error::Result;
use crate::observable::Subscription;

/// Conversion pair applied by [`bind_with`].
pub struct Translation<S, T> {
    to_target: Rc<dyn Fn(&S) -> T>,
    to_source: Rc<dyn Fn(&T) -> S>,
}

impl<S, T> Clone for Translation<S, T> {
    fn clone(&self) -> Self {
        Self {
            to_target: Rc::clone(&self.to_target),
            to_source: Rc::clone(&self.to_source),
        }
    }
}

impl<S, T> Translation<S, T> {
    pub fn new(
        to_target: impl Fn(&S) -> T + 'static,
        to_source: impl Fn(&T) -> S + 'static,
    ) -> Self {
        Self {
            to_target: Rc::new(to_target),
            to_source: Rc::new(to_source),
        }
    }
}

impl<T: Clone + 'static> Translation<T, T> {
    #[must_use]
    pub fn identity() -> Self {
        Self::new(T::clone, T::clone)
    }
}

/// A live binding. Propagation stops when it is dropped.
#[must_use = "dropping a Binding stops propagation immediately"]
pub struct Binding {
    _subscriptions: Vec<Subscription>,
    applying: Rc<Cell<bool>>,
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("subscriptions", &self._subscriptions.len())
            .field("applying", &self.applying.get())
            .finish()
    }
}

impl Binding {
    /// Stop propagation now.
    pub fn unbind(self) {}
}

/// Releases the applying flag even if a translation unwinds.
struct ApplyGuard<'a>(&'a Cell<bool>);

impl Drop for ApplyGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Runs `f` unless the guard is already held.
fn guarded(applying: &Cell<bool>, f: impl FnOnce()) {
    if applying.replace(true) {
        return;
    }
    let _release = ApplyGuard(applying);
    f();
}

/// Two-way binding with identical value types.
pub fn bind<T, A, B>(target: &A, source: &B) -> Result<Binding>
where
    T: Clone + 'static,
    A: Readable<T> + Writable<T> + Observe<T> + Clone + 'static,
    B: Readable<T> + Writable<T> + Observe<T> + Clone + 'static,
{
    bind_with(target, source, Translation::identity())
}

/// Two-way binding through a translation.
pub fn bind_with<S, T, A, B>(
    target: &A,
    source: &B,
    translation: Translation<S, T>,
) -> Result<Binding>
where
    S: 'static,
    T: 'static,
    A: Readable<T> + Writable<T> + Observe<T> + Clone + 'static,
    B: Readable<S> + Writable<S> + Observe<S> + Clone + 'static,
{
    let applying = Rc::new(Cell::new(false));
    target.write((translation.to_target)(&source.read()))?;

    let forward = {
        let target = target.clone();
        let applying = Rc::clone(&applying);
        let to_target = Rc::clone(&translation.to_target);
        source.watch_changes(Box::new(move |new, _| {
            guarded(&applying, || {
                if let Err(err) = target.write(to_target(new)) {
                    warn!(error = %err, "binding failed to update target");
                }
            });
        }))
    };

    let backward = {
        let source = source.clone();
        let applying = Rc::clone(&applying);
        let to_source = Rc::clone(&translation.to_source);
        target.watch_changes(Box::new(move |new, _| {
            guarded(&applying, || {
                if let Err(err) = source.write(to_source(new)) {
                    warn!(error = %err, "binding failed to update source");
                }
            });
        }))
    };

    Ok(Binding {
        _subscriptions: vec![forward, backward],
        applying,
    })
}

/// One-way binding: source changes are mapped into the target.
pub fn bind_map<S, T, A, B>(target: &A, source: &B, map: impl Fn(&S) -> T + 'static) -> Result<Binding>
where
    S: 'static,
    T: 'static,
    A: Writable<T> + Clone + 'static,
    B: Readable<S> + Observe<S>,
{
    let applying = Rc::new(Cell::new(false));
    target.write(map(&source.read()))?;

    let target = target.clone();
    let guard = Rc::clone(&applying);
    let forward = source.watch_changes(Box::new(move |new, _| {
        guarded(&guard, || {
            if let Err(err) = target.write(map(new)) {
                warn!(error = %err, "binding failed to update target");
            }
        });
    }));

    Ok(Binding {
        _subscriptions: vec![forward],
        applying,
    })
}
