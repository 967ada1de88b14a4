//! Receivers of serialized payloads after a commit.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;

/// Receives the serialized payload of a resource after each commit.
pub trait CommitSink {
    fn commit(&self, payload: &Value);
}

impl<F: Fn(&Value)> CommitSink for F {
    fn commit(&self, payload: &Value) {
        self(payload)
    }
}

/// Records every committed payload. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct CommitLog {
    entries: Rc<RefCell<Vec<Value>>>,
}

impl CommitLog {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    #[must_use]
    pub fn entries(&self) -> Vec<Value> {
        self.entries.borrow().clone()
    }

    #[must_use]
    pub fn last(&self) -> Option<Value> {
        self.entries.borrow().last().cloned()
    }

    /// Take every recorded payload, leaving the log empty.
    pub fn take(&self) -> Vec<Value> {
        std::mem::take(&mut *self.entries.borrow_mut())
    }
}

impl CommitSink for CommitLog {
    fn commit(&self, payload: &Value) {
        self.entries.borrow_mut().push(payload.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    #[test]
    fn log_clones_share_entries() {
        let log = CommitLog::new();
        let sink: Box<dyn CommitSink> = Box::new(log.clone());
        sink.commit(&json!({"n": 1}));
        sink.commit(&json!({"n": 2}));
        assert_eq!(log.len(), 2);
        assert_eq!(log.last(), Some(json!({"n": 2})));
        assert_eq!(log.take().len(), 2);
        assert!(log.is_empty());
    }

    #[test]
    fn closures_are_sinks() {
        let seen = Rc::new(Cell::new(0));
        let counter = Rc::clone(&seen);
        let sink = move |_: &Value| counter.set(counter.get() + 1);
        sink.commit(&Value::Null);
        assert_eq!(seen.get(), 1);
    }
}
