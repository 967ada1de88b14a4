//! The observable node union and its scalar payload.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashSet;
use serde_json::{Map, Number, Value};

use crate::error::{Result, WatchError};
use crate::list::WatchList;
use crate::object::WatchObject;
use crate::observable::WatchValue;
use crate::path::{Path, Segment};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an observable cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Tag of a [`Node`]. Fixed for the node's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Primitive,
    List,
    Object,
}

impl NodeKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primitive => "primitive",
            Self::List => "list",
            Self::Object => "object",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON scalar held by a primitive node.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Scalar {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

impl Scalar {
    /// `None` for arrays and objects.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::Null),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => Some(Self::Number(n.clone())),
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(n.clone()),
            Self::String(s) => Value::String(s.clone()),
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Number(n) => n.as_u64(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => n.as_f64(),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

impl From<()> for Scalar {
    fn from((): ()) -> Self {
        Self::Null
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Self::Number(value.into())
    }
}

impl From<u64> for Scalar {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

/// Non-finite floats have no JSON form and become `Null`.
impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Number::from_f64(value).map_or(Self::Null, Self::Number)
    }
}

impl From<Number> for Scalar {
    fn from(value: Number) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// An observable node: a primitive cell, a list of nodes, or an object of
/// nodes.
///
/// Nodes are handles; cloning one yields another handle to the same cell.
/// Equality is identity: two nodes are equal when they are the same cell.
#[derive(Debug, Clone)]
pub enum Node {
    Primitive(WatchValue<Scalar>),
    List(WatchList<Node>),
    Object(WatchObject),
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Node {}

impl From<WatchValue<Scalar>> for Node {
    fn from(value: WatchValue<Scalar>) -> Self {
        Self::Primitive(value)
    }
}

impl From<WatchList<Node>> for Node {
    fn from(value: WatchList<Node>) -> Self {
        Self::List(value)
    }
}

impl From<WatchObject> for Node {
    fn from(value: WatchObject) -> Self {
        Self::Object(value)
    }
}

impl Node {
    /// A fresh primitive cell.
    pub fn scalar(value: impl Into<Scalar>) -> Self {
        Self::Primitive(WatchValue::new(value.into()))
    }

    pub fn empty_list() -> Self {
        Self::List(WatchList::new())
    }

    pub fn empty_object() -> Self {
        Self::Object(WatchObject::new())
    }

    #[must_use]
    pub fn id(&self) -> NodeId {
        match self {
            Self::Primitive(cell) => cell.id(),
            Self::List(list) => list.id(),
            Self::Object(object) => object.id(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Primitive(_) => NodeKind::Primitive,
            Self::List(_) => NodeKind::List,
            Self::Object(_) => NodeKind::Object,
        }
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }

    #[must_use]
    pub fn as_primitive(&self) -> Option<&WatchValue<Scalar>> {
        match self {
            Self::Primitive(cell) => Some(cell),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&WatchList<Node>> {
        match self {
            Self::List(list) => Some(list),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&WatchObject> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn primitive(&self) -> Result<&WatchValue<Scalar>> {
        self.as_primitive().ok_or_else(|| self.mismatch(NodeKind::Primitive))
    }

    pub fn list(&self) -> Result<&WatchList<Node>> {
        self.as_list().ok_or_else(|| self.mismatch(NodeKind::List))
    }

    pub fn object(&self) -> Result<&WatchObject> {
        self.as_object().ok_or_else(|| self.mismatch(NodeKind::Object))
    }

    fn mismatch(&self, expected: NodeKind) -> WatchError {
        WatchError::KindMismatch {
            expected,
            found: self.kind(),
        }
    }

    /// Scalar value of a primitive node, `None` for containers.
    #[must_use]
    pub fn scalar_value(&self) -> Option<Scalar> {
        self.as_primitive().map(WatchValue::get)
    }

    /// Snapshot of the direct children (list items or object values).
    #[must_use]
    pub fn children(&self) -> Vec<Node> {
        match self {
            Self::Primitive(_) => Vec::new(),
            Self::List(list) => list.all_items(),
            Self::Object(object) => object.get_all().into_values().collect(),
        }
    }

    /// Number of distinct nodes reachable from this one, itself included.
    #[must_use]
    pub fn count(&self) -> usize {
        let mut seen = AHashSet::new();
        let mut stack = vec![self.clone()];
        while let Some(node) = stack.pop() {
            if seen.insert(node.id()) {
                stack.extend(node.children());
            }
        }
        seen.len()
    }

    /// Non-vivifying lookup of a descendant.
    pub fn at(&self, path: &Path) -> Result<Node> {
        let mut current = self.clone();
        for (depth, segment) in path.segments().iter().enumerate() {
            let next = match (&current, segment) {
                (Self::Object(object), Segment::Key(key)) => object.peek(key),
                (Self::Object(object), Segment::Index(index)) => object.peek(&index.to_string()),
                (Self::List(list), Segment::Index(index)) => list.get(*index),
                (Self::List(list), Segment::Key(key)) => {
                    key.parse::<usize>().ok().and_then(|index| list.get(index))
                }
                (Self::Primitive(_), _) => {
                    return Err(WatchError::KindMismatch {
                        expected: segment.container_kind(),
                        found: NodeKind::Primitive,
                    });
                }
            };
            current = next.ok_or_else(|| WatchError::PathNotFound {
                path: path.prefix(depth + 1).to_string(),
            })?;
        }
        Ok(current)
    }

    /// Plain JSON form of the subtree.
    ///
    /// Shared subtrees serialize once per occurrence; a node that contains
    /// itself is rejected with [`WatchError::MalformedInput`].
    pub fn to_value(&self) -> Result<Value> {
        let mut ancestors = AHashSet::new();
        self.to_value_inner(&mut ancestors)
    }

    fn to_value_inner(&self, ancestors: &mut AHashSet<NodeId>) -> Result<Value> {
        match self {
            Self::Primitive(cell) => Ok(cell.with(Scalar::to_value)),
            Self::List(list) => {
                self.enter(ancestors)?;
                let items = list
                    .all_items()
                    .iter()
                    .map(|item| item.to_value_inner(ancestors))
                    .collect::<Result<Vec<_>>>();
                ancestors.remove(&self.id());
                Ok(Value::Array(items?))
            }
            Self::Object(object) => {
                self.enter(ancestors)?;
                let mut map = Map::new();
                let mut failure = None;
                for (key, value) in object.get_all() {
                    match value.to_value_inner(ancestors) {
                        Ok(json) => {
                            map.insert(key, json);
                        }
                        Err(err) => {
                            failure = Some(err);
                            break;
                        }
                    }
                }
                ancestors.remove(&self.id());
                match failure {
                    Some(err) => Err(err),
                    None => Ok(Value::Object(map)),
                }
            }
        }
    }

    fn enter(&self, ancestors: &mut AHashSet<NodeId>) -> Result<()> {
        if ancestors.insert(self.id()) {
            Ok(())
        } else {
            Err(WatchError::malformed(format!(
                "cycle through {} node {}",
                self.kind(),
                self.id()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::watch::watchize;

    #[test]
    fn ids_are_unique() {
        let a = Node::scalar(1);
        let b = Node::scalar(1);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn kind_never_changes_on_mutation() {
        let node = watchize(&json!({"a": 1}));
        let object = node.object().unwrap();
        object.set("a", Node::empty_list()).unwrap();
        assert_eq!(node.kind(), NodeKind::Object);
        assert_eq!(object.peek("a").unwrap().kind(), NodeKind::List);
    }

    #[test]
    fn kind_accessors() {
        let node = Node::scalar("x");
        assert!(node.as_primitive().is_some());
        assert!(node.as_list().is_none());
        assert_eq!(
            node.list().unwrap_err(),
            WatchError::KindMismatch {
                expected: NodeKind::List,
                found: NodeKind::Primitive
            }
        );
        assert_eq!(node.scalar_value(), Some(Scalar::from("x")));
    }

    #[test]
    fn scalar_conversions() {
        assert_eq!(Scalar::from(f64::NAN), Scalar::Null);
        assert_eq!(Scalar::from(2.5).as_f64(), Some(2.5));
        assert_eq!(Scalar::from(7i64).as_i64(), Some(7));
        assert_eq!(Scalar::from(true).as_bool(), Some(true));
        assert_eq!(Scalar::from("hi").to_string(), "\"hi\"");
        assert!(Scalar::from(()).is_null());
        assert_eq!(Scalar::from_value(&json!([1])), None);
        assert_eq!(Scalar::from_value(&json!(3)), Some(Scalar::from(3)));
    }

    #[test]
    fn to_value_round_trips() {
        let value = json!({"a": [1, 2, {"b": null}], "c": "d", "e": false});
        assert_eq!(watchize(&value).to_value().unwrap(), value);
    }

    #[test]
    fn shared_subtree_serializes_at_each_occurrence() {
        let shared = watchize(&json!({"x": 1}));
        let list = WatchList::new();
        list.append(shared.clone()).unwrap();
        list.append(shared).unwrap();
        let node = Node::List(list);
        assert_eq!(node.to_value().unwrap(), json!([{"x": 1}, {"x": 1}]));
        assert_eq!(node.count(), 3);
    }

    #[test]
    fn cycles_are_rejected() {
        let node = Node::empty_object();
        let object = node.object().unwrap();
        object.set("self", node.clone()).unwrap();
        let err = node.to_value().unwrap_err();
        assert!(matches!(err, WatchError::MalformedInput { .. }));
        assert_eq!(node.count(), 1);
        // Break the cycle so the test does not leak.
        object.remove("self").unwrap();
    }

    #[test]
    fn path_lookup() {
        let node = watchize(&json!({"a": [10, {"b": "deep"}], "7": true}));
        let path: Path = "a.1.b".parse().unwrap();
        assert_eq!(
            node.at(&path).unwrap().scalar_value(),
            Some(Scalar::from("deep"))
        );
        let numeric_key: Path = "7".parse().unwrap();
        assert_eq!(
            node.at(&numeric_key).unwrap().scalar_value(),
            Some(Scalar::from(true))
        );
        assert_eq!(node.at(&Path::root()).unwrap(), node);
    }

    #[test]
    fn path_errors() {
        let node = watchize(&json!({"a": [10]}));
        let missing: Path = "a.3".parse().unwrap();
        assert_eq!(
            node.at(&missing).unwrap_err(),
            WatchError::PathNotFound { path: "a.3".into() }
        );
        let through_scalar: Path = "a.0.x".parse().unwrap();
        assert!(matches!(
            node.at(&through_scalar).unwrap_err(),
            WatchError::KindMismatch {
                found: NodeKind::Primitive,
                ..
            }
        ));
    }

    #[test]
    fn node_id_display() {
        assert_eq!(NodeId::from_raw(12).to_string(), "#12");
        assert_eq!(NodeId::from_raw(12).raw(), 12);
    }
}
