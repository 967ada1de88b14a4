//! Edit scripts: a JSON array of edits applied to a resource in order.
//!
//! ```json
//! [
//!   {"op": "set", "path": "title", "value": "Keynote"},
//!   {"op": "append", "path": "authors", "value": {"name": "Ada"}},
//!   {"op": "insert", "path": ["authors"], "index": 0, "value": {"name": "Grace"}},
//!   {"op": "remove_at", "path": "authors", "index": 1},
//!   {"op": "remove_key", "path": "", "key": "draft"},
//!   {"op": "set_reference", "path": "room", "id": "room-4", "revision": 2}
//! ]
//! ```
//!
//! Paths are relative to the resource's `data` object. `append` and
//! `insert` vivify a missing list at their final key.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use wbind_core::{
    Node, Path, Scalar, Segment, WatchError, WatchList, WatchObject, watchize_with,
};
use wbind_resource::{Resource, ResourceReference};

use crate::error::{HarnessError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Edit {
    Set {
        path: Path,
        value: Value,
    },
    Append {
        path: Path,
        value: Value,
    },
    Insert {
        path: Path,
        index: usize,
        value: Value,
    },
    RemoveAt {
        path: Path,
        index: usize,
    },
    RemoveKey {
        #[serde(default)]
        path: Path,
        key: String,
    },
    SetReference {
        path: Path,
        id: String,
        revision: u64,
    },
}

impl Edit {
    #[must_use]
    pub fn op(&self) -> &'static str {
        match self {
            Self::Set { .. } => "set",
            Self::Append { .. } => "append",
            Self::Insert { .. } => "insert",
            Self::RemoveAt { .. } => "remove_at",
            Self::RemoveKey { .. } => "remove_key",
            Self::SetReference { .. } => "set_reference",
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Set { path, .. }
            | Self::Append { path, .. }
            | Self::Insert { path, .. }
            | Self::RemoveAt { path, .. }
            | Self::RemoveKey { path, .. }
            | Self::SetReference { path, .. } => path,
        }
    }
}

/// Parse a script document; each edit is validated individually so errors
/// name the offending index.
pub fn parse(value: &Value) -> Result<Vec<Edit>> {
    let items = value
        .as_array()
        .ok_or_else(|| HarnessError::invalid_script(0, "script must be a JSON array"))?;
    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            Edit::deserialize(item).map_err(|err| HarnessError::invalid_script(index, err.to_string()))
        })
        .collect()
}

/// Apply every edit in order, stopping at the first failure.
pub fn apply_all(resource: &Resource, edits: &[Edit]) -> Result<usize> {
    for (index, edit) in edits.iter().enumerate() {
        debug!(index, op = edit.op(), path = %edit.path(), "applying edit");
        apply(resource, edit).map_err(|err| match err {
            HarnessError::Watch(watch) => HarnessError::invalid_script(index, watch.to_string()),
            HarnessError::InvalidScript { reason, .. } => HarnessError::invalid_script(index, reason),
            other => other,
        })?;
    }
    Ok(edits.len())
}

pub fn apply(resource: &Resource, edit: &Edit) -> Result<()> {
    let root = resource.root();
    let config = root.config();
    match edit {
        Edit::Set { path, value } => {
            let (parent, last) = split(path)?;
            let parent = parent_node(root, &parent)?;
            if let Some(scalar) = Scalar::from_value(value)
                && let Some(Node::Primitive(cell)) = child(&parent, last)?
            {
                cell.set(scalar)?;
                return Ok(());
            }
            store(&parent, last, watchize_with(value, &config))
        }
        Edit::Append { path, value } => {
            list_at(root, path)?.append(watchize_with(value, &config))?;
            Ok(())
        }
        Edit::Insert { path, index, value } => {
            list_at(root, path)?.insert(*index, watchize_with(value, &config))?;
            Ok(())
        }
        Edit::RemoveAt { path, index } => {
            list_at(root, path)?.remove_at(*index)?;
            Ok(())
        }
        Edit::RemoveKey { path, key } => {
            let node = parent_node(root, path)?;
            let removed = node.object()?.remove(key)?;
            if removed.is_none() {
                return Err(WatchError::PathNotFound {
                    path: path.clone().push(key.as_str()).to_string(),
                }
                .into());
            }
            Ok(())
        }
        Edit::SetReference { path, id, revision } => {
            let (parent, last) = split(path)?;
            let reference = ResourceReference::new(id.clone(), *revision);
            store(&parent_node(root, &parent)?, last, reference.to_node(&config))
        }
    }
}

fn split(path: &Path) -> Result<(Path, &Segment)> {
    match (path.parent(), path.last()) {
        (Some(parent), Some(last)) => Ok((parent, last)),
        _ => Err(HarnessError::invalid_script(0, "path must name a key or index")),
    }
}

fn parent_node(root: &WatchObject, path: &Path) -> Result<Node> {
    Ok(Node::Object(root.clone()).at(path)?)
}

/// Non-vivifying read of one step below `parent`.
fn child(parent: &Node, segment: &Segment) -> Result<Option<Node>> {
    Ok(match (parent, segment) {
        (Node::Object(object), segment) => object.peek(&key_of(segment)),
        (Node::List(list), Segment::Index(index)) => list.get(*index),
        (Node::List(_), Segment::Key(_)) => {
            return Err(HarnessError::invalid_script(0, "list step needs an index"));
        }
        (Node::Primitive(_), _) => None,
    })
}

fn store(parent: &Node, segment: &Segment, value: Node) -> Result<()> {
    match (parent, segment) {
        (Node::Object(object), segment) => {
            object.set(key_of(segment), value)?;
        }
        (Node::List(list), Segment::Index(index)) if *index == list.len() => {
            list.append(value)?;
        }
        (Node::List(list), Segment::Index(index)) => {
            list.replace_at(*index, value)?;
        }
        (other, _) => {
            return Err(WatchError::KindMismatch {
                expected: segment.container_kind(),
                found: other.kind(),
            }
            .into());
        }
    }
    Ok(())
}

/// The list at `path`, vivifying it when the final step is a missing key of
/// an object.
fn list_at(root: &WatchObject, path: &Path) -> Result<WatchList<Node>> {
    let node = match split(path) {
        Ok((parent, Segment::Key(key))) => match parent_node(root, &parent)? {
            Node::Object(object) => object.get(key),
            _ => parent_node(root, path)?,
        },
        Ok(_) => parent_node(root, path)?,
        Err(_) => Node::Object(root.clone()),
    };
    Ok(node.list()?.clone())
}

fn key_of(segment: &Segment) -> String {
    match segment {
        Segment::Key(key) => key.clone(),
        Segment::Index(index) => index.to_string(),
    }
}
