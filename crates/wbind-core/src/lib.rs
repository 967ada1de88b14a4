#![forbid(unsafe_code)]

//! Core: observable values, lists and objects, key accessors, bindings, and
//! recursive commit hooks over JSON-shaped graphs.
//!
//! All types are single-threaded (`Rc`/`RefCell`); observers run
//! synchronously on the mutating call.

pub mod accessor;
pub mod binding;
pub mod config;
pub mod error;
pub mod list;
pub mod node;
pub mod object;
pub mod observable;
pub mod path;
pub mod watch;

pub use accessor::{KeyAccessor, Observe, Readable, Writable};
pub use binding::{Binding, Translation, bind, bind_map, bind_with};
pub use config::{NotifyPolicy, ReentrancyPolicy, WatchConfig};
pub use error::{Result, WatchError};
pub use list::{ListEvent, WatchList};
pub use node::{Node, NodeId, NodeKind, Scalar};
pub use object::{ObjectEvent, WatchObject};
pub use observable::{Subscription, WatchValue};
pub use path::{Path, Segment};
pub use watch::{WatchHandle, watch, watchize, watchize_with};
