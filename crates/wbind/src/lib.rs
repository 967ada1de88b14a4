#![forbid(unsafe_code)]

//! wbind public facade crate.
//!
//! Observable values, lists and objects ([`core`]), and resource payloads
//! bound into them ([`resource`], behind the default `resource` feature).

pub use wbind_core as core;
#[cfg(feature = "resource")]
pub use wbind_resource as resource;

pub mod prelude {
    pub use wbind_core::{
        Binding, KeyAccessor, ListEvent, Node, NodeKind, NotifyPolicy, Observe, ObjectEvent, Path,
        Readable, ReentrancyPolicy, Scalar, Subscription, WatchConfig, WatchError, WatchHandle,
        WatchList, WatchObject, WatchValue, Writable, bind, bind_map, bind_with, watch, watchize,
        watchize_with,
    };

    #[cfg(feature = "resource")]
    pub use wbind_resource::{
        CommitLog, CommitSink, Resource, ResourceError, ResourceReference, ResourceStore,
    };
}
