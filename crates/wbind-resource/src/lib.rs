#![forbid(unsafe_code)]

//! Resources: server payloads bound into observable graphs, lazy
//! cross-resource references, and commit sinks that receive re-serialized
//! payloads after every edit.

pub mod error;
pub mod reference;
pub mod resource;
pub mod sink;
pub mod store;

pub use error::{ResourceError, Result};
pub use reference::{REFERENCE_TYPE, ResourceReference};
pub use resource::{Payload, Resource};
pub use sink::{CommitLog, CommitSink};
pub use store::ResourceStore;
