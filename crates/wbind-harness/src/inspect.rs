//! `watchize`: round-trip a document through an observable graph.

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;
use serde_json::Value;
use wbind_core::{WatchConfig, watchize_with};
use wbind_resource::{Payload, Resource};

use crate::error::Result;
use crate::util::{print_json, read_json};

#[derive(Debug, Clone, Args)]
pub struct WatchizeArgs {
    /// Any JSON document; resource envelopes are bound as resources.
    #[arg(long)]
    pub payload: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchizeReport {
    /// Whether the document parsed as a resource envelope.
    pub resource: bool,
    pub nodes: usize,
    pub round_trip: bool,
    pub value: Value,
}

pub fn inspect(value: &Value, config: &WatchConfig) -> Result<WatchizeReport> {
    if Payload::from_value(value).is_ok() {
        let resource = Resource::from_payload(value, config)?;
        let serialized = resource.serialize()?;
        let nodes = wbind_core::Node::Object(resource.root().clone()).count();
        return Ok(WatchizeReport {
            resource: true,
            nodes,
            round_trip: serialized == *value,
            value: serialized,
        });
    }
    let node = watchize_with(value, config);
    let serialized = node.to_value()?;
    Ok(WatchizeReport {
        resource: false,
        nodes: node.count(),
        round_trip: serialized == *value,
        value: serialized,
    })
}

pub fn run_watchize(args: WatchizeArgs) -> Result<()> {
    let report = inspect(&read_json(&args.payload)?, &WatchConfig::from_env()?)?;
    print_json(&report)
}
