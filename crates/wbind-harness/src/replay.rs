//! `replay`: load a payload (plus optional companion resources), apply an
//! edit script, and report the final payload with its commit log.

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};
use wbind_core::WatchConfig;
use wbind_resource::{CommitLog, Payload, Resource, ResourceError, ResourceStore};

use crate::error::{HarnessError, Result};
use crate::script;
use crate::util::{print_json, read_json};

#[derive(Debug, Clone, Args)]
pub struct ReplayArgs {
    /// Resource payload `{"id", "revision", "data"}`.
    #[arg(long)]
    pub payload: PathBuf,

    /// JSON array of edits.
    #[arg(long)]
    pub script: PathBuf,

    /// JSON array of companion payloads loaded first, for resolving
    /// references.
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Print a JSON report instead of text.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceStatus {
    Resolved,
    Unresolved,
    Stale,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceReport {
    pub key: String,
    pub id: String,
    pub revision: u64,
    pub status: ReferenceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayReport {
    pub id: String,
    pub revision: u64,
    pub edits: usize,
    pub commits: usize,
    pub dirty: bool,
    pub references: Vec<ReferenceReport>,
    pub payload: Value,
}

/// Everything `replay` needs, already parsed.
#[derive(Debug, Clone)]
pub struct ReplayInput {
    pub payload: Value,
    pub script: Value,
    pub companions: Vec<Value>,
    pub config: WatchConfig,
}

pub fn replay(input: &ReplayInput) -> Result<ReplayReport> {
    let edits = script::parse(&input.script)?;
    let main = Payload::from_value(&input.payload)?;
    let store = ResourceStore::new(input.config);
    for companion in &input.companions {
        if Payload::from_value(companion)?.id == main.id {
            return Err(HarnessError::invalid(format!(
                "store payload {:?} duplicates the replayed resource",
                main.id
            )));
        }
        store.load(companion)?;
    }
    let resource = store.load(&input.payload)?;
    let log = CommitLog::new();
    store.track(resource.id(), log.clone())?;
    debug!(resource = resource.id(), edits = edits.len(), "replaying script");

    let applied = script::apply_all(&resource, &edits)?;
    let report = ReplayReport {
        id: resource.id().to_owned(),
        revision: resource.revision(),
        edits: applied,
        commits: log.len(),
        dirty: store.dirty_ids().iter().any(|id| id == resource.id()),
        references: references(&resource),
        payload: resource.serialize()?,
    };
    info!(
        resource = %report.id,
        edits = report.edits,
        commits = report.commits,
        "replay finished"
    );
    Ok(report)
}

fn references(resource: &Resource) -> Vec<ReferenceReport> {
    resource
        .get_all()
        .keys()
        .filter_map(|key| {
            let reference = resource.reference(key)?;
            let status = match resource.resolve(key) {
                Ok(_) => ReferenceStatus::Resolved,
                Err(ResourceError::StaleRevision { .. }) => ReferenceStatus::Stale,
                Err(_) => ReferenceStatus::Unresolved,
            };
            Some(ReferenceReport {
                key: key.clone(),
                id: reference.id,
                revision: reference.revision,
                status,
            })
        })
        .collect()
}

pub fn render_text(report: &ReplayReport) -> Result<String> {
    let mut out = serde_json::to_string_pretty(&report.payload)?;
    out.push('\n');
    out.push_str(&format!(
        "edits: {}  commits: {}  dirty: {}\n",
        report.edits, report.commits, report.dirty
    ));
    for reference in &report.references {
        out.push_str(&format!(
            "reference {} -> {}@{}: {:?}\n",
            reference.key, reference.id, reference.revision, reference.status
        ));
    }
    Ok(out)
}

pub fn run_replay(args: ReplayArgs) -> Result<()> {
    let companions = match &args.store {
        Some(path) => match read_json(path)? {
            Value::Array(items) => items,
            _ => {
                return Err(HarnessError::invalid(format!(
                    "{}: store file must be a JSON array of payloads",
                    path.display()
                )));
            }
        },
        None => Vec::new(),
    };
    let input = ReplayInput {
        payload: read_json(&args.payload)?,
        script: read_json(&args.script)?,
        companions,
        config: WatchConfig::from_env()?,
    };
    let report = replay(&input)?;
    if args.json {
        print_json(&report)
    } else {
        print!("{}", render_text(&report)?);
        Ok(())
    }
}
