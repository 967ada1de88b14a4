use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::error::{HarnessError, Result};

/// Read and parse a JSON file, naming the file on failure.
pub fn read_json(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path).map_err(|err| {
        HarnessError::Io(std::io::Error::new(
            err.kind(),
            format!("{}: {err}", path.display()),
        ))
    })?;
    serde_json::from_str(&text).map_err(|source| HarnessError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
