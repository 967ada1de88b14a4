use std::path::PathBuf;

use thiserror::Error;
use wbind_core::WatchError;
use wbind_resource::ResourceError;

pub type Result<T> = std::result::Result<T, HarnessError>;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{}: invalid JSON: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("watch error: {0}")]
    Watch(#[from] WatchError),

    #[error("edit {index}: {reason}")]
    InvalidScript { index: usize, reason: String },

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },
}

impl HarnessError {
    /// Process exit code: 2 for bad input files, 1 otherwise.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Json(_)
            | Self::Parse { .. }
            | Self::InvalidScript { .. }
            | Self::InvalidArgument { .. } => 2,
            Self::Resource(ResourceError::MalformedPayload { .. }) => 2,
            _ => 1,
        }
    }

    #[must_use]
    pub fn invalid_script(index: usize, reason: impl Into<String>) -> Self {
        Self::InvalidScript {
            index,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        assert_eq!(HarnessError::invalid_script(3, "nope").exit_code(), 2);
        assert_eq!(HarnessError::Watch(WatchError::DetachAfterDispose).exit_code(), 1);
        let malformed = HarnessError::Resource(ResourceError::MalformedPayload {
            reason: "x".into(),
        });
        assert_eq!(malformed.exit_code(), 2);
        let stale = HarnessError::Resource(ResourceError::StaleRevision {
            id: "a".into(),
            have: 2,
            want: 1,
        });
        assert_eq!(stale.exit_code(), 1);
    }

    #[test]
    fn script_errors_name_the_edit() {
        assert_eq!(
            HarnessError::invalid_script(4, "path is empty").to_string(),
            "edit 4: path is empty"
        );
    }
}
