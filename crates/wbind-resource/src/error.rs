//! Error types for payload binding and reference resolution.

use thiserror::Error;
use wbind_core::WatchError;

pub type Result<T> = std::result::Result<T, ResourceError>;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("malformed payload: {reason}")]
    MalformedPayload { reason: String },

    #[error("unresolved reference to resource {id:?}")]
    Unresolved { id: String },

    #[error("resource {id:?} is at revision {have}, expected {want}")]
    StaleRevision { id: String, have: u64, want: u64 },

    #[error(transparent)]
    Watch(#[from] WatchError),
}

impl ResourceError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedPayload {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_revision_names_both_revisions() {
        let err = ResourceError::StaleRevision {
            id: "ev1".into(),
            have: 2,
            want: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains("ev1"));
        assert!(msg.contains('2'));
        assert!(msg.contains('5'));
    }

    #[test]
    fn payload_decode_failures_are_malformed() {
        let err = crate::Payload::from_value(&serde_json::json!({"id": "a"})).unwrap_err();
        assert!(matches!(err, ResourceError::MalformedPayload { .. }));
        assert!(err.to_string().contains("revision"));
    }

    #[test]
    fn watch_errors_pass_through() {
        let err: ResourceError = WatchError::DetachAfterDispose.into();
        assert_eq!(err.to_string(), WatchError::DetachAfterDispose.to_string());
    }
}
