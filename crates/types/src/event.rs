// Path: crates/types/src/event.rs
//! Lifecycle events emitted for each request.
//!
//! Events for a single request are ordered `queued -> started ->
//! (progress*) -> completed | error`; exactly one terminal record is
//! emitted per admitted request. No cross-request ordering is guaranteed.

use crate::result::ErrorType;
use serde::{Deserialize, Serialize};

/// A lifecycle event on the execution event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// The request passed admission and is waiting for an executor.
    Queued {
        /// Server-chosen request id.
        request_id: String,
        /// Resolved target CID.
        cid: String,
        /// Requests ahead of this one at admission time.
        position: u64,
    },
    /// Execution has begun.
    Started {
        /// Server-chosen request id.
        request_id: String,
        /// Resolved target CID.
        cid: String,
        /// Identity of the executing node.
        executor_node: String,
    },
    /// Intermediate progress report.
    Progress {
        /// Server-chosen request id.
        request_id: String,
        /// Progress in percent, 0..=100.
        progress: u8,
        /// Optional free-form message.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Terminal: the execution completed (successfully or not).
    Completed {
        /// Server-chosen request id.
        request_id: String,
        /// Resolved target CID.
        cid: String,
        /// Whether the entry returned normally.
        success: bool,
        /// Wall-clock duration in milliseconds.
        duration_ms: u64,
        /// Gas consumed, when known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        gas_used: Option<u64>,
        /// Set when the policy verdict was `warn`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        warning: Option<String>,
    },
    /// Terminal: the request failed before or during execution.
    Error {
        /// Server-chosen request id, when admission got far enough.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        /// Stable error class string.
        error: String,
        /// Execution-class failure kind, when applicable.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_type: Option<ErrorType>,
        /// Target CID, when known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cid: Option<String>,
    },
}

impl ExecutionEvent {
    /// True for `completed` and `error` records.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_tag_by_type() {
        let ev = ExecutionEvent::Queued {
            request_id: "r1".into(),
            cid: "c".into(),
            position: 0,
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "queued");
        assert!(!ev.is_terminal());

        let ev = ExecutionEvent::Error {
            request_id: None,
            error: "FROZEN".into(),
            error_type: None,
            cid: None,
        };
        assert!(ev.is_terminal());
    }
}
