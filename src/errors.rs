//! Typed error hierarchy for Mission Control.
//!
//! `MissionError` covers the store and the webhook glue; chat relay failures
//! have their own `ChatError`. Store and CLI code mostly works in
//! `anyhow::Result`; the typed variants are raised where a caller needs to
//! branch on the failure (HTTP status mapping).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MissionError {
    #[error("Agent {id} not found")]
    AgentNotFound { id: i64 },

    #[error("Task not found")]
    TaskNotFound { id: i64 },

    #[error("Agent not found for this session key")]
    SessionKeyNotFound,

    #[error("Invalid status. Must be one of: {allowed}")]
    InvalidStatus { value: String, allowed: String },

    #[error("Database lock poisoned")]
    LockPoisoned,
}

impl MissionError {
    /// Find a typed `MissionError` anywhere in an `anyhow` chain.
    pub fn find(err: &anyhow::Error) -> Option<&MissionError> {
        err.chain().find_map(|e| e.downcast_ref::<MissionError>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_not_found_message_carries_id() {
        let err = MissionError::AgentNotFound { id: 7 };
        assert_eq!(err.to_string(), "Agent 7 not found");
    }

    #[test]
    fn task_not_found_message_matches_webhook_contract() {
        let err = MissionError::TaskNotFound { id: 3 };
        assert_eq!(err.to_string(), "Task not found");
    }

    #[test]
    fn invalid_status_lists_allowed_values() {
        let err = MissionError::InvalidStatus {
            value: "sleeping".into(),
            allowed: "idle, working, done, blocked".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid status. Must be one of: idle, working, done, blocked"
        );
    }

    #[test]
    fn find_locates_typed_error_behind_context() {
        let err = anyhow::Error::new(MissionError::TaskNotFound { id: 9 })
            .context("Failed to update task status");
        match MissionError::find(&err) {
            Some(MissionError::TaskNotFound { id }) => assert_eq!(*id, 9),
            other => panic!("Expected TaskNotFound, got {:?}", other),
        }
    }

    #[test]
    fn find_returns_none_for_untyped_errors() {
        let err = anyhow::anyhow!("disk on fire");
        assert!(MissionError::find(&err).is_none());
    }
}
