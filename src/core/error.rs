use thiserror::Error;

use crate::core::types::{EntityId, Frame};

#[derive(Error, Debug)]
pub enum SimError {
    #[error("permission denied (权限不足): operator {operator} is not the session host")]
    PermissionDenied { operator: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Event queue full (capacity {capacity}), event dropped")]
    QueueOverflow { capacity: usize },

    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("Expression error: {0}")]
    Expression(String),

    #[error("Capability registration failed for tree {tree}: {reason}")]
    CapabilityRegistration { tree: String, reason: String },

    #[error("Engine constructed outside the isolated executor context")]
    ContextViolation,

    #[error("Invalid transition: cannot {command} while {state}")]
    InvalidTransition { state: String, command: String },

    #[error("Engine not initialized")]
    NotInitialized,

    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Frame {frame} still has outstanding work")]
    FrameBusy { frame: Frame },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    ConfigError(#[from] toml::de::Error),
}

impl SimError {
    /// True for the authorization failure, used by callers that report it specially
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, SimError::PermissionDenied { .. })
    }
}

pub type Result<T> = std::result::Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_message_mentions_permission() {
        let err = SimError::PermissionDenied {
            operator: "Y".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("permission"));
        assert!(msg.contains("权限"));
        assert!(err.is_permission_denied());
    }

    #[test]
    fn test_transition_message() {
        let err = SimError::InvalidTransition {
            state: "idle".into(),
            command: "start".into(),
        };
        assert_eq!(err.to_string(), "Invalid transition: cannot start while idle");
    }
}
