use thiserror::Error;

/// Errors surfaced by checkpoint operations.
///
/// `Missing` and `Corrupted` are the "load failed" shapes the call state
/// machine recovers from by re-executing; every other variant propagates.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// No checkpoint exists for the requested call.
    #[error("no checkpoint exists for {call_id}")]
    Missing { call_id: String },

    /// A stored entry exists but could not be read back.
    #[error("corrupted checkpoint for {call_id}")]
    Corrupted { call_id: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to encode checkpoint value: {0}")]
    Encode(String),

    #[error("failed to decode checkpoint value: {0}")]
    Decode(String),

    /// A custom storage backend failed outside the recoverable shapes.
    #[error("storage backend error: {0}")]
    Storage(String),

    /// A value could not be folded into an identity hash in strict mode.
    #[error("value of type {type_name} could not be hashed")]
    Hash { type_name: String },
}

impl CheckpointError {
    /// Whether this failure has the recoverable "corrupt or vanished entry"
    /// shape: the engine deletes the entry and re-executes once.
    pub fn is_corruption(&self) -> bool {
        match self {
            CheckpointError::Missing { .. } | CheckpointError::Corrupted { .. } => true,
            CheckpointError::Decode(_) => true,
            CheckpointError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corruption_shapes() {
        assert!(CheckpointError::Missing { call_id: "a/b/c".into() }.is_corruption());
        assert!(CheckpointError::Corrupted { call_id: "a/b/c".into() }.is_corruption());
        assert!(CheckpointError::Io(std::io::Error::from(std::io::ErrorKind::NotFound)).is_corruption());
        assert!(!CheckpointError::Storage("boom".into()).is_corruption());
        assert!(!CheckpointError::Encode("boom".into()).is_corruption());
    }
}
