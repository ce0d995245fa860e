//! Error type shared by the staging area, the committed store, the index and the facade.

use thiserror::Error;

/// Error type for memory operations.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Already committed: {0}")]
    AlreadyCommitted(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serde(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification callers can branch on without matching messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryErrorKind {
    InvalidArgument,
    NotFound,
    AlreadyCommitted,
    Io,
    Config,
    Internal,
}

impl MemoryError {
    pub fn kind(&self) -> MemoryErrorKind {
        match self {
            MemoryError::InvalidArgument(_) => MemoryErrorKind::InvalidArgument,
            MemoryError::NotFound(_) => MemoryErrorKind::NotFound,
            MemoryError::AlreadyCommitted(_) => MemoryErrorKind::AlreadyCommitted,
            // Serialization only happens on the persistence path.
            MemoryError::Io(_) | MemoryError::Serde(_) => MemoryErrorKind::Io,
            MemoryError::Config(_) => MemoryErrorKind::Config,
            MemoryError::Internal(_) => MemoryErrorKind::Internal,
        }
    }

    /// Prefix an I/O failure with the operation and path that produced it.
    pub(crate) fn io(context: impl std::fmt::Display, err: std::io::Error) -> Self {
        MemoryError::Io(format!("{}: {}", context, err))
    }
}

impl From<std::io::Error> for MemoryError {
    fn from(e: std::io::Error) -> Self {
        MemoryError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for MemoryError {
    fn from(e: serde_json::Error) -> Self {
        MemoryError::Serde(e.to_string())
    }
}

impl From<toml::de::Error> for MemoryError {
    fn from(e: toml::de::Error) -> Self {
        MemoryError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_maps_serde_to_io() {
        let err: MemoryError = serde_json::from_str::<u64>("not json").unwrap_err().into();
        assert_eq!(err.kind(), MemoryErrorKind::Io);
    }

    #[test]
    fn test_io_context_is_kept_in_message() {
        let err = MemoryError::io(
            "append memory.journal.jsonl",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.kind(), MemoryErrorKind::Io);
        assert!(err.to_string().contains("append memory.journal.jsonl"));
    }
}
