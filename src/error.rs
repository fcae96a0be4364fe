//! Error types shared by the engine.
//!
//! Collaborators report their own error enums ([`GenerationError`],
//! [`StorageError`]); the engine surface folds them into [`EngineError`],
//! which is `Clone` so that a single in-flight breakdown outcome can be handed
//! to every caller riding it.

use thiserror::Error;
use uuid::Uuid;

use crate::generation::GenerationError;

/// Errors surfaced by the tree store, breakdown coordinator and save queue.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("No idea is loaded")]
    NoCurrentIdea,

    #[error("Concept not found: {0}")]
    ConceptNotFound(Uuid),

    #[error("Idea not found: {0}")]
    IdeaNotFound(Uuid),

    /// The generation collaborator answered, but nothing usable came back.
    #[error("Invalid generation response: {0}")]
    Validation(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Storage failed: {0}")]
    Storage(String),

    #[error("Save queue is closed")]
    SaveQueueClosed,
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ConceptNotFound(_) | Self::IdeaNotFound(_))
    }
}

/// Storage collaborator errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Save task panicked: {0}")]
    TaskPanicked(String),

    #[error("{0}")]
    Backend(String),
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<GenerationError> for EngineError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::Validation(message) => Self::Validation(message),
            other => Self::Generation(other.to_string()),
        }
    }
}
