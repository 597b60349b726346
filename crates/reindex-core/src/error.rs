//! Error types for migration runs.

use thiserror::Error;

/// A migration run that could not finish.
///
/// Progress events already emitted stand as the last observed state; no
/// partial result accompanies this error.
#[derive(Debug, Error)]
#[error(
    "migration {source_index} -> {destination_index} failed after {completed} documents: {message} ({diagnostics})"
)]
pub struct MigrationError {
    /// Index documents were copied from
    pub source_index: String,
    /// Index documents were copied to
    pub destination_index: String,
    /// Documents confirmed written in the failing pass
    pub completed: u64,
    /// Underlying transport diagnostic
    pub diagnostics: String,
    /// What the migration was doing
    pub message: String,
}

/// Why a pass stopped early, before the index pair is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassFailure {
    /// Documents confirmed written before the failure
    pub completed: u64,
    /// Underlying transport diagnostic
    pub diagnostics: String,
    /// Human-readable description
    pub message: String,
}

impl PassFailure {
    pub fn new(completed: u64, diagnostics: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            completed,
            diagnostics: diagnostics.into(),
            message: message.into(),
        }
    }

    /// Attach the index pair.
    pub fn into_error(self, source_index: &str, destination_index: &str) -> MigrationError {
        MigrationError {
            source_index: source_index.to_string(),
            destination_index: destination_index.to_string(),
            completed: self.completed,
            diagnostics: self.diagnostics,
            message: self.message,
        }
    }
}
