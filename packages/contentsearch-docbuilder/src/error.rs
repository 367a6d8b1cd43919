//! Error types for the document-field assembly stage.
//!
//! Collaborators (field writers, computed fields, field loading) report
//! failures as `anyhow::Error`; this module wraps them into typed errors
//! and provides the thread-safe failure collection used by parallel passes.

use parking_lot::Mutex;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BuildError>;

/// Main error type for document-build operations.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The indexable could not materialize its field values.
    #[error("could not load fields for indexable {indexable_id}: {source}")]
    Load {
        indexable_id: String,
        source: anyhow::Error,
    },

    /// The document-write callback failed for one field.
    #[error("could not add field {field_id} : {field_name} for indexable {indexable_id}: {source}")]
    FieldWrite {
        indexable_id: String,
        field_id: String,
        field_name: String,
        source: anyhow::Error,
    },

    /// A computed index field's compute operation failed.
    #[error("could not compute value for computed index field {field_name} for indexable {indexable_id}: {source}")]
    Compute {
        field_name: String,
        indexable_id: String,
        source: anyhow::Error,
    },

    /// Bulk report of every failure captured during a parallel pass.
    #[error("{} field operation(s) failed during parallel pass", .0.len())]
    Aggregate(Vec<BuildError>),

    /// Invalid builder configuration (e.g. the worker pool could not be built).
    #[error("configuration error: {0}")]
    Config(String),
}

impl BuildError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        BuildError::Config(msg.into())
    }

    /// The underlying failures, whether this is a single error or an
    /// aggregate. Callers unwrap parallel and fail-fast results the same way.
    pub fn failures(&self) -> &[BuildError] {
        match self {
            BuildError::Aggregate(errors) => errors,
            other => std::slice::from_ref(other),
        }
    }
}

/// Unordered, thread-safe collection of failures captured during one
/// parallel pass. Consumed exactly once when the pass drains.
#[derive(Debug, Default)]
pub struct FailureSet {
    inner: Mutex<Vec<BuildError>>,
}

impl FailureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one captured failure. Safe to call from multiple workers.
    pub fn push(&self, error: BuildError) {
        self.inner.lock().push(error);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Consume the set: empty means the pass succeeded, anything else
    /// becomes a single aggregate failure wrapping every captured error.
    pub fn into_result(self) -> Result<()> {
        let failures = self.inner.into_inner();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(BuildError::Aggregate(failures))
        }
    }
}
