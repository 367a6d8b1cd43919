/*
 * Contentsearch Docbuilder - Document-Field Assembly Stage
 *
 * Turns one source item into the field set of a search-engine document.
 *
 * Architecture:
 * - Field Filter (rule-based include/exclude decision, three exclusion layers)
 * - Fallback Scope Guard (ambient per-thread language-fallback override)
 * - Document Builder (sequential / parallel field and computed-field passes)
 * - Failure aggregation (parallel passes surface every captured error)
 */

// Public modules
pub mod builder;
pub mod error;
pub mod fallback;
pub mod filter;
pub mod model;
pub mod options;

// Re-exports
pub use builder::{DocumentBuilder, FieldOutcome, PassStats};
pub use error::{BuildError, FailureSet, Result};
pub use fallback::{with_scope, FallbackGuard, FallbackScope};
pub use filter::FieldDecision;
pub use model::{
    ComputedIndexField, DocumentWriter, FieldValue, FixedSettings, Indexable, IndexableField,
    IndexingSettings,
};
pub use options::{BuilderOptions, ExecutionConfig, ExecutionMode, FieldRules};
