//! Configuration snapshots handed in by the surrounding indexing job.
//!
//! Nothing here is loaded from disk; the pipeline owns configuration
//! loading and passes the builder an immutable snapshot.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{BuildError, Result};
use crate::model::ComputedIndexField;

/// Inclusion/exclusion rule snapshot for one index.
///
/// Exclusion sets match a field's id or name, except the media set which
/// matches by name only. Matching is exact string equality.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldRules {
    /// Globally excluded field ids/names.
    pub excluded_fields: HashSet<String>,
    /// Excluded ids/names applied only to template records.
    pub excluded_template_fields: HashSet<String>,
    /// Excluded names applied only to media records.
    pub excluded_media_fields: HashSet<String>,
    /// Field ids/names eligible for indexing when `index_all_fields` is off.
    pub included_fields: HashSet<String>,
    /// Bypass the included-fields check entirely.
    pub index_all_fields: bool,
}

impl FieldRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_excluded_field(mut self, field: impl Into<String>) -> Self {
        self.excluded_fields.insert(field.into());
        self
    }

    pub fn with_excluded_template_field(mut self, field: impl Into<String>) -> Self {
        self.excluded_template_fields.insert(field.into());
        self
    }

    pub fn with_excluded_media_field(mut self, field: impl Into<String>) -> Self {
        self.excluded_media_fields.insert(field.into());
        self
    }

    pub fn with_included_field(mut self, field: impl Into<String>) -> Self {
        self.included_fields.insert(field.into());
        self
    }

    pub fn with_index_all_fields(mut self, enabled: bool) -> Self {
        self.index_all_fields = enabled;
        self
    }

    pub fn has_excluded_template_fields(&self) -> bool {
        !self.excluded_template_fields.is_empty()
    }

    pub fn has_excluded_media_fields(&self) -> bool {
        !self.excluded_media_fields.is_empty()
    }
}

/// Whether a pass runs on the calling thread or fans out over a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExecutionMode {
    #[default]
    Sequential,
    Parallel,
}

/// Worker-pool configuration for parallel passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub mode: ExecutionMode,
    pub parallel_workers: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Sequential,
            parallel_workers: (num_cpus::get() * 3 / 4).max(1), // 75% of cores
        }
    }
}

impl ExecutionConfig {
    pub fn sequential() -> Self {
        Self::default()
    }

    pub fn parallel() -> Self {
        Self {
            mode: ExecutionMode::Parallel,
            ..Self::default()
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.parallel_workers = workers.max(1);
        self
    }

    pub fn is_parallel(&self) -> bool {
        self.mode == ExecutionMode::Parallel
    }

    /// Build the bounded pool parallel passes dispatch onto.
    pub(crate) fn build_pool(&self) -> Result<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.parallel_workers.max(1))
            .thread_name(|i| format!("docbuilder-worker-{}", i))
            .build()
            .map_err(|e| BuildError::config(format!("failed to build worker pool: {e}")))
    }
}

/// Everything the builder needs to know about one index configuration.
#[derive(Clone, Default)]
pub struct BuilderOptions {
    pub rules: FieldRules,
    /// Computed index fields, in declared order.
    pub computed_fields: Vec<Arc<dyn ComputedIndexField>>,
    /// Field-level language fallback applied while a field is written or a
    /// computed field is evaluated.
    pub enable_field_language_fallback: bool,
    pub execution: ExecutionConfig,
}

impl BuilderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(mut self, rules: FieldRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_computed_field(mut self, field: Arc<dyn ComputedIndexField>) -> Self {
        self.computed_fields.push(field);
        self
    }

    pub fn with_field_language_fallback(mut self, enabled: bool) -> Self {
        self.enable_field_language_fallback = enabled;
        self
    }

    pub fn with_execution(mut self, execution: ExecutionConfig) -> Self {
        self.execution = execution;
        self
    }
}

impl fmt::Debug for BuilderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuilderOptions")
            .field("rules", &self.rules)
            .field("computed_fields", &self.computed_fields.len())
            .field(
                "enable_field_language_fallback",
                &self.enable_field_language_fallback,
            )
            .field("execution", &self.execution)
            .finish()
    }
}
