//! The document builder: per-field assembly of one search document.
//!
//! One builder instance drives one build pass for one indexable. The field
//! pass filters each declared field through the rule set and hands the
//! survivors to the document writer under a field-level fallback scope; the
//! computed pass evaluates every computed index field the same way. Both
//! passes exist in a sequential and a data-parallel variant selected by the
//! execution config.
//!
//! Failure policy differs by mode. Sequential passes consult
//! `stop_on_crawl_field_error` at each failure event and either abort or
//! log-and-continue. Parallel field passes never abort mid-flight: every
//! worker failure lands in a `FailureSet` and the pass reports one
//! aggregate failure after the pool drains. The parallel computed pass may
//! stop dispatching further items under the stop policy, but still reports
//! whatever was captured in bulk.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::{BuildError, FailureSet, Result};
use crate::fallback::{self, FallbackGuard, FallbackScope};
use crate::filter::{self, FieldDecision};
use crate::model::{DocumentWriter, Indexable, IndexableField, IndexingSettings};
use crate::options::{BuilderOptions, ExecutionMode};

/// Outcome of one per-field step: filter, scope the fallback override,
/// write. The pass decides abort-vs-continue from this plus the policy
/// flag; the step itself never raises.
#[derive(Debug)]
pub enum FieldOutcome {
    Written,
    Skipped(FieldDecision),
    Failed(BuildError),
}

/// Counters for one completed pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassStats {
    pub written: usize,
    pub skipped: usize,
    /// Failures downgraded to logged-and-skipped events by the policy.
    pub failed: usize,
    pub duration_ms: u64,
}

/// Assembles one search document from an indexable's fields and the
/// index's computed fields.
pub struct DocumentBuilder {
    indexable: Arc<dyn Indexable>,
    writer: Arc<dyn DocumentWriter>,
    settings: Arc<dyn IndexingSettings>,
    options: BuilderOptions,
    pool: Option<rayon::ThreadPool>,
}

impl std::fmt::Debug for DocumentBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentBuilder")
            .field("indexable_id", &self.indexable.unique_id())
            .field("options", &self.options)
            .field("parallel", &self.pool.is_some())
            .finish()
    }
}

impl DocumentBuilder {
    /// Create a builder for one indexable. In parallel mode the worker pool
    /// is built here, once, and reused by both passes.
    pub fn new(
        indexable: Arc<dyn Indexable>,
        writer: Arc<dyn DocumentWriter>,
        settings: Arc<dyn IndexingSettings>,
        options: BuilderOptions,
    ) -> Result<Self> {
        let pool = match options.execution.mode {
            ExecutionMode::Parallel => Some(options.execution.build_pool()?),
            ExecutionMode::Sequential => None,
        };
        Ok(Self {
            indexable,
            writer,
            settings,
            options,
            pool,
        })
    }

    /// Materialize the indexable's fields into the document.
    ///
    /// Loads all field values once, then runs the sequential or parallel
    /// field pass per the execution config.
    pub fn add_item_fields(&self) -> Result<PassStats> {
        debug!(
            indexable_id = self.indexable.unique_id(),
            "add_item_fields start"
        );
        let result = self.run_field_pass();
        debug!(
            indexable_id = self.indexable.unique_id(),
            "add_item_fields end"
        );
        result
    }

    fn run_field_pass(&self) -> Result<PassStats> {
        let started = Instant::now();
        self.indexable
            .load_all_fields()
            .map_err(|source| BuildError::Load {
                indexable_id: self.indexable.unique_id().to_string(),
                source,
            })?;
        let fields = self.indexable.fields();
        let mut stats = match &self.pool {
            Some(pool) => self.add_fields_parallel(pool, &fields)?,
            None => self.add_fields_sequential(&fields)?,
        };
        stats.duration_ms = started.elapsed().as_millis() as u64;
        Ok(stats)
    }

    /// Evaluate every computed index field and forward the results to the
    /// document writer.
    pub fn add_computed_fields(&self) -> Result<PassStats> {
        let started = Instant::now();
        let mut stats = match &self.pool {
            Some(pool) => self.add_computed_fields_parallel(pool)?,
            None => self.add_computed_fields_sequential()?,
        };
        stats.duration_ms = started.elapsed().as_millis() as u64;
        Ok(stats)
    }

    /// Filter one field and, if included, write it under a field-level
    /// fallback scope.
    fn check_and_add_field(&self, field: &dyn IndexableField) -> FieldOutcome {
        let decision = filter::decide(field, self.indexable.as_ref(), &self.options.rules);
        if !decision.is_include() {
            return FieldOutcome::Skipped(decision);
        }

        let written = fallback::with_scope(
            FallbackScope::Field,
            Some(self.options.enable_field_language_fallback),
            || self.writer.write_field(field),
        );
        match written {
            Ok(()) => FieldOutcome::Written,
            Err(source) => FieldOutcome::Failed(BuildError::FieldWrite {
                indexable_id: self.indexable.unique_id().to_string(),
                field_id: field.id().to_string(),
                field_name: field.name().to_string(),
                source,
            }),
        }
    }

    fn add_fields_sequential(&self, fields: &[Arc<dyn IndexableField>]) -> Result<PassStats> {
        let mut stats = PassStats::default();
        for field in fields {
            match self.check_and_add_field(field.as_ref()) {
                FieldOutcome::Written => stats.written += 1,
                FieldOutcome::Skipped(_) => stats.skipped += 1,
                FieldOutcome::Failed(err) => {
                    if self.settings.stop_on_crawl_field_error() {
                        return Err(err);
                    }
                    error!(
                        indexable_id = self.indexable.unique_id(),
                        field_id = field.id(),
                        field_name = field.name(),
                        cause = %err,
                        "could not add field"
                    );
                    stats.failed += 1;
                }
            }
        }
        Ok(stats)
    }

    /// Parallel field pass. Runs to completion across all fields regardless
    /// of the stop policy; failures are captured and reported in bulk.
    fn add_fields_parallel(
        &self,
        pool: &rayon::ThreadPool,
        fields: &[Arc<dyn IndexableField>],
    ) -> Result<PassStats> {
        let failures = FailureSet::new();
        let written = AtomicUsize::new(0);
        let skipped = AtomicUsize::new(0);

        pool.install(|| {
            fields.par_iter().for_each(|field| {
                match self.check_and_add_field(field.as_ref()) {
                    FieldOutcome::Written => {
                        written.fetch_add(1, Ordering::Relaxed);
                    }
                    FieldOutcome::Skipped(_) => {
                        skipped.fetch_add(1, Ordering::Relaxed);
                    }
                    FieldOutcome::Failed(err) => {
                        error!(
                            indexable_id = self.indexable.unique_id(),
                            field_id = field.id(),
                            field_name = field.name(),
                            cause = %err,
                            "could not add field"
                        );
                        failures.push(err);
                    }
                }
            });
        });

        failures.into_result()?;
        Ok(PassStats {
            written: written.into_inner(),
            skipped: skipped.into_inner(),
            failed: 0,
            duration_ms: 0,
        })
    }

    fn add_computed_fields_sequential(&self) -> Result<PassStats> {
        let mut stats = PassStats::default();
        for computed in &self.options.computed_fields {
            let value = fallback::with_scope(
                FallbackScope::Field,
                Some(self.options.enable_field_language_fallback),
                || computed.compute(self.indexable.as_ref()),
            );
            let value = match value {
                Ok(value) => value,
                Err(source) => {
                    warn!(
                        computed_field = computed.name(),
                        indexable_id = self.indexable.unique_id(),
                        cause = %source,
                        "could not compute value for computed index field"
                    );
                    if self.settings.stop_on_crawl_field_error() {
                        return Err(BuildError::Compute {
                            field_name: computed.name().to_string(),
                            indexable_id: self.indexable.unique_id().to_string(),
                            source,
                        });
                    }
                    stats.failed += 1;
                    continue;
                }
            };
            // A writer failure is not downgraded: it terminates the pass.
            self.writer
                .write_computed_field(computed.as_ref(), value)
                .map_err(|source| BuildError::FieldWrite {
                    indexable_id: self.indexable.unique_id().to_string(),
                    field_id: computed.name().to_string(),
                    field_name: computed.name().to_string(),
                    source,
                })?;
            stats.written += 1;
        }
        Ok(stats)
    }

    /// Parallel computed pass.
    ///
    /// Ambient scope state is per execution context and does not reach the
    /// pool threads on its own: the item-level value is captured here, once,
    /// and re-entered inside each worker as the outer scope, with the
    /// configured field-level flag as the inner scope.
    fn add_computed_fields_parallel(&self, pool: &rayon::ThreadPool) -> Result<PassStats> {
        let item_fallback = fallback::current(FallbackScope::Item);
        let failures = FailureSet::new();
        let stop_dispatch = AtomicBool::new(false);
        let written = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);

        pool.install(|| {
            self.options.computed_fields.par_iter().for_each(|computed| {
                if stop_dispatch.load(Ordering::SeqCst) {
                    return;
                }
                let _item_scope = FallbackGuard::enter(FallbackScope::Item, item_fallback);
                let value = fallback::with_scope(
                    FallbackScope::Field,
                    Some(self.options.enable_field_language_fallback),
                    || computed.compute(self.indexable.as_ref()),
                );
                match value {
                    Err(source) => {
                        warn!(
                            computed_field = computed.name(),
                            indexable_id = self.indexable.unique_id(),
                            cause = %source,
                            "could not compute value for computed index field"
                        );
                        if self.settings.stop_on_crawl_field_error() {
                            failures.push(BuildError::Compute {
                                field_name: computed.name().to_string(),
                                indexable_id: self.indexable.unique_id().to_string(),
                                source,
                            });
                            // Stop handing out further items; in-flight
                            // items still complete.
                            stop_dispatch.store(true, Ordering::SeqCst);
                        } else {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    Ok(value) => {
                        match self.writer.write_computed_field(computed.as_ref(), value) {
                            Ok(()) => {
                                written.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(source) => {
                                failures.push(BuildError::FieldWrite {
                                    indexable_id: self.indexable.unique_id().to_string(),
                                    field_id: computed.name().to_string(),
                                    field_name: computed.name().to_string(),
                                    source,
                                });
                            }
                        }
                    }
                }
            });
        });

        failures.into_result()?;
        Ok(PassStats {
            written: written.into_inner(),
            skipped: 0,
            failed: failed.into_inner(),
            duration_ms: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ComputedIndexField, FieldValue, FixedSettings};
    use crate::options::{ExecutionConfig, FieldRules};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    struct TestField {
        id: String,
        name: String,
    }

    impl IndexableField for TestField {
        fn id(&self) -> &str {
            &self.id
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn type_key(&self) -> &str {
            "single-line text"
        }

        fn value(&self) -> FieldValue {
            FieldValue::Text(self.name.clone())
        }
    }

    struct TestIndexable {
        fields: Vec<Arc<dyn IndexableField>>,
        loaded: AtomicBool,
    }

    impl TestIndexable {
        fn with_fields(names: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                fields: names
                    .iter()
                    .enumerate()
                    .map(|(i, name)| {
                        Arc::new(TestField {
                            id: format!("{{F{i}}}"),
                            name: name.to_string(),
                        }) as Arc<dyn IndexableField>
                    })
                    .collect(),
                loaded: AtomicBool::new(false),
            })
        }
    }

    impl Indexable for TestIndexable {
        fn unique_id(&self) -> &str {
            "item-1"
        }

        fn load_all_fields(&self) -> anyhow::Result<()> {
            self.loaded.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn fields(&self) -> Vec<Arc<dyn IndexableField>> {
            self.fields.clone()
        }
    }

    #[derive(Default)]
    struct TestWriter {
        written: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    impl DocumentWriter for TestWriter {
        fn write_field(&self, field: &dyn IndexableField) -> anyhow::Result<()> {
            if self.fail_on.as_deref() == Some(field.name()) {
                anyhow::bail!("writer refused {}", field.name());
            }
            self.written.lock().push(field.name().to_string());
            Ok(())
        }

        fn write_computed_field(
            &self,
            field: &dyn ComputedIndexField,
            _value: FieldValue,
        ) -> anyhow::Result<()> {
            self.written.lock().push(field.name().to_string());
            Ok(())
        }
    }

    fn builder(
        indexable: Arc<TestIndexable>,
        writer: Arc<TestWriter>,
        stop_on_error: bool,
        rules: FieldRules,
        execution: ExecutionConfig,
    ) -> DocumentBuilder {
        DocumentBuilder::new(
            indexable,
            writer,
            Arc::new(FixedSettings {
                stop_on_crawl_field_error: stop_on_error,
            }),
            BuilderOptions::new()
                .with_rules(rules)
                .with_execution(execution),
        )
        .unwrap()
    }

    #[test]
    fn sequential_pass_preserves_declaration_order() {
        let indexable = TestIndexable::with_fields(&["title", "body", "tags"]);
        let writer = Arc::new(TestWriter::default());
        let built = builder(
            Arc::clone(&indexable),
            Arc::clone(&writer),
            false,
            FieldRules::new().with_index_all_fields(true),
            ExecutionConfig::sequential(),
        );

        let stats = built.add_item_fields().unwrap();
        assert_eq!(stats.written, 3);
        assert!(indexable.loaded.load(Ordering::SeqCst));
        assert_eq!(*writer.written.lock(), vec!["title", "body", "tags"]);
    }

    #[test]
    fn excluded_field_is_skipped_not_failed() {
        let indexable = TestIndexable::with_fields(&["title", "__hidden"]);
        let writer = Arc::new(TestWriter::default());
        let built = builder(
            indexable,
            Arc::clone(&writer),
            false,
            FieldRules::new()
                .with_index_all_fields(true)
                .with_excluded_field("__hidden"),
            ExecutionConfig::sequential(),
        );

        let stats = built.add_item_fields().unwrap();
        assert_eq!(stats.written, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.failed, 0);
    }

    #[test]
    fn load_failure_surfaces_before_any_write() {
        struct Unloadable;

        impl Indexable for Unloadable {
            fn unique_id(&self) -> &str {
                "item-broken"
            }

            fn load_all_fields(&self) -> anyhow::Result<()> {
                anyhow::bail!("backing store unavailable")
            }

            fn fields(&self) -> Vec<Arc<dyn IndexableField>> {
                unreachable!("fields must not be read when loading fails")
            }
        }

        let writer = Arc::new(TestWriter::default());
        let built = DocumentBuilder::new(
            Arc::new(Unloadable),
            writer.clone(),
            Arc::new(FixedSettings::continue_on_error()),
            BuilderOptions::new(),
        )
        .unwrap();

        let err = built.add_item_fields().unwrap_err();
        assert!(matches!(err, BuildError::Load { .. }));
        assert!(writer.written.lock().is_empty());
    }

    #[test]
    fn parallel_pass_aggregates_instead_of_aborting() {
        let indexable = TestIndexable::with_fields(&["a", "b", "c", "d"]);
        let writer = Arc::new(TestWriter {
            fail_on: Some("b".to_string()),
            ..TestWriter::default()
        });
        // Stop policy is deliberately irrelevant to the parallel field pass.
        let built = builder(
            indexable,
            Arc::clone(&writer),
            true,
            FieldRules::new().with_index_all_fields(true),
            ExecutionConfig::parallel().with_workers(2),
        );

        let err = built.add_item_fields().unwrap_err();
        assert_eq!(err.failures().len(), 1);
        let mut written = writer.written.lock().clone();
        written.sort();
        assert_eq!(written, vec!["a", "c", "d"]);
    }

    #[test]
    fn field_outcome_reports_the_decision() {
        let indexable = TestIndexable::with_fields(&["title"]);
        let writer = Arc::new(TestWriter::default());
        let built = builder(
            Arc::clone(&indexable),
            writer,
            false,
            FieldRules::new(),
            ExecutionConfig::sequential(),
        );

        let outcome = built.check_and_add_field(indexable.fields[0].as_ref());
        match outcome {
            FieldOutcome::Skipped(decision) => {
                assert_eq!(decision, FieldDecision::ExcludeNotIncluded)
            }
            other => panic!("expected skip, got {other:?}"),
        }
    }
}
