//! Rule-based field inclusion filter.

use tracing::debug;

use crate::model::{Indexable, IndexableField};
use crate::options::FieldRules;

/// Outcome of the per-field inclusion decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDecision {
    Include,
    /// Excluded by the template-record exclusion layer.
    ExcludeTemplate,
    /// Excluded by the media-record exclusion layer.
    ExcludeMedia,
    /// Excluded by the global exclusion set.
    ExcludeGlobal,
    /// Not in the included set and `index_all_fields` is off.
    ExcludeNotIncluded,
}

impl FieldDecision {
    pub fn is_include(self) -> bool {
        self == FieldDecision::Include
    }

    pub fn reason(self) -> &'static str {
        match self {
            FieldDecision::Include => "field was included",
            FieldDecision::ExcludeTemplate => "template field was excluded",
            FieldDecision::ExcludeMedia => "media field was excluded",
            FieldDecision::ExcludeGlobal => "field was excluded",
            FieldDecision::ExcludeNotIncluded => "field was not included",
        }
    }
}

/// Decide whether `field` is materialized into the document.
///
/// Checks run in a fixed order and the first match wins:
/// template exclusions (template records only), media exclusions (media
/// records only, by name), global exclusions, `index_all_fields` bypass,
/// then the included set. Every non-include outcome leaves a debug trace
/// naming the field and the reason. Neither input is mutated.
pub fn decide(
    field: &dyn IndexableField,
    indexable: &dyn Indexable,
    rules: &FieldRules,
) -> FieldDecision {
    let decision = evaluate(field, indexable, rules);
    if !decision.is_include() {
        debug!(
            field_id = field.id(),
            field_name = field.name(),
            type_key = field.type_key(),
            "skipping field: {}",
            decision.reason()
        );
    }
    decision
}

fn evaluate(
    field: &dyn IndexableField,
    indexable: &dyn Indexable,
    rules: &FieldRules,
) -> FieldDecision {
    let id = field.id();
    let name = field.name();

    if indexable.is_template()
        && rules.has_excluded_template_fields()
        && (rules.excluded_template_fields.contains(name)
            || rules.excluded_template_fields.contains(id))
    {
        return FieldDecision::ExcludeTemplate;
    }

    if indexable.is_media()
        && rules.has_excluded_media_fields()
        && rules.excluded_media_fields.contains(name)
    {
        return FieldDecision::ExcludeMedia;
    }

    if rules.excluded_fields.contains(id) || rules.excluded_fields.contains(name) {
        return FieldDecision::ExcludeGlobal;
    }

    if rules.index_all_fields {
        return FieldDecision::Include;
    }

    if rules.included_fields.contains(id) || rules.included_fields.contains(name) {
        return FieldDecision::Include;
    }

    FieldDecision::ExcludeNotIncluded
}
