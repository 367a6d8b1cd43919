//! Collaborator contracts consumed by the document builder.
//!
//! The builder never loads field values, writes to the search document, or
//! defines what a computed field computes; it drives these traits. All of
//! them are object-safe and `Send + Sync` so the same collaborators can be
//! shared across a worker pool.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// One typed value carried by a field or produced by a computed field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Collection(Vec<FieldValue>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<Vec<FieldValue>> for FieldValue {
    fn from(values: Vec<FieldValue>) -> Self {
        FieldValue::Collection(values)
    }
}

/// Computed-field producers frequently emit JSON; map it onto the field
/// value model (objects are carried as their serialized text).
impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::Bool(b) => FieldValue::Boolean(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Integer(i)
                } else {
                    FieldValue::Float(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => FieldValue::Text(s),
            serde_json::Value::Array(items) => {
                FieldValue::Collection(items.into_iter().map(Into::into).collect())
            }
            object @ serde_json::Value::Object(_) => FieldValue::Text(object.to_string()),
        }
    }
}

/// A source record being processed into a search document. Owned by the
/// surrounding pipeline; read-only here.
pub trait Indexable: Send + Sync {
    fn unique_id(&self) -> &str;

    fn is_template(&self) -> bool {
        false
    }

    fn is_media(&self) -> bool {
        false
    }

    /// Materialize every field value from the backing store. May be
    /// expensive; called once per build pass, before iteration.
    fn load_all_fields(&self) -> anyhow::Result<()>;

    /// Declared fields, in collection order.
    fn fields(&self) -> Vec<Arc<dyn IndexableField>>;
}

/// One named, typed attribute of an indexable. Immutable for the duration
/// of one build pass.
pub trait IndexableField: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn type_key(&self) -> &str;

    fn value(&self) -> FieldValue;
}

/// A named unit of derived-value computation. Invoked, never mutated.
pub trait ComputedIndexField: Send + Sync {
    fn name(&self) -> &str;

    fn compute(&self, indexable: &dyn Indexable) -> anyhow::Result<FieldValue>;
}

/// The document under construction. Assumed safe for concurrent field
/// addition; its internal synchronization is the implementor's contract.
pub trait DocumentWriter: Send + Sync {
    fn write_field(&self, field: &dyn IndexableField) -> anyhow::Result<()>;

    fn write_computed_field(
        &self,
        field: &dyn ComputedIndexField,
        value: FieldValue,
    ) -> anyhow::Result<()>;
}

/// Crawl policy accessors. `stop_on_crawl_field_error` is read at each
/// failure site, never cached for the duration of a pass, so a dynamic
/// settings source can change the policy mid-pass.
pub trait IndexingSettings: Send + Sync {
    fn stop_on_crawl_field_error(&self) -> bool;
}

/// Settings snapshot with a fixed policy value.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedSettings {
    pub stop_on_crawl_field_error: bool,
}

impl FixedSettings {
    pub fn stop_on_error() -> Self {
        Self {
            stop_on_crawl_field_error: true,
        }
    }

    pub fn continue_on_error() -> Self {
        Self {
            stop_on_crawl_field_error: false,
        }
    }
}

impl IndexingSettings for FixedSettings {
    fn stop_on_crawl_field_error(&self) -> bool {
        self.stop_on_crawl_field_error
    }
}
