//! Simple equality filters expressed on canonical field names.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::{EntityDescriptor, Record, Store};
use crate::error::{DomainError, DomainResult};

/// `field == value`, where `field` is a canonical name from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// The column name to filter on in `store`.
    pub fn native_field(
        &self,
        descriptor: &EntityDescriptor,
        store: Store,
    ) -> DomainResult<&'static str> {
        descriptor
            .field(&self.field)
            .map(|f| f.native(store))
            .ok_or_else(|| {
                DomainError::invalid_filter(format!(
                    "`{}` is not a field of {}",
                    self.field, descriptor.kind
                ))
            })
    }

    /// Whether a canonical record satisfies this filter.
    pub fn matches(&self, record: &Record) -> bool {
        match record.get(&self.field) {
            Some(v) => v == &self.value || value_text(v) == value_text(&self.value),
            None => false,
        }
    }
}

/// Render a JSON scalar the way query strings and form bodies expect it.
///
/// Strings are emitted without quotes; everything else uses its JSON text.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Check every filter against the descriptor before any IO happens.
pub fn validate(descriptor: &EntityDescriptor, filters: &[Filter]) -> DomainResult<()> {
    for filter in filters {
        filter.native_field(descriptor, Store::Remote)?;
    }
    Ok(())
}
