//! Field-name normalization between the two stores.
//!
//! Reads go through [`normalize`], which maps whatever spelling a store used
//! onto the canonical names declared in the entity catalog. Writes go through
//! [`to_store`], which renames canonical fields to the target store's native
//! names. Fields the catalog does not know about pass through untouched.

use std::collections::HashSet;

use serde_json::Value;

use crate::entity::{EntityDescriptor, Record, Store};

/// Map a record from either store (or already canonical) onto canonical names.
///
/// For each declared field the first non-null candidate wins, in the order
/// canonical, remote, local, aliases. A field present only as `null` stays
/// present as `null`.
pub fn normalize(descriptor: &EntityDescriptor, record: &Record) -> Record {
    let mut out = Record::new();
    let mut consumed: HashSet<&str> = HashSet::new();

    for field in descriptor.fields {
        let mut seen_null = false;
        let mut chosen: Option<&Value> = None;

        for candidate in field.candidates() {
            consumed.insert(candidate);
            match record.get(candidate) {
                Some(Value::Null) => seen_null = true,
                Some(value) if chosen.is_none() => chosen = Some(value),
                _ => {}
            }
        }

        match chosen {
            Some(value) => {
                out.insert(field.canonical.to_string(), value.clone());
            }
            None if seen_null => {
                out.insert(field.canonical.to_string(), Value::Null);
            }
            None => {}
        }
    }

    for (key, value) in record {
        if !consumed.contains(key.as_str()) {
            out.insert(key.clone(), value.clone());
        }
    }

    out
}

/// Normalize a batch of rows.
pub fn normalize_all(descriptor: &EntityDescriptor, records: &[Record]) -> Vec<Record> {
    records.iter().map(|r| normalize(descriptor, r)).collect()
}

/// Rename a record's fields to the native names of `store`.
///
/// The input may use any accepted spelling; it is normalized first.
pub fn to_store(descriptor: &EntityDescriptor, record: &Record, store: Store) -> Record {
    normalize(descriptor, record)
        .into_iter()
        .map(|(key, value)| match descriptor.field(&key) {
            Some(field) => (field.native(store).to_string(), value),
            None => (key, value),
        })
        .collect()
}

/// The value of the entity's unique key, whatever spelling the record uses.
pub fn unique_key_value(descriptor: &EntityDescriptor, record: &Record) -> Option<Value> {
    let field = descriptor.field(descriptor.unique_key)?;
    field
        .candidates()
        .filter_map(|c| record.get(c))
        .find(|v| !v.is_null())
        .cloned()
}
