//! `pharmapos-core` — entity catalog and record normalization.
//!
//! This crate is **pure**: no IO, no async. It describes the entities the
//! client routes between the hosted store and the local backend, and how the
//! two stores name their fields.

pub mod entity;
pub mod error;
pub mod filter;
pub mod normalize;

pub use entity::{EntityDescriptor, EntityKind, FieldMapping, Record, Store};
pub use error::{DomainError, DomainResult};
pub use filter::Filter;
pub use normalize::{normalize, normalize_all, to_store, unique_key_value};
