//! Declarative entity schemas: field descriptors and derived SQL templates.

mod entity;
mod field;

pub use entity::{derive_schema, quote_ident, EntitySchema, SchemaField};
pub use field::{Field, FieldDefault};
