//! Resource schema registry
//!
//! Every REST resource is declared once here: its fields with their
//! validation rules, the verbs it supports, which verbs are public and which
//! fields identify the owner of an item. Handlers, the authorization filter,
//! the list query builder and the documentation endpoint all read from it.

pub mod extra;
pub mod registry;
pub mod validator;

pub use extra::{ExtraField, ExtraFieldKind, parse_extra_schema, validate_extra_data};
pub use registry::{registry, lookup, FieldKind, FieldSchema, Method, ResourceSchema, Scope};
pub use validator::{validate, Mode};
