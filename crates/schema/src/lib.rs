//! testboard-schema: declarative record schemas.
//!
//! A schema source is a JSON document mapping each record kind to a field
//! map (`{"TestCase": {"name": "String", "tags": ["String"]}}`). This crate
//! parses that document into a typed [`SchemaDefinition`], compiles each kind
//! into an executable [`CompiledShape`], and keeps the active pair in a
//! [`SchemaRegistry`] that can hot-reload the source when it changes.

pub mod compile;
pub mod error;
pub mod registry;
pub mod types;

pub use compile::{compile, compile_kind, CompiledSchema, CompiledShape};
pub use error::{SchemaLoadError, ShapeError, UnknownTypeError};
pub use registry::{ActiveSchema, ReloadReport, SchemaRegistry, ShapeProvider};
pub use types::{FieldOptions, FieldSet, FieldSpec, PrimitiveType, SchemaDefinition, TypeTag};
