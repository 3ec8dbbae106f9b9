//! Field persistence policies.
//!
//! Each state object carries one policy bit. Under deny-list semantics (the
//! default) every field is persisted except those explicitly marked; under
//! allow-list semantics only explicitly marked fields are persisted. Marks
//! come from the field declarations of a
//! [`ModuleDefinition`](crate::tree::ModuleDefinition).

mod registry;

pub use registry::FieldPolicyRegistry;
