//! Namespace definitions.
//!
//! A namespace's schema is an explicit, serializable document submitted at
//! open time: field descriptors plus index descriptors. Host-language helpers
//! may generate the document; the engine consumes only the document.

mod types;
mod validator;

pub use types::{FieldDef, FieldType, IndexDef, IndexKind, IndexOpts, NamespaceDef};
pub use validator::{compatible, validate};
