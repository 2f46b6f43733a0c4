//! Core abstractions shared by the engine and the store drivers.
//!
//! - [`document`]: source documents and their identifiers
//! - [`value`]: destination row values
//! - [`identifier`]: SQL identifier validation and quoting
//! - [`traits`]: source, target and dialect seams

pub mod document;
pub mod identifier;
pub mod traits;
pub mod value;

pub use document::{SourceDocument, SourceId, ID_FIELD};
pub use traits::{Dialect, DocumentSource, DocumentStream, TargetWriter};
pub use value::{Row, SqlValue};
