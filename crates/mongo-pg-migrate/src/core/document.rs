//! Source document and identifier types.

use std::fmt;

use bson::{Bson, Document};

/// Name of the distinguished identifier field on every source document.
pub const ID_FIELD: &str = "_id";

/// Globally unique identifier of a source document (or embedded link).
///
/// Object ids are normalized to their 24-character hex form so that a
/// reference stored as `ObjectId` and one stored as a string resolve to the
/// same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(String);

impl SourceId {
    /// Create an identifier from its string form.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Extract an identifier from a BSON reference value.
    ///
    /// Returns `None` for nulls and for shapes that cannot name a document.
    pub fn from_bson(value: &Bson) -> Option<Self> {
        match value {
            Bson::ObjectId(oid) => Some(Self(oid.to_hex())),
            Bson::String(s) if !s.is_empty() => Some(Self(s.clone())),
            Bson::Int32(n) => Some(Self(n.to_string())),
            Bson::Int64(n) => Some(Self(n.to_string())),
            Bson::Document(doc) => doc.get(ID_FIELD).and_then(Self::from_bson),
            _ => None,
        }
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One record streamed from the source store.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    /// Identifier taken from the `_id` field.
    pub id: SourceId,

    /// Every field of the document, `_id` included.
    pub fields: Document,
}

impl SourceDocument {
    /// Build a source document from a raw BSON document.
    ///
    /// Returns `None` when the document has no usable `_id`.
    pub fn from_document(fields: Document) -> Option<Self> {
        let id = fields.get(ID_FIELD).and_then(SourceId::from_bson)?;
        Some(Self { id, fields })
    }

    /// Get a field value, treating BSON null as absent.
    pub fn get(&self, key: &str) -> Option<&Bson> {
        match self.fields.get(key) {
            None | Some(Bson::Null) | Some(Bson::Undefined) => None,
            Some(value) => Some(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};

    #[test]
    fn test_object_id_and_string_resolve_to_same_key() {
        let oid = ObjectId::parse_str("5f1a2b3c4d5e6f7081920a1b").unwrap();
        assert_eq!(
            SourceId::from_bson(&Bson::ObjectId(oid)),
            SourceId::from_bson(&Bson::String("5f1a2b3c4d5e6f7081920a1b".into()))
        );
    }

    #[test]
    fn test_null_is_not_an_id() {
        assert_eq!(SourceId::from_bson(&Bson::Null), None);
        assert_eq!(SourceId::from_bson(&Bson::String(String::new())), None);
    }

    #[test]
    fn test_document_without_id_is_rejected() {
        assert!(SourceDocument::from_document(doc! { "title": "x" }).is_none());
        let d = SourceDocument::from_document(doc! { "_id": "m1", "title": "x" }).unwrap();
        assert_eq!(d.id.as_str(), "m1");
    }

    #[test]
    fn test_get_skips_null() {
        let d = SourceDocument::from_document(doc! { "_id": "m1", "cover": Bson::Null }).unwrap();
        assert!(d.get("cover").is_none());
        assert!(d.get("missing").is_none());
        assert!(d.get("_id").is_some());
    }
}
