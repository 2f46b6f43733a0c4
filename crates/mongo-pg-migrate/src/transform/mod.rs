//! Pass 1: source document → destination row.

use std::collections::{BTreeMap, HashSet};

use crate::config::MigrationConfig;
use crate::core::{Row, SourceDocument, SqlValue};
use crate::model::{AttributeDescriptor, ModelDescriptor};

/// Destination column of the creation timestamp.
pub const CREATED_AT_COLUMN: &str = "created_at";
/// Destination column of the update timestamp.
pub const UPDATED_AT_COLUMN: &str = "updated_at";
/// Publication timestamp carried by draft-and-publish models.
pub const PUBLISHED_AT_COLUMN: &str = "published_at";

/// Builds flat destination rows from source documents.
#[derive(Debug, Clone)]
pub struct RowTransformer<'a> {
    source_id_column: &'a str,
    skip_source_id: HashSet<&'a str>,
    column_defaults: &'a BTreeMap<String, BTreeMap<String, serde_json::Value>>,
}

impl<'a> RowTransformer<'a> {
    pub fn new(config: &'a MigrationConfig) -> Self {
        Self {
            source_id_column: &config.source_id_column,
            skip_source_id: config
                .skip_source_id_tables
                .iter()
                .map(String::as_str)
                .collect(),
            column_defaults: &config.column_defaults,
        }
    }

    /// Check if rows of `table` carry the source identifier column.
    pub fn keeps_source_id(&self, table: &str) -> bool {
        !self.skip_source_id.contains(table)
    }

    /// Build the pass-1 row of `document`, to be stored in `table` under `id`.
    ///
    /// Only scalar attributes are copied; components, media and relations
    /// are written in pass 2 once every id is known.
    pub fn transform(
        &self,
        document: &SourceDocument,
        model: &ModelDescriptor,
        table: &str,
        id: i64,
    ) -> Row {
        let mut row = Row::new();

        for (name, attribute) in &model.attributes {
            let AttributeDescriptor::Scalar { data_type } = attribute else {
                continue;
            };
            let Some(value) = document.get(name) else {
                continue;
            };
            let value = if data_type == "json" {
                SqlValue::json_from_bson(value)
            } else {
                SqlValue::from_bson(value)
            };
            row.insert(name.clone(), value);
        }

        if let Some(timestamps) = &model.timestamps {
            if let Some(created) = document.get(&timestamps.created) {
                row.insert(CREATED_AT_COLUMN.to_string(), SqlValue::from_bson(created));
            }
            if let Some(updated) = document.get(&timestamps.updated) {
                row.insert(UPDATED_AT_COLUMN.to_string(), SqlValue::from_bson(updated));
            }
        }

        if model.draft_and_publish {
            if let Some(published) = document.get(PUBLISHED_AT_COLUMN) {
                row.insert(PUBLISHED_AT_COLUMN.to_string(), SqlValue::from_bson(published));
            }
        }

        if self.keeps_source_id(table) {
            row.insert(
                self.source_id_column.to_string(),
                SqlValue::Text(document.id.to_string()),
            );
        }

        if let Some(defaults) = self.column_defaults.get(table) {
            for (column, value) in defaults {
                row.insert(column.clone(), SqlValue::from(value.clone()));
            }
        }

        row.insert("id".to_string(), SqlValue::I64(id));
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MediaConfig;
    use crate::model::ModelRegistry;
    use bson::doc;
    use serde_json::json;

    fn model(def: serde_json::Value) -> ModelDescriptor {
        let reg = ModelRegistry::from_definitions(&[def.to_string()], &MediaConfig::default())
            .unwrap();
        reg.models()[0].clone()
    }

    fn article() -> ModelDescriptor {
        model(json!({
            "uid": "application::magazine-article.magazine-article",
            "collectionName": "magazine_article",
            "options": { "timestamps": true },
            "attributes": {
                "title": { "type": "string" },
                "meta": { "type": "json" },
                "tags": { "collection": "tag" },
                "cover": { "model": "file", "plugin": "upload" }
            }
        }))
    }

    #[test]
    fn test_scalar_row_with_source_id() {
        let config = MigrationConfig::default();
        let transformer = RowTransformer::new(&config);
        let d = SourceDocument::from_document(doc! {
            "_id": "m1",
            "title": "Alpha",
            "tags": ["t1"],
            "cover": "f1",
            "__v": 0
        })
        .unwrap();

        let row = transformer.transform(&d, &article(), "magazine_article", 1);
        assert_eq!(row.len(), 3);
        assert_eq!(row["id"], SqlValue::I64(1));
        assert_eq!(row["title"], SqlValue::Text("Alpha".into()));
        assert_eq!(row["mongoid"], SqlValue::Text("m1".into()));
    }

    #[test]
    fn test_skip_list_omits_source_id() {
        let config = MigrationConfig::default();
        let transformer = RowTransformer::new(&config);
        let d = SourceDocument::from_document(doc! { "_id": "r1", "title": "x" }).unwrap();
        let row = transformer.transform(&d, &article(), "strapi_role", 4);
        assert!(!row.contains_key("mongoid"));
        assert_eq!(row["id"], SqlValue::I64(4));
    }

    #[test]
    fn test_json_and_timestamps() {
        let config = MigrationConfig::default();
        let transformer = RowTransformer::new(&config);
        let created = bson::DateTime::from_millis(1_600_000_000_000);
        let d = SourceDocument::from_document(doc! {
            "_id": "m2",
            "meta": "plain string",
            "createdAt": created,
        })
        .unwrap();

        let row = transformer.transform(&d, &article(), "magazine_article", 2);
        assert_eq!(row["meta"], SqlValue::Json(json!("plain string")));
        assert_eq!(row["created_at"], SqlValue::Timestamp(created.to_chrono()));
        assert!(!row.contains_key("updated_at"));
    }

    #[test]
    fn test_column_defaults_and_published_at() {
        let mut config = MigrationConfig::default();
        let mut defaults = BTreeMap::new();
        defaults.insert("transection_id".to_string(), json!(0));
        config
            .column_defaults
            .insert("membership_payments".to_string(), defaults);
        let transformer = RowTransformer::new(&config);

        let payment = model(json!({
            "uid": "application::membership-payment.membership-payment",
            "collectionName": "membership_payments",
            "options": { "draftAndPublish": true },
            "attributes": { "amount": { "type": "float" } }
        }));
        let published = bson::DateTime::from_millis(1_700_000_000_000);
        let d = SourceDocument::from_document(doc! {
            "_id": "p1",
            "amount": 9.5,
            "published_at": published,
        })
        .unwrap();

        let row = transformer.transform(&d, &payment, "membership_payments", 1);
        assert_eq!(row["transection_id"], SqlValue::I64(0));
        assert_eq!(row["amount"], SqlValue::F64(9.5));
        assert_eq!(row["published_at"], SqlValue::Timestamp(published.to_chrono()));
    }
}
