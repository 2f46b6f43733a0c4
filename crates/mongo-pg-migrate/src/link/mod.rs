//! Pass 2: components, dynamic zones, media and relations → link rows.
//!
//! Every target is resolved through the [`IdMap`] filled by pass 1. A parent
//! that does not resolve is logged and the field skipped; a target that does
//! not resolve is a dangling reference and is dropped from its batch.

use std::collections::HashSet;

use bson::Bson;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::MigrationConfig;
use crate::core::{Row, SourceDocument, SourceId, SqlValue, TargetWriter, ID_FIELD};
use crate::error::Result;
use crate::idmap::IdMap;
use crate::model::{
    AttributeDescriptor, ModelDescriptor, ModelRegistry, Relation, RelationAttribute,
    RelationKind, TableNames,
};
use crate::naming::{components_table, fk_column, plural, singular, snake_case};

/// Reference field of a component link value.
const REF_FIELD: &str = "ref";
/// Discriminator field of a dynamic-zone value.
const KIND_FIELD: &str = "kind";

/// Counters collected while writing links.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    /// Rows inserted into link and join tables.
    pub link_rows: u64,
    /// Foreign-key columns set on already inserted rows.
    pub foreign_keys: u64,
    /// Targets that never received a destination id.
    pub dangling: u64,
    /// Fields skipped because the owning document had no destination id.
    pub parent_misses: u64,
    /// Links skipped because they were already present.
    pub duplicates_skipped: u64,
}

/// Join table of a many-to-many relation, given the declaring side and its
/// inverse.
///
/// An explicit name on a dominant side wins. Otherwise each side contributes
/// `plural(collection)_plural(via)`; sides are ordered by collection with the
/// dominant side last on ties.
pub fn many_to_many_table(side: &RelationAttribute, inverse: &RelationAttribute) -> String {
    for attr in [side, inverse] {
        if attr.dominant {
            if let Some(name) = &attr.collection_name {
                return name.clone();
            }
        }
    }

    let mut sides = [side, inverse];
    sides.sort_by(|a, b| {
        a.target_name()
            .cmp(b.target_name())
            .then(a.dominant.cmp(&b.dominant))
    });

    sides
        .iter()
        .map(|attr| {
            snake_case(&format!(
                "{}_{}",
                plural(attr.target_name()),
                plural(attr.via.as_deref().unwrap_or_default())
            ))
        })
        .collect::<Vec<_>>()
        .join("__")
}

/// Join table and foreign-key columns of a many-way relation declared on
/// `table` under `field`.
pub fn many_way_columns(table: &str, field: &str, attr: &RelationAttribute) -> (String, String, String) {
    let join_table = attr
        .collection_name
        .clone()
        .unwrap_or_else(|| format!("{}__{}", table, snake_case(field)));
    let fk = fk_column(table);
    let mut other_fk = fk_column(attr.target_name());
    if other_fk == fk {
        other_fk = format!("related_{}", other_fk);
    }
    (join_table, fk, other_fk)
}

/// Foreign-key columns of a many-to-many join table, written from `side`.
pub fn many_to_many_columns(side: &RelationAttribute, inverse: &RelationAttribute) -> (String, String) {
    let fk = fk_column(inverse.target_name());
    let mut other_fk = fk_column(side.target_name());
    if other_fk == fk {
        other_fk = match inverse.via.as_deref() {
            Some(via) => format!("{}_id", singular(via)),
            None => format!("related_{}", other_fk),
        };
    }
    (fk, other_fk)
}

/// Elements of a multi-valued field; a lone value counts as one element.
fn elements(value: &Bson) -> Vec<&Bson> {
    match value {
        Bson::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

/// How the component model of a linked value is found.
#[derive(Debug, Clone, Copy)]
enum LinkedComponent<'m> {
    /// Declared on the attribute (components).
    Fixed(&'m str),
    /// Named per value by its `kind` tag (dynamic zones).
    ByKind,
}

/// Writes the pass-2 links of one document at a time.
pub struct LinkWriter<'a> {
    registry: &'a ModelRegistry,
    tables: &'a TableNames,
    config: &'a MigrationConfig,
    target: &'a dyn TargetWriter,
    stats: LinkStats,
}

impl<'a> LinkWriter<'a> {
    pub fn new(
        registry: &'a ModelRegistry,
        tables: &'a TableNames,
        config: &'a MigrationConfig,
        target: &'a dyn TargetWriter,
    ) -> Self {
        Self {
            registry,
            tables,
            config,
            target,
            stats: LinkStats::default(),
        }
    }

    /// Counters collected so far.
    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// Consume the writer and return its counters.
    pub fn into_stats(self) -> LinkStats {
        self.stats
    }

    /// Write every link of `document`, a document of `model` stored in
    /// `table`.
    pub async fn write_document(
        &mut self,
        ids: &mut IdMap,
        document: &SourceDocument,
        model: &ModelDescriptor,
        table: &str,
    ) -> Result<()> {
        for (field, value) in &document.fields {
            if field == ID_FIELD || matches!(value, Bson::Null | Bson::Undefined) {
                continue;
            }
            let Some(attribute) = model.attribute(field) else {
                continue;
            };
            if !Self::writes_links(attribute) {
                continue;
            }

            let Some(parent_id) = ids.resolve(&document.id) else {
                warn!(
                    "{}: document {} has no destination id, skipping field '{}'",
                    table, document.id, field
                );
                self.stats.parent_misses += 1;
                continue;
            };

            match attribute {
                AttributeDescriptor::Component { component, .. } => {
                    let linked = LinkedComponent::Fixed(component);
                    self.write_components(ids, document, table, parent_id, field, value, linked)
                        .await?;
                }
                AttributeDescriptor::DynamicZone { .. } => {
                    let linked = LinkedComponent::ByKind;
                    self.write_components(ids, document, table, parent_id, field, value, linked)
                        .await?;
                }
                AttributeDescriptor::Media { multiple } => {
                    self.write_media(ids, table, parent_id, field, value, *multiple)
                        .await?;
                }
                AttributeDescriptor::Relation(rel) => {
                    self.write_relation(ids, table, parent_id, field, value, rel)
                        .await?;
                }
                AttributeDescriptor::Scalar { .. } => {}
            }
        }

        Ok(())
    }

    /// Check if pass 2 has anything to write for an attribute.
    fn writes_links(attribute: &AttributeDescriptor) -> bool {
        match attribute {
            AttributeDescriptor::Scalar { .. } => false,
            AttributeDescriptor::Relation(rel) => match rel.relation {
                RelationKind::OneToManyPassive | RelationKind::Unclassified => false,
                RelationKind::ManyToMany => rel.attribute.dominant,
                _ => true,
            },
            _ => true,
        }
    }

    /// Component model of one linked value.
    fn component_model(
        &self,
        linked: LinkedComponent<'_>,
        link: &Bson,
        table: &str,
        field: &str,
    ) -> Option<&'a ModelDescriptor> {
        let registry = self.registry;
        match linked {
            LinkedComponent::Fixed(uid) => {
                let model = registry.get(uid);
                if model.is_none() {
                    warn!("{}.{}: unknown component '{}'", table, field, uid);
                }
                model
            }
            LinkedComponent::ByKind => {
                let kind = link.as_document()?.get_str(KIND_FIELD).ok()?;
                let model = registry.by_global_id(kind);
                if model.is_none() {
                    warn!("{}.{}: unknown component kind '{}'", table, field, kind);
                }
                model
            }
        }
    }

    /// Component and dynamic-zone links.
    #[allow(clippy::too_many_arguments)]
    async fn write_components(
        &mut self,
        ids: &mut IdMap,
        document: &SourceDocument,
        table: &str,
        parent_id: i64,
        field: &str,
        value: &Bson,
        linked: LinkedComponent<'_>,
    ) -> Result<()> {
        let tables = self.tables;
        let link_table = components_table(table);
        let parent_column = fk_column(table);
        let mut rows = Vec::new();

        for (idx, link) in elements(value).into_iter().enumerate() {
            let component_table = self
                .component_model(linked, link, table, field)
                .map(|m| tables.for_model(m));
            let component_id = link
                .as_document()
                .and_then(|d| d.get(REF_FIELD))
                .and_then(|r| ids.resolve_bson(r));

            let (Some(component_table), Some(component_id)) = (component_table, component_id) else {
                self.stats.dangling += 1;
                continue;
            };

            let link_key = SourceId::from_bson(link)
                .unwrap_or_else(|| SourceId::new(format!("{}#{}#{}", document.id, field, idx)));

            let mut row = Row::new();
            row.insert("id".into(), SqlValue::I64(ids.allocate(&link_key, &link_table)));
            row.insert("field".into(), field.into());
            row.insert("order".into(), SqlValue::I64(idx as i64 + 1));
            row.insert("component_type".into(), component_table.into());
            row.insert("component_id".into(), SqlValue::I64(component_id));
            row.insert(parent_column.clone(), SqlValue::I64(parent_id));
            rows.push(row);
        }

        if !rows.is_empty() {
            debug!("{}: {} component links for '{}'", link_table, rows.len(), field);
            self.stats.link_rows += self.target.insert_rows(&link_table, &rows).await?;
        }
        Ok(())
    }

    async fn write_media(
        &mut self,
        ids: &IdMap,
        table: &str,
        parent_id: i64,
        field: &str,
        value: &Bson,
        multiple: bool,
    ) -> Result<()> {
        let attachments = if multiple { elements(value) } else { vec![value] };
        let mut rows = Vec::with_capacity(attachments.len());

        for (idx, attachment) in attachments.into_iter().enumerate() {
            let Some(file_id) = ids.resolve_bson(attachment) else {
                self.stats.dangling += 1;
                continue;
            };
            let mut row = Row::new();
            row.insert("upload_file_id".into(), SqlValue::I64(file_id));
            row.insert("related_id".into(), SqlValue::I64(parent_id));
            row.insert("related_type".into(), table.into());
            row.insert("field".into(), field.into());
            row.insert("order".into(), SqlValue::I64(idx as i64 + 1));
            rows.push(row);
        }

        if !rows.is_empty() {
            let link_table = &self.config.media.link_table;
            debug!("{}: {} attachments for {}.{}", link_table, rows.len(), table, field);
            self.stats.link_rows += self.target.insert_rows(link_table, &rows).await?;
        }
        Ok(())
    }

    async fn write_relation(
        &mut self,
        ids: &IdMap,
        table: &str,
        parent_id: i64,
        field: &str,
        value: &Bson,
        rel: &Relation,
    ) -> Result<()> {
        match rel.relation {
            kind if kind.is_foreign_key() => {
                self.write_foreign_key(ids, table, parent_id, field, value).await
            }
            RelationKind::ManyWay => {
                let (join_table, fk, other_fk) = many_way_columns(table, field, &rel.attribute);
                self.write_join_rows(ids, &join_table, (&fk, &other_fk), parent_id, value)
                    .await
            }
            RelationKind::ManyToMany => {
                let Some(inverse) = rel.inverse.as_ref() else {
                    return Ok(());
                };
                let join_table = many_to_many_table(&rel.attribute, inverse);
                let (fk, other_fk) = many_to_many_columns(&rel.attribute, inverse);
                self.write_join_rows(ids, &join_table, (&fk, &other_fk), parent_id, value)
                    .await
            }
            _ => Ok(()),
        }
    }

    async fn write_foreign_key(
        &mut self,
        ids: &IdMap,
        table: &str,
        parent_id: i64,
        field: &str,
        value: &Bson,
    ) -> Result<()> {
        let Some(target_id) = ids.resolve_bson(value) else {
            self.stats.dangling += 1;
            return Ok(());
        };

        let guarded = self
            .config
            .relation_duplicates
            .get(table)
            .is_some_and(|f| f == field);
        if guarded && self.target.exists_with(table, field, target_id).await? {
            debug!("{}.{} = {} already present, skipped", table, field, target_id);
            self.stats.duplicates_skipped += 1;
            return Ok(());
        }

        self.stats.foreign_keys += self
            .target
            .update_column(table, parent_id, field, target_id)
            .await?;
        Ok(())
    }

    /// Insert `(parent, target)` pairs into a join table. Tables listed in
    /// `dedup_join_tables` drop pairs already stored or repeated in the batch.
    async fn write_join_rows(
        &mut self,
        ids: &IdMap,
        join_table: &str,
        (fk, other_fk): (&str, &str),
        parent_id: i64,
        value: &Bson,
    ) -> Result<()> {
        let mut pairs = Vec::new();
        for target in elements(value) {
            match ids.resolve_bson(target) {
                Some(target_id) => pairs.push((parent_id, target_id)),
                None => self.stats.dangling += 1,
            }
        }
        if pairs.is_empty() {
            return Ok(());
        }

        if let Some(key) = self.config.dedup_join_tables.get(join_table) {
            pairs = self.filter_existing(join_table, (fk, other_fk), key, pairs).await?;
            if pairs.is_empty() {
                return Ok(());
            }
        }

        let rows: Vec<Row> = pairs
            .iter()
            .map(|&(parent, target)| {
                let mut row = Row::new();
                row.insert(fk.to_string(), SqlValue::I64(parent));
                row.insert(other_fk.to_string(), SqlValue::I64(target));
                row
            })
            .collect();

        debug!("{}: {} join rows", join_table, rows.len());
        self.stats.link_rows += self.target.insert_rows(join_table, &rows).await?;
        Ok(())
    }

    /// One lookup for the whole candidate set, then drop stored and repeated
    /// pairs. `key` names the composite key columns in configuration order.
    async fn filter_existing(
        &mut self,
        join_table: &str,
        (fk, other_fk): (&str, &str),
        key: &[String; 2],
        pairs: Vec<(i64, i64)>,
    ) -> Result<Vec<(i64, i64)>> {
        // Reorder pairs to match the configured key columns
        let swapped = key[0] == other_fk && key[1] == fk;
        let keyed: Vec<(i64, i64)> = pairs
            .iter()
            .map(|&(p, t)| if swapped { (t, p) } else { (p, t) })
            .collect();

        let existing = self
            .target
            .existing_pairs(join_table, (&key[0], &key[1]), &keyed)
            .await?;

        let mut seen = HashSet::new();
        let mut kept = Vec::with_capacity(pairs.len());
        for (pair, k) in pairs.into_iter().zip(keyed) {
            if existing.contains(&k) || !seen.insert(k) {
                self.stats.duplicates_skipped += 1;
            } else {
                kept.push(pair);
            }
        }
        Ok(kept)
    }
}
