//! Model registry built from the source schema catalog.
//!
//! Every catalog entry is a JSON model definition. Definitions are normalized
//! once at load time into [`ModelDescriptor`]s whose attributes carry an
//! explicit [`AttributeDescriptor`] discriminant; relations are classified
//! here, after all models are known, so later passes never re-inspect the
//! raw definition shape.

mod classify;
mod uid;

pub use classify::{classify, RelationKind};
pub use uid::{global_id, parse_uid, Namespace, ParsedUid};

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::MediaConfig;
use crate::core::DocumentSource;
use crate::error::{MigrateError, Result};

/// Target name meaning "any model".
pub const WILDCARD: &str = "*";

/// Target of a relation attribute: a single model or a collection of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationTarget {
    /// Single-valued reference (`model`).
    Model(String),
    /// Multi-valued reference (`collection`).
    Collection(String),
}

impl RelationTarget {
    /// Name of the referenced model.
    pub fn name(&self) -> &str {
        match self {
            RelationTarget::Model(n) | RelationTarget::Collection(n) => n,
        }
    }

    /// Check if the target is polymorphic.
    pub fn is_wildcard(&self) -> bool {
        self.name() == WILDCARD
    }
}

/// Declared shape of a relation attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationAttribute {
    pub target: RelationTarget,

    /// Inverse field on the target model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via: Option<String>,

    /// Set on the side that owns a shared many-to-many join table.
    pub dominant: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,

    /// Explicit join table name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_name: Option<String>,
}

impl RelationAttribute {
    /// Create a relation attribute with no inverse, plugin or override.
    pub fn new(target: RelationTarget) -> Self {
        Self {
            target,
            via: None,
            dominant: false,
            plugin: None,
            collection_name: None,
        }
    }

    /// Name of the target collection for multi-valued relations, or the
    /// target model name otherwise.
    pub fn target_name(&self) -> &str {
        self.target.name()
    }
}

/// A classified relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relation {
    /// Shape declared on this side.
    #[serde(flatten)]
    pub attribute: RelationAttribute,

    /// Kind computed from this side and its inverse.
    pub relation: RelationKind,

    /// Uid of the resolved target model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_uid: Option<String>,

    /// Relation attribute found on the target model under `via`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inverse: Option<RelationAttribute>,
}

/// Normalized attribute of a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AttributeDescriptor {
    /// Plain column value.
    Scalar { data_type: String },

    /// Embedded component, referenced by the component model uid.
    Component { component: String, repeatable: bool },

    /// Polymorphic list of components, resolved per value by global id.
    #[serde(rename = "dynamiczone")]
    DynamicZone { components: Vec<String> },

    /// Attachment(s) stored in the polymorphic media link table.
    Media { multiple: bool },

    /// Reference to other documents.
    Relation(Relation),
}

impl AttributeDescriptor {
    /// Check if the attribute is written as a column in pass 1.
    pub fn is_scalar(&self) -> bool {
        matches!(self, AttributeDescriptor::Scalar { .. })
    }

    /// Short kind label used by `inspect`.
    pub fn label(&self) -> String {
        match self {
            AttributeDescriptor::Scalar { data_type } => format!("scalar({})", data_type),
            AttributeDescriptor::Component { component, repeatable } => {
                if *repeatable {
                    format!("component({}, repeatable)", component)
                } else {
                    format!("component({})", component)
                }
            }
            AttributeDescriptor::DynamicZone { components } => {
                format!("dynamiczone({})", components.join(", "))
            }
            AttributeDescriptor::Media { multiple: true } => "media(multiple)".to_string(),
            AttributeDescriptor::Media { multiple: false } => "media(single)".to_string(),
            AttributeDescriptor::Relation(rel) => {
                format!("{} -> {}", rel.relation, rel.attribute.target_name())
            }
        }
    }
}

/// Source field names of the timestamp columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Timestamps {
    pub created: String,
    pub updated: String,
}

impl Default for Timestamps {
    fn default() -> Self {
        Self {
            created: "createdAt".to_string(),
            updated: "updatedAt".to_string(),
        }
    }
}

/// Normalized model definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelDescriptor {
    pub uid: String,

    /// Source collection, and destination table before renames.
    pub collection_name: String,

    pub namespace: Namespace,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,

    /// Discriminator tag of dynamic-zone values pointing at this model.
    pub global_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamps: Option<Timestamps>,

    pub draft_and_publish: bool,

    pub attributes: BTreeMap<String, AttributeDescriptor>,
}

impl ModelDescriptor {
    /// Plugin owning the model (system models belong to `admin`).
    pub fn plugin(&self) -> Option<&str> {
        match &self.namespace {
            Namespace::Plugin(p) => Some(p),
            _ => None,
        }
    }

    /// Api owning the model.
    pub fn api_name(&self) -> Option<&str> {
        match &self.namespace {
            Namespace::Api(a) => Some(a),
            _ => None,
        }
    }

    /// Check if the model is an embeddable component.
    pub fn is_component(&self) -> bool {
        self.namespace == Namespace::Component
    }

    /// Check if the uid could not be parsed.
    pub fn is_degraded(&self) -> bool {
        self.namespace == Namespace::Unknown
    }

    /// Get an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.get(name)
    }
}

// ===== Raw catalog format =====

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawModel {
    uid: String,
    collection_name: Option<String>,
    global_id: Option<String>,
    #[serde(default)]
    options: RawOptions,
    #[serde(default)]
    attributes: BTreeMap<String, RawAttribute>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOptions {
    #[serde(default)]
    timestamps: serde_json::Value,
    #[serde(default)]
    draft_and_publish: bool,
}

impl RawOptions {
    fn timestamps(&self) -> Option<Timestamps> {
        match &self.timestamps {
            serde_json::Value::Bool(true) => Some(Timestamps::default()),
            serde_json::Value::Array(names) => match names.as_slice() {
                [created, updated] => Some(Timestamps {
                    created: created.as_str()?.to_string(),
                    updated: updated.as_str()?.to_string(),
                }),
                _ => None,
            },
            _ => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAttribute {
    #[serde(rename = "type")]
    data_type: Option<String>,
    model: Option<String>,
    collection: Option<String>,
    via: Option<String>,
    #[serde(default)]
    dominant: bool,
    plugin: Option<String>,
    collection_name: Option<String>,
    component: Option<String>,
    #[serde(default)]
    components: Vec<String>,
    #[serde(default)]
    repeatable: bool,
}

impl RawAttribute {
    fn normalize(self, media: &MediaConfig) -> Option<AttributeDescriptor> {
        match self.data_type.as_deref() {
            Some("component") => {
                return self.component.map(|component| AttributeDescriptor::Component {
                    component,
                    repeatable: self.repeatable,
                })
            }
            Some("dynamiczone") => {
                return Some(AttributeDescriptor::DynamicZone {
                    components: self.components,
                })
            }
            _ => {}
        }

        if self.plugin.as_deref() == Some(media.plugin.as_str()) {
            if self.model.as_deref() == Some(media.file_model.as_str()) {
                return Some(AttributeDescriptor::Media { multiple: false });
            }
            if self.collection.as_deref() == Some(media.file_model.as_str()) {
                return Some(AttributeDescriptor::Media { multiple: true });
            }
        }

        let target = match (self.model, self.collection) {
            (Some(model), _) => RelationTarget::Model(model),
            (None, Some(collection)) => RelationTarget::Collection(collection),
            (None, None) => {
                return self
                    .data_type
                    .map(|data_type| AttributeDescriptor::Scalar { data_type })
            }
        };

        Some(AttributeDescriptor::Relation(Relation {
            attribute: RelationAttribute {
                target,
                via: self.via,
                dominant: self.dominant,
                plugin: self.plugin,
                collection_name: self.collection_name,
            },
            relation: RelationKind::Unclassified,
            target_uid: None,
            inverse: None,
        }))
    }
}

fn normalize_model(raw: RawModel, media: &MediaConfig) -> ModelDescriptor {
    let parsed = parse_uid(&raw.uid);
    if parsed.namespace == Namespace::Unknown {
        warn!(
            "Model uid '{}' matches no known namespace; other models cannot target it",
            raw.uid
        );
    }

    let global_id = global_id(&parsed, &raw.uid, raw.global_id.as_deref());
    let collection_name = raw
        .collection_name
        .or_else(|| parsed.model_name.clone())
        .unwrap_or_else(|| raw.uid.clone());

    let mut attributes = BTreeMap::new();
    for (name, attr) in raw.attributes {
        match attr.normalize(media) {
            Some(descriptor) => {
                attributes.insert(name, descriptor);
            }
            None => debug!("{}: attribute '{}' has no usable shape, ignored", raw.uid, name),
        }
    }

    ModelDescriptor {
        timestamps: raw.options.timestamps(),
        draft_and_publish: raw.options.draft_and_publish,
        uid: raw.uid,
        collection_name,
        namespace: parsed.namespace,
        model_name: parsed.model_name,
        global_id,
        attributes,
    }
}

/// Find the model a relation points at, by model name and plugin.
///
/// Without a plugin on the attribute, models outside any plugin are
/// preferred; catalog order breaks remaining ties.
fn find_target(models: &[ModelDescriptor], attribute: &RelationAttribute) -> Option<usize> {
    let name = attribute.target_name();
    let named = || {
        models
            .iter()
            .enumerate()
            .filter(move |(_, m)| m.model_name.as_deref() == Some(name))
    };

    match attribute.plugin.as_deref() {
        Some(plugin) => named()
            .find(|(_, m)| m.plugin() == Some(plugin))
            .map(|(i, _)| i),
        None => named()
            .find(|(_, m)| m.plugin().is_none())
            .or_else(|| named().next())
            .map(|(i, _)| i),
    }
}

/// Immutable set of model descriptors for one run.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: Vec<ModelDescriptor>,
    by_uid: HashMap<String, usize>,
    by_global_id: HashMap<String, usize>,
}

impl ModelRegistry {
    /// Load every model definition stored under `key_prefix` in the source
    /// catalog.
    pub async fn load(
        source: &dyn DocumentSource,
        key_prefix: &str,
        media: &MediaConfig,
    ) -> Result<Self> {
        let definitions = source.model_definitions(key_prefix).await?;
        let registry = Self::from_definitions(&definitions, media)?;
        info!(
            "Loaded {} model definitions ({} components)",
            registry.len(),
            registry.models.iter().filter(|m| m.is_component()).count()
        );
        Ok(registry)
    }

    /// Build a registry from JSON-encoded model definitions, in catalog
    /// order.
    pub fn from_definitions<S: AsRef<str>>(definitions: &[S], media: &MediaConfig) -> Result<Self> {
        let mut models = Vec::with_capacity(definitions.len());
        for definition in definitions {
            let raw: RawModel = serde_json::from_str(definition.as_ref())
                .map_err(|e| MigrateError::Catalog(format!("invalid model definition: {}", e)))?;
            models.push(normalize_model(raw, media));
        }

        Self::classify_relations(&mut models);

        let mut by_uid = HashMap::with_capacity(models.len());
        let mut by_global_id = HashMap::with_capacity(models.len());
        for (i, model) in models.iter().enumerate() {
            if by_uid.insert(model.uid.clone(), i).is_some() {
                warn!("Duplicate model uid '{}', keeping the last definition", model.uid);
            }
            by_global_id.entry(model.global_id.clone()).or_insert(i);
        }

        Ok(Self {
            models,
            by_uid,
            by_global_id,
        })
    }

    /// Resolve each relation's target and inverse, then classify it.
    fn classify_relations(models: &mut [ModelDescriptor]) {
        let mut resolved = Vec::new();

        for (i, model) in models.iter().enumerate() {
            for (name, attr) in &model.attributes {
                let AttributeDescriptor::Relation(rel) = attr else {
                    continue;
                };

                let target = find_target(models, &rel.attribute);
                let inverse = match (target, rel.attribute.via.as_deref()) {
                    (Some(t), Some(via)) => match models[t].attributes.get(via) {
                        Some(AttributeDescriptor::Relation(inv)) => Some(inv.attribute.clone()),
                        _ => None,
                    },
                    _ => None,
                };

                let kind = classify(&rel.attribute, inverse.as_ref());
                if target.is_none() && !rel.attribute.target.is_wildcard() {
                    debug!(
                        "{}.{}: target model '{}' not found",
                        model.uid,
                        name,
                        rel.attribute.target_name()
                    );
                }

                resolved.push((
                    i,
                    name.clone(),
                    kind,
                    target.map(|t| models[t].uid.clone()),
                    inverse,
                ));
            }
        }

        for (i, name, kind, target_uid, inverse) in resolved {
            if let Some(AttributeDescriptor::Relation(rel)) = models[i].attributes.get_mut(&name) {
                rel.relation = kind;
                rel.target_uid = target_uid;
                rel.inverse = inverse;
            }
        }
    }

    /// All models, in catalog order.
    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    /// Get a model by uid.
    pub fn get(&self, uid: &str) -> Option<&ModelDescriptor> {
        self.by_uid.get(uid).map(|&i| &self.models[i])
    }

    /// Get a model by global id (dynamic-zone discriminator).
    pub fn by_global_id(&self, global_id: &str) -> Option<&ModelDescriptor> {
        self.by_global_id.get(global_id).map(|&i| &self.models[i])
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Source collection → destination table name resolution.
///
/// After the legacy rename scripts ran, both the source collection and the
/// destination table carry the renamed name, so one lookup serves both.
#[derive(Debug, Clone, Default)]
pub struct TableNames {
    renames: BTreeMap<String, String>,
}

impl TableNames {
    pub fn new(renames: BTreeMap<String, String>) -> Self {
        Self { renames }
    }

    /// Final name of a collection.
    pub fn resolve<'a>(&'a self, collection: &'a str) -> &'a str {
        self.renames
            .get(collection)
            .map(String::as_str)
            .unwrap_or(collection)
    }

    /// Final table name of a model.
    pub fn for_model<'a>(&'a self, model: &'a ModelDescriptor) -> &'a str {
        self.resolve(&model.collection_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry(defs: &[serde_json::Value]) -> ModelRegistry {
        let defs: Vec<String> = defs.iter().map(|d| d.to_string()).collect();
        ModelRegistry::from_definitions(&defs, &MediaConfig::default()).unwrap()
    }

    fn relation<'a>(reg: &'a ModelRegistry, uid: &str, attr: &str) -> &'a Relation {
        match reg.get(uid).and_then(|m| m.attribute(attr)) {
            Some(AttributeDescriptor::Relation(rel)) => rel,
            other => panic!("{}.{} is not a relation: {:?}", uid, attr, other),
        }
    }

    #[test]
    fn test_attribute_kinds() {
        let reg = registry(&[json!({
            "uid": "application::page.page",
            "collectionName": "pages",
            "options": { "timestamps": true, "draftAndPublish": true },
            "attributes": {
                "title": { "type": "string" },
                "seo": { "type": "component", "component": "shared.seo" },
                "body": { "type": "dynamiczone", "components": ["blocks.text"] },
                "cover": { "model": "file", "via": "related", "plugin": "upload" },
                "gallery": { "collection": "file", "via": "related", "plugin": "upload" },
                "broken": {}
            }
        })]);

        let page = reg.get("application::page.page").unwrap();
        assert_eq!(page.api_name(), Some("page"));
        assert_eq!(page.timestamps, Some(Timestamps::default()));
        assert!(page.draft_and_publish);
        assert!(page.attribute("title").unwrap().is_scalar());
        assert_eq!(
            page.attribute("seo"),
            Some(&AttributeDescriptor::Component {
                component: "shared.seo".into(),
                repeatable: false
            })
        );
        assert_eq!(
            page.attribute("gallery"),
            Some(&AttributeDescriptor::Media { multiple: true })
        );
        assert_eq!(
            page.attribute("cover"),
            Some(&AttributeDescriptor::Media { multiple: false })
        );
        assert!(matches!(
            page.attribute("body"),
            Some(AttributeDescriptor::DynamicZone { .. })
        ));
        assert!(page.attribute("broken").is_none());
    }

    #[test]
    fn test_timestamp_names_from_array() {
        let reg = registry(&[json!({
            "uid": "application::post.post",
            "collectionName": "posts",
            "options": { "timestamps": ["created", "modified"] }
        })]);
        let ts = reg.get("application::post.post").unwrap().timestamps.clone();
        assert_eq!(
            ts,
            Some(Timestamps {
                created: "created".into(),
                updated: "modified".into()
            })
        );
    }

    #[test]
    fn test_relations_are_classified_against_inverse() {
        let reg = registry(&[
            json!({
                "uid": "application::article.article",
                "collectionName": "articles",
                "attributes": {
                    "author": { "model": "writer", "via": "articles" },
                    "categories": { "collection": "category", "via": "articles", "dominant": true },
                    "tags": { "collection": "tag" }
                }
            }),
            json!({
                "uid": "application::writer.writer",
                "collectionName": "writers",
                "attributes": { "articles": { "collection": "article", "via": "author" } }
            }),
            json!({
                "uid": "application::category.category",
                "collectionName": "categories",
                "attributes": { "articles": { "collection": "article", "via": "categories" } }
            }),
            json!({ "uid": "application::tag.tag", "collectionName": "tags" }),
        ]);

        let author = relation(&reg, "application::article.article", "author");
        assert_eq!(author.relation, RelationKind::ManyToOne);
        assert_eq!(author.target_uid.as_deref(), Some("application::writer.writer"));

        let writer_side = relation(&reg, "application::writer.writer", "articles");
        assert_eq!(writer_side.relation, RelationKind::OneToManyPassive);

        let categories = relation(&reg, "application::article.article", "categories");
        assert_eq!(categories.relation, RelationKind::ManyToMany);
        assert_eq!(
            categories.inverse.as_ref().map(|i| i.target_name()),
            Some("article")
        );

        let tags = relation(&reg, "application::article.article", "tags");
        assert_eq!(tags.relation, RelationKind::ManyWay);
    }

    #[test]
    fn test_target_lookup_respects_plugin() {
        let reg = registry(&[
            json!({ "uid": "strapi::user", "collectionName": "strapi_administrator" }),
            json!({
                "uid": "plugins::users-permissions.user",
                "collectionName": "users-permissions_user",
                "attributes": { "profile": { "model": "profile", "via": "user" } }
            }),
            json!({
                "uid": "application::profile.profile",
                "collectionName": "profiles",
                "attributes": {
                    "user": { "model": "user", "via": "profile", "plugin": "users-permissions" }
                }
            }),
        ]);

        let user = relation(&reg, "application::profile.profile", "user");
        assert_eq!(
            user.target_uid.as_deref(),
            Some("plugins::users-permissions.user")
        );
        assert_eq!(user.relation, RelationKind::OneToOne);
    }

    #[test]
    fn test_degraded_model_is_kept_but_not_targetable() {
        let reg = registry(&[
            json!({ "uid": "legacy::thing", "collectionName": "things" }),
            json!({
                "uid": "application::box.box",
                "collectionName": "boxes",
                "attributes": { "thing": { "model": "thing", "via": "box" } }
            }),
        ]);
        assert!(reg.get("legacy::thing").unwrap().is_degraded());
        let rel = relation(&reg, "application::box.box", "thing");
        assert_eq!(rel.target_uid, None);
        assert_eq!(rel.relation, RelationKind::Unclassified);
    }

    #[test]
    fn test_global_id_lookup() {
        let reg = registry(&[json!({
            "uid": "blocks.text",
            "collectionName": "components_blocks_texts",
            "attributes": { "body": { "type": "richtext" } }
        })]);
        let comp = reg.by_global_id("ComponentBlocksText").unwrap();
        assert!(comp.is_component());
        assert_eq!(comp.collection_name, "components_blocks_texts");
    }

    #[test]
    fn test_invalid_definition_is_catalog_error() {
        let err = ModelRegistry::from_definitions(&["{not json"], &MediaConfig::default());
        assert!(matches!(err, Err(MigrateError::Catalog(_))));
    }

    #[test]
    fn test_table_names() {
        let mut renames = BTreeMap::new();
        renames.insert("magazine-articles".to_string(), "magazine_article".to_string());
        let names = TableNames::new(renames);
        assert_eq!(names.resolve("magazine-articles"), "magazine_article");
        assert_eq!(names.resolve("tags"), "tags");
    }
}
