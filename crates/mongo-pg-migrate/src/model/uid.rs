//! Namespace reconstruction from encoded model uids.
//!
//! Uids come in four shapes:
//!
//! | uid                              | namespace          | model name |
//! |----------------------------------|--------------------|------------|
//! | `shared.seo`                     | component          | `seo`      |
//! | `strapi::user`                   | plugin `admin`     | `user`     |
//! | `plugins::upload.file`           | plugin `upload`    | `file`     |
//! | `application::article.article`   | api `article`      | `article`  |

use serde::Serialize;

use crate::naming::pascal_case;

/// Separator between the namespace prefix and the rest of a uid.
pub const NAMESPACE_SEPARATOR: &str = "::";

const SYSTEM_PREFIX: &str = "strapi";
const PLUGIN_PREFIX: &str = "plugins";
const APPLICATION_PREFIX: &str = "application";

/// Namespace a model belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Namespace {
    /// Embeddable component (no namespace separator).
    Component,
    /// Plugin-owned model; system models map to the `admin` plugin.
    Plugin(String),
    /// Application (api) model.
    Api(String),
    /// Uid matched none of the known shapes.
    Unknown,
}

/// Result of parsing a model uid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUid {
    /// Namespace of the model.
    pub namespace: Namespace,
    /// Model name, when the uid carries one.
    pub model_name: Option<String>,
}

impl ParsedUid {
    /// Plugin name, for plugin (and system) models.
    pub fn plugin(&self) -> Option<&str> {
        match &self.namespace {
            Namespace::Plugin(p) => Some(p),
            _ => None,
        }
    }

    /// Api name, for application models.
    pub fn api_name(&self) -> Option<&str> {
        match &self.namespace {
            Namespace::Api(a) => Some(a),
            _ => None,
        }
    }
}

/// Parse a model uid into its namespace and model name.
pub fn parse_uid(uid: &str) -> ParsedUid {
    let Some((prefix, rest)) = uid.split_once(NAMESPACE_SEPARATOR) else {
        return ParsedUid {
            namespace: Namespace::Component,
            model_name: uid.split('.').nth(1).map(str::to_string),
        };
    };

    if prefix == SYSTEM_PREFIX {
        return ParsedUid {
            namespace: Namespace::Plugin("admin".to_string()),
            model_name: Some(rest.to_string()),
        };
    }

    let dotted = rest.split_once('.');
    match (prefix, dotted) {
        (p, Some((owner, model))) if p.starts_with(PLUGIN_PREFIX) => ParsedUid {
            namespace: Namespace::Plugin(owner.to_string()),
            model_name: Some(model.to_string()),
        },
        (p, Some((owner, model))) if p.starts_with(APPLICATION_PREFIX) => ParsedUid {
            namespace: Namespace::Api(owner.to_string()),
            model_name: Some(model.to_string()),
        },
        _ => ParsedUid {
            namespace: Namespace::Unknown,
            model_name: None,
        },
    }
}

/// Global id used as the discriminator tag of dynamic-zone values.
///
/// Components always get a synthesized `Component…` id; other models keep
/// their stored id or fall back to PascalCase of `{plugin}-{model}`.
pub fn global_id(parsed: &ParsedUid, uid: &str, stored: Option<&str>) -> String {
    if parsed.namespace == Namespace::Component {
        return pascal_case(&format!("component_{}", uid));
    }

    if let Some(stored) = stored.filter(|s| !s.is_empty()) {
        return stored.to_string();
    }

    let base = parsed.model_name.as_deref().unwrap_or(uid);
    match parsed.plugin() {
        Some(plugin) => pascal_case(&format!("{}-{}", plugin, base)),
        None => pascal_case(base),
    }
}
