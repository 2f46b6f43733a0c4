//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{MigrateError, Result};

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl MigrationConfig {
    /// Resolve the collection rename table.
    ///
    /// Entries from `collection_renames_file` are loaded first, then the
    /// inline `collection_renames` are applied on top.
    pub fn resolve_renames(&self) -> Result<BTreeMap<String, String>> {
        let mut renames = BTreeMap::new();

        if let Some(path) = &self.collection_renames_file {
            let content = std::fs::read_to_string(path)?;
            let from_file: BTreeMap<String, String> = serde_json::from_str(&content)
                .map_err(|e| {
                    MigrateError::Config(format!(
                        "collection_renames_file {:?} is not a JSON object of strings: {}",
                        path, e
                    ))
                })?;
            renames.extend(from_file);
        }

        renames.extend(
            self.collection_renames
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        Ok(renames)
    }
}

impl TargetConfig {
    /// Human-readable target description without credentials.
    pub fn display_target(&self) -> String {
        format!(
            "{}:{}/{} (schema {})",
            self.host, self.port, self.database, self.schema
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
source:
  uri: mongodb://localhost:27017
  database: strapi
target:
  host: localhost
  database: strapi_sql
  user: postgres
  password: secret
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.source.catalog_collection, "core_store");
        assert_eq!(config.source.model_key_prefix, "model_def");
        assert_eq!(config.target.port, 5432);
        assert_eq!(config.target.schema, "public");
        assert_eq!(config.migration.source_id_column, "mongoid");
        assert_eq!(config.migration.media.link_table, "upload_file_morph");
        assert!(config
            .migration
            .skip_source_id_tables
            .contains(&"core_store".to_string()));
    }

    #[test]
    fn test_migration_section_overrides() {
        let yaml = format!(
            "{}{}",
            MINIMAL,
            r#"
migration:
  collection_renames:
    magazine-articles: magazine_article
  column_defaults:
    membership_payments:
      transection_id: 0
  relation_duplicates:
    user_profiles: user
  dedup_join_tables:
    pages__links: [page_id, link_id]
  widened_columns:
    - table: memberships
      column: membership_plan
      final_type: integer
      remap_from: membership_plans
"#
        );
        let config = Config::from_yaml(&yaml).unwrap();
        let m = &config.migration;
        assert_eq!(m.collection_renames["magazine-articles"], "magazine_article");
        assert_eq!(m.column_defaults["membership_payments"]["transection_id"], 0);
        assert_eq!(m.relation_duplicates["user_profiles"], "user");
        assert_eq!(m.dedup_join_tables["pages__links"][1], "link_id");
        assert_eq!(m.widened_columns[0].widen_to, "text");
        assert_eq!(m.widened_columns[0].remap_from.as_deref(), Some("membership_plans"));
        // Unset fields in a partial section keep their defaults
        assert_eq!(m.source_id_column, "mongoid");
    }

    #[test]
    fn test_resolve_renames_inline_wins() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"a": "from_file", "b": "only_file"}}"#).unwrap();

        let mut config = Config::from_yaml(MINIMAL).unwrap();
        config.migration.collection_renames_file = Some(file.path().to_path_buf());
        config
            .migration
            .collection_renames
            .insert("a".to_string(), "inline".to_string());

        let renames = config.migration.resolve_renames().unwrap();
        assert_eq!(renames["a"], "inline");
        assert_eq!(renames["b"], "only_file");
    }

    #[test]
    fn test_resolve_renames_rejects_non_object() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[1, 2, 3]").unwrap();

        let mut config = Config::from_yaml(MINIMAL).unwrap();
        config.migration.collection_renames_file = Some(file.path().to_path_buf());
        assert!(matches!(
            config.migration.resolve_renames(),
            Err(MigrateError::Config(_))
        ));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        assert!(matches!(
            Config::load("does/not/exist.yaml"),
            Err(MigrateError::Io(_))
        ));
    }
}
