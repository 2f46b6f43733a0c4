//! Configuration validation.

use super::Config;
use crate::core::identifier::{validate_identifier, validate_type_name};
use crate::drivers::postgres::SslMode;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.r#type != "mongodb" {
        return Err(MigrateError::Config(format!(
            "source.type must be 'mongodb', got '{}'",
            config.source.r#type
        )));
    }
    if !config.source.uri.starts_with("mongodb://")
        && !config.source.uri.starts_with("mongodb+srv://")
    {
        return Err(MigrateError::Config(
            "source.uri must start with mongodb:// or mongodb+srv://".into(),
        ));
    }
    if config.source.database.is_empty() {
        return Err(MigrateError::Config("source.database is required".into()));
    }
    if config.source.catalog_collection.is_empty() {
        return Err(MigrateError::Config(
            "source.catalog_collection cannot be empty".into(),
        ));
    }

    // Target validation
    if config.target.r#type != "postgres" {
        return Err(MigrateError::Config(format!(
            "target.type must be 'postgres', got '{}'",
            config.target.r#type
        )));
    }
    if config.target.host.is_empty() {
        return Err(MigrateError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(MigrateError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(MigrateError::Config("target.user is required".into()));
    }
    if config.target.max_connections == 0 {
        return Err(MigrateError::Config(
            "target.max_connections must be at least 1".into(),
        ));
    }
    validate_identifier(&config.target.schema)?;
    SslMode::parse(&config.target.ssl_mode)?;

    // Migration validation
    let migration = &config.migration;
    validate_identifier(&migration.source_id_column)?;
    validate_identifier(&migration.media.link_table)?;

    for (table, columns) in &migration.dedup_join_tables {
        validate_identifier(table)?;
        for column in columns {
            validate_identifier(column)?;
        }
        if columns[0] == columns[1] {
            return Err(MigrateError::Config(format!(
                "dedup_join_tables.{}: key columns must differ",
                table
            )));
        }
    }

    for widened in &migration.widened_columns {
        validate_identifier(&widened.table)?;
        validate_identifier(&widened.column)?;
        validate_type_name(&widened.widen_to)?;
        validate_type_name(&widened.final_type)?;
        if let Some(reference) = &widened.remap_from {
            validate_identifier(reference)?;
        }
    }

    Ok(())
}
