//! Error types for the migration library.

use thiserror::Error;

/// Exit code for configuration errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for source store errors.
pub const EXIT_SOURCE_ERROR: u8 = 2;
/// Exit code for target store errors.
pub const EXIT_TARGET_ERROR: u8 = 3;
/// Exit code for rejected writes.
pub const EXIT_WRITE_ERROR: u8 = 4;
/// Exit code for unreadable schema catalog entries.
pub const EXIT_CATALOG_ERROR: u8 = 5;
/// Exit code for file system errors.
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source (MongoDB) connection or query error
    #[error("Source database error: {0}")]
    Source(#[from] mongodb::error::Error),

    /// Target (PostgreSQL) connection or query error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// A schema catalog entry could not be decoded
    #[error("Schema catalog error: {0}")]
    Catalog(String),

    /// A destination table does not exist in the target schema
    #[error("Table not found in target schema: {0}")]
    MissingTable(String),

    /// A write into a destination table was rejected
    #[error("Write failed for table {table}: {message}")]
    Write { table: String, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// BSON value access error
    #[error("BSON error: {0}")]
    Bson(#[from] bson::document::ValueAccessError),
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Write error
    pub fn write(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Write {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Process exit code for this error class.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => EXIT_CONFIG_ERROR,
            MigrateError::Source(_) | MigrateError::Bson(_) => EXIT_SOURCE_ERROR,
            MigrateError::Target(_) | MigrateError::Pool { .. } | MigrateError::MissingTable(_) => {
                EXIT_TARGET_ERROR
            }
            MigrateError::Write { .. } => EXIT_WRITE_ERROR,
            MigrateError::Catalog(_) | MigrateError::Json(_) => EXIT_CATALOG_ERROR,
            MigrateError::Io(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
