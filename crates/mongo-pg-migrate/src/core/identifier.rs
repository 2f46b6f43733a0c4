//! Identifier validation and quoting for dynamically built SQL.
//!
//! Destination table and column names are derived at run time from the
//! schema catalog (collection names, attribute names, join-table naming
//! rules), so they can never be bound as statement parameters. Every name
//! that reaches a SQL string goes through [`quote_pg`] first.

use crate::error::{MigrateError, Result};

/// PostgreSQL truncates identifiers at 63 bytes; anything longer than this
/// limit is treated as a malformed name rather than silently truncated.
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier before it is embedded in SQL.
///
/// Rejects empty names, names containing null bytes and names exceeding
/// [`MAX_IDENTIFIER_LENGTH`].
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier, doubling embedded double quotes.
///
/// ```ignore
/// assert_eq!(quote_pg("users")?, "\"users\"");
/// assert_eq!(quote_pg("magazine-article")?, "\"magazine-article\"");
/// ```
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Qualify a PostgreSQL table name with its schema.
pub fn qualify_pg(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_pg(schema)?, quote_pg(table)?))
}

/// Validate a SQL type name taken from configuration (`text`, `integer`,
/// `varchar(255)`, `double precision`, ...).
pub fn validate_type_name(type_name: &str) -> Result<()> {
    let ok = !type_name.trim().is_empty()
        && type_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '(' | ')' | ','));

    if ok {
        Ok(())
    } else {
        Err(MigrateError::Config(format!(
            "SECURITY: Invalid column type name: {:?}",
            type_name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier_normal() {
        assert!(validate_identifier("users").is_ok());
        assert!(validate_identifier("magazine-article").is_ok());
        assert!(validate_identifier("articles__tags").is_ok());
        assert!(validate_identifier("日本語").is_ok());
    }

    #[test]
    fn test_validate_identifier_rejects_empty() {
        let result = validate_identifier("");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("empty"));
    }

    #[test]
    fn test_validate_identifier_rejects_null_byte() {
        let result = validate_identifier("table\0name");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("null byte"));
    }

    #[test]
    fn test_validate_identifier_rejects_too_long() {
        let long_name = "a".repeat(MAX_IDENTIFIER_LENGTH + 1);
        let result = validate_identifier(&long_name);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("maximum length"));
    }

    #[test]
    fn test_quote_pg_escapes_double_quote() {
        assert_eq!(quote_pg("users").unwrap(), "\"users\"");
        assert_eq!(quote_pg("table\"name").unwrap(), "\"table\"\"name\"");
    }

    #[test]
    fn test_quote_pg_sql_injection_safely_quoted() {
        let result = quote_pg("Robert'); DROP TABLE Students;--");
        assert_eq!(result.unwrap(), "\"Robert'); DROP TABLE Students;--\"");
    }

    #[test]
    fn test_qualify_pg() {
        assert_eq!(
            qualify_pg("public", "upload_file_morph").unwrap(),
            "\"public\".\"upload_file_morph\""
        );
    }

    #[test]
    fn test_validate_type_name() {
        assert!(validate_type_name("text").is_ok());
        assert!(validate_type_name("double precision").is_ok());
        assert!(validate_type_name("varchar(255)").is_ok());
        assert!(validate_type_name("integer; DROP TABLE x").is_err());
        assert!(validate_type_name("").is_err());
    }
}
