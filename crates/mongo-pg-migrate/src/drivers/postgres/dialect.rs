//! PostgreSQL migration hooks.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::core::{Dialect, TargetWriter};
use crate::error::Result;

/// Longest table prefix kept in a serial sequence name.
///
/// PostgreSQL truncates identifiers to 63 bytes and the generated sequence
/// of a serial `id` column ends in `_id_seq`.
const SEQUENCE_PREFIX_LEN: usize = 56;

/// Name of the sequence behind the serial `id` column of `table`.
pub fn id_sequence_name(table: &str) -> String {
    let mut end = table.len().min(SEQUENCE_PREFIX_LEN);
    while !table.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}_id_seq", &table[..end])
}

/// PostgreSQL dialect: the default clear-all, and sequence resync after the
/// run.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    /// Restart every table's id sequence at `max(id) + 1`.
    ///
    /// Explicit ids were inserted during the run, so the sequences still
    /// point at 1. Empty tables and tables without an `id` column are left
    /// alone; a sequence that cannot be restarted is logged and skipped.
    async fn after_migration(&self, target: &dyn TargetWriter) -> Result<()> {
        let mut restarted = 0;
        for table in target.list_tables().await? {
            let Some(max) = target.max_id(&table).await? else {
                continue;
            };
            let sequence = id_sequence_name(&table);
            match target.restart_sequence(&sequence, max + 1).await {
                Ok(()) => {
                    debug!("{} restarted at {}", sequence, max + 1);
                    restarted += 1;
                }
                Err(e) => warn!("Could not restart sequence {}: {}", sequence, e),
            }
        }
        info!("Restarted {} id sequences", restarted);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Row, SqlValue};
    use crate::memory::MemoryTarget;

    #[test]
    fn test_sequence_name_truncation() {
        assert_eq!(id_sequence_name("articles"), "articles_id_seq");
        let long = "components_custom_pages_components_recommended_readings__magazine_article_links";
        let name = id_sequence_name(long);
        assert_eq!(name, format!("{}_id_seq", &long[..56]));
        assert!(name.len() <= 63);
    }

    #[tokio::test]
    async fn test_after_migration_restarts_non_empty_tables() {
        let row: Row = [("id".to_string(), SqlValue::I64(41))].into_iter().collect();
        let target = MemoryTarget::with_tables(&["empty"]).with_rows("articles", vec![row]);

        PostgresDialect::new().after_migration(&target).await.unwrap();

        assert_eq!(target.sequence("articles_id_seq").await, Some(42));
        assert_eq!(target.sequence("empty_id_seq").await, None);
    }

    #[tokio::test]
    async fn test_clear_all_tables_uses_default() {
        let row: Row = [("id".to_string(), SqlValue::I64(1))].into_iter().collect();
        let target = MemoryTarget::new().with_rows("tags", vec![row]);

        let cleared = PostgresDialect::new().clear_all_tables(&target).await.unwrap();
        assert_eq!(cleared, vec!["tags".to_string()]);
        assert_eq!(target.row_count("tags").await.unwrap(), 0);
    }
}
