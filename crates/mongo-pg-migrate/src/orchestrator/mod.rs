//! Migration orchestrator - main workflow coordinator.
//!
//! A run is strictly sequential:
//!
//! 1. widen the configured columns
//! 2. connect to both stores
//! 3. load the model registry
//! 4. clear the destination and run the pre-migration hook
//! 5. pass 1: one row per source document
//! 6. pass 2: components, media and relations
//! 7. run the post-migration hook
//! 8. remap and tighten the widened columns
//! 9. close both stores, whatever happened before

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::core::{Dialect, DocumentSource, Row, TargetWriter};
use crate::drivers::{DialectImpl, PostgresWriter};
use crate::error::Result;
use crate::idmap::IdMap;
use crate::link::{LinkStats, LinkWriter};
use crate::memory::MemoryTarget;
use crate::model::{ModelRegistry, TableNames};
use crate::source::MongoSource;
use crate::transform::RowTransformer;

/// Pass-1 rows buffered before an insert.
const ROW_BATCH_SIZE: usize = 500;

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    source: Arc<dyn DocumentSource>,
    target: Arc<dyn TargetWriter>,
    dialect: DialectImpl,
    dry_run: bool,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: String,

    /// Whether the run wrote into an in-memory target only.
    pub dry_run: bool,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Model definitions read from the catalog.
    pub models_loaded: usize,

    /// Destination tables filled by pass 1.
    pub tables_migrated: usize,

    /// Rows inserted by pass 1.
    pub rows_inserted: u64,

    /// Rows inserted per destination table by pass 1.
    pub table_rows: BTreeMap<String, u64>,

    /// Link rows inserted by pass 2.
    pub link_rows: u64,

    /// Foreign-key columns set by pass 2.
    pub foreign_keys: u64,

    /// Link targets dropped because they never received an id.
    pub dangling: u64,

    /// Fields skipped because their owning document had no id.
    pub parent_misses: u64,

    /// Links skipped because they were already present.
    pub duplicates_skipped: u64,

    /// Models skipped because their table was already processed.
    pub skipped_tables: Vec<String>,
}

/// Result of a connectivity check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    pub target_error: Option<String>,
    pub healthy: bool,
}

/// Row counts of one table after a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableValidation {
    pub source_documents: i64,
    pub target_rows: i64,
    pub matches: bool,
}

/// Counters accumulated across the steps of one run.
#[derive(Debug, Default)]
struct RunStats {
    models_loaded: usize,
    table_rows: BTreeMap<String, u64>,
    links: LinkStats,
    skipped_tables: Vec<String>,
}

impl Orchestrator {
    /// Create an orchestrator over MongoDB and PostgreSQL.
    ///
    /// Neither store is contacted until the first command.
    pub async fn new(config: Config) -> Result<Self> {
        let source = MongoSource::new(&config.source).await?;
        let target = PostgresWriter::new(&config.target)?;
        Self::with_stores(config, Arc::new(source), Arc::new(target))
    }

    /// Create an orchestrator that reads MongoDB and writes into memory.
    pub async fn dry_run(config: Config) -> Result<Self> {
        let source = MongoSource::new(&config.source).await?;
        let mut orchestrator =
            Self::with_stores(config, Arc::new(source), Arc::new(MemoryTarget::new()))?;
        orchestrator.dry_run = true;
        Ok(orchestrator)
    }

    /// Create an orchestrator over arbitrary stores.
    pub fn with_stores(
        config: Config,
        source: Arc<dyn DocumentSource>,
        target: Arc<dyn TargetWriter>,
    ) -> Result<Self> {
        let dialect = DialectImpl::from_db_type(&config.target.r#type)?;
        Ok(Self {
            config,
            source,
            target,
            dialect,
            dry_run: false,
        })
    }

    /// Run the migration.
    ///
    /// Both stores are closed before this returns, on success and on error.
    pub async fn run(self) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();

        info!(
            "Starting migration run {}: {} -> {}{}",
            run_id,
            self.source.db_type(),
            self.target.db_type(),
            if self.dry_run { " (dry run)" } else { "" }
        );

        let mut stats = RunStats::default();
        let outcome = self.execute(&mut stats).await;

        info!("Phase 9: Closing connections");
        self.close().await;

        outcome?;

        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

        let result = MigrationResult {
            run_id,
            status: "completed".to_string(),
            dry_run: self.dry_run,
            duration_seconds: duration,
            started_at,
            completed_at,
            models_loaded: stats.models_loaded,
            tables_migrated: stats.table_rows.len(),
            rows_inserted: stats.table_rows.values().sum(),
            table_rows: stats.table_rows,
            link_rows: stats.links.link_rows,
            foreign_keys: stats.links.foreign_keys,
            dangling: stats.links.dangling,
            parent_misses: stats.links.parent_misses,
            duplicates_skipped: stats.links.duplicates_skipped,
            skipped_tables: stats.skipped_tables,
        };

        info!(
            "Migration {}: {} tables, {} rows, {} links, {} foreign keys in {:.1}s",
            result.status,
            result.tables_migrated,
            result.rows_inserted,
            result.link_rows,
            result.foreign_keys,
            result.duration_seconds
        );
        if result.dangling > 0 || result.parent_misses > 0 {
            warn!(
                "{} dangling references dropped, {} fields without a parent id",
                result.dangling, result.parent_misses
            );
        }

        Ok(result)
    }

    /// Steps 1 to 8. Any error aborts the remaining steps.
    async fn execute(&self, stats: &mut RunStats) -> Result<()> {
        let migration = &self.config.migration;
        let target: &dyn TargetWriter = self.target.as_ref();

        info!("Phase 1: Widening {} columns", migration.widened_columns.len());
        for widened in &migration.widened_columns {
            debug!(
                "{}.{}: widening to {}",
                widened.table, widened.column, widened.widen_to
            );
            target
                .alter_column_type(&widened.table, &widened.column, &widened.widen_to, false)
                .await?;
        }

        info!("Phase 2: Connecting to source and target");
        self.source.ping().await?;
        target.ping().await?;

        info!("Phase 3: Loading models");
        let registry = ModelRegistry::load(
            self.source.as_ref(),
            &self.config.source.model_key_prefix,
            &migration.media,
        )
        .await?;
        stats.models_loaded = registry.len();
        for model in registry.models().iter().filter(|m| m.is_degraded()) {
            warn!(
                "Model '{}' has an unrecognised uid, its relations will not resolve",
                model.uid
            );
        }
        let tables = TableNames::new(migration.resolve_renames()?);

        info!("Phase 4: Preparing target ({})", self.dialect.name());
        let cleared = self.dialect.clear_all_tables(target).await?;
        info!("Cleared {} tables", cleared.len());
        self.dialect.before_migration(target).await?;

        info!("Phase 5: Copying documents");
        let mut ids = IdMap::new();
        self.copy_rows(&registry, &tables, &mut ids, stats).await?;
        info!("{} source ids mapped", ids.len());

        info!("Phase 6: Writing links");
        stats.links = self.write_links(&registry, &tables, &mut ids).await?;

        info!("Phase 7: Finalizing target ({})", self.dialect.name());
        self.dialect.after_migration(target).await?;

        info!("Phase 8: Tightening widened columns");
        for widened in &migration.widened_columns {
            if let Some(reference) = &widened.remap_from {
                let remapped = target
                    .remap_column(
                        &widened.table,
                        &widened.column,
                        reference,
                        &migration.source_id_column,
                    )
                    .await?;
                debug!(
                    "{}.{}: {} values remapped through {}",
                    widened.table, widened.column, remapped, reference
                );
            }
            target
                .alter_column_type(&widened.table, &widened.column, &widened.final_type, true)
                .await?;
        }

        Ok(())
    }

    /// Pass 1: stream every collection once and insert one row per
    /// document.
    async fn copy_rows(
        &self,
        registry: &ModelRegistry,
        tables: &TableNames,
        ids: &mut IdMap,
        stats: &mut RunStats,
    ) -> Result<()> {
        let transformer = RowTransformer::new(&self.config.migration);
        let mut completed = HashSet::new();

        for model in registry.models() {
            let table = tables.for_model(model);
            if !completed.insert(table.to_string()) {
                info!(
                    "{}: table {} already migrated, skipping model",
                    model.uid, table
                );
                stats.skipped_tables.push(table.to_string());
                continue;
            }

            let started = Instant::now();
            let mut inserted = 0;
            let mut batch: Vec<Row> = Vec::with_capacity(ROW_BATCH_SIZE);
            let mut documents = self.source.stream_collection(table).await?;

            while let Some(document) = documents.try_next().await? {
                let id = ids.allocate(&document.id, table);
                batch.push(transformer.transform(&document, model, table, id));
                if batch.len() >= ROW_BATCH_SIZE {
                    inserted += self.target.insert_rows(table, &batch).await?;
                    batch.clear();
                }
            }
            if !batch.is_empty() {
                inserted += self.target.insert_rows(table, &batch).await?;
            }

            debug!(
                "{}: {} rows in {:.2}s",
                table,
                inserted,
                started.elapsed().as_secs_f64()
            );
            stats.table_rows.insert(table.to_string(), inserted);
        }

        Ok(())
    }

    /// Pass 2: stream every collection again and write its links.
    async fn write_links(
        &self,
        registry: &ModelRegistry,
        tables: &TableNames,
        ids: &mut IdMap,
    ) -> Result<LinkStats> {
        let mut writer = LinkWriter::new(
            registry,
            tables,
            &self.config.migration,
            self.target.as_ref(),
        );
        let mut completed = HashSet::new();

        for model in registry.models() {
            let table = tables.for_model(model);
            if !completed.insert(table) {
                continue;
            }

            let before = writer.stats().link_rows + writer.stats().foreign_keys;
            let mut documents = self.source.stream_collection(table).await?;
            while let Some(document) = documents.try_next().await? {
                writer.write_document(ids, &document, model, table).await?;
            }
            let written = writer.stats().link_rows + writer.stats().foreign_keys - before;
            if written > 0 {
                debug!("{}: {} links written", table, written);
            }
        }

        Ok(writer.into_stats())
    }

    /// Load and classify the model registry without writing anything.
    pub async fn inspect(&self) -> Result<ModelRegistry> {
        self.source.ping().await?;
        ModelRegistry::load(
            self.source.as_ref(),
            &self.config.source.model_key_prefix,
            &self.config.migration.media,
        )
        .await
    }

    /// Compare each collection's document count with its table's row count.
    pub async fn validate(&self) -> Result<BTreeMap<String, TableValidation>> {
        let registry = self.inspect().await?;
        let tables = TableNames::new(self.config.migration.resolve_renames()?);
        let mut results = BTreeMap::new();

        for model in registry.models() {
            let table = tables.for_model(model);
            if results.contains_key(table) {
                continue;
            }

            let source_documents = self.source.count_documents(table).await? as i64;
            let target_rows = self.target.row_count(table).await?;
            let matches = source_documents == target_rows;

            if matches {
                info!("{}: {} rows (match)", table, source_documents);
            } else {
                warn!(
                    "{}: source={} target={} (MISMATCH)",
                    table, source_documents, target_rows
                );
            }

            results.insert(
                table.to_string(),
                TableValidation {
                    source_documents,
                    target_rows,
                    matches,
                },
            );
        }

        Ok(results)
    }

    /// Ping both stores and measure their latency.
    pub async fn health_check(&self) -> Result<HealthCheckResult> {
        let started = Instant::now();
        let source = self.source.ping().await;
        let source_latency_ms = started.elapsed().as_millis() as u64;

        let started = Instant::now();
        let target = self.target.ping().await;
        let target_latency_ms = started.elapsed().as_millis() as u64;

        let healthy = source.is_ok() && target.is_ok();
        Ok(HealthCheckResult {
            source_connected: source.is_ok(),
            source_latency_ms,
            source_error: source.err().map(|e| e.to_string()),
            target_connected: target.is_ok(),
            target_latency_ms,
            target_error: target.err().map(|e| e.to_string()),
            healthy,
        })
    }

    /// Release both stores.
    pub async fn close(&self) {
        self.source.close().await;
        self.target.close().await;
    }
}

impl MigrationResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
