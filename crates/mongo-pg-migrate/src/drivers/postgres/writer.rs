//! PostgreSQL target writer.
//!
//! Table and column names come from the schema catalog at run time, so
//! statements are built as text with identifiers quoted by [`quote_pg`].
//! Row values never enter statement text: they are streamed through
//! `COPY ... FROM STDIN WITH (FORMAT TEXT)`, and the server parses each field
//! into the declared column type.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use futures::SinkExt;
use tokio_postgres::{Config as PgConfig, CopyInSink};
use tracing::{debug, info};

use super::tls::SslMode;
use crate::config::TargetConfig;
use crate::core::identifier::{qualify_pg, quote_pg, validate_type_name};
use crate::core::{Row, TargetWriter};
use crate::error::{MigrateError, Result};

/// Connection timeout for new pool connections.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Rows per buffer sent down a `COPY` stream.
const COPY_CHUNK_SIZE: usize = 500;

/// Candidate pairs per composite-key lookup.
const LOOKUP_CHUNK_SIZE: usize = 1000;

/// Describe a PostgreSQL error with its server message when there is one.
fn describe(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db) => match db.detail() {
            Some(detail) => format!("{} ({})", db.message(), detail),
            None => db.message().to_string(),
        },
        None => e.to_string(),
    }
}

/// Build the `COPY` statement for rows shaped like `first`.
fn copy_statement(qualified: &str, first: &Row) -> Result<String> {
    let columns = first
        .keys()
        .map(|c| quote_pg(c))
        .collect::<Result<Vec<_>>>()?
        .join(", ");
    Ok(format!(
        "COPY {} ({}) FROM STDIN WITH (FORMAT TEXT)",
        qualified, columns
    ))
}

/// Render rows as `COPY` text lines: tab-separated fields, one row per line.
fn copy_text(rows: &[Row]) -> String {
    let mut buf = String::with_capacity(rows.len() * 128);
    for row in rows {
        for (i, value) in row.values().enumerate() {
            if i > 0 {
                buf.push('\t');
            }
            buf.push_str(&value.to_copy_text());
        }
        buf.push('\n');
    }
    buf
}

/// Split rows into runs of identical column sets, preserving order.
fn column_runs(rows: &[Row]) -> Vec<&[Row]> {
    let mut runs = Vec::new();
    let mut start = 0;
    for i in 1..=rows.len() {
        let boundary = i == rows.len() || !rows[i].keys().eq(rows[start].keys());
        if boundary {
            runs.push(&rows[start..i]);
            start = i;
        }
    }
    runs
}

/// PostgreSQL target writer backed by a deadpool connection pool.
pub struct PostgresWriter {
    pool: Pool,
    schema: String,
}

impl PostgresWriter {
    /// Build the pool. Connections are opened on first use.
    pub fn new(config: &TargetConfig) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.application_name("mongo-pg-migrate");
        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(30));
        pg_config.connect_timeout(CONNECT_TIMEOUT);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let mgr = match SslMode::parse(&config.ssl_mode)?.connector()? {
            Some(tls) => Manager::from_config(pg_config, tls, mgr_config),
            None => Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config),
        };

        let pool = Pool::builder(mgr)
            .max_size(config.max_connections)
            .build()
            .map_err(|e| MigrateError::pool(e, "creating PostgreSQL target pool"))?;

        debug!("PostgreSQL target pool configured for {}", config.display_target());

        Ok(Self {
            pool,
            schema: config.schema.clone(),
        })
    }

    async fn client(&self, context: &str) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, context))
    }

    fn qualify(&self, table: &str) -> Result<String> {
        qualify_pg(&self.schema, table)
    }

    /// Run a statement that writes into `table`, mapping failures to
    /// [`MigrateError::Write`].
    async fn execute_write(&self, table: &str, sql: &str) -> Result<u64> {
        let client = self.client("writing to PostgreSQL").await?;
        client
            .execute(sql, &[])
            .await
            .map_err(|e| MigrateError::write(table, describe(&e)))
    }

    /// Stream one run of identically shaped rows into `table`.
    async fn copy_run(&self, table: &str, qualified: &str, run: &[Row]) -> Result<u64> {
        let Some(first) = run.first() else {
            return Ok(0);
        };
        let sql = copy_statement(qualified, first)?;
        let client = self.client("copying rows into PostgreSQL").await?;

        let sink: CopyInSink<Bytes> = client
            .copy_in(sql.as_str())
            .await
            .map_err(|e| MigrateError::write(table, format!("COPY init: {}", describe(&e))))?;
        tokio::pin!(sink);

        for chunk in run.chunks(COPY_CHUNK_SIZE) {
            sink.send(Bytes::from(copy_text(chunk)))
                .await
                .map_err(|e| MigrateError::write(table, format!("COPY send: {}", describe(&e))))?;
        }

        sink.finish()
            .await
            .map_err(|e| MigrateError::write(table, format!("COPY finish: {}", describe(&e))))
    }

    async fn has_id_column(&self, table: &str) -> Result<bool> {
        let client = self.client("inspecting PostgreSQL columns").await?;
        let row = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM information_schema.columns \
                 WHERE table_schema = $1 AND table_name = $2 AND column_name = 'id')",
                &[&self.schema, &table],
            )
            .await?;
        Ok(row.get(0))
    }
}

#[async_trait]
impl TargetWriter for PostgresWriter {
    async fn ping(&self) -> Result<()> {
        let client = self.client("testing PostgreSQL target connection").await?;
        client.simple_query("SELECT 1").await?;
        info!("Connected to PostgreSQL target (schema {})", self.schema);
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let client = self.client("listing PostgreSQL tables").await?;
        let rows = client
            .query(
                "SELECT table_name::text FROM information_schema.tables \
                 WHERE table_schema = $1 AND table_type = 'BASE TABLE' \
                 ORDER BY table_name",
                &[&self.schema],
            )
            .await?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    async fn clear_table(&self, table: &str) -> Result<u64> {
        let sql = format!("DELETE FROM {}", self.qualify(table)?);
        self.execute_write(table, &sql).await
    }

    async fn alter_column_type(
        &self,
        table: &str,
        column: &str,
        sql_type: &str,
        cast: bool,
    ) -> Result<()> {
        validate_type_name(sql_type)?;
        let column_q = quote_pg(column)?;
        let mut sql = format!(
            "ALTER TABLE {} ALTER COLUMN {} TYPE {}",
            self.qualify(table)?,
            column_q,
            sql_type
        );
        if cast {
            sql.push_str(&format!(" USING {}::{}", column_q, sql_type));
        }
        debug!("{}", sql);
        self.execute_write(table, &sql).await?;
        Ok(())
    }

    async fn insert_rows(&self, table: &str, rows: &[Row]) -> Result<u64> {
        let qualified = self.qualify(table)?;
        let mut inserted = 0;
        for run in column_runs(rows) {
            inserted += self.copy_run(table, &qualified, run).await?;
        }
        Ok(inserted)
    }

    async fn update_column(&self, table: &str, id: i64, column: &str, value: i64) -> Result<u64> {
        let sql = format!(
            "UPDATE {} SET {} = {} WHERE \"id\" = {}",
            self.qualify(table)?,
            quote_pg(column)?,
            value,
            id
        );
        self.execute_write(table, &sql).await
    }

    async fn exists_with(&self, table: &str, column: &str, value: i64) -> Result<bool> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE {} = {})",
            self.qualify(table)?,
            quote_pg(column)?,
            value
        );
        let client = self.client("checking existing relation").await?;
        let row = client.query_one(sql.as_str(), &[]).await?;
        Ok(row.get(0))
    }

    async fn existing_pairs(
        &self,
        table: &str,
        columns: (&str, &str),
        candidates: &[(i64, i64)],
    ) -> Result<HashSet<(i64, i64)>> {
        let mut existing = HashSet::new();
        if candidates.is_empty() {
            return Ok(existing);
        }

        let qualified = self.qualify(table)?;
        let a = quote_pg(columns.0)?;
        let b = quote_pg(columns.1)?;
        let client = self.client("looking up existing join rows").await?;

        for chunk in candidates.chunks(LOOKUP_CHUNK_SIZE) {
            let tuples = chunk
                .iter()
                .map(|(x, y)| format!("({}, {})", x, y))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "SELECT {a}::int8, {b}::int8 FROM {qualified} WHERE ({a}, {b}) IN ({tuples})"
            );
            for row in client.query(sql.as_str(), &[]).await? {
                existing.insert((row.get(0), row.get(1)));
            }
        }

        Ok(existing)
    }

    async fn remap_column(
        &self,
        table: &str,
        column: &str,
        reference_table: &str,
        source_id_column: &str,
    ) -> Result<u64> {
        let column_q = quote_pg(column)?;
        let sql = format!(
            "UPDATE {table_q} AS t SET {column_q} = (\
                SELECT r.\"id\"::text FROM {reference_q} AS r \
                WHERE replace(r.{source_q}::text, chr(34), '') = replace(t.{column_q}, chr(34), '') \
                LIMIT 1) \
             WHERE t.{column_q} IS NOT NULL",
            table_q = self.qualify(table)?,
            reference_q = self.qualify(reference_table)?,
            source_q = quote_pg(source_id_column)?,
        );
        self.execute_write(table, &sql).await
    }

    async fn max_id(&self, table: &str) -> Result<Option<i64>> {
        if !self.has_id_column(table).await? {
            return Ok(None);
        }
        let sql = format!("SELECT MAX(\"id\")::int8 FROM {}", self.qualify(table)?);
        let client = self.client("reading max id").await?;
        let row = client.query_one(sql.as_str(), &[]).await?;
        Ok(row.get(0))
    }

    async fn restart_sequence(&self, sequence: &str, next_value: i64) -> Result<()> {
        let sql = format!(
            "ALTER SEQUENCE {} RESTART WITH {}",
            self.qualify(sequence)?,
            next_value
        );
        self.execute_write(sequence, &sql).await?;
        Ok(())
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.qualify(table)?);
        let client = self.client("counting rows").await?;
        let row = client.query_one(sql.as_str(), &[]).await?;
        Ok(row.get(0))
    }

    fn db_type(&self) -> &str {
        "postgres"
    }

    async fn close(&self) {
        self.pool.close();
        debug!("PostgreSQL pool closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SqlValue;

    fn row(pairs: &[(&str, SqlValue)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_copy_statement_lists_columns() {
        let first = row(&[("article_id", SqlValue::I64(7)), ("tag_id", SqlValue::I64(3))]);
        let sql = copy_statement("\"public\".\"articles__tags\"", &first).unwrap();
        assert_eq!(
            sql,
            "COPY \"public\".\"articles__tags\" (\"article_id\", \"tag_id\") \
             FROM STDIN WITH (FORMAT TEXT)"
        );
    }

    #[test]
    fn test_copy_text_lines() {
        let rows = vec![
            row(&[("id", SqlValue::I64(1)), ("title", SqlValue::Text("O'Hara".into()))]),
            row(&[("id", SqlValue::I64(2)), ("title", SqlValue::Null)]),
        ];
        assert_eq!(copy_text(&rows), "1\tO'Hara\n2\t\\N\n");
    }

    #[test]
    fn test_copy_text_keeps_backslashes_inside_the_field() {
        let rows = vec![row(&[
            ("id", SqlValue::I64(1)),
            ("body", SqlValue::Text("\\'); DROP TABLE articles; --\tx\ny".into())),
        ])];
        let text = copy_text(&rows);
        assert_eq!(text, "1\t\\\\'); DROP TABLE articles; --\\tx\\ny\n");
        assert_eq!(text.matches('\t').count(), 1);
        assert_eq!(text.matches('\n').count(), 1);
        assert!(copy_text(&[]).is_empty());
    }

    #[test]
    fn test_column_runs_split_on_shape_change() {
        let rows = vec![
            row(&[("id", SqlValue::I64(1))]),
            row(&[("id", SqlValue::I64(2))]),
            row(&[("id", SqlValue::I64(3)), ("title", SqlValue::Null)]),
            row(&[("id", SqlValue::I64(4))]),
        ];
        let runs: Vec<usize> = column_runs(&rows).iter().map(|r| r.len()).collect();
        assert_eq!(runs, vec![2, 1, 1]);
        assert!(column_runs(&[]).is_empty());
    }

    #[tokio::test]
    async fn test_new_does_not_connect() {
        let config = TargetConfig {
            r#type: "postgres".to_string(),
            host: "127.0.0.1".to_string(),
            port: 1,
            database: "strapi".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            schema: "public".to_string(),
            ssl_mode: "disable".to_string(),
            max_connections: 2,
        };
        let writer = PostgresWriter::new(&config).unwrap();
        assert_eq!(writer.db_type(), "postgres");
    }
}
