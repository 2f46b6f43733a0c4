//! MongoDB source store.
//!
//! The client connects lazily: building a [`MongoSource`] never touches the
//! network, the first command does.

use async_trait::async_trait;
use bson::{doc, Document};
use futures::StreamExt;
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, Database};
use tracing::{debug, info, warn};

use crate::config::SourceConfig;
use crate::core::{DocumentSource, DocumentStream, SourceDocument};
use crate::error::{MigrateError, Result};

/// Field of a catalog entry holding its key.
const CATALOG_KEY_FIELD: &str = "key";
/// Field of a catalog entry holding the JSON-encoded model definition.
const CATALOG_VALUE_FIELD: &str = "value";

/// Escape regex metacharacters so a key prefix matches literally.
fn escape_regex(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if "\\^$.|?*+()[]{}".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// MongoDB document source.
pub struct MongoSource {
    client: Client,
    database: Database,
    catalog_collection: String,
}

impl MongoSource {
    /// Create a source from configuration. No connection is made yet.
    pub async fn new(config: &SourceConfig) -> Result<Self> {
        let mut options = ClientOptions::parse(&config.uri).await?;
        options.app_name = Some("mongo-pg-migrate".to_string());
        let client = Client::with_options(options)?;
        let database = client.database(&config.database);

        debug!("MongoDB source configured for database {}", config.database);

        Ok(Self {
            client,
            database,
            catalog_collection: config.catalog_collection.clone(),
        })
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.database.collection::<Document>(name)
    }
}

#[async_trait]
impl DocumentSource for MongoSource {
    async fn ping(&self) -> Result<()> {
        self.database.run_command(doc! { "ping": 1 }, None).await?;
        info!("Connected to MongoDB source: {}", self.database.name());
        Ok(())
    }

    async fn model_definitions(&self, key_prefix: &str) -> Result<Vec<String>> {
        let filter = doc! {
            CATALOG_KEY_FIELD: { "$regex": format!("^{}", escape_regex(key_prefix)) }
        };
        let mut cursor = self.collection(&self.catalog_collection).find(filter, None).await?;

        let mut definitions = Vec::new();
        while let Some(entry) = cursor.next().await {
            let entry = entry?;
            definitions.push(entry.get_str(CATALOG_VALUE_FIELD)?.to_string());
        }

        debug!(
            "Read {} catalog entries from {}",
            definitions.len(),
            self.catalog_collection
        );
        Ok(definitions)
    }

    async fn stream_collection(&self, collection: &str) -> Result<DocumentStream<'_>> {
        let cursor = self.collection(collection).find(None, None).await?;
        let collection = collection.to_string();

        Ok(cursor
            .filter_map(move |item| {
                let parsed = match item {
                    Ok(document) => match SourceDocument::from_document(document) {
                        Some(d) => Some(Ok(d)),
                        None => {
                            warn!("{}: document without usable _id skipped", collection);
                            None
                        }
                    },
                    Err(e) => Some(Err(MigrateError::from(e))),
                };
                futures::future::ready(parsed)
            })
            .boxed())
    }

    async fn count_documents(&self, collection: &str) -> Result<u64> {
        Ok(self.collection(collection).count_documents(None, None).await?)
    }

    fn db_type(&self) -> &str {
        "mongodb"
    }

    async fn close(&self) {
        self.client.clone().shutdown().await;
        debug!("MongoDB client closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_regex() {
        assert_eq!(escape_regex("model_def"), "model_def");
        assert_eq!(escape_regex("a.b*"), "a\\.b\\*");
    }

    #[tokio::test]
    async fn test_new_does_not_connect() {
        let config = SourceConfig {
            r#type: "mongodb".to_string(),
            uri: "mongodb://127.0.0.1:1".to_string(),
            database: "strapi".to_string(),
            catalog_collection: "core_store".to_string(),
            model_key_prefix: "model_def".to_string(),
        };
        let source = MongoSource::new(&config).await.unwrap();
        assert_eq!(source.db_type(), "mongodb");
    }
}
