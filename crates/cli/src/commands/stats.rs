//! Stats command handler.
//!
//! Shows document-store statistics for the configured index.

use clap::Args;
use docrag_core::config::AppConfig;
use docrag_core::{AppError, AppResult};
use docrag_retrieval::store::{ElasticStore, SearchBackend};

/// Show index statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing stats command");

        let store = ElasticStore::new(&config.elasticsearch)?;
        let documents = store.count().await?;

        if self.json {
            let output = serde_json::json!({
                "index": config.elasticsearch.index,
                "url": config.elasticsearch.url,
                "documents": documents,
            });
            let json = serde_json::to_string_pretty(&output)
                .map_err(|e| AppError::Serialization(e.to_string()))?;
            println!("{}", json);
        } else {
            println!("Index:     {}", config.elasticsearch.index);
            println!("Store:     {}", config.elasticsearch.url);
            println!("Documents: {}", documents);
        }

        Ok(())
    }
}
