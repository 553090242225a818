//! Ask command handler.
//!
//! Answers a single question against the configured index.

use super::build_pipeline;
use clap::Args;
use docrag_core::config::AppConfig;
use docrag_core::{AppError, AppResult};
use std::path::PathBuf;

/// Ask a single question against the index
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: Option<String>,

    /// Read the question from a file
    #[arg(short, long, conflicts_with = "question")]
    pub file: Option<PathBuf>,

    /// Split compound questions into sub-queries before retrieval
    #[arg(long)]
    pub decompose: bool,

    /// Add paraphrase variations of each query before retrieval
    #[arg(long)]
    pub fan_out: bool,

    /// Evidence entries to keep after reranking and merging
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Print the source citations after the answer
    #[arg(short, long)]
    pub sources: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let question = self.get_question()?;

        // Per-invocation retrieval overrides
        let mut config = config.clone();
        if self.decompose {
            config.retrieval.use_decomposition = true;
        }
        if self.fan_out {
            config.retrieval.use_fan_out = true;
        }
        if let Some(top_k) = self.top_k {
            config.retrieval.top_k_rerank = top_k;
        }

        let pipeline = build_pipeline(&config)?;

        let outcome = pipeline.session.retrieve(&question).await?;
        tracing::debug!(
            queries = outcome.executed_queries.len(),
            results = outcome.results.len(),
            "Retrieval finished"
        );

        let result = pipeline
            .generator
            .generate_with_sources(&question, &outcome.results, &[])
            .await?;

        if self.json {
            let output = serde_json::json!({
                "question": question,
                "resolvedQuery": outcome.resolved_query,
                "executedQueries": outcome.executed_queries,
                "answer": result.answer,
                "sources": result.sources,
                "numSources": result.sources.len(),
            });
            let json = serde_json::to_string_pretty(&output)
                .map_err(|e| AppError::Serialization(e.to_string()))?;
            println!("{}", json);
        } else {
            println!("{}", result.answer);

            if self.sources && !result.sources.is_empty() {
                println!("\nSources:");
                for source in &result.sources {
                    let page = source
                        .metadata
                        .get("page")
                        .and_then(|v| v.as_i64())
                        .map(|p| format!("page {}", p))
                        .unwrap_or_else(|| "page ?".to_string());
                    println!(
                        "  [{}] ({}, score {:.3}) {}",
                        source.rank, page, source.rerank_score, source.text_preview
                    );
                }
            }
        }

        Ok(())
    }

    /// Get the question text from the positional argument or a file.
    fn get_question(&self) -> AppResult<String> {
        if let Some(ref question) = self.question {
            return Ok(question.clone());
        }

        if let Some(ref path) = self.file {
            return std::fs::read_to_string(path)
                .map(|s| s.trim().to_string())
                .map_err(|e| {
                    AppError::Config(format!("Failed to read question file {:?}: {}", path, e))
                });
        }

        Err(AppError::InvalidInput("No question provided".to_string()))
    }
}
