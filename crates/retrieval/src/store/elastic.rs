//! Elasticsearch search backend.
//!
//! Speaks the `_search` API directly over HTTP: a bool/should fuzzy match
//! for the lexical mode and a `script_score` cosine similarity query for
//! the vector mode. The `+ 1.0` in the script keeps scores non-negative,
//! which Elasticsearch requires of script scores.

use crate::store::SearchBackend;
use crate::types::{ContentType, Document, RankedHit};
use docrag_core::config::ElasticSettings;
use docrag_core::{AppError, AppResult};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeSet;
use std::time::Duration;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Elasticsearch-backed document store client.
pub struct ElasticStore {
    client: reqwest::Client,
    base_url: String,
    index: String,
    username: Option<String>,
    password: Option<String>,
}

/// `_search` response envelope (the subset we read).
#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Debug, Deserialize)]
struct HitsEnvelope {
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source")]
    source: HitSource,
}

#[derive(Debug, Deserialize)]
struct HitSource {
    #[serde(default)]
    text: String,
    #[serde(default)]
    content_type: ContentType,
    #[serde(default)]
    metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    image_path: Option<String>,
    #[serde(default)]
    table_markdown: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

impl ElasticStore {
    /// Create a store client from settings.
    pub fn new(settings: &ElasticSettings) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Store(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: settings.url.trim_end_matches('/').to_string(),
            index: settings.index.clone(),
            username: settings.username.clone(),
            password: settings.password.clone(),
        })
    }

    /// Build the lexical query body: one fuzzy `match` clause per keyword,
    /// at least one required to match.
    fn lexical_query(keywords: &BTreeSet<String>, top_k: usize) -> serde_json::Value {
        let should: Vec<serde_json::Value> = keywords
            .iter()
            .map(|keyword| {
                json!({
                    "match": {
                        "text": {
                            "query": keyword,
                            "fuzziness": "AUTO"
                        }
                    }
                })
            })
            .collect();

        json!({
            "query": {
                "bool": {
                    "should": should,
                    "minimum_should_match": 1
                }
            },
            "size": top_k
        })
    }

    /// Build the vector query body: cosine similarity of the query vector
    /// against the stored `vector` field, over all documents.
    fn vector_query(query_vector: &[f32], top_k: usize) -> serde_json::Value {
        json!({
            "query": {
                "script_score": {
                    "query": { "match_all": {} },
                    "script": {
                        "source": "cosineSimilarity(params.queryVector, 'vector') + 1.0",
                        "params": { "queryVector": query_vector }
                    }
                }
            },
            "size": top_k
        })
    }

    async fn search(&self, body: serde_json::Value) -> AppResult<Vec<RankedHit>> {
        let url = format!("{}/{}/_search", self.base_url, self.index);

        let mut request = self.client.post(&url).json(&body);
        if let Some(ref username) = self.username {
            request = request.basic_auth(username, self.password.as_deref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Store(format!("Search request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Store(format!(
                "Search error ({}): {}",
                status, error_text
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| AppError::Store(format!("Failed to parse search response: {}", e)))?;

        Ok(parsed
            .hits
            .hits
            .into_iter()
            .enumerate()
            .map(|(idx, hit)| RankedHit {
                doc: Document {
                    id: hit.id,
                    text: hit.source.text,
                    content_type: hit.source.content_type,
                    metadata: hit.source.metadata,
                    image_path: hit.source.image_path,
                    table_markdown: hit.source.table_markdown,
                },
                rank: idx + 1,
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl SearchBackend for ElasticStore {
    fn backend_name(&self) -> &str {
        "elasticsearch"
    }

    async fn lexical_search(
        &self,
        keywords: &BTreeSet<String>,
        top_k: usize,
    ) -> AppResult<Vec<RankedHit>> {
        if keywords.is_empty() {
            return Ok(Vec::new());
        }

        let hits = self.search(Self::lexical_query(keywords, top_k)).await?;
        tracing::debug!(hits = hits.len(), "Lexical search completed");
        Ok(hits)
    }

    async fn vector_search(&self, query_vector: &[f32], top_k: usize) -> AppResult<Vec<RankedHit>> {
        let hits = self.search(Self::vector_query(query_vector, top_k)).await?;
        tracing::debug!(hits = hits.len(), "Vector search completed");
        Ok(hits)
    }

    async fn count(&self) -> AppResult<u64> {
        let url = format!("{}/{}/_count", self.base_url, self.index);

        let mut request = self.client.get(&url);
        if let Some(ref username) = self.username {
            request = request.basic_auth(username, self.password.as_deref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Store(format!("Count request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Store(format!(
                "Count error ({})",
                response.status()
            )));
        }

        let parsed: CountResponse = response
            .json()
            .await
            .map_err(|e| AppError::Store(format!("Failed to parse count response: {}", e)))?;

        Ok(parsed.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexical_query_shape() {
        let keywords: BTreeSet<String> =
            ["milvus".to_string(), "database".to_string()].into_iter().collect();
        let body = ElasticStore::lexical_query(&keywords, 10);

        assert_eq!(body["size"], 10);
        assert_eq!(body["query"]["bool"]["minimum_should_match"], 1);

        let should = body["query"]["bool"]["should"].as_array().unwrap();
        assert_eq!(should.len(), 2);
        assert_eq!(should[0]["match"]["text"]["fuzziness"], "AUTO");
    }

    #[test]
    fn test_vector_query_shape() {
        let body = ElasticStore::vector_query(&[0.1, 0.2], 5);

        assert_eq!(body["size"], 5);
        let script = &body["query"]["script_score"]["script"];
        assert_eq!(
            script["source"],
            "cosineSimilarity(params.queryVector, 'vector') + 1.0"
        );
        assert_eq!(script["params"]["queryVector"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_search_response_parsing() {
        let raw = r#"{
            "hits": {
                "hits": [
                    {"_id": "c1", "_source": {"text": "hello", "content_type": "text", "metadata": {"page": 3}}},
                    {"_id": "c2", "_source": {"text": "table desc", "content_type": "table", "table_markdown": "|a|b|"}}
                ]
            }
        }"#;

        let parsed: SearchResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.hits.hits.len(), 2);
        assert_eq!(parsed.hits.hits[0].id, "c1");
        assert_eq!(parsed.hits.hits[1].source.content_type, ContentType::Table);
        assert_eq!(
            parsed.hits.hits[1].source.table_markdown.as_deref(),
            Some("|a|b|")
        );
    }
}
