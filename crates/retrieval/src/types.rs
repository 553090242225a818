//! Data model for the retrieval pipeline.
//!
//! Documents are read-only to this crate: the ingestion side owns their
//! lifecycle, we only search and rank them. Results move through three
//! stages — per-mode `RankedHit`, post-fusion `FusedResult`, post-rerank
//! `ScoredResult` — each carrying the document along.

use serde::{Deserialize, Serialize};

/// Content type of an indexed chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Text,
    Image,
    Table,
}

/// One indexed document chunk as stored in the document store.
///
/// The field set is closed: content-type-specific payloads live in the two
/// optional fields rather than an open metadata bag, so handling per type
/// stays exhaustive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Opaque stable identifier assigned by the store
    pub id: String,

    /// Chunk text (for tables, a textual description; see `table_markdown`)
    pub text: String,

    /// Content type tag
    #[serde(default)]
    pub content_type: ContentType,

    /// Arbitrary metadata; a page number is present for PDF-derived chunks
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    /// Path to the extracted image, for image chunks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,

    /// Original table in markdown form, for table chunks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_markdown: Option<String>,
}

impl Document {
    /// Page number from metadata, if the chunk came from a paginated source.
    pub fn page(&self) -> Option<i64> {
        self.metadata.get("page").and_then(|v| v.as_i64())
    }
}

/// A hit from one search mode, with its 1-based rank in that mode's
/// relevance-sorted response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedHit {
    pub doc: Document,
    pub rank: usize,
}

/// A document after reciprocal rank fusion of the two search modes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusedResult {
    pub doc: Document,

    /// Dense 1-based position after fusion
    pub rank: usize,

    /// Accumulated RRF score across contributing lists
    pub rrf_score: f64,
}

/// A fused document with its cross-encoder relevance score.
///
/// Rerank scores are only comparable within one reranker call; the
/// cross-query merge deliberately treats them as winner-take-all rather
/// than fusing them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredResult {
    pub doc: Document,

    /// Position inherited from fusion (pre-rerank)
    pub rank: usize,

    /// Accumulated RRF score
    pub rrf_score: f64,

    /// Cross-encoder relevance; 0.0 when reranking was unavailable
    pub rerank_score: f64,
}

impl ScoredResult {
    pub fn from_fused(fused: FusedResult, rerank_score: f64) -> Self {
        Self {
            doc: fused.doc,
            rank: fused.rank,
            rrf_score: fused.rrf_score,
            rerank_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn doc(id: &str, text: &str) -> Document {
        Document {
            id: id.to_string(),
            text: text.to_string(),
            content_type: ContentType::Text,
            metadata: serde_json::Map::new(),
            image_path: None,
            table_markdown: None,
        }
    }

    #[test]
    fn test_content_type_serialization() {
        assert_eq!(
            serde_json::to_string(&ContentType::Table).unwrap(),
            "\"table\""
        );
        let parsed: ContentType = serde_json::from_str("\"image\"").unwrap();
        assert_eq!(parsed, ContentType::Image);
    }

    #[test]
    fn test_document_page() {
        let mut d = doc("d1", "some text");
        assert_eq!(d.page(), None);

        d.metadata
            .insert("page".to_string(), serde_json::json!(7));
        assert_eq!(d.page(), Some(7));
    }

    #[test]
    fn test_document_defaults_on_deserialize() {
        let d: Document = serde_json::from_str(r#"{"id":"x","text":"t"}"#).unwrap();
        assert_eq!(d.content_type, ContentType::Text);
        assert!(d.metadata.is_empty());
        assert!(d.image_path.is_none());
    }
}
