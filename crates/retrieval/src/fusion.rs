//! Reciprocal rank fusion of the two search modes.
//!
//! Each distinct document accumulates `1 / (k + rank)` for every source
//! list it appears in. The smoothing constant `k` controls how steeply low
//! ranks are discounted; 60 is the conventional default.

use crate::types::{FusedResult, RankedHit};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Default RRF smoothing constant.
pub const DEFAULT_RRF_K: f64 = 60.0;

/// Transcript timestamp artifacts left over from video-derived chunks.
static TIMESTAMP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{2}:\d{2}\.\d{3} --> \d{2}:\d{2}\.\d{3}").expect("valid timestamp pattern")
});

/// Fuse two independently ranked hit lists into one ranked list.
///
/// Ties in RRF score keep first-seen order (lexical list before vector
/// list), so the output is deterministic. Ranks in the output are a dense
/// 1..=M sequence over the M distinct document ids.
pub fn reciprocal_rank_fusion(
    lexical_hits: Vec<RankedHit>,
    vector_hits: Vec<RankedHit>,
    k: f64,
) -> Vec<FusedResult> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    let mut first_seen: Vec<RankedHit> = Vec::new();

    for hit in lexical_hits.into_iter().chain(vector_hits) {
        let entry = scores.entry(hit.doc.id.clone()).or_insert_with(|| {
            first_seen.push(hit.clone());
            0.0
        });
        *entry += 1.0 / (k + hit.rank as f64);
    }

    // Stable sort keeps first-seen order for equal scores
    first_seen.sort_by(|a, b| {
        let sa = scores[&a.doc.id];
        let sb = scores[&b.doc.id];
        sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
    });

    first_seen
        .into_iter()
        .enumerate()
        .map(|(idx, hit)| {
            let rrf_score = scores[&hit.doc.id];
            let mut doc = hit.doc;
            doc.text = strip_timestamps(&doc.text);
            FusedResult {
                doc,
                rank: idx + 1,
                rrf_score,
            }
        })
        .collect()
}

/// Remove `MM:SS.mmm --> MM:SS.mmm` artifacts from chunk text.
fn strip_timestamps(text: &str) -> String {
    TIMESTAMP_PATTERN.replace_all(text, "").into_owned()
}
