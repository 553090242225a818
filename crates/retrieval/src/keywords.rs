//! Keyword extraction for lexical search.
//!
//! Splits free text into salient tokens and drops function words. Uses
//! UAX-29 word boundaries via `unicode-segmentation`, which handles both
//! space-delimited scripts and CJK text (ideographs segment individually,
//! which pairs with the store's disjunctive fuzzy match).

use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;
use unicode_segmentation::UnicodeSegmentation;

/// Function words excluded from lexical queries, English and Chinese.
///
/// Every entry must be a token the segmenter can emit: Han ideographs
/// segment one character at a time, so only single-character Chinese
/// function words belong here.
static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        // English
        "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
        "from", "as", "is", "was", "are", "were", "been", "be", "have", "has", "had", "do",
        "does", "did", "will", "would", "could", "should", "may", "might", "can", "this", "that",
        "these", "those", "it", "its", "what", "which", "who", "when", "where", "why", "how",
        // Chinese
        "的", "了", "在", "是", "我", "有", "和", "就", "不", "人", "都", "一", "上", "也",
        "很", "到", "说", "要", "去", "你", "会", "着", "看", "与", "为", "得", "里", "后",
        "之", "过", "给", "那", "下", "能", "而", "来", "个", "这", "由", "及", "对", "中",
        "但", "年", "还", "并", "比", "越",
    ]
    .into_iter()
    .collect()
});

/// Extract salient keywords from free text.
///
/// Returns a set (order-irrelevant, duplicates collapsed). Empty or
/// whitespace-only input yields an empty set — a valid "no lexical query
/// possible" signal, not an error.
pub fn extract(text: &str) -> BTreeSet<String> {
    if text.trim().is_empty() {
        return BTreeSet::new();
    }

    text.unicode_words()
        .map(|word| word.to_lowercase())
        .filter(|word| !STOP_WORDS.contains(word.as_str()))
        .collect()
}
