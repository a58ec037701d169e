//! Lexical normalisation shared by the extractor and the scorer.
//!
//! Text is lowercased and split into runs of ASCII letters or CJK ideographs
//! of length two or more. Stop-words carry no domain signal and are dropped.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};

static WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-z\x{4e00}-\x{9fff}]{2,}").unwrap_or_else(|_| unreachable!()));

static QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"]+)""#).unwrap_or_else(|_| unreachable!()));

const STOPWORDS: &[&str] = &[
    // articles, conjunctions, prepositions
    "the", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "from",
    "into", "about", "after", "before", "over",
    // auxiliaries
    "is", "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does", "did",
    "will", "would", "could", "should", "may", "might", "can",
    // pronouns and demonstratives
    "this", "that", "these", "those", "it", "its", "they", "them", "their",
    // logic, quantifiers, adverbs
    "not", "no", "if", "then", "than", "so", "as", "also", "just", "only", "very", "more", "most",
    "some", "any", "all", "each", "every", "both", "few", "many", "much", "such", "other",
    "another", "same", "different", "new", "when", "how", "what", "which", "who", "where", "why",
    // verbs and nouns too generic to tell units apart
    "use", "used", "using", "make", "like", "user", "users", "skill", "skills", "tool", "tools",
    "file", "files", "asks", "mentions", "discusses", "including", "provides",
    // Chinese
    "的", "是", "在", "了", "和", "與", "或", "也", "都", "不", "有", "這", "那", "就", "要", "會",
    "可以", "可", "能", "把", "讓", "被", "對", "從", "到", "做", "用", "使用", "需要", "一個",
    "這個", "那個", "如果", "當", "時", "進行", "以及", "等", "及",
];

static STOPWORD_SET: Lazy<HashSet<&'static str>> = Lazy::new(|| STOPWORDS.iter().copied().collect());

/// Words that name a packaging concept rather than what a unit operates on.
const GENERIC_DOMAIN_WORDS: &[&str] = &["tools", "tool", "skill", "helper", "utils", "manager"];

/// Returns the meaningful tokens of `text` in order of appearance.
#[must_use]
pub fn tokens(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    WORD.find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|word| !STOPWORD_SET.contains(word))
        .map(str::to_string)
        .collect()
}

/// Returns the set of meaningful tokens of `text`.
#[must_use]
pub fn keywords(text: &str) -> BTreeSet<String> {
    tokens(text).into_iter().collect()
}

/// Extracts the double-quoted phrases of a description.
#[must_use]
pub fn quoted_phrases(text: &str) -> Vec<String> {
    QUOTED
        .captures_iter(text)
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|phrase| !phrase.is_empty())
        .collect()
}

/// Lowercases and collapses whitespace.
#[must_use]
pub fn normalize_phrase(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Returns true for words that describe packaging rather than a domain object.
#[must_use]
pub fn is_generic_domain_word(word: &str) -> bool {
    GENERIC_DOMAIN_WORDS.contains(&word)
}

/// Jaccard index of two sets; 0 when both are empty.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn jaccard<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}
