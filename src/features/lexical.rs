//! Bounded TF-IDF term features over log message text.

use std::collections::{BTreeMap, HashMap};

/// English stop words dropped before counting.
const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for",
    "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "him", "his",
    "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just", "me", "more", "most",
    "my", "no", "nor", "not", "now", "of", "off", "on", "once", "only", "or", "other", "our",
    "ours", "out", "over", "own", "same", "she", "should", "so", "some", "such", "than", "that",
    "the", "their", "theirs", "them", "then", "there", "these", "they", "this", "those",
    "through", "to", "too", "under", "until", "up", "very", "was", "we", "were", "what", "when",
    "where", "which", "while", "who", "whom", "why", "will", "with", "would", "you", "your",
    "yours",
];

/// Lowercased alphanumeric runs of at least `min_len` characters, stop words removed.
pub fn tokenize(text: &str, min_len: usize) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| t.chars().count() >= min_len && !STOP_WORDS.contains(&t.as_str()))
        .collect()
}

/// The fitted term vocabulary: columns sorted by term, each with its IDF weight.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TermVocabulary {
    terms: Vec<String>,
    idf: Vec<f64>,
    index: HashMap<String, usize>,
    min_token_len: usize,
}

impl TermVocabulary {
    /// Fit on a batch of messages, keeping the `max_terms` most frequent terms.
    /// Frequency ties are broken by term order so the result is deterministic.
    pub fn fit<'a, I>(messages: I, max_terms: usize, min_token_len: usize) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut term_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut doc_freq: BTreeMap<String, usize> = BTreeMap::new();
        let mut n_docs = 0usize;

        for message in messages {
            n_docs += 1;
            let tokens = tokenize(message, min_token_len);
            let mut seen: Vec<&str> = Vec::with_capacity(tokens.len());
            for token in &tokens {
                *term_counts.entry(token.clone()).or_default() += 1;
                if !seen.contains(&token.as_str()) {
                    seen.push(token);
                    *doc_freq.entry(token.clone()).or_default() += 1;
                }
            }
        }

        let mut ranked: Vec<(String, usize)> = term_counts.into_iter().collect();
        // BTreeMap iteration is already term-ordered, so a stable sort on count keeps ties lexicographic.
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(max_terms);

        let mut terms: Vec<String> = ranked.into_iter().map(|(t, _)| t).collect();
        terms.sort();

        let idf = terms
            .iter()
            .map(|t| {
                let df = doc_freq.get(t).copied().unwrap_or(0) as f64;
                ((1.0 + n_docs as f64) / (1.0 + df)).ln() + 1.0
            })
            .collect();

        let index = terms.iter().enumerate().map(|(i, t)| (t.clone(), i)).collect();

        Self {
            terms,
            idf,
            index,
            min_token_len,
        }
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// L2-normalised TF-IDF row for one message. Messages with no known terms
    /// (including empty ones) produce an all-zero row.
    pub fn transform(&self, message: &str) -> Vec<f64> {
        let mut row = vec![0.0; self.terms.len()];
        for token in tokenize(message, self.min_token_len) {
            if let Some(&i) = self.index.get(&token) {
                row[i] += 1.0;
            }
        }

        for (value, idf) in row.iter_mut().zip(&self.idf) {
            *value *= idf;
        }

        let norm = row.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for value in row.iter_mut() {
                *value /= norm;
            }
        }
        row
    }
}
