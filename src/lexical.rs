use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::models::{round1, LexicalDigest, MentionTable, WordCount};

pub const TOP_WORDS: usize = 20;

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").unwrap());

/// Lower-cased `\w+` runs.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    WORD_RE.find_iter(text).map(|m| m.as_str().to_lowercase())
}

/// Counts in first-seen order.
pub fn word_counts<'a>(texts: impl IntoIterator<Item = &'a str>) -> Vec<WordCount> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut counts: Vec<WordCount> = Vec::new();
    for text in texts {
        for w in tokenize(text) {
            match index.get(&w) {
                Some(&i) => counts[i].count += 1,
                None => {
                    index.insert(w.clone(), counts.len());
                    counts.push(WordCount { word: w, count: 1 });
                }
            }
        }
    }
    counts
}

/// Top words by descending count; ties keep first-seen order.
pub fn top_words(mut counts: Vec<WordCount>, limit: usize) -> Vec<WordCount> {
    // sort_by is stable
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts.truncate(limit);
    counts
}

pub fn build_digest(table: &MentionTable) -> LexicalDigest {
    let bodies: Vec<&str> = table.records.iter().filter_map(|r| r.text.as_deref()).collect();

    let mean_length = if bodies.is_empty() {
        0.0
    } else {
        let chars: usize = bodies.iter().map(|b| b.chars().count()).sum();
        round1(chars as f64 / bodies.len() as f64)
    };

    LexicalDigest {
        top_words: top_words(word_counts(bodies.iter().copied()), TOP_WORDS),
        mean_length,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MentionRecord;
    use std::collections::BTreeMap;

    fn table(texts: &[Option<&str>]) -> MentionTable {
        MentionTable {
            text_column: "Mencion".into(),
            category_columns: vec![],
            records: texts
                .iter()
                .map(|t| MentionRecord {
                    text: t.map(|s| s.to_string()),
                    fields: BTreeMap::new(),
                    negative: 0,
                    neutral: 0,
                    positive: 0,
                    total: 0,
                })
                .collect(),
        }
    }

    #[test]
    fn lowercases_and_strips_punctuation() {
        let d = build_digest(&table(&[Some("¡EPM, EPM! energía."), Some("Energía: epm")]));
        assert_eq!(d.top_words[0], WordCount { word: "epm".into(), count: 3 });
        assert_eq!(d.top_words[1], WordCount { word: "energía".into(), count: 2 });
        assert_eq!(d.top_words.len(), 2);
    }

    #[test]
    fn ties_keep_first_seen_order() {
        let d = build_digest(&table(&[Some("gamma beta alfa"), Some("alfa beta gamma")]));
        let words: Vec<_> = d.top_words.iter().map(|w| w.word.as_str()).collect();
        assert_eq!(words, vec!["gamma", "beta", "alfa"]);
    }

    #[test]
    fn bounded_and_non_increasing() {
        let text: String = (0..60).map(|i| format!("w{} ", i % 30)).collect::<String>() + "w3 w3 w7";
        let d = build_digest(&table(&[Some(&text)]));
        assert!(d.top_words.len() <= TOP_WORDS);
        assert!(d.top_words.windows(2).all(|p| p[0].count >= p[1].count));
        assert_eq!(d.top_words[0].word, "w3");
    }

    #[test]
    fn mean_length_ignores_missing_bodies() {
        let d = build_digest(&table(&[Some("abcd"), None, Some("ñandú")]));
        assert_eq!(d.mean_length, 4.5);
    }

    #[test]
    fn empty_corpus() {
        let d = build_digest(&table(&[None]));
        assert!(d.top_words.is_empty());
        assert_eq!(d.mean_length, 0.0);
    }
}
