use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use xxhash_rust::xxh3::Xxh3;

/// One row of the mentions sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentionRecord {
    pub text: Option<String>,
    /// Every categorical column keyed by its original header (e.g. "Fuente", "Region").
    pub fields: BTreeMap<String, String>,
    pub negative: u64,
    pub neutral: u64,
    pub positive: u64,
    pub total: u64, // trusted: should equal negative + neutral + positive
}

impl MentionRecord {
    pub fn field(&self, column: &str) -> Option<&str> {
        self.fields
            .get(column)
            .map(|s| s.as_str())
            .filter(|s| !s.trim().is_empty())
    }

    /// Body with surrounding whitespace removed, `None` when missing or blank.
    pub fn body(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MentionTable {
    pub text_column: String,
    pub category_columns: Vec<String>,
    pub records: Vec<MentionRecord>,
}

impl MentionTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Same rows, new record set. Keeps header metadata.
    pub fn with_records(&self, records: Vec<MentionRecord>) -> MentionTable {
        MentionTable {
            text_column: self.text_column.clone(),
            category_columns: self.category_columns.clone(),
            records,
        }
    }

    /// Content hash over every cell, in row order.
    pub fn fingerprint(&self) -> u64 {
        let mut h = Xxh3::new();
        h.update(self.text_column.as_bytes());
        for c in &self.category_columns {
            h.update(b"\x1f");
            h.update(c.as_bytes());
        }
        for r in &self.records {
            h.update(b"\x1e");
            h.update(r.text.as_deref().unwrap_or("\0").as_bytes());
            for (k, v) in &r.fields {
                h.update(b"\x1f");
                h.update(k.as_bytes());
                h.update(b"=");
                h.update(v.as_bytes());
            }
            for n in [r.negative, r.neutral, r.positive, r.total] {
                h.update(&n.to_le_bytes());
            }
        }
        h.digest()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub label: String,
    pub negative: u64,
    pub neutral: u64,
    pub positive: u64,
    pub total: u64,
    pub negative_pct: f64,
    pub neutral_pct: f64,
    pub positive_pct: f64,
    /// Set when `total == 0`; percentages are then reported as 0.0.
    pub zero_total: bool,
}

/// label -> sampled bodies, in label order.
pub type ExampleBundle = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordCount {
    pub word: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexicalDigest {
    pub top_words: Vec<WordCount>,
    pub mean_length: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyItem {
    pub category: String,
    pub question: String,
    pub rating: u8, // 1 = no, 2 = partially, 3 = yes
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub category: String,
    pub count: usize,
    pub mean: f64,
}

/// Who answered the survey. Everything optional except consent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Respondent {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub monthly_sales: Option<String>,
    pub consent: bool,
}

pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
