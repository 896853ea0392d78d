// src/viz_export.rs
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::Path,
};

use crate::aggregate::sentiment_totals;
use crate::lexical::{top_words, word_counts};
use crate::models::{round1, CategoryScore, MentionTable, WordCount};
use crate::out_models::RadarSeries;

pub const CLOUD_WORDS: usize = 60;

/* -------------------------------------------------------------------------- */
/* Entry points                                                               */
/* -------------------------------------------------------------------------- */

/// Chart-ready JSONs for a mention report, written into `out/<date>/`.
pub fn write_all_viz(out_dir_for_date: &Path, date: &str, table: &MentionTable, group_by: &str) -> Result<()> {
    fs::create_dir_all(out_dir_for_date).with_context(|| format!("create {:?}", out_dir_for_date))?;

    // 1) Sentiment pie
    let sentiment = build_sentiment(table);
    write_json(out_dir_for_date.join("viz.sentiment.json"), &sentiment)?;

    // 2) Volume per label
    let volume = build_volume(table, group_by);
    write_json(out_dir_for_date.join("viz.volume.json"), &volume)?;

    // 3) Word cloud
    let clouds = build_cloud(table);
    write_json(out_dir_for_date.join("viz.clouds.json"), &clouds)?;

    let idx = json!({
        "date": date,
        "version": 1,
        "counts": {
            "mentions": table.len(),
            "labels": volume.bars.len(),
            "tokens": clouds.tokens.len(),
        },
        "files": ["viz.sentiment.json", "viz.volume.json", "viz.clouds.json"]
    });
    write_json(out_dir_for_date.join("viz.index.json"), &idx)?;

    Ok(())
}

/// Radar chart for a survey, with its own index.
pub fn write_survey_viz(out_dir_for_date: &Path, date: &str, scores: &[CategoryScore], radar: &RadarSeries) -> Result<()> {
    fs::create_dir_all(out_dir_for_date).with_context(|| format!("create {:?}", out_dir_for_date))?;

    write_json(
        out_dir_for_date.join("viz.radar.json"),
        &VRadar { series: radar, categories: scores },
    )?;

    let idx = json!({
        "date": date,
        "version": 1,
        "counts": { "categories": scores.len() },
        "files": ["viz.radar.json"]
    });
    write_json(out_dir_for_date.join("viz.survey.index.json"), &idx)?;
    Ok(())
}

fn write_json<P: AsRef<Path>, T: ?Sized + Serialize>(path: P, value: &T) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, serde_json::to_vec_pretty(value)?).with_context(|| format!("write {:?}", path))
}

/* -------------------------------------------------------------------------- */
/* 1) Sentiment                                                               */
/* -------------------------------------------------------------------------- */

#[derive(Serialize)]
struct VSlice {
    name: &'static str,
    value: u64,
    pct: f64,
}

#[derive(Serialize)]
struct VSentiment {
    total: u64,
    slices: Vec<VSlice>,
}

fn build_sentiment(table: &MentionTable) -> VSentiment {
    let (neg, neu, pos) = sentiment_totals(table);
    let total = neg + neu + pos;
    let pct = |v: u64| if total == 0 { 0.0 } else { round1(v as f64 / total as f64 * 100.0) };
    VSentiment {
        total,
        slices: vec![
            VSlice { name: "negative", value: neg, pct: pct(neg) },
            VSlice { name: "neutral", value: neu, pct: pct(neu) },
            VSlice { name: "positive", value: pos, pct: pct(pos) },
        ],
    }
}

/* -------------------------------------------------------------------------- */
/* 2) Volume                                                                  */
/* -------------------------------------------------------------------------- */

#[derive(Serialize)]
struct VBar {
    label: String,
    mentions: usize,
}

#[derive(Serialize)]
struct VVolume {
    group_by: String,
    bars: Vec<VBar>,
}

/// Mentions per label, most frequent first; ties in label order.
fn build_volume(table: &MentionTable, group_by: &str) -> VVolume {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for r in &table.records {
        if let Some(label) = r.field(group_by) {
            *counts.entry(label).or_insert(0) += 1;
        }
    }
    let mut bars: Vec<VBar> = counts
        .into_iter()
        .map(|(l, n)| VBar { label: l.to_string(), mentions: n })
        .collect();
    bars.sort_by_key(|b| std::cmp::Reverse(b.mentions));
    VVolume { group_by: group_by.to_string(), bars }
}

/* -------------------------------------------------------------------------- */
/* 3) Word cloud                                                              */
/* -------------------------------------------------------------------------- */

#[derive(Serialize)]
struct VCloud {
    tokens: Vec<WordCount>,
}

fn build_cloud(table: &MentionTable) -> VCloud {
    let cleaned: Vec<String> = table.records.iter().filter_map(|r| r.body()).map(strip_urls).collect();
    let counts = word_counts(cleaned.iter().map(String::as_str))
        .into_iter()
        .filter(|w| keep_cloud_token(&w.word))
        .collect();
    VCloud { tokens: top_words(counts, CLOUD_WORDS) }
}

fn keep_cloud_token(w: &str) -> bool {
    w.chars().count() > 2 && !w.chars().all(|c| c.is_ascii_digit() || c == '_') && !stopwords().contains(w)
}

fn strip_urls(s: &str) -> String {
    static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+|www\.\S+").unwrap());
    URL_RE.replace_all(s, " ").to_string()
}

#[derive(Serialize)]
struct VRadar<'a> {
    series: &'a RadarSeries,
    categories: &'a [CategoryScore],
}

/* ------------------------------ Stop words -------------------------------- */

fn stopwords() -> &'static HashSet<&'static str> {
    static SET: Lazy<HashSet<&'static str>> = Lazy::new(|| {
        let words = [
            // spanish
            "de","la","que","el","en","y","a","los","del","se","las","por","un","para","con","no","una","su",
            "al","es","lo","como","más","mas","pero","sus","ya","o","este","sí","si","porque","esta","entre",
            "cuando","muy","sin","sobre","también","me","hasta","hay","donde","quien","desde","todo","nos",
            "durante","todos","uno","les","ni","contra","otros","ese","eso","ante","ellos","e","esto","mí",
            "antes","algunos","qué","unos","yo","otro","otras","otra","él","tanto","esa","estos","mucho",
            "quienes","nada","muchos","cual","poco","ella","estar","estas","son","fue","ser","han","ha","le",
            // english
            "the","an","and","or","but","if","then","of","to","in","on","for","with","as","by","is","are",
            "was","were","be","been","that","this","it","its","at","from","not","you","your","our","we",
            // social noise
            "http","https","www","com","rt","via",
        ];
        words.into_iter().collect()
    });
    &SET
}
