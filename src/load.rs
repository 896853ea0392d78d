use anyhow::{anyhow, bail, Context, Result};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

use crate::models::{MentionRecord, MentionTable};

const TEXT_NAMES: &[&str] = &["mencion", "mention", "mentions", "texto", "text"];
const NEGATIVE_NAMES: &[&str] = &["negativo", "negative", "neg"];
const NEUTRAL_NAMES: &[&str] = &["neutral", "neutro", "neu"];
const POSITIVE_NAMES: &[&str] = &["positivo", "positive", "pos"];
const TOTAL_NAMES: &[&str] = &["total"];

/// Header key used for matching: trimmed, lower-case, accents stripped ("Mención" -> "mencion").
pub fn header_key(h: &str) -> String {
    h.trim_start_matches('\u{feff}')
        .trim()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

fn find_column(keys: &[String], names: &[&str]) -> Option<usize> {
    keys.iter().position(|k| names.contains(&k.as_str()))
}

fn parse_count(raw: &str, row: usize, column: &str) -> Result<u64> {
    let s = raw.trim();
    if s.is_empty() {
        return Ok(0);
    }
    if let Ok(n) = s.parse::<u64>() {
        return Ok(n);
    }
    // spreadsheets sometimes export integer columns as "3.0"
    match s.parse::<f64>() {
        Ok(f) if f >= 0.0 && f.fract() == 0.0 => Ok(f as u64),
        _ => bail!("row {}: column '{}' is not a non-negative count: {:?}", row, column, raw),
    }
}

pub fn load_mentions(path: &Path, delimiter: u8) -> Result<MentionTable> {
    let start = std::time::Instant::now();
    let file = File::open(path).with_context(|| format!("Failed to open mentions file {}", path.display()))?;
    let table = read_mentions(file, delimiter)
        .with_context(|| format!("Failed to parse mentions file {}", path.display()))?;
    info!(
        "Mentions loaded - file={}, rows={}, columns={}, duration={:.2}s",
        path.display(),
        table.len(),
        table.category_columns.len() + 1,
        start.elapsed().as_secs_f32()
    );
    Ok(table)
}

pub fn read_mentions<R: Read>(reader: R, delimiter: u8) -> Result<MentionTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()
        .context("Missing header row")?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();
    let keys: Vec<String> = headers.iter().map(|h| header_key(h)).collect();

    let text_idx = find_column(&keys, TEXT_NAMES)
        .ok_or_else(|| anyhow!("No mention text column (expected one of {:?}) in {:?}", TEXT_NAMES, headers))?;
    let neg_idx = find_column(&keys, NEGATIVE_NAMES)
        .ok_or_else(|| anyhow!("No negative count column in {:?}", headers))?;
    let neu_idx = find_column(&keys, NEUTRAL_NAMES)
        .ok_or_else(|| anyhow!("No neutral count column in {:?}", headers))?;
    let pos_idx = find_column(&keys, POSITIVE_NAMES)
        .ok_or_else(|| anyhow!("No positive count column in {:?}", headers))?;
    let total_idx = find_column(&keys, TOTAL_NAMES);
    if total_idx.is_none() {
        debug!("No total column - totals derived from sentiment counts");
    }

    let reserved = [Some(text_idx), Some(neg_idx), Some(neu_idx), Some(pos_idx), total_idx];
    let category_idx: Vec<usize> = (0..headers.len())
        .filter(|i| !reserved.contains(&Some(*i)))
        .collect();

    let mut records = Vec::new();
    let mut mismatched = 0usize;
    for (n, row) in rdr.records().enumerate() {
        let line = n + 2; // 1-based, after header
        let row = row.with_context(|| format!("Malformed CSV at line {}", line))?;
        let cell = |i: usize| row.get(i).unwrap_or("");

        let negative = parse_count(cell(neg_idx), line, &headers[neg_idx])?;
        let neutral = parse_count(cell(neu_idx), line, &headers[neu_idx])?;
        let positive = parse_count(cell(pos_idx), line, &headers[pos_idx])?;
        let total = match total_idx {
            Some(i) => parse_count(cell(i), line, &headers[i])?,
            None => negative + neutral + positive,
        };
        if total != negative + neutral + positive {
            mismatched += 1;
        }

        let text = Some(cell(text_idx).to_string()).filter(|s| !s.trim().is_empty());
        let fields: BTreeMap<String, String> = category_idx
            .iter()
            .map(|&i| (headers[i].clone(), cell(i).trim().to_string()))
            .collect();

        records.push(MentionRecord { text, fields, negative, neutral, positive, total });
    }

    if records.is_empty() {
        bail!("Mentions table has a header but no rows");
    }
    if mismatched > 0 {
        warn!("Rows whose total differs from the sentiment sum - count={}", mismatched);
    }

    Ok(MentionTable {
        text_column: headers[text_idx].clone(),
        category_columns: category_idx.iter().map(|&i| headers[i].clone()).collect(),
        records,
    })
}

/// Resolve a user-supplied column name against the table headers, ignoring case and accents.
pub fn resolve_column(table: &MentionTable, wanted: &str) -> Result<String> {
    let key = header_key(wanted);
    table
        .category_columns
        .iter()
        .find(|c| header_key(c) == key)
        .cloned()
        .ok_or_else(|| anyhow!("Column '{}' not found; available: {:?}", wanted, table.category_columns))
}
