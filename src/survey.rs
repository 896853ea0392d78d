use anyhow::{anyhow, bail, Context, Result};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

use crate::load::header_key;
use crate::models::{round2, CategoryScore, Respondent, SurveyItem};
use crate::out_models::RadarSeries;
use crate::prompts::{survey_summary_text, user_survey};

pub const DEFAULT_RATING: u8 = 2;
pub const WORST_COUNT: usize = 5;
pub const LABEL_WRAP: usize = 18;

fn find_prefixed(keys: &[String], prefixes: &[&str]) -> Option<usize> {
    keys.iter().position(|k| prefixes.iter().any(|p| k.starts_with(p)))
}

fn parse_rating(raw: &str) -> u8 {
    match raw.trim().replace(',', ".").parse::<f64>() {
        Ok(v) if v.is_finite() => v.round().clamp(1.0, 3.0) as u8,
        _ => DEFAULT_RATING,
    }
}

pub fn load_survey(path: &Path, delimiter: u8) -> Result<Vec<SurveyItem>> {
    let file = std::fs::File::open(path).with_context(|| format!("Failed to open survey file {}", path.display()))?;
    let items = read_survey(file, delimiter).with_context(|| format!("Failed to parse survey file {}", path.display()))?;
    info!("Survey loaded - file={}, questions={}", path.display(), items.len());
    Ok(items)
}

/// Columns are matched by prefix: `categor…`, `pregun…`/`question…`, optional `calif…`/`rating…`.
pub fn read_survey<R: Read>(reader: R, delimiter: u8) -> Result<Vec<SurveyItem>> {
    let mut rdr = csv::ReaderBuilder::new().delimiter(delimiter).flexible(true).from_reader(reader);
    let keys: Vec<String> = rdr.headers().context("Missing header row")?.iter().map(header_key).collect();

    let cat = find_prefixed(&keys, &["categor"])
        .ok_or_else(|| anyhow!("The survey sheet needs a 'Categoría' column"))?;
    let question = find_prefixed(&keys, &["pregun", "question"])
        .ok_or_else(|| anyhow!("The survey sheet needs a 'Pregunta' column"))?;
    let rating = find_prefixed(&keys, &["calif", "rating", "score"]);
    if rating.is_none() {
        debug!("No rating column - every question starts at {}", DEFAULT_RATING);
    }

    let mut items = Vec::new();
    for (n, row) in rdr.records().enumerate() {
        let row = row.with_context(|| format!("Malformed CSV at line {}", n + 2))?;
        let category = row.get(cat).unwrap_or("").trim().to_string();
        let q = row.get(question).unwrap_or("").trim().to_string();
        if category.is_empty() && q.is_empty() {
            continue;
        }
        let r = rating.and_then(|i| row.get(i)).map(parse_rating).unwrap_or(DEFAULT_RATING);
        items.push(SurveyItem { category, question: q, rating: r });
    }
    if items.is_empty() {
        bail!("Survey sheet has no questions");
    }
    Ok(items)
}

/// Replace ratings with answers given on the command line (`index=value`, 1-based).
pub fn apply_answers(items: &mut [SurveyItem], answers: &[String]) -> Result<()> {
    for a in answers {
        let (idx, val) = a
            .split_once('=')
            .ok_or_else(|| anyhow!("answer '{}' must look like <question number>=<1..3>", a))?;
        let idx: usize = idx.trim().parse().with_context(|| format!("bad question number in '{}'", a))?;
        let val: u8 = val.trim().parse().with_context(|| format!("bad rating in '{}'", a))?;
        if !(1..=3).contains(&val) {
            bail!("rating in '{}' must be 1, 2 or 3", a);
        }
        let n = items.len();
        let item = items
            .get_mut(idx.wrapping_sub(1))
            .ok_or_else(|| anyhow!("question {} does not exist (1..={})", idx, n))?;
        item.rating = val;
    }
    Ok(())
}

pub fn scores_by_category(items: &[SurveyItem]) -> Vec<CategoryScore> {
    let mut groups: BTreeMap<&str, (usize, u32)> = BTreeMap::new();
    for it in items {
        let e = groups.entry(it.category.as_str()).or_default();
        e.0 += 1;
        e.1 += it.rating as u32;
    }
    groups
        .into_iter()
        .map(|(c, (n, sum))| CategoryScore { category: c.to_string(), count: n, mean: round2(sum as f64 / n as f64) })
        .collect()
}

pub fn global_mean(items: &[SurveyItem]) -> f64 {
    if items.is_empty() {
        return 0.0;
    }
    round2(items.iter().map(|i| i.rating as f64).sum::<f64>() / items.len() as f64)
}

/// Lowest ratings first; equal ratings keep sheet order.
pub fn worst_questions(items: &[SurveyItem], n: usize) -> Vec<SurveyItem> {
    let mut sorted = items.to_vec();
    sorted.sort_by_key(|i| i.rating);
    sorted.truncate(n);
    sorted
}

/// Greedy word wrap joined with `<br>` for chart labels.
pub fn wrap_label(text: &str, max_len: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut curr: Vec<&str> = Vec::new();
    let mut curr_len = 0usize;
    for w in text.split_whitespace() {
        let wl = w.chars().count();
        let needed = if curr.is_empty() { wl } else { curr_len + 1 + wl };
        if needed <= max_len || curr.is_empty() {
            curr_len = needed;
            curr.push(w);
        } else {
            lines.push(curr.join(" "));
            curr = vec![w];
            curr_len = wl;
        }
    }
    if !curr.is_empty() {
        lines.push(curr.join(" "));
    }
    if lines.is_empty() {
        text.to_string()
    } else {
        lines.join("<br>")
    }
}

pub fn radar_series(scores: &[CategoryScore]) -> RadarSeries {
    let mut labels: Vec<String> = scores.iter().map(|s| wrap_label(&s.category, LABEL_WRAP)).collect();
    let mut values: Vec<f64> = scores.iter().map(|s| s.mean).collect();
    if let (Some(l), Some(v)) = (labels.first().cloned(), values.first().copied()) {
        labels.push(l);
        values.push(v);
    }
    RadarSeries { labels, values, range: [0.0, 3.0] }
}

pub fn require_consent(respondent: &Respondent) -> Result<()> {
    if !respondent.consent {
        bail!("Data-processing consent is required before analysing or exporting survey answers (pass --consent)");
    }
    Ok(())
}

/// Summary, worst questions and the analysis prompt for a survey.
pub fn survey_prompt(items: &[SurveyItem], respondent: &Respondent) -> (Vec<CategoryScore>, f64, Vec<SurveyItem>, String) {
    let by_cat = scores_by_category(items);
    let mean = global_mean(items);
    let worst = worst_questions(items, WORST_COUNT);
    let summary = survey_summary_text(
        respondent.company.as_deref(),
        &by_cat,
        mean,
        respondent.name.as_deref(),
        respondent.phone.as_deref(),
        respondent.monthly_sales.as_deref(),
    );
    let prompt = user_survey(&summary, &worst);
    (by_cat, mean, worst, prompt)
}
