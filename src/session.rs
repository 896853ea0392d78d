use anyhow::{bail, Result};
use tracing::{debug, info};
use xxhash_rust::xxh3::xxh3_64;

use crate::aggregate::aggregate_by;
use crate::budget::PromptBudget;
use crate::filters::FilterChain;
use crate::lexical::build_digest;
use crate::llm::{GenerationParams, TextGenerator};
use crate::models::MentionTable;
use crate::out_models::MentionReport;
use crate::prompts::{assemble_report_prompt, user_question, ReportPromptInputs};
use crate::render::render_plain_sample;
use crate::sampler::{sample_examples, SampleParams};

pub const QUESTION_SAMPLE_ROWS: usize = 10;

#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub group_by: String,
    pub sample: SampleParams,
    pub budget: PromptBudget,
    pub base_prompt: Option<String>,
}

impl ReportRequest {
    pub fn new(group_by: impl Into<String>) -> Self {
        Self {
            group_by: group_by.into(),
            sample: SampleParams::default(),
            budget: PromptBudget::default(),
            base_prompt: None,
        }
    }
}

/// Memo key: table content plus every parameter that shapes the prompt.
pub fn cache_key(table: &MentionTable, req: &ReportRequest) -> u64 {
    let seed = format!(
        "{:016x}|{}|{}|{}|{}|{}|{}",
        table.fingerprint(),
        req.group_by,
        req.sample.per_group,
        req.sample.seed,
        req.budget.max_prompt_tokens,
        req.budget.max_example_chars,
        req.base_prompt.as_deref().unwrap_or("")
    );
    xxh3_64(seed.as_bytes())
}

/// Single-entry memo of the last generated report.
#[derive(Debug, Default)]
pub struct ReportCache {
    entry: Option<(u64, MentionReport)>,
}

impl ReportCache {
    pub fn get(&self, key: u64) -> Option<&MentionReport> {
        self.entry.as_ref().filter(|(k, _)| *k == key).map(|(_, r)| r)
    }

    pub fn put(&mut self, key: u64, report: MentionReport) {
        self.entry = Some((key, report));
    }

    pub fn invalidate(&mut self) {
        if self.entry.take().is_some() {
            debug!("Report cache invalidated");
        }
    }
}

/// Report without the narrative: aggregate, examples, digest and bounded prompt.
pub fn prepare_report(table: &MentionTable, req: &ReportRequest) -> Result<MentionReport> {
    if table.is_empty() {
        bail!("No mentions left after filtering");
    }
    let rows = aggregate_by(table, &req.group_by);
    if rows.is_empty() {
        bail!("Column '{}' has no labelled rows to aggregate", req.group_by);
    }
    let examples = sample_examples(table, &req.group_by, req.sample);
    let digest = build_digest(table);
    let prompt = assemble_report_prompt(
        &ReportPromptInputs {
            base_prompt: req.base_prompt.as_deref(),
            label_column: &req.group_by,
            per_group: req.sample.per_group,
            rows: &rows,
            examples: &examples,
            digest: &digest,
        },
        req.budget,
    )?;
    Ok(MentionReport {
        group_by: req.group_by.clone(),
        rows,
        examples,
        digest,
        prompt,
        narrative: String::new(),
    })
}

/// Per-user state carried through the pipeline.
pub struct Session {
    table: MentionTable,
    filters: FilterChain,
    cache: ReportCache,
    last_report: Option<MentionReport>,
    last_answer: Option<String>,
}

impl Session {
    pub fn new(table: MentionTable) -> Self {
        Self {
            table,
            filters: FilterChain::default(),
            cache: ReportCache::default(),
            last_report: None,
            last_answer: None,
        }
    }

    pub fn table(&self) -> &MentionTable {
        &self.table
    }

    pub fn filters(&self) -> &FilterChain {
        &self.filters
    }

    pub fn last_report(&self) -> Option<&MentionReport> {
        self.last_report.as_ref()
    }

    pub fn last_answer(&self) -> Option<&str> {
        self.last_answer.as_deref()
    }

    /// A new upload replaces the table and drops memoized results.
    pub fn replace_table(&mut self, table: MentionTable) {
        self.table = table;
        self.cache.invalidate();
    }

    pub fn set_filters(&mut self, filters: FilterChain) {
        if filters != self.filters {
            self.filters = filters;
            self.cache.invalidate();
        }
    }

    pub fn filtered(&self) -> MentionTable {
        self.filters.apply(&self.table)
    }

    /// Build (or reuse) the report. On failure the previous report stays in place.
    pub async fn generate_report(&mut self, llm: &dyn TextGenerator, req: &ReportRequest) -> Result<&MentionReport> {
        let table = self.filtered();
        let key = cache_key(&table, req);

        if let Some(hit) = self.cache.get(key) {
            info!("Report cache hit - key={:016x}", key);
            self.last_report = Some(hit.clone());
        } else {
            let mut report = prepare_report(&table, req)?;
            info!(
                "Report prompt ready - rows={}, groups={}, prompt_length={} chars",
                table.len(),
                report.rows.len(),
                report.prompt.len()
            );
            report.narrative = llm.complete(&report.prompt, GenerationParams::REPORT).await?;
            self.cache.put(key, report.clone());
            self.last_report = Some(report);
        }

        match self.last_report.as_ref() {
            Some(r) => Ok(r),
            None => bail!("report state lost"),
        }
    }

    /// Free-text question grounded on the first rows of the filtered table.
    pub async fn ask(
        &mut self,
        llm: &dyn TextGenerator,
        question: &str,
        label_column: Option<&str>,
        base_prompt: Option<&str>,
    ) -> Result<String> {
        if question.trim().is_empty() {
            bail!("Question is empty");
        }
        let table = self.filtered();
        let sample = render_plain_sample(&table, label_column, QUESTION_SAMPLE_ROWS);
        let prompt = user_question(base_prompt, &sample, question);
        let answer = llm.complete(&prompt, GenerationParams::QUESTION).await?;
        self.last_answer = Some(answer.clone());
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::fakes::ScriptedGenerator;
    use crate::llm::GenerationError;
    use crate::models::MentionRecord;
    use std::collections::BTreeMap;

    fn rec(label: &str, text: &str, neg: u64, neu: u64, pos: u64) -> MentionRecord {
        MentionRecord {
            text: Some(text.to_string()),
            fields: BTreeMap::from([("Fuente".to_string(), label.to_string())]),
            negative: neg,
            neutral: neu,
            positive: pos,
            total: neg + neu + pos,
        }
    }

    fn table() -> MentionTable {
        MentionTable {
            text_column: "Mencion".into(),
            category_columns: vec!["Fuente".into()],
            records: vec![
                rec("A", "excelente atención", 0, 0, 1),
                rec("A", "otro corte de agua", 1, 0, 0),
                rec("A", "gracias EPM", 0, 0, 1),
                rec("B", "factura llegó", 0, 1, 0),
            ],
        }
    }

    #[tokio::test]
    async fn end_to_end_two_groups() {
        let llm = ScriptedGenerator::new(vec![Ok("Resumen breve.".into())]);
        let mut s = Session::new(table());
        let report = s.generate_report(&llm, &ReportRequest::new("Fuente")).await.unwrap();

        assert_eq!(report.narrative, "Resumen breve.");
        let a = &report.rows[0];
        assert_eq!((a.negative_pct, a.neutral_pct, a.positive_pct), (33.3, 0.0, 66.7));
        assert_eq!(report.rows[1].neutral_pct, 100.0);
        assert_eq!(llm.prompts.lock().unwrap()[0], report.prompt);
    }

    #[tokio::test]
    async fn failure_keeps_previous_report() {
        let llm = ScriptedGenerator::new(vec![
            Ok("primero".into()),
            Err(GenerationError::Network("connection reset".into())),
        ]);
        let mut s = Session::new(table());
        s.generate_report(&llm, &ReportRequest::new("Fuente")).await.unwrap();

        // different grouping parameters force a fresh call, which fails
        let mut req = ReportRequest::new("Fuente");
        req.sample.per_group = 2;
        let err = s.generate_report(&llm, &req).await.unwrap_err();
        assert!(err.to_string().contains("connection reset"));
        assert_eq!(s.last_report().unwrap().narrative, "primero");
    }

    #[tokio::test]
    async fn identical_input_is_memoized() {
        let llm = ScriptedGenerator::new(vec![Ok("uno".into()), Ok("dos".into())]);
        let mut s = Session::new(table());
        let req = ReportRequest::new("Fuente");
        s.generate_report(&llm, &req).await.unwrap();
        let again = s.generate_report(&llm, &req).await.unwrap().narrative.clone();
        assert_eq!(again, "uno");
        assert_eq!(llm.calls(), 1);

        // a new upload invalidates the memo
        s.replace_table(table());
        assert_eq!(s.generate_report(&llm, &req).await.unwrap().narrative, "dos");
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn filters_change_the_key() {
        let llm = ScriptedGenerator::new(vec![Ok("todo".into()), Ok("solo A".into())]);
        let mut s = Session::new(table());
        let req = ReportRequest::new("Fuente");
        s.generate_report(&llm, &req).await.unwrap();

        let t = s.table().clone();
        s.set_filters(FilterChain::parse(&["Fuente=A".into()], &t).unwrap());
        let r = s.generate_report(&llm, &req).await.unwrap();
        assert_eq!(r.narrative, "solo A");
        assert_eq!(r.rows.len(), 1);
    }

    #[tokio::test]
    async fn question_uses_first_rows() {
        let llm = ScriptedGenerator::new(vec![Ok("respuesta".into())]);
        let mut s = Session::new(table());
        let out = s.ask(&llm, "¿Qué mejorar?", Some("Fuente"), None).await.unwrap();
        assert_eq!(out, "respuesta");
        assert_eq!(s.last_answer(), Some("respuesta"));
        let prompt = llm.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("excelente atención"));
        assert!(prompt.ends_with("¿Qué mejorar?"));
    }

    #[test]
    fn prepare_rejects_unlabelled_column() {
        let err = prepare_report(&table(), &ReportRequest::new("Region")).unwrap_err();
        assert!(err.to_string().contains("no labelled rows"));
    }
}
