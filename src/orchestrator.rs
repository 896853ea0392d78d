use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use chrono_tz::{America::Bogota, Tz};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::filters::FilterChain;
use crate::hooks::{deliver_best_effort, BackupHook, DeliveryOutcome, EmailHook};
use crate::llm::{GenerationError, GenerationParams, TextGenerator};
use crate::load::{load_mentions, resolve_column};
use crate::media::MediaGenerator;
use crate::models::Respondent;
use crate::out_models::{MentionReport, SurveyReport};
use crate::render::{
    narrative_to_html, render_aggregate_html, render_aggregate_markdown, render_bar_svg, render_report_html,
    render_scores_html, render_worst_html, HtmlSection,
};
use crate::sampler::SampleParams;
use crate::session::{prepare_report, ReportRequest, Session};
use crate::site::{analyze_site, normalize_site_url, site_text};
use crate::survey::{apply_answers, load_survey, radar_series, require_consent, survey_prompt};
use crate::viz_export::{write_all_viz, write_survey_viz};

/// Reports are stamped in Colombian local time.
pub fn bogota_now() -> DateTime<Tz> {
    Utc::now().with_timezone(&Bogota)
}

/// `<prefix>_YYYYMMDD_HHMMSS.html`
pub fn report_filename(prefix: &str, at: &DateTime<Tz>) -> String {
    format!("{}_{}.html", prefix, at.format("%Y%m%d_%H%M%S"))
}

/// Optional side deliveries for exported HTML.
#[derive(Default, Clone, Copy)]
pub struct Deliveries<'a> {
    pub backup: Option<&'a dyn BackupHook>,
    pub email: Option<(&'a dyn EmailHook, &'a [String])>,
}

#[derive(Debug, Clone)]
pub struct MentionInput {
    pub path: PathBuf,
    pub delimiter: u8,
    pub filters: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub input: MentionInput,
    pub group_by: String,
    pub sample: SampleParams,
    pub base_prompt: Option<String>,
    pub output_dir: PathBuf,
    pub html_prefix: String,
}

#[derive(Debug)]
pub struct ReportOutcome {
    pub report: MentionReport,
    pub generated: bool,
    pub date_dir: PathBuf,
    pub html_path: PathBuf,
    pub delivery: DeliveryOutcome,
}

/// Generation failures are shown inline; anything else is fatal.
fn inline_generation_failure(what: &str, e: anyhow::Error) -> Result<()> {
    if e.downcast_ref::<GenerationError>().is_none() {
        return Err(e);
    }
    error!("{} failed - error={:#}", what, e);
    println!("Error while generating the {}: {:#}", what.to_lowercase(), e);
    Ok(())
}

fn open_session(input: &MentionInput) -> Result<Session> {
    let table = load_mentions(&input.path, input.delimiter)?;
    let filters = FilterChain::parse(&input.filters, &table)?;
    let mut session = Session::new(table);
    if !filters.is_empty() {
        session.set_filters(filters);
        info!("Filters applied - steps={}, rows_left={}", input.filters.len(), session.filtered().len());
    }
    Ok(session)
}

fn date_dir(output_dir: &Path, at: &DateTime<Tz>) -> Result<PathBuf> {
    let dir = output_dir.join(at.format("%Y-%m-%d").to_string());
    std::fs::create_dir_all(&dir)?;
    debug!("Output directory: {}", dir.display());
    Ok(dir)
}

pub async fn run_report(
    opts: &ReportOptions,
    llm: &dyn TextGenerator,
    deliveries: Deliveries<'_>,
    at: DateTime<Tz>,
) -> Result<ReportOutcome> {
    let pipeline_start = std::time::Instant::now();
    info!("Report pipeline started - input={}, group_by={}", opts.input.path.display(), opts.group_by);

    let mut session = open_session(&opts.input)?;
    let group_by = resolve_column(session.table(), &opts.group_by)?;
    let mut req = ReportRequest::new(group_by);
    req.sample = opts.sample;
    req.base_prompt = opts.base_prompt.clone();

    // 1) aggregate + prompt + narrative
    let gen_start = std::time::Instant::now();
    let (report, generated) = match session.generate_report(llm, &req).await {
        Ok(r) => (r.clone(), true),
        Err(e) => {
            inline_generation_failure("Report", e)?;
            (prepare_report(&session.filtered(), &req)?, false)
        }
    };
    info!(
        "Report generation finished - duration={:.2}s, groups={}, narrative={}",
        gen_start.elapsed().as_secs_f32(),
        report.rows.len(),
        generated
    );

    // 2) persist
    let persist_start = std::time::Instant::now();
    let dir = date_dir(&opts.output_dir, &at)?;

    std::fs::write(dir.join("report.json"), serde_json::to_vec_pretty(&report)?)?;
    debug!("Wrote report.json");

    let md = format!(
        "# Mention report by {}\n\n{}\n\n## Narrative\n\n{}\n",
        report.group_by,
        render_aggregate_markdown(&report.rows, &report.group_by),
        if generated { report.narrative.as_str() } else { "_Not generated._" }
    );
    std::fs::write(dir.join("report.md"), md.as_bytes())?;
    debug!("Wrote report.md");

    let filtered = session.filtered();
    write_all_viz(&dir, &at.format("%Y-%m-%d").to_string(), &filtered, &report.group_by)?;
    debug!("Wrote viz bundle");

    let bars: Vec<(String, u64)> = report.rows.iter().map(|r| (r.label.clone(), r.total)).collect();
    let sections = vec![
        HtmlSection {
            title: format!("Sentiment by {}", report.group_by),
            body_html: render_aggregate_html(&report.rows, &report.group_by),
        },
        HtmlSection { title: "Mentions per label".into(), body_html: render_bar_svg(&bars) },
        HtmlSection { title: "Narrative".into(), body_html: narrative_to_html(&report.narrative) },
    ];
    let html = render_report_html("Mention report", &at.format("%Y-%m-%d %H:%M").to_string(), &sections);
    let filename = report_filename(&opts.html_prefix, &at);
    let html_path = dir.join(&filename);
    std::fs::write(&html_path, html.as_bytes())?;
    info!("Output persisted - duration={:.2}s, file={}", persist_start.elapsed().as_secs_f32(), html_path.display());

    // 3) best-effort side deliveries
    let delivery = deliver_best_effort(html.as_bytes(), &filename, deliveries.backup, deliveries.email).await;

    info!(
        "Report pipeline completed - total_duration={:.2}s, rows={}, groups={}",
        pipeline_start.elapsed().as_secs_f32(),
        filtered.len(),
        report.rows.len()
    );
    Ok(ReportOutcome { report, generated, date_dir: dir, html_path, delivery })
}

/// Free-text question over the (filtered) table. `None` when generation failed.
pub async fn run_ask(
    input: &MentionInput,
    llm: &dyn TextGenerator,
    question: &str,
    label_column: Option<&str>,
    base_prompt: Option<&str>,
) -> Result<Option<String>> {
    let mut session = open_session(input)?;
    let label = match label_column {
        Some(l) => Some(resolve_column(session.table(), l)?),
        None => None,
    };
    let start = std::time::Instant::now();
    match session.ask(llm, question, label.as_deref(), base_prompt).await {
        Ok(answer) => {
            info!("Question answered - duration={:.2}s, answer_length={} chars", start.elapsed().as_secs_f32(), answer.len());
            Ok(Some(answer))
        }
        Err(e) => {
            inline_generation_failure("Answer", e)?;
            Ok(None)
        }
    }
}

/// Distinct values selectable for `column` under the given filters.
pub fn run_options(input: &MentionInput, column: &str) -> Result<Vec<String>> {
    let session = open_session(input)?;
    let column = resolve_column(session.table(), column)?;
    Ok(session.filters().options_for(session.table(), &column))
}

#[derive(Debug, Clone)]
pub struct SurveyOptions {
    pub path: PathBuf,
    pub delimiter: u8,
    pub answers: Vec<String>,
    pub respondent: Respondent,
    pub site_url: Option<String>,
    pub output_dir: PathBuf,
    pub html_prefix: String,
}

pub async fn run_survey(
    opts: &SurveyOptions,
    llm: &dyn TextGenerator,
    deliveries: Deliveries<'_>,
    at: DateTime<Tz>,
) -> Result<(SurveyReport, PathBuf)> {
    require_consent(&opts.respondent)?;
    let start = std::time::Instant::now();

    let mut items = load_survey(&opts.path, opts.delimiter)?;
    apply_answers(&mut items, &opts.answers)?;
    let (by_category, global_mean, worst, prompt) = survey_prompt(&items, &opts.respondent);

    let analysis = match llm.complete(&prompt, GenerationParams::ADVISORY).await {
        Ok(a) => Some(a),
        Err(e) => {
            inline_generation_failure("Survey analysis", e.into())?;
            None
        }
    };

    let mut site_url = None;
    let mut site_analysis = None;
    if let Some(raw) = opts.site_url.as_deref() {
        let url = normalize_site_url(raw)?;
        let text = site_text(&url).await;
        if text.starts_with("[ERROR]") {
            warn!("Website analysis uses fetch error text - url={}", url);
        }
        match analyze_site(llm, opts.respondent.company.as_deref(), analysis.as_deref(), &text).await {
            Ok(a) => site_analysis = Some(a),
            Err(e) => inline_generation_failure("Website analysis", e)?,
        }
        site_url = Some(url.to_string());
    }

    let report = SurveyReport {
        by_category,
        global_mean,
        worst,
        items,
        prompt,
        analysis,
        site_url,
        site_analysis,
    };

    let dir = date_dir(&opts.output_dir, &at)?;
    std::fs::write(dir.join("survey.json"), serde_json::to_vec_pretty(&report)?)?;
    let radar = radar_series(&report.by_category);
    write_survey_viz(&dir, &at.format("%Y-%m-%d").to_string(), &report.by_category, &radar)?;

    let mut sections = vec![
        HtmlSection { title: "Summary by category".into(), body_html: render_scores_html(&report.by_category, report.global_mean) },
        HtmlSection { title: "Lowest-scored questions".into(), body_html: render_worst_html(&report.worst) },
        HtmlSection {
            title: "AI analysis".into(),
            body_html: narrative_to_html(report.analysis.as_deref().unwrap_or("")),
        },
    ];
    if let Some(a) = report.site_analysis.as_deref() {
        sections.push(HtmlSection { title: "Website analysis".into(), body_html: narrative_to_html(a) });
    }
    let title = match opts.respondent.company.as_deref() {
        Some(c) => format!("Diagnostic report: {}", c),
        None => "Diagnostic report".to_string(),
    };
    let html = render_report_html(&title, &at.format("%Y-%m-%d %H:%M").to_string(), &sections);
    let filename = report_filename(&opts.html_prefix, &at);
    let html_path = dir.join(&filename);
    std::fs::write(&html_path, html.as_bytes())?;

    deliver_best_effort(html.as_bytes(), &filename, deliveries.backup, deliveries.email).await;
    info!(
        "Survey pipeline completed - duration={:.2}s, questions={}, categories={}",
        start.elapsed().as_secs_f32(),
        report.items.len(),
        report.by_category.len()
    );
    Ok((report, html_path))
}

/// Narrate `script` as a video. Failures are reported, never fatal; `None` means no artifact.
pub async fn run_video(media: &dyn MediaGenerator, script: &str) -> Result<Option<String>> {
    if script.trim().is_empty() {
        bail!("Nothing to narrate: the report has no narrative");
    }
    let start = std::time::Instant::now();
    match media.render(script).await {
        Ok(url) => {
            info!("Video ready - duration={:.2}s, url={}", start.elapsed().as_secs_f32(), url);
            Ok(Some(url))
        }
        Err(e) => {
            error!("Video generation failed - error={}", e);
            println!("Could not generate the video: {}", e);
            Ok(None)
        }
    }
}
