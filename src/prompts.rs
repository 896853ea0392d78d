use anyhow::Result;

use crate::budget::{fit_to_budget, PromptBudget};
use crate::models::{AggregateRow, CategoryScore, ExampleBundle, LexicalDigest, SurveyItem};
use crate::render::{render_aggregate_markdown, render_digest_markdown, render_examples_markdown};

fn with_base(base: Option<&str>, body: String) -> String {
    match base.map(str::trim).filter(|b| !b.is_empty()) {
        Some(b) => format!("{}\n\n{}", b, body),
        None => body,
    }
}

pub fn user_mention_report(
    label_column: &str,
    per_group: usize,
    table_md: &str,
    examples_md: &str,
    stats_md: &str,
) -> String {
    format!(r#"## Aggregate summary by {label}
{table}

## Representative mentions ({n} per {label})
{examples}

## Quantitative insights
{stats}

Write an analysis of these mentions in at most 100 words, with the following components:
Status summary, Positive and negative themes, Highlighted channels and topics.
Do not include titles. Answer in the language of the mentions."#,
        label = label_column,
        n = per_group,
        table = table_md,
        examples = examples_md,
        stats = stats_md)
}

pub struct ReportPromptInputs<'a> {
    pub base_prompt: Option<&'a str>,
    pub label_column: &'a str,
    pub per_group: usize,
    pub rows: &'a [AggregateRow],
    pub examples: &'a ExampleBundle,
    pub digest: &'a LexicalDigest,
}

/// Full report prompt, shrinking example text until it fits `budget`.
pub fn assemble_report_prompt(inputs: &ReportPromptInputs<'_>, budget: PromptBudget) -> Result<String> {
    let table_md = render_aggregate_markdown(inputs.rows, inputs.label_column);
    let stats_md = render_digest_markdown(inputs.digest);
    fit_to_budget(budget, |cap| {
        let examples_md = render_examples_markdown(inputs.examples, cap);
        with_base(
            inputs.base_prompt,
            user_mention_report(inputs.label_column, inputs.per_group, &table_md, &examples_md, &stats_md),
        )
    })
}

pub fn user_question(base: Option<&str>, sample_table: &str, question: &str) -> String {
    with_base(
        base,
        format!(r#"These are individual example mentions:
{sample}

Answer clearly and usefully:
{question}"#,
            sample = sample_table,
            question = question.trim()),
    )
}

pub fn survey_summary_text(
    company: Option<&str>,
    by_category: &[CategoryScore],
    global_mean: f64,
    name: Option<&str>,
    phone: Option<&str>,
    monthly_sales: Option<&str>,
) -> String {
    let mut lines = vec![
        format!("Company: {}", company.unwrap_or("N/A")),
        "Summary by category:".to_string(),
    ];
    for c in by_category {
        lines.push(format!("- {}: n={}, mean={}", c.category, c.count, c.mean));
    }
    lines.push(format!("Overall mean: {}", global_mean));
    lines.push(format!("Name: {}", name.unwrap_or("N/A")));
    lines.push(format!("Phone: {}", phone.unwrap_or("N/A")));
    lines.push(format!("Average monthly sales: {}", monthly_sales.unwrap_or("N/A")));
    lines.join("\n")
}

pub fn user_survey(summary: &str, worst: &[SurveyItem]) -> String {
    let worst_text = worst
        .iter()
        .map(|w| format!("- ({}) {} -> {}", w.category, w.question, w.rating))
        .collect::<Vec<_>>()
        .join("\n");
    format!(r#"You are an expert consultant. Based on this diagnostic (scale 1–3: 1=No, 2=Partially, 3=Yes), deliver ONLY:
1) Key findings (max. 6 bullets)
2) Prioritized, actionable recommendations (3–5 items; justify the priority)
3) Risks of not acting (max. 5)

Quantitative context:
{summary}

Lowest-scored questions:
{worst}"#,
        summary = summary,
        worst = worst_text)
}

pub fn user_site(company: Option<&str>, previous_analysis: Option<&str>, site_text: &str) -> String {
    format!(r#"You are a digital consultant. Take the previous quantitative and qualitative diagnostic and contrast it with the website content.
Deliver:
- Signals of alignment/misalignment between the diagnostic and the site.
- UX, content and trust-signal recommendations.
- 5 prioritized web actions (impact vs. effort).

[Company]
{company}

[Previous AI diagnostic]
{analysis}

[Site content]
{site}"#,
        company = company.unwrap_or("N/A"),
        analysis = previous_analysis.unwrap_or("(No base analysis yet. Run the survey analysis first.)"),
        site = site_text)
}
