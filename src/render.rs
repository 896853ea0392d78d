// src/render.rs
use itertools::Itertools;
use pulldown_cmark::{html, Event, Options, Parser};

use crate::budget::clip_chars;
use crate::models::{AggregateRow, CategoryScore, ExampleBundle, LexicalDigest, MentionTable, SurveyItem};

fn md_cell(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ")
}

/// Percentage cells, `n/a` for a group whose counts sum to zero.
fn pct_cells(r: &AggregateRow) -> [String; 3] {
    if r.zero_total {
        return ["n/a".into(), "n/a".into(), "n/a".into()];
    }
    [r.negative_pct, r.neutral_pct, r.positive_pct].map(|p| format!("{:.1}%", p))
}

pub fn render_aggregate_markdown(rows: &[AggregateRow], label_header: &str) -> String {
    let headers = [label_header, "Neg", "Neu", "Pos", "Total", "Neg_pct", "Neu_pct", "Pos_pct"];
    let mut lines = vec![
        format!("| {} |", headers.iter().map(|h| md_cell(h)).join(" | ")),
        format!("| {} |", vec!["---"; headers.len()].join(" | ")),
    ];
    for r in rows {
        let [neg, neu, pos] = pct_cells(r);
        lines.push(format!(
            "| {} | {} | {} | {} | {} | {} | {} | {} |",
            md_cell(&r.label),
            r.negative,
            r.neutral,
            r.positive,
            r.total,
            neg,
            neu,
            pos
        ));
    }
    lines.join("\n")
}

pub fn render_examples_markdown(examples: &ExampleBundle, max_chars: usize) -> String {
    examples
        .iter()
        .map(|(label, texts)| {
            let joined = texts
                .iter()
                .map(|t| clip_chars(&t.replace('\n', " "), max_chars))
                .join("; ");
            format!("- **{}**: «{}»", label, joined)
        })
        .join("\n")
}

pub fn render_digest_markdown(d: &LexicalDigest) -> String {
    format!(
        "- Mean mention length: {:.1} characters\n- Top 20 keywords: {}",
        d.mean_length,
        d.top_words.iter().map(|w| w.word.as_str()).join(", ")
    )
}

/// Space-aligned table (text, counts and optional label) over the first `limit` rows.
pub fn render_plain_sample(table: &MentionTable, label_column: Option<&str>, limit: usize) -> String {
    let mut headers = vec![table.text_column.clone(), "Neg".into(), "Neu".into(), "Pos".into()];
    if let Some(l) = label_column {
        headers.push(l.to_string());
    }
    let rows: Vec<Vec<String>> = table
        .records
        .iter()
        .take(limit)
        .map(|r| {
            let mut row = vec![
                clip_chars(r.body().unwrap_or("NaN"), 160).replace('\n', " "),
                r.negative.to_string(),
                r.neutral.to_string(),
                r.positive.to_string(),
            ];
            if let Some(l) = label_column {
                row.push(r.field(l).unwrap_or("NaN").to_string());
            }
            row
        })
        .collect();

    let widths: Vec<usize> = (0..headers.len())
        .map(|i| {
            rows.iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(headers[i].chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let fmt_row = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<width$}", c, width = *w))
            .join("  ")
            .trim_end()
            .to_string()
    };

    std::iter::once(fmt_row(&headers)).chain(rows.iter().map(|r| fmt_row(r))).join("\n")
}

/* ------------------------------- HTML report ------------------------------ */

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Generated text as HTML. Markdown is rendered, raw HTML is escaped and single
/// newlines are kept as line breaks.
pub fn narrative_to_html(text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        return "<p>Not generated yet.</p>".to_string();
    }
    let events = Parser::new_ext(text, Options::ENABLE_STRIKETHROUGH).map(|ev| match ev {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        Event::SoftBreak => Event::HardBreak,
        other => other,
    });
    let mut out = String::with_capacity(text.len() * 2);
    html::push_html(&mut out, events);
    if out.trim().is_empty() {
        // e.g. text made only of link reference definitions
        return plain_text_html(text);
    }
    out.trim_end().to_string()
}

/// Escaped text: blank lines split paragraphs, single newlines become `<br>`.
fn plain_text_html(text: &str) -> String {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| format!("<p>{}</p>", escape_html(p).replace('\n', "<br>")))
        .join("\n")
}

pub fn render_aggregate_html(rows: &[AggregateRow], label_header: &str) -> String {
    let mut html = String::from("<table class='table'>\n<thead><tr>");
    for h in [label_header, "Negative", "Neutral", "Positive", "Total", "Neg %", "Neu %", "Pos %"] {
        html.push_str(&format!("<th>{}</th>", escape_html(h)));
    }
    html.push_str("</tr></thead>\n<tbody>\n");
    for r in rows {
        let [neg, neu, pos] = pct_cells(r);
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            escape_html(&r.label),
            r.negative,
            r.neutral,
            r.positive,
            r.total,
            neg,
            neu,
            pos
        ));
    }
    html.push_str("</tbody>\n</table>");
    html
}

/// Horizontal bars, one per (label, value), scaled to the largest value.
pub fn render_bar_svg(bars: &[(String, u64)]) -> String {
    const BAR_H: usize = 26;
    const LABEL_W: usize = 160;
    const PLOT_W: f64 = 420.0;
    let max = bars.iter().map(|(_, v)| *v).max().unwrap_or(0).max(1) as f64;
    let height = bars.len() * BAR_H + 10;

    let mut svg = format!(
        "<svg xmlns='http://www.w3.org/2000/svg' width='{}' height='{}' role='img'>\n",
        LABEL_W + PLOT_W as usize + 60,
        height
    );
    for (i, (label, v)) in bars.iter().enumerate() {
        let y = i * BAR_H + 5;
        let w = (*v as f64 / max * PLOT_W).round();
        svg.push_str(&format!(
            "<text x='0' y='{}' font-size='13'>{}</text><rect x='{}' y='{}' width='{}' height='{}' fill='#ff5722'/><text x='{}' y='{}' font-size='12'>{}</text>\n",
            y + 16,
            escape_html(&clip_chars(label, 22)),
            LABEL_W,
            y,
            w,
            BAR_H - 6,
            LABEL_W as f64 + w + 6.0,
            y + 16,
            v
        ));
    }
    svg.push_str("</svg>");
    svg
}

pub fn render_scores_html(scores: &[CategoryScore], global_mean: f64) -> String {
    let mut html = String::from("<table class='table'>\n<thead><tr><th>Category</th><th>Questions</th><th>Mean (1–3)</th></tr></thead>\n<tbody>\n");
    for s in scores {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{:.2}</td></tr>\n",
            escape_html(&s.category),
            s.count,
            s.mean
        ));
    }
    html.push_str(&format!("</tbody>\n</table>\n<p><b>Overall mean:</b> {:.2}</p>", global_mean));
    html
}

pub fn render_worst_html(items: &[SurveyItem]) -> String {
    if items.is_empty() {
        return "<p>No questions.</p>".to_string();
    }
    let lis = items
        .iter()
        .map(|i| format!("<li>({}) {} &rarr; {}</li>", escape_html(&i.category), escape_html(&i.question), i.rating))
        .join("\n");
    format!("<ul>\n{}\n</ul>", lis)
}

const REPORT_CSS: &str = r#"<style>
body { font-family: Montserrat, Arial, sans-serif; padding: 24px; background: #f8f5fb; }
h1, h2, h3 { color: #240531; }
.table { width:100%; border-collapse: collapse; }
.table th { background:#ff5722; color:#fff; padding:8px; text-align:left; }
.table td { background:#ffffff; border:1px solid #eee; padding:8px; vertical-align: top; }
.section { background:#fff; border:1px solid #eee; border-radius:12px; padding:16px; margin-bottom:16px; }
</style>"#;

pub struct HtmlSection {
    pub title: String,
    pub body_html: String,
}

/// Self-contained document: inline CSS, no external assets.
pub fn render_report_html(title: &str, generated_at: &str, sections: &[HtmlSection]) -> String {
    let mut html = format!(
        "<!DOCTYPE html>\n<html lang='es'>\n<head>\n<meta charset='utf-8'>\n<title>{t}</title>\n{css}\n</head>\n<body>\n<h1>{t}</h1>\n",
        t = escape_html(title),
        css = REPORT_CSS
    );
    for s in sections {
        html.push_str(&format!(
            "\n<div class='section'>\n  <h2>{}</h2>\n  {}\n</div>\n",
            escape_html(&s.title),
            s.body_html
        ));
    }
    html.push_str(&format!(
        "\n<footer>\n  <p style='color:#666'>Report generated automatically on {}.</p>\n</footer>\n</body>\n</html>\n",
        escape_html(generated_at)
    ));
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MentionRecord, WordCount};
    use std::collections::BTreeMap;

    fn row(label: &str) -> AggregateRow {
        AggregateRow {
            label: label.into(),
            negative: 1,
            neutral: 0,
            positive: 2,
            total: 3,
            negative_pct: 33.3,
            neutral_pct: 0.0,
            positive_pct: 66.7,
            zero_total: false,
        }
    }

    #[test]
    fn markdown_table_layout() {
        let md = render_aggregate_markdown(&[row("A")], "Fuente");
        let lines: Vec<_> = md.lines().collect();
        assert_eq!(lines[0], "| Fuente | Neg | Neu | Pos | Total | Neg_pct | Neu_pct | Pos_pct |");
        assert_eq!(lines[1], "| --- | --- | --- | --- | --- | --- | --- | --- |");
        assert_eq!(lines[2], "| A | 1 | 0 | 2 | 3 | 33.3% | 0.0% | 66.7% |");
    }

    #[test]
    fn zero_total_rows_show_not_applicable() {
        let empty = AggregateRow {
            label: "Radio".into(),
            negative: 0,
            neutral: 0,
            positive: 0,
            total: 0,
            negative_pct: 0.0,
            neutral_pct: 0.0,
            positive_pct: 0.0,
            zero_total: true,
        };
        let md = render_aggregate_markdown(&[row("A"), empty.clone()], "Fuente");
        assert_eq!(md.lines().nth(3), Some("| Radio | 0 | 0 | 0 | 0 | n/a | n/a | n/a |"));
        assert!(md.contains("| 33.3% | 0.0% | 66.7% |"));

        let html = render_aggregate_html(&[empty], "Fuente");
        assert!(html.contains("<td>0</td><td>n/a</td><td>n/a</td><td>n/a</td></tr>"));
        assert!(!html.contains("0.0%"));
    }

    #[test]
    fn pipes_in_labels_are_escaped() {
        let md = render_aggregate_markdown(&[row("a|b")], "Fuente");
        assert!(md.contains("| a\\|b |"));
    }

    #[test]
    fn examples_and_digest() {
        let mut ex = ExampleBundle::new();
        ex.insert("Web".into(), vec!["uno\ndos".into(), "tres".into()]);
        assert_eq!(render_examples_markdown(&ex, 280), "- **Web**: «uno dos; tres»");

        let d = LexicalDigest { top_words: vec![WordCount { word: "luz".into(), count: 3 }], mean_length: 12.0 };
        assert_eq!(
            render_digest_markdown(&d),
            "- Mean mention length: 12.0 characters\n- Top 20 keywords: luz"
        );
    }

    #[test]
    fn plain_sample_is_aligned_and_limited() {
        let records = (0..12)
            .map(|i| MentionRecord {
                text: Some(format!("mención {i}")),
                fields: BTreeMap::from([("Territorio".to_string(), "Norte".to_string())]),
                negative: 0,
                neutral: 1,
                positive: 0,
                total: 1,
            })
            .collect();
        let t = MentionTable { text_column: "Mencion".into(), category_columns: vec!["Territorio".into()], records };
        let out = render_plain_sample(&t, Some("Territorio"), 10);
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 11);
        assert!(lines[0].starts_with("Mencion"));
        assert!(lines[0].ends_with("Territorio"));
        assert!(lines[1].starts_with("mención 0 "));
    }

    #[test]
    fn html_escaping_and_narrative() {
        assert_eq!(escape_html("<b>\"x\" & 'y'</b>"), "&lt;b&gt;&quot;x&quot; &amp; &#39;y&#39;&lt;/b&gt;");
        assert_eq!(narrative_to_html("uno\ndos\n\ntres"), "<p>uno<br />\ndos</p>\n<p>tres</p>");
        assert_eq!(narrative_to_html("  "), "<p>Not generated yet.</p>");
        assert_eq!(plain_text_html("uno\ndos\n\ntres"), "<p>uno<br>dos</p>\n<p>tres</p>");
    }

    #[test]
    fn narrative_markdown_becomes_lists_and_bold() {
        let html = narrative_to_html("1) **Hallazgos clave**\n- Ventas sin CRM\n- Sin web");
        assert!(html.contains("<strong>Hallazgos clave</strong>"));
        assert!(html.contains("<li>Ventas sin CRM</li>"));
        assert!(html.contains("<li>Sin web</li>"));
        assert!(!html.contains("**"));
    }

    #[test]
    fn narrative_raw_html_is_escaped() {
        let html = narrative_to_html("a <script>x</script> & b");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("&amp; b"));
        assert_eq!(narrative_to_html("[ref]: https://x.co"), "<p>[ref]: https://x.co</p>");
    }

    #[test]
    fn report_is_self_contained() {
        let html = render_report_html(
            "Mention report",
            "2025-01-01 10:00",
            &[HtmlSection { title: "Aggregate".into(), body_html: render_aggregate_html(&[row("<A>")], "Fuente") }],
        );
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<td>&lt;A&gt;</td>"));
        assert!(!html.contains("<script src"));
        assert!(!html.contains("<link"));
    }

    #[test]
    fn svg_scales_to_max() {
        let svg = render_bar_svg(&[("Positivo".into(), 10), ("Negativo".into(), 5)]);
        assert!(svg.contains("width='420'"));
        assert!(svg.contains("width='210'"));
    }

    #[test]
    fn survey_tables() {
        let html = render_scores_html(&[CategoryScore { category: "I&D".into(), count: 3, mean: 1.67 }], 2.0);
        assert!(html.contains("<td>I&amp;D</td><td>3</td><td>1.67</td>"));
        assert!(html.contains("Overall mean:</b> 2.00"));
        let worst = render_worst_html(&[SurveyItem { category: "Ventas".into(), question: "¿CRM?".into(), rating: 1 }]);
        assert!(worst.contains("<li>(Ventas) ¿CRM? &rarr; 1</li>"));
        assert_eq!(render_worst_html(&[]), "<p>No questions.</p>");
    }
}
