use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::models::{round1, AggregateRow, MentionTable};

#[derive(Default)]
struct Sums {
    negative: u64,
    neutral: u64,
    positive: u64,
    total: u64,
}

fn pct(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        round1(count as f64 / total as f64 * 100.0)
    }
}

/// One row per distinct label of `group_by`, ordered by label.
/// Rows with an empty label are left out of every group.
pub fn aggregate_by(table: &MentionTable, group_by: &str) -> Vec<AggregateRow> {
    let mut groups: BTreeMap<&str, Sums> = BTreeMap::new();
    let mut unlabelled = 0usize;

    for r in &table.records {
        let Some(label) = r.field(group_by) else {
            unlabelled += 1;
            continue;
        };
        let s = groups.entry(label).or_default();
        s.negative += r.negative;
        s.neutral += r.neutral;
        s.positive += r.positive;
        s.total += r.total;
    }

    if unlabelled > 0 {
        debug!("Aggregation skipped unlabelled rows - column={}, rows={}", group_by, unlabelled);
    }

    let rows: Vec<AggregateRow> = groups
        .into_iter()
        .map(|(label, s)| {
            let zero_total = s.total == 0;
            if zero_total {
                warn!("Group has zero total mentions - label={}, percentages reported as 0", label);
            }
            AggregateRow {
                label: label.to_string(),
                negative: s.negative,
                neutral: s.neutral,
                positive: s.positive,
                total: s.total,
                negative_pct: pct(s.negative, s.total),
                neutral_pct: pct(s.neutral, s.total),
                positive_pct: pct(s.positive, s.total),
                zero_total,
            }
        })
        .collect();

    debug!("Aggregation completed - column={}, groups={}", group_by, rows.len());
    rows
}

/// Sentiment totals over the whole table, in (negative, neutral, positive) order.
pub fn sentiment_totals(table: &MentionTable) -> (u64, u64, u64) {
    table.records.iter().fold((0, 0, 0), |(n, u, p), r| {
        (n + r.negative, u + r.neutral, p + r.positive)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MentionRecord;

    fn rec(label: &str, neg: u64, neu: u64, pos: u64) -> MentionRecord {
        MentionRecord {
            text: Some(format!("{label} text")),
            fields: BTreeMap::from([("Fuente".to_string(), label.to_string())]),
            negative: neg,
            neutral: neu,
            positive: pos,
            total: neg + neu + pos,
        }
    }

    fn table(records: Vec<MentionRecord>) -> MentionTable {
        MentionTable {
            text_column: "Mencion".into(),
            category_columns: vec!["Fuente".into()],
            records,
        }
    }

    #[test]
    fn two_group_scenario() {
        let t = table(vec![rec("A", 0, 0, 1), rec("B", 0, 1, 0), rec("A", 1, 0, 0), rec("A", 0, 0, 1)]);
        let rows = aggregate_by(&t, "Fuente");
        assert_eq!(rows.len(), 2);

        let a = &rows[0];
        assert_eq!((a.label.as_str(), a.negative, a.neutral, a.positive, a.total), ("A", 1, 0, 2, 3));
        assert_eq!(a.negative_pct, 33.3);
        assert_eq!(a.neutral_pct, 0.0);
        assert_eq!(a.positive_pct, 66.7);

        let b = &rows[1];
        assert_eq!(b.label, "B");
        assert_eq!(b.neutral_pct, 100.0);
        assert_eq!(b.negative_pct + b.positive_pct, 0.0);
    }

    #[test]
    fn percentages_sum_to_hundred() {
        let t = table(vec![
            rec("x", 7, 11, 13),
            rec("y", 1, 1, 1),
            rec("z", 2, 0, 5),
            rec("w", 123, 456, 789),
        ]);
        for r in aggregate_by(&t, "Fuente") {
            let s = r.negative_pct + r.neutral_pct + r.positive_pct;
            assert!((s - 100.0).abs() <= 0.15, "{} sums to {}", r.label, s);
        }
    }

    #[test]
    fn zero_total_is_flagged_not_nan() {
        let t = table(vec![rec("vacio", 0, 0, 0)]);
        let rows = aggregate_by(&t, "Fuente");
        assert!(rows[0].zero_total);
        assert_eq!(rows[0].negative_pct, 0.0);
        assert!(!rows[0].positive_pct.is_nan());
    }

    #[test]
    fn ordering_is_lexical_and_unlabelled_rows_are_dropped() {
        let t = table(vec![rec("zeta", 1, 0, 0), rec("", 1, 0, 0), rec("alfa", 0, 0, 1)]);
        let labels: Vec<_> = aggregate_by(&t, "Fuente").into_iter().map(|r| r.label).collect();
        assert_eq!(labels, vec!["alfa", "zeta"]);
    }

    #[test]
    fn totals_over_table() {
        let t = table(vec![rec("a", 1, 2, 3), rec("b", 4, 5, 6)]);
        assert_eq!(sentiment_totals(&t), (5, 7, 9));
    }
}
