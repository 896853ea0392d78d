use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use tracing::debug;
use xxhash_rust::xxh3::xxh3_64;

use crate::models::{ExampleBundle, MentionTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleParams {
    pub per_group: usize, // default 5
    pub seed: u64,        // default 42
}

impl Default for SampleParams {
    fn default() -> Self {
        Self { per_group: 5, seed: 42 }
    }
}

/// Each label draws from its own stream so adding a group never reshuffles another.
fn rng_for(label: &str, seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed ^ xxh3_64(label.as_bytes()))
}

/// Up to `per_group` non-empty bodies per label, uniform without replacement.
pub fn sample_examples(table: &MentionTable, group_by: &str, params: SampleParams) -> ExampleBundle {
    let mut eligible: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for r in &table.records {
        if let (Some(label), Some(body)) = (r.field(group_by), r.body()) {
            eligible.entry(label).or_default().push(body);
        }
    }

    let mut out = ExampleBundle::new();
    for (label, bodies) in eligible {
        let picked: Vec<String> = if bodies.len() <= params.per_group {
            bodies.iter().map(|s| s.to_string()).collect()
        } else {
            let mut rng = rng_for(label, params.seed);
            sample(&mut rng, bodies.len(), params.per_group)
                .into_iter()
                .map(|i| bodies[i].to_string())
                .collect()
        };
        debug!("Sampled examples - label={}, eligible={}, picked={}", label, bodies.len(), picked.len());
        out.insert(label.to_string(), picked);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MentionRecord;

    fn table(rows: &[(&str, Option<&str>)]) -> MentionTable {
        MentionTable {
            text_column: "Mencion".into(),
            category_columns: vec!["Fuente".into()],
            records: rows
                .iter()
                .map(|(label, text)| MentionRecord {
                    text: text.map(|s| s.to_string()),
                    fields: BTreeMap::from([("Fuente".to_string(), label.to_string())]),
                    negative: 0,
                    neutral: 1,
                    positive: 0,
                    total: 1,
                })
                .collect(),
        }
    }

    fn many(label: &'static str, n: usize) -> Vec<(&'static str, Option<String>)> {
        (0..n).map(|i| (label, Some(format!("{label} mention {i}")))).collect()
    }

    fn owned_table(rows: Vec<(&'static str, Option<String>)>) -> MentionTable {
        let borrowed: Vec<(&str, Option<&str>)> =
            rows.iter().map(|(l, t)| (*l, t.as_deref())).collect();
        table(&borrowed)
    }

    #[test]
    fn deterministic_for_fixed_seed() {
        let t = owned_table(many("twitter", 40));
        let a = sample_examples(&t, "Fuente", SampleParams::default());
        let b = sample_examples(&t, "Fuente", SampleParams::default());
        assert_eq!(a, b);
        assert_eq!(a["twitter"].len(), 5);
    }

    #[test]
    fn different_seed_changes_sample() {
        let t = owned_table(many("twitter", 200));
        let a = sample_examples(&t, "Fuente", SampleParams { per_group: 5, seed: 42 });
        let b = sample_examples(&t, "Fuente", SampleParams { per_group: 5, seed: 7 });
        assert_ne!(a, b);
    }

    #[test]
    fn small_groups_return_everything_without_padding() {
        let t = table(&[("web", Some("uno")), ("web", None), ("web", Some("  ")), ("web", Some("dos"))]);
        let s = sample_examples(&t, "Fuente", SampleParams::default());
        assert_eq!(s["web"], vec!["uno".to_string(), "dos".to_string()]);
    }

    #[test]
    fn samples_are_distinct_members_of_their_group() {
        let mut rows = many("a", 12);
        rows.extend(many("b", 9));
        let t = owned_table(rows);
        let s = sample_examples(&t, "Fuente", SampleParams::default());
        for (label, picked) in &s {
            let mut uniq = picked.clone();
            uniq.sort();
            uniq.dedup();
            assert_eq!(uniq.len(), picked.len());
            assert!(picked.iter().all(|p| p.starts_with(label.as_str())));
        }
    }

    #[test]
    fn group_sample_is_independent_of_other_groups() {
        let base = owned_table(many("a", 30));
        let mut rows = many("a", 30);
        rows.extend(many("b", 30));
        let extended = owned_table(rows);
        let p = SampleParams::default();
        assert_eq!(sample_examples(&base, "Fuente", p)["a"], sample_examples(&extended, "Fuente", p)["a"]);
    }
}
