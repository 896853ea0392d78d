use anyhow::{bail, Result};
use std::collections::HashSet;

use crate::load::resolve_column;
use crate::models::{MentionRecord, MentionTable};

/// Placeholder territory value hidden from selectable options.
pub const UNASSIGNED: &str = "no asignado";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterStep {
    pub column: String,
    pub selected: Vec<String>, // empty keeps every row
}

/// Ordered filters; each step sees only the rows kept by the previous ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterChain {
    pub steps: Vec<FilterStep>,
}

impl FilterChain {
    /// Parse `Column=a,b` specs and resolve column names against the table.
    pub fn parse(specs: &[String], table: &MentionTable) -> Result<Self> {
        let mut steps = Vec::with_capacity(specs.len());
        for spec in specs {
            let Some((col, values)) = spec.split_once('=') else {
                bail!("filter '{}' must look like Column=value1,value2", spec);
            };
            let column = resolve_column(table, col.trim())?;
            let selected = values
                .split(',')
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect();
            steps.push(FilterStep { column, selected });
        }
        Ok(Self { steps })
    }

    pub fn is_empty(&self) -> bool {
        self.steps.iter().all(|s| s.selected.is_empty())
    }

    fn keeps(step: &FilterStep, r: &MentionRecord) -> bool {
        step.selected.is_empty()
            || r.field(&step.column).map(|v| step.selected.iter().any(|s| s == v)).unwrap_or(false)
    }

    pub fn apply(&self, table: &MentionTable) -> MentionTable {
        self.apply_prefix(table, self.steps.len())
    }

    fn apply_prefix(&self, table: &MentionTable, n: usize) -> MentionTable {
        let steps = &self.steps[..n.min(self.steps.len())];
        let records = table
            .records
            .iter()
            .filter(|r| steps.iter().all(|s| Self::keeps(s, r)))
            .cloned()
            .collect();
        table.with_records(records)
    }

    /// Values selectable for `column` given the steps that precede it in the chain
    /// (all steps when the column is not part of the chain), first-appearance order.
    pub fn options_for(&self, table: &MentionTable, column: &str) -> Vec<String> {
        let upto = self.steps.iter().position(|s| s.column == column).unwrap_or(self.steps.len());
        let narrowed = self.apply_prefix(table, upto);
        let mut seen = HashSet::new();
        narrowed
            .records
            .iter()
            .filter_map(|r| r.field(column))
            .filter(|v| !v.trim().eq_ignore_ascii_case(UNASSIGNED))
            .filter(|v| seen.insert(v.to_string()))
            .map(|v| v.to_string())
            .collect()
    }
}
