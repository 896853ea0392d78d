use serde::{Deserialize, Serialize};

use crate::models::{AggregateRow, CategoryScore, ExampleBundle, LexicalDigest, SurveyItem};

/// Everything one mention-report request produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MentionReport {
    pub group_by: String,
    pub rows: Vec<AggregateRow>,
    pub examples: ExampleBundle,
    pub digest: LexicalDigest,
    pub prompt: String,
    pub narrative: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyReport {
    pub by_category: Vec<CategoryScore>,
    pub global_mean: f64,
    pub worst: Vec<SurveyItem>,
    pub items: Vec<SurveyItem>,
    pub prompt: String,
    pub analysis: Option<String>,
    pub site_url: Option<String>,
    pub site_analysis: Option<String>,
}

/// Radar polygon; the first point is repeated at the end to close it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RadarSeries {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
    pub range: [f64; 2],
}
