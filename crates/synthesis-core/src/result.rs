use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Confidence, InsightType, MetricNumber, Sentiment};

/// Score neutral batches fall back to
pub const NEUTRAL_SCORE: f64 = 50.0;

/// Weighted score for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct CategoryScore {
    /// 0 to 100
    pub score: f64,
    /// Renormalized table weight used in the overall score
    pub weight: f64,
    pub sentiment: Sentiment,
    /// Sum of contributing card weights
    pub coverage: f64,
    pub card_count: usize,
    pub card_ids: Vec<String>,
}

/// A deduplicated, ranked insight with the cards that raised it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct KeyTakeaway {
    pub insight_type: InsightType,
    pub message: String,
    /// 1 (highest) to 3
    pub priority: u8,
    pub confidence: Confidence,
    pub signal_strength: u8,
    pub source_cards: Vec<String>,
    pub related_metric_ids: Vec<String>,
}

/// Cards sharing a topic that disagree in direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub topic: String,
    pub bullish_cards: Vec<String>,
    pub bearish_cards: Vec<String>,
    /// Sum of confidence weight x signal strength on the bullish side
    pub bullish_conviction: f64,
    pub bearish_conviction: f64,
    /// `None` when both sides carry equal conviction
    pub favored: Option<Sentiment>,
    pub resolution: String,
}

/// How soon an action item needs attention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Immediate,
    Soon,
    Monitor,
}

impl Urgency {
    pub fn from_priority(priority: u8) -> Self {
        match priority {
            0 | 1 => Urgency::Immediate,
            2 => Urgency::Soon,
            _ => Urgency::Monitor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ActionItem {
    pub action: String,
    /// Card that raised the item; the best-ranked one when several did
    pub source: String,
    pub urgency: Urgency,
    pub priority: u8,
    pub insight_type: InsightType,
}

/// Polarity of a metric's interpretation bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum MetricTone {
    Positive,
    Neutral,
    Negative,
}

/// One entry of the merged metric panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct TopMetric {
    /// Merge key: normalized label, or the metric id when unlabeled
    pub key: String,
    pub id: Option<String>,
    pub label: String,
    pub value: MetricNumber,
    pub interpretation: String,
    pub tone: MetricTone,
    pub format: Option<String>,
    pub priority: u8,
    pub trend: Option<String>,
    pub benchmark: Option<MetricNumber>,
    pub source_card: String,
    pub category: String,
    /// Every card that reported a metric under this key
    pub reported_by: Vec<String>,
}

/// Compact per-card line for the rendering layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct CardSummary {
    pub card_id: String,
    pub category: String,
    pub sentiment: Sentiment,
    pub confidence: Confidence,
    pub signal_strength: u8,
    pub score: Option<f64>,
    pub headline: Option<String>,
}

/// Pipeline stage that recorded a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Ingestion,
    Normalization,
    CategoryAggregation,
}

/// Something dropped or corrected while processing a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub stage: Stage,
    pub card_id: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(stage: Stage, card_id: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            stage,
            card_id: card_id.map(str::to_string),
            message: message.into(),
        }
    }
}

/// Cross-card verdict for one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct SynthesisResult {
    pub symbol: String,
    pub as_of: Option<DateTime<Utc>>,
    pub overall_sentiment: Sentiment,
    pub overall_confidence: Confidence,
    /// 0 to 100
    pub overall_score: f64,
    pub category_scores: BTreeMap<String, CategoryScore>,
    pub key_takeaways: Vec<KeyTakeaway>,
    pub conflicts: Vec<Conflict>,
    pub action_items: Vec<ActionItem>,
    pub top_metrics: Vec<TopMetric>,
    pub card_summaries: Vec<CardSummary>,
    pub all_tags: Vec<String>,
    pub suggested_cards: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl SynthesisResult {
    /// Result for a batch with nothing to say
    pub fn neutral(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            as_of: None,
            overall_sentiment: Sentiment::Neutral,
            overall_confidence: Confidence::Low,
            overall_score: NEUTRAL_SCORE,
            category_scores: BTreeMap::new(),
            key_takeaways: Vec::new(),
            conflicts: Vec::new(),
            action_items: Vec::new(),
            top_metrics: Vec::new(),
            card_summaries: Vec::new(),
            all_tags: Vec::new(),
            suggested_cards: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// True when some input had to be dropped or corrected
    pub fn is_degraded(&self) -> bool {
        !self.diagnostics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urgency_from_priority() {
        assert_eq!(Urgency::from_priority(1), Urgency::Immediate);
        assert_eq!(Urgency::from_priority(2), Urgency::Soon);
        assert_eq!(Urgency::from_priority(3), Urgency::Monitor);
        assert!(Urgency::Immediate < Urgency::Monitor);
    }

    #[test]
    fn test_neutral_result_serializes_camel_case() {
        let result = SynthesisResult::neutral("MSFT");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["overallScore"], 50.0);
        assert_eq!(json["overallSentiment"], "neutral");
        assert_eq!(json["overallConfidence"], "low");
        assert!(json["keyTakeaways"].as_array().unwrap().is_empty());
        assert!(!result.is_degraded());
    }
}
