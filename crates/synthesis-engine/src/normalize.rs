//! Metric Normalizer
//!
//! Validates each card record once at ingestion and produces the normalized
//! view every later stage works from. Bad fields are dropped or clamped with a
//! diagnostic; nothing here aborts the batch except a batch with no symbol.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use synthesis_core::{
    normalize_category, CardOutput, Confidence, Diagnostic, Insight, InsightType, MetricNumber,
    MetricTone, MetricValue, Sentiment, Stage, SynthesisError,
};

const MIN_SIGNAL_STRENGTH: i64 = 1;
const MAX_SIGNAL_STRENGTH: i64 = 5;
const MIN_PRIORITY: i64 = 1;
const MAX_PRIORITY: i64 = 3;

/// A validated score contribution
#[derive(Debug, Clone, PartialEq)]
pub struct Contribution {
    pub category: String,
    pub score: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedInsight {
    pub kind: InsightType,
    pub message: String,
    pub priority: u8,
    pub related_metric_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedCard {
    pub card_id: String,
    pub category: String,
    pub sentiment: Sentiment,
    pub confidence: Confidence,
    pub signal_strength: u8,
    pub as_of: Option<DateTime<Utc>>,
    pub contribution: Option<Contribution>,
    pub insights: Vec<NormalizedInsight>,
    /// Lower-cased, deduplicated, sorted
    pub tags: Vec<String>,
    pub suggested_cards: Vec<String>,
}

impl NormalizedCard {
    /// The insight this card leads with
    pub fn headline(&self) -> Option<&NormalizedInsight> {
        self.insights
            .iter()
            .min_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.message.cmp(&b.message)))
    }
}

/// A metric tagged with the card and category it came from
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMetric {
    pub card_id: String,
    pub category: String,
    /// Merge key: normalized label, or the id when unlabeled
    pub key: String,
    pub id: Option<String>,
    pub label: String,
    pub value: MetricNumber,
    /// |value|, 0 when the value has no numeric reading
    pub magnitude: f64,
    pub interpretation: String,
    pub tone: MetricTone,
    pub format: Option<String>,
    pub priority: u8,
    pub trend: Option<String>,
    pub benchmark: Option<MetricNumber>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBatch {
    pub symbol: String,
    pub as_of: Option<DateTime<Utc>>,
    /// Sorted by card id
    pub cards: Vec<NormalizedCard>,
    pub metrics: Vec<NormalizedMetric>,
}

/// Log a dropped or corrected input and keep it for the result
pub(crate) fn note(
    diagnostics: &mut Vec<Diagnostic>,
    stage: Stage,
    card_id: Option<&str>,
    message: impl Into<String>,
) {
    let diagnostic = Diagnostic::new(stage, card_id, message);
    tracing::warn!(
        "[{:?}] {}: {}",
        diagnostic.stage,
        diagnostic.card_id.as_deref().unwrap_or("<batch>"),
        diagnostic.message
    );
    diagnostics.push(diagnostic);
}

/// Validate a batch of card outputs.
///
/// Fails only when a non-empty batch has no card carrying a symbol.
pub fn normalize_batch(
    cards: &[CardOutput],
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<NormalizedBatch, SynthesisError> {
    if cards.is_empty() {
        return Ok(NormalizedBatch {
            symbol: String::new(),
            as_of: None,
            cards: Vec::new(),
            metrics: Vec::new(),
        });
    }

    let symbol = resolve_symbol(cards.iter().filter_map(|c| c.symbol.as_deref())).ok_or_else(|| {
        SynthesisError::InvalidBatch(format!("none of the {} card records carries a symbol", cards.len()))
    })?;

    let mut by_id: BTreeMap<&str, Vec<&CardOutput>> = BTreeMap::new();
    for raw in cards {
        let card_id = raw.card_id.trim();
        if card_id.is_empty() {
            note(diagnostics, Stage::Normalization, None, "Dropped card record without a cardId");
            continue;
        }
        if let Some(card_symbol) = raw.symbol.as_deref().map(canonical_symbol) {
            if !card_symbol.is_empty() && card_symbol != symbol {
                note(
                    diagnostics,
                    Stage::Normalization,
                    Some(card_id),
                    format!("Dropped card for symbol {} in a batch for {}", card_symbol, symbol),
                );
                continue;
            }
        }
        by_id.entry(card_id).or_default().push(raw);
    }

    let mut normalized = Vec::with_capacity(by_id.len());
    let mut metrics = Vec::new();
    for (card_id, mut records) in by_id {
        records.sort_by(|a, b| preferred_record(a, b));
        let Some((raw, duplicates)) = records.split_first() else {
            continue;
        };
        for _ in duplicates {
            note(diagnostics, Stage::Normalization, Some(card_id), "Dropped duplicate card record");
        }

        let card = normalize_card(raw, card_id, diagnostics);
        for metric in &raw.key_metrics {
            if let Some(metric) = normalize_metric(metric, &card, diagnostics) {
                metrics.push(metric);
            }
        }
        normalized.push(card);
    }

    metrics.sort_by(|a, b| a.card_id.cmp(&b.card_id).then_with(|| a.key.cmp(&b.key)));

    let as_of = normalized.iter().filter_map(|c| c.as_of).max();

    tracing::debug!(
        "Normalized {} of {} cards for {} ({} metrics)",
        normalized.len(),
        cards.len(),
        symbol,
        metrics.len()
    );

    Ok(NormalizedBatch {
        symbol,
        as_of,
        cards: normalized,
        metrics,
    })
}

fn canonical_symbol(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Most frequent symbol; ties go to the lexicographically smallest
pub(crate) fn resolve_symbol<'a>(symbols: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for symbol in symbols.map(canonical_symbol) {
        if !symbol.is_empty() {
            *counts.entry(symbol).or_default() += 1;
        }
    }
    // max_by_key keeps the last maximum, so walk in reverse to favor the smallest name
    counts
        .into_iter()
        .rev()
        .max_by_key(|(_, count)| *count)
        .map(|(symbol, _)| symbol)
}

/// Which of two records sharing a cardId to keep, independent of batch order:
/// higher confidence, then stronger signal, then higher score. Records equal
/// on all three fall back to their serialized form.
fn preferred_record(a: &CardOutput, b: &CardOutput) -> Ordering {
    let score = |card: &CardOutput| {
        card.score_contribution
            .as_ref()
            .and_then(|c| c.score)
            .unwrap_or(f64::NEG_INFINITY)
    };
    b.confidence
        .cmp(&a.confidence)
        .then_with(|| b.signal_strength.cmp(&a.signal_strength))
        .then_with(|| score(b).total_cmp(&score(a)))
        .then_with(|| {
            let fingerprint = |card: &CardOutput| serde_json::to_string(card).unwrap_or_default();
            fingerprint(a).cmp(&fingerprint(b))
        })
}

fn normalize_card(card: &CardOutput, card_id: &str, diagnostics: &mut Vec<Diagnostic>) -> NormalizedCard {
    let signal_strength = card.signal_strength.clamp(MIN_SIGNAL_STRENGTH, MAX_SIGNAL_STRENGTH);
    if signal_strength != card.signal_strength {
        note(
            diagnostics,
            Stage::Normalization,
            Some(card_id),
            format!("Signal strength {} clamped to {}", card.signal_strength, signal_strength),
        );
    }

    let contribution = normalize_contribution(card, card_id, diagnostics);

    let mut category = normalize_category(&card.category);
    if category.is_empty() {
        category = contribution
            .as_ref()
            .map(|c| c.category.clone())
            .unwrap_or_else(|| "uncategorized".to_string());
    }

    let insights = card
        .insights
        .iter()
        .filter_map(|insight| normalize_insight(insight, card_id, diagnostics))
        .collect();

    let tags: BTreeSet<String> = card
        .tags
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

    let mut suggested_cards: Vec<String> = Vec::new();
    for suggestion in card.suggested_cards.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        if !suggested_cards.iter().any(|s| s == suggestion) {
            suggested_cards.push(suggestion.to_string());
        }
    }

    NormalizedCard {
        card_id: card_id.to_string(),
        category,
        sentiment: card.sentiment,
        confidence: card.confidence,
        signal_strength: signal_strength as u8,
        as_of: card.as_of,
        contribution,
        insights,
        tags: tags.into_iter().collect(),
        suggested_cards,
    }
}

fn normalize_contribution(
    card: &CardOutput,
    card_id: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<Contribution> {
    let Some(raw) = card.score_contribution.as_ref() else {
        note(diagnostics, Stage::Normalization, Some(card_id), "Missing scoreContribution; card not scored");
        return None;
    };

    let category = raw
        .category
        .as_deref()
        .map(normalize_category)
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| normalize_category(&card.category));
    if category.is_empty() {
        note(diagnostics, Stage::Normalization, Some(card_id), "Score contribution has no category; card not scored");
        return None;
    }

    let score = match raw.score {
        Some(s) if s.is_finite() => s,
        _ => {
            note(diagnostics, Stage::Normalization, Some(card_id), "Score contribution has no usable score; card not scored");
            return None;
        }
    };
    let weight = match raw.weight {
        Some(w) if w.is_finite() && w > 0.0 => w,
        other => {
            note(
                diagnostics,
                Stage::Normalization,
                Some(card_id),
                format!("Score contribution weight {:?} is not positive; card not scored", other),
            );
            return None;
        }
    };

    let clamped_score = score.clamp(0.0, 100.0);
    if clamped_score != score {
        note(
            diagnostics,
            Stage::Normalization,
            Some(card_id),
            format!("Score {} clamped to {}", score, clamped_score),
        );
    }
    let clamped_weight = weight.min(1.0);
    if clamped_weight != weight {
        note(
            diagnostics,
            Stage::Normalization,
            Some(card_id),
            format!("Weight {} clamped to 1", weight),
        );
    }

    Some(Contribution {
        category,
        score: clamped_score,
        weight: clamped_weight,
    })
}

fn clamp_priority(
    priority: i64,
    card_id: &str,
    what: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> u8 {
    let clamped = priority.clamp(MIN_PRIORITY, MAX_PRIORITY);
    if clamped != priority {
        note(
            diagnostics,
            Stage::Normalization,
            Some(card_id),
            format!("{} priority {} clamped to {}", what, priority, clamped),
        );
    }
    clamped as u8
}

fn normalize_insight(
    insight: &Insight,
    card_id: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<NormalizedInsight> {
    if insight.kind == InsightType::Unknown {
        note(diagnostics, Stage::Normalization, Some(card_id), "Dropped insight of unrecognized type");
        return None;
    }
    let message = insight.message.trim();
    if message.is_empty() {
        note(diagnostics, Stage::Normalization, Some(card_id), "Dropped insight without a message");
        return None;
    }
    Some(NormalizedInsight {
        kind: insight.kind,
        message: message.to_string(),
        priority: clamp_priority(insight.priority, card_id, "Insight", diagnostics),
        related_metric_ids: insight.related_metric_ids.clone(),
    })
}

fn normalize_metric(
    metric: &MetricValue,
    card: &NormalizedCard,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<NormalizedMetric> {
    let card_id = card.card_id.as_str();
    let id = metric.id.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let label = metric
        .label
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or(id);
    let Some(label) = label else {
        note(diagnostics, Stage::Normalization, Some(card_id), "Dropped metric without label or id");
        return None;
    };
    let Some(value) = metric.value.clone() else {
        note(
            diagnostics,
            Stage::Normalization,
            Some(card_id),
            format!("Dropped metric '{}' without a value", label),
        );
        return None;
    };
    let Some(interpretation) = metric
        .interpretation
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    else {
        note(
            diagnostics,
            Stage::Normalization,
            Some(card_id),
            format!("Dropped metric '{}' without an interpretation", label),
        );
        return None;
    };

    let mut key = metric_key(label);
    if key.is_empty() {
        key = id.map(str::to_lowercase).unwrap_or_default();
    }
    if key.is_empty() {
        note(diagnostics, Stage::Normalization, Some(card_id), "Dropped metric with an empty key");
        return None;
    }

    Some(NormalizedMetric {
        card_id: card_id.to_string(),
        category: card.category.clone(),
        key,
        id: id.map(str::to_string),
        label: label.to_string(),
        magnitude: value.magnitude().map(f64::abs).unwrap_or(0.0),
        value,
        interpretation: interpretation.to_string(),
        tone: interpretation_tone(interpretation),
        format: metric.format.clone(),
        priority: clamp_priority(metric.priority, card_id, "Metric", diagnostics),
        trend: metric.trend.clone(),
        benchmark: metric.benchmark.clone(),
    })
}

/// "P/E Ratio (TTM)" -> "p e ratio ttm"
pub fn metric_key(label: &str) -> String {
    label
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

const POSITIVE_WORDS: &[&str] = &[
    "excellent", "good", "great", "strong", "healthy", "safe", "bullish", "undervalued",
    "cheap", "attractive", "positive", "favorable", "improving", "outperform", "oversold",
];
const NEGATIVE_WORDS: &[&str] = &[
    "poor", "weak", "bad", "distress", "distressed", "danger", "critical", "bearish",
    "overvalued", "expensive", "negative", "unfavorable", "deteriorating", "underperform",
    "overbought", "unsafe",
];

/// Polarity of an interpretation bucket such as "excellent", "fair" or "high risk"
pub fn interpretation_tone(interpretation: &str) -> MetricTone {
    let lowered = interpretation.to_lowercase();
    let tokens: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    let risk_qualifier = tokens
        .windows(2)
        .find(|pair| pair[1] == "risk")
        .map(|pair| pair[0]);
    match risk_qualifier {
        Some("high" | "elevated" | "extreme") => return MetricTone::Negative,
        Some("low" | "minimal") => return MetricTone::Positive,
        _ => {}
    }

    if tokens.iter().any(|t| NEGATIVE_WORDS.contains(t)) {
        MetricTone::Negative
    } else if tokens.iter().any(|t| POSITIVE_WORDS.contains(t)) {
        MetricTone::Positive
    } else {
        MetricTone::Neutral
    }
}
