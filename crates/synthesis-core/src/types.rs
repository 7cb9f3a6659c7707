use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Directional read of a card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Bullish,
    Bearish,
    Neutral,
}

impl Sentiment {
    /// +1 for bullish, -1 for bearish, 0 for neutral
    pub fn signum(&self) -> f64 {
        match self {
            Sentiment::Bullish => 1.0,
            Sentiment::Bearish => -1.0,
            Sentiment::Neutral => 0.0,
        }
    }

    pub fn from_signum(value: f64) -> Self {
        if value > f64::EPSILON {
            Sentiment::Bullish
        } else if value < -f64::EPSILON {
            Sentiment::Bearish
        } else {
            Sentiment::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Bullish => "bullish",
            Sentiment::Bearish => "bearish",
            Sentiment::Neutral => "neutral",
        }
    }
}

/// Card-reported confidence. Ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Numeric conviction used when weighing conflicting sides (1-3)
    pub fn weight(&self) -> f64 {
        match self {
            Confidence::Low => 1.0,
            Confidence::Medium => 2.0,
            Confidence::High => 3.0,
        }
    }

    /// One level lower, saturating at `Low`
    pub fn downgrade(&self) -> Self {
        match self {
            Confidence::High => Confidence::Medium,
            Confidence::Medium | Confidence::Low => Confidence::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

/// Kind of observation an insight carries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum InsightType {
    Strength,
    Weakness,
    Risk,
    Opportunity,
    Action,
    Observation,
    /// Any type string a card emits that we do not recognise, or none at all
    #[default]
    #[serde(other)]
    Unknown,
}

impl InsightType {
    /// Whether insights of this type become action items
    pub fn is_actionable(&self) -> bool {
        matches!(self, InsightType::Action | InsightType::Risk)
    }
}

/// A metric value as cards emit it: either a number or preformatted text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(untagged)]
pub enum MetricNumber {
    Number(f64),
    Text(String),
}

impl MetricNumber {
    /// Numeric magnitude, parsing text like "12.5%", "$1,200" or "3.2x".
    pub fn magnitude(&self) -> Option<f64> {
        match self {
            MetricNumber::Number(v) if v.is_finite() => Some(*v),
            MetricNumber::Number(_) => None,
            MetricNumber::Text(text) => parse_leading_number(text),
        }
    }
}

fn parse_leading_number(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | '€' | '£' | ' ' | '+'))
        .collect();
    let numeric: String = cleaned
        .chars()
        .enumerate()
        .take_while(|(i, c)| c.is_ascii_digit() || *c == '.' || (*i == 0 && *c == '-'))
        .map(|(_, c)| c)
        .collect();
    numeric.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// One metric reported by a card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricValue {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub value: Option<MetricNumber>,
    /// Interpretation bucket, e.g. excellent/good/fair/poor or card-specific words
    #[serde(default)]
    pub interpretation: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: i64,
    #[serde(default)]
    pub trend: Option<String>,
    #[serde(default)]
    pub benchmark: Option<MetricNumber>,
}

impl MetricValue {
    pub fn new(id: &str, label: &str, value: f64, interpretation: &str) -> Self {
        Self {
            label: Some(label.to_string()),
            id: Some(id.to_string()),
            value: Some(MetricNumber::Number(value)),
            interpretation: Some(interpretation.to_string()),
            format: None,
            priority: default_priority(),
            trend: None,
            benchmark: None,
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }
}

/// A short typed observation from a card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    #[serde(rename = "type", default)]
    pub kind: InsightType,
    #[serde(default)]
    pub message: String,
    #[serde(default = "default_priority")]
    pub priority: i64,
    #[serde(default)]
    pub related_metric_ids: Vec<String>,
}

impl Insight {
    pub fn new(kind: InsightType, message: &str, priority: i64) -> Self {
        Self {
            kind,
            message: message.to_string(),
            priority,
            related_metric_ids: Vec::new(),
        }
    }
}

/// How a card feeds the category and overall scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreContribution {
    /// Falls back to the card's own category when absent
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub weight: Option<f64>,
}

/// Standardized output of one dashboard card for one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardOutput {
    pub card_id: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub as_of: Option<DateTime<Utc>>,
    pub sentiment: Sentiment,
    pub confidence: Confidence,
    #[serde(default = "default_signal_strength")]
    pub signal_strength: i64,
    #[serde(default)]
    pub key_metrics: Vec<MetricValue>,
    #[serde(default)]
    pub insights: Vec<Insight>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub suggested_cards: Vec<String>,
    #[serde(default)]
    pub score_contribution: Option<ScoreContribution>,
}

impl CardOutput {
    pub fn new(card_id: &str, category: &str, sentiment: Sentiment, confidence: Confidence) -> Self {
        Self {
            card_id: card_id.to_string(),
            category: category.to_string(),
            symbol: None,
            as_of: None,
            sentiment,
            confidence,
            signal_strength: default_signal_strength(),
            key_metrics: Vec::new(),
            insights: Vec::new(),
            tags: Vec::new(),
            suggested_cards: Vec::new(),
            score_contribution: None,
        }
    }

    pub fn with_symbol(mut self, symbol: &str) -> Self {
        self.symbol = Some(symbol.to_string());
        self
    }

    pub fn with_as_of(mut self, as_of: DateTime<Utc>) -> Self {
        self.as_of = Some(as_of);
        self
    }

    pub fn with_signal_strength(mut self, strength: i64) -> Self {
        self.signal_strength = strength;
        self
    }

    /// Contribute `score` with `weight` to the card's own category
    pub fn with_score(mut self, score: f64, weight: f64) -> Self {
        self.score_contribution = Some(ScoreContribution {
            category: Some(self.category.clone()),
            score: Some(score),
            weight: Some(weight),
        });
        self
    }

    pub fn with_metric(mut self, metric: MetricValue) -> Self {
        self.key_metrics.push(metric);
        self
    }

    pub fn with_insight(mut self, insight: Insight) -> Self {
        self.insights.push(insight);
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags.extend(tags.iter().map(|t| t.to_string()));
        self
    }

    pub fn with_suggested_cards(mut self, cards: &[&str]) -> Self {
        self.suggested_cards.extend(cards.iter().map(|c| c.to_string()));
        self
    }
}

fn default_priority() -> i64 {
    2
}

fn default_signal_strength() -> i64 {
    3
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Text(String),
    Other(serde::de::IgnoredAny),
}

/// Accepts RFC 3339 timestamps or bare `YYYY-MM-DD` dates; anything else becomes `None`.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = match Option::<RawTimestamp>::deserialize(deserializer)? {
        None => return Ok(None),
        Some(RawTimestamp::Text(raw)) => raw,
        Some(RawTimestamp::Other(_)) => {
            tracing::warn!("Ignoring asOf timestamp that is not a string");
            return Ok(None);
        }
    };
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw.trim()) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    if let Some(midnight) = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(Some(midnight.and_utc()));
    }
    tracing::warn!("Ignoring unparseable asOf timestamp {:?}", raw);
    Ok(None)
}
