use std::collections::BTreeMap;
use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SynthesisError;

/// Canonical form of a category name: trimmed, lower-cased
pub fn normalize_category(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Relative importance of each category in the overall score.
///
/// Weights need not sum to 1; the engine renormalizes over the categories a
/// batch actually covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryWeights(BTreeMap<String, f64>);

impl Default for CategoryWeights {
    fn default() -> Self {
        Self::new([
            ("valuation", 0.30),
            ("growth", 0.20),
            ("quality", 0.20),
            ("risk", 0.15),
            ("momentum", 0.15),
        ])
    }
}

impl CategoryWeights {
    /// Build a table; negative or non-finite weights are zeroed.
    pub fn new<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        let mut table = BTreeMap::new();
        for (category, weight) in entries {
            let key = normalize_category(category.as_ref());
            if key.is_empty() {
                continue;
            }
            let weight = if weight.is_finite() && weight >= 0.0 {
                weight
            } else {
                tracing::warn!("Category weight {} for '{}' is invalid, using 0", weight, key);
                0.0
            };
            table.insert(key, weight);
        }
        Self(table)
    }

    /// Parse `"valuation=0.3,growth=0.2"`
    pub fn parse(table: &str) -> Result<Self, SynthesisError> {
        let mut entries = Vec::new();
        for pair in table.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (category, weight) = pair.split_once('=').ok_or_else(|| {
                SynthesisError::Config(format!("category weight '{}' is not of the form name=weight", pair))
            })?;
            let weight: f64 = weight.trim().parse().map_err(|_| {
                SynthesisError::Config(format!("category weight '{}' is not a number", pair))
            })?;
            entries.push((category.to_string(), weight));
        }
        Ok(Self::new(entries))
    }

    pub fn get(&self, category: &str) -> Option<f64> {
        self.0.get(&normalize_category(category)).copied()
    }

    /// Weight for `category`, or `unlisted` when the table does not name it
    pub fn weight_for(&self, category: &str, unlisted: f64) -> f64 {
        self.get(category).unwrap_or(unlisted)
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Tunables for one engine instance. Immutable once handed to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisConfig {
    pub category_weights: CategoryWeights,
    /// Weight for categories present in a batch but missing from the table
    pub unlisted_category_weight: f64,
    /// Overall score at or above this is bullish
    pub bullish_threshold: f64,
    /// Overall score at or below this is bearish
    pub bearish_threshold: f64,
    /// Categories whose summed card weight falls below this downgrade confidence
    pub min_category_coverage: f64,
    /// Minimum signal strength (1-5) both sides need before a conflict is reported
    pub significance_threshold: u8,
    /// Token-set Jaccard similarity at which two insights of the same type merge
    pub dedup_similarity: f64,
    /// Only the heaviest N cards per category count toward its score
    pub max_cards_per_category: Option<usize>,
    pub max_takeaways: usize,
    pub max_action_items: usize,
    pub max_top_metrics: usize,
    pub max_tags: usize,
    pub max_suggested_cards: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            category_weights: CategoryWeights::default(),
            unlisted_category_weight: 0.0,
            bullish_threshold: 60.0,
            bearish_threshold: 40.0,
            min_category_coverage: 0.1,
            significance_threshold: 3,
            dedup_similarity: 0.6,
            max_cards_per_category: None,
            max_takeaways: 5,
            max_action_items: 10,
            max_top_metrics: 8,
            max_tags: 20,
            max_suggested_cards: 6,
        }
    }
}

impl SynthesisConfig {
    /// Defaults overridden by `SYNTHESIS_*` environment variables
    pub fn from_env() -> Result<Self, SynthesisError> {
        let defaults = Self::default();

        let category_weights = match env::var("SYNTHESIS_CATEGORY_WEIGHTS") {
            Ok(table) => CategoryWeights::parse(&table)?,
            Err(_) => defaults.category_weights,
        };

        let max_cards_per_category = match env::var("SYNTHESIS_MAX_CARDS_PER_CATEGORY") {
            Ok(raw) => Some(parse_value("SYNTHESIS_MAX_CARDS_PER_CATEGORY", &raw)?),
            Err(_) => defaults.max_cards_per_category,
        };

        let config = Self {
            category_weights,
            unlisted_category_weight: env_or("SYNTHESIS_UNLISTED_CATEGORY_WEIGHT", defaults.unlisted_category_weight)?,
            bullish_threshold: env_or("SYNTHESIS_BULLISH_THRESHOLD", defaults.bullish_threshold)?,
            bearish_threshold: env_or("SYNTHESIS_BEARISH_THRESHOLD", defaults.bearish_threshold)?,
            min_category_coverage: env_or("SYNTHESIS_MIN_CATEGORY_COVERAGE", defaults.min_category_coverage)?,
            significance_threshold: env_or("SYNTHESIS_SIGNIFICANCE_THRESHOLD", defaults.significance_threshold)?,
            dedup_similarity: env_or("SYNTHESIS_DEDUP_SIMILARITY", defaults.dedup_similarity)?,
            max_cards_per_category,
            max_takeaways: env_or("SYNTHESIS_MAX_TAKEAWAYS", defaults.max_takeaways)?,
            max_action_items: env_or("SYNTHESIS_MAX_ACTION_ITEMS", defaults.max_action_items)?,
            max_top_metrics: env_or("SYNTHESIS_MAX_TOP_METRICS", defaults.max_top_metrics)?,
            max_tags: env_or("SYNTHESIS_MAX_TAGS", defaults.max_tags)?,
            max_suggested_cards: env_or("SYNTHESIS_MAX_SUGGESTED_CARDS", defaults.max_suggested_cards)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn with_category_weights(mut self, weights: CategoryWeights) -> Self {
        self.category_weights = weights;
        self
    }

    /// Reject settings that contradict each other
    pub fn validate(&self) -> Result<(), SynthesisError> {
        let in_range = |v: f64| v.is_finite() && (0.0..=100.0).contains(&v);
        if !in_range(self.bullish_threshold) || !in_range(self.bearish_threshold) {
            return Err(SynthesisError::Config(
                "sentiment thresholds must lie in [0, 100]".to_string(),
            ));
        }
        if self.bullish_threshold <= self.bearish_threshold {
            return Err(SynthesisError::Config(format!(
                "bullish threshold {} must exceed bearish threshold {}",
                self.bullish_threshold, self.bearish_threshold
            )));
        }
        if !(1..=5).contains(&self.significance_threshold) {
            return Err(SynthesisError::Config(format!(
                "significance threshold {} must be between 1 and 5",
                self.significance_threshold
            )));
        }
        if !self.dedup_similarity.is_finite() || self.dedup_similarity <= 0.0 || self.dedup_similarity > 1.0 {
            return Err(SynthesisError::Config(format!(
                "dedup similarity {} must be in (0, 1]",
                self.dedup_similarity
            )));
        }
        if !self.unlisted_category_weight.is_finite() || self.unlisted_category_weight < 0.0 {
            return Err(SynthesisError::Config(
                "unlisted category weight must be a non-negative number".to_string(),
            ));
        }
        if !self.min_category_coverage.is_finite() || self.min_category_coverage < 0.0 {
            return Err(SynthesisError::Config(
                "minimum category coverage must be a non-negative number".to_string(),
            ));
        }
        if self.max_cards_per_category == Some(0) {
            return Err(SynthesisError::Config(
                "max cards per category must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, SynthesisError> {
    match env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, SynthesisError> {
    raw.trim()
        .parse()
        .map_err(|_| SynthesisError::Config(format!("{} has invalid value {:?}", key, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_weights_sum_to_one() {
        assert_relative_eq!(CategoryWeights::default().total(), 1.0, epsilon = 1e-9);
        assert!(SynthesisConfig::default().validate().is_ok());
    }

    #[test]
    fn test_parse_weights_normalizes_names_and_zeroes_negatives() {
        let weights = CategoryWeights::parse(" Valuation=0.4, growth = 0.3 ,risk=-1").unwrap();
        assert_eq!(weights.get("valuation"), Some(0.4));
        assert_eq!(weights.get("GROWTH"), Some(0.3));
        assert_eq!(weights.get("risk"), Some(0.0));
        assert_eq!(weights.weight_for("momentum", 0.05), 0.05);
    }

    #[test]
    fn test_parse_weights_rejects_malformed_pairs() {
        assert!(matches!(CategoryWeights::parse("valuation"), Err(SynthesisError::Config(_))));
        assert!(matches!(CategoryWeights::parse("valuation=high"), Err(SynthesisError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_inverted_thresholds() {
        let config = SynthesisConfig {
            bullish_threshold: 40.0,
            bearish_threshold: 60.0,
            ..SynthesisConfig::default()
        };
        assert!(config.validate().is_err());

        let config = SynthesisConfig {
            significance_threshold: 0,
            ..SynthesisConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
