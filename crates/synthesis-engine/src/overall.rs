//! Overall Scorer
//!
//! Blends category scores with the configured category-weight table,
//! renormalized over the categories the batch actually covers.

use std::collections::{BTreeMap, BTreeSet};

use synthesis_core::{Confidence, Sentiment, SynthesisConfig, NEUTRAL_SCORE};

use crate::category::CategoryAggregate;
use crate::normalize::NormalizedCard;

#[derive(Debug, Clone, PartialEq)]
pub struct OverallVerdict {
    pub score: f64,
    pub sentiment: Sentiment,
    pub confidence: Confidence,
    /// Renormalized weight per scored category; sums to 1 when non-empty
    pub weights: BTreeMap<String, f64>,
}

pub fn score_overall(
    categories: &BTreeMap<String, CategoryAggregate>,
    cards: &[NormalizedCard],
    config: &SynthesisConfig,
) -> OverallVerdict {
    if categories.is_empty() {
        return OverallVerdict {
            score: NEUTRAL_SCORE,
            sentiment: Sentiment::Neutral,
            confidence: Confidence::Low,
            weights: BTreeMap::new(),
        };
    }

    let weights = renormalized_weights(categories, config);

    let score = categories
        .iter()
        .map(|(name, aggregate)| aggregate.score * weights.get(name).copied().unwrap_or(0.0))
        .sum::<f64>()
        .clamp(0.0, 100.0);

    let sentiment = if score >= config.bullish_threshold {
        Sentiment::Bullish
    } else if score <= config.bearish_threshold {
        Sentiment::Bearish
    } else {
        Sentiment::Neutral
    };

    let mut confidence = weighted_confidence_mode(categories, cards);
    let thin = categories
        .iter()
        .filter(|(name, _)| weights.get(*name).copied().unwrap_or(0.0) > 0.0)
        .find(|(_, aggregate)| aggregate.coverage < config.min_category_coverage);
    if let Some((name, aggregate)) = thin {
        tracing::debug!(
            "Category {} coverage {:.2} below {:.2}, downgrading confidence",
            name,
            aggregate.coverage,
            config.min_category_coverage
        );
        confidence = confidence.downgrade();
    }

    OverallVerdict {
        score,
        sentiment,
        confidence,
        weights,
    }
}

/// Table weights for the present categories, scaled to sum to 1.
///
/// When none of the present categories carries weight, they share it equally.
fn renormalized_weights(
    categories: &BTreeMap<String, CategoryAggregate>,
    config: &SynthesisConfig,
) -> BTreeMap<String, f64> {
    let raw: BTreeMap<String, f64> = categories
        .keys()
        .map(|name| {
            (
                name.clone(),
                config
                    .category_weights
                    .weight_for(name, config.unlisted_category_weight),
            )
        })
        .collect();

    let total: f64 = raw.values().sum();
    if total <= 0.0 {
        tracing::warn!(
            "No weight configured for categories {:?}, weighting them equally",
            raw.keys().collect::<Vec<_>>()
        );
        let equal = 1.0 / raw.len() as f64;
        return raw.into_keys().map(|name| (name, equal)).collect();
    }

    raw.into_iter().map(|(name, w)| (name, w / total)).collect()
}

/// Most common card confidence, weighted by each scored card's contribution
/// weight. Ties resolve to the lower level.
fn weighted_confidence_mode(
    categories: &BTreeMap<String, CategoryAggregate>,
    cards: &[NormalizedCard],
) -> Confidence {
    let scored: BTreeSet<&str> = categories
        .values()
        .flat_map(|aggregate| aggregate.card_ids.iter().map(String::as_str))
        .collect();

    let mut tally: BTreeMap<Confidence, f64> = BTreeMap::new();
    for card in cards.iter().filter(|c| scored.contains(c.card_id.as_str())) {
        if let Some(contribution) = &card.contribution {
            *tally.entry(card.confidence).or_default() += contribution.weight;
        }
    }

    let mut best = Confidence::Low;
    let mut best_weight = 0.0;
    // BTreeMap iterates Low -> High; strict comparison keeps the lower level on ties
    for (level, weight) in tally {
        if weight > best_weight + f64::EPSILON {
            best = level;
            best_weight = weight;
        }
    }
    best
}
