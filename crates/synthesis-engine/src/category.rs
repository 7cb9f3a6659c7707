//! Category Aggregator
//!
//! Weighted mean of card scores per category. A category only exists here if
//! at least one card contributes positive weight to it.

use std::collections::BTreeMap;

use synthesis_core::{Diagnostic, Sentiment, Stage};

use crate::normalize::{note, Contribution, NormalizedCard};

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryAggregate {
    pub category: String,
    /// Σ(score_i × weight_i) / Σ(weight_i), in [0, 100]
    pub score: f64,
    /// Σ(weight_i)
    pub coverage: f64,
    pub sentiment: Sentiment,
    /// Sorted
    pub card_ids: Vec<String>,
}

/// Group contributions by category and score each group.
///
/// With `max_cards_per_category` set, only the heaviest cards of a crowded
/// category count (ties broken by card id); the rest are reported.
pub fn aggregate_categories(
    cards: &[NormalizedCard],
    max_cards_per_category: Option<usize>,
    diagnostics: &mut Vec<Diagnostic>,
) -> BTreeMap<String, CategoryAggregate> {
    let mut groups: BTreeMap<&str, Vec<(&NormalizedCard, &Contribution)>> = BTreeMap::new();
    for card in cards {
        if let Some(contribution) = &card.contribution {
            groups
                .entry(contribution.category.as_str())
                .or_default()
                .push((card, contribution));
        }
    }

    let mut aggregates = BTreeMap::new();
    for (category, mut members) in groups {
        if let Some(cap) = max_cards_per_category {
            if members.len() > cap {
                members.sort_by(|(a_card, a), (b_card, b)| {
                    b.weight
                        .total_cmp(&a.weight)
                        .then_with(|| a_card.card_id.cmp(&b_card.card_id))
                });
                for (card, _) in members.drain(cap..) {
                    note(
                        diagnostics,
                        Stage::CategoryAggregation,
                        Some(&card.card_id),
                        format!("Excluded from '{}': category capped at {} cards", category, cap),
                    );
                }
                members.sort_by(|(a, _), (b, _)| a.card_id.cmp(&b.card_id));
            }
        }

        let mut weighted_sum = 0.0;
        let mut weight_sum = 0.0;
        let mut direction = 0.0;
        for (card, contribution) in &members {
            weighted_sum += contribution.score * contribution.weight;
            weight_sum += contribution.weight;
            direction += card.sentiment.signum() * contribution.weight * card.signal_strength as f64;
        }

        if weight_sum <= 0.0 {
            continue;
        }

        let aggregate = CategoryAggregate {
            category: category.to_string(),
            score: (weighted_sum / weight_sum).clamp(0.0, 100.0),
            coverage: weight_sum,
            sentiment: Sentiment::from_signum(direction),
            card_ids: members.iter().map(|(card, _)| card.card_id.clone()).collect(),
        };
        tracing::debug!(
            "Category {}: score {:.1} from {} cards (coverage {:.2}, {})",
            category,
            aggregate.score,
            aggregate.card_ids.len(),
            aggregate.coverage,
            aggregate.sentiment.as_str()
        );
        aggregates.insert(category.to_string(), aggregate);
    }

    aggregates
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use synthesis_core::Confidence;

    fn scored(id: &str, category: &str, sentiment: Sentiment, strength: u8, score: f64, weight: f64) -> NormalizedCard {
        NormalizedCard {
            card_id: id.to_string(),
            category: category.to_string(),
            sentiment,
            confidence: Confidence::Medium,
            signal_strength: strength,
            as_of: None,
            contribution: Some(Contribution {
                category: category.to_string(),
                score,
                weight,
            }),
            insights: Vec::new(),
            tags: Vec::new(),
            suggested_cards: Vec::new(),
        }
    }

    #[test]
    fn test_weighted_mean_per_category() {
        let cards = vec![
            scored("a", "valuation", Sentiment::Bullish, 3, 80.0, 0.3),
            scored("b", "valuation", Sentiment::Bearish, 2, 40.0, 0.1),
            scored("c", "growth", Sentiment::Bearish, 4, 30.0, 0.2),
        ];
        let mut diagnostics = Vec::new();
        let result = aggregate_categories(&cards, None, &mut diagnostics);

        let valuation = &result["valuation"];
        assert_relative_eq!(valuation.score, (80.0 * 0.3 + 40.0 * 0.1) / 0.4, epsilon = 1e-9);
        assert_relative_eq!(valuation.coverage, 0.4, epsilon = 1e-9);
        // 0.3*3 - 0.1*2 > 0
        assert_eq!(valuation.sentiment, Sentiment::Bullish);
        assert_eq!(valuation.card_ids, vec!["a", "b"]);
        assert_eq!(result["growth"].sentiment, Sentiment::Bearish);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_category_without_contributions_is_absent() {
        let mut unscored = scored("a", "quality", Sentiment::Bullish, 3, 90.0, 0.2);
        unscored.contribution = None;
        let cards = vec![unscored, scored("b", "risk", Sentiment::Neutral, 1, 55.0, 0.1)];
        let mut diagnostics = Vec::new();
        let result = aggregate_categories(&cards, None, &mut diagnostics);
        assert!(!result.contains_key("quality"));
        assert!(result.contains_key("risk"));
        assert_eq!(result["risk"].sentiment, Sentiment::Neutral);
    }

    #[test]
    fn test_opposing_sentiment_cancels_to_neutral() {
        let cards = vec![
            scored("a", "momentum", Sentiment::Bullish, 2, 60.0, 0.2),
            scored("b", "momentum", Sentiment::Bearish, 4, 40.0, 0.1),
        ];
        let mut diagnostics = Vec::new();
        let result = aggregate_categories(&cards, None, &mut diagnostics);
        assert_eq!(result["momentum"].sentiment, Sentiment::Neutral);
    }

    #[test]
    fn test_cap_keeps_heaviest_cards() {
        let cards = vec![
            scored("a", "growth", Sentiment::Bullish, 3, 100.0, 0.1),
            scored("b", "growth", Sentiment::Bullish, 3, 50.0, 0.5),
            scored("c", "growth", Sentiment::Bullish, 3, 70.0, 0.4),
        ];
        let mut diagnostics = Vec::new();
        let result = aggregate_categories(&cards, Some(2), &mut diagnostics);
        let growth = &result["growth"];
        assert_eq!(growth.card_ids, vec!["b", "c"]);
        assert_relative_eq!(growth.score, (50.0 * 0.5 + 70.0 * 0.4) / 0.9, epsilon = 1e-9);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].card_id.as_deref(), Some("a"));
    }
}
