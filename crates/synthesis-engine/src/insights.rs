//! Insight Collector & Ranker
//!
//! Pools every card's insights, folds near-duplicates together and ranks the
//! survivors by (priority asc, confidence desc, signal strength desc).
//!
//! Two insights are near-duplicates when they share a type and the Jaccard
//! overlap of their token sets reaches the configured similarity threshold.
//! Tokens are lower-cased alphanumeric words of two or more characters, minus
//! a short stopword list.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use synthesis_core::{Confidence, InsightType, KeyTakeaway};

use crate::normalize::NormalizedCard;

const STOPWORDS: &[&str] = &[
    "the", "an", "and", "or", "of", "to", "in", "on", "for", "is", "are", "was", "were", "with",
    "at", "by", "its", "it", "this", "that", "be", "as", "from", "has", "have",
];

/// A surviving insight after deduplication
#[derive(Debug, Clone, PartialEq)]
pub struct RankedInsight {
    pub kind: InsightType,
    pub message: String,
    pub priority: u8,
    pub confidence: Confidence,
    pub signal_strength: u8,
    /// Representative card first, then merged duplicates in rank order
    pub source_cards: Vec<String>,
    pub related_metric_ids: Vec<String>,
}

impl RankedInsight {
    pub fn to_takeaway(&self) -> KeyTakeaway {
        KeyTakeaway {
            insight_type: self.kind,
            message: self.message.clone(),
            priority: self.priority,
            confidence: self.confidence,
            signal_strength: self.signal_strength,
            source_cards: self.source_cards.clone(),
            related_metric_ids: self.related_metric_ids.clone(),
        }
    }
}

struct Candidate<'a> {
    card: &'a NormalizedCard,
    kind: InsightType,
    message: &'a str,
    priority: u8,
    related_metric_ids: &'a [String],
}

fn rank_order(a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| b.card.confidence.cmp(&a.card.confidence))
        .then_with(|| b.card.signal_strength.cmp(&a.card.signal_strength))
        .then_with(|| a.card.card_id.cmp(&b.card.card_id))
        .then_with(|| a.message.cmp(b.message))
}

/// Collect, deduplicate and rank every insight in the batch
pub fn rank_insights(cards: &[NormalizedCard], similarity_threshold: f64) -> Vec<RankedInsight> {
    let mut candidates: Vec<Candidate<'_>> = cards
        .iter()
        .flat_map(|card| {
            card.insights.iter().map(move |insight| Candidate {
                card,
                kind: insight.kind,
                message: insight.message.as_str(),
                priority: insight.priority,
                related_metric_ids: &insight.related_metric_ids,
            })
        })
        .collect();
    candidates.sort_by(rank_order);

    let total = candidates.len();
    let mut survivors: Vec<(RankedInsight, BTreeSet<String>)> = Vec::new();

    // Candidates arrive best-first, so the first of each duplicate group is its representative
    for candidate in candidates {
        let tokens = tokenize(candidate.message);
        let duplicate = survivors.iter_mut().find(|(kept, kept_tokens)| {
            kept.kind == candidate.kind
                && similarity(&kept.message, kept_tokens, candidate.message, &tokens) >= similarity_threshold
        });

        match duplicate {
            Some((kept, _)) => {
                if !kept.source_cards.contains(&candidate.card.card_id) {
                    kept.source_cards.push(candidate.card.card_id.clone());
                }
                for id in candidate.related_metric_ids {
                    if !kept.related_metric_ids.contains(id) {
                        kept.related_metric_ids.push(id.clone());
                    }
                }
            }
            None => survivors.push((
                RankedInsight {
                    kind: candidate.kind,
                    message: candidate.message.to_string(),
                    priority: candidate.priority,
                    confidence: candidate.card.confidence,
                    signal_strength: candidate.card.signal_strength,
                    source_cards: vec![candidate.card.card_id.clone()],
                    related_metric_ids: candidate.related_metric_ids.to_vec(),
                },
                tokens,
            )),
        }
    }

    tracing::debug!("Ranked {} insights from {} collected", survivors.len(), total);
    survivors.into_iter().map(|(insight, _)| insight).collect()
}

/// The first `max` ranked insights
pub fn key_takeaways(ranked: &[RankedInsight], max: usize) -> Vec<KeyTakeaway> {
    ranked.iter().take(max).map(RankedInsight::to_takeaway).collect()
}

pub fn tokenize(message: &str) -> BTreeSet<String> {
    message
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2 && !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Jaccard overlap of two token sets.
///
/// Messages with no usable tokens only match when their text is identical.
pub fn similarity(a: &str, a_tokens: &BTreeSet<String>, b: &str, b_tokens: &BTreeSet<String>) -> f64 {
    if a_tokens.is_empty() || b_tokens.is_empty() {
        return if a.trim().eq_ignore_ascii_case(b.trim()) { 1.0 } else { 0.0 };
    }
    let shared = a_tokens.intersection(b_tokens).count();
    let union = a_tokens.union(b_tokens).count();
    shared as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use synthesis_core::Sentiment;

    use crate::normalize::NormalizedInsight;

    fn card(id: &str, confidence: Confidence, strength: u8, insights: &[(InsightType, &str, u8)]) -> NormalizedCard {
        NormalizedCard {
            card_id: id.to_string(),
            category: "valuation".to_string(),
            sentiment: Sentiment::Bullish,
            confidence,
            signal_strength: strength,
            as_of: None,
            contribution: None,
            insights: insights
                .iter()
                .map(|(kind, message, priority)| NormalizedInsight {
                    kind: *kind,
                    message: message.to_string(),
                    priority: *priority,
                    related_metric_ids: vec![format!("{}-metric", id)],
                })
                .collect(),
            tags: Vec::new(),
            suggested_cards: Vec::new(),
        }
    }

    #[test]
    fn test_similarity_of_reworded_messages() {
        let a = "Debt levels are elevated relative to equity";
        let b = "Debt levels elevated relative to equity";
        let score = similarity(a, &tokenize(a), b, &tokenize(b));
        assert_relative_eq!(score, 1.0);

        let c = "Strong free cash flow generation";
        assert!(similarity(a, &tokenize(a), c, &tokenize(c)) < 0.2);
    }

    #[test]
    fn test_duplicates_merge_into_best_ranked_instance() {
        let cards = vec![
            card("dcf", Confidence::Medium, 3, &[(InsightType::Weakness, "Debt levels are elevated relative to equity", 2)]),
            card("leverage", Confidence::High, 4, &[(InsightType::Weakness, "Debt levels elevated relative to equity", 1)]),
        ];
        let ranked = rank_insights(&cards, 0.6);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].priority, 1);
        assert_eq!(ranked[0].source_cards, vec!["leverage", "dcf"]);
        assert_eq!(ranked[0].related_metric_ids, vec!["leverage-metric", "dcf-metric"]);
    }

    #[test]
    fn test_same_text_different_type_is_kept() {
        let cards = vec![
            card("a", Confidence::Medium, 3, &[(InsightType::Risk, "Margin compression", 2)]),
            card("b", Confidence::Medium, 3, &[(InsightType::Weakness, "Margin compression", 2)]),
        ];
        assert_eq!(rank_insights(&cards, 0.6).len(), 2);
    }

    #[test]
    fn test_rank_by_priority_then_confidence_then_strength() {
        let cards = vec![
            card("a", Confidence::Low, 5, &[(InsightType::Observation, "Volume rising into earnings", 1)]),
            card("b", Confidence::High, 2, &[(InsightType::Strength, "Gross margins expanding steadily", 1)]),
            card("c", Confidence::High, 4, &[(InsightType::Opportunity, "Buyback capacity underused", 1)]),
            card("d", Confidence::High, 5, &[(InsightType::Risk, "Customer concentration", 3)]),
        ];
        let ranked = rank_insights(&cards, 0.6);
        let order: Vec<&str> = ranked.iter().map(|r| r.source_cards[0].as_str()).collect();
        assert_eq!(order, vec!["c", "b", "a", "d"]);

        let takeaways = key_takeaways(&ranked, 2);
        assert_eq!(takeaways.len(), 2);
        assert_eq!(takeaways[0].message, "Buyback capacity underused");
    }

    #[test]
    fn test_tokenless_messages_only_match_exactly() {
        let cards = vec![
            card("a", Confidence::Medium, 3, &[(InsightType::Observation, "!!", 2)]),
            card("b", Confidence::Medium, 3, &[(InsightType::Observation, "??", 2)]),
            card("c", Confidence::Medium, 3, &[(InsightType::Observation, "!!", 2)]),
        ];
        let ranked = rank_insights(&cards, 0.6);
        assert_eq!(ranked.len(), 2);
    }
}
