//! Tag/Suggestion Aggregator

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::normalize::NormalizedCard;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagSummary {
    /// Most frequent first
    pub all_tags: Vec<String>,
    /// Most suggested first, lower-cased; never a card already in the batch
    pub suggested_cards: Vec<String>,
}

fn rank_by_frequency<K: Into<String>>(counts: BTreeMap<K, usize>, max: usize) -> Vec<String> {
    let mut ranked: Vec<(K, usize)> = counts.into_iter().collect();
    // Stable sort over the alphabetical BTreeMap order breaks ties by name
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.into_iter().take(max).map(|(name, _)| name.into()).collect()
}

pub fn aggregate_tags(cards: &[NormalizedCard], max_tags: usize, max_suggested: usize) -> TagSummary {
    let present: HashSet<String> = cards.iter().map(|c| c.card_id.to_lowercase()).collect();

    let mut tag_counts: BTreeMap<&str, usize> = BTreeMap::new();
    let mut suggestion_counts: BTreeMap<String, usize> = BTreeMap::new();
    for card in cards {
        for tag in &card.tags {
            *tag_counts.entry(tag.as_str()).or_default() += 1;
        }
        let suggestions: BTreeSet<String> = card.suggested_cards.iter().map(|s| s.to_lowercase()).collect();
        for suggestion in suggestions {
            if !present.contains(&suggestion) {
                *suggestion_counts.entry(suggestion).or_default() += 1;
            }
        }
    }

    TagSummary {
        all_tags: rank_by_frequency(tag_counts, max_tags),
        suggested_cards: rank_by_frequency(suggestion_counts, max_suggested),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synthesis_core::{Confidence, Sentiment};

    fn card(id: &str, tags: &[&str], suggested: &[&str]) -> NormalizedCard {
        NormalizedCard {
            card_id: id.to_string(),
            category: "quality".to_string(),
            sentiment: Sentiment::Neutral,
            confidence: Confidence::Medium,
            signal_strength: 3,
            as_of: None,
            contribution: None,
            insights: Vec::new(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            suggested_cards: suggested.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_tags_ranked_by_frequency_then_name() {
        let cards = vec![
            card("a", &["margins", "moat"], &[]),
            card("b", &["moat", "leverage"], &[]),
            card("c", &["moat", "leverage"], &[]),
        ];
        let summary = aggregate_tags(&cards, 10, 10);
        assert_eq!(summary.all_tags, vec!["moat", "leverage", "margins"]);
        assert_eq!(aggregate_tags(&cards, 1, 10).all_tags, vec!["moat"]);
    }

    #[test]
    fn test_suggestions_exclude_cards_in_batch() {
        let cards = vec![
            card("dcf", &[], &["wacc", "Piotroski", "reverse-dcf"]),
            card("piotroski", &[], &["dcf", "reverse-dcf"]),
        ];
        let summary = aggregate_tags(&cards, 10, 10);
        assert_eq!(summary.suggested_cards, vec!["reverse-dcf", "wacc"]);
    }

    #[test]
    fn test_suggestions_differing_only_in_case_count_together() {
        let cards = vec![
            card("dcf", &[], &["WACC", "peg"]),
            card("pe", &[], &["wacc", "Wacc"]),
            card("roe", &[], &["PEG", "Dcf"]),
        ];
        let summary = aggregate_tags(&cards, 10, 10);
        assert_eq!(summary.suggested_cards, vec!["peg", "wacc"]);
    }
}
