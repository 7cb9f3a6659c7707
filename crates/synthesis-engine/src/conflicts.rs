//! Conflict Detector
//!
//! A topic (tag) is in conflict when at least one bullish and one bearish card
//! on it both reach the significance threshold. The conflict then lists every
//! bullish and bearish card sharing the tag, and the resolution favors the
//! side with more aggregate conviction (confidence weight x signal strength).

use std::collections::BTreeMap;

use synthesis_core::{Conflict, Sentiment};

use crate::normalize::NormalizedCard;

const TIE_EPSILON: f64 = 1e-9;

pub fn detect_conflicts(cards: &[NormalizedCard], significance_threshold: u8) -> Vec<Conflict> {
    let mut topics: BTreeMap<&str, Vec<&NormalizedCard>> = BTreeMap::new();
    for card in cards {
        for tag in &card.tags {
            topics.entry(tag.as_str()).or_default().push(card);
        }
    }

    let mut conflicts: Vec<Conflict> = topics
        .into_iter()
        .filter_map(|(topic, members)| conflict_for(topic, &members, significance_threshold))
        .collect();

    conflicts.sort_by(|a, b| {
        let a_total = a.bullish_conviction + a.bearish_conviction;
        let b_total = b.bullish_conviction + b.bearish_conviction;
        b_total.total_cmp(&a_total).then_with(|| a.topic.cmp(&b.topic))
    });

    if !conflicts.is_empty() {
        tracing::debug!(
            "Detected {} conflicts: {:?}",
            conflicts.len(),
            conflicts.iter().map(|c| c.topic.as_str()).collect::<Vec<_>>()
        );
    }
    conflicts
}

fn conviction(card: &NormalizedCard) -> f64 {
    card.confidence.weight() * card.signal_strength as f64
}

fn conflict_for(topic: &str, members: &[&NormalizedCard], threshold: u8) -> Option<Conflict> {
    let significant = |sentiment: Sentiment| {
        members
            .iter()
            .any(|c| c.sentiment == sentiment && c.signal_strength >= threshold)
    };
    if !significant(Sentiment::Bullish) || !significant(Sentiment::Bearish) {
        return None;
    }

    let side = |sentiment: Sentiment| -> (Vec<String>, f64) {
        let cards: Vec<&&NormalizedCard> = members.iter().filter(|c| c.sentiment == sentiment).collect();
        let ids = cards.iter().map(|c| c.card_id.clone()).collect();
        let total = cards.iter().map(|c| conviction(c)).sum();
        (ids, total)
    };
    let (bullish_cards, bullish_conviction) = side(Sentiment::Bullish);
    let (bearish_cards, bearish_conviction) = side(Sentiment::Bearish);

    let favored = if (bullish_conviction - bearish_conviction).abs() < TIE_EPSILON {
        None
    } else if bullish_conviction > bearish_conviction {
        Some(Sentiment::Bullish)
    } else {
        Some(Sentiment::Bearish)
    };

    let resolution = match favored {
        Some(leaning) => {
            let (winner, loser) = match leaning {
                Sentiment::Bullish => (bullish_conviction, bearish_conviction),
                _ => (bearish_conviction, bullish_conviction),
            };
            format!(
                "Leans {} on '{}': conviction {:.0} vs {:.0} ({} bullish, {} bearish cards)",
                leaning.as_str(),
                topic,
                winner,
                loser,
                bullish_cards.len(),
                bearish_cards.len()
            )
        }
        None => format!(
            "Context-dependent: bullish and bearish conviction on '{}' tied at {:.0}",
            topic, bullish_conviction
        ),
    };

    Some(Conflict {
        topic: topic.to_string(),
        bullish_cards,
        bearish_cards,
        bullish_conviction,
        bearish_conviction,
        favored,
        resolution,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use synthesis_core::Confidence;

    fn card(id: &str, sentiment: Sentiment, confidence: Confidence, strength: u8, tags: &[&str]) -> NormalizedCard {
        NormalizedCard {
            card_id: id.to_string(),
            category: "risk".to_string(),
            sentiment,
            confidence,
            signal_strength: strength,
            as_of: None,
            contribution: None,
            insights: Vec::new(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            suggested_cards: Vec::new(),
        }
    }

    #[test]
    fn test_opposing_significant_cards_conflict() {
        let cards = vec![
            card("altman", Sentiment::Bullish, Confidence::Medium, 4, &["leverage"]),
            card("debt", Sentiment::Bearish, Confidence::Medium, 4, &["leverage"]),
        ];
        let conflicts = detect_conflicts(&cards, 3);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].topic, "leverage");
        assert_eq!(conflicts[0].favored, None);
        assert!(conflicts[0].resolution.starts_with("Context-dependent"));
    }

    #[test]
    fn test_below_threshold_or_agreeing_cards_never_conflict() {
        let weak = vec![
            card("a", Sentiment::Bullish, Confidence::High, 5, &["margins"]),
            card("b", Sentiment::Bearish, Confidence::High, 2, &["margins"]),
        ];
        assert!(detect_conflicts(&weak, 3).is_empty());

        let agree = vec![
            card("a", Sentiment::Bearish, Confidence::High, 5, &["margins"]),
            card("b", Sentiment::Bearish, Confidence::High, 5, &["margins"]),
            card("c", Sentiment::Neutral, Confidence::High, 5, &["margins"]),
        ];
        assert!(detect_conflicts(&agree, 3).is_empty());
    }

    #[test]
    fn test_conflict_lists_every_card_on_the_topic() {
        let cards = vec![
            card("a", Sentiment::Bullish, Confidence::High, 4, &["valuation"]),
            card("b", Sentiment::Bullish, Confidence::Low, 1, &["valuation"]),
            card("c", Sentiment::Bearish, Confidence::Medium, 3, &["valuation"]),
            card("d", Sentiment::Neutral, Confidence::High, 5, &["valuation"]),
        ];
        let conflicts = detect_conflicts(&cards, 3);
        assert_eq!(conflicts.len(), 1);
        let conflict = &conflicts[0];
        assert_eq!(conflict.bullish_cards, vec!["a", "b"]);
        assert_eq!(conflict.bearish_cards, vec!["c"]);
        // 3*4 + 1*1 vs 2*3
        assert_eq!(conflict.bullish_conviction, 13.0);
        assert_eq!(conflict.bearish_conviction, 6.0);
        assert_eq!(conflict.favored, Some(Sentiment::Bullish));
        assert!(conflict.resolution.contains("Leans bullish"));
    }

    #[test]
    fn test_conflicts_ordered_by_total_conviction() {
        let cards = vec![
            card("a", Sentiment::Bullish, Confidence::Low, 3, &["alpha", "beta"]),
            card("b", Sentiment::Bearish, Confidence::Low, 3, &["alpha"]),
            card("c", Sentiment::Bearish, Confidence::High, 5, &["beta"]),
        ];
        let conflicts = detect_conflicts(&cards, 3);
        let topics: Vec<&str> = conflicts.iter().map(|c| c.topic.as_str()).collect();
        assert_eq!(topics, vec!["beta", "alpha"]);
        assert_eq!(conflicts[0].favored, Some(Sentiment::Bearish));
    }
}
