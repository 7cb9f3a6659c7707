//! Action Extractor

use synthesis_core::{ActionItem, Urgency};

use crate::insights::RankedInsight;

/// Action and risk insights as urgency-classified items, most urgent first.
///
/// `ranked` must already be in rank order; it breaks ties within an urgency.
pub fn extract_actions(ranked: &[RankedInsight], max: usize) -> Vec<ActionItem> {
    let mut items: Vec<ActionItem> = ranked
        .iter()
        .filter(|insight| insight.kind.is_actionable())
        .map(|insight| ActionItem {
            action: insight.message.clone(),
            source: insight.source_cards.first().cloned().unwrap_or_default(),
            urgency: Urgency::from_priority(insight.priority),
            priority: insight.priority,
            insight_type: insight.kind,
        })
        .collect();

    items.sort_by(|a, b| a.urgency.cmp(&b.urgency).then_with(|| a.priority.cmp(&b.priority)));
    items.truncate(max);
    items
}
