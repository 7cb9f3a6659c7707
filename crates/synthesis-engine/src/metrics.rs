//! Metric Merger
//!
//! Cards often report the same concept under different ids. Metrics are
//! merged on their normalized label (falling back to id), keeping the
//! highest-priority instance, and the panel is cut to a fixed size.

use std::collections::BTreeMap;

use synthesis_core::TopMetric;

use crate::normalize::NormalizedMetric;

/// Best instance first: priority, then magnitude, then card id
fn instance_order(a: &NormalizedMetric, b: &NormalizedMetric) -> std::cmp::Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| b.magnitude.total_cmp(&a.magnitude))
        .then_with(|| a.card_id.cmp(&b.card_id))
        .then_with(|| a.id.cmp(&b.id))
}

pub fn merge_metrics(metrics: &[NormalizedMetric], max: usize) -> Vec<TopMetric> {
    let mut groups: BTreeMap<&str, Vec<&NormalizedMetric>> = BTreeMap::new();
    for metric in metrics {
        groups.entry(metric.key.as_str()).or_default().push(metric);
    }

    let mut merged: Vec<(f64, TopMetric)> = groups
        .into_values()
        .filter_map(|mut instances| {
            instances.sort_by(|a, b| instance_order(a, b));
            let best = *instances.first()?;
            let mut reported_by: Vec<String> = instances.iter().map(|m| m.card_id.clone()).collect();
            reported_by.sort();
            reported_by.dedup();
            Some((
                best.magnitude,
                TopMetric {
                    key: best.key.clone(),
                    id: best.id.clone(),
                    label: best.label.clone(),
                    value: best.value.clone(),
                    interpretation: best.interpretation.clone(),
                    tone: best.tone,
                    format: best.format.clone(),
                    priority: best.priority,
                    trend: best.trend.clone(),
                    benchmark: best.benchmark.clone(),
                    source_card: best.card_id.clone(),
                    category: best.category.clone(),
                    reported_by,
                },
            ))
        })
        .collect();

    merged.sort_by(|(a_mag, a), (b_mag, b)| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| b_mag.total_cmp(a_mag))
            .then_with(|| a.key.cmp(&b.key))
    });

    tracing::debug!("Merged {} metrics into {} keys", metrics.len(), merged.len());
    merged.into_iter().take(max).map(|(_, metric)| metric).collect()
}
