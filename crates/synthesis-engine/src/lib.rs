//! Synthesis Engine
//!
//! Turns the standardized outputs of every dashboard card for one instrument
//! into a single cross-indicator verdict: overall score and sentiment,
//! per-category scores, ranked takeaways, conflicts between cards, action
//! items, a merged metric panel and ranked tags/suggestions.
//!
//! The engine is a pure function of its input batch and configuration. It
//! keeps no state between calls and is safe to share across threads.

pub mod actions;
pub mod category;
pub mod conflicts;
pub mod ingest;
pub mod insights;
pub mod metrics;
pub mod normalize;
pub mod overall;
pub mod tags;


pub use synthesis_core::*;

use category::CategoryAggregate;
use normalize::NormalizedCard;

pub struct SynthesisEngine {
    config: SynthesisConfig,
}

impl Default for SynthesisEngine {
    fn default() -> Self {
        Self {
            config: SynthesisConfig::default(),
        }
    }
}

impl SynthesisEngine {
    /// Create an engine with a validated configuration
    pub fn new(config: SynthesisConfig) -> Result<Self, SynthesisError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    /// Synthesize one batch of card outputs for a single instrument.
    ///
    /// Malformed cards degrade the result (see `SynthesisResult::diagnostics`)
    /// but never fail it; the only error is a non-empty batch with no symbol.
    pub fn synthesize(&self, cards: &[CardOutput]) -> Result<SynthesisResult, SynthesisError> {
        if cards.is_empty() {
            tracing::info!("Empty card batch, returning neutral synthesis");
            return Ok(SynthesisResult::neutral(""));
        }

        let mut diagnostics = Vec::new();
        let batch = normalize::normalize_batch(cards, &mut diagnostics)?;

        let categories = category::aggregate_categories(
            &batch.cards,
            self.config.max_cards_per_category,
            &mut diagnostics,
        );
        let verdict = overall::score_overall(&categories, &batch.cards, &self.config);
        let ranked = insights::rank_insights(&batch.cards, self.config.dedup_similarity);
        let key_takeaways = insights::key_takeaways(&ranked, self.config.max_takeaways);
        let conflicts = conflicts::detect_conflicts(&batch.cards, self.config.significance_threshold);
        let action_items = actions::extract_actions(&ranked, self.config.max_action_items);
        let top_metrics = metrics::merge_metrics(&batch.metrics, self.config.max_top_metrics);
        let tag_summary = tags::aggregate_tags(
            &batch.cards,
            self.config.max_tags,
            self.config.max_suggested_cards,
        );

        let category_scores = categories
            .into_iter()
            .map(|(name, aggregate)| {
                let weight = verdict.weights.get(&name).copied().unwrap_or(0.0);
                (name, category_score(aggregate, weight))
            })
            .collect();

        tracing::info!(
            "Synthesized {} cards for {}: score {:.1} ({}, {} confidence), {} conflicts, {} diagnostics",
            batch.cards.len(),
            batch.symbol,
            verdict.score,
            verdict.sentiment.as_str(),
            verdict.confidence.as_str(),
            conflicts.len(),
            diagnostics.len()
        );

        Ok(SynthesisResult {
            symbol: batch.symbol,
            as_of: batch.as_of,
            overall_sentiment: verdict.sentiment,
            overall_confidence: verdict.confidence,
            overall_score: verdict.score,
            category_scores,
            key_takeaways,
            conflicts,
            action_items,
            top_metrics,
            card_summaries: card_summaries(&batch.cards),
            all_tags: tag_summary.all_tags,
            suggested_cards: tag_summary.suggested_cards,
            diagnostics,
        })
    }

    /// Decode a loosely-typed JSON batch, then synthesize it.
    ///
    /// Records rejected while decoding show up in the result's diagnostics.
    pub fn synthesize_value(&self, batch: &serde_json::Value) -> Result<SynthesisResult, SynthesisError> {
        let mut diagnostics = Vec::new();
        let cards = ingest::parse_batch(batch, &mut diagnostics)?;
        let mut result = if cards.is_empty() {
            // Every record was rejected; still report which instrument the batch was for
            let symbol = ingest::batch_symbol(batch).unwrap_or_default();
            tracing::info!("No usable cards for {:?}, returning neutral synthesis", symbol);
            SynthesisResult::neutral(&symbol)
        } else {
            self.synthesize(&cards)?
        };
        diagnostics.append(&mut result.diagnostics);
        result.diagnostics = diagnostics;
        Ok(result)
    }
}

/// Synthesize with the default configuration
pub fn synthesize(cards: &[CardOutput]) -> Result<SynthesisResult, SynthesisError> {
    SynthesisEngine::default().synthesize(cards)
}

fn category_score(aggregate: CategoryAggregate, weight: f64) -> CategoryScore {
    CategoryScore {
        score: aggregate.score,
        weight,
        sentiment: aggregate.sentiment,
        coverage: aggregate.coverage,
        card_count: aggregate.card_ids.len(),
        card_ids: aggregate.card_ids,
    }
}

fn card_summaries(cards: &[NormalizedCard]) -> Vec<CardSummary> {
    let mut summaries: Vec<CardSummary> = cards
        .iter()
        .map(|card| CardSummary {
            card_id: card.card_id.clone(),
            category: card.category.clone(),
            sentiment: card.sentiment,
            confidence: card.confidence,
            signal_strength: card.signal_strength,
            score: card.contribution.as_ref().map(|c| c.score),
            headline: card.headline().map(|insight| insight.message.clone()),
        })
        .collect();
    summaries.sort_by(|a, b| a.category.cmp(&b.category).then_with(|| a.card_id.cmp(&b.card_id)));
    summaries
}
