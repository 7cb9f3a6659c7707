//! Batch ingestion from loosely-typed JSON.
//!
//! Card producers evolve independently, so each record is decoded on its own
//! and a record that does not fit the schema is dropped rather than failing
//! the whole batch. Metrics and insights are decoded element by element, so a
//! single malformed entry only costs that entry.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use synthesis_core::{CardOutput, Diagnostic, Stage, SynthesisError};

use crate::normalize::{note, resolve_symbol};

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

fn has_symbol(record: &Value) -> bool {
    record
        .get("symbol")
        .and_then(Value::as_str)
        .is_some_and(|s| !s.trim().is_empty())
}

/// Decode a JSON batch into card outputs.
///
/// Errors only on a contract violation: input that is not a list, or a
/// non-empty list in which no record carries a symbol.
pub fn parse_batch(
    value: &Value,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<Vec<CardOutput>, SynthesisError> {
    let records = value.as_array().ok_or_else(|| {
        SynthesisError::InvalidBatch(format!("expected a list of card outputs, got {}", kind_of(value)))
    })?;

    if !records.is_empty() && !records.iter().any(has_symbol) {
        return Err(SynthesisError::InvalidBatch(format!(
            "none of the {} card records carries a symbol",
            records.len()
        )));
    }

    let mut cards = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        if let Some(card) = decode_card(index, record, diagnostics) {
            cards.push(card);
        }
    }

    Ok(cards)
}

/// Most frequent symbol named by the raw records
pub fn batch_symbol(value: &Value) -> Option<String> {
    let records = value.as_array()?;
    resolve_symbol(records.iter().filter_map(|r| r.get("symbol").and_then(Value::as_str)))
}

fn decode_card(index: usize, record: &Value, diagnostics: &mut Vec<Diagnostic>) -> Option<CardOutput> {
    let card_id = record.get("cardId").and_then(Value::as_str).map(str::to_string);
    let Some(fields) = record.as_object() else {
        note(
            diagnostics,
            Stage::Ingestion,
            None,
            format!("Dropped record #{} that is {} instead of a card", index, kind_of(record)),
        );
        return None;
    };

    let mut fields: Map<String, Value> = fields.clone();
    let metrics = fields.remove("keyMetrics");
    let insights = fields.remove("insights");

    let mut card = match serde_json::from_value::<CardOutput>(Value::Object(fields)) {
        Ok(card) => card,
        Err(e) => {
            note(
                diagnostics,
                Stage::Ingestion,
                card_id.as_deref(),
                format!("Dropped record #{} that does not match the card schema: {}", index, e),
            );
            return None;
        }
    };
    card.key_metrics = decode_entries(metrics, "keyMetrics", card_id.as_deref(), diagnostics);
    card.insights = decode_entries(insights, "insights", card_id.as_deref(), diagnostics);
    Some(card)
}

/// Decode a list field entry by entry, dropping the entries that do not fit
fn decode_entries<T: DeserializeOwned>(
    raw: Option<Value>,
    field: &str,
    card_id: Option<&str>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<T> {
    let entries = match raw {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            note(
                diagnostics,
                Stage::Normalization,
                card_id,
                format!("Ignored {} that is {} instead of a list", field, kind_of(&other)),
            );
            return Vec::new();
        }
    };

    let mut decoded = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<T>(entry) {
            Ok(value) => decoded.push(value),
            Err(e) => note(
                diagnostics,
                Stage::Normalization,
                card_id,
                format!("Dropped {}[{}]: {}", field, index, e),
            ),
        }
    }
    decoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_non_list_input_is_a_contract_violation() {
        let mut diagnostics = Vec::new();
        let err = parse_batch(&json!({"cardId": "dcf"}), &mut diagnostics).unwrap_err();
        assert_eq!(
            err,
            SynthesisError::InvalidBatch("expected a list of card outputs, got an object".to_string())
        );
    }

    #[test]
    fn test_list_without_symbols_is_a_contract_violation() {
        let mut diagnostics = Vec::new();
        let batch = json!([{"cardId": "dcf", "sentiment": "bullish", "confidence": "high"}]);
        assert!(matches!(parse_batch(&batch, &mut diagnostics), Err(SynthesisError::InvalidBatch(_))));
    }

    #[test]
    fn test_malformed_records_are_dropped_with_a_diagnostic() {
        let mut diagnostics = Vec::new();
        let batch = json!([
            {"cardId": "dcf", "symbol": "AAPL", "sentiment": "bullish", "confidence": "high"},
            {"cardId": "broken", "symbol": "AAPL", "sentiment": "sideways", "confidence": "high"},
            "not a card"
        ]);
        let cards = parse_batch(&batch, &mut diagnostics).unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].card_id, "dcf");
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].card_id.as_deref(), Some("broken"));
        assert_eq!(diagnostics[0].stage, Stage::Ingestion);
    }

    #[test]
    fn test_bad_metric_or_insight_only_drops_that_entry() {
        let mut diagnostics = Vec::new();
        let batch = json!([{
            "cardId": "dcf", "symbol": "AAPL", "sentiment": "bullish", "confidence": "high",
            "asOf": 20240501,
            "keyMetrics": [
                {"label": "Flag", "value": true, "interpretation": "fair"},
                {"label": "WACC", "value": 8.2, "interpretation": "fair"}
            ],
            "insights": [
                {"message": "No type given"},
                {"type": "strength", "message": 42},
                {"type": "risk", "message": "Refinancing wall in 2026"}
            ],
            "scoreContribution": {"score": 70, "weight": 0.3}
        }]);
        let cards = parse_batch(&batch, &mut diagnostics).unwrap();
        assert_eq!(cards.len(), 1);
        let card = &cards[0];
        assert_eq!(card.key_metrics.len(), 1);
        assert_eq!(card.key_metrics[0].label.as_deref(), Some("WACC"));
        assert_eq!(card.insights.len(), 2);
        assert_eq!(card.insights[0].kind, synthesis_core::InsightType::Unknown);
        assert!(card.as_of.is_none());
        assert!(card.score_contribution.is_some());
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics.iter().all(|d| d.stage == Stage::Normalization));
    }

    #[test]
    fn test_non_list_nested_field_is_ignored() {
        let mut diagnostics = Vec::new();
        let batch = json!([{
            "cardId": "dcf", "symbol": "AAPL", "sentiment": "bullish", "confidence": "high",
            "keyMetrics": {"wacc": 8.2}
        }]);
        let cards = parse_batch(&batch, &mut diagnostics).unwrap();
        assert!(cards[0].key_metrics.is_empty());
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_batch_symbol_uses_majority() {
        let batch = json!([{"symbol": "msft"}, {"symbol": "AAPL"}, {"symbol": "aapl"}, {"cardId": "x"}]);
        assert_eq!(batch_symbol(&batch).as_deref(), Some("AAPL"));
        assert_eq!(batch_symbol(&json!({"symbol": "AAPL"})), None);
    }

    #[test]
    fn test_empty_list_is_accepted() {
        let mut diagnostics = Vec::new();
        assert!(parse_batch(&json!([]), &mut diagnostics).unwrap().is_empty());
    }
}
