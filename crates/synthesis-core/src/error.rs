use thiserror::Error;

/// Failures the engine reports instead of degrading.
///
/// Malformed cards, bad fields and inconsistent weight tables are never
/// errors; they surface as diagnostics on the result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SynthesisError {
    #[error("Invalid batch: {0}")]
    InvalidBatch(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
