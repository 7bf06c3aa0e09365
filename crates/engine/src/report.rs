//! Result aggregation for a batch of action outcomes.

use crate::types::ActionOutcome;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    pub message: String,
    pub succeeded: bool,
}

impl Aggregate {
    /// The failure log is written only for failed batches.
    pub fn needs_log(&self) -> bool {
        !self.succeeded
    }
}

/// Fold outcomes into one result.
///
/// The batch counts as succeeded when any single item succeeded. This is
/// the long-standing user-visible behaviour and is kept as is.
pub fn aggregate(outcomes: &[ActionOutcome]) -> Aggregate {
    let message = outcomes
        .iter()
        .map(|o| o.message.as_str())
        .filter(|m| !m.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    Aggregate {
        message,
        succeeded: outcomes.iter().any(|o| o.succeeded),
    }
}
