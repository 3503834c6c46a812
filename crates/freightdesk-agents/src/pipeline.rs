//! Stages one offer passes through on its way from intake to dispatch.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where an offer is in the pipeline.
///
/// `Pending → Costed | Unpriced`, `Costed → Suggested | Skipped`,
/// `Suggested → Dispatched | DispatchFailed`. `Unpriced`, `Skipped`,
/// `Dispatched` and `DispatchFailed` are terminal. A `Suggested` offer that
/// is not auto-sent also ends the pass there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStage {
    Pending,
    Costed,
    Unpriced,
    Suggested,
    Skipped,
    Dispatched,
    DispatchFailed,
}

impl OfferStage {
    pub fn can_advance_to(self, next: OfferStage) -> bool {
        use OfferStage::*;
        matches!(
            (self, next),
            (Pending, Costed)
                | (Pending, Unpriced)
                | (Costed, Suggested)
                | (Costed, Skipped)
                | (Suggested, Dispatched)
                | (Suggested, DispatchFailed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OfferStage::Unpriced
                | OfferStage::Skipped
                | OfferStage::Dispatched
                | OfferStage::DispatchFailed
        )
    }
}

impl fmt::Display for OfferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OfferStage::Pending => "pending",
            OfferStage::Costed => "costed",
            OfferStage::Unpriced => "unpriced",
            OfferStage::Suggested => "suggested",
            OfferStage::Skipped => "skipped",
            OfferStage::Dispatched => "dispatched",
            OfferStage::DispatchFailed => "dispatch_failed",
        };
        f.write_str(name)
    }
}

/// Current stage plus the stages already left behind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageTracker {
    stage: OfferStage,
    history: Vec<OfferStage>,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self {
            stage: OfferStage::Pending,
            history: Vec::new(),
        }
    }
}

impl StageTracker {
    pub fn stage(&self) -> OfferStage {
        self.stage
    }

    pub fn history(&self) -> &[OfferStage] {
        &self.history
    }

    /// Move to `next`. Returns false and stays put on an illegal move.
    pub fn advance(&mut self, next: OfferStage) -> bool {
        if !self.stage.can_advance_to(next) {
            return false;
        }
        self.history.push(self.stage);
        self.stage = next;
        true
    }
}
