//! Per-pair verdicts produced by the analyzer.

use serde::Serialize;

use crate::ice::CandidatePairState;

/// Classification of a candidate pair after analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    /// Nominated pair carrying traffic.
    SuccessPrimary,
    /// Succeeded but not nominated.
    SuccessBackup,
    Failed,
    /// Still waiting or being checked.
    Pending,
}

impl Verdict {
    /// Report position: successes before failures, primary before backup.
    pub fn report_rank(self) -> u8 {
        match self {
            Verdict::SuccessPrimary => 0,
            Verdict::SuccessBackup => 1,
            Verdict::Failed => 2,
            Verdict::Pending => 3,
        }
    }
}

/// Human-actionable explanation of one pair's outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionOutcome {
    pub verdict: Verdict,
    pub reason: String,
    pub details: String,
    pub suggestions: Vec<String>,
}

/// Outcome of one pair with its candidates rendered for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairVerdict {
    pub local: String,
    pub remote: String,
    pub state: CandidatePairState,
    pub priority: u64,
    pub outcome: ConnectionOutcome,
}

impl ConnectionOutcome {
    pub fn new(verdict: Verdict, reason: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            verdict,
            reason: reason.into(),
            details: details.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }
}
