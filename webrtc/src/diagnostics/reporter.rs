//! Ordered, timestamped event stream consumed by the UI layer.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::{debug, error, info};

use crate::ice::CandidateKind;

use super::analyzer::PairSummary;
use super::outcome::{PairVerdict, Verdict};

/// Severity of a reported event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Info,
    Debug,
    Error,
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventCategory::Info => "info",
            EventCategory::Debug => "debug",
            EventCategory::Error => "error",
        };
        f.pad(name)
    }
}

/// One line of the diagnostic log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticEvent {
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    pub category: EventCategory,
    pub text: String,
}

/// Append-only diagnostic log.
///
/// Every event is mirrored to `tracing` at the matching level.
#[derive(Debug, Default)]
pub struct DiagnosticReporter {
    events: Vec<DiagnosticEvent>,
}

impl DiagnosticReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, text: impl Into<String>) {
        let text = text.into();
        info!("{}", text);
        self.push(EventCategory::Info, text);
    }

    pub fn debug(&mut self, text: impl Into<String>) {
        let text = text.into();
        debug!("{}", text);
        self.push(EventCategory::Debug, text);
    }

    pub fn error(&mut self, text: impl Into<String>) {
        let text = text.into();
        error!("{}", text);
        self.push(EventCategory::Error, text);
    }

    fn push(&mut self, category: EventCategory, text: String) {
        self.events.push(DiagnosticEvent {
            timestamp_ms: timestamp_ms(),
            category,
            text,
        });
    }

    pub fn events(&self) -> &[DiagnosticEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Candidate summary once local gathering has finished.
    pub fn report_gathering_complete(
        &mut self,
        by_type: &[(CandidateKind, usize)],
        pairs: &PairSummary,
    ) {
        let total: usize = by_type.iter().map(|(_, count)| count).sum();
        let breakdown = by_type
            .iter()
            .map(|(kind, count)| format!("{}: {}", kind, count))
            .collect::<Vec<_>>()
            .join(", ");

        if total == 0 {
            self.error("ICE gathering complete without any local candidate");
        } else {
            self.info(format!(
                "ICE gathering complete: {} local candidates ({})",
                total, breakdown
            ));
        }

        if pairs.total() > 0 {
            self.debug(format!(
                "Candidate pairs so far: {} succeeded, {} failed, {} in progress, {} waiting",
                pairs.succeeded, pairs.failed, pairs.in_progress, pairs.waiting
            ));
        }
    }

    /// Success summary: the active path first, then backups.
    pub fn report_connected(&mut self, verdicts: &[PairVerdict], summary: &PairSummary) {
        self.info(format!(
            "Connection established: {} of {} pairs succeeded",
            summary.succeeded,
            summary.total()
        ));
        self.report_verdicts(verdicts, summary);
    }

    /// Failure summary followed by a diagnosis per failed pair.
    pub fn report_failed(&mut self, verdicts: &[PairVerdict], summary: &PairSummary) {
        self.error(format!(
            "Connection failed: {} of {} pairs failed",
            summary.failed,
            summary.total()
        ));
        if summary.total() == 0 {
            self.error("No candidate pairs were tested; check that candidates were exchanged");
        }
        self.report_verdicts(verdicts, summary);
    }

    /// Per-pair lines in report order, then counts for pairs still pending.
    pub fn report_verdicts(&mut self, verdicts: &[PairVerdict], summary: &PairSummary) {
        let mut ordered: Vec<&PairVerdict> = verdicts.iter().collect();
        ordered.sort_by_key(|verdict| verdict.outcome.verdict.report_rank());

        for verdict in ordered {
            let outcome = &verdict.outcome;
            match outcome.verdict {
                Verdict::SuccessPrimary => self.info(format!(
                    "Active pair: {} <-> {} ({})",
                    verdict.local, verdict.remote, outcome.details
                )),
                Verdict::SuccessBackup => self.debug(format!(
                    "Backup pair: {} <-> {} ({})",
                    verdict.local, verdict.remote, outcome.details
                )),
                Verdict::Failed => {
                    self.error(format!(
                        "Failed pair: {} <-> {}: {}",
                        verdict.local, verdict.remote, outcome.reason
                    ));
                    self.debug(format!("  {}", outcome.details));
                    for suggestion in &outcome.suggestions {
                        self.debug(format!("  - {}", suggestion));
                    }
                }
                Verdict::Pending => {}
            }
        }

        self.report_pending(summary);
    }

    /// In-progress and waiting summaries; counts only.
    pub fn report_pending(&mut self, summary: &PairSummary) {
        if summary.in_progress > 0 {
            self.info(format!("{} pairs still being checked", summary.in_progress));
        }
        if summary.waiting > 0 {
            self.info(format!("{} pairs waiting to be tested", summary.waiting));
        }
    }
}

fn timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
