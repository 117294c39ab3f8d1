//! Connectivity diagnostics: telemetry records, analysis and reporting.

pub mod analyzer;
mod outcome;
mod reporter;
mod stats;

pub use analyzer::{
    analyze, classify_successful, diagnose_failure, summarize, PairSummary, SuccessfulPairs,
};
pub use outcome::{ConnectionOutcome, PairVerdict, Verdict};
pub use reporter::{DiagnosticEvent, DiagnosticReporter, EventCategory};
pub use stats::{CandidateStats, StatsRecord, StatsSnapshot};
