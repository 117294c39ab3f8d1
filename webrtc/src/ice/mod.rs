//! Module that groups candidate bookkeeping and pair telemetry.

mod candidate;
mod pair;
mod registry;
mod tracker;

pub use candidate::{
    calculate_priority, Candidate, CandidateKind, CandidateParseError, TransportProtocol,
};
pub use pair::{pair_priority, CandidatePair, CandidatePairState};
pub use registry::{CandidateRegistry, CandidateSide};
pub use tracker::CandidatePairTracker;
