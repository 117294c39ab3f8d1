pub mod diagnostics;
pub mod ice;
pub mod rtc;

pub use diagnostics::{DiagnosticEvent, DiagnosticReporter, PairVerdict, Verdict};
pub use ice::{Candidate, CandidateKind, CandidateRegistry, CandidatePairTracker};
pub use rtc::{
    SessionConfig, SessionDescription, SessionDriver, SessionError, SessionHandle, SessionRole,
    SignalingSession, SignalingState,
};
