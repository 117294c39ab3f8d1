//! Signaling session, its connectivity engine seam and the task driving it.

mod engine;
mod scripted_engine;
mod session_config;
mod session_description;
mod session_driver;
mod session_error;
mod signaling_session;
mod signaling_state;

pub use engine::{
    ConnectionPhase, ConnectivityEngine, DataChannel, EngineEnvelope, EngineEvent,
    EngineEventSink, EngineFactory, GatheringPhase, IcePhase, IceServer,
};
pub use scripted_engine::{
    EngineScript, ScriptedDataChannel, ScriptedEngine, ScriptedEngineFactory,
};
pub use session_config::{SessionConfig, DEFAULT_CANDIDATE_GRACE, DEFAULT_DATA_CHANNEL_LABEL};
pub use session_description::{DescriptionKind, SessionDescription};
pub use session_driver::{SessionDriver, SessionHandle};
pub use session_error::{EngineError, Result, SessionError};
pub use signaling_session::{
    AnalysisTrigger, GraceTimer, PhaseSnapshot, PolledStats, SessionSnapshot, SignalingSession,
    StatsPoll,
};
pub use signaling_state::{SessionRole, SignalingState};
