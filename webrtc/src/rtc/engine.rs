//! Interface to the underlying ICE/DTLS/SCTP implementation.
//!
//! The session never touches sockets itself. Any standards-compliant engine
//! can be plugged in by implementing [`ConnectivityEngine`] and
//! [`EngineFactory`]; the engine reports what it discovers through an
//! [`EngineEventSink`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::diagnostics::StatsRecord;
use crate::ice::Candidate;

use super::session_description::SessionDescription;
use super::session_error::EngineError;

/// Relay or reflexive server descriptor handed to the engine at construction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub credential: Option<String>,
}

/// Overall peer connection phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionPhase {
    #[default]
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// ICE transport phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IcePhase {
    #[default]
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

/// Local candidate gathering phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatheringPhase {
    #[default]
    New,
    Gathering,
    Complete,
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionPhase::New => "new",
            ConnectionPhase::Connecting => "connecting",
            ConnectionPhase::Connected => "connected",
            ConnectionPhase::Disconnected => "disconnected",
            ConnectionPhase::Failed => "failed",
            ConnectionPhase::Closed => "closed",
        };
        f.write_str(name)
    }
}

impl fmt::Display for IcePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IcePhase::New => "new",
            IcePhase::Checking => "checking",
            IcePhase::Connected => "connected",
            IcePhase::Completed => "completed",
            IcePhase::Disconnected => "disconnected",
            IcePhase::Failed => "failed",
            IcePhase::Closed => "closed",
        };
        f.write_str(name)
    }
}

impl fmt::Display for GatheringPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GatheringPhase::New => "new",
            GatheringPhase::Gathering => "gathering",
            GatheringPhase::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// Data channel opened over the negotiated transport.
#[async_trait]
pub trait DataChannel: Send + Sync {
    fn label(&self) -> &str;

    async fn close(&self);
}

/// Asynchronous notification from the engine.
pub enum EngineEvent {
    /// A local candidate, or `None` once gathering has finished.
    CandidateDiscovered(Option<Candidate>),
    ConnectionPhaseChanged(ConnectionPhase),
    IcePhaseChanged(IcePhase),
    GatheringPhaseChanged(GatheringPhase),
    /// The peer opened a data channel towards us.
    DataChannelOpened(Arc<dyn DataChannel>),
}

impl fmt::Debug for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineEvent::CandidateDiscovered(candidate) => {
                f.debug_tuple("CandidateDiscovered").field(candidate).finish()
            }
            EngineEvent::ConnectionPhaseChanged(phase) => {
                f.debug_tuple("ConnectionPhaseChanged").field(phase).finish()
            }
            EngineEvent::IcePhaseChanged(phase) => {
                f.debug_tuple("IcePhaseChanged").field(phase).finish()
            }
            EngineEvent::GatheringPhaseChanged(phase) => {
                f.debug_tuple("GatheringPhaseChanged").field(phase).finish()
            }
            EngineEvent::DataChannelOpened(channel) => {
                f.debug_tuple("DataChannelOpened").field(&channel.label()).finish()
            }
        }
    }
}

/// Event tagged with the session epoch of the engine that produced it.
#[derive(Debug)]
pub struct EngineEnvelope {
    pub epoch: u64,
    pub event: EngineEvent,
}

/// Sending half handed to an engine so it can report events in order.
#[derive(Debug, Clone)]
pub struct EngineEventSink {
    epoch: u64,
    tx: mpsc::UnboundedSender<EngineEnvelope>,
}

impl EngineEventSink {
    pub fn new(epoch: u64, tx: mpsc::UnboundedSender<EngineEnvelope>) -> Self {
        Self { epoch, tx }
    }

    /// Queues an event; returns `false` if nobody listens any more.
    pub fn emit(&self, event: EngineEvent) -> bool {
        self.tx
            .send(EngineEnvelope {
                epoch: self.epoch,
                event,
            })
            .is_ok()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// The operations the session needs from an ICE implementation.
#[async_trait]
pub trait ConnectivityEngine: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, EngineError>;

    async fn create_answer(&self) -> Result<SessionDescription, EngineError>;

    async fn set_local_description(&self, description: &SessionDescription)
        -> Result<(), EngineError>;

    async fn set_remote_description(
        &self,
        description: &SessionDescription,
    ) -> Result<(), EngineError>;

    /// Current local description, including candidates gathered so far.
    async fn local_description(&self) -> Option<SessionDescription>;

    async fn add_remote_candidate(&self, candidate: &Candidate) -> Result<(), EngineError>;

    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>, EngineError>;

    /// Polls the engine's connectivity statistics.
    async fn stats(&self) -> Result<Vec<StatsRecord>, EngineError>;

    async fn close(&self);
}

/// Builds engines; construction failure is fatal to `initialize()`.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn create(
        &self,
        servers: &[IceServer],
        events: EngineEventSink,
    ) -> Result<Arc<dyn ConnectivityEngine>, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_tags_events_with_epoch() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EngineEventSink::new(7, tx);

        assert!(sink.emit(EngineEvent::GatheringPhaseChanged(GatheringPhase::Gathering)));

        let envelope = rx.try_recv().unwrap();
        assert_eq!(envelope.epoch, 7);
        assert!(matches!(
            envelope.event,
            EngineEvent::GatheringPhaseChanged(GatheringPhase::Gathering)
        ));
    }

    #[test]
    fn test_sink_reports_closed_listener() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = EngineEventSink::new(1, tx);
        drop(rx);

        assert!(!sink.emit(EngineEvent::CandidateDiscovered(None)));
    }

    #[test]
    fn test_ice_server_deserializes_without_credentials() {
        let server: IceServer =
            serde_json::from_str(r#"{"urls":["stun:stun.example.org:3478"]}"#).unwrap();
        assert_eq!(server.username, None);
        assert_eq!(server.urls.len(), 1);
    }
}
