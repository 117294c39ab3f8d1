//! In-memory connectivity engine that replays a prepared script.
//!
//! It exchanges real session descriptions but never opens sockets: local
//! candidates and statistics polls come from an [`EngineScript`]. Used to
//! replay recorded calls and to exercise the session without a network.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future;
use rand::Rng;
use tokio::sync::Mutex;
use tracing::debug;

use crate::diagnostics::StatsRecord;
use crate::ice::Candidate;

use super::engine::{
    ConnectionPhase, ConnectivityEngine, DataChannel, EngineEvent, EngineEventSink, EngineFactory,
    GatheringPhase, IceServer,
};
use super::session_description::{DescriptionKind, SessionDescription};
use super::session_error::EngineError;

/// What a scripted engine reports.
#[derive(Debug, Clone, Default)]
pub struct EngineScript {
    pub local_candidates: Vec<Candidate>,
    pub stats: Vec<StatsRecord>,
    pub fail_construction: bool,
    pub fail_data_channel: bool,
    /// Statistics polls never complete.
    pub stall_stats: bool,
}

#[derive(Default)]
struct ScriptState {
    stats: Vec<StatsRecord>,
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    remote_candidates: Vec<Candidate>,
    channels: Vec<Arc<ScriptedDataChannel>>,
    servers: Vec<IceServer>,
    stats_polls: usize,
    closed: bool,
}

/// Engine whose behavior is fixed by an [`EngineScript`].
pub struct ScriptedEngine {
    events: EngineEventSink,
    user_fragment: String,
    password: String,
    local_candidates: Vec<Candidate>,
    fail_data_channel: bool,
    stall_stats: bool,
    state: Mutex<ScriptState>,
}

impl ScriptedEngine {
    pub fn new(script: &EngineScript, servers: &[IceServer], events: EngineEventSink) -> Self {
        Self {
            events,
            user_fragment: generate_random_string(8),
            password: generate_random_string(24),
            local_candidates: script.local_candidates.clone(),
            fail_data_channel: script.fail_data_channel,
            stall_stats: script.stall_stats,
            state: Mutex::new(ScriptState {
                stats: script.stats.clone(),
                servers: servers.to_vec(),
                ..ScriptState::default()
            }),
        }
    }

    /// Reports every scripted local candidate, then end-of-gathering.
    pub fn gather(&self) {
        self.emit(EngineEvent::GatheringPhaseChanged(GatheringPhase::Gathering));
        for candidate in &self.local_candidates {
            self.emit(EngineEvent::CandidateDiscovered(Some(candidate.clone())));
        }
        self.emit(EngineEvent::CandidateDiscovered(None));
        self.emit(EngineEvent::GatheringPhaseChanged(GatheringPhase::Complete));
    }

    /// Queues an arbitrary event as if the engine produced it.
    pub fn emit(&self, event: EngineEvent) -> bool {
        self.events.emit(event)
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    pub async fn stats_polls(&self) -> usize {
        self.state.lock().await.stats_polls
    }

    pub async fn remote_candidates(&self) -> Vec<Candidate> {
        self.state.lock().await.remote_candidates.clone()
    }

    pub async fn remote_description(&self) -> Option<SessionDescription> {
        self.state.lock().await.remote.clone()
    }

    pub async fn servers(&self) -> Vec<IceServer> {
        self.state.lock().await.servers.clone()
    }

    /// Data channels opened locally, in creation order.
    pub async fn data_channels(&self) -> Vec<Arc<ScriptedDataChannel>> {
        self.state.lock().await.channels.clone()
    }

    fn describe(&self, kind: DescriptionKind) -> SessionDescription {
        SessionDescription::compose(
            kind,
            &self.user_fragment,
            &self.password,
            &self.local_candidates,
        )
    }
}

#[async_trait]
impl ConnectivityEngine for ScriptedEngine {
    async fn create_offer(&self) -> Result<SessionDescription, EngineError> {
        if self.state.lock().await.closed {
            return Err(EngineError::Closed);
        }
        Ok(self.describe(DescriptionKind::Offer))
    }

    async fn create_answer(&self) -> Result<SessionDescription, EngineError> {
        let state = self.state.lock().await;
        if state.closed {
            return Err(EngineError::Closed);
        }
        if state.remote.is_none() {
            return Err(EngineError::Operation(
                "cannot answer without a remote offer".to_string(),
            ));
        }
        Ok(self.describe(DescriptionKind::Answer))
    }

    async fn set_local_description(
        &self,
        description: &SessionDescription,
    ) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(EngineError::Closed);
        }
        state.local = Some(description.clone());
        Ok(())
    }

    async fn set_remote_description(
        &self,
        description: &SessionDescription,
    ) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(EngineError::Closed);
        }
        state.remote = Some(description.clone());
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.state.lock().await.local.clone()
    }

    async fn add_remote_candidate(&self, candidate: &Candidate) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(EngineError::Closed);
        }
        if state.remote.is_none() {
            return Err(EngineError::Operation(
                "remote candidate added before the remote description".to_string(),
            ));
        }
        state.remote_candidates.push(candidate.clone());
        Ok(())
    }

    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>, EngineError> {
        if self.fail_data_channel {
            return Err(EngineError::Construction(format!(
                "data channel '{}' could not be opened",
                label
            )));
        }

        let channel = Arc::new(ScriptedDataChannel::new(label));
        self.state.lock().await.channels.push(Arc::clone(&channel));
        Ok(channel)
    }

    async fn stats(&self) -> Result<Vec<StatsRecord>, EngineError> {
        let records = {
            let mut state = self.state.lock().await;
            if state.closed {
                return Err(EngineError::Closed);
            }
            state.stats_polls += 1;
            state.stats.clone()
        };

        if self.stall_stats {
            future::pending::<()>().await;
        }
        Ok(records)
    }

    async fn close(&self) {
        let mut state = self.state.lock().await;
        if state.closed {
            return;
        }
        state.closed = true;
        debug!("Scripted engine (epoch {}) closed", self.events.epoch());
        self.events
            .emit(EngineEvent::ConnectionPhaseChanged(ConnectionPhase::Closed));
    }
}

/// Data channel that only records whether it was closed.
pub struct ScriptedDataChannel {
    label: String,
    closed: AtomicBool,
}

impl ScriptedDataChannel {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataChannel for ScriptedDataChannel {
    fn label(&self) -> &str {
        &self.label
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Builds [`ScriptedEngine`]s and keeps a handle on each one it created.
#[derive(Default)]
pub struct ScriptedEngineFactory {
    script: EngineScript,
    engines: Mutex<Vec<Arc<ScriptedEngine>>>,
}

impl ScriptedEngineFactory {
    pub fn new(script: EngineScript) -> Self {
        Self {
            script,
            engines: Mutex::new(Vec::new()),
        }
    }

    /// Most recently created engine.
    pub async fn last_engine(&self) -> Option<Arc<ScriptedEngine>> {
        self.engines.lock().await.last().cloned()
    }

    pub async fn engines_created(&self) -> usize {
        self.engines.lock().await.len()
    }
}

#[async_trait]
impl EngineFactory for ScriptedEngineFactory {
    async fn create(
        &self,
        servers: &[IceServer],
        events: EngineEventSink,
    ) -> Result<Arc<dyn ConnectivityEngine>, EngineError> {
        if self.script.fail_construction {
            return Err(EngineError::Construction(
                "scripted engine refused to start".to_string(),
            ));
        }

        let engine = Arc::new(ScriptedEngine::new(&self.script, servers, events));
        self.engines.lock().await.push(Arc::clone(&engine));
        Ok(engine)
    }
}

/// Generates pseudo-random identifiers for `ufrag` and password.
fn generate_random_string(len: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ\
                             abcdefghijklmnopqrstuvwxyz\
                             0123456789";

    let mut rng = rand::thread_rng();

    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}
