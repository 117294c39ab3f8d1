//! Offer/answer state machine wired to a connectivity engine and the
//! diagnostic pipeline.
//!
//! A [`SignalingSession`] owns at most one engine at a time. Every engine it
//! creates gets a fresh epoch; events, statistics polls and grace timers
//! carrying an older epoch are dropped, so nothing from a session that was
//! reset can leak into the next one.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::diagnostics::{
    analyze, summarize, DiagnosticEvent, DiagnosticReporter, PairVerdict, StatsSnapshot,
};
use crate::ice::{
    Candidate, CandidateKind, CandidatePairTracker, CandidateRegistry, CandidateSide,
};

use super::engine::{
    ConnectionPhase, ConnectivityEngine, DataChannel, EngineEnvelope, EngineEvent,
    EngineEventSink, EngineFactory, GatheringPhase, IcePhase, IceServer,
};
use super::session_config::SessionConfig;
use super::session_description::{DescriptionKind, SessionDescription};
use super::session_error::{EngineError, Result, SessionError};
use super::signaling_state::{SessionRole, SignalingState};

/// Why a statistics poll was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisTrigger {
    GatheringComplete,
    Connected,
    Failed,
    /// Explicit request from the caller.
    Manual,
}

/// Last phases reported by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PhaseSnapshot {
    pub connection: ConnectionPhase,
    pub ice: IcePhase,
    pub gathering: GatheringPhase,
}

/// Delay between producing a local description and exposing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraceTimer {
    epoch: u64,
    delay: Duration,
}

impl GraceTimer {
    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Waits out the grace period.
    pub async fn elapsed(self) -> Self {
        tokio::time::sleep(self.delay).await;
        self
    }
}

/// Statistics poll that can run without borrowing the session.
pub struct StatsPoll {
    epoch: u64,
    trigger: AnalysisTrigger,
    controlling: bool,
    engine: Arc<dyn ConnectivityEngine>,
}

impl StatsPoll {
    pub fn trigger(&self) -> AnalysisTrigger {
        self.trigger
    }

    pub async fn run(self) -> PolledStats {
        let controlling = self.controlling;
        let result = self
            .engine
            .stats()
            .await
            .map(|records| StatsSnapshot::from_records(records, controlling));

        PolledStats {
            epoch: self.epoch,
            trigger: self.trigger,
            result,
        }
    }
}

/// Completed statistics poll, ready for [`SignalingSession::apply_stats`].
#[derive(Debug)]
pub struct PolledStats {
    pub epoch: u64,
    pub trigger: AnalysisTrigger,
    pub result: std::result::Result<StatsSnapshot, EngineError>,
}

/// Read-only view of a session for display.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub state: SignalingState,
    pub role: Option<SessionRole>,
    pub phases: PhaseSnapshot,
    pub local_candidates: Vec<(CandidateKind, usize)>,
    pub remote_candidates: Vec<(CandidateKind, usize)>,
    pub verdicts: Vec<PairVerdict>,
    pub events: Vec<DiagnosticEvent>,
    pub local_description: Option<SessionDescription>,
}

/// One peer's side of a connectivity diagnostic call.
pub struct SignalingSession {
    config: SessionConfig,
    factory: Arc<dyn EngineFactory>,
    events_tx: mpsc::UnboundedSender<EngineEnvelope>,
    engine: Option<Arc<dyn ConnectivityEngine>>,
    data_channel: Option<Arc<dyn DataChannel>>,
    role: Option<SessionRole>,
    state: SignalingState,
    epoch: u64,
    registry: CandidateRegistry,
    tracker: CandidatePairTracker,
    reporter: DiagnosticReporter,
    verdicts: Vec<PairVerdict>,
    phases: PhaseSnapshot,
    gathering_complete: bool,
    failure_reported: bool,
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    /// Remote candidates held back until the engine has a remote description.
    pending_remote: Vec<Candidate>,
}

impl SignalingSession {
    /// Creates an idle session; engine events are sent to `events_tx` and
    /// must be fed back through [`SignalingSession::handle_event`].
    pub fn new(
        config: SessionConfig,
        factory: Arc<dyn EngineFactory>,
        events_tx: mpsc::UnboundedSender<EngineEnvelope>,
    ) -> Self {
        Self {
            config,
            factory,
            events_tx,
            engine: None,
            data_channel: None,
            role: None,
            state: SignalingState::Idle,
            epoch: 0,
            registry: CandidateRegistry::new(),
            tracker: CandidatePairTracker::new(),
            reporter: DiagnosticReporter::new(),
            verdicts: Vec::new(),
            phases: PhaseSnapshot::default(),
            gathering_complete: false,
            failure_reported: false,
            local_description: None,
            remote_description: None,
            pending_remote: Vec::new(),
        }
    }

    /// Convenience constructor returning the receiving end of the event channel.
    pub fn with_event_channel(
        config: SessionConfig,
        factory: Arc<dyn EngineFactory>,
    ) -> (Self, mpsc::UnboundedReceiver<EngineEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(config, factory, tx), rx)
    }

    pub fn state(&self) -> SignalingState {
        self.state
    }

    pub fn role(&self) -> Option<SessionRole> {
        self.role
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn phases(&self) -> PhaseSnapshot {
        self.phases
    }

    pub fn registry(&self) -> &CandidateRegistry {
        &self.registry
    }

    pub fn tracker(&self) -> &CandidatePairTracker {
        &self.tracker
    }

    pub fn reporter(&self) -> &DiagnosticReporter {
        &self.reporter
    }

    pub fn verdicts(&self) -> &[PairVerdict] {
        &self.verdicts
    }

    pub fn local_description(&self) -> Option<&SessionDescription> {
        self.local_description.as_ref()
    }

    pub fn remote_description(&self) -> Option<&SessionDescription> {
        self.remote_description.as_ref()
    }

    pub fn data_channel(&self) -> Option<&Arc<dyn DataChannel>> {
        self.data_channel.as_ref()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            role: self.role,
            phases: self.phases,
            local_candidates: self.registry.summary_by_type(CandidateSide::Local),
            remote_candidates: self.registry.summary_by_type(CandidateSide::Remote),
            verdicts: self.verdicts.clone(),
            events: self.reporter.events().to_vec(),
            local_description: self.local_description.clone(),
        }
    }

    /// Starts a session in `role`: builds the engine and, for the initiator,
    /// opens the data channel.
    ///
    /// Fails with [`SessionError::AlreadyActive`] unless the session is idle,
    /// leaving the active session untouched.
    pub async fn initialize(&mut self, role: SessionRole, servers: &[IceServer]) -> Result<()> {
        if !self.state.is_idle() {
            return Err(self.surface(SessionError::AlreadyActive));
        }

        self.clear();
        self.epoch += 1;

        info!("Initializing {} session (epoch {})", role, self.epoch);

        let sink = EngineEventSink::new(self.epoch, self.events_tx.clone());
        let created = self.factory.create(servers, sink).await;
        let engine = self.check(created)?;

        if role.is_controlling() {
            match engine.create_data_channel(&self.config.data_channel_label).await {
                Ok(channel) => self.data_channel = Some(channel),
                Err(err) => {
                    engine.close().await;
                    return Err(self.surface(err.into()));
                }
            }
        }

        self.engine = Some(engine);
        self.role = Some(role);
        self.reporter.info(format!(
            "Session initialized as {} with {} ICE servers",
            role,
            servers.len()
        ));
        self.transition(role.ready_state());
        Ok(())
    }

    /// Produces the local offer. The returned timer must elapse before the
    /// offer is exposed through [`SignalingSession::expose_local_description`].
    pub async fn create_offer(&mut self) -> Result<GraceTimer> {
        let engine = self.require_phase("create an offer", SignalingState::InitiatorReady)?;

        let offer = engine.create_offer().await;
        let offer = self.check(offer)?;
        let applied = engine.set_local_description(&offer).await;
        self.check(applied)?;

        self.local_description = Some(offer);
        self.transition(SignalingState::OfferCreated);
        Ok(self.grace_timer())
    }

    /// Applies the remote offer and produces the local answer.
    ///
    /// Nothing is committed if the offer is malformed or the engine rejects it.
    pub async fn accept_offer(&mut self, text: &str) -> Result<GraceTimer> {
        let engine = self.require_phase("accept an offer", SignalingState::ReceiverReady)?;
        let (offer, candidates) = self.parse_remote(text, DescriptionKind::Offer)?;

        let applied = engine.set_remote_description(&offer).await;
        self.check(applied)?;
        let answer = engine.create_answer().await;
        let answer = self.check(answer)?;
        let applied = engine.set_local_description(&answer).await;
        self.check(applied)?;

        self.record_remote_candidates(candidates);
        self.remote_description = Some(offer);
        self.local_description = Some(answer);
        self.transition(SignalingState::OfferReceived);
        self.flush_remote_candidates(&engine).await;
        Ok(self.grace_timer())
    }

    /// Applies the remote answer to a pending offer.
    pub async fn accept_answer(&mut self, text: &str) -> Result<()> {
        let engine = self.require_phase("accept an answer", SignalingState::AwaitingAnswer)?;
        let (answer, candidates) = self.parse_remote(text, DescriptionKind::Answer)?;

        let applied = engine.set_remote_description(&answer).await;
        self.check(applied)?;

        self.record_remote_candidates(candidates);
        self.remote_description = Some(answer);
        self.transition(SignalingState::Answered);
        self.flush_remote_candidates(&engine).await;
        Ok(())
    }

    /// Completes a grace period: the local description, with every candidate
    /// gathered so far, becomes available to signaling.
    ///
    /// Returns `None` for timers that outlived their session or phase.
    pub async fn expose_local_description(
        &mut self,
        timer: GraceTimer,
    ) -> Result<Option<SessionDescription>> {
        if timer.epoch != self.epoch {
            debug!("Discarding grace timer from epoch {}", timer.epoch);
            return Ok(None);
        }

        let next = match self.state {
            SignalingState::OfferCreated => SignalingState::AwaitingAnswer,
            SignalingState::OfferReceived => SignalingState::AnswerCreated,
            _ => return Ok(None),
        };
        let engine = match &self.engine {
            Some(engine) => Arc::clone(engine),
            None => return Ok(None),
        };

        let description = match engine.local_description().await {
            Some(description) => description,
            None => match self.local_description.clone() {
                Some(description) => description,
                None => {
                    let err = EngineError::Operation("no local description".to_string());
                    return Err(self.surface(err.into()));
                }
            },
        };

        let attached = description.candidates().map(|c| c.len()).unwrap_or(0);
        self.reporter.info(format!(
            "Local {} ready to send ({} candidates attached)",
            description.kind, attached
        ));

        self.local_description = Some(description.clone());
        self.transition(next);
        Ok(Some(description))
    }

    /// Records a locally discovered candidate; `None` marks end of gathering.
    pub fn on_candidate_discovered(&mut self, candidate: Option<Candidate>) -> Option<AnalysisTrigger> {
        match candidate {
            Some(candidate) => {
                self.reporter.debug(format!(
                    "Local candidate: {} (priority {})",
                    candidate, candidate.priority
                ));
                self.registry.record(candidate, CandidateSide::Local);
                None
            }
            None => self.finish_gathering(),
        }
    }

    /// Ingests a remote candidate conveyed out-of-band.
    ///
    /// Candidates that arrive before the remote description are kept and
    /// handed to the engine, in arrival order, once the description is applied.
    pub async fn on_remote_candidate_received(&mut self, descriptor: &str) -> Result<()> {
        let candidate = match descriptor.parse::<Candidate>() {
            Ok(candidate) => candidate,
            Err(err) => return Err(self.surface(err.into())),
        };

        self.reporter.debug(format!("Remote candidate: {}", candidate));
        self.registry.record(candidate.clone(), CandidateSide::Remote);

        match self.engine.clone() {
            Some(engine) if self.remote_description.is_some() => {
                let added = engine.add_remote_candidate(&candidate).await;
                self.check(added)?;
            }
            _ => {
                debug!("Holding remote candidate {} until a remote description is set", candidate);
                self.pending_remote.push(candidate);
            }
        }
        Ok(())
    }

    /// Applies one engine notification. Returns the analysis it calls for.
    pub fn handle_event(&mut self, envelope: EngineEnvelope) -> Option<AnalysisTrigger> {
        if envelope.epoch != self.epoch || self.state.is_idle() {
            debug!(
                "Discarding {:?} from epoch {} (current {})",
                envelope.event, envelope.epoch, self.epoch
            );
            return None;
        }

        match envelope.event {
            EngineEvent::CandidateDiscovered(candidate) => self.on_candidate_discovered(candidate),
            EngineEvent::GatheringPhaseChanged(phase) => {
                self.phases.gathering = phase;
                self.reporter.debug(format!("ICE gathering state: {}", phase));
                if phase == GatheringPhase::Complete {
                    self.finish_gathering()
                } else {
                    None
                }
            }
            EngineEvent::IcePhaseChanged(phase) => {
                if self.phases.ice == phase {
                    return None;
                }
                self.phases.ice = phase;
                self.reporter.debug(format!("ICE connection state: {}", phase));
                if phase == IcePhase::Failed {
                    self.failure_trigger()
                } else {
                    None
                }
            }
            EngineEvent::ConnectionPhaseChanged(phase) => {
                if self.phases.connection == phase {
                    return None;
                }
                self.phases.connection = phase;
                self.reporter.info(format!("Connection state: {}", phase));
                match phase {
                    ConnectionPhase::Connected => {
                        if self.state == SignalingState::AnswerCreated {
                            self.transition(SignalingState::Answered);
                        }
                        self.failure_reported = false;
                        Some(AnalysisTrigger::Connected)
                    }
                    ConnectionPhase::Failed => self.failure_trigger(),
                    _ => None,
                }
            }
            EngineEvent::DataChannelOpened(channel) => {
                self.reporter
                    .info(format!("Data channel '{}' open", channel.label()));
                if self.data_channel.is_none() {
                    self.data_channel = Some(channel);
                }
                None
            }
        }
    }

    /// Prepares a statistics poll of the current engine.
    pub fn stats_poll(&self, trigger: AnalysisTrigger) -> Option<StatsPoll> {
        let engine = self.engine.as_ref()?;
        Some(StatsPoll {
            epoch: self.epoch,
            trigger,
            controlling: self.role.map(SessionRole::is_controlling).unwrap_or(false),
            engine: Arc::clone(engine),
        })
    }

    /// Folds a poll result into the tracker and reports on it.
    ///
    /// Results from a previous session are ignored.
    pub fn apply_stats(&mut self, polled: PolledStats) {
        if polled.epoch != self.epoch || self.state.is_idle() {
            warn!("Discarding statistics from epoch {}", polled.epoch);
            return;
        }

        let snapshot = match polled.result {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.reporter.error(format!("Statistics poll failed: {}", err));
                if polled.trigger == AnalysisTrigger::GatheringComplete {
                    let by_type = self.registry.summary_by_type(CandidateSide::Local);
                    let summary = summarize(self.tracker.pairs());
                    self.reporter.report_gathering_complete(&by_type, &summary);
                }
                return;
            }
        };

        for (side, id, candidate) in snapshot.candidates() {
            self.registry
                .attach_stats_id(side, id.clone(), candidate.clone());
        }
        self.tracker.ingest_snapshot(snapshot.pairs);

        let summary = summarize(self.tracker.pairs());
        self.verdicts = analyze(&self.tracker, &self.registry);

        match polled.trigger {
            AnalysisTrigger::GatheringComplete => {
                let by_type = self.registry.summary_by_type(CandidateSide::Local);
                self.reporter.report_gathering_complete(&by_type, &summary);
            }
            AnalysisTrigger::Connected => self.reporter.report_connected(&self.verdicts, &summary),
            AnalysisTrigger::Failed => self.reporter.report_failed(&self.verdicts, &summary),
            AnalysisTrigger::Manual => self.reporter.report_verdicts(&self.verdicts, &summary),
        }
    }

    /// Like [`SignalingSession::stats_poll`], but a missing session is an error
    /// reported to the diagnostic log.
    pub fn require_stats_poll(&mut self, trigger: AnalysisTrigger) -> Result<StatsPoll> {
        match self.stats_poll(trigger) {
            Some(poll) => Ok(poll),
            None => Err(self.surface(SessionError::NoActiveSession)),
        }
    }

    /// Polls statistics inline and applies them.
    pub async fn refresh_diagnostics(&mut self, trigger: AnalysisTrigger) -> Result<()> {
        let poll = self.require_stats_poll(trigger)?;
        let polled = poll.run().await;
        self.apply_stats(polled);
        Ok(())
    }

    /// Tears the session down and returns to idle.
    ///
    /// Safe to call at any time, including when already idle. Diagnostic
    /// events are kept.
    pub async fn reset(&mut self) {
        let was_active = !self.state.is_idle() || self.engine.is_some();

        if let Some(channel) = self.data_channel.take() {
            channel.close().await;
        }
        if let Some(engine) = self.engine.take() {
            engine.close().await;
        }

        self.epoch += 1;
        self.clear();
        self.role = None;
        self.state = SignalingState::Idle;

        if was_active {
            self.reporter.info("Session reset");
        }
    }

    fn clear(&mut self) {
        self.registry.clear();
        self.tracker.clear();
        self.verdicts.clear();
        self.phases = PhaseSnapshot::default();
        self.gathering_complete = false;
        self.failure_reported = false;
        self.local_description = None;
        self.remote_description = None;
        self.pending_remote.clear();
    }

    fn transition(&mut self, next: SignalingState) {
        if self.state == next {
            return;
        }
        self.reporter
            .debug(format!("Signaling state: {} -> {}", self.state, next));
        self.state = next;
    }

    fn grace_timer(&self) -> GraceTimer {
        GraceTimer {
            epoch: self.epoch,
            delay: self.config.candidate_grace,
        }
    }

    fn finish_gathering(&mut self) -> Option<AnalysisTrigger> {
        if self.gathering_complete {
            return None;
        }
        self.gathering_complete = true;
        self.phases.gathering = GatheringPhase::Complete;

        if self.engine.is_none() {
            let by_type = self.registry.summary_by_type(CandidateSide::Local);
            let summary = summarize(self.tracker.pairs());
            self.reporter.report_gathering_complete(&by_type, &summary);
            return None;
        }
        Some(AnalysisTrigger::GatheringComplete)
    }

    fn failure_trigger(&mut self) -> Option<AnalysisTrigger> {
        if self.failure_reported {
            return None;
        }
        self.failure_reported = true;
        Some(AnalysisTrigger::Failed)
    }

    fn require_phase(
        &mut self,
        operation: &'static str,
        expected: SignalingState,
    ) -> Result<Arc<dyn ConnectivityEngine>> {
        let engine = match self.engine.clone() {
            Some(engine) if !self.state.is_idle() => engine,
            _ => return Err(self.surface(SessionError::NoActiveSession)),
        };

        if self.state != expected {
            let state = self.state;
            return Err(self.surface(SessionError::InvalidState { operation, state }));
        }
        Ok(engine)
    }

    fn parse_remote(
        &mut self,
        text: &str,
        kind: DescriptionKind,
    ) -> Result<(SessionDescription, Vec<Candidate>)> {
        let parsed = SessionDescription::parse(text, kind).and_then(|description| {
            let candidates = description.candidates()?;
            Ok((description, candidates))
        });
        parsed.map_err(|err| self.surface(err))
    }

    fn record_remote_candidates(&mut self, candidates: Vec<Candidate>) {
        for candidate in candidates {
            self.reporter
                .debug(format!("Remote candidate: {}", candidate));
            self.registry.record(candidate, CandidateSide::Remote);
        }
    }

    async fn flush_remote_candidates(&mut self, engine: &Arc<dyn ConnectivityEngine>) {
        for candidate in std::mem::take(&mut self.pending_remote) {
            if let Err(err) = engine.add_remote_candidate(&candidate).await {
                self.surface(err.into());
            }
        }
    }

    fn check<T>(&mut self, result: std::result::Result<T, EngineError>) -> Result<T> {
        result.map_err(|err| self.surface(err.into()))
    }

    /// Reports an error to the diagnostic log before handing it back.
    fn surface(&mut self, err: SessionError) -> SessionError {
        self.reporter.error(err.to_string());
        err
    }
}
