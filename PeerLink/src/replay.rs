//! Replays a recorded call through a signaling session.
//!
//! A call dump holds what the engine reported during a real call: local and
//! remote candidate descriptors, the last statistics poll and the final
//! connection phase. The replay feeds them to a session backed by a scripted
//! engine and returns the resulting snapshot.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use peer_link::diagnostics::StatsRecord;
use peer_link::ice::Candidate;
use peer_link::rtc::{
    AnalysisTrigger, ConnectionPhase, EngineEnvelope, EngineEvent, EngineScript, IcePhase,
    ScriptedEngineFactory, SessionRole, SessionSnapshot, SignalingSession,
};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::AppConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct CallDump {
    pub role: SessionRole,
    #[serde(default)]
    pub local_candidates: Vec<String>,
    #[serde(default)]
    pub remote_candidates: Vec<String>,
    #[serde(default)]
    pub stats: Vec<StatsRecord>,
    #[serde(default)]
    pub connection_state: ConnectionPhase,
}

impl CallDump {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("cannot read call dump {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("invalid call dump {}", path.display()))
    }
}

pub async fn replay(dump: CallDump, config: &AppConfig) -> anyhow::Result<SessionSnapshot> {
    let local_candidates = dump
        .local_candidates
        .iter()
        .map(|descriptor| {
            descriptor
                .parse::<Candidate>()
                .with_context(|| format!("invalid local candidate '{}'", descriptor))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let factory = Arc::new(ScriptedEngineFactory::new(EngineScript {
        local_candidates,
        stats: dump.stats,
        ..EngineScript::default()
    }));
    let (mut session, mut events) =
        SignalingSession::with_event_channel(config.session_config(), factory.clone());

    info!("Replaying {} call", dump.role);
    session.initialize(dump.role, &config.ice_servers).await?;
    let engine = factory
        .last_engine()
        .await
        .context("connectivity engine was not created")?;

    engine.gather();
    pump(&mut session, &mut events).await;

    for descriptor in &dump.remote_candidates {
        if let Err(err) = session.on_remote_candidate_received(descriptor).await {
            warn!("Skipping remote candidate '{}': {}", descriptor, err);
        }
    }

    engine.emit(EngineEvent::IcePhaseChanged(IcePhase::Checking));
    engine.emit(EngineEvent::ConnectionPhaseChanged(ConnectionPhase::Connecting));
    if !matches!(
        dump.connection_state,
        ConnectionPhase::New | ConnectionPhase::Connecting
    ) {
        engine.emit(EngineEvent::ConnectionPhaseChanged(dump.connection_state));
    }

    let analyzed = pump(&mut session, &mut events)
        .await
        .iter()
        .any(|trigger| matches!(trigger, AnalysisTrigger::Connected | AnalysisTrigger::Failed));
    if !analyzed {
        session.refresh_diagnostics(AnalysisTrigger::Manual).await?;
    }

    let snapshot = session.snapshot();
    session.reset().await;
    Ok(snapshot)
}

/// Applies queued engine events, polling statistics whenever one asks for it.
async fn pump(
    session: &mut SignalingSession,
    events: &mut mpsc::UnboundedReceiver<EngineEnvelope>,
) -> Vec<AnalysisTrigger> {
    let mut triggers = Vec::new();
    while let Ok(envelope) = events.try_recv() {
        let Some(trigger) = session.handle_event(envelope) else {
            continue;
        };
        if let Some(poll) = session.stats_poll(trigger) {
            let polled = poll.run().await;
            session.apply_stats(polled);
        }
        triggers.push(trigger);
    }
    triggers
}
