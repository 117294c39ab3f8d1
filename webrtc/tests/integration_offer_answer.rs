use std::sync::Arc;
use std::time::Duration;

use peer_link::diagnostics::{EventCategory, StatsRecord, Verdict};
use peer_link::ice::{Candidate, CandidateKind, TransportProtocol};
use peer_link::rtc::{
    ConnectionPhase, DataChannel, EngineEvent, EngineScript, IcePhase, IceServer, ScriptedEngineFactory,
    SessionConfig, SessionDriver, SessionHandle, SessionRole, SessionSnapshot, SignalingState,
};

fn config() -> SessionConfig {
    SessionConfig::default().with_candidate_grace(Duration::from_millis(10))
}

fn candidate(kind: CandidateKind, address: &str, foundation: &str) -> Candidate {
    Candidate::new(kind, TransportProtocol::Udp, address, 5000, foundation)
}

fn records(json: &str) -> Vec<StatsRecord> {
    serde_json::from_str(json).unwrap()
}

async fn settle(handle: &SessionHandle, done: impl Fn(&SessionSnapshot) -> bool) -> SessionSnapshot {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let snapshot = handle.snapshot().await.unwrap();
            if done(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("session did not settle")
}

#[tokio::test]
async fn offer_answer_roundtrip_reaches_answered() {
    let initiator_factory = Arc::new(ScriptedEngineFactory::new(EngineScript {
        local_candidates: vec![
            candidate(CandidateKind::Host, "192.168.1.10", "1"),
            candidate(CandidateKind::ServerReflexive, "203.0.113.7", "2"),
        ],
        ..EngineScript::default()
    }));
    let receiver_factory = Arc::new(ScriptedEngineFactory::new(EngineScript {
        local_candidates: vec![candidate(CandidateKind::Host, "192.168.1.20", "9")],
        stats: records(
            r#"[
                {"type": "local-candidate", "id": "L9", "candidateType": "host", "address": "192.168.1.20", "port": 5000, "foundation": "9"},
                {"type": "remote-candidate", "id": "R1", "candidateType": "host", "ip": "192.168.1.10", "port": 5000},
                {"type": "candidate-pair", "localCandidateId": "L9", "remoteCandidateId": "R1", "state": "succeeded",
                 "nominated": true, "requestsSent": 3, "responsesReceived": 3, "currentRoundTripTime": 0.012},
                {"type": "transport", "id": "T1", "bytesSent": 100}
            ]"#,
        ),
        ..EngineScript::default()
    }));

    let initiator = SessionDriver::spawn(config(), initiator_factory.clone());
    let receiver = SessionDriver::spawn(config(), receiver_factory.clone());
    let stun = IceServer {
        urls: vec!["stun:stun.example.org:3478".to_string()],
        ..IceServer::default()
    };

    initiator
        .initialize(SessionRole::Initiator, vec![stun.clone()])
        .await
        .unwrap();
    receiver.initialize(SessionRole::Receiver, Vec::new()).await.unwrap();

    let offer = initiator.create_offer().await.unwrap();
    let answer = receiver.accept_offer(offer.to_json().unwrap()).await.unwrap();
    initiator.accept_answer(answer.to_json().unwrap()).await.unwrap();

    let initiator_view = initiator.snapshot().await.unwrap();
    assert_eq!(initiator_view.state, SignalingState::Answered);
    assert_eq!(initiator_view.remote_candidates, vec![(CandidateKind::Host, 1)]);
    let initiator_engine = initiator_factory.last_engine().await.unwrap();
    assert_eq!(initiator_engine.servers().await, vec![stun]);
    assert_eq!(initiator_engine.data_channels().await[0].label(), "diagnostics");

    let receiver_view = receiver.snapshot().await.unwrap();
    assert_eq!(receiver_view.state, SignalingState::AnswerCreated);
    assert_eq!(receiver_view.remote_candidates.len(), 2);

    let receiver_engine = receiver_factory.last_engine().await.unwrap();
    let delivered = receiver_engine.remote_description().await.unwrap();
    assert_eq!(delivered.candidates().unwrap().len(), 2);

    receiver_engine.emit(EngineEvent::ConnectionPhaseChanged(ConnectionPhase::Connected));
    let connected = settle(&receiver, |s| !s.verdicts.is_empty()).await;

    assert_eq!(connected.state, SignalingState::Answered);
    assert_eq!(connected.verdicts[0].outcome.verdict, Verdict::SuccessPrimary);
    assert_eq!(connected.verdicts[0].local, "host udp 192.168.1.20:5000");
    assert!(connected
        .events
        .iter()
        .any(|e| e.text.starts_with("Active pair:") && e.text.contains("RTT 12 ms")));
}

#[tokio::test]
async fn failed_connection_is_diagnosed() {
    let factory = Arc::new(ScriptedEngineFactory::new(EngineScript {
        local_candidates: vec![candidate(CandidateKind::Relay, "198.51.100.4", "r1")],
        stats: records(
            r#"[
                {"type": "local-candidate", "id": "L1", "candidateType": "relay", "address": "198.51.100.4", "port": 5000},
                {"type": "remote-candidate", "id": "R1", "candidateType": "host", "address": "10.1.1.1", "port": 6000},
                {"type": "candidate-pair", "localCandidateId": "L1", "remoteCandidateId": "R1", "state": "failed", "requestsSent": 4}
            ]"#,
        ),
        ..EngineScript::default()
    }));
    let handle = SessionDriver::spawn(config(), factory.clone());
    handle.initialize(SessionRole::Initiator, Vec::new()).await.unwrap();

    let engine = factory.last_engine().await.unwrap();
    engine.emit(EngineEvent::IcePhaseChanged(IcePhase::Failed));
    engine.emit(EngineEvent::ConnectionPhaseChanged(ConnectionPhase::Failed));

    let failed = settle(&handle, |s| !s.verdicts.is_empty()).await;
    let verdict = &failed.verdicts[0];

    assert_eq!(verdict.outcome.verdict, Verdict::Failed);
    assert_eq!(verdict.outcome.reason, "no response to outbound checks");
    assert!(verdict.outcome.suggestions.iter().any(|s| s.contains("TURN")));

    let headlines: Vec<_> = failed
        .events
        .iter()
        .filter(|e| e.text.starts_with("Connection failed"))
        .collect();
    assert_eq!(headlines.len(), 1);
    assert_eq!(headlines[0].category, EventCategory::Error);
}

#[tokio::test]
async fn gathering_summary_is_reported_once() {
    let factory = Arc::new(ScriptedEngineFactory::new(EngineScript {
        local_candidates: vec![
            candidate(CandidateKind::Host, "10.0.0.1", "1"),
            candidate(CandidateKind::Host, "10.0.0.2", "2"),
            candidate(CandidateKind::Host, "10.0.0.3", "3"),
            candidate(CandidateKind::Relay, "198.51.100.4", "4"),
        ],
        ..EngineScript::default()
    }));
    let handle = SessionDriver::spawn(config(), factory.clone());
    handle.initialize(SessionRole::Receiver, Vec::new()).await.unwrap();

    factory.last_engine().await.unwrap().gather();

    let gathered = settle(&handle, |s| {
        s.events.iter().any(|e| e.text.starts_with("ICE gathering complete"))
    })
    .await;
    assert_eq!(
        gathered.local_candidates,
        vec![(CandidateKind::Host, 3), (CandidateKind::Relay, 1)]
    );

    handle.refresh_diagnostics().await.unwrap();
    let after = handle.snapshot().await.unwrap();
    let summaries = after
        .events
        .iter()
        .filter(|e| e.text == "ICE gathering complete: 4 local candidates (host: 3, relay: 1)")
        .count();
    assert_eq!(summaries, 1);
}

#[tokio::test]
async fn handle_reports_errors_without_changing_state() {
    let factory = Arc::new(ScriptedEngineFactory::new(EngineScript::default()));
    let handle = SessionDriver::spawn(config(), factory);

    assert!(handle.create_offer().await.is_err());
    handle.initialize(SessionRole::Initiator, Vec::new()).await.unwrap();
    assert!(handle.accept_answer(r#"{"type":"offer","sdp":"v=0"}"#).await.is_err());
    assert!(handle.add_remote_candidate("candidate:1 1 udp").await.is_err());

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, SignalingState::InitiatorReady);
    assert_eq!(
        snapshot
            .events
            .iter()
            .filter(|e| e.category == EventCategory::Error)
            .count(),
        3
    );
}
