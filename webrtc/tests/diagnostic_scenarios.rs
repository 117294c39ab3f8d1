use std::sync::Arc;

use peer_link::diagnostics::{classify_successful, diagnose_failure};
use peer_link::ice::{
    Candidate, CandidateKind, CandidatePair, CandidatePairState, CandidateRegistry,
    CandidateSide, TransportProtocol,
};
use peer_link::rtc::{
    EngineScript, ScriptedEngineFactory, SessionConfig, SessionError, SessionRole,
    SignalingSession, SignalingState,
};

fn candidate(kind: CandidateKind, foundation: &str) -> Candidate {
    Candidate::new(kind, TransportProtocol::Udp, "10.0.0.1", 5000, foundation)
}

fn failed(sent: u64, received: u64, responses_received: u64) -> CandidatePair {
    CandidatePair {
        state: CandidatePairState::Failed,
        requests_sent: sent,
        requests_received: received,
        responses_received,
        ..CandidatePair::new("L1", "R1")
    }
}

fn session() -> SignalingSession {
    let factory = Arc::new(ScriptedEngineFactory::new(EngineScript::default()));
    let (session, _events) = SignalingSession::with_event_channel(SessionConfig::default(), factory);
    session
}

#[test]
fn relay_without_responses_suggests_turn_check() {
    let outcome = diagnose_failure(
        &failed(4, 0, 0),
        &candidate(CandidateKind::Relay, "1"),
        &candidate(CandidateKind::Host, "2"),
    );

    assert_eq!(outcome.reason, "no response to outbound checks");
    assert!(outcome.suggestions.iter().any(|s| s.contains("TURN")));
}

#[test]
fn asymmetric_path_reports_counters() {
    let outcome = diagnose_failure(
        &failed(2, 2, 0),
        &candidate(CandidateKind::Host, "1"),
        &candidate(CandidateKind::Host, "2"),
    );

    assert!(outcome.reason.starts_with("asymmetric path"));
    assert!(outcome
        .details
        .contains("Sent 2 requests, received 2 requests, but no responses returned"));
}

#[test]
fn nominated_pair_is_primary() {
    let backup = CandidatePair {
        state: CandidatePairState::Succeeded,
        priority: 300,
        ..CandidatePair::new("L2", "R2")
    };
    let primary = CandidatePair {
        state: CandidatePairState::Succeeded,
        nominated: true,
        priority: 500,
        ..CandidatePair::new("L1", "R1")
    };
    let pairs = vec![backup, primary];

    let successful = classify_successful(&pairs);

    assert_eq!(successful.primary.len(), 1);
    assert_eq!(successful.primary[0].priority, 500);
    assert_eq!(successful.backup.len(), 1);
    assert_eq!(successful.backup[0].priority, 300);
}

#[test]
fn summary_counts_most_frequent_kind_first() {
    let mut registry = CandidateRegistry::new();
    registry.record(candidate(CandidateKind::Relay, "r"), CandidateSide::Local);
    for foundation in ["a", "b", "c"] {
        registry.record(candidate(CandidateKind::Host, foundation), CandidateSide::Local);
    }

    assert_eq!(
        registry.summary_by_type(CandidateSide::Local),
        vec![(CandidateKind::Host, 3), (CandidateKind::Relay, 1)]
    );
}

#[tokio::test]
async fn offer_from_receiver_is_rejected() {
    let mut session = session();
    session.initialize(SessionRole::Receiver, &[]).await.unwrap();

    let err = session.create_offer().await.unwrap_err();

    assert!(matches!(err, SessionError::InvalidState { .. }));
    assert_eq!(session.state(), SignalingState::ReceiverReady);
}

#[test]
fn six_second_gap_is_flagged_unstable() {
    let mut pair = failed(3, 1, 0);
    pair.last_packet_sent_timestamp = Some(16_000.0);
    pair.last_packet_received_timestamp = Some(10_000.0);

    let outcome = diagnose_failure(
        &pair,
        &candidate(CandidateKind::Host, "1"),
        &candidate(CandidateKind::Host, "2"),
    );

    assert!(outcome.details.contains("6s"));
}

#[test]
fn unchecked_pair_short_circuits() {
    let mut pair = failed(0, 0, 0);
    pair.responses_sent = 5;
    pair.responses_received = 5;

    let outcome = diagnose_failure(
        &pair,
        &candidate(CandidateKind::Relay, "1"),
        &candidate(CandidateKind::ServerReflexive, "2"),
    );

    assert_eq!(outcome.reason, "not selected for testing");
}

#[test]
fn diagnosis_is_deterministic() {
    let pair = failed(7, 3, 1);
    let local = candidate(CandidateKind::ServerReflexive, "1");
    let remote = candidate(CandidateKind::PeerReflexive, "2");

    assert_eq!(
        diagnose_failure(&pair, &local, &remote),
        diagnose_failure(&pair, &local, &remote)
    );
}

#[tokio::test]
async fn reset_then_initialize_leaves_no_residue() {
    let mut session = session();
    session.initialize(SessionRole::Initiator, &[]).await.unwrap();
    session.on_candidate_discovered(Some(candidate(CandidateKind::Host, "1")));
    session
        .on_remote_candidate_received("candidate:9 1 udp 2130706431 10.0.0.9 6000 typ host")
        .await
        .unwrap();

    session.reset().await;
    session.initialize(SessionRole::Receiver, &[]).await.unwrap();

    assert_eq!(session.state(), SignalingState::ReceiverReady);
    assert!(session.registry().is_empty());
    assert!(session.tracker().is_empty());
    assert!(session.verdicts().is_empty());
}

#[tokio::test]
async fn registry_content_ignores_interleaving() {
    let candidates = [
        candidate(CandidateKind::Host, "1"),
        candidate(CandidateKind::ServerReflexive, "2"),
        candidate(CandidateKind::Host, "1"),
        candidate(CandidateKind::Relay, "3"),
    ];

    let mut early = session();
    early.initialize(SessionRole::Initiator, &[]).await.unwrap();
    for c in &candidates {
        early.on_candidate_discovered(Some(c.clone()));
    }
    early.create_offer().await.unwrap();

    let mut late = session();
    late.initialize(SessionRole::Initiator, &[]).await.unwrap();
    late.on_candidate_discovered(Some(candidates[3].clone()));
    late.create_offer().await.unwrap();
    for c in candidates.iter().take(3).rev() {
        late.on_candidate_discovered(Some(c.clone()));
    }

    let keys = |s: &SignalingSession| {
        let mut keys: Vec<String> = s
            .registry()
            .side(CandidateSide::Local)
            .iter()
            .map(|c| c.key().to_string())
            .collect();
        keys.sort();
        keys
    };
    assert_eq!(keys(&early), vec!["1", "2", "3"]);
    assert_eq!(keys(&early), keys(&late));
    assert_eq!(
        early.registry().summary_by_type(CandidateSide::Local),
        late.registry().summary_by_type(CandidateSide::Local)
    );
}
