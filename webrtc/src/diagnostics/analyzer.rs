//! Turns pair telemetry plus candidate lookups into causal verdicts.
//!
//! Everything here is a pure function of its inputs: the analyzer keeps no
//! state between invocations, and missing statistics only reduce the
//! granularity of the explanation.

use crate::ice::{
    Candidate, CandidateKind, CandidatePair, CandidatePairState, CandidatePairTracker,
    CandidateRegistry, CandidateSide,
};

use super::outcome::{ConnectionOutcome, PairVerdict, Verdict};

pub const REASON_NOT_SELECTED: &str = "not selected for testing";
pub const REASON_NO_RESPONSE: &str = "no response to outbound checks";
pub const REASON_ASYMMETRIC: &str = "asymmetric path: requests arrive but responses do not return";
pub const REASON_CANNOT_RESPOND: &str = "unable to send responses back";
pub const REASON_TIMEOUT: &str = "timeout or authentication failure";
pub const REASON_OMITTED: &str = "pair omitted from detailed report";

/// Gap between last sent and last received packet above which a path is flagged unstable.
pub const INSTABILITY_GAP_MS: f64 = 5000.0;

/// Succeeded pairs split by nomination, each group highest priority first.
#[derive(Debug, Default)]
pub struct SuccessfulPairs<'a> {
    pub primary: Vec<&'a CandidatePair>,
    pub backup: Vec<&'a CandidatePair>,
}

/// Pair counts per check state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PairSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub in_progress: usize,
    pub waiting: usize,
}

impl PairSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.in_progress + self.waiting
    }
}

/// Partitions succeeded pairs into nominated (primary) and non-nominated (backup).
pub fn classify_successful(pairs: &[CandidatePair]) -> SuccessfulPairs<'_> {
    let (mut primary, mut backup): (Vec<_>, Vec<_>) = pairs
        .iter()
        .filter(|pair| pair.state == CandidatePairState::Succeeded)
        .partition(|pair| pair.nominated);

    primary.sort_by(|a, b| b.priority.cmp(&a.priority));
    backup.sort_by(|a, b| b.priority.cmp(&a.priority));

    SuccessfulPairs { primary, backup }
}

/// Counts pairs per state.
pub fn summarize(pairs: &[CandidatePair]) -> PairSummary {
    let mut summary = PairSummary::default();
    for pair in pairs {
        match pair.state {
            CandidatePairState::Succeeded => summary.succeeded += 1,
            CandidatePairState::Failed => summary.failed += 1,
            CandidatePairState::InProgress => summary.in_progress += 1,
            CandidatePairState::Waiting => summary.waiting += 1,
        }
    }
    summary
}

/// Explains why a pair failed. The first matching rule wins.
pub fn diagnose_failure(
    pair: &CandidatePair,
    local: &Candidate,
    remote: &Candidate,
) -> ConnectionOutcome {
    let sent = pair.requests_sent;
    let received = pair.requests_received;
    let responses_sent = pair.responses_sent;
    let responses_received = pair.responses_received;

    let mut outcome = if sent == 0 && received == 0 {
        ConnectionOutcome::new(
            Verdict::Failed,
            REASON_NOT_SELECTED,
            "No connectivity checks were exchanged on this pair; it was deprioritized or gathering ended before it was scheduled",
        )
        .with_suggestion("Expected when a higher-priority pair was tested first")
    } else if sent > 0 && received == 0 {
        ConnectionOutcome::new(
            Verdict::Failed,
            REASON_NO_RESPONSE,
            format!(
                "Sent {} requests, received 0 requests and {} responses",
                sent, responses_received
            ),
        )
        .with_suggestion(no_response_hint(local.kind, remote.kind))
    } else if sent > 0 && received > 0 && responses_received == 0 {
        ConnectionOutcome::new(
            Verdict::Failed,
            REASON_ASYMMETRIC,
            format!(
                "Sent {} requests, received {} requests, but no responses returned",
                sent, received
            ),
        )
        .with_suggestion("Check the return route from the peer to this endpoint")
        .with_suggestion("Check the peer's own outbound connectivity")
    } else if responses_received > 0 && responses_sent == 0 {
        ConnectionOutcome::new(
            Verdict::Failed,
            REASON_CANNOT_RESPOND,
            format!(
                "Received {} responses but sent 0 responses back",
                responses_received
            ),
        )
        .with_suggestion("Local egress looks blocked; check outbound firewall rules")
    } else {
        ConnectionOutcome::new(
            Verdict::Failed,
            REASON_TIMEOUT,
            format!(
                "requestsSent={}, requestsReceived={}, responsesSent={}, responsesReceived={}",
                sent, received, responses_sent, responses_received
            ),
        )
        .with_suggestion("Verify both sides applied the same ICE credentials (ufrag/pwd)")
    };

    if local.protocol != remote.protocol {
        outcome.suggestions.push(format!(
            "Transport protocol mismatch: local uses {}, remote uses {}",
            local.protocol, remote.protocol
        ));
    }

    outcome
        .suggestions
        .push(topology_insight(local.kind, remote.kind).to_string());

    let checked = !(sent == 0 && received == 0);
    if let (true, Some(gap)) = (checked, pair.packet_gap_ms()) {
        if gap > INSTABILITY_GAP_MS {
            outcome.details.push_str(&format!(
                ". Unstable path: last packet sent and last packet received are {}s apart",
                (gap / 1000.0).floor() as u64
            ));
        }
    }

    outcome
}

fn no_response_hint(local: CandidateKind, remote: CandidateKind) -> &'static str {
    let either = |kind: CandidateKind| local == kind || remote == kind;

    if either(CandidateKind::Relay) {
        "The TURN relay server may be unreachable or rejected the relay credentials"
    } else if either(CandidateKind::ServerReflexive) {
        "A NAT or firewall may be blocking inbound checks, or the server-reflexive address is incorrect"
    } else if local == CandidateKind::Host && remote == CandidateKind::Host {
        "The peers are not mutually routable (different networks or firewall policy)"
    } else {
        "The peer never answered; it may be offline or filtering checks"
    }
}

/// Insight derived only from the kinds on both ends of a pair.
pub fn topology_insight(local: CandidateKind, remote: CandidateKind) -> &'static str {
    use CandidateKind::*;

    match (local, remote) {
        (Relay, _) | (_, Relay) => "Topology: relay path should work unless the server is misconfigured",
        (PeerReflexive, _) | (_, PeerReflexive) => {
            "Topology: path found during checks, not pre-advertised"
        }
        (Host, Host) => "Topology: host to host needs a shared network or public IPs",
        (Host, ServerReflexive) | (ServerReflexive, Host) => {
            "Topology: remote behind NAT may reject inbound checks"
        }
        (ServerReflexive, ServerReflexive) => {
            "Topology: may require a relay if the NAT types are incompatible"
        }
    }
}

/// Verdict for a failed pair whose candidates could not be resolved.
pub fn omitted_outcome() -> ConnectionOutcome {
    ConnectionOutcome::new(
        Verdict::Failed,
        REASON_OMITTED,
        "Candidate details for this pair were not included in the statistics",
    )
}

fn success_outcome(pair: &CandidatePair, primary: bool) -> ConnectionOutcome {
    let mut details = Vec::new();

    if let Some(rtt) = pair.current_round_trip_time {
        details.push(format!("RTT {:.0} ms", rtt * 1000.0));
    }
    if let (Some(total), true) = (pair.total_round_trip_time, pair.responses_received > 0) {
        details.push(format!(
            "average RTT {:.0} ms",
            total * 1000.0 / pair.responses_received as f64
        ));
    }
    if let Some(bitrate) = pair.available_outgoing_bitrate {
        details.push(format!("outgoing bitrate {:.0} kbps", bitrate / 1000.0));
    }

    let details = if details.is_empty() {
        "No round-trip statistics reported".to_string()
    } else {
        details.join(", ")
    };

    if primary {
        ConnectionOutcome::new(Verdict::SuccessPrimary, "nominated pair carrying traffic", details)
    } else {
        ConnectionOutcome::new(
            Verdict::SuccessBackup,
            "succeeded but not nominated, available as backup",
            details,
        )
    }
}

fn pending_outcome(pair: &CandidatePair) -> ConnectionOutcome {
    let reason = match pair.state {
        CandidatePairState::InProgress => "connectivity checks in progress",
        _ => "waiting to be tested",
    };
    ConnectionOutcome::new(
        Verdict::Pending,
        reason,
        format!("{} requests sent so far", pair.requests_sent),
    )
}

fn describe(candidate: Option<&Candidate>) -> String {
    candidate
        .map(Candidate::to_string)
        .unwrap_or_else(|| "unknown candidate".to_string())
}

fn verdict_for(
    pair: &CandidatePair,
    registry: &CandidateRegistry,
    outcome: impl FnOnce(&Candidate, &Candidate) -> ConnectionOutcome,
    fallback: impl FnOnce() -> ConnectionOutcome,
) -> PairVerdict {
    let local = registry.lookup(CandidateSide::Local, &pair.local_candidate_id);
    let remote = registry.lookup(CandidateSide::Remote, &pair.remote_candidate_id);

    let outcome = match (local, remote) {
        (Some(local), Some(remote)) => outcome(local, remote),
        _ => fallback(),
    };

    PairVerdict {
        local: describe(local),
        remote: describe(remote),
        state: pair.state,
        priority: pair.priority,
        outcome,
    }
}

/// Full verdict set in report order: primary, backup, failed, then pending pairs.
pub fn analyze(tracker: &CandidatePairTracker, registry: &CandidateRegistry) -> Vec<PairVerdict> {
    let successful = classify_successful(tracker.pairs());
    let mut verdicts = Vec::with_capacity(tracker.len());

    for pair in successful.primary {
        verdicts.push(verdict_for(
            pair,
            registry,
            |_, _| success_outcome(pair, true),
            || success_outcome(pair, true),
        ));
    }
    for pair in successful.backup {
        verdicts.push(verdict_for(
            pair,
            registry,
            |_, _| success_outcome(pair, false),
            || success_outcome(pair, false),
        ));
    }
    for pair in tracker.by_state(CandidatePairState::Failed) {
        verdicts.push(verdict_for(
            pair,
            registry,
            |local, remote| diagnose_failure(pair, local, remote),
            omitted_outcome,
        ));
    }
    for state in [CandidatePairState::InProgress, CandidatePairState::Waiting] {
        for pair in tracker.by_state(state) {
            verdicts.push(verdict_for(
                pair,
                registry,
                |_, _| pending_outcome(pair),
                || pending_outcome(pair),
            ));
        }
    }

    verdicts
}
