//! ICE pairs that combine local and remote candidates, with their check telemetry.

use std::fmt;

use serde::de::value::Error as ValueError;
use serde::de::IntoDeserializer;
use serde::{Deserialize, Deserializer, Serialize};

/// Latest connectivity-check statistics for one (local, remote) candidate combination.
///
/// Counters are cumulative values reported by the connectivity engine. Every
/// numeric field is optional in the report and defaults to zero.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CandidatePair {
    pub local_candidate_id: String,
    pub remote_candidate_id: String,
    #[serde(deserialize_with = "state_or_waiting")]
    pub state: CandidatePairState,
    pub requests_sent: u64,
    pub requests_received: u64,
    pub responses_sent: u64,
    pub responses_received: u64,
    /// Milliseconds, engine clock.
    pub last_packet_sent_timestamp: Option<f64>,
    /// Milliseconds, engine clock.
    pub last_packet_received_timestamp: Option<f64>,
    pub nominated: bool,
    /// Seconds.
    pub current_round_trip_time: Option<f64>,
    /// Seconds, summed over all responses.
    pub total_round_trip_time: Option<f64>,
    /// Bits per second.
    pub available_outgoing_bitrate: Option<f64>,
    pub priority: u64,
}

/// Possible states during the life cycle of an ICE pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CandidatePairState {
    #[default]
    #[serde(alias = "frozen")]
    Waiting,
    InProgress,
    Succeeded,
    Failed,
}

impl CandidatePairState {
    /// Position in the `waiting -> in-progress -> {succeeded|failed}` progression.
    pub fn rank(self) -> u8 {
        match self {
            CandidatePairState::Waiting => 0,
            CandidatePairState::InProgress => 1,
            CandidatePairState::Succeeded | CandidatePairState::Failed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }
}

/// States this crate does not model (`cancelled`, vendor extensions) read as waiting.
fn state_or_waiting<'de, D>(deserializer: D) -> Result<CandidatePairState, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(name) = Option::<String>::deserialize(deserializer)? else {
        return Ok(CandidatePairState::default());
    };
    let parsed: Result<CandidatePairState, ValueError> =
        CandidatePairState::deserialize(name.as_str().into_deserializer());
    Ok(parsed.unwrap_or_default())
}

impl fmt::Display for CandidatePairState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CandidatePairState::Waiting => "waiting",
            CandidatePairState::InProgress => "in-progress",
            CandidatePairState::Succeeded => "succeeded",
            CandidatePairState::Failed => "failed",
        };
        f.write_str(name)
    }
}

impl CandidatePair {
    pub fn new(local_id: impl Into<String>, remote_id: impl Into<String>) -> Self {
        Self {
            local_candidate_id: local_id.into(),
            remote_candidate_id: remote_id.into(),
            ..Self::default()
        }
    }

    pub fn matches(&self, local_id: &str, remote_id: &str) -> bool {
        self.local_candidate_id == local_id && self.remote_candidate_id == remote_id
    }

    /// Gap between the last packet sent and the last packet received, when both are known.
    pub fn packet_gap_ms(&self) -> Option<f64> {
        match (self.last_packet_sent_timestamp, self.last_packet_received_timestamp) {
            (Some(sent), Some(received)) => Some((sent - received).abs()),
            _ => None,
        }
    }
}

/// Highest candidate priority a well-behaved agent announces (2^31 - 1).
const MAX_CANDIDATE_PRIORITY: u32 = (1 << 31) - 1;

/// Calculate the combined priority of a candidate pair.
///
/// `controlling` is the priority of the candidate offered by the controlling
/// agent (the initiator), `controlled` the other one. Out-of-range priorities
/// are clamped to 2^31 - 1.
pub fn pair_priority(controlling: u32, controlled: u32) -> u64 {
    let g = controlling.min(MAX_CANDIDATE_PRIORITY) as u64;
    let d = controlled.min(MAX_CANDIDATE_PRIORITY) as u64;

    let min_priority = g.min(d);
    let max_priority = g.max(d);

    (1u64 << 32) * min_priority + 2 * max_priority + if g > d { 1 } else { 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_defaults_missing_counters() {
        let pair: CandidatePair = serde_json::from_value(serde_json::json!({
            "localCandidateId": "L1",
            "remoteCandidateId": "R1",
            "state": "in-progress",
            "requestsSent": 3
        }))
        .unwrap();

        assert_eq!(pair.state, CandidatePairState::InProgress);
        assert_eq!(pair.requests_sent, 3);
        assert_eq!(pair.requests_received, 0);
        assert_eq!(pair.responses_received, 0);
        assert_eq!(pair.last_packet_sent_timestamp, None);
        assert!(!pair.nominated);
    }

    #[test]
    fn test_frozen_state_is_waiting() {
        let state: CandidatePairState = serde_json::from_str("\"frozen\"").unwrap();
        assert_eq!(state, CandidatePairState::Waiting);
    }

    #[test]
    fn test_unknown_pair_state_reads_as_waiting() {
        let pair: CandidatePair = serde_json::from_value(serde_json::json!({
            "localCandidateId": "L1",
            "remoteCandidateId": "R1",
            "state": "cancelled"
        }))
        .unwrap();

        assert_eq!(pair.state, CandidatePairState::Waiting);
    }

    #[test]
    fn test_packet_gap_requires_both_timestamps() {
        let mut pair = CandidatePair::new("L1", "R1");
        pair.last_packet_sent_timestamp = Some(10_000.0);
        assert_eq!(pair.packet_gap_ms(), None);

        pair.last_packet_received_timestamp = Some(4_000.0);
        assert_eq!(pair.packet_gap_ms(), Some(6_000.0));
    }

    #[test]
    fn test_pair_priority_formula() {
        let priority = pair_priority(200, 100);
        assert_eq!(priority, (1u64 << 32) * 100 + 2 * 200 + 1);
        assert!(pair_priority(100, 200) < priority);
    }

    #[test]
    fn test_pair_priority_clamps_out_of_range_candidates() {
        let max = MAX_CANDIDATE_PRIORITY as u64;

        assert_eq!(pair_priority(u32::MAX, u32::MAX), (1u64 << 32) * max + 2 * max);
        assert_eq!(pair_priority(u32::MAX, 100), pair_priority(MAX_CANDIDATE_PRIORITY, 100));
    }

    #[test]
    fn test_state_rank_is_monotonic() {
        assert!(CandidatePairState::Waiting.rank() < CandidatePairState::InProgress.rank());
        assert!(CandidatePairState::InProgress.rank() < CandidatePairState::Succeeded.rank());
        assert!(CandidatePairState::Failed.is_terminal());
        assert!(!CandidatePairState::InProgress.is_terminal());
    }
}
