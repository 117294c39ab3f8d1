//! Statistics-poll records returned by the connectivity engine.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::ice::{
    pair_priority, Candidate, CandidateKind, CandidatePair, CandidateSide, TransportProtocol,
};

/// One record of a statistics poll, tagged by its `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StatsRecord {
    CandidatePair(CandidatePair),
    LocalCandidate(CandidateStats),
    RemoteCandidate(CandidateStats),
    #[serde(other)]
    Other,
}

/// Candidate as described by a statistics report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateStats {
    pub id: String,
    /// `None` when the report omits the type or uses one this crate does not know.
    #[serde(default, deserialize_with = "kind_or_none")]
    pub candidate_type: Option<CandidateKind>,
    #[serde(default, alias = "ip")]
    pub address: Option<String>,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub protocol: TransportProtocol,
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub foundation: Option<String>,
}

fn kind_or_none<'de, D>(deserializer: D) -> Result<Option<CandidateKind>, D::Error>
where
    D: Deserializer<'de>,
{
    let name = Option::<String>::deserialize(deserializer)?;
    Ok(name.and_then(|name| name.parse().ok()))
}

impl CandidateStats {
    /// Candidate this record describes; `None` without a known candidate type.
    pub fn to_candidate(&self) -> Option<Candidate> {
        let kind = self.candidate_type?;
        let address = self.address.clone().unwrap_or_else(|| "unknown".to_string());
        let foundation = self.foundation.clone().unwrap_or_else(|| self.id.clone());

        let mut candidate = Candidate::new(kind, self.protocol, address, self.port, foundation);
        if self.priority != 0 {
            candidate.priority = self.priority;
        }
        Some(candidate)
    }
}

/// A poll result split into pairs and the candidates they reference.
#[derive(Debug, Clone, Default)]
pub struct StatsSnapshot {
    pub pairs: Vec<CandidatePair>,
    pub local_candidates: HashMap<String, Candidate>,
    pub remote_candidates: HashMap<String, Candidate>,
}

impl StatsSnapshot {
    /// Splits raw records; pairs without a reported priority get one derived
    /// from their candidates (`controlling` tells which side the local agent is).
    pub fn from_records(records: Vec<StatsRecord>, controlling: bool) -> Self {
        let mut snapshot = StatsSnapshot::default();

        for record in records {
            match record {
                StatsRecord::CandidatePair(pair) => snapshot.pairs.push(pair),
                StatsRecord::LocalCandidate(stats) => match stats.to_candidate() {
                    Some(candidate) => {
                        snapshot.local_candidates.insert(stats.id, candidate);
                    }
                    None => debug!("Skipping local candidate {} without a known type", stats.id),
                },
                StatsRecord::RemoteCandidate(stats) => match stats.to_candidate() {
                    Some(candidate) => {
                        snapshot.remote_candidates.insert(stats.id, candidate);
                    }
                    None => debug!("Skipping remote candidate {} without a known type", stats.id),
                },
                StatsRecord::Other => {}
            }
        }

        for pair in snapshot.pairs.iter_mut() {
            if pair.priority != 0 {
                continue;
            }
            let local = snapshot.local_candidates.get(&pair.local_candidate_id);
            let remote = snapshot.remote_candidates.get(&pair.remote_candidate_id);
            if let (Some(local), Some(remote)) = (local, remote) {
                pair.priority = if controlling {
                    pair_priority(local.priority, remote.priority)
                } else {
                    pair_priority(remote.priority, local.priority)
                };
            }
        }

        snapshot
    }

    /// Candidates with the side and statistics id they were reported under.
    pub fn candidates(&self) -> impl Iterator<Item = (CandidateSide, &String, &Candidate)> {
        let local = self
            .local_candidates
            .iter()
            .map(|(id, c)| (CandidateSide::Local, id, c));
        let remote = self
            .remote_candidates
            .iter()
            .map(|(id, c)| (CandidateSide::Remote, id, c));
        local.chain(remote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records() -> Vec<StatsRecord> {
        serde_json::from_value(json!([
            {
                "type": "local-candidate",
                "id": "L1",
                "candidateType": "host",
                "address": "192.168.1.2",
                "port": 50000,
                "protocol": "udp",
                "priority": 2130706431
            },
            {
                "type": "remote-candidate",
                "id": "R1",
                "candidateType": "srflx",
                "ip": "203.0.113.9",
                "port": 61000,
                "priority": 1694498815
            },
            {
                "type": "candidate-pair",
                "localCandidateId": "L1",
                "remoteCandidateId": "R1",
                "state": "failed",
                "requestsSent": 4
            },
            { "type": "transport", "id": "T1", "bytesSent": 10 }
        ]))
        .unwrap()
    }

    #[test]
    fn test_unknown_record_types_are_ignored() {
        let records = records();
        assert_eq!(records.len(), 4);
        assert_eq!(records[3], StatsRecord::Other);
    }

    #[test]
    fn test_snapshot_splits_records() {
        let snapshot = StatsSnapshot::from_records(records(), true);

        assert_eq!(snapshot.pairs.len(), 1);
        assert_eq!(snapshot.local_candidates["L1"].kind, CandidateKind::Host);
        assert_eq!(snapshot.remote_candidates["R1"].address, "203.0.113.9");
        assert_eq!(snapshot.candidates().count(), 2);
    }

    #[test]
    fn test_missing_pair_priority_is_derived() {
        let controlling = StatsSnapshot::from_records(records(), true);
        let controlled = StatsSnapshot::from_records(records(), false);

        assert_eq!(controlling.pairs[0].priority, pair_priority(2130706431, 1694498815));
        assert_eq!(controlled.pairs[0].priority, pair_priority(1694498815, 2130706431));
    }

    #[test]
    fn test_odd_records_do_not_void_the_poll() {
        let records: Vec<StatsRecord> = serde_json::from_value(json!([
            { "type": "local-candidate", "id": "L1", "address": "192.168.1.2", "port": 50000 },
            { "type": "remote-candidate", "id": "R1", "candidateType": "carrier-pigeon" },
            { "type": "candidate-pair", "localCandidateId": "L1", "remoteCandidateId": "R1",
              "state": "cancelled" },
            { "type": "candidate-pair", "localCandidateId": "L2", "remoteCandidateId": "R2",
              "state": "failed" }
        ]))
        .unwrap();

        let snapshot = StatsSnapshot::from_records(records, true);

        assert_eq!(snapshot.pairs.len(), 2);
        assert!(snapshot.local_candidates.is_empty());
        assert!(snapshot.remote_candidates.is_empty());
    }

    #[test]
    fn test_out_of_range_candidate_priorities_do_not_overflow() {
        let records: Vec<StatsRecord> = serde_json::from_value(json!([
            { "type": "local-candidate", "id": "L1", "candidateType": "host",
              "priority": 4294967295u32 },
            { "type": "remote-candidate", "id": "R1", "candidateType": "host",
              "priority": 4294967295u32 },
            { "type": "candidate-pair", "localCandidateId": "L1", "remoteCandidateId": "R1",
              "state": "failed" }
        ]))
        .unwrap();

        let snapshot = StatsSnapshot::from_records(records, false);

        assert_eq!(snapshot.pairs[0].priority, pair_priority(u32::MAX, u32::MAX));
        assert!(snapshot.pairs[0].priority > 0);
    }

    #[test]
    fn test_candidate_without_foundation_uses_stats_id() {
        let snapshot = StatsSnapshot::from_records(records(), true);
        assert_eq!(snapshot.local_candidates["L1"].key(), "L1");
    }
}
