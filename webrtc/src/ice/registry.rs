//! Deduplicated store of the candidates seen during one negotiation attempt.

use std::collections::HashMap;

use super::candidate::{Candidate, CandidateKind};

/// Which peer a candidate belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CandidateSide {
    Local,
    Remote,
}

/// Local and remote candidates keyed by foundation.
///
/// Candidates are never removed one by one; the whole registry is cleared
/// when the session resets.
#[derive(Debug, Default)]
pub struct CandidateRegistry {
    local: Vec<Candidate>,
    remote: Vec<Candidate>,
    stats_index: HashMap<(CandidateSide, String), Candidate>,
}

impl CandidateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a candidate, overwriting any previous one with the same key.
    ///
    /// Returns `true` when the key was not known yet.
    pub fn record(&mut self, candidate: Candidate, side: CandidateSide) -> bool {
        let set = self.side_mut(side);
        match set.iter_mut().find(|known| known.key() == candidate.key()) {
            Some(known) => {
                *known = candidate;
                false
            }
            None => {
                set.push(candidate);
                true
            }
        }
    }

    /// Candidate counts grouped by kind, most frequent first, ties by kind name.
    pub fn summary_by_type(&self, side: CandidateSide) -> Vec<(CandidateKind, usize)> {
        let mut counts: HashMap<CandidateKind, usize> = HashMap::new();
        for candidate in self.side(side) {
            *counts.entry(candidate.kind).or_insert(0) += 1;
        }

        let mut summary: Vec<_> = counts.into_iter().collect();
        summary.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));
        summary
    }

    /// Associates a statistics-report candidate id with the candidate it describes.
    ///
    /// These entries only serve pair lookups and are not part of the summaries.
    pub fn attach_stats_id(&mut self, side: CandidateSide, id: impl Into<String>, candidate: Candidate) {
        self.stats_index.insert((side, id.into()), candidate);
    }

    /// Resolves a statistics-report candidate id.
    pub fn lookup(&self, side: CandidateSide, id: &str) -> Option<&Candidate> {
        self.stats_index.get(&(side, id.to_string()))
    }

    pub fn get(&self, side: CandidateSide, key: &str) -> Option<&Candidate> {
        self.side(side).iter().find(|candidate| candidate.key() == key)
    }

    /// Candidates of one side in first-seen order.
    pub fn side(&self, side: CandidateSide) -> &[Candidate] {
        match side {
            CandidateSide::Local => &self.local,
            CandidateSide::Remote => &self.remote,
        }
    }

    fn side_mut(&mut self, side: CandidateSide) -> &mut Vec<Candidate> {
        match side {
            CandidateSide::Local => &mut self.local,
            CandidateSide::Remote => &mut self.remote,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty() && self.remote.is_empty() && self.stats_index.is_empty()
    }

    /// Empties both local and remote sets.
    pub fn clear(&mut self) {
        self.local.clear();
        self.remote.clear();
        self.stats_index.clear();
    }
}
