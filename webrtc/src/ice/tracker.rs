//! Latest connectivity-check telemetry per candidate pair.

use tracing::debug;

use super::pair::{CandidatePair, CandidatePairState};

/// Holds the most recent statistics snapshot, one entry per pair.
#[derive(Debug, Default)]
pub struct CandidatePairTracker {
    pairs: Vec<CandidatePair>,
}

impl CandidatePairTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the pair set with a fresh statistics poll.
    ///
    /// A pair may not move backwards in its check progression within one
    /// attempt; a regressing record keeps the state it already reached.
    pub fn ingest_snapshot(&mut self, pairs: Vec<CandidatePair>) {
        let mut fresh = pairs;

        for pair in fresh.iter_mut() {
            let previous = self
                .find(&pair.local_candidate_id, &pair.remote_candidate_id)
                .map(|known| known.state);

            if let Some(previous) = previous {
                if pair.state.rank() < previous.rank() {
                    debug!(
                        "Pair {} -> {} reported {} after {}, keeping {}",
                        pair.local_candidate_id,
                        pair.remote_candidate_id,
                        pair.state,
                        previous,
                        previous
                    );
                    pair.state = previous;
                }
            }
        }

        self.pairs = fresh;
    }

    /// Pairs in the given state, highest priority first.
    pub fn by_state(&self, state: CandidatePairState) -> Vec<&CandidatePair> {
        let mut matching: Vec<_> = self.pairs.iter().filter(|pair| pair.state == state).collect();
        matching.sort_by(|a, b| b.priority.cmp(&a.priority));
        matching
    }

    /// Point lookup; `None` when the engine has not tested that combination.
    pub fn find(&self, local_id: &str, remote_id: &str) -> Option<&CandidatePair> {
        self.pairs.iter().find(|pair| pair.matches(local_id, remote_id))
    }

    pub fn pairs(&self) -> &[CandidatePair] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn clear(&mut self) {
        self.pairs.clear();
    }
}
