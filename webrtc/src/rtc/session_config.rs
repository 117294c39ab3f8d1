use std::time::Duration;

/// Default wait after producing a local description before exposing it.
pub const DEFAULT_CANDIDATE_GRACE: Duration = Duration::from_millis(1000);

/// Label of the data channel the initiator opens.
pub const DEFAULT_DATA_CHANNEL_LABEL: &str = "diagnostics";

/// Tunables of a signaling session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long candidates may accumulate in the local description before
    /// it is handed to signaling.
    pub candidate_grace: Duration,
    pub data_channel_label: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            candidate_grace: DEFAULT_CANDIDATE_GRACE,
            data_channel_label: DEFAULT_DATA_CHANNEL_LABEL.to_string(),
        }
    }
}

impl SessionConfig {
    pub fn with_candidate_grace(mut self, grace: Duration) -> Self {
        self.candidate_grace = grace;
        self
    }

    pub fn with_data_channel_label(mut self, label: impl Into<String>) -> Self {
        self.data_channel_label = label.into();
        self
    }
}
