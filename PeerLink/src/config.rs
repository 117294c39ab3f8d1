use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use peer_link::rtc::{IceServer, SessionConfig, DEFAULT_DATA_CHANNEL_LABEL};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    pub log_level: String,
    /// Append logs to this file instead of stderr.
    pub log_file: Option<PathBuf>,
    pub candidate_grace_ms: u64,
    pub data_channel_label: String,
    pub ice_servers: Vec<IceServer>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: None,
            candidate_grace_ms: 1000,
            data_channel_label: DEFAULT_DATA_CHANNEL_LABEL.to_string(),
            ice_servers: vec![IceServer {
                urls: vec!["stun:stun.l.google.com:19302".to_string()],
                ..IceServer::default()
            }],
        }
    }
}

impl AppConfig {
    /// Reads a TOML configuration file; a missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(AppConfig::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::default()
            .with_candidate_grace(Duration::from_millis(self.candidate_grace_ms))
            .with_data_channel_label(self.data_channel_label.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let cfg = AppConfig::load("/nonexistent/peerlink.toml").unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.session_config().candidate_grace, Duration::from_millis(1000));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
candidate_grace_ms = 250

[[ice_servers]]
urls = ["turn:turn.example.org:3478"]
username = "alice"
credential = "secret"
"#
        )
        .unwrap();

        let cfg = AppConfig::load(file.path()).unwrap();

        assert_eq!(cfg.candidate_grace_ms, 250);
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.ice_servers.len(), 1);
        assert_eq!(cfg.ice_servers[0].username.as_deref(), Some("alice"));
        assert_eq!(cfg.session_config().data_channel_label, "diagnostics");
    }

    #[test]
    fn test_invalid_file_is_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "candidate_grace_ms = \"soon\"").unwrap();

        let err = AppConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
