//! Offer/answer payloads exchanged verbatim between the peers.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::ice::{Candidate, CandidateParseError};

use super::session_error::{Result, SessionError};

/// Whether a description is an offer or an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescriptionKind {
    Offer,
    Answer,
}

impl fmt::Display for DescriptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptionKind::Offer => f.write_str("offer"),
            DescriptionKind::Answer => f.write_str("answer"),
        }
    }
}

/// Session description as handed over through signaling, `{"type": ..., "sdp": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: DescriptionKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn new(kind: DescriptionKind, sdp: impl Into<String>) -> Self {
        Self {
            kind,
            sdp: sdp.into(),
        }
    }

    /// Parses a remote payload and checks the minimal structure a peer must send.
    pub fn parse(text: &str, expected: DescriptionKind) -> Result<Self> {
        let description: SessionDescription = serde_json::from_str(text.trim())?;

        if description.kind != expected {
            return Err(SessionError::MalformedDescription(format!(
                "expected an {}, got an {}",
                expected, description.kind
            )));
        }

        if !description.sdp.trim_start().starts_with("v=") {
            return Err(SessionError::MalformedDescription(
                "sdp payload does not start with a version line".to_string(),
            ));
        }

        Ok(description)
    }

    /// Candidates embedded as `a=candidate:` lines.
    pub fn candidates(&self) -> std::result::Result<Vec<Candidate>, CandidateParseError> {
        self.sdp
            .lines()
            .map(str::trim)
            .filter(|line| line.starts_with("a=candidate:"))
            .map(|line| line.parse::<Candidate>())
            .collect()
    }

    /// Generates a data-channel description carrying the given credentials and candidates.
    pub fn compose(
        kind: DescriptionKind,
        ufrag: &str,
        pwd: &str,
        candidates: &[Candidate],
    ) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let mut sdp = String::new();
        sdp.push_str("v=0\r\n");
        sdp.push_str(&format!("o=- {} {} IN IP4 0.0.0.0\r\n", timestamp, timestamp));
        sdp.push_str("s=-\r\n");
        sdp.push_str("t=0 0\r\n");
        sdp.push_str("a=group:BUNDLE 0\r\n");
        sdp.push_str("m=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n");
        sdp.push_str("c=IN IP4 0.0.0.0\r\n");
        sdp.push_str(&format!("a=ice-ufrag:{}\r\n", ufrag));
        sdp.push_str(&format!("a=ice-pwd:{}\r\n", pwd));
        sdp.push_str("a=mid:0\r\n");

        for candidate in candidates {
            sdp.push_str(&format!("a={}\r\n", candidate.descriptor));
        }

        Self { kind, sdp }
    }

    /// Serialized form for copy/paste signaling.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ice::{CandidateKind, TransportProtocol};

    fn host(foundation: &str, port: u16) -> Candidate {
        Candidate::new(CandidateKind::Host, TransportProtocol::Udp, "192.168.1.10", port, foundation)
    }

    #[test]
    fn test_compose_then_parse_keeps_candidates() {
        let offer = SessionDescription::compose(
            DescriptionKind::Offer,
            "ufrag123",
            "pwd4567890",
            &[host("1", 5000), host("2", 5001)],
        );

        let parsed = SessionDescription::parse(&offer.to_json().unwrap(), DescriptionKind::Offer).unwrap();
        let candidates = parsed.candidates().unwrap();

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[1].port, 5001);
        assert!(parsed.sdp.contains("a=ice-ufrag:ufrag123"));
    }

    #[test]
    fn test_parse_rejects_wrong_kind() {
        let answer = SessionDescription::compose(DescriptionKind::Answer, "u", "p", &[]);
        let err = SessionDescription::parse(&answer.to_json().unwrap(), DescriptionKind::Offer)
            .unwrap_err();

        assert!(matches!(err, SessionError::MalformedDescription(_)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(SessionDescription::parse("not json", DescriptionKind::Offer).is_err());
        assert!(SessionDescription::parse(
            r#"{"type":"offer","sdp":"hello"}"#,
            DescriptionKind::Offer
        )
        .is_err());
    }

    #[test]
    fn test_malformed_embedded_candidate() {
        let description = SessionDescription::new(
            DescriptionKind::Offer,
            "v=0\r\na=candidate:1 1 udp 100 10.0.0.1\r\n",
        );

        assert!(description.candidates().is_err());
    }
}
