//! Representations of local or remote ICE candidates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// ICE candidate as reported by the connectivity engine or received from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub descriptor: String,
    pub kind: CandidateKind,
    pub protocol: TransportProtocol,
    pub address: String,
    pub port: u16,
    pub priority: u32,
    pub foundation: Option<String>,
}

/// Types of candidates available during ICE negotiations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CandidateKind {
    #[serde(rename = "host")]
    Host,
    #[serde(rename = "srflx", alias = "server-reflexive")]
    ServerReflexive,
    #[serde(rename = "prflx", alias = "peer-reflexive")]
    PeerReflexive,
    #[serde(rename = "relay", alias = "relayed")]
    Relay,
}

/// Transport protocol a candidate listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    #[default]
    #[serde(alias = "UDP")]
    Udp,
    #[serde(alias = "TCP")]
    Tcp,
}

/// Reasons a candidate descriptor cannot be understood.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CandidateParseError {
    #[error("candidate is missing the {0} field")]
    MissingField(&'static str),
    #[error("candidate has an invalid {field}: \"{value}\"")]
    InvalidField { field: &'static str, value: String },
    #[error("unknown candidate type \"{0}\"")]
    UnknownKind(String),
    #[error("unknown transport protocol \"{0}\"")]
    UnknownProtocol(String),
}

impl CandidateKind {
    /// Token used for this kind in candidate descriptors (`typ <token>`).
    pub fn as_str(self) -> &'static str {
        match self {
            CandidateKind::Host => "host",
            CandidateKind::ServerReflexive => "srflx",
            CandidateKind::PeerReflexive => "prflx",
            CandidateKind::Relay => "relay",
        }
    }

    fn type_preference(self) -> u32 {
        match self {
            CandidateKind::Host => 126,
            CandidateKind::PeerReflexive => 110,
            CandidateKind::ServerReflexive => 100,
            CandidateKind::Relay => 0,
        }
    }
}

impl fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CandidateKind {
    type Err = CandidateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "host" => Ok(CandidateKind::Host),
            "srflx" | "server-reflexive" => Ok(CandidateKind::ServerReflexive),
            "prflx" | "peer-reflexive" => Ok(CandidateKind::PeerReflexive),
            "relay" | "relayed" => Ok(CandidateKind::Relay),
            _ => Err(CandidateParseError::UnknownKind(s.to_string())),
        }
    }
}

impl TransportProtocol {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportProtocol::Udp => "udp",
            TransportProtocol::Tcp => "tcp",
        }
    }
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportProtocol {
    type Err = CandidateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "udp" => Ok(TransportProtocol::Udp),
            "tcp" => Ok(TransportProtocol::Tcp),
            _ => Err(CandidateParseError::UnknownProtocol(s.to_string())),
        }
    }
}

/// Calculate a candidate's priority according to the ICE specification.
pub fn calculate_priority(kind: CandidateKind, local_pref: u32) -> u32 {
    (1 << 24) * kind.type_preference() + (1 << 8) * (local_pref & 0xFFFF) + (256 - 1)
}

impl Candidate {
    /// Builds a candidate from its parts, synthesizing the descriptor and priority.
    pub fn new(
        kind: CandidateKind,
        protocol: TransportProtocol,
        address: impl Into<String>,
        port: u16,
        foundation: impl Into<String>,
    ) -> Self {
        let address = address.into();
        let foundation = foundation.into();
        let priority = calculate_priority(kind, 65535);
        let descriptor = format!(
            "candidate:{} 1 {} {} {} {} typ {}",
            foundation, protocol, priority, address, port, kind
        );

        Self {
            descriptor,
            kind,
            protocol,
            address,
            port,
            priority,
            foundation: Some(foundation),
        }
    }

    /// Identity used for deduplication: the foundation, or the full descriptor without one.
    pub fn key(&self) -> &str {
        match self.foundation.as_deref() {
            Some(foundation) if !foundation.is_empty() => foundation,
            _ => &self.descriptor,
        }
    }

    /// Transport address in `address:port` form.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.kind, self.protocol, self.endpoint())
    }
}

impl FromStr for Candidate {
    type Err = CandidateParseError;

    /// Parses `candidate:<foundation> <component> <protocol> <priority> <address> <port> typ <kind> ...`,
    /// with or without a leading `a=`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let descriptor = s.trim();
        let body = descriptor.strip_prefix("a=").unwrap_or(descriptor);
        let body = body
            .strip_prefix("candidate:")
            .ok_or(CandidateParseError::MissingField("candidate prefix"))?;

        let mut fields = body.split_whitespace();
        let foundation = fields
            .next()
            .ok_or(CandidateParseError::MissingField("foundation"))?;
        let _component = fields
            .next()
            .ok_or(CandidateParseError::MissingField("component"))?;
        let protocol: TransportProtocol = fields
            .next()
            .ok_or(CandidateParseError::MissingField("protocol"))?
            .parse()?;
        let priority = parse_number(fields.next(), "priority")?;
        let address = fields
            .next()
            .ok_or(CandidateParseError::MissingField("address"))?;
        let port = parse_number(fields.next(), "port")?;

        match fields.next() {
            Some("typ") => {}
            _ => return Err(CandidateParseError::MissingField("typ")),
        }
        let kind: CandidateKind = fields
            .next()
            .ok_or(CandidateParseError::MissingField("type"))?
            .parse()?;

        Ok(Self {
            descriptor: body_with_prefix(body),
            kind,
            protocol,
            address: address.to_string(),
            port,
            priority,
            foundation: Some(foundation.to_string()),
        })
    }
}

fn body_with_prefix(body: &str) -> String {
    format!("candidate:{}", body)
}

fn parse_number<T: FromStr>(
    field: Option<&str>,
    name: &'static str,
) -> Result<T, CandidateParseError> {
    let value = field.ok_or(CandidateParseError::MissingField(name))?;
    value.parse().map_err(|_| CandidateParseError::InvalidField {
        field: name,
        value: value.to_string(),
    })
}
