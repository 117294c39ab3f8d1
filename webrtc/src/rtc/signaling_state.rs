//! Offer/answer phases and the role that selects which branch a session walks.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Defines the role assumed by the peer within the signaling flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionRole {
    Initiator,
    Receiver,
}

impl SessionRole {
    /// The initiator is the controlling ICE agent.
    pub fn is_controlling(self) -> bool {
        matches!(self, Self::Initiator)
    }

    /// Phase a freshly initialized session of this role starts in.
    pub fn ready_state(self) -> SignalingState {
        match self {
            SessionRole::Initiator => SignalingState::InitiatorReady,
            SessionRole::Receiver => SignalingState::ReceiverReady,
        }
    }
}

impl fmt::Display for SessionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionRole::Initiator => f.write_str("initiator"),
            SessionRole::Receiver => f.write_str("receiver"),
        }
    }
}

/// Current phase of the negotiation state machine.
///
/// Initiator branch: `idle -> initiator-ready -> offer-created -> awaiting-answer -> answered`.
/// Receiver branch: `idle -> receiver-ready -> offer-received -> answer-created -> answered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalingState {
    #[default]
    Idle,
    InitiatorReady,
    OfferCreated,
    AwaitingAnswer,
    ReceiverReady,
    OfferReceived,
    AnswerCreated,
    Answered,
}

impl SignalingState {
    pub fn is_idle(self) -> bool {
        self == SignalingState::Idle
    }
}

impl fmt::Display for SignalingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignalingState::Idle => "idle",
            SignalingState::InitiatorReady => "initiator-ready",
            SignalingState::OfferCreated => "offer-created",
            SignalingState::AwaitingAnswer => "awaiting-answer",
            SignalingState::ReceiverReady => "receiver-ready",
            SignalingState::OfferReceived => "offer-received",
            SignalingState::AnswerCreated => "answer-created",
            SignalingState::Answered => "answered",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_state_per_role() {
        assert_eq!(SessionRole::Initiator.ready_state(), SignalingState::InitiatorReady);
        assert_eq!(SessionRole::Receiver.ready_state(), SignalingState::ReceiverReady);
        assert!(SessionRole::Initiator.is_controlling());
        assert!(!SessionRole::Receiver.is_controlling());
    }

    #[test]
    fn test_state_display_is_kebab_case() {
        assert_eq!(SignalingState::AwaitingAnswer.to_string(), "awaiting-answer");
        assert_eq!(SignalingState::default(), SignalingState::Idle);
    }
}
