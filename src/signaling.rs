//! Signaling wire protocol and channel contract
//!
//! One JSON object per message, tagged by `type`. The channel guarantees
//! FIFO delivery per logical connection to the hub, but no ordering across
//! messages that originate from different remote participants; the
//! orchestrator's buffering rules absorb that reordering.

use crate::identity::ParticipantIdentity;
use crate::types::{CallKind, SessionId, SignalPayload};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Signaling channel errors
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The persistent connection to the hub is gone
    #[error("signaling channel closed")]
    Closed,

    /// The transport rejected the message
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Message-oriented signaling protocol between the local party and the hub
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
#[serde(bound = "I: ParticipantIdentity")]
pub enum SignalingMessage<I: ParticipantIdentity> {
    /// Start a new call naming its target participants (local -> hub)
    #[serde(rename_all = "camelCase")]
    StartCall {
        /// Session assigned by the initiator
        session_id: SessionId,
        /// Audio or video
        kind: CallKind,
        /// Invited participants
        target_identities: Vec<I>,
    },

    /// A hub-pushed invitation (hub -> local)
    #[serde(rename_all = "camelCase")]
    IncomingCall {
        /// Session the caller created
        session_id: SessionId,
        /// Audio or video
        kind: CallKind,
        /// Who is calling
        caller_identity: I,
        /// Caller's display name
        caller_name: String,
    },

    /// Join an existing call (local -> hub)
    #[serde(rename_all = "camelCase")]
    JoinCall {
        /// Session being joined
        session_id: SessionId,
        /// Joining party
        identity: I,
        /// Joining party's display name
        display_name: String,
    },

    /// Accept an invitation (local -> hub, hub -> local)
    #[serde(rename_all = "camelCase")]
    AcceptCall {
        /// Session being accepted
        session_id: SessionId,
        /// Accepting party
        from_identity: I,
        /// Negotiation answer, when the accepting side already has one
        answer_payload: Option<SignalPayload>,
    },

    /// Decline an invitation (local -> hub, hub -> local)
    #[serde(rename_all = "camelCase")]
    RejectCall {
        /// Session being rejected
        session_id: SessionId,
        /// Rejecting party
        from_identity: I,
    },

    /// A participant joined the session (hub -> local)
    #[serde(rename_all = "camelCase")]
    UserJoined {
        /// Session joined
        session_id: SessionId,
        /// Joining participant
        identity: I,
        /// Joining participant's display name
        display_name: String,
        /// Negotiation data that was already in flight, if any
        signal_payload: Option<SignalPayload>,
    },

    /// A participant left the session (hub -> local)
    #[serde(rename_all = "camelCase")]
    UserLeft {
        /// Session left
        session_id: SessionId,
        /// Leaving participant
        identity: I,
    },

    /// Opaque negotiation data relayed between two participants
    #[serde(rename_all = "camelCase")]
    SignalRelay {
        /// Session the peers belong to
        session_id: SessionId,
        /// Originating participant
        from_identity: I,
        /// Destination participant
        to_identity: I,
        /// Opaque adapter payload
        payload: SignalPayload,
    },

    /// Hang up the whole session (local -> hub)
    #[serde(rename_all = "camelCase")]
    EndCall {
        /// Session being ended
        session_id: SessionId,
    },
}

impl<I: ParticipantIdentity> SignalingMessage<I> {
    /// Get the session ID carried by this message
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        match self {
            Self::StartCall { session_id, .. }
            | Self::IncomingCall { session_id, .. }
            | Self::JoinCall { session_id, .. }
            | Self::AcceptCall { session_id, .. }
            | Self::RejectCall { session_id, .. }
            | Self::UserJoined { session_id, .. }
            | Self::UserLeft { session_id, .. }
            | Self::SignalRelay { session_id, .. }
            | Self::EndCall { session_id } => *session_id,
        }
    }

    /// Wire tag of this message, for logging
    #[must_use]
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::StartCall { .. } => "start-call",
            Self::IncomingCall { .. } => "incoming-call",
            Self::JoinCall { .. } => "join-call",
            Self::AcceptCall { .. } => "accept-call",
            Self::RejectCall { .. } => "reject-call",
            Self::UserJoined { .. } => "user-joined",
            Self::UserLeft { .. } => "user-left",
            Self::SignalRelay { .. } => "signal-relay",
            Self::EndCall { .. } => "end-call",
        }
    }
}

/// Everything the orchestrator can observe from the signaling channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent<I: ParticipantIdentity> {
    /// An inbound message relayed by the hub
    Message(SignalingMessage<I>),
    /// The persistent connection dropped; every remote participant is
    /// treated as `Disconnected` until the local party hangs up
    Disconnected,
}

/// Outbound half of the persistent hub connection
///
/// `send` enqueues for delivery and must not block the caller; transports
/// typically back it with an mpsc feeding a writer task. Inbound traffic
/// re-enters the orchestrator through
/// [`CallOrchestrator::handle_channel_event`](crate::orchestrator::CallOrchestrator::handle_channel_event).
pub trait SignalingChannel<I: ParticipantIdentity>: Send + Sync {
    /// Transport error type
    type Error: std::error::Error + Send + Sync + 'static;

    /// Enqueue a message for delivery to the hub
    fn send(&self, message: SignalingMessage<I>) -> Result<(), Self::Error>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::identity::ParticipantId;

    fn payload() -> SignalPayload {
        SignalPayload::new(serde_json::json!({"sdp": "v=0"}))
    }

    #[test]
    fn start_call_wire_shape() {
        let session_id = SessionId::new();
        let msg = SignalingMessage::StartCall {
            session_id,
            kind: CallKind::Video,
            target_identities: vec![ParticipantId::new("bob")],
        };

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "start-call");
        assert_eq!(json["kind"], "video");
        assert_eq!(json["sessionId"], session_id.to_string());
        assert_eq!(json["targetIdentities"][0], "bob");
    }

    #[test]
    fn signal_relay_round_trip() {
        let msg = SignalingMessage::SignalRelay {
            session_id: SessionId::new(),
            from_identity: ParticipantId::new("alice"),
            to_identity: ParticipantId::new("bob"),
            payload: payload(),
        };

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"signal-relay\""));
        assert!(json.contains("\"fromIdentity\":\"alice\""));
        assert!(json.contains("\"toIdentity\":\"bob\""));

        let back: SignalingMessage<ParticipantId> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn incoming_call_parses_from_hub_json() {
        let session_id = SessionId::new();
        let raw = serde_json::json!({
            "type": "incoming-call",
            "sessionId": session_id.to_string(),
            "kind": "audio",
            "callerIdentity": "alice",
            "callerName": "Alice",
        });

        let msg: SignalingMessage<ParticipantId> = serde_json::from_value(raw).unwrap();
        match msg {
            SignalingMessage::IncomingCall {
                session_id: sid,
                kind,
                caller_identity,
                caller_name,
            } => {
                assert_eq!(sid, session_id);
                assert_eq!(kind, CallKind::Audio);
                assert_eq!(caller_identity, ParticipantId::new("alice"));
                assert_eq!(caller_name, "Alice");
            }
            other => unreachable!("expected incoming-call, got {other:?}"),
        }
    }

    #[test]
    fn session_id_accessor_covers_every_variant() {
        let sid = SessionId::new();
        let alice = ParticipantId::new("alice");
        let messages: Vec<SignalingMessage<ParticipantId>> = vec![
            SignalingMessage::StartCall {
                session_id: sid,
                kind: CallKind::Audio,
                target_identities: vec![alice.clone()],
            },
            SignalingMessage::UserLeft {
                session_id: sid,
                identity: alice.clone(),
            },
            SignalingMessage::AcceptCall {
                session_id: sid,
                from_identity: alice,
                answer_payload: None,
            },
            SignalingMessage::EndCall { session_id: sid },
        ];
        for msg in messages {
            assert_eq!(msg.session_id(), sid);
        }
    }

    #[test]
    fn kind_str_matches_wire_tag() {
        let msg: SignalingMessage<ParticipantId> = SignalingMessage::EndCall {
            session_id: SessionId::new(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], msg.kind_str());
    }
}
