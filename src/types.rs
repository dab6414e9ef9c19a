//! Core call-coordination types and data structures

use crate::identity::ParticipantIdentity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a call session
///
/// Assigned by whichever party initiates the call and carried verbatim in
/// every signaling message for that session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of call, fixed for the lifetime of a session
///
/// Determines whether local capture requests video; audio is always captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    /// Audio-only call
    Audio,
    /// Audio and video call
    Video,
}

impl CallKind {
    /// Whether local capture for this kind includes video
    pub fn wants_video(self) -> bool {
        matches!(self, Self::Video)
    }
}

/// Session-level lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallSessionState {
    /// No session
    Idle,
    /// Local party is dialing or joining; awaiting media and peers
    Outgoing,
    /// A hub-pushed invitation is pending local consent
    Incoming,
    /// Session is live (connected peers, or local media held awaiting peers)
    Active,
    /// Transient teardown state; rests at `Idle` once cleanup completes
    Ended,
}

impl CallSessionState {
    /// Check whether a session state transition is allowed
    ///
    /// The session machine: `Idle -> Outgoing | Incoming`, `Outgoing ->
    /// Active`, `Incoming -> Active | Idle` (reject), any non-`Idle`
    /// state `-> Ended`, `Ended -> Idle`.
    #[must_use]
    pub fn can_transition(from: Self, to: Self) -> bool {
        matches!(
            (from, to),
            (Self::Idle, Self::Outgoing)
                | (Self::Idle, Self::Incoming)
                | (Self::Outgoing, Self::Active)
                | (Self::Incoming, Self::Active)
                | (Self::Incoming, Self::Idle)
                | (Self::Outgoing, Self::Ended)
                | (Self::Incoming, Self::Ended)
                | (Self::Active, Self::Ended)
                | (Self::Ended, Self::Idle)
        )
    }
}

/// Per-peer negotiation state
///
/// `Connecting -> Negotiating -> Connected`, with `Disconnected` reachable
/// from every state. There is no way back out of `Disconnected`: a fresh
/// adapter must be created for a reconnection attempt, since
/// partially-negotiated state cannot be resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NegotiationState {
    /// Adapter allocated, no negotiation traffic yet
    Connecting,
    /// Signaling data is being exchanged
    Negotiating,
    /// Media path established
    Connected,
    /// Terminal: network loss, hang-up, or remote destroy
    Disconnected,
}

impl NegotiationState {
    /// Check whether a negotiation state transition is allowed
    #[must_use]
    pub fn can_transition(from: Self, to: Self) -> bool {
        match (from, to) {
            (Self::Disconnected, _) => false,
            (_, Self::Disconnected) => true,
            (Self::Connecting, Self::Negotiating) | (Self::Negotiating, Self::Connected) => true,
            _ => false,
        }
    }
}

/// Local media toggle state
///
/// Independently toggleable regardless of the session kind: video calls can
/// mute video, and audio mute is always available. Toggling is bookkeeping
/// only; actually pausing the capture tracks is the embedder's job, keyed
/// off the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaToggles {
    /// Microphone enabled
    pub audio: bool,
    /// Camera enabled
    pub video: bool,
}

impl MediaToggles {
    /// Default toggles for a call kind: audio on, video iff a video call
    #[must_use]
    pub fn for_kind(kind: CallKind) -> Self {
        Self {
            audio: true,
            video: kind.wants_video(),
        }
    }
}

impl Default for MediaToggles {
    fn default() -> Self {
        Self {
            audio: true,
            video: false,
        }
    }
}

/// Opaque handle to a local or remote audio-video capture object
///
/// The core never inspects media; the embedder maps this token back to its
/// real capture/render object. Handles are cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaHandle(pub Uuid);

impl MediaHandle {
    /// Create a new handle token
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MediaHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MediaHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque peer-negotiation payload relayed between adapters
///
/// The core treats the contents (SDP, ICE candidates, whatever the
/// negotiation library produces) as an uninterpreted JSON value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalPayload(pub serde_json::Value);

impl SignalPayload {
    /// Wrap a raw JSON value
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// A pending hub-pushed call invitation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingInvite<I: ParticipantIdentity> {
    /// Session the caller created
    pub session_id: SessionId,
    /// Kind of the offered call
    pub kind: CallKind,
    /// Who is calling
    pub caller: I,
    /// Caller's display name, supplied by the hub
    pub caller_name: String,
}

/// Per-participant slice of a [`CallSnapshot`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantSnapshot<I: ParticipantIdentity> {
    /// Stable correlation key for this participant
    pub identity: I,
    /// Display name supplied by the hub at join time
    pub display_name: String,
    /// Current negotiation state of this participant's adapter
    pub negotiation_state: NegotiationState,
    /// Inbound media, once the adapter has reported it
    pub remote_media: Option<MediaHandle>,
}

/// Immutable, fully-derived view of session and participant state
///
/// Recomputed by the orchestrator after every state-affecting event and
/// published to the registered observer. Participants appear in join order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSnapshot<I: ParticipantIdentity> {
    /// Session identifier, `None` while idle
    pub session_id: Option<SessionId>,
    /// Session-level state
    pub state: CallSessionState,
    /// Whether the session is live
    pub is_active: bool,
    /// Call kind, `None` while idle
    pub kind: Option<CallKind>,
    /// Local media toggle state
    pub local_media: MediaToggles,
    /// Local capture handle, once acquired
    pub local_media_handle: Option<MediaHandle>,
    /// Pending invitation while `Incoming`
    pub invite: Option<IncomingInvite<I>>,
    /// Participants in join order
    pub participants: Vec<ParticipantSnapshot<I>>,
    /// When the session was created locally
    pub created_at: Option<DateTime<Utc>>,
    /// When the first peer reached `Connected`
    pub connected_at: Option<DateTime<Utc>>,
}

impl<I: ParticipantIdentity> CallSnapshot<I> {
    /// The snapshot published while no session exists
    #[must_use]
    pub fn idle() -> Self {
        Self {
            session_id: None,
            state: CallSessionState::Idle,
            is_active: false,
            kind: None,
            local_media: MediaToggles::default(),
            local_media_handle: None,
            invite: None,
            participants: Vec::new(),
            created_at: None,
            connected_at: None,
        }
    }
}
