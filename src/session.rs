//! Call session state machine
//!
//! One `CallSession` is the whole lifecycle of one call as seen by the
//! local party: session-level state, the local media handle, toggle
//! bookkeeping, and the participant registry. The orchestrator owns at
//! most one session at a time and drives every transition through here.

use crate::identity::ParticipantIdentity;
use crate::registry::ParticipantRegistry;
use crate::types::{
    CallKind, CallSessionState, CallSnapshot, IncomingInvite, MediaHandle, MediaToggles, SessionId,
};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Call coordination errors
///
/// Only synchronous command rejections live here. Media and negotiation
/// failures are recovered at the affected-peer granularity and surface
/// through published snapshots instead: a failed acquisition rests the
/// session at `Idle`, a failed negotiation removes that one participant.
#[derive(Error, Debug)]
pub enum CallError {
    /// A session already exists; no queuing, no silent replacement
    #[error("a call is already active")]
    CallAlreadyActive,

    /// The command does not apply in the current session state
    #[error("invalid call state: {0:?}")]
    InvalidState(CallSessionState),

    /// The named session or identity is not one the local party knows
    #[error("unknown session or identity")]
    UnknownSessionOrIdentity,
}

/// Why local media was requested, checked when the request resolves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaPurpose {
    /// Starting a new call: create initiator peers, emit `start-call`
    Start,
    /// Accepting an invitation: create the caller's peer, emit `accept-call`
    Accept,
    /// Joining an existing call: emit `join-call`, peers arrive via the hub
    Join,
}

/// Session-level state for one call
pub struct CallSession<I: ParticipantIdentity> {
    /// Session identifier
    pub id: SessionId,
    /// Audio or video, fixed for the session's lifetime
    pub kind: CallKind,
    /// Local media toggle bookkeeping
    pub toggles: MediaToggles,
    /// Local capture handle, once acquired
    pub local_media: Option<MediaHandle>,
    /// Authoritative participant state
    pub registry: ParticipantRegistry<I>,
    /// When the session was created locally
    pub created_at: DateTime<Utc>,
    /// When the first peer reached `Connected`
    pub connected_at: Option<DateTime<Utc>>,
    state: CallSessionState,
    invite: Option<IncomingInvite<I>>,
    pending_targets: Vec<I>,
    pending_joins: Vec<(I, String)>,
}

impl<I: ParticipantIdentity> CallSession<I> {
    fn base(id: SessionId, kind: CallKind, state: CallSessionState) -> Self {
        Self {
            id,
            kind,
            toggles: MediaToggles::for_kind(kind),
            local_media: None,
            registry: ParticipantRegistry::new(),
            created_at: Utc::now(),
            connected_at: None,
            state,
            invite: None,
            pending_targets: Vec::new(),
            pending_joins: Vec::new(),
        }
    }

    /// New outgoing session dialing the given targets
    #[must_use]
    pub fn outgoing(kind: CallKind, targets: Vec<I>) -> Self {
        let mut session = Self::base(SessionId::new(), kind, CallSessionState::Outgoing);
        session.pending_targets = targets;
        session
    }

    /// New session for a hub-pushed invitation
    ///
    /// No media is acquired yet; that is deferred until the user accepts,
    /// so no permission prompt appears before consent.
    #[must_use]
    pub fn incoming(invite: IncomingInvite<I>) -> Self {
        let mut session = Self::base(invite.session_id, invite.kind, CallSessionState::Incoming);
        session.invite = Some(invite);
        session
    }

    /// New session joining an already-running call
    ///
    /// Starts out as `Outgoing` (we initiated, awaiting media and peers)
    /// and becomes `Active` once local media resolves.
    #[must_use]
    pub fn joining(id: SessionId, kind: CallKind) -> Self {
        Self::base(id, kind, CallSessionState::Outgoing)
    }

    /// Current session-level state
    pub fn state(&self) -> CallSessionState {
        self.state
    }

    /// The pending invitation, while `Incoming`
    pub fn invite(&self) -> Option<&IncomingInvite<I>> {
        self.invite.as_ref()
    }

    /// Whether an inbound message for `session_id` belongs to this session
    pub fn is_relevant(&self, session_id: SessionId) -> bool {
        self.id == session_id && self.state != CallSessionState::Ended
    }

    /// Apply a session-state transition, validated against the table
    pub fn transition(&mut self, to: CallSessionState) -> Result<(), CallError> {
        if !CallSessionState::can_transition(self.state, to) {
            return Err(CallError::InvalidState(self.state));
        }
        let old = self.state;
        self.state = to;
        tracing::debug!(session_id = %self.id, old_state = ?old, new_state = ?to, "session state");
        Ok(())
    }

    /// Mark the session live, stamping `connected_at` on the first call
    pub fn mark_active(&mut self) -> Result<(), CallError> {
        if self.state == CallSessionState::Active {
            return Ok(());
        }
        self.transition(CallSessionState::Active)?;
        if self.connected_at.is_none() {
            self.connected_at = Some(Utc::now());
        }
        self.invite = None;
        Ok(())
    }

    /// Take the targets recorded at `start_call`, to dial once media is up
    pub fn take_pending_targets(&mut self) -> Vec<I> {
        std::mem::take(&mut self.pending_targets)
    }

    /// Remember a `user-joined` seen before local media resolved
    pub fn push_pending_join(&mut self, identity: I, display_name: String) {
        if !self.pending_joins.iter().any(|(i, _)| i == &identity) {
            self.pending_joins.push((identity, display_name));
        }
    }

    /// Take the joins deferred while media was outstanding
    pub fn take_pending_joins(&mut self) -> Vec<(I, String)> {
        std::mem::take(&mut self.pending_joins)
    }

    /// Derive the published snapshot for this session
    #[must_use]
    pub fn snapshot(&self) -> CallSnapshot<I> {
        CallSnapshot {
            session_id: Some(self.id),
            state: self.state,
            is_active: self.state == CallSessionState::Active,
            kind: Some(self.kind),
            local_media: self.toggles,
            local_media_handle: self.local_media,
            invite: self.invite.clone(),
            participants: self.registry.iter_in_order().map(|p| p.snapshot()).collect(),
            created_at: Some(self.created_at),
            connected_at: self.connected_at,
        }
    }
}
