//! Participant registry
//!
//! The authoritative mapping of participant identity to peer adapter,
//! negotiation state, and media handles for one call session. The registry
//! exclusively owns its `ParticipantPeer` entries; adapter destruction
//! always flows through here, never around it.

use crate::adapter::{AdapterError, PeerAdapter};
use crate::identity::ParticipantIdentity;
use crate::types::{MediaHandle, NegotiationState, ParticipantSnapshot, SignalPayload};
use std::collections::HashMap;

/// One remote participant in the active session
pub struct ParticipantPeer<I: ParticipantIdentity> {
    /// Stable correlation key
    pub identity: I,
    /// Display name supplied by the hub at join time
    pub display_name: String,
    /// Negotiation state of this participant's adapter
    pub negotiation_state: NegotiationState,
    /// Inbound media, once the adapter has reported it
    pub remote_media: Option<MediaHandle>,
    adapter: Box<dyn PeerAdapter>,
    fed: bool,
}

impl<I: ParticipantIdentity> ParticipantPeer<I> {
    /// Whether the adapter has been fed any inbound signaling data yet
    pub fn has_been_fed(&self) -> bool {
        self.fed
    }

    /// Derive the snapshot slice for this participant
    pub fn snapshot(&self) -> ParticipantSnapshot<I> {
        ParticipantSnapshot {
            identity: self.identity.clone(),
            display_name: self.display_name.clone(),
            negotiation_state: self.negotiation_state,
            remote_media: self.remote_media,
        }
    }
}

impl<I: ParticipantIdentity> std::fmt::Debug for ParticipantPeer<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParticipantPeer")
            .field("identity", &self.identity)
            .field("display_name", &self.display_name)
            .field("negotiation_state", &self.negotiation_state)
            .field("remote_media", &self.remote_media)
            .finish_non_exhaustive()
    }
}

/// Where an inbound signaling payload ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOutcome {
    /// Fed straight into an existing adapter
    Delivered,
    /// Held in the one-slot buffer for a not-yet-known identity
    Buffered,
}

/// Authoritative participant state for one session
///
/// Iteration follows join order, which keeps UI ordering deterministic.
/// Signal payloads for identities with no peer yet are held in a one-slot
/// buffer per identity: a later payload replaces the earlier one, and the
/// slot is drained the moment the peer is created.
pub struct ParticipantRegistry<I: ParticipantIdentity> {
    peers: HashMap<I, ParticipantPeer<I>>,
    order: Vec<I>,
    pending: HashMap<I, SignalPayload>,
}

impl<I: ParticipantIdentity> Default for ParticipantRegistry<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: ParticipantIdentity> ParticipantRegistry<I> {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            peers: HashMap::new(),
            order: Vec::new(),
            pending: HashMap::new(),
        }
    }

    /// Whether a peer exists for this identity
    pub fn contains(&self, identity: &I) -> bool {
        self.peers.contains_key(identity)
    }

    /// Number of participants
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether the registry holds no participants
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Number of participants whose adapter reached `Connected`
    pub fn connected_count(&self) -> usize {
        self.peers
            .values()
            .filter(|p| p.negotiation_state == NegotiationState::Connected)
            .count()
    }

    /// Insert a freshly created peer, draining its buffered signal if any
    ///
    /// A no-op if the identity is already present: the incoming adapter is
    /// destroyed rather than leaked, since join notifications can race.
    pub fn insert(
        &mut self,
        identity: I,
        display_name: String,
        adapter: Box<dyn PeerAdapter>,
    ) -> Result<(), AdapterError> {
        if self.peers.contains_key(&identity) {
            tracing::debug!(peer = %identity, "duplicate join, keeping existing peer");
            let mut adapter = adapter;
            adapter.destroy();
            return Ok(());
        }

        let mut peer = ParticipantPeer {
            identity: identity.clone(),
            display_name,
            negotiation_state: NegotiationState::Connecting,
            remote_media: None,
            adapter,
            fed: false,
        };

        let buffered = self.pending.remove(&identity);
        if let Some(payload) = buffered {
            tracing::debug!(peer = %identity, "feeding buffered signal to new peer");
            peer.fed = true;
            peer.adapter.feed_signal(payload)?;
        }

        self.order.push(identity.clone());
        self.peers.insert(identity, peer);
        Ok(())
    }

    /// Route an inbound payload to its adapter, or buffer it
    ///
    /// Unknown identity: the payload takes the identity's single buffer
    /// slot, replacing whatever was there (replace-not-append).
    pub fn feed_signal(
        &mut self,
        identity: &I,
        payload: SignalPayload,
    ) -> Result<FeedOutcome, AdapterError> {
        if let Some(peer) = self.peers.get_mut(identity) {
            peer.fed = true;
            peer.adapter.feed_signal(payload)?;
            Ok(FeedOutcome::Delivered)
        } else {
            if self.pending.insert(identity.clone(), payload).is_some() {
                tracing::debug!(peer = %identity, "replaced buffered signal for unknown identity");
            }
            Ok(FeedOutcome::Buffered)
        }
    }

    /// Apply a negotiation-state transition reported by an adapter
    ///
    /// Invalid transitions (anything out of `Disconnected`, or skipping a
    /// stage) are dropped with a warning. Returns the previous state when
    /// the transition was applied.
    pub fn apply_state_change(
        &mut self,
        identity: &I,
        new_state: NegotiationState,
    ) -> Option<NegotiationState> {
        let peer = self.peers.get_mut(identity)?;
        let old = peer.negotiation_state;
        if !NegotiationState::can_transition(old, new_state) {
            tracing::warn!(
                peer = %identity,
                old_state = ?old,
                new_state = ?new_state,
                "dropping invalid negotiation transition"
            );
            return None;
        }
        peer.negotiation_state = new_state;
        tracing::debug!(peer = %identity, old_state = ?old, new_state = ?new_state, "negotiation state");
        Some(old)
    }

    /// Record inbound media reported by an adapter
    pub fn set_remote_media(&mut self, identity: &I, handle: MediaHandle) -> bool {
        match self.peers.get_mut(identity) {
            Some(peer) => {
                peer.remote_media = Some(handle);
                true
            }
            None => false,
        }
    }

    /// Force every participant to `Disconnected` without removing them
    ///
    /// Used when the signaling channel drops: peers stay visible so the UI
    /// can show the outage, and the session is ended only by the local
    /// party.
    pub fn mark_all_disconnected(&mut self) {
        for peer in self.peers.values_mut() {
            if peer.negotiation_state != NegotiationState::Disconnected {
                peer.negotiation_state = NegotiationState::Disconnected;
            }
        }
    }

    /// Destroy one participant's peer; idempotent
    ///
    /// Leave notifications and local cleanup can race, so destroying an
    /// identity with no peer is a no-op. Returns whether a peer was
    /// actually removed. Any stale buffered signal for the identity is
    /// discarded as well.
    pub fn destroy(&mut self, identity: &I) -> bool {
        self.pending.remove(identity);
        match self.peers.remove(identity) {
            Some(mut peer) => {
                peer.adapter.destroy();
                self.order.retain(|i| i != identity);
                tracing::debug!(peer = %identity, "peer destroyed");
                true
            }
            None => false,
        }
    }

    /// Destroy every peer and drop all buffered signals
    pub fn destroy_all(&mut self) {
        for identity in self.order.drain(..) {
            if let Some(mut peer) = self.peers.remove(&identity) {
                peer.adapter.destroy();
            }
        }
        self.peers.clear();
        self.pending.clear();
    }

    /// Borrow a participant
    pub fn get(&self, identity: &I) -> Option<&ParticipantPeer<I>> {
        self.peers.get(identity)
    }

    /// Participants in join order
    pub fn iter_in_order(&self) -> impl Iterator<Item = &ParticipantPeer<I>> {
        self.order.iter().filter_map(|i| self.peers.get(i))
    }

    /// Identities in join order
    pub fn identities(&self) -> Vec<I> {
        self.order.clone()
    }
}

impl<I: ParticipantIdentity> Drop for ParticipantRegistry<I> {
    fn drop(&mut self) {
        self.destroy_all();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::identity::ParticipantId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct RecordingAdapter {
        fed: Arc<AtomicUsize>,
        destroyed: Arc<AtomicUsize>,
    }

    impl PeerAdapter for RecordingAdapter {
        fn feed_signal(&mut self, _payload: SignalPayload) -> Result<(), AdapterError> {
            self.fed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn destroy(&mut self) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn adapter() -> (Box<dyn PeerAdapter>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let fed = Arc::new(AtomicUsize::new(0));
        let destroyed = Arc::new(AtomicUsize::new(0));
        (
            Box::new(RecordingAdapter {
                fed: fed.clone(),
                destroyed: destroyed.clone(),
            }),
            fed,
            destroyed,
        )
    }

    fn payload(n: u64) -> SignalPayload {
        SignalPayload::new(serde_json::json!({ "seq": n }))
    }

    #[test]
    fn insert_preserves_join_order() {
        let mut reg = ParticipantRegistry::new();
        for name in ["alice", "bob", "carol"] {
            let (a, _, _) = adapter();
            reg.insert(ParticipantId::new(name), name.to_string(), a)
                .unwrap();
        }
        let order: Vec<String> = reg.identities().iter().map(|i| i.as_key()).collect();
        assert_eq!(order, ["alice", "bob", "carol"]);
    }

    #[test]
    fn duplicate_insert_destroys_incoming_adapter() {
        let mut reg = ParticipantRegistry::new();
        let alice = ParticipantId::new("alice");
        let (a1, _, d1) = adapter();
        reg.insert(alice.clone(), "Alice".into(), a1).unwrap();

        let (a2, _, d2) = adapter();
        reg.insert(alice.clone(), "Alice".into(), a2).unwrap();

        assert_eq!(reg.len(), 1);
        assert_eq!(d1.load(Ordering::SeqCst), 0);
        assert_eq!(d2.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn feed_unknown_identity_buffers_with_replace_policy() {
        let mut reg: ParticipantRegistry<ParticipantId> = ParticipantRegistry::new();
        let bob = ParticipantId::new("bob");

        assert_eq!(
            reg.feed_signal(&bob, payload(1)).unwrap(),
            FeedOutcome::Buffered
        );
        // second payload before creation replaces the first
        assert_eq!(
            reg.feed_signal(&bob, payload(2)).unwrap(),
            FeedOutcome::Buffered
        );

        let (a, fed, _) = adapter();
        reg.insert(bob.clone(), "Bob".into(), a).unwrap();
        // exactly one buffered payload applied on creation
        assert_eq!(fed.load(Ordering::SeqCst), 1);
        assert!(reg.get(&bob).unwrap().has_been_fed());
    }

    #[test]
    fn feed_known_identity_goes_straight_to_adapter() {
        let mut reg = ParticipantRegistry::new();
        let bob = ParticipantId::new("bob");
        let (a, fed, _) = adapter();
        reg.insert(bob.clone(), "Bob".into(), a).unwrap();

        assert_eq!(
            reg.feed_signal(&bob, payload(1)).unwrap(),
            FeedOutcome::Delivered
        );
        assert_eq!(fed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn destroy_is_idempotent() {
        let mut reg = ParticipantRegistry::new();
        let bob = ParticipantId::new("bob");
        let (a, _, destroyed) = adapter();
        reg.insert(bob.clone(), "Bob".into(), a).unwrap();

        assert!(reg.destroy(&bob));
        assert!(!reg.destroy(&bob));
        assert!(!reg.destroy(&ParticipantId::new("never-joined")));
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        assert!(reg.is_empty());
    }

    #[test]
    fn state_changes_follow_the_transition_table() {
        let mut reg = ParticipantRegistry::new();
        let bob = ParticipantId::new("bob");
        let (a, _, _) = adapter();
        reg.insert(bob.clone(), "Bob".into(), a).unwrap();

        // skipping Negotiating is dropped
        assert!(reg
            .apply_state_change(&bob, NegotiationState::Connected)
            .is_none());
        assert_eq!(
            reg.get(&bob).unwrap().negotiation_state,
            NegotiationState::Connecting
        );

        assert!(reg
            .apply_state_change(&bob, NegotiationState::Negotiating)
            .is_some());
        assert!(reg
            .apply_state_change(&bob, NegotiationState::Connected)
            .is_some());
        assert_eq!(reg.connected_count(), 1);

        assert!(reg
            .apply_state_change(&bob, NegotiationState::Disconnected)
            .is_some());
        // terminal
        assert!(reg
            .apply_state_change(&bob, NegotiationState::Negotiating)
            .is_none());
    }

    #[test]
    fn destroy_all_tears_down_every_adapter_once() {
        let mut reg = ParticipantRegistry::new();
        let (a1, _, d1) = adapter();
        let (a2, _, d2) = adapter();
        reg.insert(ParticipantId::new("alice"), "Alice".into(), a1)
            .unwrap();
        reg.insert(ParticipantId::new("bob"), "Bob".into(), a2)
            .unwrap();

        reg.destroy_all();
        assert!(reg.is_empty());
        assert_eq!(d1.load(Ordering::SeqCst), 1);
        assert_eq!(d2.load(Ordering::SeqCst), 1);

        // a second pass finds nothing left to tear down
        reg.destroy_all();
        assert_eq!(d1.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn mark_all_disconnected_keeps_participants() {
        let mut reg = ParticipantRegistry::new();
        let alice = ParticipantId::new("alice");
        let (a, _, _) = adapter();
        reg.insert(alice.clone(), "Alice".into(), a).unwrap();

        reg.mark_all_disconnected();
        assert_eq!(reg.len(), 1);
        assert_eq!(
            reg.get(&alice).unwrap().negotiation_state,
            NegotiationState::Disconnected
        );
    }
}
