//! Peer connection adapter seam
//!
//! One adapter wraps one opaque point-to-point negotiation object per
//! remote participant. Any concrete negotiation library satisfying this
//! shape is substitutable; the core never sees codecs, transports, or
//! network traversal.
//!
//! Adapter callbacks never mutate core state directly: they post
//! [`AdapterEvent`]s through the handle given at creation, and the
//! orchestrator applies them on its single serialized dispatch path.

use crate::identity::ParticipantIdentity;
use crate::orchestrator::CoreEvent;
use crate::types::{MediaHandle, NegotiationState, SignalPayload};
use thiserror::Error;
use tokio::sync::mpsc;

/// Adapter errors
#[derive(Error, Debug)]
pub enum AdapterError {
    /// The underlying negotiation object could not be allocated
    #[error("adapter creation failed: {0}")]
    CreateFailed(String),

    /// Inbound signaling data was rejected by the negotiation object
    #[error("signal rejected: {0}")]
    SignalRejected(String),
}

/// One opaque peer-connection negotiation object
///
/// `feed_signal` must be safe to call repeatedly and must queue internally
/// if the underlying object is not ready yet. `destroy` releases all
/// underlying resources and is idempotent.
pub trait PeerAdapter: Send {
    /// Apply inbound signaling data from the remote participant
    fn feed_signal(&mut self, payload: SignalPayload) -> Result<(), AdapterError>;

    /// Release all underlying resources; safe to call more than once
    fn destroy(&mut self);
}

/// Allocates adapters, one per remote participant
///
/// `initiator` is true when the local party originates the connection
/// attempt (no inbound signaling data yet to seed the object), false when
/// the adapter is created in response to inbound data.
pub trait PeerAdapterFactory<I: ParticipantIdentity>: Send + Sync {
    /// Allocate the negotiation object for one remote participant
    fn create(
        &self,
        identity: &I,
        initiator: bool,
        local_media: MediaHandle,
        events: AdapterEvents<I>,
    ) -> Result<Box<dyn PeerAdapter>, AdapterError>;
}

/// What a single adapter can report back to the orchestrator
#[derive(Debug, Clone)]
pub enum AdapterSignal {
    /// Outbound negotiation data that must be relayed to the remote identity
    OutboundSignal(SignalPayload),
    /// Inbound media became available
    RemoteMedia(MediaHandle),
    /// The adapter moved to a new negotiation state
    StateChange(NegotiationState),
}

/// An adapter report tagged with the participant it belongs to
#[derive(Debug, Clone)]
pub struct AdapterEvent<I: ParticipantIdentity> {
    /// Which participant's adapter reported
    pub identity: I,
    /// What it reported
    pub signal: AdapterSignal,
}

/// Cloneable handle an adapter uses to report events
///
/// Each call posts onto the orchestrator's internal queue; posting after
/// the orchestrator is gone is a silent no-op, which keeps adapter teardown
/// free of shutdown ordering concerns.
#[derive(Debug, Clone)]
pub struct AdapterEvents<I: ParticipantIdentity> {
    identity: I,
    tx: mpsc::UnboundedSender<CoreEvent<I>>,
}

impl<I: ParticipantIdentity> AdapterEvents<I> {
    pub(crate) fn new(identity: I, tx: mpsc::UnboundedSender<CoreEvent<I>>) -> Self {
        Self { identity, tx }
    }

    /// Report outbound signaling data for relay to the remote participant
    pub fn outbound_signal(&self, payload: SignalPayload) {
        self.post(AdapterSignal::OutboundSignal(payload));
    }

    /// Report that inbound media became available
    pub fn remote_media(&self, handle: MediaHandle) {
        self.post(AdapterSignal::RemoteMedia(handle));
    }

    /// Report a negotiation-state transition
    pub fn state_change(&self, state: NegotiationState) {
        self.post(AdapterSignal::StateChange(state));
    }

    fn post(&self, signal: AdapterSignal) {
        let event = CoreEvent::Adapter(AdapterEvent {
            identity: self.identity.clone(),
            signal,
        });
        if self.tx.send(event).is_err() {
            tracing::trace!(peer = %self.identity, "adapter event dropped, orchestrator gone");
        }
    }
}
