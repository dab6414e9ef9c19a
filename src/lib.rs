//! meshcall - real-time call coordination core
//!
//! The state machine, peer-connection lifecycle coordinator, and signaling
//! protocol behind mesh audio/video calls: who is in the call, with what
//! media, in what connection state - kept consistent despite unordered,
//! unreliable, asynchronous signaling traffic.
//!
//! The crate deliberately excludes transports and media engines. Three
//! seams are consumed as capability traits, supplied by the embedder:
//!
//! - [`SignalingChannel`]: the persistent connection to the rendezvous hub
//! - [`PeerAdapterFactory`]/[`PeerAdapter`]: opaque per-participant
//!   negotiation objects (any WebRTC-shaped library fits)
//! - [`MediaSource`]: camera/microphone capture, held only as opaque handles
//!
//! # Examples
//!
//! ```rust,no_run
//! use meshcall::prelude::*;
//! use std::sync::Arc;
//!
//! # fn example(
//! #     channel: Arc<impl SignalingChannel<ParticipantId> + 'static>,
//! #     factory: Arc<dyn PeerAdapterFactory<ParticipantId>>,
//! #     media: Arc<dyn MediaSource>,
//! # ) -> Result<(), meshcall::CallError> {
//! let config = OrchestratorConfig {
//!     identity: ParticipantId::new("alice"),
//!     display_name: "Alice".to_string(),
//! };
//! let mut orchestrator = CallOrchestrator::builder(config, channel)
//!     .with_adapter_factory(factory)
//!     .with_media_source(media)
//!     .build()?;
//!
//! let mut snapshots = orchestrator.subscribe();
//!
//! // Dial bob; peers and the start-call message follow once media resolves
//! let session_id = orchestrator.start_call(
//!     CallKind::Video,
//!     vec![ParticipantId::new("bob")],
//! )?;
//! # let _ = (session_id, snapshots.try_recv());
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::panic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

/// Core call-coordination types and data structures
pub mod types;

/// Participant identity abstraction
pub mod identity;

/// Signaling wire protocol and channel contract
pub mod signaling;

/// Local media acquisition seam
pub mod media;

/// Peer connection adapter seam
pub mod adapter;

/// Participant registry
pub mod registry;

/// Call session state machine
pub mod session;

/// Call orchestrator: the serialized dispatch entry point
pub mod orchestrator;

pub use adapter::{
    AdapterError, AdapterEvent, AdapterEvents, AdapterSignal, PeerAdapter, PeerAdapterFactory,
};
pub use identity::{ParticipantId, ParticipantIdentity};
pub use media::{MediaError, MediaSource};
pub use orchestrator::{
    CallOrchestrator, CallOrchestratorBuilder, CoreEvent, OrchestratorConfig,
};
pub use registry::{FeedOutcome, ParticipantPeer, ParticipantRegistry};
pub use session::{CallError, CallSession, MediaPurpose};
pub use signaling::{ChannelError, ChannelEvent, SignalingChannel, SignalingMessage};
pub use types::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::adapter::{AdapterEvents, PeerAdapter, PeerAdapterFactory};
    pub use crate::identity::{ParticipantId, ParticipantIdentity};
    pub use crate::media::MediaSource;
    pub use crate::orchestrator::{CallOrchestrator, OrchestratorConfig};
    pub use crate::session::CallError;
    pub use crate::signaling::{ChannelEvent, SignalingChannel, SignalingMessage};
    pub use crate::types::{
        CallKind, CallSessionState, CallSnapshot, MediaHandle, MediaToggles, NegotiationState,
        SessionId, SignalPayload,
    };
}
