//! Call orchestrator
//!
//! The single entry point the rest of the application consumes. All local
//! commands and all inbound signaling traffic are serialized through one
//! owner: commands are `&mut self` methods, and everything asynchronous
//! (adapter callbacks, resolved media acquisitions) re-enters through the
//! internal [`CoreEvent`] queue applied by [`CallOrchestrator::process_internal`].
//! No two state-mutating operations for the session ever run concurrently,
//! which is what lets the registry and session machine stay lock-free.

use crate::adapter::{AdapterEvent, AdapterEvents, AdapterSignal, PeerAdapterFactory};
use crate::identity::ParticipantIdentity;
use crate::media::{MediaError, MediaSource};
use crate::registry::FeedOutcome;
use crate::session::{CallError, CallSession, MediaPurpose};
use crate::signaling::{ChannelEvent, SignalingChannel, SignalingMessage};
use crate::types::{
    CallKind, CallSessionState, CallSnapshot, IncomingInvite, MediaHandle, MediaToggles,
    NegotiationState, SessionId,
};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Static configuration for one orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig<I: ParticipantIdentity> {
    /// The local party's identity, used in outbound signaling
    pub identity: I,
    /// The local party's display name, sent with `join-call`
    pub display_name: String,
}

/// Events applied on the serialized dispatch path
///
/// Adapter callbacks and resolved media acquisitions are turned into
/// messages rather than mutating shared state from callback context.
#[derive(Debug)]
pub enum CoreEvent<I: ParticipantIdentity> {
    /// An adapter reported something
    Adapter(AdapterEvent<I>),
    /// A local media request resolved
    MediaAcquired {
        /// Session the request was issued for
        session_id: SessionId,
        /// Why it was issued, checked against the session's current state
        purpose: MediaPurpose,
        /// The capture handle, or why acquisition failed
        result: Result<MediaHandle, MediaError>,
    },
}

/// The call coordination core
///
/// Owns at most one [`CallSession`] at a time. Must be driven from a single
/// task: call commands directly, feed channel traffic through
/// [`handle_channel_event`](Self::handle_channel_event), and pump the
/// internal queue with [`process_internal`](Self::process_internal).
pub struct CallOrchestrator<I: ParticipantIdentity, C: SignalingChannel<I>> {
    config: OrchestratorConfig<I>,
    channel: Arc<C>,
    factory: Arc<dyn PeerAdapterFactory<I>>,
    media: Arc<dyn MediaSource>,
    session: Option<CallSession<I>>,
    observer: Option<mpsc::UnboundedSender<CallSnapshot<I>>>,
    events_tx: mpsc::UnboundedSender<CoreEvent<I>>,
    events_rx: mpsc::UnboundedReceiver<CoreEvent<I>>,
}

impl<I: ParticipantIdentity, C: SignalingChannel<I>> CallOrchestrator<I, C> {
    /// Create a new orchestrator
    #[must_use]
    pub fn new(
        config: OrchestratorConfig<I>,
        channel: Arc<C>,
        factory: Arc<dyn PeerAdapterFactory<I>>,
        media: Arc<dyn MediaSource>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config,
            channel,
            factory,
            media,
            session: None,
            observer: None,
            events_tx,
            events_rx,
        }
    }

    /// Create a builder
    #[must_use]
    pub fn builder(config: OrchestratorConfig<I>, channel: Arc<C>) -> CallOrchestratorBuilder<I, C> {
        CallOrchestratorBuilder::new(config, channel)
    }

    // === Local commands ===

    /// Start a new call to the given targets
    ///
    /// Rejected with [`CallError::CallAlreadyActive`] while any session
    /// exists: no queuing, no silent replacement. Local media acquisition
    /// runs in the background; peers are created and `start-call` is
    /// emitted once it resolves.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::CallAlreadyActive`] if a session exists.
    #[tracing::instrument(skip(self, targets), fields(kind = ?kind))]
    pub fn start_call(&mut self, kind: CallKind, targets: Vec<I>) -> Result<SessionId, CallError> {
        if self.session.is_some() {
            return Err(CallError::CallAlreadyActive);
        }

        let session = CallSession::outgoing(kind, targets);
        let session_id = session.id;
        tracing::info!(session_id = %session_id, "starting call");

        self.session = Some(session);
        self.spawn_media_request(session_id, kind, MediaPurpose::Start);
        self.publish();
        Ok(session_id)
    }

    /// Join a call that is already running at the hub
    ///
    /// A no-op when already in that session; rejected while any other
    /// session exists. `join-call` is emitted once local media resolves.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::CallAlreadyActive`] if a different session exists.
    #[tracing::instrument(skip(self), fields(session_id = %session_id, kind = ?kind))]
    pub fn join_call(&mut self, session_id: SessionId, kind: CallKind) -> Result<(), CallError> {
        if let Some(session) = &self.session {
            if session.id == session_id {
                return Ok(());
            }
            return Err(CallError::CallAlreadyActive);
        }

        tracing::info!("joining call");
        self.session = Some(CallSession::joining(session_id, kind));
        self.spawn_media_request(session_id, kind, MediaPurpose::Join);
        self.publish();
        Ok(())
    }

    /// Accept the pending invitation
    ///
    /// Local media is acquired first (the permission prompt happens only
    /// after consent); the caller's peer is created and `accept-call`
    /// emitted once it resolves.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::UnknownSessionOrIdentity`] for a session ID that
    /// is not the pending invitation, [`CallError::InvalidState`] when no
    /// invitation is pending.
    #[tracing::instrument(skip(self), fields(session_id = %session_id))]
    pub fn accept_call(&mut self, session_id: SessionId) -> Result<(), CallError> {
        let session = self
            .session
            .as_ref()
            .ok_or(CallError::InvalidState(CallSessionState::Idle))?;
        if session.id != session_id {
            return Err(CallError::UnknownSessionOrIdentity);
        }
        if session.state() != CallSessionState::Incoming {
            return Err(CallError::InvalidState(session.state()));
        }

        tracing::info!("accepting call");
        self.spawn_media_request(session_id, session.kind, MediaPurpose::Accept);
        Ok(())
    }

    /// Decline the pending invitation
    ///
    /// Emits `reject-call` and rests at idle; no media was ever requested
    /// and no peers were ever created.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::UnknownSessionOrIdentity`] for a session ID that
    /// is not the pending invitation, [`CallError::InvalidState`] when no
    /// invitation is pending.
    #[tracing::instrument(skip(self), fields(session_id = %session_id))]
    pub fn reject_call(&mut self, session_id: SessionId) -> Result<(), CallError> {
        let session = self
            .session
            .as_ref()
            .ok_or(CallError::InvalidState(CallSessionState::Idle))?;
        if session.id != session_id {
            return Err(CallError::UnknownSessionOrIdentity);
        }
        if session.state() != CallSessionState::Incoming {
            return Err(CallError::InvalidState(session.state()));
        }

        tracing::info!("rejecting call");
        self.send(SignalingMessage::RejectCall {
            session_id,
            from_identity: self.config.identity.clone(),
        });
        self.session = None;
        self.publish();
        Ok(())
    }

    /// Hang up the current session
    ///
    /// Effective immediately: every peer is destroyed, local media is
    /// released, `end-call` is emitted, and the orchestrator is back at
    /// idle before this returns. A no-op while idle. Signaling that
    /// arrives for the dead session afterwards is silently dropped.
    #[tracing::instrument(skip(self))]
    pub fn end_call(&mut self) -> Result<(), CallError> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };

        let session_id = session.id;
        tracing::info!(session_id = %session_id, "ending call");
        // Ended is transient; teardown completes within this dispatch
        let _ = session.transition(CallSessionState::Ended);
        session.registry.destroy_all();
        if let Some(handle) = session.local_media.take() {
            self.media.release(handle);
        }
        self.send(SignalingMessage::EndCall { session_id });
        self.publish();
        Ok(())
    }

    /// Toggle the local microphone, returning the new toggle state
    ///
    /// # Errors
    ///
    /// Returns [`CallError::InvalidState`] while idle.
    pub fn toggle_audio(&mut self) -> Result<MediaToggles, CallError> {
        let session = self
            .session
            .as_mut()
            .ok_or(CallError::InvalidState(CallSessionState::Idle))?;
        session.toggles.audio = !session.toggles.audio;
        let toggles = session.toggles;
        self.publish();
        Ok(toggles)
    }

    /// Toggle the local camera, returning the new toggle state
    ///
    /// Available on audio calls too; the toggle is bookkeeping the embedder
    /// maps onto its capture tracks.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::InvalidState`] while idle.
    pub fn toggle_video(&mut self) -> Result<MediaToggles, CallError> {
        let session = self
            .session
            .as_mut()
            .ok_or(CallError::InvalidState(CallSessionState::Idle))?;
        session.toggles.video = !session.toggles.video;
        let toggles = session.toggles;
        self.publish();
        Ok(toggles)
    }

    // === Observation ===

    /// Register the snapshot observer, replacing any previous one
    ///
    /// The current snapshot is delivered immediately, then one snapshot per
    /// state-affecting event. Fan-out to multiple observers, if needed, is
    /// the UI layer's job.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<CallSnapshot<I>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(self.snapshot());
        self.observer = Some(tx);
        rx
    }

    /// Compute the current snapshot on demand
    #[must_use]
    pub fn snapshot(&self) -> CallSnapshot<I> {
        self.session
            .as_ref()
            .map_or_else(CallSnapshot::idle, CallSession::snapshot)
    }

    // === Inbound traffic ===

    /// Apply one event from the signaling channel
    ///
    /// Messages for sessions or identities the local party has no record of
    /// are dropped silently; that is expected churn, not an error. A channel
    /// disconnect forces every participant to `Disconnected` but the
    /// session is held for a manual hang-up.
    pub fn handle_channel_event(&mut self, event: ChannelEvent<I>) {
        match event {
            ChannelEvent::Message(message) => self.dispatch_message(message),
            ChannelEvent::Disconnected => {
                tracing::warn!("signaling channel disconnected");
                if let Some(session) = self.session.as_mut() {
                    session.registry.mark_all_disconnected();
                    self.publish();
                }
            }
        }
    }

    /// Await and apply one internal event (adapter reports, media results)
    ///
    /// The owning task pumps this alongside channel traffic; everything
    /// asynchronous funnels back through here.
    pub async fn process_internal(&mut self) {
        if let Some(event) = self.events_rx.recv().await {
            self.apply_core_event(event);
        }
    }

    // === Dispatch ===

    fn dispatch_message(&mut self, message: SignalingMessage<I>) {
        tracing::debug!(message = message.kind_str(), session_id = %message.session_id(), "inbound signaling");
        match message {
            SignalingMessage::IncomingCall {
                session_id,
                kind,
                caller_identity,
                caller_name,
            } => self.on_incoming_call(session_id, kind, caller_identity, caller_name),

            SignalingMessage::AcceptCall {
                session_id,
                from_identity,
                answer_payload,
            } => {
                if !self.is_relevant(session_id) {
                    return;
                }
                if let Some(payload) = answer_payload {
                    self.feed_peer(&from_identity, payload);
                }
                self.publish();
            }

            SignalingMessage::RejectCall {
                session_id,
                from_identity,
            } => {
                if !self.is_relevant(session_id) {
                    return;
                }
                if let Some(session) = self.session.as_mut() {
                    if session.registry.destroy(&from_identity) {
                        tracing::info!(peer = %from_identity, "call rejected by peer");
                        self.publish();
                    }
                }
            }

            SignalingMessage::UserJoined {
                session_id,
                identity,
                display_name,
                signal_payload,
            } => self.on_user_joined(session_id, identity, display_name, signal_payload),

            SignalingMessage::UserLeft {
                session_id,
                identity,
            } => {
                if !self.is_relevant(session_id) {
                    return;
                }
                if let Some(session) = self.session.as_mut() {
                    // destruction is idempotent; leave can race local cleanup
                    if session.registry.destroy(&identity) {
                        tracing::info!(peer = %identity, "participant left");
                        self.publish();
                    }
                }
            }

            SignalingMessage::SignalRelay {
                session_id,
                from_identity,
                to_identity,
                payload,
            } => {
                if !self.is_relevant(session_id) || to_identity != self.config.identity {
                    return;
                }
                self.feed_peer(&from_identity, payload);
            }

            // local -> hub only; a remote hang-up arrives as user-left
            SignalingMessage::StartCall { .. }
            | SignalingMessage::JoinCall { .. }
            | SignalingMessage::EndCall { .. } => {
                tracing::debug!("dropping hub-bound message echoed inbound");
            }
        }
    }

    fn on_incoming_call(
        &mut self,
        session_id: SessionId,
        kind: CallKind,
        caller: I,
        caller_name: String,
    ) {
        match &self.session {
            None => {
                tracing::info!(session_id = %session_id, caller = %caller, "incoming call");
                self.session = Some(CallSession::incoming(IncomingInvite {
                    session_id,
                    kind,
                    caller,
                    caller_name,
                }));
                self.publish();
            }
            Some(session) if session.id == session_id => {
                tracing::debug!("duplicate invitation for current session");
            }
            Some(_) => {
                // busy: answer the invitation instead of leaving it dangling
                tracing::info!(session_id = %session_id, caller = %caller, "rejecting invitation, call in progress");
                self.send(SignalingMessage::RejectCall {
                    session_id,
                    from_identity: self.config.identity.clone(),
                });
            }
        }
    }

    fn on_user_joined(
        &mut self,
        session_id: SessionId,
        identity: I,
        display_name: String,
        signal_payload: Option<crate::types::SignalPayload>,
    ) {
        if !self.is_relevant(session_id) || identity == self.config.identity {
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };

        if session.local_media.is_some() {
            Self::create_peer_in(
                &self.factory,
                &self.events_tx,
                session,
                identity.clone(),
                display_name,
                false,
            );
            if let Some(payload) = signal_payload {
                self.feed_peer(&identity, payload);
            }
        } else {
            // media acquisition still outstanding; create the peer once it lands
            if let Some(payload) = signal_payload {
                let _ = session.registry.feed_signal(&identity, payload);
            }
            session.push_pending_join(identity, display_name);
        }
        self.publish();
    }

    fn apply_core_event(&mut self, event: CoreEvent<I>) {
        match event {
            CoreEvent::Adapter(event) => self.apply_adapter_event(event),
            CoreEvent::MediaAcquired {
                session_id,
                purpose,
                result,
            } => self.apply_media_result(session_id, purpose, result),
        }
    }

    fn apply_adapter_event(&mut self, event: AdapterEvent<I>) {
        let identity = event.identity;
        let Some(session) = self.session.as_mut() else {
            tracing::debug!(peer = %identity, "dropping adapter event, no session");
            return;
        };
        if !session.registry.contains(&identity) {
            tracing::debug!(peer = %identity, "dropping adapter event, peer gone");
            return;
        }

        match event.signal {
            AdapterSignal::OutboundSignal(payload) => {
                let message = SignalingMessage::SignalRelay {
                    session_id: session.id,
                    from_identity: self.config.identity.clone(),
                    to_identity: identity,
                    payload,
                };
                self.send(message);
            }
            AdapterSignal::RemoteMedia(handle) => {
                if session.registry.set_remote_media(&identity, handle) {
                    self.publish();
                }
            }
            AdapterSignal::StateChange(state) => {
                if session.registry.apply_state_change(&identity, state).is_none() {
                    return;
                }
                match state {
                    NegotiationState::Connected => {
                        if session.state() == CallSessionState::Outgoing {
                            let _ = session.mark_active();
                        }
                        if session.connected_at.is_none() {
                            session.connected_at = Some(Utc::now());
                        }
                    }
                    NegotiationState::Disconnected => {
                        // that peer only; ending the session stays a local decision
                        session.registry.destroy(&identity);
                    }
                    _ => {}
                }
                self.publish();
            }
        }
    }

    fn apply_media_result(
        &mut self,
        session_id: SessionId,
        purpose: MediaPurpose,
        result: Result<MediaHandle, MediaError>,
    ) {
        let expected = match purpose {
            MediaPurpose::Start | MediaPurpose::Join => CallSessionState::Outgoing,
            MediaPurpose::Accept => CallSessionState::Incoming,
        };
        let relevant = self
            .session
            .as_ref()
            .is_some_and(|s| s.is_relevant(session_id) && s.state() == expected);

        if !relevant {
            // the session was rejected or ended while the request was outstanding
            if let Ok(handle) = result {
                tracing::debug!(session_id = %session_id, "releasing media for dead session");
                self.media.release(handle);
            }
            return;
        }

        let handle = match result {
            Ok(handle) => handle,
            Err(error) => {
                tracing::warn!(session_id = %session_id, %error, "media acquisition failed, aborting session");
                self.session = None;
                self.publish();
                return;
            }
        };

        // borrow checked above
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.local_media = Some(handle);

        match purpose {
            MediaPurpose::Start => {
                let targets = session.take_pending_targets();
                for target in &targets {
                    let display_name = target.as_key();
                    Self::create_peer_in(
                        &self.factory,
                        &self.events_tx,
                        session,
                        target.clone(),
                        display_name,
                        true,
                    );
                }
                self.create_deferred_peers();
                self.send(SignalingMessage::StartCall {
                    session_id,
                    kind: self.session_kind(),
                    target_identities: targets,
                });
            }
            MediaPurpose::Accept => {
                let Some(invite) = session.invite().cloned() else {
                    return;
                };
                let _ = session.mark_active();
                Self::create_peer_in(
                    &self.factory,
                    &self.events_tx,
                    session,
                    invite.caller,
                    invite.caller_name,
                    false,
                );
                self.create_deferred_peers();
                self.send(SignalingMessage::AcceptCall {
                    session_id,
                    from_identity: self.config.identity.clone(),
                    answer_payload: None,
                });
            }
            MediaPurpose::Join => {
                let _ = session.mark_active();
                self.create_deferred_peers();
                self.send(SignalingMessage::JoinCall {
                    session_id,
                    identity: self.config.identity.clone(),
                    display_name: self.config.display_name.clone(),
                });
            }
        }
        self.publish();
    }

    // === Helpers ===

    fn session_kind(&self) -> CallKind {
        self.session
            .as_ref()
            .map_or(CallKind::Audio, |s| s.kind)
    }

    fn is_relevant(&self, session_id: SessionId) -> bool {
        let relevant = self
            .session
            .as_ref()
            .is_some_and(|s| s.is_relevant(session_id));
        if !relevant {
            tracing::debug!(session_id = %session_id, "dropping message for unknown session");
        }
        relevant
    }

    /// Create peers for joins that arrived while media was outstanding
    fn create_deferred_peers(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        for (identity, display_name) in session.take_pending_joins() {
            Self::create_peer_in(
                &self.factory,
                &self.events_tx,
                session,
                identity,
                display_name,
                false,
            );
        }
    }

    /// Allocate one adapter and register its peer
    ///
    /// Associated function so callers can hold the session borrow; a
    /// factory or feed failure destroys just that peer, the session
    /// continues.
    fn create_peer_in(
        factory: &Arc<dyn PeerAdapterFactory<I>>,
        events_tx: &mpsc::UnboundedSender<CoreEvent<I>>,
        session: &mut CallSession<I>,
        identity: I,
        display_name: String,
        initiator: bool,
    ) {
        if session.registry.contains(&identity) {
            return;
        }
        let Some(local_media) = session.local_media else {
            tracing::warn!(peer = %identity, "cannot create peer without local media");
            return;
        };

        let events = AdapterEvents::new(identity.clone(), events_tx.clone());
        match factory.create(&identity, initiator, local_media, events) {
            Ok(adapter) => {
                tracing::info!(peer = %identity, initiator, "peer created");
                if let Err(error) = session.registry.insert(identity.clone(), display_name, adapter)
                {
                    tracing::warn!(peer = %identity, %error, "buffered signal rejected, destroying peer");
                    session.registry.destroy(&identity);
                }
            }
            Err(error) => {
                tracing::warn!(peer = %identity, %error, "adapter creation failed");
            }
        }
    }

    /// Route an inbound payload, destroying the peer on adapter failure
    fn feed_peer(&mut self, identity: &I, payload: crate::types::SignalPayload) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match session.registry.feed_signal(identity, payload) {
            Ok(FeedOutcome::Delivered) => {}
            Ok(FeedOutcome::Buffered) => {
                tracing::debug!(peer = %identity, "buffered signal for unknown identity");
            }
            Err(error) => {
                tracing::warn!(peer = %identity, %error, "peer negotiation failed");
                session.registry.destroy(identity);
                self.publish();
            }
        }
    }

    fn spawn_media_request(&self, session_id: SessionId, kind: CallKind, purpose: MediaPurpose) {
        let media = Arc::clone(&self.media);
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = media.acquire(kind).await;
            let _ = tx.send(CoreEvent::MediaAcquired {
                session_id,
                purpose,
                result,
            });
        });
    }

    fn send(&self, message: SignalingMessage<I>) {
        let kind = message.kind_str();
        if let Err(error) = self.channel.send(message) {
            tracing::warn!(message = kind, %error, "failed to enqueue signaling message");
        }
    }

    fn publish(&mut self) {
        let snapshot = self.snapshot();
        if let Some(observer) = &self.observer {
            if observer.send(snapshot).is_err() {
                self.observer = None;
            }
        }
    }
}

impl<I: ParticipantIdentity, C: SignalingChannel<I>> Drop for CallOrchestrator<I, C> {
    fn drop(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.registry.destroy_all();
            if let Some(handle) = session.local_media.take() {
                self.media.release(handle);
            }
        }
    }
}

/// Builder for [`CallOrchestrator`]
pub struct CallOrchestratorBuilder<I: ParticipantIdentity, C: SignalingChannel<I>> {
    config: OrchestratorConfig<I>,
    channel: Arc<C>,
    factory: Option<Arc<dyn PeerAdapterFactory<I>>>,
    media: Option<Arc<dyn MediaSource>>,
}

impl<I: ParticipantIdentity, C: SignalingChannel<I>> CallOrchestratorBuilder<I, C> {
    /// Create a new builder
    #[must_use]
    pub fn new(config: OrchestratorConfig<I>, channel: Arc<C>) -> Self {
        Self {
            config,
            channel,
            factory: None,
            media: None,
        }
    }

    /// Set the peer adapter factory
    #[must_use]
    pub fn with_adapter_factory(mut self, factory: Arc<dyn PeerAdapterFactory<I>>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Set the local media source
    #[must_use]
    pub fn with_media_source(mut self, media: Arc<dyn MediaSource>) -> Self {
        self.media = Some(media);
        self
    }

    /// Build the orchestrator
    ///
    /// # Errors
    ///
    /// Returns [`CallError::InvalidState`] if a collaborator is missing.
    pub fn build(self) -> Result<CallOrchestrator<I, C>, CallError> {
        let factory = self
            .factory
            .ok_or(CallError::InvalidState(CallSessionState::Idle))?;
        let media = self
            .media
            .ok_or(CallError::InvalidState(CallSessionState::Idle))?;
        Ok(CallOrchestrator::new(
            self.config,
            self.channel,
            factory,
            media,
        ))
    }
}
