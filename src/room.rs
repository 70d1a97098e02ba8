//! Facade of a conference session joined by the local participant.

use std::{
    cell::RefCell,
    collections::HashMap,
    rc::{Rc, Weak},
    time::Duration,
};

use derive_more::{Display, From};
use futures::lock::Mutex;
use medea_sfu_api_proto::{ActiveSpeaker, LayerStats, MediaTag, PeerId, Peers};
use tracerr::Traced;

use crate::{
    conf::Conf,
    consumer::{ConsumerError, ConsumerManager, TrackKey},
    platform::{self, Consumer, MediaDevices, MediaEngine, Producer},
    presenter::RoomPresenter,
    producer::{PauseIntents, ProducerError, ProducerManager},
    rpc::{HttpSignalingClient, RpcError, SignalingClient},
    session::{self, Collaborators, SessionContext, SessionState},
    transport::TransportFailure,
};

/// Errors of [`Room`] operations.
#[derive(Clone, Debug, Display, From)]
pub enum RoomError {
    /// Signaling call failed.
    #[display(fmt = "{}", _0)]
    Rpc(RpcError),

    /// Media engine failed.
    #[display(fmt = "media engine error: {}", _0)]
    Platform(platform::Error),

    /// Media engine cannot work in the current environment.
    #[display(fmt = "media engine is not supported: {}", _0)]
    #[from(ignore)]
    UnsupportedEngine(platform::Error),

    /// Outgoing media operation failed.
    #[display(fmt = "{}", _0)]
    Producer(ProducerError),

    /// Incoming media operation failed.
    #[display(fmt = "{}", _0)]
    Consumer(ConsumerError),

    /// Operation requires a joined session.
    #[display(fmt = "session is not joined")]
    #[from(ignore)]
    NotJoined,
}

/// Conference session of the local participant.
///
/// Cheap to clone: all the clones share the same session.
#[derive(Clone)]
pub struct Room(Rc<InnerRoom>);

struct InnerRoom {
    /// Identity, joined flag and device of the local participant.
    state: SessionState,

    /// Collaborators every [`SessionContext`] is built from.
    deps: Collaborators,

    /// Delay between two snapshot polls.
    polling_interval: Duration,

    /// State of the joined session. [`None`] if not joined.
    context: RefCell<Option<SessionContext>>,

    /// Serializes joining.
    joining: Mutex<()>,
}

impl Room {
    /// Creates a new not joined [`Room`], limiting the log level to the
    /// configured one.
    ///
    /// # Errors
    ///
    /// With [`RoomError::UnsupportedEngine`] if the media engine cannot work
    /// in the current environment.
    pub fn new(
        conf: &Conf,
        signaling: Rc<dyn SignalingClient>,
        engine: &dyn MediaEngine,
        media_devices: Rc<dyn MediaDevices>,
        presenter: Rc<dyn RoomPresenter>,
    ) -> Result<Self, Traced<RoomError>> {
        if let Some(level) = conf.log.level() {
            log::set_max_level(level);
        }
        let device = engine.create_device().map_err(|e| {
            if e.as_ref().is_unsupported() {
                log::error!("Media engine is not supported: {}", e);
                tracerr::new!(RoomError::UnsupportedEngine(e.into_inner()))
            } else {
                tracerr::map_from_and_new!(e)
            }
        })?;

        Ok(Self(Rc::new(InnerRoom {
            state: SessionState::new(signaling.peer_id(), Rc::clone(&device)),
            deps: Collaborators {
                signaling,
                device,
                media_devices,
                presenter,
                intents: Rc::new(PauseIntents::default()),
            },
            polling_interval: conf.polling.interval,
            context: RefCell::new(None),
            joining: Mutex::new(()),
        })))
    }

    /// Creates a new not joined [`Room`] talking to the configured signaling
    /// service over HTTP on behalf of a freshly generated identity.
    ///
    /// # Errors
    ///
    /// If the signaling URL is invalid or the media engine is not supported.
    pub fn connect(
        conf: &Conf,
        engine: &dyn MediaEngine,
        media_devices: Rc<dyn MediaDevices>,
        presenter: Rc<dyn RoomPresenter>,
    ) -> Result<Self, Traced<RoomError>> {
        let signaling = HttpSignalingClient::new(
            &conf.signaling,
            session::new_local_peer_id(),
        )
        .map_err(tracerr::map_from_and_wrap!())?;
        Self::new(conf, Rc::new(signaling), engine, media_devices, presenter)
    }

    /// Returns identity of the local participant.
    #[must_use]
    pub fn peer_id(&self) -> PeerId {
        self.0.state.peer_id().clone()
    }

    /// Indicates whether the session is joined.
    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.0.state.is_joined()
    }

    /// Returns the live local [`Producer`]s.
    #[must_use]
    pub fn producers(&self) -> HashMap<MediaTag, Rc<dyn Producer>> {
        self.0.producers().map(|p| p.all()).unwrap_or_default()
    }

    /// Returns the live [`Consumer`]s.
    #[must_use]
    pub fn consumers(&self) -> HashMap<TrackKey, Rc<dyn Consumer>> {
        self.0.consumers().map(|c| c.all()).unwrap_or_default()
    }

    /// Returns participants of the latest snapshot. Empty if not joined.
    #[must_use]
    pub fn peers(&self) -> Peers {
        self.0
            .context
            .borrow()
            .as_ref()
            .map(|ctx| ctx.sync.peers())
            .unwrap_or_default()
    }

    /// Returns loudest participant of the latest snapshot.
    #[must_use]
    pub fn active_speaker(&self) -> ActiveSpeaker {
        self.0
            .context
            .borrow()
            .as_ref()
            .map(|ctx| ctx.sync.active_speaker())
            .unwrap_or_default()
    }

    /// Indicates whether the local operator wants the media of the provided
    /// [`MediaTag`] to be paused.
    #[must_use]
    pub fn is_local_paused(&self, tag: MediaTag) -> bool {
        self.0.deps.intents.is_paused(tag)
    }

    /// Joins the session, loading the media engine on the first join, and
    /// starts polling snapshots.
    ///
    /// Does nothing if joined already.
    ///
    /// # Errors
    ///
    /// If the server refuses or the media engine cannot be loaded.
    pub async fn join(&self) -> Result<(), Traced<RoomError>> {
        self.0.join().await
    }

    /// Leaves the session, resetting all the local state before notifying
    /// the server.
    ///
    /// Does nothing if not joined.
    ///
    /// # Errors
    ///
    /// If the leave notification fails. Local state is reset anyway.
    pub async fn leave(&self) -> Result<(), Traced<RoomError>> {
        self.0.leave().await
    }

    /// Leaves the session without waiting for anything.
    ///
    /// Meant for teardown of the embedding application.
    pub fn leave_on_unload(&self) {
        if self.0.reset() {
            self.0.deps.signaling.leave_beacon();
        }
    }

    /// Joins the session if needed and sends camera video and microphone
    /// audio.
    ///
    /// # Errors
    ///
    /// If joining, capturing or producing fails.
    pub async fn send_camera_streams(&self) -> Result<(), Traced<RoomError>> {
        self.join().await?;
        self.0
            .require_producers()?
            .start_camera()
            .await
            .map_err(tracerr::map_from_and_wrap!())
    }

    /// Joins the session if needed and shares the screen.
    ///
    /// # Errors
    ///
    /// If joining, capturing or producing fails.
    pub async fn start_screen_share(&self) -> Result<(), Traced<RoomError>> {
        self.join().await?;
        self.0
            .require_producers()?
            .start_screen_share()
            .await
            .map_err(tracerr::map_from_and_wrap!())
    }

    /// Sends video of the next available camera.
    ///
    /// # Errors
    ///
    /// If not joined, or devices cannot be enumerated, captured or swapped.
    pub async fn cycle_camera(&self) -> Result<(), Traced<RoomError>> {
        self.0
            .require_producers()?
            .cycle_camera()
            .await
            .map_err(tracerr::map_from_and_wrap!())
    }

    /// Returns ID of the camera the video is currently sent from.
    ///
    /// # Errors
    ///
    /// If devices cannot be enumerated.
    pub async fn current_camera_device_id(
        &self,
    ) -> Result<Option<String>, Traced<RoomError>> {
        match self.0.producers() {
            Some(producers) => producers
                .current_camera_device_id()
                .await
                .map_err(tracerr::map_from_and_wrap!()),
            None => Ok(None),
        }
    }

    /// Stops sending all the local media.
    pub async fn stop_streams(&self) {
        if let Some(producers) = self.0.producers() {
            producers.stop_streams().await;
        }
    }

    /// Records the local operator's intent to pause (or resume) the media of
    /// the provided [`MediaTag`] and applies it to its producer, if any.
    ///
    /// # Errors
    ///
    /// If the server refuses. The intent stays recorded.
    pub async fn set_local_paused(
        &self,
        tag: MediaTag,
        paused: bool,
    ) -> Result<(), Traced<RoomError>> {
        self.0.deps.intents.set(tag, paused);
        let producers = match self.0.producers() {
            Some(producers) => producers,
            None => return Ok(()),
        };
        let result = if paused {
            producers.pause(tag).await
        } else {
            producers.resume(tag).await
        };
        result.map_err(tracerr::map_from_and_wrap!())
    }

    /// Starts receiving the provided track of a remote participant.
    ///
    /// # Errors
    ///
    /// If not joined, or see [`ConsumerError`].
    pub async fn subscribe_to_track(
        &self,
        peer_id: PeerId,
        tag: MediaTag,
    ) -> Result<(), Traced<RoomError>> {
        self.0
            .require_consumers()?
            .subscribe(TrackKey::new(peer_id, tag))
            .await
            .map_err(tracerr::map_from_and_wrap!())
    }

    /// Stops receiving the provided track of a remote participant.
    pub fn unsubscribe_from_track(&self, peer_id: PeerId, tag: MediaTag) {
        if let Some(consumers) = self.0.consumers() {
            consumers.unsubscribe(&TrackKey::new(peer_id, tag));
        }
    }

    /// Pauses receiving the provided track.
    ///
    /// # Errors
    ///
    /// If not joined, the track is not received or the server refuses.
    pub async fn pause_consumer(
        &self,
        peer_id: PeerId,
        tag: MediaTag,
    ) -> Result<(), Traced<RoomError>> {
        self.0
            .require_consumers()?
            .pause(&TrackKey::new(peer_id, tag))
            .await
            .map_err(tracerr::map_from_and_wrap!())
    }

    /// Resumes receiving the provided track.
    ///
    /// # Errors
    ///
    /// If not joined, the track is not received or the server refuses.
    pub async fn resume_consumer(
        &self,
        peer_id: PeerId,
        tag: MediaTag,
    ) -> Result<(), Traced<RoomError>> {
        self.0
            .require_consumers()?
            .resume(&TrackKey::new(peer_id, tag))
            .await
            .map_err(tracerr::map_from_and_wrap!())
    }

    /// Asks the server to forward the provided spatial layer of the track.
    ///
    /// # Errors
    ///
    /// If not joined, the track is not received or the server refuses.
    pub async fn set_consumer_preferred_layer(
        &self,
        peer_id: PeerId,
        tag: MediaTag,
        spatial_layer: u8,
    ) -> Result<(), Traced<RoomError>> {
        self.0
            .require_consumers()?
            .set_preferred_layer(&TrackKey::new(peer_id, tag), spatial_layer)
            .await
            .map_err(tracerr::map_from_and_wrap!())
    }

    /// Fetches per-layer server stats of the local producer of the provided
    /// [`MediaTag`].
    ///
    /// # Errors
    ///
    /// If not joined, the media is not sent or the server refuses.
    pub async fn producer_stats(
        &self,
        tag: MediaTag,
    ) -> Result<Vec<LayerStats>, Traced<RoomError>> {
        self.0
            .require_producers()?
            .stats(tag)
            .await
            .map_err(tracerr::map_from_and_wrap!())
    }

    /// Returns the highest simulcast layer sent for the provided
    /// [`MediaTag`].
    ///
    /// # Errors
    ///
    /// If not joined or the media is not sent.
    pub fn producer_max_spatial_layer(
        &self,
        tag: MediaTag,
    ) -> Result<Option<u8>, Traced<RoomError>> {
        self.0
            .require_producers()?
            .max_spatial_layer(tag)
            .map_err(tracerr::map_from_and_wrap!())
    }

    /// Limits the highest simulcast layer sent for the provided
    /// [`MediaTag`].
    ///
    /// # Errors
    ///
    /// If not joined, the media is not sent or the layer doesn't exist.
    pub async fn set_producer_max_spatial_layer(
        &self,
        tag: MediaTag,
        layer: u8,
    ) -> Result<(), Traced<RoomError>> {
        self.0
            .require_producers()?
            .set_max_spatial_layer(tag, layer)
            .await
            .map_err(tracerr::map_from_and_wrap!())
    }
}

impl InnerRoom {
    fn producers(&self) -> Option<Rc<ProducerManager>> {
        self.context
            .borrow()
            .as_ref()
            .map(|ctx| Rc::clone(&ctx.producers))
    }

    fn consumers(&self) -> Option<Rc<ConsumerManager>> {
        self.context
            .borrow()
            .as_ref()
            .map(|ctx| Rc::clone(&ctx.consumers))
    }

    fn require_producers(
        &self,
    ) -> Result<Rc<ProducerManager>, Traced<RoomError>> {
        self.producers()
            .ok_or_else(|| tracerr::new!(RoomError::NotJoined))
    }

    fn require_consumers(
        &self,
    ) -> Result<Rc<ConsumerManager>, Traced<RoomError>> {
        self.consumers()
            .ok_or_else(|| tracerr::new!(RoomError::NotJoined))
    }

    async fn join(self: &Rc<Self>) -> Result<(), Traced<RoomError>> {
        let _guard = self.joining.lock().await;
        if self.state.is_joined() {
            return Ok(());
        }

        log::info!("Joining as {}", self.state.peer_id());
        let router_capabilities = self
            .deps
            .signaling
            .join()
            .await
            .map_err(tracerr::map_from_and_wrap!())?;
        let device = self.state.device();
        if !device.is_loaded() {
            device
                .load(router_capabilities)
                .await
                .map_err(tracerr::map_from_and_wrap!())?;
        }

        let this = Rc::downgrade(self);
        let context = SessionContext::start(
            &self.deps,
            self.polling_interval,
            move |failure| leave_on_failure(this, failure),
        );
        self.context.replace(Some(context));
        self.state.set_joined(true);
        Ok(())
    }

    async fn leave(&self) -> Result<(), Traced<RoomError>> {
        if !self.reset() {
            return Ok(());
        }
        self.deps
            .signaling
            .leave()
            .await
            .map_err(tracerr::map_from_and_wrap!())
    }

    /// Discards the joined session, returning `false` if not joined.
    fn reset(&self) -> bool {
        let context = self.context.borrow_mut().take();
        match context {
            Some(context) => {
                log::info!("Leaving the session");
                context.close();
                self.state.set_joined(false);
                self.deps.presenter.on_session_closed();
                true
            }
            None => false,
        }
    }
}

/// Leaves the session of the provided [`InnerRoom`] after a transport failed.
fn leave_on_failure(room: Weak<InnerRoom>, failure: TransportFailure) {
    log::error!("Session is broken, leaving: {}", failure);
    platform::spawn(async move {
        if let Some(room) = room.upgrade() {
            if let Err(e) = room.leave().await {
                log::error!("Failed to leave the session: {}", e);
            }
        }
    });
}

impl Drop for InnerRoom {
    fn drop(&mut self) {
        let _ = self.reset();
    }
}
