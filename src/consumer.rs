//! Remote media the local participant receives.

use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, HashSet},
    rc::Rc,
};

use derive_more::{Display, From};
use medea_sfu_api_proto::{
    AppData, MediaTag, PeerId, Peers, TransportDirection,
};
use tracerr::Traced;

use crate::{
    platform::{self, Consumer, Device},
    presenter::RoomPresenter,
    rpc::{RpcError, SignalingClient},
    transport::{TransportError, TransportManager},
};

/// Errors of [`ConsumerManager`] operations.
#[derive(Clone, Debug, Display, From)]
pub enum ConsumerError {
    /// Signaling call failed.
    #[display(fmt = "{}", _0)]
    Rpc(RpcError),

    /// Media engine failed.
    #[display(fmt = "media engine error: {}", _0)]
    Platform(platform::Error),

    /// Incoming transport is unavailable.
    #[display(fmt = "{}", _0)]
    Transport(TransportError),

    /// No [`Consumer`] exists for the track.
    #[display(fmt = "{} is not being received", _0)]
    #[from(ignore)]
    NotReceiving(TrackKey),

    /// Track disappeared from the session while being subscribed to.
    #[display(fmt = "{} is not available anymore", _0)]
    #[from(ignore)]
    Vanished(TrackKey),

    /// Session was left while subscribing.
    #[display(fmt = "session is closed")]
    #[from(ignore)]
    SessionClosed,
}

/// Remote track: a [`MediaTag`] of a participant.
#[derive(Clone, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[display(fmt = "{}/{}", peer_id, media_tag)]
pub struct TrackKey {
    /// Participant transmitting the track.
    pub peer_id: PeerId,

    /// [`MediaTag`] of the track.
    pub media_tag: MediaTag,
}

impl TrackKey {
    /// Creates a new [`TrackKey`].
    #[inline]
    #[must_use]
    pub fn new(peer_id: PeerId, media_tag: MediaTag) -> Self {
        Self { peer_id, media_tag }
    }

    /// Indicates whether the provided [`Peers`] contain this track.
    #[must_use]
    pub fn is_in(&self, peers: &Peers) -> bool {
        peers
            .get(&self.peer_id)
            .map_or(false, |p| p.media.contains_key(&self.media_tag))
    }
}

/// Returns held tracks that must be closed to match the `next` snapshot, in
/// closing order.
///
/// First go tracks of participants present in `prev` but gone from `next`,
/// then every other track `next` doesn't contain.
#[must_use]
pub fn stale_tracks<'a, I>(
    held: I,
    prev: &Peers,
    next: &Peers,
) -> Vec<TrackKey>
where
    I: IntoIterator<Item = &'a TrackKey>,
{
    let mut held: Vec<_> = held.into_iter().cloned().collect();
    held.sort();

    let mut stale = Vec::new();
    for exited in prev.keys().filter(|id| !next.contains_key(*id)) {
        log::info!("Peer {} has exited", exited);
        stale.extend(held.iter().filter(|k| &k.peer_id == exited).cloned());
    }
    for track in &held {
        if !stale.contains(track) && !track.is_in(next) {
            log::info!(
                "Peer {} has stopped transmitting {}",
                track.peer_id,
                track.media_tag,
            );
            stale.push(track.clone());
        }
    }
    stale
}

/// Owner of the local [`Consumer`]s, at most one per [`TrackKey`].
pub struct ConsumerManager {
    signaling: Rc<dyn SignalingClient>,
    device: Rc<dyn Device>,
    transports: Rc<TransportManager>,
    presenter: Rc<dyn RoomPresenter>,

    /// Live [`Consumer`]s.
    consumers: RefCell<HashMap<TrackKey, Rc<dyn Consumer>>>,

    /// Tracks being subscribed to at the moment.
    pending: RefCell<HashSet<TrackKey>>,

    /// Tracks of the latest reconciled snapshot. [`None`] before the first
    /// reconciliation.
    available: RefCell<Option<Peers>>,

    /// Indicator whether [`ConsumerManager::clear()`] was called.
    cleared: Cell<bool>,
}

impl ConsumerManager {
    /// Creates a new [`ConsumerManager`] without any [`Consumer`]s.
    #[must_use]
    pub fn new(
        signaling: Rc<dyn SignalingClient>,
        device: Rc<dyn Device>,
        transports: Rc<TransportManager>,
        presenter: Rc<dyn RoomPresenter>,
    ) -> Self {
        Self {
            signaling,
            device,
            transports,
            presenter,
            consumers: RefCell::default(),
            pending: RefCell::default(),
            available: RefCell::default(),
            cleared: Cell::new(false),
        }
    }

    /// Returns the [`Consumer`] of the provided track, if any.
    #[must_use]
    pub fn get(&self, track: &TrackKey) -> Option<Rc<dyn Consumer>> {
        self.consumers.borrow().get(track).cloned()
    }

    /// Returns all the live [`Consumer`]s.
    #[must_use]
    pub fn all(&self) -> HashMap<TrackKey, Rc<dyn Consumer>> {
        self.consumers.borrow().clone()
    }

    /// Starts receiving the provided track.
    ///
    /// Delivery is resumed on the server only once the incoming transport is
    /// connected. Subscribing to a track that is received (or being
    /// subscribed to) already is a logged no-op.
    ///
    /// # Errors
    ///
    /// If any signaling call or the media engine fails, or the incoming
    /// transport terminates before getting connected.
    pub async fn subscribe(
        &self,
        track: TrackKey,
    ) -> Result<(), Traced<ConsumerError>> {
        if self.consumers.borrow().contains_key(&track)
            || !self.pending.borrow_mut().insert(track.clone())
        {
            log::error!("Already have a consumer for track {}", track);
            return Ok(());
        }

        let created = self.create(&track).await;
        self.pending.borrow_mut().remove(&track);
        let consumer = created?;

        if self.cleared.get() {
            self.release(consumer);
            return Err(tracerr::new!(ConsumerError::SessionClosed));
        }
        let vanished = self
            .available
            .borrow()
            .as_ref()
            .map_or(false, |peers| !track.is_in(peers));
        if vanished {
            log::warn!("Track {} vanished while subscribing", track);
            self.release(consumer);
            return Err(tracerr::new!(ConsumerError::Vanished(track)));
        }

        log::info!("Receiving {} as consumer {}", track, consumer.id());
        self.consumers
            .borrow_mut()
            .insert(track.clone(), Rc::clone(&consumer));
        self.presenter.on_consumer_added(&track, consumer);
        Ok(())
    }

    /// Creates a resumed [`Consumer`] of the provided track.
    async fn create(
        &self,
        track: &TrackKey,
    ) -> Result<Rc<dyn Consumer>, Traced<ConsumerError>> {
        let transport = self
            .transports
            .get_or_create(TransportDirection::Recv)
            .await
            .map_err(tracerr::map_from_and_wrap!())?;
        let params = self
            .signaling
            .recv_track(
                track.media_tag,
                track.peer_id.clone(),
                self.device.rtp_capabilities(),
            )
            .await
            .map_err(tracerr::map_from_and_wrap!())?;
        let consumer = transport
            .inner()
            .consume(
                params,
                AppData {
                    media_tag: track.media_tag,
                    peer_id: Some(track.peer_id.clone()),
                },
            )
            .await
            .map_err(tracerr::map_from_and_wrap!())?;

        let resumed: Result<(), Traced<ConsumerError>> = async {
            transport
                .wait_connected()
                .await
                .map_err(tracerr::map_from_and_wrap!())?;
            self.signaling
                .resume_consumer(consumer.id())
                .await
                .map_err(tracerr::map_from_and_wrap!())
        }
        .await;
        if let Err(e) = resumed {
            self.release(consumer);
            return Err(e);
        }
        consumer.resume();
        Ok(consumer)
    }

    /// Stops receiving the provided track, if it's received.
    pub fn unsubscribe(&self, track: &TrackKey) {
        if !self.close(track) {
            log::warn!("No consumer for track {}", track);
        }
    }

    /// Closes the [`Consumer`] of the provided track, returning `false` if
    /// there is none.
    ///
    /// The server is notified without waiting for its answer.
    pub fn close(&self, track: &TrackKey) -> bool {
        let consumer = match self.consumers.borrow_mut().remove(track) {
            Some(consumer) => consumer,
            None => return false,
        };
        self.presenter.on_consumer_closed(track);
        self.release(consumer);
        true
    }

    /// Closes the provided [`Consumer`] on the server (without waiting) and
    /// locally.
    fn release(&self, consumer: Rc<dyn Consumer>) {
        let signaling = Rc::clone(&self.signaling);
        let id = consumer.id();
        platform::spawn(async move {
            if let Err(e) = signaling.close_consumer(id).await {
                log::warn!("Failed to close consumer on server: {}", e);
            }
        });
        consumer.close();
    }

    /// Closes every [`Consumer`] whose track is not in the `next` snapshot.
    ///
    /// Has no suspension points, so it's atomic to every other operation.
    pub fn reconcile(&self, prev: &Peers, next: &Peers) {
        let stale = stale_tracks(self.consumers.borrow().keys(), prev, next);
        for track in stale {
            self.close(&track);
        }
        self.available.replace(Some(next.clone()));
    }

    /// Forgets all the [`Consumer`]s without notifying anyone.
    ///
    /// Used when the incoming transport is closed, which closes them anyway.
    pub fn clear(&self) {
        self.cleared.set(true);
        self.consumers.borrow_mut().clear();
        self.pending.borrow_mut().clear();
        self.available.replace(None);
    }

    fn require(
        &self,
        track: &TrackKey,
    ) -> Result<Rc<dyn Consumer>, Traced<ConsumerError>> {
        self.get(track).ok_or_else(|| {
            tracerr::new!(ConsumerError::NotReceiving(track.clone()))
        })
    }

    /// Pauses the [`Consumer`] of the provided track on the server and then
    /// locally.
    ///
    /// # Errors
    ///
    /// If there is no such [`Consumer`] or the server refuses.
    pub async fn pause(
        &self,
        track: &TrackKey,
    ) -> Result<(), Traced<ConsumerError>> {
        let consumer = self.require(track)?;
        self.signaling
            .pause_consumer(consumer.id())
            .await
            .map_err(tracerr::map_from_and_wrap!())?;
        consumer.pause();
        Ok(())
    }

    /// Resumes the [`Consumer`] of the provided track on the server and then
    /// locally.
    ///
    /// # Errors
    ///
    /// If there is no such [`Consumer`] or the server refuses.
    pub async fn resume(
        &self,
        track: &TrackKey,
    ) -> Result<(), Traced<ConsumerError>> {
        let consumer = self.require(track)?;
        self.signaling
            .resume_consumer(consumer.id())
            .await
            .map_err(tracerr::map_from_and_wrap!())?;
        consumer.resume();
        Ok(())
    }

    /// Asks the server to forward the provided spatial layer of the track.
    ///
    /// # Errors
    ///
    /// If there is no such [`Consumer`] or the server refuses.
    pub async fn set_preferred_layer(
        &self,
        track: &TrackKey,
        spatial_layer: u8,
    ) -> Result<(), Traced<ConsumerError>> {
        let consumer = self.require(track)?;
        self.signaling
            .set_consumer_preferred_layer(consumer.id(), spatial_layer)
            .await
            .map_err(tracerr::map_from_and_wrap!())
    }
}
