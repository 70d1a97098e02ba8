//! Local outgoing media: capture, [`Producer`]s and pause intents.

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    rc::Rc,
};

use derive_more::{Display, From};
use futures::lock::Mutex;
use medea_sfu_api_proto::{
    AppData, LayerStats, MediaKind, MediaTag, TransportDirection,
};
use tracerr::Traced;

use crate::{
    platform::{
        self, MediaDeviceKind, MediaDevices, MediaStreamConstraints,
        MediaStreamTrack, ProduceOptions, Producer, RtpEncoding,
    },
    rpc::{RpcError, SignalingClient},
    transport::{TransportError, TransportManager},
    utils::{spawn_abortable, TaskHandle},
};

/// Errors of [`ProducerManager`] operations.
#[derive(Clone, Debug, Display, From)]
pub enum ProducerError {
    /// Signaling call failed.
    #[display(fmt = "{}", _0)]
    Rpc(RpcError),

    /// Media engine failed.
    #[display(fmt = "media engine error: {}", _0)]
    Platform(platform::Error),

    /// Outgoing transport is unavailable.
    #[display(fmt = "{}", _0)]
    Transport(TransportError),

    /// Capture returned no track of the required kind.
    #[display(fmt = "capture has no {} track", _0)]
    #[from(ignore)]
    NoTrack(MediaKind),

    /// No [`Producer`] exists for the [`MediaTag`].
    #[display(fmt = "{} is not being sent", _0)]
    #[from(ignore)]
    NotSending(MediaTag),
}

/// [`MediaTag`]s the local operator wants to be paused.
///
/// Intents outlive sessions and are applied to [`Producer`]s at their
/// creation.
#[derive(Debug, Default)]
pub struct PauseIntents(RefCell<HashSet<MediaTag>>);

impl PauseIntents {
    /// Indicates whether the media of the provided [`MediaTag`] should be
    /// paused.
    #[must_use]
    pub fn is_paused(&self, tag: MediaTag) -> bool {
        self.0.borrow().contains(&tag)
    }

    /// Records the intent for the provided [`MediaTag`].
    pub fn set(&self, tag: MediaTag, paused: bool) {
        if paused {
            self.0.borrow_mut().insert(tag);
        } else {
            self.0.borrow_mut().remove(&tag);
        }
    }
}

/// Simulcast layers camera video is encoded into, lowest first.
#[must_use]
pub fn camera_encodings() -> Vec<RtpEncoding> {
    vec![
        RtpEncoding {
            max_bitrate: Some(120_000),
            scale_resolution_down_by: Some(8.0),
        },
        RtpEncoding {
            max_bitrate: Some(680_000),
            scale_resolution_down_by: Some(1.0),
        },
    ]
}

/// Owner of the local [`Producer`]s, at most one per [`MediaTag`].
pub struct ProducerManager {
    signaling: Rc<dyn SignalingClient>,
    media_devices: Rc<dyn MediaDevices>,
    transports: Rc<TransportManager>,
    intents: Rc<PauseIntents>,

    /// Live [`Producer`]s.
    producers: RefCell<HashMap<MediaTag, Rc<dyn Producer>>>,

    /// Tracks of the current camera capture.
    camera: RefCell<Vec<Rc<dyn MediaStreamTrack>>>,

    /// Track of the current display capture.
    screen: RefCell<Option<Rc<dyn MediaStreamTrack>>>,

    /// Task waiting for the display capture to end externally.
    screen_watcher: RefCell<Option<TaskHandle>>,

    /// Serializes camera starts, so a single capture is produced.
    camera_start: Mutex<()>,

    /// Serializes screen share starts, so a single capture is produced.
    screen_start: Mutex<()>,
}

impl ProducerManager {
    /// Creates a new [`ProducerManager`] without any [`Producer`]s.
    #[must_use]
    pub fn new(
        signaling: Rc<dyn SignalingClient>,
        media_devices: Rc<dyn MediaDevices>,
        transports: Rc<TransportManager>,
        intents: Rc<PauseIntents>,
    ) -> Self {
        Self {
            signaling,
            media_devices,
            transports,
            intents,
            producers: RefCell::default(),
            camera: RefCell::default(),
            screen: RefCell::default(),
            screen_watcher: RefCell::default(),
            camera_start: Mutex::new(()),
            screen_start: Mutex::new(()),
        }
    }

    /// Returns the [`Producer`] of the provided [`MediaTag`], if any.
    #[must_use]
    pub fn get(&self, tag: MediaTag) -> Option<Rc<dyn Producer>> {
        self.producers.borrow().get(&tag).cloned()
    }

    /// Returns all the live [`Producer`]s.
    #[must_use]
    pub fn all(&self) -> HashMap<MediaTag, Rc<dyn Producer>> {
        self.producers.borrow().clone()
    }

    /// Produces a single track on the outgoing transport, applying its pause
    /// intent right after creation.
    async fn produce(
        &self,
        tag: MediaTag,
        track: Rc<dyn MediaStreamTrack>,
        encodings: Vec<RtpEncoding>,
    ) -> Result<Rc<dyn Producer>, Traced<ProducerError>> {
        let transport = self
            .transports
            .get_or_create(TransportDirection::Send)
            .await
            .map_err(tracerr::map_from_and_wrap!())?;
        let producer = transport
            .inner()
            .produce(ProduceOptions {
                track,
                encodings,
                app_data: AppData {
                    media_tag: tag,
                    peer_id: None,
                },
            })
            .await
            .map_err(tracerr::map_from_and_wrap!())?;
        if self.intents.is_paused(tag) {
            producer.pause();
        }
        log::info!("Sending {} as producer {}", tag, producer.id());
        self.producers.borrow_mut().insert(tag, Rc::clone(&producer));
        Ok(producer)
    }

    /// Captures a camera with a microphone and sends both.
    ///
    /// Does nothing if a camera is captured already.
    ///
    /// # Errors
    ///
    /// If the capture, the outgoing transport or producing fails.
    pub async fn start_camera(&self) -> Result<(), Traced<ProducerError>> {
        let _guard = self.camera_start.lock().await;
        if !self.camera.borrow().is_empty() {
            log::warn!("Camera is already being sent");
            return Ok(());
        }

        let tracks = self
            .media_devices
            .get_user_media(MediaStreamConstraints::camera())
            .await
            .map_err(tracerr::map_from_and_wrap!())?;
        let video = tracks
            .iter()
            .find(|t| t.kind() == MediaKind::Video)
            .cloned()
            .ok_or_else(|| {
                tracerr::new!(ProducerError::NoTrack(MediaKind::Video))
            })?;
        let audio = tracks
            .iter()
            .find(|t| t.kind() == MediaKind::Audio)
            .cloned()
            .ok_or_else(|| {
                tracerr::new!(ProducerError::NoTrack(MediaKind::Audio))
            })?;
        self.camera.replace(tracks);

        let produced = async {
            self.produce(MediaTag::CamVideo, video, camera_encodings())
                .await?;
            self.produce(MediaTag::CamAudio, audio, Vec::new()).await
        }
        .await;
        if let Err(e) = produced {
            for tag in &[MediaTag::CamVideo, MediaTag::CamAudio] {
                if let Some(producer) = self.producers.borrow_mut().remove(tag)
                {
                    producer.close();
                }
            }
            for track in self.camera.replace(Vec::new()) {
                track.stop();
            }
            return Err(e);
        }
        Ok(())
    }

    /// Captures a display and sends its video.
    ///
    /// Once the capture ends externally, the [`Producer`] is paused, closed
    /// on the server and forgotten.
    ///
    /// # Errors
    ///
    /// If the capture, the outgoing transport or producing fails.
    pub async fn start_screen_share(
        self: &Rc<Self>,
    ) -> Result<(), Traced<ProducerError>> {
        let _guard = self.screen_start.lock().await;
        if self.screen.borrow().is_some() {
            log::warn!("Screen is already being shared");
            return Ok(());
        }

        let track = self
            .media_devices
            .get_display_media()
            .await
            .map_err(tracerr::map_from_and_wrap!())?
            .into_iter()
            .find(|t| t.kind() == MediaKind::Video)
            .ok_or_else(|| {
                tracerr::new!(ProducerError::NoTrack(MediaKind::Video))
            })?;
        self.screen.replace(Some(Rc::clone(&track)));

        // Multi-layer screen encodings are not supported everywhere.
        if let Err(e) = self
            .produce(MediaTag::ScreenVideo, Rc::clone(&track), Vec::new())
            .await
        {
            self.screen.replace(None);
            track.stop();
            return Err(e);
        }

        let ended = track.on_ended();
        let this = Rc::downgrade(self);
        self.screen_watcher.replace(Some(spawn_abortable(async move {
            ended.await;
            if let Some(this) = this.upgrade() {
                this.on_screen_ended();
            }
        })));
        Ok(())
    }

    /// Tears the screen sharing down after its capture ended.
    ///
    /// The server is notified without waiting for its answer.
    fn on_screen_ended(&self) {
        log::warn!("Screen share stopped");
        self.screen.replace(None);
        let producer =
            self.producers.borrow_mut().remove(&MediaTag::ScreenVideo);
        if let Some(producer) = producer {
            producer.pause();
            let signaling = Rc::clone(&self.signaling);
            let id = producer.id();
            platform::spawn(async move {
                if let Err(e) = signaling.close_producer(id).await {
                    log::error!("Failed to close screen producer: {}", e);
                }
            });
            producer.close();
        }
    }

    /// Sends video of the next available camera instead of the current one,
    /// keeping the [`Producer`]s.
    ///
    /// # Errors
    ///
    /// If devices cannot be enumerated, captured or swapped.
    pub async fn cycle_camera(&self) -> Result<(), Traced<ProducerError>> {
        let video = match self.get(MediaTag::CamVideo) {
            Some(video) => video,
            None => {
                log::warn!("Cannot cycle camera: no current camera track");
                return Ok(());
            }
        };

        let current = self.current_camera_device_id().await?;
        let cameras: Vec<_> = self
            .media_devices
            .enumerate_devices()
            .await
            .map_err(tracerr::map_from_and_wrap!())?
            .into_iter()
            .filter(|d| d.kind == MediaDeviceKind::VideoInput)
            .collect();
        if cameras.len() <= 1 {
            log::warn!("Cannot cycle camera: only one camera");
            return Ok(());
        }
        let next = current
            .and_then(|id| cameras.iter().position(|d| d.device_id == id))
            .map_or(0, |i| (i + 1) % cameras.len());
        log::info!("Switching to camera {}", cameras[next].label);

        let tracks = self
            .media_devices
            .get_user_media(MediaStreamConstraints::exact_camera(
                cameras[next].device_id.clone(),
            ))
            .await
            .map_err(tracerr::map_from_and_wrap!())?;
        let mut swapped = Vec::with_capacity(tracks.len());
        for track in &tracks {
            let producer = match track.kind() {
                MediaKind::Video => Some(Rc::clone(&video)),
                MediaKind::Audio => self.get(MediaTag::CamAudio),
            };
            let producer = match producer {
                Some(producer) => producer,
                None => continue,
            };
            if let Err(e) = producer.replace_track(Rc::clone(track)).await {
                self.restore_camera(&swapped).await;
                for track in &tracks {
                    track.stop();
                }
                return Err(tracerr::map_from_and_new!(e));
            }
            swapped.push(producer);
        }
        for old in self.camera.replace(tracks) {
            old.stop();
        }
        Ok(())
    }

    /// Puts the tracks of the current camera capture back into the provided
    /// [`Producer`]s.
    async fn restore_camera(&self, producers: &[Rc<dyn Producer>]) {
        let camera = self.camera.borrow().clone();
        for producer in producers {
            let old = camera.iter().find(|t| t.kind() == producer.kind());
            if let Some(old) = old {
                if let Err(e) = producer.replace_track(Rc::clone(old)).await {
                    log::error!("Failed to restore camera track: {}", e);
                }
            }
        }
    }

    /// Returns ID of the camera the video is currently sent from.
    ///
    /// Falls back to the first camera whose label starts with the track's
    /// label, if the engine doesn't report the device ID.
    ///
    /// # Errors
    ///
    /// If devices cannot be enumerated.
    pub async fn current_camera_device_id(
        &self,
    ) -> Result<Option<String>, Traced<ProducerError>> {
        let track = match self.get(MediaTag::CamVideo).and_then(|p| p.track())
        {
            Some(track) => track,
            None => return Ok(None),
        };
        if let Some(id) = track.device_id() {
            return Ok(Some(id));
        }

        let label = track.label();
        Ok(self
            .media_devices
            .enumerate_devices()
            .await
            .map_err(tracerr::map_from_and_wrap!())?
            .into_iter()
            .find(|d| {
                d.kind == MediaDeviceKind::VideoInput
                    && d.label.starts_with(&label)
            })
            .map(|d| d.device_id))
    }

    /// Closes the outgoing transport on the server (which closes every
    /// [`Producer`] on it) and forgets all the local media.
    ///
    /// Does nothing if nothing is captured or there is no outgoing
    /// transport.
    pub async fn stop_streams(&self) {
        if self.camera.borrow().is_empty() && self.screen.borrow().is_none() {
            return;
        }
        let transport = match self.transports.get(TransportDirection::Send) {
            Some(transport) => transport,
            None => return,
        };

        log::info!("Stopping streams");
        if let Err(e) = self.signaling.close_transport(transport.id()).await {
            log::error!("Failed to close outgoing transport: {}", e);
        }
        drop(self.transports.close(TransportDirection::Send));
        self.clear();
    }

    /// Forgets all the [`Producer`]s and stops all the captures.
    pub fn clear(&self) {
        self.screen_watcher.replace(None);
        self.producers.borrow_mut().clear();
        for track in self.camera.replace(Vec::new()) {
            track.stop();
        }
        if let Some(track) = self.screen.replace(None) {
            track.stop();
        }
    }

    /// Pauses the [`Producer`] of the provided [`MediaTag`] on the server
    /// and then locally.
    ///
    /// Does nothing if there is no such [`Producer`].
    ///
    /// # Errors
    ///
    /// If the server refuses. Local state stays untouched then.
    pub async fn pause(
        &self,
        tag: MediaTag,
    ) -> Result<(), Traced<ProducerError>> {
        if let Some(producer) = self.get(tag) {
            self.signaling
                .pause_producer(producer.id())
                .await
                .map_err(tracerr::map_from_and_wrap!())?;
            producer.pause();
        }
        Ok(())
    }

    /// Resumes the [`Producer`] of the provided [`MediaTag`] on the server
    /// and then locally.
    ///
    /// Does nothing if there is no such [`Producer`].
    ///
    /// # Errors
    ///
    /// If the server refuses. Local state stays untouched then.
    pub async fn resume(
        &self,
        tag: MediaTag,
    ) -> Result<(), Traced<ProducerError>> {
        if let Some(producer) = self.get(tag) {
            self.signaling
                .resume_producer(producer.id())
                .await
                .map_err(tracerr::map_from_and_wrap!())?;
            producer.resume();
        }
        Ok(())
    }

    fn require(
        &self,
        tag: MediaTag,
    ) -> Result<Rc<dyn Producer>, Traced<ProducerError>> {
        self.get(tag)
            .ok_or_else(|| tracerr::new!(ProducerError::NotSending(tag)))
    }

    /// Fetches per-layer stats of the [`Producer`] of the provided
    /// [`MediaTag`] from the server.
    ///
    /// # Errors
    ///
    /// If there is no such [`Producer`] or the server refuses.
    pub async fn stats(
        &self,
        tag: MediaTag,
    ) -> Result<Vec<LayerStats>, Traced<ProducerError>> {
        let producer = self.require(tag)?;
        self.signaling
            .producer_stats(producer.id())
            .await
            .map_err(tracerr::map_from_and_wrap!())
    }

    /// Returns the highest simulcast layer sent by the [`Producer`] of the
    /// provided [`MediaTag`].
    ///
    /// # Errors
    ///
    /// If there is no such [`Producer`].
    pub fn max_spatial_layer(
        &self,
        tag: MediaTag,
    ) -> Result<Option<u8>, Traced<ProducerError>> {
        Ok(self.require(tag)?.max_spatial_layer())
    }

    /// Limits the highest simulcast layer sent by the [`Producer`] of the
    /// provided [`MediaTag`].
    ///
    /// # Errors
    ///
    /// If there is no such [`Producer`] or the layer doesn't exist.
    pub async fn set_max_spatial_layer(
        &self,
        tag: MediaTag,
        layer: u8,
    ) -> Result<(), Traced<ProducerError>> {
        self.require(tag)?
            .set_max_spatial_layer(layer)
            .await
            .map_err(tracerr::map_from_and_wrap!())
    }
}
