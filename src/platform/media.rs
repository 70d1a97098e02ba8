//! Local media capture.

use std::rc::Rc;

use async_trait::async_trait;
use futures::future::LocalBoxFuture;
use medea_sfu_api_proto::MediaKind;
use tracerr::Traced;

use super::Error;

/// Kind of a media device.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MediaDeviceKind {
    /// Microphone.
    AudioInput,

    /// Camera.
    VideoInput,

    /// Speaker or headphones.
    AudioOutput,
}

/// Description of a media device.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InputDeviceInfo {
    /// Unique identifier of the device.
    pub device_id: String,

    /// Kind of the device.
    pub kind: MediaDeviceKind,

    /// Human-readable label of the device.
    pub label: String,
}

/// Constraints of a video capture from a camera.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DeviceVideoConstraints {
    /// Exact device to capture from. Any camera if [`None`].
    pub device_id: Option<String>,
}

/// Constraints of a user media capture.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MediaStreamConstraints {
    /// Whether to capture audio.
    pub audio: bool,

    /// Video capture constraints. No video is captured if [`None`].
    pub video: Option<DeviceVideoConstraints>,
}

impl MediaStreamConstraints {
    /// Constraints capturing audio and video from any camera.
    #[inline]
    #[must_use]
    pub fn camera() -> Self {
        Self {
            audio: true,
            video: Some(DeviceVideoConstraints::default()),
        }
    }

    /// Constraints capturing audio and video from exactly the provided
    /// camera.
    #[inline]
    #[must_use]
    pub fn exact_camera<S: Into<String>>(device_id: S) -> Self {
        Self {
            audio: true,
            video: Some(DeviceVideoConstraints {
                device_id: Some(device_id.into()),
            }),
        }
    }
}

/// Single captured media track.
pub trait MediaStreamTrack {
    /// Returns unique ID of this track.
    fn id(&self) -> String;

    /// Returns [`MediaKind`] of this track.
    fn kind(&self) -> MediaKind;

    /// Returns label of this track's source.
    fn label(&self) -> String;

    /// Returns ID of the device this track is captured from, if reported by
    /// the engine.
    fn device_id(&self) -> Option<String>;

    /// Returns a [`Future`] resolving when this track's source ends
    /// externally (e.g. a user stops sharing the screen via the OS).
    ///
    /// [`Future`]: std::future::Future
    fn on_ended(&self) -> LocalBoxFuture<'static, ()>;

    /// Stops capturing.
    fn stop(&self);
}

/// Access to local media devices.
#[async_trait(?Send)]
pub trait MediaDevices {
    /// Lists all the available media devices.
    ///
    /// # Errors
    ///
    /// If devices cannot be enumerated.
    async fn enumerate_devices(
        &self,
    ) -> Result<Vec<InputDeviceInfo>, Traced<Error>>;

    /// Captures media from a camera and a microphone.
    ///
    /// # Errors
    ///
    /// If the capture is not permitted or no device matches.
    async fn get_user_media(
        &self,
        constraints: MediaStreamConstraints,
    ) -> Result<Vec<Rc<dyn MediaStreamTrack>>, Traced<Error>>;

    /// Captures video of a display.
    ///
    /// # Errors
    ///
    /// If the capture is not permitted.
    async fn get_display_media(
        &self,
    ) -> Result<Vec<Rc<dyn MediaStreamTrack>>, Traced<Error>>;
}
