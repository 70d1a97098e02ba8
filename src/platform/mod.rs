//! Boundary with the local real-time media engine.
//!
//! The engine does capability negotiation, codec handling, DTLS/SRTP,
//! congestion control and simulcast layer selection. This crate only drives
//! it through the traits below, so any engine implementation (or a test
//! double) may be plugged in.
//!
//! Everything here is single-threaded: handles are [`Rc`]-based and tasks are
//! spawned onto the current thread.
//!
//! [`Rc`]: std::rc::Rc

mod device;
mod error;
mod media;
mod transport;

use std::{future::Future, time::Duration};

#[doc(inline)]
pub use self::{
    device::{Device, MediaEngine},
    error::Error,
    media::{
        DeviceVideoConstraints, InputDeviceInfo, MediaDeviceKind,
        MediaDevices, MediaStreamConstraints, MediaStreamTrack,
    },
    transport::{
        ConnectionState, Consumer, NegotiationError, ProduceOptions,
        Producer, RtpEncoding, Transport, TransportEvent,
    },
};

/// Spawns the provided [`Future`] on the current thread.
///
/// # Panics
///
/// If called outside of a [`tokio::task::LocalSet`] context.
#[inline]
pub fn spawn<F>(task: F)
where
    F: Future<Output = ()> + 'static,
{
    drop(tokio::task::spawn_local(task));
}

/// [`Future`] resolving after the provided [`Duration`].
#[inline]
pub async fn delay_for(delay: Duration) {
    tokio::time::sleep(delay).await;
}
