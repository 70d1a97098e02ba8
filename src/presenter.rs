//! Presentation side of a [`Room`].
//!
//! [`Room`]: crate::Room

use std::rc::Rc;

use medea_sfu_api_proto::{ActiveSpeaker, Peers};

use crate::{
    consumer::TrackKey, platform::Consumer, rpc::RpcError,
    snapshot::NormalizedPeer,
};

/// Receiver of everything a [`Room`] wants to be rendered.
///
/// Every callback is invoked synchronously from inside the session's control
/// flow, so implementations must not block.
///
/// [`Room`]: crate::Room
#[cfg_attr(test, mockall::automock)]
pub trait RoomPresenter {
    /// Participants or their media changed. Not called when only stats did.
    fn on_peers_changed(&self, peers: &[NormalizedPeer]);

    /// Remote track started being received and should be rendered.
    fn on_consumer_added(&self, track: &TrackKey, consumer: Rc<dyn Consumer>);

    /// Remote track is not received anymore and its rendering should be
    /// detached.
    fn on_consumer_closed(&self, track: &TrackKey);

    /// Loudest participant of the latest snapshot.
    fn on_active_speaker(&self, speaker: &ActiveSpeaker);

    /// Stream stats of the latest snapshot.
    fn on_stats(&self, peers: &Peers);

    /// Snapshot polling stopped because of the provided error.
    fn on_sync_failed(&self, error: &RpcError);

    /// Local participant left the session.
    fn on_session_closed(&self);
}
