//! In-memory collaborators of a [`Room`].


use std::{rc::Rc, time::Duration};

use medea_sfu_client::{
    proto::{MediaInfo, MediaTag, PeerInfo},
    Conf, Room,
};

pub use self::{
    engine::{FakeDevice, FakeEngine, FakeMediaDevices},
    presenter::{FakePresenter, Rendered},
    signaling::{Call, FakeSignaling},
};

/// Polling interval every test [`Room`] is configured with.
pub const POLLING_INTERVAL: Duration = Duration::from_secs(1);

/// [`Room`] along with all its fake collaborators.
pub struct World {
    pub room: Room,
    pub signaling: Rc<FakeSignaling>,
    pub device: Rc<FakeDevice>,
    pub media_devices: Rc<FakeMediaDevices>,
    pub presenter: Rc<FakePresenter>,
}

impl World {
    pub fn new() -> Self {
        Self::with_engine(FakeEngine::new())
    }

    pub fn with_engine(engine: FakeEngine) -> Self {
        let mut conf = Conf::default();
        conf.polling.interval = POLLING_INTERVAL;
        let signaling = Rc::new(FakeSignaling::new("local"));
        let media_devices = Rc::new(FakeMediaDevices::default());
        let presenter = Rc::new(FakePresenter::default());
        let room = Room::new(
            &conf,
            Rc::clone(&signaling) as _,
            &engine,
            Rc::clone(&media_devices) as _,
            Rc::clone(&presenter) as _,
        )
        .unwrap();
        Self {
            room,
            signaling,
            device: Rc::clone(&engine.device),
            media_devices,
            presenter,
        }
    }

    /// Lets exactly one more polling tick happen.
    pub async fn tick(&self) {
        tokio::time::sleep(POLLING_INTERVAL).await;
        settle().await;
    }
}

/// Lets every spawned task run until it's blocked.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Builds a participant transmitting the provided [`MediaTag`]s.
pub fn peer(join_ts: u64, tags: &[MediaTag]) -> PeerInfo {
    PeerInfo {
        join_ts,
        media: tags.iter().map(|t| (*t, MediaInfo::default())).collect(),
        ..PeerInfo::default()
    }
}
