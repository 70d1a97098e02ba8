//! Periodic reconciliation of local state with the authoritative session
//! snapshot.

use std::{cell::RefCell, rc::Rc, time::Duration};

use medea_sfu_api_proto::{ActiveSpeaker, Peers, SyncResponse};
use tracerr::Traced;

use crate::{
    consumer::ConsumerManager,
    platform,
    presenter::RoomPresenter,
    rpc::{RpcError, SignalingClient},
    snapshot::{self, NormalizedPeer},
    utils::{spawn_abortable, TaskHandle},
};

/// Latest session snapshot along with its normalized view.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    /// Participants of the latest snapshot.
    peers: Peers,

    /// Normalized [`SnapshotCache::peers`].
    normalized: Vec<NormalizedPeer>,

    /// Loudest participant of the latest snapshot.
    active_speaker: ActiveSpeaker,
}

impl SnapshotCache {
    /// Returns participants of the latest snapshot.
    #[inline]
    #[must_use]
    pub fn peers(&self) -> &Peers {
        &self.peers
    }

    /// Returns loudest participant of the latest snapshot.
    #[inline]
    #[must_use]
    pub fn active_speaker(&self) -> &ActiveSpeaker {
        &self.active_speaker
    }

    /// Stores the provided snapshot, returning the previous participants
    /// and the new normalized list, if it differs from the previous one.
    fn store(
        &mut self,
        snapshot: SyncResponse,
    ) -> (Peers, Option<Vec<NormalizedPeer>>) {
        let normalized = snapshot::normalize(&snapshot.peers);
        let changed = if normalized == self.normalized {
            None
        } else {
            self.normalized = normalized.clone();
            Some(normalized)
        };
        self.active_speaker = snapshot.active_speaker;
        (std::mem::replace(&mut self.peers, snapshot.peers), changed)
    }
}

/// Stores the provided snapshot in the [`SnapshotCache`] and presents it,
/// returning the previous and the new participants.
///
/// Active speaker and stats are always presented, while the participants
/// list only if its normalized view changed. [`RoomPresenter`] is never
/// called while the [`SnapshotCache`] is borrowed.
pub fn apply_snapshot(
    cache: &RefCell<SnapshotCache>,
    snapshot: SyncResponse,
    presenter: &dyn RoomPresenter,
) -> (Peers, Peers) {
    presenter.on_active_speaker(&snapshot.active_speaker);
    presenter.on_stats(&snapshot.peers);

    let next = snapshot.peers.clone();
    let (prev, changed) = cache.borrow_mut().store(snapshot);
    if let Some(peers) = changed {
        presenter.on_peers_changed(&peers);
    }
    (prev, next)
}

/// Loop polling session snapshots and reconciling [`ConsumerManager`] with
/// them.
///
/// Ticks never overlap: the next delay starts only after the previous tick
/// is fully applied.
pub struct ReconciliationLoop {
    signaling: Rc<dyn SignalingClient>,
    consumers: Rc<ConsumerManager>,
    presenter: Rc<dyn RoomPresenter>,
    interval: Duration,
    cache: RefCell<SnapshotCache>,
}

impl ReconciliationLoop {
    /// Creates a new [`ReconciliationLoop`] with an empty snapshot.
    #[must_use]
    pub fn new(
        signaling: Rc<dyn SignalingClient>,
        consumers: Rc<ConsumerManager>,
        presenter: Rc<dyn RoomPresenter>,
        interval: Duration,
    ) -> Self {
        Self {
            signaling,
            consumers,
            presenter,
            interval,
            cache: RefCell::default(),
        }
    }

    /// Returns participants of the latest snapshot.
    #[must_use]
    pub fn peers(&self) -> Peers {
        self.cache.borrow().peers().clone()
    }

    /// Returns loudest participant of the latest snapshot.
    #[must_use]
    pub fn active_speaker(&self) -> ActiveSpeaker {
        self.cache.borrow().active_speaker().clone()
    }

    /// Spawns the polling task.
    ///
    /// Polling stops on the first failed tick or once the returned
    /// [`TaskHandle`] is dropped.
    #[must_use]
    pub fn start(self: &Rc<Self>) -> TaskHandle {
        let this = Rc::downgrade(self);
        spawn_abortable(async move {
            loop {
                let interval = match this.upgrade() {
                    Some(this) => this.interval,
                    None => break,
                };
                platform::delay_for(interval).await;
                let this = match this.upgrade() {
                    Some(this) => this,
                    None => break,
                };
                if this.tick().await.is_err() {
                    break;
                }
            }
        })
    }

    /// Fetches a fresh snapshot and reconciles local state with it.
    ///
    /// # Errors
    ///
    /// If the snapshot cannot be fetched. [`RoomPresenter::on_sync_failed()`]
    /// is notified then.
    pub async fn tick(&self) -> Result<(), Traced<RpcError>> {
        let snapshot = match self.signaling.sync().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::error!("Polling stopped: {}", e);
                self.presenter.on_sync_failed(e.as_ref());
                return Err(tracerr::new!(e));
            }
        };
        let (prev, next) =
            apply_snapshot(&self.cache, snapshot, &*self.presenter);
        self.consumers.reconcile(&prev, &next);
        Ok(())
    }
}
