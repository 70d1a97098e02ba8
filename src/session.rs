//! State of the local participant and of a single joined session.

use std::{cell::Cell, rc::Rc, time::Duration};

use futures::{channel::mpsc, StreamExt as _};
use medea_sfu_api_proto::PeerId;
use uuid::Uuid;

use crate::{
    consumer::ConsumerManager,
    platform::{Device, MediaDevices},
    presenter::RoomPresenter,
    producer::{PauseIntents, ProducerManager},
    rpc::SignalingClient,
    sync::ReconciliationLoop,
    transport::{TransportFailure, TransportManager},
    utils::{spawn_abortable, TaskHandle},
};

/// Generates a new random identity of the local participant.
#[must_use]
pub fn new_local_peer_id() -> PeerId {
    PeerId(Uuid::new_v4().to_string())
}

/// Process-lifetime record of the local participant.
pub struct SessionState {
    /// Identity of the local participant.
    peer_id: PeerId,

    /// Indicator whether a session is joined.
    joined: Cell<bool>,

    /// Local media engine endpoint. Loaded on the first join.
    device: Rc<dyn Device>,
}

impl SessionState {
    /// Creates a new not joined [`SessionState`].
    #[must_use]
    pub fn new(peer_id: PeerId, device: Rc<dyn Device>) -> Self {
        Self {
            peer_id,
            joined: Cell::new(false),
            device,
        }
    }

    /// Returns identity of the local participant.
    #[inline]
    #[must_use]
    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    /// Indicates whether a session is joined.
    #[inline]
    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.joined.get()
    }

    #[inline]
    pub(crate) fn set_joined(&self, joined: bool) {
        self.joined.set(joined);
    }

    /// Returns the local media engine endpoint.
    #[inline]
    #[must_use]
    pub fn device(&self) -> &Rc<dyn Device> {
        &self.device
    }
}

/// Collaborators shared by every [`SessionContext`].
pub struct Collaborators {
    /// Signaling service client.
    pub signaling: Rc<dyn SignalingClient>,

    /// Local media engine endpoint.
    pub device: Rc<dyn Device>,

    /// Local capture devices.
    pub media_devices: Rc<dyn MediaDevices>,

    /// Rendering side.
    pub presenter: Rc<dyn RoomPresenter>,

    /// Pause intents of the local operator.
    pub intents: Rc<PauseIntents>,
}

/// Everything living exactly as long as a single joined session.
pub struct SessionContext {
    /// Outgoing and incoming transports.
    pub transports: Rc<TransportManager>,

    /// Local outgoing media.
    pub producers: Rc<ProducerManager>,

    /// Received remote media.
    pub consumers: Rc<ConsumerManager>,

    /// Snapshot polling.
    pub sync: Rc<ReconciliationLoop>,

    /// Running polling task.
    polling: TaskHandle,

    /// Task reacting on [`TransportFailure`]s.
    failure_watcher: TaskHandle,
}

impl SessionContext {
    /// Creates a new [`SessionContext`] and starts polling.
    ///
    /// The provided callback is invoked on the first [`TransportFailure`].
    pub fn start<F>(
        deps: &Collaborators,
        polling_interval: Duration,
        on_failure: F,
    ) -> Self
    where
        F: FnOnce(TransportFailure) + 'static,
    {
        let (failures_tx, mut failures_rx) = mpsc::unbounded();
        let transports = Rc::new(TransportManager::new(
            Rc::clone(&deps.signaling),
            Rc::clone(&deps.device),
            Rc::clone(&deps.intents),
            failures_tx,
        ));
        let producers = Rc::new(ProducerManager::new(
            Rc::clone(&deps.signaling),
            Rc::clone(&deps.media_devices),
            Rc::clone(&transports),
            Rc::clone(&deps.intents),
        ));
        let consumers = Rc::new(ConsumerManager::new(
            Rc::clone(&deps.signaling),
            Rc::clone(&deps.device),
            Rc::clone(&transports),
            Rc::clone(&deps.presenter),
        ));
        let sync = Rc::new(ReconciliationLoop::new(
            Rc::clone(&deps.signaling),
            Rc::clone(&consumers),
            Rc::clone(&deps.presenter),
            polling_interval,
        ));
        let polling = sync.start();
        let failure_watcher = spawn_abortable(async move {
            if let Some(failure) = failures_rx.next().await {
                on_failure(failure);
            }
        });

        Self {
            transports,
            producers,
            consumers,
            sync,
            polling,
            failure_watcher,
        }
    }

    /// Stops polling and closes everything locally.
    ///
    /// Closing the transports closes every producer and consumer on them.
    pub fn close(self) {
        drop(self.polling);
        drop(self.failure_watcher);
        self.transports.close_all();
        self.producers.clear();
        self.consumers.clear();
    }
}
