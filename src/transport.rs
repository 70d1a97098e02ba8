//! Lifecycle and negotiation of the outgoing and incoming [`Transport`]s.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use derive_more::{Display, From};
use futures::{
    channel::mpsc, lock::Mutex, stream::LocalBoxStream, StreamExt as _,
};
use medea_reactive::ObservableCell;
use medea_sfu_api_proto::{TransportDirection, TransportId};
use tracerr::Traced;

use crate::{
    platform::{
        self, ConnectionState, Device, NegotiationError, Transport,
        TransportEvent,
    },
    producer::PauseIntents,
    rpc::{RpcError, SignalingClient},
    utils::{spawn_abortable, TaskHandle},
};

/// Errors of [`TransportManager`] operations.
#[derive(Clone, Debug, Display, From)]
pub enum TransportError {
    /// Signaling call failed.
    #[display(fmt = "{}", _0)]
    Rpc(RpcError),

    /// Media engine refused to create a [`Transport`].
    #[display(fmt = "media engine error: {}", _0)]
    Platform(platform::Error),

    /// [`Transport`] reached a terminal state before getting connected.
    #[display(fmt = "transport is {}", _0)]
    Terminated(ConnectionState),

    /// [`Transport`] was dropped while being waited on.
    #[display(fmt = "transport is gone")]
    #[from(ignore)]
    Gone,
}

/// Unexpected transition of a [`Transport`] into a terminal
/// [`ConnectionState`].
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
#[display(fmt = "{} transport is {}", direction, state)]
pub struct TransportFailure {
    /// Direction of the failed [`Transport`].
    pub direction: TransportDirection,

    /// Terminal state the [`Transport`] reached.
    pub state: ConnectionState,
}

/// [`Transport`] with its negotiation handled and its connection state
/// observed.
pub struct ManagedTransport {
    /// Underlying engine [`Transport`].
    transport: Rc<dyn Transport>,

    /// Last reported [`ConnectionState`].
    state: Rc<ObservableCell<ConnectionState>>,

    /// Indicator whether [`ManagedTransport::close()`] was called.
    closed_locally: Rc<Cell<bool>>,

    /// Task answering [`TransportEvent`]s.
    _negotiation: TaskHandle,

    /// Task propagating [`ConnectionState`] changes.
    _state_watcher: TaskHandle,
}

impl ManagedTransport {
    /// Wraps the provided [`Transport`], spawning its negotiation and state
    /// watching tasks.
    fn new(
        transport: Rc<dyn Transport>,
        signaling: Rc<dyn SignalingClient>,
        intents: Rc<PauseIntents>,
        failures: mpsc::UnboundedSender<TransportFailure>,
    ) -> Self {
        let state = Rc::new(ObservableCell::new(transport.connection_state()));
        let closed_locally = Rc::new(Cell::new(false));

        let negotiation = spawn_abortable(negotiate(
            transport.on_negotiation(),
            transport.id(),
            transport.direction(),
            signaling,
            intents,
        ));
        let state_watcher = spawn_abortable(watch_state(
            transport.on_connection_state_change(),
            transport.direction(),
            Rc::clone(&state),
            Rc::clone(&closed_locally),
            failures,
        ));

        Self {
            transport,
            state,
            closed_locally,
            _negotiation: negotiation,
            _state_watcher: state_watcher,
        }
    }

    /// Returns ID of this [`ManagedTransport`].
    #[inline]
    #[must_use]
    pub fn id(&self) -> TransportId {
        self.transport.id()
    }

    /// Returns [`TransportDirection`] of this [`ManagedTransport`].
    #[inline]
    #[must_use]
    pub fn direction(&self) -> TransportDirection {
        self.transport.direction()
    }

    /// Returns the underlying engine [`Transport`].
    #[inline]
    #[must_use]
    pub fn inner(&self) -> &Rc<dyn Transport> {
        &self.transport
    }

    /// Returns the last reported [`ConnectionState`].
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Resolves once this [`ManagedTransport`] is connected.
    ///
    /// Resolves immediately if it's connected already.
    ///
    /// # Errors
    ///
    /// With [`TransportError::Terminated`] if a terminal [`ConnectionState`]
    /// is reached first.
    ///
    /// With [`TransportError::Gone`] if this [`ManagedTransport`] is dropped
    /// meanwhile.
    pub async fn wait_connected(&self) -> Result<(), Traced<TransportError>> {
        self.state
            .when(|s| *s == ConnectionState::Connected || s.is_terminal())
            .await
            .map_err(|_| tracerr::new!(TransportError::Gone))?;
        match self.state.get() {
            ConnectionState::Connected => Ok(()),
            state => Err(tracerr::new!(TransportError::Terminated(state))),
        }
    }

    /// Closes this [`ManagedTransport`], so its terminal state is not
    /// reported as a [`TransportFailure`].
    pub fn close(&self) {
        self.closed_locally.set(true);
        self.transport.close();
        self.state.set(ConnectionState::Closed);
    }
}

/// Answers [`TransportEvent`]s of a single [`Transport`] via the provided
/// [`SignalingClient`].
async fn negotiate(
    mut events: LocalBoxStream<'static, TransportEvent>,
    transport_id: TransportId,
    direction: TransportDirection,
    signaling: Rc<dyn SignalingClient>,
    intents: Rc<PauseIntents>,
) {
    while let Some(event) = events.next().await {
        match event {
            TransportEvent::Connect {
                dtls_parameters,
                reply,
            } => {
                log::debug!(
                    "Connecting {} transport {}",
                    direction,
                    transport_id,
                );
                let result = signaling
                    .connect_transport(transport_id.clone(), dtls_parameters)
                    .await
                    .map_err(|e| {
                        log::error!(
                            "Failed to connect transport {}: {}",
                            transport_id,
                            e,
                        );
                        NegotiationError(e.to_string())
                    });
                let _ = reply.send(result);
            }
            TransportEvent::Produce {
                kind,
                rtp_parameters,
                app_data,
                reply,
            } => {
                if direction != TransportDirection::Send {
                    log::error!(
                        "Produce requested on {} transport {}",
                        direction,
                        transport_id,
                    );
                    let _ = reply.send(Err(NegotiationError(
                        "cannot produce on an incoming transport".to_owned(),
                    )));
                    continue;
                }
                // Server must create the producer in the state the local
                // operator already chose.
                let paused = intents.is_paused(app_data.media_tag);
                log::debug!(
                    "Sending {} track {} (paused: {})",
                    kind,
                    app_data.media_tag,
                    paused,
                );
                let result = signaling
                    .send_track(
                        transport_id.clone(),
                        kind,
                        rtp_parameters,
                        paused,
                        app_data,
                    )
                    .await
                    .map_err(|e| {
                        log::error!("Failed to send track: {}", e);
                        NegotiationError(e.to_string())
                    });
                let _ = reply.send(result);
            }
        }
    }
}

/// Mirrors [`ConnectionState`] changes into the provided [`ObservableCell`],
/// reporting a [`TransportFailure`] on a terminal state not caused by a local
/// close.
async fn watch_state(
    mut changes: LocalBoxStream<'static, ConnectionState>,
    direction: TransportDirection,
    state: Rc<ObservableCell<ConnectionState>>,
    closed_locally: Rc<Cell<bool>>,
    failures: mpsc::UnboundedSender<TransportFailure>,
) {
    while let Some(new_state) = changes.next().await {
        log::debug!("{} transport state: {}", direction, new_state);
        state.set(new_state);
        if new_state.is_terminal() {
            if !closed_locally.get() {
                let _ = failures.unbounded_send(TransportFailure {
                    direction,
                    state: new_state,
                });
            }
            break;
        }
    }
}

/// Single direction's [`ManagedTransport`] slot.
#[derive(Default)]
struct Slot {
    /// Live [`ManagedTransport`], if any.
    transport: RefCell<Option<Rc<ManagedTransport>>>,

    /// Serializes creation, so at most one [`Transport`] exists.
    creation: Mutex<()>,
}

/// Owner of at most one outgoing and at most one incoming
/// [`ManagedTransport`].
pub struct TransportManager {
    signaling: Rc<dyn SignalingClient>,
    device: Rc<dyn Device>,
    intents: Rc<PauseIntents>,
    failures: mpsc::UnboundedSender<TransportFailure>,
    send: Slot,
    recv: Slot,
}

impl TransportManager {
    /// Creates a new [`TransportManager`] reporting [`TransportFailure`]s to
    /// the provided sender.
    #[must_use]
    pub fn new(
        signaling: Rc<dyn SignalingClient>,
        device: Rc<dyn Device>,
        intents: Rc<PauseIntents>,
        failures: mpsc::UnboundedSender<TransportFailure>,
    ) -> Self {
        Self {
            signaling,
            device,
            intents,
            failures,
            send: Slot::default(),
            recv: Slot::default(),
        }
    }

    fn slot(&self, direction: TransportDirection) -> &Slot {
        match direction {
            TransportDirection::Send => &self.send,
            TransportDirection::Recv => &self.recv,
        }
    }

    /// Returns the live [`ManagedTransport`] of the provided direction.
    #[must_use]
    pub fn get(
        &self,
        direction: TransportDirection,
    ) -> Option<Rc<ManagedTransport>> {
        self.slot(direction).transport.borrow().clone()
    }

    /// Returns the live [`ManagedTransport`] of the provided direction,
    /// creating it if there is none.
    ///
    /// # Errors
    ///
    /// If the server or the media engine fails to create it.
    pub async fn get_or_create(
        &self,
        direction: TransportDirection,
    ) -> Result<Rc<ManagedTransport>, Traced<TransportError>> {
        let slot = self.slot(direction);
        let _guard = slot.creation.lock().await;
        if let Some(transport) = self.get(direction) {
            return Ok(transport);
        }

        log::info!("Creating {} transport", direction);
        let options = self
            .signaling
            .create_transport(direction)
            .await
            .map_err(tracerr::map_from_and_wrap!())?;
        let transport = match direction {
            TransportDirection::Send => {
                self.device.create_send_transport(options)
            }
            TransportDirection::Recv => {
                self.device.create_recv_transport(options)
            }
        }
        .map_err(tracerr::map_from_and_wrap!())?;

        let managed = Rc::new(ManagedTransport::new(
            transport,
            Rc::clone(&self.signaling),
            Rc::clone(&self.intents),
            self.failures.clone(),
        ));
        slot.transport.replace(Some(Rc::clone(&managed)));
        Ok(managed)
    }

    /// Closes the [`ManagedTransport`] of the provided direction locally,
    /// returning it.
    pub fn close(
        &self,
        direction: TransportDirection,
    ) -> Option<Rc<ManagedTransport>> {
        let transport = self.slot(direction).transport.borrow_mut().take();
        if let Some(transport) = &transport {
            transport.close();
        }
        transport
    }

    /// Closes both [`ManagedTransport`]s locally.
    pub fn close_all(&self) {
        drop(self.close(TransportDirection::Send));
        drop(self.close(TransportDirection::Recv));
    }
}

impl Drop for TransportManager {
    fn drop(&mut self) {
        self.close_all();
    }
}
