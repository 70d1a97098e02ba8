//! Transports of the media engine and media flowing through them.

use std::rc::Rc;

use async_trait::async_trait;
use derive_more::Display;
use futures::{channel::oneshot, stream::LocalBoxStream};
use medea_sfu_api_proto::{
    AppData, ConsumerId, ConsumerParameters, DtlsParameters, MediaKind,
    ProducerId, RtpParameters, TransportDirection, TransportId,
};
use serde::Serialize;
use tracerr::Traced;

use super::{Error, MediaStreamTrack};

/// Connection state of a [`Transport`].
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum ConnectionState {
    /// Transport is created, but no connection attempt was made yet.
    #[display(fmt = "new")]
    New,

    /// ICE/DTLS connection is being established.
    #[display(fmt = "connecting")]
    Connecting,

    /// Media may flow.
    #[display(fmt = "connected")]
    Connected,

    /// Connection was lost.
    #[display(fmt = "disconnected")]
    Disconnected,

    /// Connection couldn't be established or failed irrecoverably.
    #[display(fmt = "failed")]
    Failed,

    /// Transport is closed.
    #[display(fmt = "closed")]
    Closed,
}

impl ConnectionState {
    /// Indicates whether no media will ever flow in this state anymore.
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed | Self::Closed)
    }
}

/// Rejection of a [`TransportEvent`] by the application.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
#[display(fmt = "negotiation rejected: {}", _0)]
pub struct NegotiationError(pub String);

/// Request of a [`Transport`] that must be answered by the application before
/// the engine proceeds with its internal state transition.
///
/// Dropping the `reply` sender without answering is treated by the engine as
/// a rejection.
#[derive(Debug)]
pub enum TransportEvent {
    /// Engine needs the server to complete its half of the DTLS handshake.
    Connect {
        /// Local DTLS parameters.
        dtls_parameters: DtlsParameters,

        /// Continuation resolving the handshake.
        reply: oneshot::Sender<Result<(), NegotiationError>>,
    },

    /// Engine wants to start sending a new track and needs a server-side
    /// producer for it. Raised by outgoing [`Transport`]s only.
    Produce {
        /// Kind of the track.
        kind: MediaKind,

        /// RTP parameters of the local sender.
        rtp_parameters: RtpParameters,

        /// Application data the producer is created with.
        app_data: AppData,

        /// Continuation resolving with ID of the server-side producer.
        reply: oneshot::Sender<Result<ProducerId, NegotiationError>>,
    },
}

/// RTP encoding of a single simulcast layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpEncoding {
    /// Maximum bitrate of the layer in bits per second.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_bitrate: Option<u32>,

    /// Factor the captured resolution is scaled down by.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale_resolution_down_by: Option<f64>,
}

/// Options of a new [`Producer`].
#[derive(Clone)]
pub struct ProduceOptions {
    /// Track to send.
    pub track: Rc<dyn MediaStreamTrack>,

    /// Simulcast layers to encode the track into. Single layer if empty.
    pub encodings: Vec<RtpEncoding>,

    /// Application data of the [`Producer`].
    pub app_data: AppData,
}

/// Secured channel multiplexing all [`Producer`]s or all [`Consumer`]s of a
/// single direction.
#[async_trait(?Send)]
pub trait Transport {
    /// Returns ID of the server-side counterpart of this [`Transport`].
    fn id(&self) -> TransportId;

    /// Returns [`TransportDirection`] of this [`Transport`].
    fn direction(&self) -> TransportDirection;

    /// Returns the current [`ConnectionState`] of this [`Transport`].
    fn connection_state(&self) -> ConnectionState;

    /// Returns a stream of [`ConnectionState`] changes.
    fn on_connection_state_change(
        &self,
    ) -> LocalBoxStream<'static, ConnectionState>;

    /// Returns a stream of [`TransportEvent`]s to be answered.
    ///
    /// Expected to be taken once, right after the [`Transport`] is created.
    fn on_negotiation(&self) -> LocalBoxStream<'static, TransportEvent>;

    /// Starts sending the provided track.
    ///
    /// Raises [`TransportEvent::Connect`] (on the first call) and
    /// [`TransportEvent::Produce`], and resolves once both are answered.
    ///
    /// # Errors
    ///
    /// If any of the raised [`TransportEvent`]s is rejected.
    async fn produce(
        &self,
        options: ProduceOptions,
    ) -> Result<Rc<dyn Producer>, Traced<Error>>;

    /// Starts receiving media of a server-side consumer.
    ///
    /// Raises [`TransportEvent::Connect`] on the first call.
    ///
    /// # Errors
    ///
    /// If the raised [`TransportEvent`] is rejected or the parameters are not
    /// supported.
    async fn consume(
        &self,
        params: ConsumerParameters,
        app_data: AppData,
    ) -> Result<Rc<dyn Consumer>, Traced<Error>>;

    /// Closes this [`Transport`] along with all its [`Producer`]s and
    /// [`Consumer`]s.
    fn close(&self);
}

/// Local sender of a single track.
#[async_trait(?Send)]
pub trait Producer {
    /// Returns ID of the server-side counterpart of this [`Producer`].
    fn id(&self) -> ProducerId;

    /// Returns [`MediaKind`] of this [`Producer`].
    fn kind(&self) -> MediaKind;

    /// Returns the track being sent, if any.
    fn track(&self) -> Option<Rc<dyn MediaStreamTrack>>;

    /// Indicates whether this [`Producer`] is paused locally.
    fn is_paused(&self) -> bool;

    /// Stops sending media without closing.
    fn pause(&self);

    /// Resumes sending media.
    fn resume(&self);

    /// Swaps the source track without renegotiating.
    ///
    /// # Errors
    ///
    /// If the provided track is incompatible.
    async fn replace_track(
        &self,
        track: Rc<dyn MediaStreamTrack>,
    ) -> Result<(), Traced<Error>>;

    /// Returns the highest simulcast layer being sent, if limited.
    fn max_spatial_layer(&self) -> Option<u8>;

    /// Limits the highest simulcast layer being sent.
    ///
    /// # Errors
    ///
    /// If there is no such layer.
    async fn set_max_spatial_layer(&self, layer: u8)
        -> Result<(), Traced<Error>>;

    /// Closes this [`Producer`] and stops its track.
    fn close(&self);
}

/// Local receiver of a single remote track.
pub trait Consumer {
    /// Returns ID of the server-side counterpart of this [`Consumer`].
    fn id(&self) -> ConsumerId;

    /// Returns ID of the remote producer being consumed.
    fn producer_id(&self) -> ProducerId;

    /// Returns [`MediaKind`] of this [`Consumer`].
    fn kind(&self) -> MediaKind;

    /// Returns the received track.
    fn track(&self) -> Rc<dyn MediaStreamTrack>;

    /// Indicates whether this [`Consumer`] is paused locally.
    fn is_paused(&self) -> bool;

    /// Stops rendering media without closing.
    fn pause(&self);

    /// Resumes rendering media.
    fn resume(&self);

    /// Closes this [`Consumer`].
    fn close(&self);
}
