//! Request/response signaling with the session-coordination service.

mod http;

use async_trait::async_trait;
use derive_more::Display;
use medea_sfu_api_proto::{
    AppData, ConsumerId, ConsumerParameters, DtlsParameters, LayerStats,
    MediaKind, MediaTag, PeerId, ProducerId, ResponseError, RtpCapabilities,
    RtpParameters, SyncResponse, TransportDirection, TransportId,
    TransportOptions,
};
use tracerr::Traced;

#[doc(inline)]
pub use self::http::HttpSignalingClient;

/// Errors of a [`SignalingClient`] call.
#[derive(Clone, Debug, Display, PartialEq)]
pub enum RpcError {
    /// Request couldn't be delivered or its response couldn't be read.
    #[display(fmt = "signaling request failed: {}", _0)]
    Transport(String),

    /// Server answered with an `error` field.
    #[display(fmt = "signaling server error: {}", _0)]
    Server(String),

    /// Request or response body doesn't match the protocol.
    #[display(fmt = "malformed signaling message: {}", _0)]
    Malformed(String),

    /// Configured signaling URL is invalid.
    #[display(fmt = "invalid signaling URL: {}", _0)]
    InvalidUrl(url::ParseError),
}

impl From<ResponseError> for RpcError {
    fn from(err: ResponseError) -> Self {
        match err {
            ResponseError::Server(reason) => Self::Server(reason),
            ResponseError::Malformed(reason) => Self::Malformed(reason),
        }
    }
}

impl From<url::ParseError> for RpcError {
    #[inline]
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err)
    }
}

/// Client of the signaling service, acting on behalf of a single local
/// participant.
///
/// Every call is a single request/response pair. No call is retried.
#[async_trait(?Send)]
pub trait SignalingClient {
    /// Returns [`PeerId`] of the local participant every request is sent on
    /// behalf of.
    fn peer_id(&self) -> PeerId;

    /// Announces the local participant to the session, returning RTP
    /// capabilities of the server-side router.
    async fn join(&self) -> Result<RtpCapabilities, Traced<RpcError>>;

    /// Notifies the server that the local participant leaves the session.
    async fn leave(&self) -> Result<(), Traced<RpcError>>;

    /// Sends a leave notification without waiting for it to be delivered.
    ///
    /// Used on teardown, when nothing can be awaited anymore.
    fn leave_beacon(&self);

    /// Requests the authoritative session snapshot.
    async fn sync(&self) -> Result<SyncResponse, Traced<RpcError>>;

    /// Creates a server-side transport of the provided direction.
    async fn create_transport(
        &self,
        direction: TransportDirection,
    ) -> Result<TransportOptions, Traced<RpcError>>;

    /// Completes the server half of a transport's DTLS handshake.
    async fn connect_transport(
        &self,
        transport_id: TransportId,
        dtls_parameters: DtlsParameters,
    ) -> Result<(), Traced<RpcError>>;

    /// Creates a server-side producer for a local track, returning its ID.
    async fn send_track(
        &self,
        transport_id: TransportId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
        paused: bool,
        app_data: AppData,
    ) -> Result<ProducerId, Traced<RpcError>>;

    /// Creates a server-side consumer of the provided remote media.
    async fn recv_track(
        &self,
        media_tag: MediaTag,
        media_peer_id: PeerId,
        rtp_capabilities: RtpCapabilities,
    ) -> Result<ConsumerParameters, Traced<RpcError>>;

    /// Pauses a server-side producer.
    async fn pause_producer(
        &self,
        producer_id: ProducerId,
    ) -> Result<(), Traced<RpcError>>;

    /// Resumes a server-side producer.
    async fn resume_producer(
        &self,
        producer_id: ProducerId,
    ) -> Result<(), Traced<RpcError>>;

    /// Pauses a server-side consumer.
    async fn pause_consumer(
        &self,
        consumer_id: ConsumerId,
    ) -> Result<(), Traced<RpcError>>;

    /// Resumes a server-side consumer.
    async fn resume_consumer(
        &self,
        consumer_id: ConsumerId,
    ) -> Result<(), Traced<RpcError>>;

    /// Closes a server-side producer.
    async fn close_producer(
        &self,
        producer_id: ProducerId,
    ) -> Result<(), Traced<RpcError>>;

    /// Closes a server-side consumer.
    async fn close_consumer(
        &self,
        consumer_id: ConsumerId,
    ) -> Result<(), Traced<RpcError>>;

    /// Closes a server-side transport along with everything created on it.
    async fn close_transport(
        &self,
        transport_id: TransportId,
    ) -> Result<(), Traced<RpcError>>;

    /// Selects the spatial layer a server-side consumer should forward.
    async fn set_consumer_preferred_layer(
        &self,
        consumer_id: ConsumerId,
        spatial_layer: u8,
    ) -> Result<(), Traced<RpcError>>;

    /// Fetches per-layer stats of a server-side producer.
    async fn producer_stats(
        &self,
        producer_id: ProducerId,
    ) -> Result<Vec<LayerStats>, Traced<RpcError>>;
}
