//! Signaling protocol of the polling SFU session client.
//!
//! Every operation is a single self-contained request/response pair sent as
//! an HTTP `POST` to the endpoint named by [`Request::ENDPOINT`]. A request
//! body is the JSON object of a [`Request`] with the `peerId` of the caller
//! added to it (see [`into_body()`]). A response body is either the
//! [`Request::Response`] payload or an object carrying an `error` field (see
//! [`parse_response()`]). There is no separate error channel.
//!
//! Payloads produced and consumed by the media engine itself
//! ([`RtpCapabilities`], [`DtlsParameters`], [`RtpParameters`] and the rest of
//! [`TransportOptions`]) are opaque to this protocol and are carried as raw
//! JSON.

#![forbid(non_ascii_idents, unsafe_code)]

pub mod snapshot;
pub mod stats;

use derive_more::{Display, From};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

#[doc(inline)]
pub use self::{
    snapshot::{ActiveSpeaker, ConsumerLayers, MediaInfo, PeerInfo, Peers},
    stats::{LayerStats, StreamStats},
};

/// ID of a conference participant.
#[derive(
    Clone,
    Debug,
    Deserialize,
    Display,
    Eq,
    From,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[from(forward)]
#[serde(transparent)]
pub struct PeerId(pub String);

/// ID of a server-side transport.
#[derive(
    Clone, Debug, Deserialize, Display, Eq, From, Hash, PartialEq, Serialize,
)]
#[from(forward)]
#[serde(transparent)]
pub struct TransportId(pub String);

/// ID of a server-side producer.
#[derive(
    Clone, Debug, Deserialize, Display, Eq, From, Hash, PartialEq, Serialize,
)]
#[from(forward)]
#[serde(transparent)]
pub struct ProducerId(pub String);

/// ID of a server-side consumer.
#[derive(
    Clone, Debug, Deserialize, Display, Eq, From, Hash, PartialEq, Serialize,
)]
#[from(forward)]
#[serde(transparent)]
pub struct ConsumerId(pub String);

/// Application-level label distinguishing simultaneous streams of a single
/// participant.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Display,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum MediaTag {
    /// Video of a camera.
    #[display(fmt = "cam-video")]
    CamVideo,

    /// Audio of a microphone captured together with a camera.
    #[display(fmt = "cam-audio")]
    CamAudio,

    /// Video of a captured display.
    #[display(fmt = "screen-video")]
    ScreenVideo,
}

impl MediaTag {
    /// All the known [`MediaTag`]s.
    pub const ALL: [Self; 3] =
        [Self::CamVideo, Self::CamAudio, Self::ScreenVideo];

    /// Returns [`MediaKind`] of the media labeled with this [`MediaTag`].
    #[inline]
    #[must_use]
    pub fn kind(self) -> MediaKind {
        match self {
            Self::CamAudio => MediaKind::Audio,
            Self::CamVideo | Self::ScreenVideo => MediaKind::Video,
        }
    }
}

/// Kind of a media track.
#[derive(
    Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Audio track.
    #[display(fmt = "audio")]
    Audio,

    /// Video track.
    #[display(fmt = "video")]
    Video,
}

/// Direction of a transport.
#[derive(
    Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TransportDirection {
    /// Outgoing transport carrying local producers.
    #[display(fmt = "send")]
    Send,

    /// Incoming transport carrying local consumers.
    #[display(fmt = "recv")]
    Recv,
}

/// RTP capabilities of a router or of a local device.
#[derive(Clone, Debug, Default, Deserialize, From, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RtpCapabilities(pub Value);

/// DTLS parameters of a local transport.
#[derive(Clone, Debug, Default, Deserialize, From, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DtlsParameters(pub Value);

/// RTP parameters of a producer or a consumer.
#[derive(Clone, Debug, Default, Deserialize, From, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RtpParameters(pub Value);

/// Options a local transport is created with.
///
/// Everything except the [`TransportId`] is passed to the media engine
/// untouched.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TransportOptions {
    /// ID of the server-side transport.
    pub id: TransportId,

    /// ICE and DTLS parameters of the server-side transport.
    #[serde(flatten)]
    pub params: serde_json::Map<String, Value>,
}

/// Parameters of a server-side consumer which a local consumer is created
/// from.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerParameters {
    /// ID of the server-side consumer.
    pub id: ConsumerId,

    /// ID of the remote producer being consumed.
    pub producer_id: ProducerId,

    /// [`MediaKind`] of the consumed media.
    pub kind: MediaKind,

    /// [`RtpParameters`] of the server-side consumer.
    pub rtp_parameters: RtpParameters,

    /// Type of the server-side consumer (`simple`, `simulcast`, ...).
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub consumer_type: Option<String>,

    /// Indicator whether the remote producer is paused.
    #[serde(default)]
    pub producer_paused: bool,
}

/// Application data attached to producers and consumers.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppData {
    /// [`MediaTag`] of the media.
    pub media_tag: MediaTag,

    /// Owner of the media. Set for consumers only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<PeerId>,
}

/// Single signaling operation.
pub trait Request: Serialize {
    /// Endpoint name of this operation.
    const ENDPOINT: &'static str;

    /// Payload of a successful response.
    type Response: DeserializeOwned;
}

/// Empty successful response.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Ack {}

/// Declares request structs along with their endpoints and response types.
macro_rules! requests {
    ($(
        $(#[$meta:meta])*
        $endpoint:literal => $name:ident {
            $(
                $(#[$fmeta:meta])*
                $field:ident: $ty:ty,
            )*
        } -> $resp:ty;
    )*) => {$(
        $(#[$meta])*
        #[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $name {
            $(
                $(#[$fmeta])*
                pub $field: $ty,
            )*
        }

        impl Request for $name {
            const ENDPOINT: &'static str = $endpoint;
            type Response = $resp;
        }
    )*};
}

requests! {
    /// Announces the caller as a new participant.
    "join-as-new-peer" => JoinAsNewPeer {} -> JoinResponse;

    /// Requests the authoritative session snapshot.
    "sync" => SyncState {} -> SyncResponse;

    /// Creates a server-side transport.
    "create-transport" => CreateTransport {
        /// Direction of the transport.
        direction: TransportDirection,
    } -> CreateTransportResponse;

    /// Completes the server half of the DTLS handshake.
    "connect-transport" => ConnectTransport {
        /// ID of the transport to connect.
        transport_id: TransportId,
        /// Local DTLS parameters.
        dtls_parameters: DtlsParameters,
    } -> Ack;

    /// Creates a server-side producer for a local track.
    "send-track" => SendTrack {
        /// ID of the outgoing transport.
        transport_id: TransportId,
        /// Kind of the track.
        kind: MediaKind,
        /// RTP parameters of the local sender.
        rtp_parameters: RtpParameters,
        /// Whether the producer is created paused.
        paused: bool,
        /// Application data of the producer.
        app_data: AppData,
    } -> SendTrackResponse;

    /// Creates a server-side consumer of a remote producer.
    "recv-track" => RecvTrack {
        /// Tag of the remote media.
        media_tag: MediaTag,
        /// Owner of the remote media.
        media_peer_id: PeerId,
        /// Receive capabilities of the local device.
        rtp_capabilities: RtpCapabilities,
    } -> ConsumerParameters;

    /// Pauses a server-side producer.
    "pause-producer" => PauseProducer {
        /// ID of the producer.
        producer_id: ProducerId,
    } -> Ack;

    /// Resumes a server-side producer.
    "resume-producer" => ResumeProducer {
        /// ID of the producer.
        producer_id: ProducerId,
    } -> Ack;

    /// Pauses a server-side consumer.
    "pause-consumer" => PauseConsumer {
        /// ID of the consumer.
        consumer_id: ConsumerId,
    } -> Ack;

    /// Resumes a server-side consumer.
    "resume-consumer" => ResumeConsumer {
        /// ID of the consumer.
        consumer_id: ConsumerId,
    } -> Ack;

    /// Closes a server-side producer.
    "close-producer" => CloseProducer {
        /// ID of the producer.
        producer_id: ProducerId,
    } -> Ack;

    /// Closes a server-side consumer.
    "close-consumer" => CloseConsumer {
        /// ID of the consumer.
        consumer_id: ConsumerId,
    } -> Ack;

    /// Closes a server-side transport along with every producer and consumer
    /// on it.
    "close-transport" => CloseTransport {
        /// ID of the transport.
        transport_id: TransportId,
    } -> Ack;

    /// Fetches RTP stats of a server-side producer.
    "producer-stats" => GetProducerStats {
        /// ID of the producer.
        producer_id: ProducerId,
    } -> Vec<LayerStats>;

    /// Sets the preferred spatial layer of a server-side consumer.
    "consumer-set-layers" => ConsumerSetLayers {
        /// ID of the consumer.
        consumer_id: ConsumerId,
        /// Index of the preferred spatial layer.
        spatial_layer: u8,
    } -> Ack;

    /// Announces the caller leaving.
    "leave" => Leave {} -> Ack;
}

/// Response to [`JoinAsNewPeer`].
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    /// RTP capabilities of the server-side router.
    pub router_rtp_capabilities: RtpCapabilities,
}

/// Response to [`SyncState`].
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    /// Every participant currently in the session.
    #[serde(default)]
    pub peers: Peers,

    /// Participant currently speaking loudest.
    #[serde(default)]
    pub active_speaker: ActiveSpeaker,
}

/// Response to [`CreateTransport`].
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransportResponse {
    /// Options to create the local transport with.
    pub transport_options: TransportOptions,
}

/// Response to [`SendTrack`].
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SendTrackResponse {
    /// ID of the created server-side producer.
    pub id: ProducerId,
}

/// Failure reported by a server in place of a response payload.
#[derive(Clone, Debug, Display, PartialEq)]
pub enum ResponseError {
    /// Response carried an `error` field.
    #[display(fmt = "server error: {}", _0)]
    Server(String),

    /// Response couldn't be decoded into the expected payload.
    #[display(fmt = "malformed response: {}", _0)]
    Malformed(String),
}

/// Builds a request body out of the provided [`Request`], adding the caller's
/// [`PeerId`] to it.
///
/// # Errors
///
/// If the [`Request`] cannot be serialized into JSON.
pub fn into_body<R: Request>(
    request: &R,
    peer_id: &PeerId,
) -> Result<Value, serde_json::Error> {
    let mut body = serde_json::to_value(request)?;
    if let Value::Object(fields) = &mut body {
        fields.insert("peerId".to_owned(), Value::String(peer_id.0.clone()));
    }
    Ok(body)
}

/// Parses a response body of the provided [`Request`].
///
/// # Errors
///
/// With [`ResponseError::Server`] if the body carries a non-null `error`
/// field.
///
/// With [`ResponseError::Malformed`] if the body doesn't match
/// [`Request::Response`].
pub fn parse_response<R: Request>(
    body: Value,
) -> Result<R::Response, ResponseError> {
    if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
        let reason = match error {
            Value::String(reason) => reason.clone(),
            other => other.to_string(),
        };
        return Err(ResponseError::Server(reason));
    }
    serde_json::from_value(body)
        .map_err(|e| ResponseError::Malformed(e.to_string()))
}
