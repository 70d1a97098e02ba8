//! [`SignalingClient`] over HTTP.

use async_trait::async_trait;
use medea_sfu_api_proto::{
    self as proto, AppData, CloseConsumer, CloseProducer, CloseTransport,
    ConnectTransport, ConsumerId, ConsumerParameters, ConsumerSetLayers,
    CreateTransport, DtlsParameters, GetProducerStats, JoinAsNewPeer,
    LayerStats, Leave, MediaKind, MediaTag, PauseConsumer, PauseProducer,
    PeerId, ProducerId, RecvTrack, Request, ResumeConsumer, ResumeProducer,
    RtpCapabilities, RtpParameters, SendTrack, SyncResponse, SyncState,
    TransportDirection, TransportId, TransportOptions,
};
use serde_json::Value;
use tracerr::Traced;
use url::Url;

use crate::{conf, platform};

use super::{RpcError, SignalingClient};

/// [`SignalingClient`] sending every request as a JSON `POST` to
/// `{base_url}/{path_prefix}/{endpoint}`.
#[derive(Clone, Debug)]
pub struct HttpSignalingClient {
    /// Underlying HTTP client.
    client: reqwest::Client,

    /// URL every endpoint name is resolved against.
    base: Url,

    /// Local participant.
    peer_id: PeerId,
}

impl HttpSignalingClient {
    /// Creates a new [`HttpSignalingClient`] acting on behalf of the provided
    /// [`PeerId`].
    ///
    /// # Errors
    ///
    /// With [`RpcError::InvalidUrl`] if the configured URL cannot be parsed.
    pub fn new(
        conf: &conf::Signaling,
        peer_id: PeerId,
    ) -> Result<Self, Traced<RpcError>> {
        let mut base_url = conf.base_url.to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let mut base =
            Url::parse(&base_url).map_err(tracerr::from_and_wrap!())?;
        let prefix = conf.path_prefix.trim_matches('/');
        if !prefix.is_empty() {
            base = base
                .join(&format!("{}/", prefix))
                .map_err(tracerr::from_and_wrap!())?;
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base,
            peer_id,
        })
    }

    /// Returns the [`Url`] of the provided endpoint.
    fn endpoint(&self, name: &str) -> Result<Url, Traced<RpcError>> {
        self.base.join(name).map_err(tracerr::from_and_wrap!())
    }

    /// Sends the provided [`Request`] and parses its response.
    async fn call<R: Request>(
        &self,
        request: R,
    ) -> Result<R::Response, Traced<RpcError>> {
        let url = self.endpoint(R::ENDPOINT)?;
        let body = proto::into_body(&request, &self.peer_id)
            .map_err(|e| tracerr::new!(RpcError::Malformed(e.to_string())))?;

        log::debug!("-> {}", R::ENDPOINT);
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| tracerr::new!(RpcError::Transport(e.to_string())))?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| tracerr::new!(RpcError::Malformed(e.to_string())))?;

        proto::parse_response::<R>(body).map_err(tracerr::from_and_wrap!())
    }
}

#[async_trait(?Send)]
impl SignalingClient for HttpSignalingClient {
    fn peer_id(&self) -> PeerId {
        self.peer_id.clone()
    }

    async fn join(&self) -> Result<RtpCapabilities, Traced<RpcError>> {
        Ok(self.call(JoinAsNewPeer {}).await?.router_rtp_capabilities)
    }

    async fn leave(&self) -> Result<(), Traced<RpcError>> {
        self.call(Leave {}).await.map(drop)
    }

    fn leave_beacon(&self) {
        let this = self.clone();
        platform::spawn(async move {
            if let Err(e) = this.call(Leave {}).await {
                log::debug!("Leave beacon was not delivered: {}", e);
            }
        });
    }

    async fn sync(&self) -> Result<SyncResponse, Traced<RpcError>> {
        self.call(SyncState {}).await
    }

    async fn create_transport(
        &self,
        direction: TransportDirection,
    ) -> Result<TransportOptions, Traced<RpcError>> {
        Ok(self
            .call(CreateTransport { direction })
            .await?
            .transport_options)
    }

    async fn connect_transport(
        &self,
        transport_id: TransportId,
        dtls_parameters: DtlsParameters,
    ) -> Result<(), Traced<RpcError>> {
        self.call(ConnectTransport {
            transport_id,
            dtls_parameters,
        })
        .await
        .map(drop)
    }

    async fn send_track(
        &self,
        transport_id: TransportId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
        paused: bool,
        app_data: AppData,
    ) -> Result<ProducerId, Traced<RpcError>> {
        let response = self
            .call(SendTrack {
                transport_id,
                kind,
                rtp_parameters,
                paused,
                app_data,
            })
            .await?;
        Ok(response.id)
    }

    async fn recv_track(
        &self,
        media_tag: MediaTag,
        media_peer_id: PeerId,
        rtp_capabilities: RtpCapabilities,
    ) -> Result<ConsumerParameters, Traced<RpcError>> {
        self.call(RecvTrack {
            media_tag,
            media_peer_id,
            rtp_capabilities,
        })
        .await
    }

    async fn pause_producer(
        &self,
        producer_id: ProducerId,
    ) -> Result<(), Traced<RpcError>> {
        self.call(PauseProducer { producer_id }).await.map(drop)
    }

    async fn resume_producer(
        &self,
        producer_id: ProducerId,
    ) -> Result<(), Traced<RpcError>> {
        self.call(ResumeProducer { producer_id }).await.map(drop)
    }

    async fn pause_consumer(
        &self,
        consumer_id: ConsumerId,
    ) -> Result<(), Traced<RpcError>> {
        self.call(PauseConsumer { consumer_id }).await.map(drop)
    }

    async fn resume_consumer(
        &self,
        consumer_id: ConsumerId,
    ) -> Result<(), Traced<RpcError>> {
        self.call(ResumeConsumer { consumer_id }).await.map(drop)
    }

    async fn close_producer(
        &self,
        producer_id: ProducerId,
    ) -> Result<(), Traced<RpcError>> {
        self.call(CloseProducer { producer_id }).await.map(drop)
    }

    async fn close_consumer(
        &self,
        consumer_id: ConsumerId,
    ) -> Result<(), Traced<RpcError>> {
        self.call(CloseConsumer { consumer_id }).await.map(drop)
    }

    async fn close_transport(
        &self,
        transport_id: TransportId,
    ) -> Result<(), Traced<RpcError>> {
        self.call(CloseTransport { transport_id }).await.map(drop)
    }

    async fn set_consumer_preferred_layer(
        &self,
        consumer_id: ConsumerId,
        spatial_layer: u8,
    ) -> Result<(), Traced<RpcError>> {
        self.call(ConsumerSetLayers {
            consumer_id,
            spatial_layer,
        })
        .await
        .map(drop)
    }

    async fn producer_stats(
        &self,
        producer_id: ProducerId,
    ) -> Result<Vec<LayerStats>, Traced<RpcError>> {
        self.call(GetProducerStats { producer_id }).await
    }
}
