use std::rc::Rc;

use async_trait::async_trait;
use medea_sfu_api_proto::{RtpCapabilities, TransportOptions};
use tracerr::Traced;

use super::{Error, Transport};

/// Factory of [`Device`]s.
pub trait MediaEngine {
    /// Creates a new [`Device`].
    ///
    /// # Errors
    ///
    /// With an [`Error::is_unsupported()`] error if the engine cannot work in
    /// the current environment.
    fn create_device(&self) -> Result<Rc<dyn Device>, Traced<Error>>;
}

/// Local endpoint of the media engine, holding its media capabilities.
#[async_trait(?Send)]
pub trait Device {
    /// Indicates whether [`Device::load()`] has completed already.
    fn is_loaded(&self) -> bool;

    /// Loads this [`Device`] with RTP capabilities of a server-side router.
    ///
    /// # Errors
    ///
    /// If the capabilities are not compatible with the engine.
    async fn load(
        &self,
        router_capabilities: RtpCapabilities,
    ) -> Result<(), Traced<Error>>;

    /// Returns receive capabilities of this loaded [`Device`].
    fn rtp_capabilities(&self) -> RtpCapabilities;

    /// Creates a new outgoing [`Transport`].
    ///
    /// # Errors
    ///
    /// If the engine rejects the provided [`TransportOptions`].
    fn create_send_transport(
        &self,
        options: TransportOptions,
    ) -> Result<Rc<dyn Transport>, Traced<Error>>;

    /// Creates a new incoming [`Transport`].
    ///
    /// # Errors
    ///
    /// If the engine rejects the provided [`TransportOptions`].
    fn create_recv_transport(
        &self,
        options: TransportOptions,
    ) -> Result<Rc<dyn Transport>, Traced<Error>>;
}
