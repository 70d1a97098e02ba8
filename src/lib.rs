//! Client session layer of an SFU-mediated conference.
//!
//! Keeps local outgoing media ([`producer`]), received remote media
//! ([`consumer`]) and the media [`transport`]s they flow through consistent
//! with the session snapshot the signaling service reports, which is polled
//! by the [`sync`] loop. Everything is driven through a [`Room`].
//!
//! The crate is single-threaded: it must run inside a
//! [`tokio::task::LocalSet`].

#![allow(clippy::module_name_repetitions, clippy::must_use_candidate)]
#![forbid(non_ascii_idents, unsafe_code)]

#[macro_use]
pub mod utils;
pub mod conf;
pub mod consumer;
pub mod platform;
pub mod presenter;
pub mod producer;
pub mod room;
pub mod rpc;
pub mod session;
pub mod snapshot;
pub mod sync;
pub mod transport;

#[doc(inline)]
pub use self::{
    conf::Conf,
    consumer::TrackKey,
    presenter::RoomPresenter,
    room::{Room, RoomError},
    rpc::{HttpSignalingClient, RpcError, SignalingClient},
};

#[doc(no_inline)]
pub use medea_sfu_api_proto as proto;
