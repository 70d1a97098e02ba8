//! Signaling service settings.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// Signaling service settings.
#[derive(Clone, Debug, Deserialize, Serialize, SmartDefault)]
#[serde(default)]
pub struct Signaling {
    /// Base URL of the signaling service. Must end with `/` if it has a
    /// path. Defaults to `http://127.0.0.1:3001/`.
    #[default("http://127.0.0.1:3001/")]
    pub base_url: Cow<'static, str>,

    /// Path under [`Signaling::base_url`] that every endpoint is mounted at.
    /// Defaults to `signaling`.
    #[default("signaling")]
    pub path_prefix: Cow<'static, str>,
}
