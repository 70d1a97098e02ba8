//! Session snapshot polling settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// Session snapshot polling settings.
#[derive(Clone, Debug, Deserialize, Serialize, SmartDefault)]
#[serde(default)]
pub struct Polling {
    /// Delay between two consecutive snapshot requests. Defaults to `1s`.
    #[default(Duration::from_secs(1))]
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}
