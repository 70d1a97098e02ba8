//! RTP stats reported by a server.

use serde::{Deserialize, Serialize};

/// Stats of a single RTP stream or simulcast layer.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerStats {
    /// Bitrate in bits per second.
    #[serde(default)]
    pub bitrate: f64,

    /// Fraction of lost packets.
    #[serde(default)]
    pub fraction_lost: f64,

    /// Packet jitter.
    #[serde(default)]
    pub jitter: f64,

    /// Quality score of the stream.
    #[serde(default)]
    pub score: f64,

    /// RTP stream ID of the simulcast layer, if any.
    #[serde(default)]
    pub rid: Option<String>,
}

/// Stats of a producer (one entry per simulcast layer) or of a consumer (a
/// single entry).
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StreamStats {
    /// Per-layer stats of a producer.
    Layers(Vec<LayerStats>),

    /// Stats of a consumer.
    Single(LayerStats),
}

impl StreamStats {
    /// Returns stats of every layer ordered by their RTP stream IDs.
    #[must_use]
    pub fn layers(&self) -> Vec<&LayerStats> {
        match self {
            Self::Single(stats) => vec![stats],
            Self::Layers(layers) => {
                let mut layers: Vec<_> = layers.iter().collect();
                layers.sort_by(|a, b| a.rid.cmp(&b.rid));
                layers
            }
        }
    }

    /// Returns bitrate of all the layers summed up, in bits per second.
    #[must_use]
    pub fn bitrate(&self) -> f64 {
        self.layers().iter().map(|l| l.bitrate).sum()
    }
}
