//! Authoritative session snapshot returned by the `sync` endpoint.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{ConsumerId, MediaTag, PeerId, ProducerId, StreamStats};

/// Every participant of a session by its [`PeerId`].
pub type Peers = HashMap<PeerId, PeerInfo>;

/// Point-in-time view of a single participant.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    /// Time the participant joined at, in milliseconds since Unix epoch.
    pub join_ts: u64,

    /// Time the participant was last heard of, in milliseconds since Unix
    /// epoch.
    #[serde(default)]
    pub last_seen_ts: u64,

    /// Media the participant currently transmits. Media of unknown tags is
    /// skipped.
    #[serde(default, deserialize_with = "known_media")]
    pub media: HashMap<MediaTag, MediaInfo>,

    /// Stats of the participant's streams keyed by producer or consumer ID.
    #[serde(default)]
    pub stats: HashMap<String, StreamStats>,

    /// Spatial layers of the participant's consumers.
    #[serde(default)]
    pub consumer_layers: HashMap<ConsumerId, ConsumerLayers>,
}

/// Deserializes media of a participant, skipping the entries whose tag is not
/// a known [`MediaTag`].
fn known_media<'de, D>(
    deserializer: D,
) -> Result<HashMap<MediaTag, MediaInfo>, D::Error>
where
    D: Deserializer<'de>,
{
    let media = HashMap::<String, MediaInfo>::deserialize(deserializer)?;
    Ok(media
        .into_iter()
        .filter_map(|(tag, info)| {
            serde_json::from_value(Value::String(tag))
                .ok()
                .map(|tag| (tag, info))
        })
        .collect())
}

/// Single media transmitted by a participant.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct MediaInfo {
    /// Indicator whether the remote producer is paused.
    #[serde(default)]
    pub paused: bool,

    /// RTP encodings of the remote producer, one per simulcast layer.
    #[serde(default)]
    pub encodings: Vec<Value>,
}

/// Spatial layers of a server-side consumer.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerLayers {
    /// Layer currently forwarded.
    #[serde(default)]
    pub current_layer: Option<u8>,

    /// Layer requested by the client.
    #[serde(default)]
    pub client_selected_layer: Option<u8>,
}

/// Participant speaking loudest at the moment of a snapshot.
///
/// All fields are empty if nobody is speaking.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSpeaker {
    /// Audio producer of the speaker.
    #[serde(default)]
    pub producer_id: Option<ProducerId>,

    /// Volume of the speaker in dBvo.
    #[serde(default)]
    pub volume: Option<f64>,

    /// The speaker.
    #[serde(default)]
    pub peer_id: Option<PeerId>,
}
