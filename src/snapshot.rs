//! Normalized view of a session snapshot used for change detection.

use std::collections::BTreeMap;

use medea_sfu_api_proto::{MediaInfo, MediaTag, PeerId, Peers};

/// Participant of a session with everything transient (timestamps of
/// activity, stats, consumer layers) stripped.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedPeer {
    /// ID of the participant.
    pub id: PeerId,

    /// Time the participant joined at.
    pub join_ts: u64,

    /// Media the participant transmits.
    pub media: BTreeMap<MediaTag, MediaInfo>,
}

/// Normalizes the provided [`Peers`] into a list ordered by join time.
///
/// Ties are ordered by [`PeerId`], so equal snapshots always produce equal
/// lists.
#[must_use]
pub fn normalize(peers: &Peers) -> Vec<NormalizedPeer> {
    let mut list: Vec<_> = peers
        .iter()
        .map(|(id, info)| NormalizedPeer {
            id: id.clone(),
            join_ts: info.join_ts,
            media: info
                .media
                .iter()
                .map(|(tag, media)| (*tag, media.clone()))
                .collect(),
        })
        .collect();
    list.sort_by(|a, b| {
        a.join_ts.cmp(&b.join_ts).then_with(|| a.id.cmp(&b.id))
    });
    list
}
