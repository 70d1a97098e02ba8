//! Polling and reconciliation of received tracks with session snapshots.

use std::collections::HashSet;

use medea_sfu_client::{
    hashmap,
    proto::{MediaTag, PeerId, Peers, TransportDirection},
    RpcError, TrackKey,
};

use crate::fakes::{peer, settle, Call, Rendered, World};

fn track(peer: &str, tag: MediaTag) -> TrackKey {
    TrackKey::new(PeerId::from(peer), tag)
}

/// Joins, publishes the provided snapshot and subscribes to the provided
/// tracks.
async fn world_with(peers: Peers, tracks: &[TrackKey]) -> World {
    let world = World::new();
    world.signaling.set_peers(peers);
    world.room.join().await.unwrap();
    world.tick().await;
    for t in tracks {
        world
            .room
            .subscribe_to_track(t.peer_id.clone(), t.media_tag)
            .await
            .unwrap();
    }
    world
}

fn held(world: &World) -> HashSet<TrackKey> {
    world.room.consumers().keys().cloned().collect()
}

#[tokio::test(start_paused = true)]
async fn closes_tracks_of_exited_peer() {
    local!(async {
        let world = world_with(
            hashmap! {
                PeerId::from("A") => peer(1, &[MediaTag::CamVideo]),
                PeerId::from("B") => peer(2, &[MediaTag::ScreenVideo]),
            },
            &[
                track("A", MediaTag::CamVideo),
                track("B", MediaTag::ScreenVideo),
            ],
        )
        .await;
        let b_consumer = world.room.consumers()
            [&track("B", MediaTag::ScreenVideo)]
            .id();

        world.signaling.set_peers(hashmap! {
            PeerId::from("A") => peer(1, &[MediaTag::CamVideo]),
        });
        world.tick().await;

        assert_eq!(
            held(&world),
            vec![track("A", MediaTag::CamVideo)].into_iter().collect(),
        );
        assert!(world
            .presenter
            .rendered()
            .contains(&Rendered::ConsumerClosed(track(
                "B",
                MediaTag::ScreenVideo,
            ))));
        assert_eq!(
            world.signaling.count(|c| matches!(c, Call::CloseConsumer(_))),
            1,
        );
        assert!(world
            .signaling
            .calls()
            .contains(&Call::CloseConsumer(b_consumer)));
    });
}

#[tokio::test(start_paused = true)]
async fn closes_track_no_longer_transmitted() {
    local!(async {
        let world = world_with(
            hashmap! {
                PeerId::from("A") => peer(
                    1,
                    &[MediaTag::CamVideo, MediaTag::CamAudio],
                ),
            },
            &[
                track("A", MediaTag::CamVideo),
                track("A", MediaTag::CamAudio),
            ],
        )
        .await;
        let recv = world
            .device
            .transport(TransportDirection::Recv)
            .unwrap();

        world.signaling.set_peers(hashmap! {
            PeerId::from("A") => peer(1, &[MediaTag::CamVideo]),
        });
        world.tick().await;

        assert_eq!(
            held(&world),
            vec![track("A", MediaTag::CamVideo)].into_iter().collect(),
        );
        let consumers = recv.consumers.borrow();
        let audio = consumers
            .iter()
            .find(|c| c.app_data.media_tag == MediaTag::CamAudio)
            .unwrap();
        let video = consumers
            .iter()
            .find(|c| c.app_data.media_tag == MediaTag::CamVideo)
            .unwrap();
        assert!(audio.closed.get());
        assert!(!video.closed.get());
        assert!(!recv.closed.get());
    });
}

#[tokio::test(start_paused = true)]
async fn held_set_matches_snapshot_after_each_poll() {
    local!(async {
        let world = world_with(
            hashmap! {
                PeerId::from("A") => peer(1, &MediaTag::ALL),
                PeerId::from("B") => peer(
                    2,
                    &[MediaTag::CamVideo, MediaTag::CamAudio],
                ),
                PeerId::from("C") => peer(3, &[MediaTag::ScreenVideo]),
            },
            &[
                track("A", MediaTag::CamVideo),
                track("A", MediaTag::ScreenVideo),
                track("B", MediaTag::CamAudio),
                track("C", MediaTag::ScreenVideo),
            ],
        )
        .await;

        let snapshots: Vec<Peers> = vec![
            hashmap! {
                PeerId::from("A") => peer(1, &[MediaTag::ScreenVideo]),
                PeerId::from("B") => peer(2, &[MediaTag::CamAudio]),
                PeerId::from("C") => peer(3, &[MediaTag::ScreenVideo]),
            },
            hashmap! {
                PeerId::from("A") => peer(1, &[MediaTag::ScreenVideo]),
                PeerId::from("C") => peer(3, &[MediaTag::CamVideo]),
            },
            hashmap! {
                PeerId::from("A") => peer(1, &[MediaTag::ScreenVideo]),
            },
        ];
        for peers in snapshots {
            let held_before = held(&world);
            world.signaling.set_peers(peers.clone());
            world.tick().await;

            let expected: HashSet<_> =
                held_before.into_iter().filter(|t| t.is_in(&peers)).collect();
            assert_eq!(held(&world), expected);
        }
        assert_eq!(
            held(&world),
            vec![track("A", MediaTag::ScreenVideo)].into_iter().collect(),
        );
    });
}

#[tokio::test(start_paused = true)]
async fn renders_peers_only_on_structural_change() {
    local!(async {
        let world = World::new();
        let mut a = peer(1, &[MediaTag::CamVideo]);
        world.signaling.set_peers(hashmap! {
            PeerId::from("A") => a.clone(),
        });
        world.room.join().await.unwrap();

        world.tick().await;
        a.last_seen_ts = 1_000;
        world.signaling.set_peers(hashmap! {
            PeerId::from("A") => a.clone(),
        });
        world.tick().await;
        world.tick().await;

        assert_eq!(world.presenter.peer_renders(), 1);
        assert_eq!(*world.presenter.stats_refreshes.borrow(), 3);
        assert_eq!(world.presenter.speakers.borrow().len(), 3);

        world.signaling.set_peers(hashmap! {
            PeerId::from("A") => a.clone(),
            PeerId::from("B") => peer(2, &[]),
        });
        world.tick().await;

        assert_eq!(world.presenter.peer_renders(), 2);
        assert_eq!(
            world.presenter.rendered().last(),
            Some(&Rendered::Peers(vec![
                PeerId::from("A"),
                PeerId::from("B"),
            ])),
        );
    });
}

#[tokio::test(start_paused = true)]
async fn polls_at_fixed_interval_while_joined() {
    local!(async {
        let world = World::new();
        world.room.join().await.unwrap();

        for _ in 0..3 {
            world.tick().await;
        }
        assert_eq!(world.signaling.count(|c| *c == Call::Sync), 3);

        world.room.leave().await.unwrap();
        for _ in 0..3 {
            world.tick().await;
        }
        assert_eq!(world.signaling.count(|c| *c == Call::Sync), 3);
    });
}

#[tokio::test(start_paused = true)]
async fn failed_poll_halts_polling() {
    local!(async {
        let world = world_with(
            hashmap! {
                PeerId::from("A") => peer(1, &[MediaTag::CamVideo]),
            },
            &[track("A", MediaTag::CamVideo)],
        )
        .await;
        world
            .signaling
            .sync_errors
            .borrow_mut()
            .push_back(RpcError::Transport("connection reset".to_owned()));

        world.tick().await;
        world.signaling.set_peers(Peers::new());
        for _ in 0..5 {
            world.tick().await;
        }
        settle().await;

        assert_eq!(world.signaling.count(|c| *c == Call::Sync), 2);
        assert!(world.presenter.rendered().contains(&Rendered::SyncFailed(
            RpcError::Transport("connection reset".to_owned()),
        )));
        // Session stays joined with its last known state.
        assert!(world.room.is_joined());
        assert_eq!(world.room.peers().len(), 1);
        assert_eq!(held(&world).len(), 1);
    });
}
