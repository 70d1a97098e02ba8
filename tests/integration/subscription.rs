//! Subscribing to remote tracks and controlling received media.

use medea_sfu_client::{
    hashmap,
    platform::ConnectionState,
    proto::{MediaTag, PeerId, TransportDirection},
    TrackKey,
};

use crate::fakes::{peer, settle, Call, Rendered, World};

fn track(peer: &str, tag: MediaTag) -> TrackKey {
    TrackKey::new(PeerId::from(peer), tag)
}

/// Joins a session where `A` transmits its camera.
async fn joined_world() -> World {
    let world = World::new();
    world.signaling.set_peers(hashmap! {
        PeerId::from("A") => peer(
            1,
            &[MediaTag::CamVideo, MediaTag::CamAudio],
        ),
    });
    world.room.join().await.unwrap();
    world.tick().await;
    world
}

#[tokio::test(start_paused = true)]
async fn subscribes_and_resumes_consumer() {
    local!(async {
        let world = joined_world().await;

        world
            .room
            .subscribe_to_track(PeerId::from("A"), MediaTag::CamVideo)
            .await
            .unwrap();

        let consumers = world.room.consumers();
        let consumer = &consumers[&track("A", MediaTag::CamVideo)];
        assert!(!consumer.is_paused());
        assert!(world
            .signaling
            .calls()
            .contains(&Call::ResumeConsumer(consumer.id())));
        assert!(world.presenter.rendered().contains(
            &Rendered::ConsumerAdded(track("A", MediaTag::CamVideo)),
        ));
    });
}

#[tokio::test(start_paused = true)]
async fn concurrent_subscriptions_create_single_consumer() {
    local!(async {
        let world = joined_world().await;

        let (first, second) = futures::join!(
            world
                .room
                .subscribe_to_track(PeerId::from("A"), MediaTag::CamVideo),
            world
                .room
                .subscribe_to_track(PeerId::from("A"), MediaTag::CamVideo),
        );
        first.unwrap();
        second.unwrap();
        world
            .room
            .subscribe_to_track(PeerId::from("A"), MediaTag::CamVideo)
            .await
            .unwrap();

        assert_eq!(world.room.consumers().len(), 1);
        assert_eq!(
            world.signaling.count(|c| matches!(c, Call::RecvTrack(..))),
            1,
        );
        assert_eq!(
            world.signaling.count(|c| {
                *c == Call::CreateTransport(TransportDirection::Recv)
            }),
            1,
        );
        assert_eq!(world.device.transports_of(TransportDirection::Recv), 1);
    });
}

#[tokio::test(start_paused = true)]
async fn different_tracks_share_receiving_transport() {
    local!(async {
        let world = joined_world().await;

        let (video, audio) = futures::join!(
            world
                .room
                .subscribe_to_track(PeerId::from("A"), MediaTag::CamVideo),
            world
                .room
                .subscribe_to_track(PeerId::from("A"), MediaTag::CamAudio),
        );
        video.unwrap();
        audio.unwrap();

        assert_eq!(world.room.consumers().len(), 2);
        assert_eq!(world.device.transports_of(TransportDirection::Recv), 1);
        assert_eq!(
            world
                .signaling
                .count(|c| matches!(c, Call::ConnectTransport(_))),
            1,
        );
    });
}

#[tokio::test(start_paused = true)]
async fn resumes_consumer_only_once_transport_connected() {
    local!(async {
        let world = joined_world().await;
        world.device.auto_connect.set(false);

        let room = world.room.clone();
        let subscription = tokio::task::spawn_local(async move {
            room.subscribe_to_track(PeerId::from("A"), MediaTag::CamVideo)
                .await
        });
        settle().await;

        assert_eq!(
            world.signaling.count(|c| matches!(c, Call::ResumeConsumer(_))),
            0,
        );
        assert!(world.room.consumers().is_empty());

        world
            .device
            .transport(TransportDirection::Recv)
            .unwrap()
            .set_state(ConnectionState::Connected);
        subscription.await.unwrap().unwrap();

        assert_eq!(
            world.signaling.count(|c| matches!(c, Call::ResumeConsumer(_))),
            1,
        );
        assert_eq!(world.room.consumers().len(), 1);
    });
}

#[tokio::test(start_paused = true)]
async fn fails_subscription_if_transport_fails_before_connecting() {
    local!(async {
        let world = joined_world().await;
        world.device.auto_connect.set(false);

        let room = world.room.clone();
        let subscription = tokio::task::spawn_local(async move {
            room.subscribe_to_track(PeerId::from("A"), MediaTag::CamVideo)
                .await
        });
        settle().await;
        let recv = world.device.transport(TransportDirection::Recv).unwrap();
        recv.set_state(ConnectionState::Failed);

        assert!(subscription.await.unwrap().is_err());
        settle().await;

        assert!(world.room.consumers().is_empty());
        assert!(recv.consumers.borrow()[0].closed.get());
        assert_eq!(
            world.signaling.count(|c| matches!(c, Call::ResumeConsumer(_))),
            0,
        );
        // Failed transport ends the whole session.
        assert!(!world.room.is_joined());
        assert!(world.signaling.calls().contains(&Call::Leave));
    });
}

#[tokio::test(start_paused = true)]
async fn drops_subscription_to_track_vanished_meanwhile() {
    local!(async {
        let world = joined_world().await;
        world.device.auto_connect.set(false);

        let room = world.room.clone();
        let subscription = tokio::task::spawn_local(async move {
            room.subscribe_to_track(PeerId::from("A"), MediaTag::CamVideo)
                .await
        });
        settle().await;
        world.signaling.set_peers(hashmap! {
            PeerId::from("A") => peer(1, &[MediaTag::CamAudio]),
        });
        world.tick().await;
        world
            .device
            .transport(TransportDirection::Recv)
            .unwrap()
            .set_state(ConnectionState::Connected);

        assert!(subscription.await.unwrap().is_err());
        settle().await;

        assert!(world.room.consumers().is_empty());
        assert_eq!(
            world.signaling.count(|c| matches!(c, Call::CloseConsumer(_))),
            1,
        );
    });
}

#[tokio::test(start_paused = true)]
async fn refused_transport_connect_fails_subscription() {
    local!(async {
        let world = joined_world().await;
        world.signaling.fail("connect-transport");

        assert!(world
            .room
            .subscribe_to_track(PeerId::from("A"), MediaTag::CamVideo)
            .await
            .is_err());
        settle().await;

        assert!(world.room.consumers().is_empty());
        let recv = world.device.transport(TransportDirection::Recv).unwrap();
        assert!(recv.consumers.borrow().is_empty());
        assert_eq!(
            world.signaling.count(|c| matches!(c, Call::ResumeConsumer(_))),
            0,
        );
        assert!(world.room.is_joined());

        // Failed attempt doesn't block a later one.
        world.signaling.failing.borrow_mut().clear();
        world
            .room
            .subscribe_to_track(PeerId::from("A"), MediaTag::CamVideo)
            .await
            .unwrap();
        assert_eq!(world.room.consumers().len(), 1);
    });
}

#[tokio::test(start_paused = true)]
async fn unsubscribing_closes_consumer() {
    local!(async {
        let world = joined_world().await;
        world
            .room
            .subscribe_to_track(PeerId::from("A"), MediaTag::CamVideo)
            .await
            .unwrap();
        let id = world.room.consumers()[&track("A", MediaTag::CamVideo)].id();

        world
            .room
            .unsubscribe_from_track(PeerId::from("A"), MediaTag::CamVideo);
        settle().await;

        assert!(world.room.consumers().is_empty());
        assert!(world.signaling.calls().contains(&Call::CloseConsumer(id)));
        assert!(world.presenter.rendered().contains(
            &Rendered::ConsumerClosed(track("A", MediaTag::CamVideo)),
        ));

        // Unknown tracks are ignored.
        world
            .room
            .unsubscribe_from_track(PeerId::from("Z"), MediaTag::CamVideo);
        assert_eq!(
            world.signaling.count(|c| matches!(c, Call::CloseConsumer(_))),
            1,
        );
    });
}

#[tokio::test(start_paused = true)]
async fn pauses_and_resumes_consumer_via_server() {
    local!(async {
        let world = joined_world().await;
        world
            .room
            .subscribe_to_track(PeerId::from("A"), MediaTag::CamVideo)
            .await
            .unwrap();
        let consumer =
            world.room.consumers()[&track("A", MediaTag::CamVideo)].clone();

        world
            .room
            .pause_consumer(PeerId::from("A"), MediaTag::CamVideo)
            .await
            .unwrap();
        assert!(consumer.is_paused());
        assert_eq!(
            world.signaling.calls().last(),
            Some(&Call::PauseConsumer(consumer.id())),
        );

        world.signaling.fail("resume-consumer");
        assert!(world
            .room
            .resume_consumer(PeerId::from("A"), MediaTag::CamVideo)
            .await
            .is_err());
        assert!(consumer.is_paused());
    });
}

#[tokio::test(start_paused = true)]
async fn controlling_unknown_consumer_errors() {
    local!(async {
        let world = joined_world().await;

        assert!(world
            .room
            .pause_consumer(PeerId::from("A"), MediaTag::CamVideo)
            .await
            .is_err());
        assert!(world
            .room
            .set_consumer_preferred_layer(
                PeerId::from("A"),
                MediaTag::CamVideo,
                1,
            )
            .await
            .is_err());
        assert_eq!(
            world.signaling.count(|c| {
                matches!(c, Call::PauseConsumer(_) | Call::SetConsumerLayer(..))
            }),
            0,
        );
    });
}

#[tokio::test(start_paused = true)]
async fn sets_preferred_layer_of_consumer() {
    local!(async {
        let world = joined_world().await;
        world
            .room
            .subscribe_to_track(PeerId::from("A"), MediaTag::CamVideo)
            .await
            .unwrap();
        let id = world.room.consumers()[&track("A", MediaTag::CamVideo)].id();

        world
            .room
            .set_consumer_preferred_layer(
                PeerId::from("A"),
                MediaTag::CamVideo,
                1,
            )
            .await
            .unwrap();

        assert!(world
            .signaling
            .calls()
            .contains(&Call::SetConsumerLayer(id, 1)));
    });
}
