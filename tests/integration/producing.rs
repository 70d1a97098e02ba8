//! Capturing and sending local media.

use medea_sfu_client::{
    platform::RtpEncoding,
    proto::{MediaTag, TransportDirection},
};

use crate::fakes::{settle, Call, World};

#[tokio::test(start_paused = true)]
async fn sends_camera_with_simulcast_layers() {
    local!(async {
        let world = World::new();

        world.room.send_camera_streams().await.unwrap();

        assert!(world.room.is_joined());
        let send = world.device.transport(TransportDirection::Send).unwrap();
        assert_eq!(
            send.produced.borrow().clone(),
            vec![
                (
                    MediaTag::CamVideo,
                    vec![
                        RtpEncoding {
                            max_bitrate: Some(120_000),
                            scale_resolution_down_by: Some(8.0),
                        },
                        RtpEncoding {
                            max_bitrate: Some(680_000),
                            scale_resolution_down_by: Some(1.0),
                        },
                    ],
                ),
                (MediaTag::CamAudio, vec![]),
            ],
        );
        assert_eq!(
            world
                .signaling
                .count(|c| matches!(c, Call::ConnectTransport(_))),
            1,
        );
        let producers = world.room.producers();
        assert_eq!(producers.len(), 2);
        assert!(!producers[&MediaTag::CamVideo].is_paused());

        // Sending again doesn't capture twice.
        world.room.send_camera_streams().await.unwrap();
        assert_eq!(world.media_devices.requests.borrow().len(), 1);
        assert_eq!(world.room.producers().len(), 2);
    });
}

#[tokio::test(start_paused = true)]
async fn applies_pause_intent_when_producing() {
    local!(async {
        let world = World::new();
        world
            .room
            .set_local_paused(MediaTag::CamVideo, true)
            .await
            .unwrap();

        world.room.send_camera_streams().await.unwrap();

        assert!(world.signaling.calls().contains(&Call::SendTrack {
            tag: MediaTag::CamVideo,
            paused: true,
        }));
        assert!(world.signaling.calls().contains(&Call::SendTrack {
            tag: MediaTag::CamAudio,
            paused: false,
        }));
        let producers = world.room.producers();
        assert!(producers[&MediaTag::CamVideo].is_paused());
        assert!(!producers[&MediaTag::CamAudio].is_paused());
        assert!(world.room.is_local_paused(MediaTag::CamVideo));
    });
}

#[tokio::test(start_paused = true)]
async fn pauses_and_resumes_producer_via_server() {
    local!(async {
        let world = World::new();
        world.room.send_camera_streams().await.unwrap();
        let audio = world.room.producers()[&MediaTag::CamAudio].clone();

        world
            .room
            .set_local_paused(MediaTag::CamAudio, true)
            .await
            .unwrap();
        assert!(audio.is_paused());
        assert_eq!(
            world.signaling.calls().last(),
            Some(&Call::PauseProducer(audio.id())),
        );

        world
            .room
            .set_local_paused(MediaTag::CamAudio, false)
            .await
            .unwrap();
        assert!(!audio.is_paused());
        assert_eq!(
            world.signaling.calls().last(),
            Some(&Call::ResumeProducer(audio.id())),
        );
    });
}

#[tokio::test(start_paused = true)]
async fn keeps_producer_running_if_server_refuses_pause() {
    local!(async {
        let world = World::new();
        world.room.send_camera_streams().await.unwrap();
        world.signaling.fail("pause-producer");

        assert!(world
            .room
            .set_local_paused(MediaTag::CamVideo, true)
            .await
            .is_err());

        assert!(!world.room.producers()[&MediaTag::CamVideo].is_paused());
        assert!(world.room.is_local_paused(MediaTag::CamVideo));
    });
}

#[tokio::test(start_paused = true)]
async fn shares_screen_in_single_layer() {
    local!(async {
        let world = World::new();

        world.room.start_screen_share().await.unwrap();

        let send = world.device.transport(TransportDirection::Send).unwrap();
        assert_eq!(
            send.produced.borrow().clone(),
            vec![(MediaTag::ScreenVideo, vec![])],
        );
        assert!(world.room.producers().contains_key(&MediaTag::ScreenVideo));
    });
}

#[tokio::test(start_paused = true)]
async fn tears_screen_share_down_once_capture_ends() {
    local!(async {
        let world = World::new();
        world.room.send_camera_streams().await.unwrap();
        world.room.start_screen_share().await.unwrap();
        let send = world.device.transport(TransportDirection::Send).unwrap();
        let screen = send
            .producers
            .borrow()
            .iter()
            .find(|p| p.id.0.contains("screen-video"))
            .cloned()
            .unwrap();

        world.media_devices.last_screen().unwrap().end();
        settle().await;

        assert!(screen.paused.get());
        assert!(screen.closed.get());
        assert!(world
            .signaling
            .calls()
            .contains(&Call::CloseProducer(screen.id.clone())));
        let producers = world.room.producers();
        assert!(!producers.contains_key(&MediaTag::ScreenVideo));
        assert_eq!(producers.len(), 2);
        assert!(world.room.is_joined());

        // Sharing may be started again.
        world.room.start_screen_share().await.unwrap();
        assert!(world.room.producers().contains_key(&MediaTag::ScreenVideo));
    });
}

#[tokio::test(start_paused = true)]
async fn cycles_through_cameras() {
    local!(async {
        let world = World::new();
        world.room.send_camera_streams().await.unwrap();
        let video = world.room.producers()[&MediaTag::CamVideo].clone();
        assert_eq!(
            world.room.current_camera_device_id().await.unwrap(),
            Some("cam-1".to_owned()),
        );

        world.room.cycle_camera().await.unwrap();
        assert_eq!(
            world.room.current_camera_device_id().await.unwrap(),
            Some("cam-2".to_owned()),
        );
        let first_capture = world.media_devices.captured.borrow()[..2].to_vec();
        assert!(first_capture.iter().all(|t| t.stopped.get()));

        world.room.cycle_camera().await.unwrap();
        assert_eq!(
            world.room.current_camera_device_id().await.unwrap(),
            Some("cam-1".to_owned()),
        );

        // Same producer keeps sending, with swapped tracks.
        assert_eq!(
            world.room.producers()[&MediaTag::CamVideo].id(),
            video.id(),
        );
        assert_eq!(
            world
                .signaling
                .count(|c| matches!(c, Call::SendTrack { .. })),
            2,
        );
    });
}

#[tokio::test(start_paused = true)]
async fn resolves_camera_by_label_without_device_id() {
    local!(async {
        let world = World::new();
        world.media_devices.report_device_id.set(false);
        world.room.send_camera_streams().await.unwrap();

        assert_eq!(
            world.room.current_camera_device_id().await.unwrap(),
            Some("cam-1".to_owned()),
        );

        world.room.cycle_camera().await.unwrap();
        assert_eq!(
            world.room.current_camera_device_id().await.unwrap(),
            Some("cam-2".to_owned()),
        );
    });
}

#[tokio::test(start_paused = true)]
async fn does_not_cycle_single_camera() {
    local!(async {
        let world = World::new();
        world.media_devices.devices.borrow_mut().pop();
        world.room.send_camera_streams().await.unwrap();

        world.room.cycle_camera().await.unwrap();

        assert_eq!(world.media_devices.requests.borrow().len(), 1);
        assert_eq!(
            world.room.current_camera_device_id().await.unwrap(),
            Some("cam-1".to_owned()),
        );
    });
}

#[tokio::test(start_paused = true)]
async fn stopping_streams_keeps_session() {
    local!(async {
        let world = World::new();
        world.room.send_camera_streams().await.unwrap();
        let send = world.device.transport(TransportDirection::Send).unwrap();

        world.room.stop_streams().await;
        settle().await;

        assert!(world
            .signaling
            .calls()
            .contains(&Call::CloseTransport(send.id.clone())));
        assert!(send.closed.get());
        assert!(world.room.producers().is_empty());
        assert!(world
            .media_devices
            .captured
            .borrow()
            .iter()
            .all(|t| t.stopped.get()));
        assert!(world.room.is_joined());
        assert_eq!(world.signaling.count(|c| *c == Call::Leave), 0);

        // Next send uses a fresh transport.
        world.room.send_camera_streams().await.unwrap();
        assert_eq!(world.device.transports_of(TransportDirection::Send), 2);
    });
}

#[tokio::test(start_paused = true)]
async fn queries_and_limits_producer_layers() {
    local!(async {
        let world = World::new();
        world.room.send_camera_streams().await.unwrap();
        let video = world.room.producers()[&MediaTag::CamVideo].clone();

        let stats =
            world.room.producer_stats(MediaTag::CamVideo).await.unwrap();
        assert_eq!(stats.len(), 2);
        assert!(world
            .signaling
            .calls()
            .contains(&Call::ProducerStats(video.id())));

        assert_eq!(
            world.room.producer_max_spatial_layer(MediaTag::CamVideo).unwrap(),
            None,
        );
        world
            .room
            .set_producer_max_spatial_layer(MediaTag::CamVideo, 0)
            .await
            .unwrap();
        assert_eq!(
            world.room.producer_max_spatial_layer(MediaTag::CamVideo).unwrap(),
            Some(0),
        );
        assert!(world
            .room
            .set_producer_max_spatial_layer(MediaTag::CamVideo, 5)
            .await
            .is_err());
        assert!(world
            .room
            .producer_stats(MediaTag::ScreenVideo)
            .await
            .is_err());
    });
}

#[tokio::test(start_paused = true)]
async fn overlapping_camera_starts_capture_once() {
    local!(async {
        let world = World::new();
        world.media_devices.slow_capture.set(true);

        let (first, second) = futures::join!(
            world.room.send_camera_streams(),
            world.room.send_camera_streams(),
        );
        first.unwrap();
        second.unwrap();

        let send = world.device.transport(TransportDirection::Send).unwrap();
        assert_eq!(send.producers.borrow().len(), 2);
        assert_eq!(world.room.producers().len(), 2);
        assert_eq!(world.media_devices.requests.borrow().len(), 1);
        assert_eq!(
            world.signaling.count(|c| matches!(c, Call::SendTrack { .. })),
            2,
        );
    });
}

#[tokio::test(start_paused = true)]
async fn overlapping_screen_shares_capture_once() {
    local!(async {
        let world = World::new();
        world.media_devices.slow_capture.set(true);

        let (first, second) = futures::join!(
            world.room.start_screen_share(),
            world.room.start_screen_share(),
        );
        first.unwrap();
        second.unwrap();

        let send = world.device.transport(TransportDirection::Send).unwrap();
        assert_eq!(send.producers.borrow().len(), 1);
        assert_eq!(world.media_devices.screens.borrow().len(), 1);
        assert_eq!(world.room.producers().len(), 1);
    });
}

#[tokio::test(start_paused = true)]
async fn refused_transport_connect_fails_sending() {
    local!(async {
        let world = World::new();
        world.signaling.fail("connect-transport");

        assert!(world.room.send_camera_streams().await.is_err());

        assert!(world.room.producers().is_empty());
        assert_eq!(
            world.signaling.count(|c| matches!(c, Call::SendTrack { .. })),
            0,
        );
        assert!(world
            .media_devices
            .captured
            .borrow()
            .iter()
            .all(|t| t.stopped.get()));
        assert!(world.room.is_joined());
    });
}

#[tokio::test(start_paused = true)]
async fn refused_send_track_fails_sending() {
    local!(async {
        let world = World::new();
        world.signaling.fail("send-track");

        assert!(world.room.send_camera_streams().await.is_err());

        assert!(world.room.producers().is_empty());
        let send = world.device.transport(TransportDirection::Send).unwrap();
        assert!(send.producers.borrow().is_empty());
        assert_eq!(
            world.signaling.count(|c| matches!(c, Call::SendTrack { .. })),
            1,
        );
        assert!(world
            .media_devices
            .captured
            .borrow()
            .iter()
            .all(|t| t.stopped.get()));

        // Camera may be started again once the server recovers.
        world.signaling.failing.borrow_mut().clear();
        world.room.send_camera_streams().await.unwrap();
        assert_eq!(world.room.producers().len(), 2);
    });
}

#[tokio::test(start_paused = true)]
async fn failed_camera_swap_keeps_current_camera() {
    local!(async {
        let world = World::new();
        world.room.send_camera_streams().await.unwrap();
        let send = world.device.transport(TransportDirection::Send).unwrap();
        let audio = send
            .producers
            .borrow()
            .iter()
            .find(|p| p.id.0.contains("cam-audio"))
            .cloned()
            .unwrap();
        audio.refuse_swap.set(true);

        assert!(world.room.cycle_camera().await.is_err());

        assert_eq!(
            world.room.current_camera_device_id().await.unwrap(),
            Some("cam-1".to_owned()),
        );
        let captured = world.media_devices.captured.borrow();
        assert_eq!(captured.len(), 4);
        assert!(captured[..2].iter().all(|t| !t.stopped.get()));
        assert!(captured[2..].iter().all(|t| t.stopped.get()));
    });
}

#[tokio::test(start_paused = true)]
async fn ended_screen_is_closed_locally_even_if_server_refuses() {
    local!(async {
        let world = World::new();
        world.room.start_screen_share().await.unwrap();
        let send = world.device.transport(TransportDirection::Send).unwrap();
        let screen = send.producers.borrow()[0].clone();
        world.signaling.fail("close-producer");

        world.media_devices.last_screen().unwrap().end();
        settle().await;

        assert!(screen.closed.get());
        assert!(world.room.producers().is_empty());
        assert!(world
            .signaling
            .calls()
            .contains(&Call::CloseProducer(screen.id.clone())));

        world.room.start_screen_share().await.unwrap();
        assert_eq!(world.room.producers().len(), 1);
        assert_eq!(send.producers.borrow().len(), 2);
    });
}
