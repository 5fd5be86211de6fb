//! tokio 핸들 (Sender / Receiver) 연동 테스트

use std::time::Duration;

use aftp::{Checksum, Config, Receiver, Sender};
use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn test_sender_receiver_handles() {
    init_tracing();

    let message = Bytes::from("The quick brown fox jumps over the lazy dog. ".repeat(40));
    let config = Config::fast();

    let (sender, mut events) = Sender::start(config.clone(), message.clone()).unwrap();
    let (inbound_tx, inbound_rx) = mpsc::channel::<Bytes>(config.event_buffer);
    let (backchannel_tx, mut backchannel_rx) = mpsc::unbounded_channel::<Bytes>();
    let (receiver, mut updates) = Receiver::start(config, inbound_rx, backchannel_tx).unwrap();
    assert_eq!(sender.checksum(), Checksum::of(&message));

    let result = tokio::time::timeout(Duration::from_secs(20), async {
        let mut sender_done = false;
        let mut received = None;
        let mut rng = StdRng::seed_from_u64(42);

        while !(sender_done && received.is_some()) {
            tokio::select! {
                event = events.recv(), if !sender_done => match event {
                    Some(event) => {
                        // 주 채널 프레임 30% 손실
                        if !rng.gen_bool(0.3) {
                            inbound_tx.send(event.frame).await.unwrap();
                        }
                    }
                    None => sender_done = true,
                },
                Some(frame) = backchannel_rx.recv() => {
                    // 송신 완료 뒤 늦게 도착한 ACK는 닫힌 채널로 감
                    let _ = sender.on_backchannel_frame(frame).await;
                }
                Some(update) = updates.recv() => {
                    assert!(update.received <= update.total);
                    if update.is_complete {
                        received = update.message;
                    }
                }
            }
        }
        received
    })
    .await
    .expect("전송 시간 초과");

    assert_eq!(result, Some(message));
    assert!(!sender.is_running());
    assert_eq!(sender.stats().completed_messages, 1);

    let receiver_stats = receiver.stats();
    assert_eq!(receiver_stats.completed_messages, 1);
    assert!(receiver_stats.acks_sent > 0);

    sender.dispose().await;
    receiver.dispose().await;
}

#[tokio::test]
async fn test_receiver_stops_when_inbound_closes() {
    init_tracing();

    let (inbound_tx, inbound_rx) = mpsc::channel::<Bytes>(8);
    let (backchannel_tx, _backchannel_rx) = mpsc::unbounded_channel::<Bytes>();
    let (receiver, mut updates) =
        Receiver::start(Config::fast(), inbound_rx, backchannel_tx).unwrap();

    // 깨진 프레임은 업데이트 없이 무시
    inbound_tx.send(Bytes::from_static(b"garbage")).await.unwrap();
    drop(inbound_tx);

    let update = tokio::time::timeout(Duration::from_secs(5), updates.recv())
        .await
        .expect("수신 태스크가 종료되지 않음");
    assert!(update.is_none());
    assert!(!receiver.is_running());
    assert_eq!(receiver.stats().malformed_frames, 1);
}

#[tokio::test]
async fn test_dispose_stops_sender() {
    let (sender, mut events) = Sender::start(Config::fast(), vec![7u8; 4096]).unwrap();
    assert!(events.recv().await.is_some());

    sender.dispose().await;
    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        while events.recv().await.is_some() {}
    })
    .await;
    assert!(drained.is_ok());
    assert!(!sender.is_running());
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let config = Config {
        chunk_size: 0,
        ..Config::fast()
    };
    assert!(Sender::start(config.clone(), Bytes::from_static(b"x")).is_err());

    let (_tx, rx) = mpsc::channel::<Bytes>(1);
    let (backchannel_tx, _backchannel_rx) = mpsc::unbounded_channel::<Bytes>();
    assert!(Receiver::start(config, rx, backchannel_tx).is_err());
}
