//! 손실 루프백 위에서 송신/수신 세션 전체 동작 검증

use aftp::{Config, LinkConditions, Loopback, ReceiverState, SenderState};
use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn random_message(seed: u64, len: usize) -> Bytes {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = vec![0u8; len];
    rng.fill(&mut data[..]);
    Bytes::from(data)
}

fn config(chunk_size: usize) -> Config {
    Config {
        chunk_size,
        ..Config::fast()
    }
}

/// 주 채널 20% / 백채널 50% 손실에서도 양쪽 모두 수렴
#[test]
fn test_convergence_under_loss() {
    init_tracing();

    for seed in 0..8u64 {
        for chunk_size in [1, 7, 64, 500] {
            let message = random_message(seed, 700);
            let conditions = LinkConditions {
                primary_loss: 0.2,
                backchannel_loss: 0.5,
                duplicate_rate: 0.1,
                acks_every: 5,
                seed,
            };

            let mut loopback = Loopback::new(config(chunk_size), conditions).unwrap();
            loopback.send(message.clone()).unwrap();
            let outcome = loopback.run_until_complete(200_000).unwrap();

            assert!(outcome.converged, "seed={seed}, chunk_size={chunk_size}");
            assert_eq!(outcome.message.as_ref(), Some(&message));

            let total = (message.len() + chunk_size - 1) / chunk_size;
            let expected: Vec<u32> = (0..total as u32).collect();
            assert_eq!(loopback.sender().acknowledged(), expected);
            assert_eq!(loopback.sender().state(), SenderState::Complete);
            assert_eq!(loopback.receiver().state(), ReceiverState::Complete);
        }
    }
}

/// 빈 메시지도 청크 하나로 전송됨
#[test]
fn test_empty_message() {
    let mut loopback = Loopback::new(config(16), LinkConditions::lossy(3)).unwrap();
    loopback.send(Bytes::new()).unwrap();

    let outcome = loopback.run_until_complete(10_000).unwrap();
    assert!(outcome.converged);
    assert_eq!(outcome.message, Some(Bytes::new()));
    assert_eq!(loopback.receiver().total(), 1);
}

/// 전송 도중 메시지가 바뀌면 수신자가 초기화되고 새 메시지로 수렴
#[test]
fn test_message_change_mid_transfer() {
    init_tracing();

    let first = random_message(1, 2000);
    let second = random_message(2, 1500);

    let mut loopback = Loopback::new(config(32), LinkConditions::lossy(11)).unwrap();
    loopback.send(first).unwrap();
    for _ in 0..30 {
        loopback.tick().unwrap();
    }
    assert!(loopback.receiver().received_count() > 0);
    assert!(!loopback.receiver().is_complete());

    let checksum = loopback.send(second.clone()).unwrap();
    assert_eq!(loopback.sender().progress().acknowledged, 0);

    let outcome = loopback.run_until_complete(200_000).unwrap();
    assert!(outcome.converged);
    assert_eq!(outcome.checksum, Some(checksum));
    assert_eq!(outcome.message, Some(second));
    assert_eq!(loopback.receiver().stats().resets, 1);
}

/// 완료 후 keep-alive가 계속 나가도 수신자는 완료 상태 유지
#[test]
fn test_keepalive_after_completion() {
    let message = random_message(5, 300);
    let config = Config {
        keepalive_when_complete: true,
        ..config(50)
    };

    let mut loopback = Loopback::new(config, LinkConditions::perfect(5)).unwrap();
    loopback.send(message.clone()).unwrap();
    assert!(loopback.run_until_complete(10_000).unwrap().converged);

    let sent = loopback.sender().stats().frames_sent;
    for _ in 0..20 {
        loopback.tick().unwrap();
    }

    assert_eq!(loopback.sender().stats().frames_sent, sent + 20);
    assert!(loopback.receiver().is_complete());
    assert_eq!(loopback.receiver().message(), Some(&message));
    assert_eq!(loopback.receiver().stats().resets, 0);
}

/// 손실 없는 링크에서는 첫 바퀴에 모든 청크가 도착
#[test]
fn test_perfect_link_single_pass() {
    let message = random_message(9, 1024);
    let mut loopback = Loopback::new(config(64), LinkConditions::perfect(9)).unwrap();
    loopback.send(message).unwrap();

    for _ in 0..16 {
        loopback.tick().unwrap();
    }
    assert!(loopback.receiver().is_complete());
    assert_eq!(loopback.receiver().stats().duplicate_frames, 0);
}
