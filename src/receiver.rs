//! 수신자 (백채널 송신측)
//!
//! - 주 채널 프레임 수신 및 조립
//! - ACK 틱마다 범위 압축 ACK 하나를 백채널로 전송
//! - 체크섬이 바뀌면 새 메시지로 보고 모든 상태 초기화
//!
//! 이미 받은 인덱스가 다시 오면 ACK 대상으로 재등록함.
//! 백채널 ACK가 유실돼도 송신자는 계속 재방송하므로 다음 ACK에 다시 실림.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::ack;
use crate::checksum::Checksum;
use crate::chunk::{Chunk, ChunkIndex, ChunkStore};
use crate::message::{AckFrame, DataFrame};
use crate::stats::TransferStats;
use crate::transport::FrameSink;
use crate::{Config, Result};

/// 수신자 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Idle,
    Receiving,
    Complete,
}

/// 프레임 하나를 처리한 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveUpdate {
    /// 새로 저장된 청크 (중복/keep-alive면 None)
    pub chunk: Option<Chunk>,
    pub received: u32,
    pub total: u32,
    pub is_complete: bool,
    pub message: Option<Bytes>,
    pub checksum: Option<Checksum>,
}

/// 수신 세션 상태 머신 (Idle → Receiving → Complete)
#[derive(Debug)]
pub struct ReceiverSession {
    state: ReceiverState,
    checksum: Option<Checksum>,

    /// 지금까지 알게 된 최대 청크 수
    total: u32,

    store: ChunkStore,

    /// 한 번이라도 받은 인덱스
    received: BTreeSet<ChunkIndex>,

    /// 다음 ACK에 실어야 할 인덱스
    awaiting: BTreeSet<ChunkIndex>,

    message: Option<Bytes>,
    stats: TransferStats,
}

impl ReceiverSession {
    pub fn new() -> Self {
        Self {
            state: ReceiverState::Idle,
            checksum: None,
            total: 0,
            store: ChunkStore::new(),
            received: BTreeSet::new(),
            awaiting: BTreeSet::new(),
            message: None,
            stats: TransferStats::new(),
        }
    }

    /// 주 채널 프레임 처리
    ///
    /// 깨진 프레임은 None (무시). 그 외에는 현재 상태를 담은 업데이트.
    pub fn on_primary_frame(&mut self, bytes: &[u8]) -> Option<ReceiveUpdate> {
        let Some(frame) = DataFrame::from_bytes(bytes) else {
            self.stats.malformed_frames += 1;
            debug!("깨진 주 채널 프레임 무시: {} bytes", bytes.len());
            return None;
        };
        self.stats.frames_received += 1;

        if self.checksum != Some(frame.checksum) {
            self.begin(frame.checksum);
        }
        if frame.total > self.total {
            self.total = frame.total;
        }

        if frame.keepalive {
            return Some(self.update(None));
        }

        // 중복이어도 ACK 대상으로 재등록
        self.awaiting.insert(frame.index);

        if !self.store.insert(frame.index, frame.payload.clone()) {
            self.stats.duplicate_frames += 1;
            return Some(self.update(None));
        }

        self.received.insert(frame.index);
        self.stats.payload_bytes += frame.payload.len() as u64;
        debug!(
            "청크 수신: index={}, {}/{}",
            frame.index,
            self.received.len(),
            self.total
        );

        if self.state != ReceiverState::Complete && self.received.len() as u32 == self.total {
            self.try_complete();
        }

        let chunk = Chunk {
            index: frame.index,
            payload: frame.payload,
        };
        Some(self.update(Some(chunk)))
    }

    /// ACK 틱마다 호출, 보낼 백채널 프레임 반환
    ///
    /// 보낸 뒤 대기 집합은 비움 (유실되면 재방송 프레임이 다시 채움).
    pub fn on_ack_tick(&mut self) -> Result<Option<Bytes>> {
        let Some(checksum) = self.checksum else {
            return Ok(None);
        };
        if self.awaiting.is_empty() {
            return Ok(None);
        }

        let ranges = ack::schedule(&self.received, &self.awaiting, self.total);
        let requested = self.awaiting.len();
        self.awaiting.clear();
        if ranges.is_empty() {
            return Ok(None);
        }

        let frame = AckFrame::new(checksum, ranges).to_bytes()?;
        self.stats.acks_sent += 1;
        debug!("ACK 전송: {} requested, {} bytes", requested, frame.len());
        Ok(Some(frame))
    }

    fn begin(&mut self, checksum: Checksum) {
        match self.checksum {
            Some(previous) => {
                info!("새 메시지 감지: {} → {}, 상태 초기화", previous, checksum);
                self.stats.resets += 1;
            }
            None => info!("메시지 수신 시작: checksum={}", checksum),
        }

        self.clear();
        self.checksum = Some(checksum);
        self.state = ReceiverState::Receiving;
    }

    fn try_complete(&mut self) {
        let (Some(checksum), Some(message)) = (self.checksum, self.store.reassemble(self.total)) else {
            return;
        };

        let actual = Checksum::of(&message);
        if actual != checksum {
            warn!(
                "재조립 체크섬 불일치: expected {}, got {}. 청크를 버리고 다시 수신",
                checksum, actual
            );
            self.store.clear();
            self.received.clear();
            return;
        }

        info!(
            "메시지 수신 완료: checksum={}, {} bytes, {} chunks",
            checksum,
            message.len(),
            self.total
        );
        self.stats.completed_messages += 1;
        self.message = Some(message);
        self.state = ReceiverState::Complete;
    }

    fn update(&self, chunk: Option<Chunk>) -> ReceiveUpdate {
        ReceiveUpdate {
            chunk,
            received: self.received.len() as u32,
            total: self.total,
            is_complete: self.state == ReceiverState::Complete,
            message: self.message.clone(),
            checksum: self.checksum,
        }
    }

    fn clear(&mut self) {
        self.total = 0;
        self.store.clear();
        self.received.clear();
        self.awaiting.clear();
        self.message = None;
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn checksum(&self) -> Option<Checksum> {
        self.checksum
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn received_count(&self) -> u32 {
        self.received.len() as u32
    }

    pub fn is_complete(&self) -> bool {
        self.state == ReceiverState::Complete
    }

    pub fn message(&self) -> Option<&Bytes> {
        self.message.as_ref()
    }

    /// 아직 받지 못한 인덱스
    pub fn missing(&self) -> Vec<ChunkIndex> {
        self.store.missing(self.total)
    }

    /// 다음 ACK 대기 중인 인덱스
    pub fn awaiting(&self) -> &BTreeSet<ChunkIndex> {
        &self.awaiting
    }

    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    /// Idle로 초기화
    pub fn reset(&mut self) {
        self.clear();
        self.checksum = None;
        self.state = ReceiverState::Idle;
    }
}

impl Default for ReceiverSession {
    fn default() -> Self {
        Self::new()
    }
}

/// 내부 명령
enum ReceiverCmd {
    Frame(Bytes),
    AckTick,
    Stop,
}

/// 수신자 핸들 (외부에서 제어용)
pub struct Receiver {
    cmd_tx: mpsc::Sender<ReceiverCmd>,
    stats: Arc<RwLock<TransferStats>>,
    running: Arc<AtomicBool>,
}

impl Receiver {
    /// 수신 시작
    ///
    /// inbound의 프레임마다 ReceiveUpdate 하나, ack_interval마다 backchannel로 ACK.
    /// inbound가 닫히거나 dispose하면 종료.
    pub fn start<S: FrameSink>(
        config: Config,
        mut inbound: mpsc::Receiver<Bytes>,
        mut backchannel: S,
    ) -> Result<(Self, mpsc::Receiver<ReceiveUpdate>)> {
        config.validate()?;

        let (cmd_tx, mut cmd_rx) = mpsc::channel::<ReceiverCmd>(config.event_buffer);
        let (update_tx, update_rx) = mpsc::channel::<ReceiveUpdate>(config.event_buffer);

        let stats = Arc::new(RwLock::new(TransferStats::new()));
        let running = Arc::new(AtomicBool::new(true));

        // 수신 태스크
        let cmd_tx_recv = cmd_tx.clone();
        let running_recv = running.clone();

        tokio::spawn(async move {
            while let Some(frame) = inbound.recv().await {
                if !running_recv.load(Ordering::SeqCst) {
                    return;
                }
                if cmd_tx_recv.send(ReceiverCmd::Frame(frame)).await.is_err() {
                    return;
                }
            }
            debug!("주 채널 입력 종료");
            let _ = cmd_tx_recv.send(ReceiverCmd::Stop).await;
        });

        // ACK 타이머 태스크
        let cmd_tx_ack = cmd_tx.clone();
        let running_ack = running.clone();
        let ack_interval = config.ack_interval();

        tokio::spawn(async move {
            while running_ack.load(Ordering::SeqCst) {
                tokio::time::sleep(ack_interval).await;
                if cmd_tx_ack.send(ReceiverCmd::AckTick).await.is_err() {
                    break;
                }
            }
        });

        // 메인 처리 태스크
        let stats_main = stats.clone();
        let running_main = running.clone();

        tokio::spawn(async move {
            let mut session = ReceiverSession::new();

            while let Some(cmd) = cmd_rx.recv().await {
                match cmd {
                    ReceiverCmd::Frame(frame) => {
                        if let Some(update) = session.on_primary_frame(&frame) {
                            let _ = update_tx.send(update).await;
                        }
                    }
                    ReceiverCmd::AckTick => match session.on_ack_tick() {
                        Ok(Some(frame)) => {
                            if let Err(e) = backchannel.emit(frame) {
                                warn!("백채널 전송 실패: {}", e);
                            }
                        }
                        Ok(None) => {}
                        Err(e) => warn!("ACK 인코딩 실패: {}", e),
                    },
                    ReceiverCmd::Stop => break,
                }

                *stats_main.write() = session.stats().clone();
            }

            info!("수신 종료: {}", session.stats().summary());
            running_main.store(false, Ordering::SeqCst);
        });

        let receiver = Self {
            cmd_tx,
            stats,
            running,
        };

        Ok((receiver, update_rx))
    }

    /// 정지
    pub async fn dispose(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.cmd_tx.send(ReceiverCmd::Stop).await;
    }

    /// 통계 반환
    pub fn stats(&self) -> TransferStats {
        self.stats.read().clone()
    }

    /// 실행 중 여부
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
