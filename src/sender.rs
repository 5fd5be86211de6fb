//! 송신자 (주 채널측)
//!
//! - 청크 라운드로빈 재방송 (확인된 인덱스는 건너뜀)
//! - 백채널 ACK 범위로 확인 집합 갱신
//! - 재전송 타이머/재시도 횟수 없음: 확인될 때까지 계속 돌려 보냄
//!
//! `SenderSession`은 순수 상태 머신, `Sender`는 tokio 틱 루프로 감싼 핸들.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::ack::AckRange;
use crate::checksum::Checksum;
use crate::chunk::{Chunk, ChunkIndex, Chunker};
use crate::message::{AckFrame, DataFrame};
use crate::stats::TransferStats;
use crate::{Config, Error, Result};

/// 송신 진행 상황
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub acknowledged: u32,
    pub total: u32,
}

impl Progress {
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.acknowledged as f64 / self.total as f64
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.acknowledged == self.total
    }
}

/// 송신자 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Idle,
    Sending,
    Complete,
}

/// 전송 중인 메시지
#[derive(Debug)]
struct Outgoing {
    checksum: Checksum,
    chunks: Vec<Chunk>,
    acked: Vec<bool>,
    acked_count: u32,

    /// 다음 탐색 시작 위치
    cursor: usize,
}

impl Outgoing {
    fn new(checksum: Checksum, chunks: Vec<Chunk>) -> Self {
        Self {
            checksum,
            acked: vec![false; chunks.len()],
            acked_count: 0,
            cursor: 0,
            chunks,
        }
    }

    fn total(&self) -> u32 {
        self.chunks.len() as u32
    }

    fn progress(&self) -> Progress {
        Progress {
            acknowledged: self.acked_count,
            total: self.total(),
        }
    }

    /// cursor부터 확인 안 된 청크를 찾아 프레임 생성, cursor는 그 다음으로
    fn next_frame(&mut self) -> Option<DataFrame> {
        let total = self.chunks.len();
        let index = (0..total)
            .map(|step| (self.cursor + step) % total)
            .find(|&i| !self.acked[i])?;

        self.cursor = (index + 1) % total;
        let chunk = &self.chunks[index];
        Some(DataFrame::new(
            self.checksum,
            chunk.index,
            self.total(),
            chunk.payload.clone(),
        ))
    }

    /// 범위 적용, 새로 확인된 수 반환 (total 밖 인덱스는 무시)
    fn acknowledge(&mut self, ranges: &[AckRange]) -> u32 {
        let total = self.total();
        let mut newly = 0;
        for index in ranges.iter().flat_map(|r| r.indices(total)) {
            let slot = &mut self.acked[index as usize];
            if !*slot {
                *slot = true;
                newly += 1;
            }
        }
        self.acked_count += newly;
        newly
    }
}

enum Phase {
    Idle,
    Sending(Outgoing),
    Complete(Outgoing),
}

/// 송신 세션 상태 머신 (Idle → Sending → Complete)
pub struct SenderSession {
    config: Config,
    phase: Phase,
    stats: TransferStats,
}

impl SenderSession {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            phase: Phase::Idle,
            stats: TransferStats::new(),
        }
    }

    /// 설정된 청크 크기로 전송 시작
    pub fn send(&mut self, message: impl Into<Bytes>) -> Result<Checksum> {
        let chunk_size = self.config.chunk_size;
        self.send_chunked(message, chunk_size)
    }

    /// 새 메시지 전송 시작 (이전 확인 집합은 버림)
    pub fn send_chunked(&mut self, message: impl Into<Bytes>, chunk_size: usize) -> Result<Checksum> {
        let message = message.into();
        let chunks = Chunker::new(chunk_size)?.split(&message);
        let checksum = Checksum::of(&message);

        info!(
            "전송 시작: checksum={}, {} bytes, {} chunks",
            checksum,
            message.len(),
            chunks.len()
        );

        self.phase = Phase::Sending(Outgoing::new(checksum, chunks));
        Ok(checksum)
    }

    /// 주 채널 틱마다 호출, 보낼 프레임 반환
    ///
    /// 모두 확인됐으면 Complete로 전이하고 None
    /// (keepalive_when_complete면 keep-alive 프레임).
    pub fn next_frame(&mut self) -> Result<Option<Bytes>> {
        let next = match &mut self.phase {
            Phase::Idle => return Ok(None),
            Phase::Sending(outgoing) => outgoing.next_frame(),
            Phase::Complete(_) => None,
        };

        let frame = match next {
            Some(frame) => frame,
            None => {
                self.complete();
                match self.keepalive_frame() {
                    Some(frame) => frame,
                    None => return Ok(None),
                }
            }
        };

        let bytes = frame.to_bytes()?;
        self.stats.frames_sent += 1;
        self.stats.payload_bytes += frame.payload.len() as u64;

        debug!(
            "프레임 전송: index={}/{}, {} bytes{}",
            frame.index,
            frame.total,
            bytes.len(),
            if frame.keepalive { " (keep-alive)" } else { "" }
        );
        Ok(Some(bytes))
    }

    /// ACK 범위 적용, 새로 확인된 청크 수 반환
    pub fn apply_ack(&mut self, ranges: &[AckRange]) -> u32 {
        let outgoing = match &mut self.phase {
            Phase::Sending(outgoing) | Phase::Complete(outgoing) => outgoing,
            Phase::Idle => return 0,
        };

        let newly = outgoing.acknowledge(ranges);
        let progress = outgoing.progress();

        self.stats.acks_applied += 1;
        self.stats.chunks_acknowledged += newly as u64;
        debug!(
            "ACK 적용: {} ranges, +{} → {}/{}",
            ranges.len(),
            newly,
            progress.acknowledged,
            progress.total
        );

        if progress.is_complete() {
            self.complete();
        }
        newly
    }

    /// 백채널 프레임 처리
    ///
    /// 깨진 프레임, 다른 메시지의 ACK는 조용히 무시.
    pub fn on_backchannel_frame(&mut self, bytes: &[u8]) -> u32 {
        let Some(ack) = AckFrame::from_bytes(bytes) else {
            self.stats.malformed_frames += 1;
            debug!("깨진 백채널 프레임 무시: {} bytes", bytes.len());
            return 0;
        };

        if self.checksum() != Some(ack.checksum) {
            self.stats.stale_frames += 1;
            debug!("다른 메시지의 ACK 무시: checksum={}", ack.checksum);
            return 0;
        }

        self.apply_ack(&ack.ranges)
    }

    fn complete(&mut self) {
        self.phase = match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Sending(outgoing) => {
                info!(
                    "전송 완료: checksum={}, {} chunks 모두 확인됨",
                    outgoing.checksum,
                    outgoing.total()
                );
                self.stats.completed_messages += 1;
                Phase::Complete(outgoing)
            }
            other => other,
        };
    }

    fn keepalive_frame(&self) -> Option<DataFrame> {
        match &self.phase {
            Phase::Complete(outgoing) if self.config.keepalive_when_complete => {
                Some(DataFrame::keepalive(outgoing.checksum, outgoing.total()))
            }
            _ => None,
        }
    }

    fn outgoing(&self) -> Option<&Outgoing> {
        match &self.phase {
            Phase::Sending(outgoing) | Phase::Complete(outgoing) => Some(outgoing),
            Phase::Idle => None,
        }
    }

    pub fn state(&self) -> SenderState {
        match self.phase {
            Phase::Idle => SenderState::Idle,
            Phase::Sending(_) => SenderState::Sending,
            Phase::Complete(_) => SenderState::Complete,
        }
    }

    pub fn checksum(&self) -> Option<Checksum> {
        self.outgoing().map(|o| o.checksum)
    }

    pub fn progress(&self) -> Progress {
        self.outgoing().map_or(
            Progress {
                acknowledged: 0,
                total: 0,
            },
            Outgoing::progress,
        )
    }

    pub fn is_complete(&self) -> bool {
        self.state() == SenderState::Complete
    }

    pub fn is_acknowledged(&self, index: ChunkIndex) -> bool {
        self.outgoing()
            .and_then(|o| o.acked.get(index as usize).copied())
            .unwrap_or(false)
    }

    /// 확인된 인덱스 목록
    pub fn acknowledged(&self) -> Vec<ChunkIndex> {
        self.outgoing()
            .map(|o| {
                o.acked
                    .iter()
                    .enumerate()
                    .filter(|(_, &acked)| acked)
                    .map(|(i, _)| i as ChunkIndex)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Idle로 초기화
    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
    }
}

/// 송신 이벤트 (호스트가 frame을 주 채널로 내보냄)
#[derive(Debug, Clone)]
pub struct SendEvent {
    pub frame: Bytes,
    pub progress: Progress,
}

/// 내부 명령
enum SenderCmd {
    Backchannel(Bytes),
    Stop,
}

/// 송신자 핸들 (외부에서 제어용)
pub struct Sender {
    cmd_tx: mpsc::Sender<SenderCmd>,
    stats: Arc<RwLock<TransferStats>>,
    running: Arc<AtomicBool>,
    checksum: Checksum,
}

impl Sender {
    /// 전송 시작
    ///
    /// frame_interval마다 SendEvent 하나. 모든 청크가 확인되면 스트림이 끝남
    /// (keepalive_when_complete면 dispose까지 keep-alive 계속).
    pub fn start(
        config: Config,
        message: impl Into<Bytes>,
    ) -> Result<(Self, mpsc::Receiver<SendEvent>)> {
        config.validate()?;

        let mut session = SenderSession::new(config.clone());
        let checksum = session.send(message)?;

        let (cmd_tx, mut cmd_rx) = mpsc::channel::<SenderCmd>(config.event_buffer);
        let (event_tx, event_rx) = mpsc::channel::<SendEvent>(config.event_buffer);

        let stats = Arc::new(RwLock::new(session.stats().clone()));
        let running = Arc::new(AtomicBool::new(true));

        let stats_main = stats.clone();
        let running_main = running.clone();
        let frame_interval = config.frame_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(frame_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            while running_main.load(Ordering::SeqCst) {
                tokio::select! {
                    _ = ticker.tick() => {
                        match session.next_frame() {
                            Ok(Some(frame)) => {
                                let event = SendEvent {
                                    frame,
                                    progress: session.progress(),
                                };
                                if event_tx.send(event).await.is_err() {
                                    debug!("이벤트 수신측 종료, 송신 중단");
                                    break;
                                }
                            }
                            Ok(None) => {
                                if session.is_complete() {
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!("프레임 인코딩 실패: {}", e);
                                break;
                            }
                        }
                    }
                    cmd = cmd_rx.recv() => {
                        match cmd {
                            Some(SenderCmd::Backchannel(frame)) => {
                                session.on_backchannel_frame(&frame);
                            }
                            Some(SenderCmd::Stop) | None => break,
                        }
                    }
                }

                *stats_main.write() = session.stats().clone();
            }

            info!("송신 종료: {}", session.stats().summary());
            *stats_main.write() = session.stats().clone();
            running_main.store(false, Ordering::SeqCst);
        });

        let sender = Self {
            cmd_tx,
            stats,
            running,
            checksum,
        };

        Ok((sender, event_rx))
    }

    /// 백채널에서 받은 프레임 전달
    pub async fn on_backchannel_frame(&self, frame: Bytes) -> Result<()> {
        self.cmd_tx
            .send(SenderCmd::Backchannel(frame))
            .await
            .map_err(|_| Error::ChannelClosed)
    }

    /// 정지
    pub async fn dispose(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.cmd_tx.send(SenderCmd::Stop).await;
    }

    /// 통계 반환
    pub fn stats(&self) -> TransferStats {
        self.stats.read().clone()
    }

    pub fn checksum(&self) -> Checksum {
        self.checksum
    }

    /// 실행 중 여부
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
