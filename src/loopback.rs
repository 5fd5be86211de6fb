//! 손실 링크 루프백 시뮬레이션
//!
//! 송신/수신 세션 두 개를 한 프로세스 안에서 손실 있는 채널로 연결.
//! 모든 무작위성은 시드 고정 RNG에서 나오므로 같은 시드면 같은 결과.
//!
//! 한 틱 = 주 채널 프레임 하나. ACK는 `acks_every` 틱마다 하나.

use bytes::Bytes;
use crossbeam_channel::{unbounded, Receiver as ChannelRx, Sender as ChannelTx};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::receiver::ReceiverSession;
use crate::sender::SenderSession;
use crate::transport::FrameSink;
use crate::{Checksum, Config, Error, Result};

/// 링크 상태
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkConditions {
    /// 주 채널 프레임 손실 확률 [0.0, 1.0]
    pub primary_loss: f64,

    /// 백채널 프레임 손실 확률 [0.0, 1.0]
    pub backchannel_loss: f64,

    /// 주 채널 프레임이 두 번 도착할 확률
    pub duplicate_rate: f64,

    /// 몇 틱마다 ACK 하나를 보낼지
    pub acks_every: u32,

    pub seed: u64,
}

impl LinkConditions {
    /// 손실 없는 링크
    pub fn perfect(seed: u64) -> Self {
        Self {
            primary_loss: 0.0,
            backchannel_loss: 0.0,
            duplicate_rate: 0.0,
            acks_every: 4,
            seed,
        }
    }

    /// 주 채널 20%, 백채널 50% 손실
    pub fn lossy(seed: u64) -> Self {
        Self {
            primary_loss: 0.2,
            backchannel_loss: 0.5,
            duplicate_rate: 0.05,
            acks_every: 8,
            seed,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, p) in [
            ("primary_loss", self.primary_loss),
            ("backchannel_loss", self.backchannel_loss),
            ("duplicate_rate", self.duplicate_rate),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(Error::InvalidConfig(format!("{name}은 0.0..=1.0 범위여야 함: {p}")));
            }
        }
        if self.primary_loss >= 1.0 || self.backchannel_loss >= 1.0 {
            return Err(Error::InvalidConfig("손실률 1.0으로는 수렴 불가".into()));
        }
        if self.acks_every == 0 {
            return Err(Error::InvalidConfig("acks_every는 0보다 커야 함".into()));
        }
        Ok(())
    }
}

/// 확률적으로 프레임을 버리거나 복제하는 싱크
pub struct LossyLink {
    tx: ChannelTx<Bytes>,
    rng: StdRng,
    loss: f64,
    duplicate_rate: f64,
    dropped: u64,
}

impl LossyLink {
    pub fn new(tx: ChannelTx<Bytes>, loss: f64, duplicate_rate: f64, seed: u64) -> Self {
        Self {
            tx,
            rng: StdRng::seed_from_u64(seed),
            loss,
            duplicate_rate,
            dropped: 0,
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl FrameSink for LossyLink {
    fn emit(&mut self, frame: Bytes) -> Result<()> {
        if self.rng.gen_bool(self.loss) {
            self.dropped += 1;
            return Ok(());
        }
        if self.rng.gen_bool(self.duplicate_rate) {
            self.tx.send(frame.clone()).map_err(|_| Error::ChannelClosed)?;
        }
        self.tx.send(frame).map_err(|_| Error::ChannelClosed)?;
        Ok(())
    }
}

/// 루프백 실행 결과
#[derive(Debug, Clone)]
pub struct LoopbackOutcome {
    pub ticks: u64,
    pub converged: bool,
    pub message: Option<Bytes>,
    pub checksum: Option<Checksum>,
    pub primary_dropped: u64,
    pub backchannel_dropped: u64,
}

/// 송신 세션 ↔ 수신 세션 루프백
pub struct Loopback {
    conditions: LinkConditions,
    sender: SenderSession,
    receiver: ReceiverSession,
    primary: LossyLink,
    primary_rx: ChannelRx<Bytes>,
    backchannel: LossyLink,
    backchannel_rx: ChannelRx<Bytes>,
    ticks: u64,
}

impl Loopback {
    pub fn new(config: Config, conditions: LinkConditions) -> Result<Self> {
        config.validate()?;
        conditions.validate()?;

        let (primary_tx, primary_rx) = unbounded();
        let (backchannel_tx, backchannel_rx) = unbounded();

        let primary = LossyLink::new(
            primary_tx,
            conditions.primary_loss,
            conditions.duplicate_rate,
            conditions.seed,
        );
        let backchannel = LossyLink::new(
            backchannel_tx,
            conditions.backchannel_loss,
            0.0,
            conditions.seed.wrapping_add(0x9e37_79b9_7f4a_7c15),
        );

        Ok(Self {
            conditions,
            sender: SenderSession::new(config),
            receiver: ReceiverSession::new(),
            primary,
            primary_rx,
            backchannel,
            backchannel_rx,
            ticks: 0,
        })
    }

    /// 송신측에 새 메시지 (진행 중인 전송은 대체됨)
    pub fn send(&mut self, message: impl Into<Bytes>) -> Result<Checksum> {
        self.sender.send(message)
    }

    /// 한 틱 진행
    pub fn tick(&mut self) -> Result<()> {
        if let Some(frame) = self.sender.next_frame()? {
            self.primary.emit(frame)?;
        }
        for frame in self.primary_rx.try_iter() {
            self.receiver.on_primary_frame(&frame);
        }

        self.ticks += 1;
        if self.ticks % self.conditions.acks_every as u64 == 0 {
            if let Some(frame) = self.receiver.on_ack_tick()? {
                self.backchannel.emit(frame)?;
            }
        }
        for frame in self.backchannel_rx.try_iter() {
            self.sender.on_backchannel_frame(&frame);
        }
        Ok(())
    }

    /// 양쪽이 모두 완료되거나 max_ticks에 도달할 때까지 진행
    pub fn run_until_complete(&mut self, max_ticks: u64) -> Result<LoopbackOutcome> {
        let start = self.ticks;
        while !self.is_converged() && self.ticks - start < max_ticks {
            self.tick()?;
        }

        let outcome = self.outcome();
        if outcome.converged {
            info!(
                "루프백 수렴: {} ticks, 손실 {}/{}",
                outcome.ticks, outcome.primary_dropped, outcome.backchannel_dropped
            );
        } else {
            debug!("루프백 미수렴: {} ticks", outcome.ticks);
        }
        Ok(outcome)
    }

    fn is_converged(&self) -> bool {
        self.sender.is_complete()
            && self.receiver.is_complete()
            && self.sender.checksum() == self.receiver.checksum()
    }

    fn outcome(&self) -> LoopbackOutcome {
        LoopbackOutcome {
            ticks: self.ticks,
            converged: self.is_converged(),
            message: self.receiver.message().cloned(),
            checksum: self.receiver.checksum(),
            primary_dropped: self.primary.dropped(),
            backchannel_dropped: self.backchannel.dropped(),
        }
    }

    pub fn sender(&self) -> &SenderSession {
        &self.sender
    }

    pub fn receiver(&self) -> &ReceiverSession {
        &self.receiver
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}
