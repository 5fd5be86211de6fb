//! 외부 전송 계층 경계
//!
//! 주 채널/백채널의 물리 인코딩(영상, 음향 등)은 이 크레이트 밖의 일.
//! 세션은 바이트 프레임을 싱크에 넘기기만 함.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::{Error, Result};

/// 프레임을 내보내는 쪽 (`emit(bytes)`)
pub trait FrameSink: Send + 'static {
    fn emit(&mut self, frame: Bytes) -> Result<()>;
}

impl FrameSink for mpsc::UnboundedSender<Bytes> {
    fn emit(&mut self, frame: Bytes) -> Result<()> {
        self.send(frame).map_err(|_| Error::ChannelClosed)
    }
}

impl FrameSink for crossbeam_channel::Sender<Bytes> {
    fn emit(&mut self, frame: Bytes) -> Result<()> {
        self.send(frame).map_err(|_| Error::ChannelClosed)
    }
}
