//! 세션 설정

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result, DEFAULT_CHUNK_SIZE};

/// AFTP 세션 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// 청크 크기 (바이트)
    pub chunk_size: usize,

    /// 주 채널 프레임 간격 (밀리초)
    /// 송신자는 이 간격마다 프레임 하나를 내보냄
    pub frame_interval_ms: u64,

    /// ACK 간격 (밀리초)
    /// 백채널 대역폭이 훨씬 작으므로 보통 frame_interval보다 훨씬 김
    pub ack_interval_ms: u64,

    /// 모든 청크가 확인된 뒤에도 keep-alive 프레임을 보낼지 여부
    pub keepalive_when_complete: bool,

    /// 이벤트 채널 버퍼 크기
    pub event_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            frame_interval_ms: 100,           // 10 fps
            ack_interval_ms: 1000,            // 1초
            keepalive_when_complete: false,
            event_buffer: 256,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn ack_interval(&self) -> Duration {
        Duration::from_millis(self.ack_interval_ms)
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidChunkSize(self.chunk_size));
        }
        if self.frame_interval_ms == 0 || self.ack_interval_ms == 0 {
            return Err(Error::InvalidConfig("프레임/ACK 간격은 0보다 커야 함".into()));
        }
        if self.event_buffer == 0 {
            return Err(Error::InvalidConfig("이벤트 버퍼 크기는 0보다 커야 함".into()));
        }
        Ok(())
    }

    /// 백채널이 매우 느린 환경용 설정
    pub fn low_bandwidth() -> Self {
        Self {
            chunk_size: 96,
            frame_interval_ms: 200,
            ack_interval_ms: 4000,            // 4초에 ACK 하나
            keepalive_when_complete: true,
            event_buffer: 64,
        }
    }

    /// 루프백/테스트용 빠른 설정
    pub fn fast() -> Self {
        Self {
            chunk_size: 32,
            frame_interval_ms: 1,
            ack_interval_ms: 5,
            keepalive_when_complete: false,
            event_buffer: 1024,
        }
    }
}
