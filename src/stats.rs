//! 전송 통계

use std::time::{Duration, Instant};

/// 세션 전송 통계
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 내보낸 주 채널 프레임 수 (keep-alive 포함)
    pub frames_sent: u64,

    /// 받은 주 채널 프레임 수 (디코딩 성공분)
    pub frames_received: u64,

    /// 페이로드 바이트 (송신 또는 수신)
    pub payload_bytes: u64,

    /// 이미 받은 인덱스의 중복 수신
    pub duplicate_frames: u64,

    /// 디코딩 실패 프레임 (잘림/깨짐)
    pub malformed_frames: u64,

    /// 다른 메시지를 가리키는 오래된 ACK/인덱스
    pub stale_frames: u64,

    /// 보낸 ACK 프레임 수
    pub acks_sent: u64,

    /// 적용한 ACK 프레임 수
    pub acks_applied: u64,

    /// 새로 확인된 청크 수
    pub chunks_acknowledged: u64,

    /// 체크섬 변경으로 인한 상태 초기화 횟수
    pub resets: u64,

    /// 완료된 메시지 수
    pub completed_messages: u64,
}

impl TransferStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            frames_sent: 0,
            frames_received: 0,
            payload_bytes: 0,
            duplicate_frames: 0,
            malformed_frames: 0,
            stale_frames: 0,
            acks_sent: 0,
            acks_applied: 0,
            chunks_acknowledged: 0,
            resets: 0,
            completed_messages: 0,
        }
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 페이로드 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.payload_bytes as f64 / elapsed
    }

    /// 수신 프레임 중 중복 비율
    pub fn duplicate_ratio(&self) -> f64 {
        if self.frames_received == 0 {
            return 0.0;
        }
        self.duplicate_frames as f64 / self.frames_received as f64
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Frames: {} sent / {} recv | Bytes: {} ({:.0} B/s) | Dup: {:.1}% | Malformed: {} | Stale: {} | ACKs: {} sent / {} applied | Resets: {}",
            self.elapsed().as_secs_f64(),
            self.frames_sent,
            self.frames_received,
            self.payload_bytes,
            self.throughput(),
            self.duplicate_ratio() * 100.0,
            self.malformed_frames,
            self.stale_frames,
            self.acks_sent,
            self.acks_applied,
            self.resets,
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}
