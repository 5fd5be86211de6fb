//! 메시지 체크섬
//!
//! 양쪽 세션이 "같은 메시지"를 보고 있는지 판단하는 유일한 기준.
//! 체크섬이 바뀌면 모든 청크/ACK 상태를 버리고 새로 시작함.

use std::fmt;

use serde::{Deserialize, Serialize};

/// CRC-32 기반 메시지 지문 (와이어상 소문자 16진수 8자)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(u32);

impl Checksum {
    /// 메시지 바이트의 체크섬 계산
    pub fn of(data: &[u8]) -> Self {
        Self(crc32fast::hash(data))
    }

    pub fn from_u32(value: u32) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// 16진수 8자로 변환
    pub fn to_hex(&self) -> String {
        format!("{:08x}", self.0)
    }

    /// 16진수 8자에서 파싱 (대소문자 무관)
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        u32::from_str_radix(s, 16).ok().map(Self)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}
