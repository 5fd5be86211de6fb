//! 에러 타입 정의
//!
//! 손실 채널에서 일상적으로 발생하는 상황(깨진 프레임, 오래된 ACK, 미완성 조립)은
//! 에러가 아니라 `Option`/통계로 처리됨. 여기 있는 에러는 호출자의 잘못된 사용뿐.

use thiserror::Error;

/// AFTP 에러 타입
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("스키마 구문 에러: {0}")]
    SchemaSyntax(String),

    #[error("bool 필드 '{field}'의 폭은 1이어야 함: got {width}")]
    BoolWidth { field: String, width: u32 },

    #[error("uint 필드 '{field}'의 폭은 1~8 비트: got {width}")]
    UintWidth { field: String, width: u32 },

    #[error("raw 필드 '{field}'의 폭은 1 이상이어야 함")]
    RawWidth { field: String },

    #[error("hex 필드 '{field}'의 폭은 1~16: got {width}")]
    HexWidth { field: String, width: usize },

    #[error("중복 필드 이름: {0}")]
    DuplicateField(String),

    #[error("가변 길이 필드 '{field}' 뒤에 구분자가 필요함")]
    AmbiguousField { field: String },

    #[error("필드 '{0}' 누락")]
    MissingField(String),

    #[error("필드 '{field}' 타입 불일치: expected {expected}, got {found}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("필드 '{field}' 값 범위 초과: {value} (최대 {max})")]
    ValueOutOfRange { field: String, value: u64, max: u64 },

    #[error("raw 필드 '{field}'는 '0'/'1' {width}자여야 함: got {got:?}")]
    InvalidBits {
        field: String,
        width: u32,
        got: String,
    },

    #[error("hex 필드 '{field}'는 16진수 {width}자여야 함: got {got:?}")]
    InvalidHex {
        field: String,
        width: usize,
        got: String,
    },

    #[error("유효하지 않은 청크 크기: {0}")]
    InvalidChunkSize(usize),

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),

    #[error("채널 닫힘")]
    ChannelClosed,
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
