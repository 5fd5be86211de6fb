//! # AFTP (Asymmetric Feedback Transfer Protocol)
//!
//! 대역폭이 큰 단방향 주 채널 + 아주 작은 백채널 위의 신뢰 메시지 전송
//!
//! ## 핵심 특징
//! - **라운드 로빈 재방송**: 확인되지 않은 청크를 끝없이 돌아가며 전송
//! - **범위 압축 ACK**: 백채널 프레임 하나에 여러 청크 확인을 실음
//! - **체크섬 기반 세션**: 체크섬이 바뀌면 새 메시지로 보고 초기화
//! - **스키마 코덱**: 비트 필드 / 텍스트 레이아웃을 패턴 문자열로 기술
//! - **전송 계층 독립**: 세션은 바이트 프레임만 주고받음

pub mod ack;
pub mod checksum;
pub mod chunk;
pub mod codec;
pub mod config;
pub mod error;
pub mod loopback;
pub mod message;
pub mod receiver;
pub mod record;
pub mod sender;
pub mod stats;
pub mod text_codec;
pub mod transport;

pub use ack::AckRange;
pub use checksum::Checksum;
pub use chunk::{Chunk, ChunkIndex, Chunker};
pub use codec::{Codec, FieldKind, FieldSchema};
pub use config::Config;
pub use error::{Error, Result};
pub use loopback::{LinkConditions, Loopback, LoopbackOutcome};
pub use message::{AckFrame, DataFrame, Frame};
pub use receiver::{ReceiveUpdate, Receiver, ReceiverSession, ReceiverState};
pub use record::{Record, Value};
pub use sender::{Progress, SendEvent, Sender, SenderSession, SenderState};
pub use stats::TransferStats;
pub use text_codec::{TextCodec, TextFieldKind};
pub use transport::FrameSink;

/// 프로토콜 버전 (프레임 프리앰블 3비트)
pub const PROTOCOL_VERSION: u8 = 1;

/// 기본 청크 크기 (바이트)
pub const DEFAULT_CHUNK_SIZE: usize = 128;
