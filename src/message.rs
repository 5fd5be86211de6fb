//! 와이어 프레임 정의
//!
//! 모든 프레임 = 1바이트 프리앰블(비트 코덱) + 텍스트 본문(텍스트 코덱)
//!
//! ```text
//! 프리앰블: <keepalive:bool-1><version:num-3><kind-4>
//! 데이터:   D{checksum:hex8}:{index:num}/{total:num}|{payload:bytes}
//! ACK:      A{checksum:hex8}:{ranges:pairs}
//! ```
//!
//! 스키마는 프로세스당 한 번만 컴파일해서 재사용.

use std::sync::OnceLock;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::ack::AckRange;
use crate::checksum::Checksum;
use crate::chunk::ChunkIndex;
use crate::codec::Codec;
use crate::record::{Record, Value};
use crate::text_codec::TextCodec;
use crate::{Result, PROTOCOL_VERSION};

const PREAMBLE_SCHEMA: &str = "<keepalive:bool-1><version:num-3><kind-4>";
const DATA_SCHEMA: &str = "D{checksum:hex8}:{index:num}/{total:num}|{payload:bytes}";
const ACK_SCHEMA: &str = "A{checksum:hex8}:{ranges:pairs}";

struct Codecs {
    preamble: Codec,
    data: TextCodec,
    ack: TextCodec,
}

fn codecs() -> Result<&'static Codecs> {
    static CODECS: OnceLock<Result<Codecs>> = OnceLock::new();
    CODECS
        .get_or_init(|| {
            Ok(Codecs {
                preamble: Codec::from_pattern(PREAMBLE_SCHEMA)?,
                data: TextCodec::compile(DATA_SCHEMA)?,
                ack: TextCodec::compile(ACK_SCHEMA)?,
            })
        })
        .as_ref()
        .map_err(Clone::clone)
}

/// 프레임 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// 주 채널 데이터 청크
    Data,

    /// 백채널 ACK 범위
    Ack,
}

impl FrameKind {
    fn bits(&self) -> &'static str {
        match self {
            FrameKind::Data => "0001",
            FrameKind::Ack => "0010",
        }
    }

    fn from_bits(bits: &str) -> Option<Self> {
        match bits {
            "0001" => Some(FrameKind::Data),
            "0010" => Some(FrameKind::Ack),
            _ => None,
        }
    }
}

/// 프레임 프리앰블 (1바이트)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preamble {
    pub keepalive: bool,
    pub version: u8,
    pub kind: FrameKind,
}

impl Preamble {
    pub fn new(kind: FrameKind, keepalive: bool) -> Self {
        Self {
            keepalive,
            version: PROTOCOL_VERSION,
            kind,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let record = Record::new()
            .with("keepalive", Value::Bool(self.keepalive))
            .with("version", Value::Uint(self.version as u64))
            .with("kind", Value::Bits(self.kind.bits().into()));
        codecs()?.preamble.encode(&record)
    }

    /// 프리앰블 파싱, 버전/종류가 맞지 않으면 None
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let record = codecs().ok()?.preamble.decode(bytes)?;
        let version = record.get_uint("version")? as u8;
        if version != PROTOCOL_VERSION {
            debug!("프로토콜 버전 불일치: expected {}, got {}", PROTOCOL_VERSION, version);
            return None;
        }

        Some(Self {
            keepalive: record.get_bool("keepalive")?,
            version,
            kind: FrameKind::from_bits(record.get_bits("kind")?)?,
        })
    }
}

fn frame(preamble: Preamble, body: &[u8]) -> Result<Bytes> {
    let head = preamble.to_bytes()?;
    let mut buf = BytesMut::with_capacity(head.len() + body.len());
    buf.put_slice(&head);
    buf.put_slice(body);
    Ok(buf.freeze())
}

/// 본문 분리 (프리앰블 종류 확인 포함)
fn body(bytes: &[u8], kind: FrameKind) -> Option<(Preamble, &[u8])> {
    let preamble = Preamble::from_bytes(bytes)?;
    if preamble.kind != kind {
        return None;
    }
    let head_len = codecs().ok()?.preamble.byte_len();
    Some((preamble, &bytes[head_len..]))
}

/// 주 채널 데이터 프레임
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub checksum: Checksum,
    pub index: ChunkIndex,
    pub total: u32,
    pub payload: Bytes,

    /// 완료 후 보내는 keep-alive (페이로드 없음, 청크로 저장하지 않음)
    pub keepalive: bool,
}

impl DataFrame {
    pub fn new(checksum: Checksum, index: ChunkIndex, total: u32, payload: Bytes) -> Self {
        Self {
            checksum,
            index,
            total,
            payload,
            keepalive: false,
        }
    }

    pub fn keepalive(checksum: Checksum, total: u32) -> Self {
        Self {
            checksum,
            index: 0,
            total,
            payload: Bytes::new(),
            keepalive: true,
        }
    }

    pub fn to_bytes(&self) -> Result<Bytes> {
        let record = Record::new()
            .with("checksum", Value::Hex(self.checksum.to_hex()))
            .with("index", Value::Uint(self.index as u64))
            .with("total", Value::Uint(self.total as u64))
            .with("payload", Value::Bytes(self.payload.clone()));
        let text = codecs()?.data.encode(&record)?;
        frame(Preamble::new(FrameKind::Data, self.keepalive), &text)
    }

    /// 깨지거나 잘린 프레임, total == 0, index >= total이면 None
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let (preamble, text) = body(bytes, FrameKind::Data)?;
        let record = codecs().ok()?.data.decode(text)?;

        let checksum = Checksum::from_hex(record.get_hex("checksum")?)?;
        let index = u32::try_from(record.get_uint("index")?).ok()?;
        let total = u32::try_from(record.get_uint("total")?).ok()?;
        if total == 0 || index >= total {
            return None;
        }

        Some(Self {
            checksum,
            index,
            total,
            payload: record.get_bytes("payload")?.clone(),
            keepalive: preamble.keepalive,
        })
    }
}

/// 백채널 ACK 프레임
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckFrame {
    pub checksum: Checksum,
    pub ranges: Vec<AckRange>,
}

impl AckFrame {
    pub fn new(checksum: Checksum, ranges: Vec<AckRange>) -> Self {
        Self { checksum, ranges }
    }

    pub fn to_bytes(&self) -> Result<Bytes> {
        let pairs = self.ranges.iter().map(AckRange::as_pair).collect();
        let record = Record::new()
            .with("checksum", Value::Hex(self.checksum.to_hex()))
            .with("ranges", Value::Pairs(pairs));
        let text = codecs()?.ack.encode(&record)?;
        frame(Preamble::new(FrameKind::Ack, false), &text)
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let (_, text) = body(bytes, FrameKind::Ack)?;
        let record = codecs().ok()?.ack.decode(text)?;

        Some(Self {
            checksum: Checksum::from_hex(record.get_hex("checksum")?)?,
            ranges: record
                .get_pairs("ranges")?
                .iter()
                .map(|&pair| AckRange::from(pair))
                .collect(),
        })
    }
}

/// 종류를 모르는 프레임 디코딩
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data(DataFrame),
    Ack(AckFrame),
}

impl Frame {
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match Preamble::from_bytes(bytes)?.kind {
            FrameKind::Data => DataFrame::from_bytes(bytes).map(Frame::Data),
            FrameKind::Ack => AckFrame::from_bytes(bytes).map(Frame::Ack),
        }
    }

    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Data(_) => FrameKind::Data,
            Frame::Ack(_) => FrameKind::Ack,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schemas_compile() {
        assert_eq!(codecs().unwrap().preamble.byte_len(), 1);
    }

    #[test]
    fn test_data_frame_layout() {
        let checksum = Checksum::from_u32(0x0a1b_2c3d);
        let frame = DataFrame::new(checksum, 2, 4, Bytes::from_static(b"ghi"));
        let bytes = frame.to_bytes().unwrap();

        // 0 001 0001
        assert_eq!(bytes[0], 0b0001_0001);
        assert_eq!(&bytes[1..], b"D0a1b2c3d:2/4|ghi");
        assert_eq!(DataFrame::from_bytes(&bytes).unwrap(), frame);
        assert_eq!(Frame::from_bytes(&bytes).unwrap(), Frame::Data(frame));
    }

    #[test]
    fn test_keepalive_frame() {
        let frame = DataFrame::keepalive(Checksum::from_u32(7), 3);
        let bytes = frame.to_bytes().unwrap();
        assert_eq!(bytes[0], 0b1001_0001);

        let decoded = DataFrame::from_bytes(&bytes).unwrap();
        assert!(decoded.keepalive);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_ack_frame_layout() {
        let frame = AckFrame::new(
            Checksum::from_u32(0xdead_beef),
            vec![AckRange::new(8, 1), AckRange::new(3, 5)],
        );
        let bytes = frame.to_bytes().unwrap();

        assert_eq!(bytes[0], 0b0001_0010);
        assert_eq!(&bytes[1..], b"Adeadbeef:8-1,3-5");
        assert_eq!(AckFrame::from_bytes(&bytes).unwrap(), frame);
        assert_eq!(Frame::from_bytes(&bytes).unwrap().kind(), FrameKind::Ack);
    }

    #[test]
    fn test_malformed_frames_are_none() {
        let data = DataFrame::new(Checksum::from_u32(1), 0, 2, Bytes::from_static(b"x"))
            .to_bytes()
            .unwrap();

        assert!(DataFrame::from_bytes(&[]).is_none());
        // 잘린 프레임
        assert!(DataFrame::from_bytes(&data[..5]).is_none());
        // 종류가 다른 프레임
        assert!(AckFrame::from_bytes(&data).is_none());

        // 다른 버전
        let mut other_version = data.to_vec();
        other_version[0] = 0b0010_0001;
        assert!(Frame::from_bytes(&other_version).is_none());

        // 알 수 없는 종류
        let mut unknown = data.to_vec();
        unknown[0] = 0b0001_1111;
        assert!(Frame::from_bytes(&unknown).is_none());

        // index >= total, total == 0
        assert!(DataFrame::from_bytes(b"\x11D00000001:2/2|x").is_none());
        assert!(DataFrame::from_bytes(b"\x11D00000001:0/0|x").is_none());
        assert!(DataFrame::from_bytes(b"\x11D00000001:1/2|x").is_some());
    }
}
