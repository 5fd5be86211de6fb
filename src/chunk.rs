//! 청크 분할과 재조립
//!
//! - Chunker: 메시지를 고정 크기 조각(0..N-1)으로 분할 (송신측)
//! - ChunkStore: 도착 순서와 무관하게 조각을 모아 원본 복원 (수신측)

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};

use crate::{Error, Result};

/// 청크 인덱스 (메시지 내 0부터 연속)
pub type ChunkIndex = u32;

/// 청크 (생성 후 불변)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: ChunkIndex,
    pub payload: Bytes,
}

/// 청크 분할기 (송신측)
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidChunkSize(chunk_size));
        }
        Ok(Self { chunk_size })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// 메시지를 청크들로 분할
    ///
    /// 인덱스 0은 오프셋 0, 마지막 청크는 chunk_size보다 짧을 수 있음.
    /// 빈 메시지도 빈 청크 하나로 보냄 (수신측이 체크섬을 알아야 완료 가능).
    pub fn split(&self, message: &Bytes) -> Vec<Chunk> {
        if message.is_empty() {
            return vec![Chunk {
                index: 0,
                payload: Bytes::new(),
            }];
        }

        (0..message.len())
            .step_by(self.chunk_size)
            .enumerate()
            .map(|(idx, offset)| {
                let end = (offset + self.chunk_size).min(message.len());
                Chunk {
                    index: idx as ChunkIndex,
                    payload: message.slice(offset..end),
                }
            })
            .collect()
    }
}

/// 인덱스 → 페이로드 맵에서 원본 복원
///
/// 0..total 중 하나라도 없으면 None (전송 중엔 정상 상태).
pub fn reassemble(chunks: &HashMap<ChunkIndex, Bytes>, total: u32) -> Option<Bytes> {
    if total == 0 {
        return None;
    }

    let mut size = 0;
    for index in 0..total {
        size += chunks.get(&index)?.len();
    }

    let mut buf = BytesMut::with_capacity(size);
    for index in 0..total {
        buf.extend_from_slice(&chunks[&index]);
    }
    Some(buf.freeze())
}

/// 수신 청크 저장소 (수신측)
#[derive(Debug, Default)]
pub struct ChunkStore {
    chunks: HashMap<ChunkIndex, Bytes>,
}

impl ChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 청크 삽입, 새 인덱스면 true
    pub fn insert(&mut self, index: ChunkIndex, payload: Bytes) -> bool {
        if self.chunks.contains_key(&index) {
            return false;
        }
        self.chunks.insert(index, payload);
        true
    }

    pub fn contains(&self, index: ChunkIndex) -> bool {
        self.chunks.contains_key(&index)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// 아직 받지 못한 인덱스 목록
    pub fn missing(&self, total: u32) -> Vec<ChunkIndex> {
        (0..total).filter(|i| !self.chunks.contains_key(i)).collect()
    }

    pub fn reassemble(&self, total: u32) -> Option<Bytes> {
        reassemble(&self.chunks, total)
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
    }
}
