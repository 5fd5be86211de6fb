//! 필드 코덱이 주고받는 레코드
//!
//! 스키마의 필드 이름 → 값 매핑. 인코딩 입력이자 디코딩 결과.

use std::collections::BTreeMap;

use bytes::Bytes;

/// 필드 값
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// bool 필드 (1비트)
    Bool(bool),

    /// 부호 없는 정수 (bit 스키마의 num, text 스키마의 num)
    Uint(u64),

    /// '0'/'1' 문자열 (raw 필드)
    Bits(String),

    /// 고정 폭 16진수 문자열 (text 스키마 전용)
    Hex(String),

    /// 정수 쌍 목록 (text 스키마 전용, ACK 범위 운반용)
    Pairs(Vec<(u32, u32)>),

    /// 가변 길이 페이로드 (text 스키마 전용)
    Bytes(Bytes),
}

impl Value {
    /// 타입 이름 (에러 메시지용)
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Uint(_) => "uint",
            Value::Bits(_) => "bits",
            Value::Hex(_) => "hex",
            Value::Pairs(_) => "pairs",
            Value::Bytes(_) => "bytes",
        }
    }
}

/// 레코드 (필드 이름 → 값)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// 빌더 스타일 삽입
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.fields.get(name)? {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_uint(&self, name: &str) -> Option<u64> {
        match self.fields.get(name)? {
            Value::Uint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_bits(&self, name: &str) -> Option<&str> {
        match self.fields.get(name)? {
            Value::Bits(v) => Some(v),
            _ => None,
        }
    }

    pub fn get_hex(&self, name: &str) -> Option<&str> {
        match self.fields.get(name)? {
            Value::Hex(v) => Some(v),
            _ => None,
        }
    }

    pub fn get_pairs(&self, name: &str) -> Option<&[(u32, u32)]> {
        match self.fields.get(name)? {
            Value::Pairs(v) => Some(v),
            _ => None,
        }
    }

    pub fn get_bytes(&self, name: &str) -> Option<&Bytes> {
        match self.fields.get(name)? {
            Value::Bytes(v) => Some(v),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
