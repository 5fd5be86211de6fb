//! 비트 필드 코덱
//!
//! `<flag:bool-1><count:num-3><type-4>` 같은 스키마를 한 번 컴파일해
//! 레코드 ↔ 바이트 버퍼 변환기로 사용함.
//!
//! - 스키마 순서대로 big-endian 비트스트림으로 패킹 (바이트 내 MSB 우선)
//! - 마지막 부분 바이트는 0으로 패딩
//! - 인코딩 길이 = ceil(전체 비트 / 8)

use std::collections::HashSet;

use crate::record::{Record, Value};
use crate::{Error, Result};

/// uint 필드 최대 폭 (와이어상 가장 큰 카운트가 1바이트에 들어감)
pub const MAX_UINT_WIDTH: u32 = 8;

/// 필드 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Bool,
    Uint,
    Raw,
}

/// 필드 정의
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub width: u32,
}

/// 컴파일 전 스키마
#[derive(Debug, Clone, Default)]
pub struct FieldSchema {
    fields: Vec<FieldSpec>,
}

impl FieldSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// 필드 추가 (검증은 compile 시점)
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind, width: u32) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind,
            width,
        });
        self
    }

    /// 스키마 문자열 파싱
    ///
    /// 형식: `<이름:bool-폭>`, `<이름:num-폭>`, `<이름:raw-폭>`, `<이름-폭>`(raw)
    pub fn parse(pattern: &str) -> Result<Self> {
        let mut schema = Self::new();
        let mut rest = pattern.trim();

        while !rest.is_empty() {
            let (body, tail) = rest
                .strip_prefix('<')
                .and_then(|r| r.split_once('>'))
                .ok_or_else(|| Error::SchemaSyntax(format!("'<이름:종류-폭>' 형식이 아님: {rest:?}")))?;
            schema.fields.push(parse_field(body)?);
            rest = tail;
        }

        if schema.fields.is_empty() {
            return Err(Error::SchemaSyntax("필드 없음".into()));
        }
        Ok(schema)
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// 코덱으로 컴파일
    pub fn compile(&self) -> Result<Codec> {
        Codec::compile(self)
    }
}

fn parse_field(body: &str) -> Result<FieldSpec> {
    let (head, width) = body
        .rsplit_once('-')
        .ok_or_else(|| Error::SchemaSyntax(format!("폭 누락: <{body}>")))?;
    let width: u32 = width
        .parse()
        .map_err(|_| Error::SchemaSyntax(format!("폭이 숫자가 아님: <{body}>")))?;

    let (name, kind) = match head.split_once(':') {
        Some((name, "bool")) => (name, FieldKind::Bool),
        Some((name, "num" | "uint")) => (name, FieldKind::Uint),
        Some((name, "raw")) => (name, FieldKind::Raw),
        Some((_, other)) => {
            return Err(Error::SchemaSyntax(format!("알 수 없는 필드 종류: {other:?}")));
        }
        None => (head, FieldKind::Raw),
    };

    if name.is_empty() {
        return Err(Error::SchemaSyntax(format!("필드 이름 누락: <{body}>")));
    }

    Ok(FieldSpec {
        name: name.to_string(),
        kind,
        width,
    })
}

/// 컴파일된 비트 필드 코덱 (불변, 재사용)
#[derive(Debug, Clone)]
pub struct Codec {
    fields: Vec<FieldSpec>,
    total_bits: usize,
}

impl Codec {
    /// 스키마 검증 후 컴파일
    pub fn compile(schema: &FieldSchema) -> Result<Self> {
        let mut names = HashSet::new();
        let mut total_bits = 0usize;

        for field in &schema.fields {
            match field.kind {
                FieldKind::Bool if field.width != 1 => {
                    return Err(Error::BoolWidth {
                        field: field.name.clone(),
                        width: field.width,
                    });
                }
                FieldKind::Uint if field.width == 0 || field.width > MAX_UINT_WIDTH => {
                    return Err(Error::UintWidth {
                        field: field.name.clone(),
                        width: field.width,
                    });
                }
                FieldKind::Raw if field.width == 0 => {
                    return Err(Error::RawWidth {
                        field: field.name.clone(),
                    });
                }
                _ => {}
            }

            if !names.insert(field.name.as_str()) {
                return Err(Error::DuplicateField(field.name.clone()));
            }
            total_bits += field.width as usize;
        }

        Ok(Self {
            fields: schema.fields.clone(),
            total_bits,
        })
    }

    /// 스키마 문자열에서 바로 컴파일
    pub fn from_pattern(pattern: &str) -> Result<Self> {
        FieldSchema::parse(pattern)?.compile()
    }

    pub fn total_bits(&self) -> usize {
        self.total_bits
    }

    /// 인코딩된 바이트 길이
    pub fn byte_len(&self) -> usize {
        (self.total_bits + 7) / 8
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// 레코드 → 바이트
    pub fn encode(&self, record: &Record) -> Result<Vec<u8>> {
        let mut writer = BitWriter::with_capacity(self.byte_len());

        for field in &self.fields {
            let value = record
                .get(&field.name)
                .ok_or_else(|| Error::MissingField(field.name.clone()))?;

            match (field.kind, value) {
                (FieldKind::Bool, Value::Bool(v)) => writer.write_bits(*v as u64, 1),
                (FieldKind::Uint, Value::Uint(v)) => {
                    let max = (1u64 << field.width) - 1;
                    if *v > max {
                        return Err(Error::ValueOutOfRange {
                            field: field.name.clone(),
                            value: *v,
                            max,
                        });
                    }
                    writer.write_bits(*v, field.width);
                }
                (FieldKind::Raw, Value::Bits(bits)) => {
                    let valid = bits.len() == field.width as usize
                        && bits.bytes().all(|b| b == b'0' || b == b'1');
                    if !valid {
                        return Err(Error::InvalidBits {
                            field: field.name.clone(),
                            width: field.width,
                            got: bits.clone(),
                        });
                    }
                    for b in bits.bytes() {
                        writer.write_bits((b == b'1') as u64, 1);
                    }
                }
                (kind, other) => {
                    return Err(Error::TypeMismatch {
                        field: field.name.clone(),
                        expected: kind_name(kind),
                        found: other.kind_name(),
                    });
                }
            }
        }

        Ok(writer.finish())
    }

    /// 바이트 → 레코드
    ///
    /// 필요한 비트보다 짧은 입력은 None (손실 채널에서 흔한 일).
    /// 인코딩 길이 뒤의 바이트는 무시함.
    pub fn decode(&self, data: &[u8]) -> Option<Record> {
        if data.len() * 8 < self.total_bits {
            return None;
        }

        let mut reader = BitReader::new(data);
        let mut record = Record::new();

        for field in &self.fields {
            let value = match field.kind {
                FieldKind::Bool => Value::Bool(reader.read_bits(1)? == 1),
                FieldKind::Uint => Value::Uint(reader.read_bits(field.width)?),
                FieldKind::Raw => {
                    let mut bits = String::with_capacity(field.width as usize);
                    for _ in 0..field.width {
                        bits.push(if reader.read_bits(1)? == 1 { '1' } else { '0' });
                    }
                    Value::Bits(bits)
                }
            };
            record.insert(field.name.clone(), value);
        }

        Some(record)
    }
}

fn kind_name(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Bool => "bool",
        FieldKind::Uint => "uint",
        FieldKind::Raw => "bits",
    }
}

/// MSB 우선 비트 기록기
struct BitWriter {
    bytes: Vec<u8>,
    /// 현재 부분 바이트 (MSB 정렬)
    bit_buffer: u8,
    /// bit_buffer에 들어있는 비트 수 (0~7)
    bit_count: u32,
}

impl BitWriter {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            bit_buffer: 0,
            bit_count: 0,
        }
    }

    /// value의 하위 count 비트를 MSB부터 기록 (count <= 8)
    fn write_bits(&mut self, value: u64, count: u32) {
        for shift in (0..count).rev() {
            let bit = ((value >> shift) & 1) as u8;
            self.bit_buffer |= bit << (7 - self.bit_count);
            self.bit_count += 1;

            if self.bit_count == 8 {
                self.bytes.push(self.bit_buffer);
                self.bit_buffer = 0;
                self.bit_count = 0;
            }
        }
    }

    /// 남은 비트는 0 패딩
    fn finish(mut self) -> Vec<u8> {
        if self.bit_count > 0 {
            self.bytes.push(self.bit_buffer);
        }
        self.bytes
    }
}

/// MSB 우선 비트 판독기
struct BitReader<'a> {
    data: &'a [u8],
    bit_position: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            bit_position: 0,
        }
    }

    fn read_bits(&mut self, count: u32) -> Option<u64> {
        let mut result = 0u64;
        for _ in 0..count {
            let byte = *self.data.get(self.bit_position / 8)?;
            let bit = (byte >> (7 - self.bit_position % 8)) & 1;
            result = (result << 1) | bit as u64;
            self.bit_position += 1;
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> Record {
        Record::new()
            .with("flag", Value::Bool(true))
            .with("count", Value::Uint(6))
            .with("type", Value::Bits("0000".into()))
    }

    #[test]
    fn test_encode_single_byte() {
        let codec = Codec::from_pattern("<flag:bool-1><count:num-3><type-4>").unwrap();
        assert_eq!(codec.byte_len(), 1);

        let bytes = codec.encode(&sample_record()).unwrap();
        assert_eq!(bytes, vec![0xE0]);

        let decoded = codec.decode(&[0xE0]).unwrap();
        assert_eq!(decoded, sample_record());
    }

    #[test]
    fn test_trailing_bits_zero_padded() {
        let codec = Codec::from_pattern("<a:num-5><b:bool-1><c:raw-7>").unwrap();
        assert_eq!(codec.total_bits(), 13);
        assert_eq!(codec.byte_len(), 2);

        let record = Record::new()
            .with("a", Value::Uint(0b10101))
            .with("b", Value::Bool(true))
            .with("c", Value::Bits("1111111".into()));
        let bytes = codec.encode(&record).unwrap();
        // 10101 1 11 | 11111 000
        assert_eq!(bytes, vec![0b1010_1111, 0b1111_1000]);
        assert_eq!(codec.decode(&bytes).unwrap(), record);
    }

    #[test]
    fn test_round_trip_every_uint_value() {
        for width in 1..=MAX_UINT_WIDTH {
            let codec = FieldSchema::new()
                .field("lead", FieldKind::Bool, 1)
                .field("n", FieldKind::Uint, width)
                .compile()
                .unwrap();
            for v in 0..(1u64 << width) {
                let record = Record::new()
                    .with("lead", Value::Bool(v % 2 == 0))
                    .with("n", Value::Uint(v));
                let bytes = codec.encode(&record).unwrap();
                assert_eq!(codec.decode(&bytes).unwrap(), record);
            }
        }
    }

    #[test]
    fn test_uint_out_of_range_rejected() {
        let codec = Codec::from_pattern("<count:num-3>").unwrap();
        let err = codec
            .encode(&Record::new().with("count", Value::Uint(8)))
            .unwrap_err();
        assert_eq!(
            err,
            Error::ValueOutOfRange {
                field: "count".into(),
                value: 8,
                max: 7
            }
        );

        let full = Codec::from_pattern("<n:num-8>").unwrap();
        assert!(full.encode(&Record::new().with("n", Value::Uint(255))).is_ok());
        assert!(full.encode(&Record::new().with("n", Value::Uint(256))).is_err());
    }

    #[test]
    fn test_bool_width_rejected_at_compile() {
        let err = Codec::from_pattern("<flag:bool-2>").unwrap_err();
        assert!(matches!(err, Error::BoolWidth { width: 2, .. }));

        let err = FieldSchema::new()
            .field("flag", FieldKind::Bool, 0)
            .compile()
            .unwrap_err();
        assert!(matches!(err, Error::BoolWidth { width: 0, .. }));
    }

    #[test]
    fn test_uint_width_limit() {
        assert!(matches!(
            Codec::from_pattern("<n:num-9>").unwrap_err(),
            Error::UintWidth { width: 9, .. }
        ));
        assert!(matches!(
            Codec::from_pattern("<n:num-0>").unwrap_err(),
            Error::UintWidth { width: 0, .. }
        ));
    }

    #[test]
    fn test_raw_value_validation() {
        let codec = Codec::from_pattern("<type-4>").unwrap();
        for bad in ["000", "00000", "0a01", ""] {
            let err = codec
                .encode(&Record::new().with("type", Value::Bits(bad.into())))
                .unwrap_err();
            assert!(matches!(err, Error::InvalidBits { width: 4, .. }), "{bad:?}");
        }
    }

    #[test]
    fn test_missing_and_mismatched_fields() {
        let codec = Codec::from_pattern("<flag:bool-1><count:num-3>").unwrap();

        let err = codec
            .encode(&Record::new().with("flag", Value::Bool(false)))
            .unwrap_err();
        assert_eq!(err, Error::MissingField("count".into()));

        let err = codec
            .encode(
                &Record::new()
                    .with("flag", Value::Uint(1))
                    .with("count", Value::Uint(1)),
            )
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { expected: "bool", found: "uint", .. }));
    }

    #[test]
    fn test_decode_short_input_is_none() {
        let codec = Codec::from_pattern("<a:num-8><b:num-8>").unwrap();
        assert!(codec.decode(&[]).is_none());
        assert!(codec.decode(&[0xFF]).is_none());
        // 뒤에 붙은 바이트는 무시
        let record = codec.decode(&[1, 2, 3]).unwrap();
        assert_eq!(record.get_uint("a"), Some(1));
        assert_eq!(record.get_uint("b"), Some(2));
    }

    #[test]
    fn test_schema_syntax_errors() {
        for bad in ["", "flag:bool-1", "<flag:bool>", "<flag:float-4>", "<:num-3>", "<a:num-x>", "<a-1>junk"] {
            assert!(
                matches!(FieldSchema::parse(bad), Err(Error::SchemaSyntax(_))),
                "{bad:?}"
            );
        }
        assert_eq!(
            Codec::from_pattern("<a:num-3><a-2>").unwrap_err(),
            Error::DuplicateField("a".into())
        );
    }
}
