//! 구분자 기반 텍스트 필드 코덱
//!
//! 청크 페이로드와 ACK 범위 목록처럼 길이가 데이터에 따라 달라지는 필드용.
//! 스키마는 리터럴과 `{이름:종류}` 자리표시자의 나열:
//!
//! ```text
//! D{checksum:hex8}:{index:num}/{total:num}|{payload:bytes}
//! ```
//!
//! 종류:
//! - `num`: 10진 부호 없는 정수
//! - `hexN`: 정확히 N자리 16진수 (1 <= N <= 16)
//! - `pairs`: `a-b,c-d` 형식의 u32 쌍 목록 (빈 목록 허용)
//! - `bytes`: 나머지 전부 (임의 바이너리, 마지막 필드만 가능)
//!
//! UTF-8 문자열이 아니라 바이트 위에서 동작하므로 페이로드는 아무 바이트나 가능.

use std::collections::HashSet;

use bytes::Bytes;

use crate::record::{Record, Value};
use crate::{Error, Result};

/// 텍스트 필드 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFieldKind {
    Num,
    Hex(usize),
    Pairs,
    Bytes,
}

impl TextFieldKind {
    /// 이 필드가 읽어들일 수 있는 바이트인지 (뒤따르는 리터럴과 충돌 검사용)
    fn consumes(&self, b: u8) -> bool {
        match self {
            TextFieldKind::Num => b.is_ascii_digit(),
            TextFieldKind::Pairs => b.is_ascii_digit() || b == b'-' || b == b',',
            TextFieldKind::Hex(_) => false,
            TextFieldKind::Bytes => true,
        }
    }

    fn is_delimited(&self) -> bool {
        matches!(self, TextFieldKind::Num | TextFieldKind::Pairs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(Vec<u8>),
    Field { name: String, kind: TextFieldKind },
}

/// 컴파일된 텍스트 코덱
#[derive(Debug, Clone)]
pub struct TextCodec {
    segments: Vec<Segment>,
}

impl TextCodec {
    /// 스키마 문자열 파싱 + 검증
    pub fn compile(pattern: &str) -> Result<Self> {
        let segments = parse_segments(pattern)?;
        validate(&segments)?;
        Ok(Self { segments })
    }

    /// 레코드 → 바이트
    pub fn encode(&self, record: &Record) -> Result<Vec<u8>> {
        let mut buf = Vec::new();

        for segment in &self.segments {
            let (name, kind) = match segment {
                Segment::Literal(lit) => {
                    buf.extend_from_slice(lit);
                    continue;
                }
                Segment::Field { name, kind } => (name, *kind),
            };

            let value = record
                .get(name)
                .ok_or_else(|| Error::MissingField(name.clone()))?;

            match (kind, value) {
                (TextFieldKind::Num, Value::Uint(v)) => {
                    buf.extend_from_slice(v.to_string().as_bytes());
                }
                (TextFieldKind::Hex(width), Value::Hex(s)) => {
                    if s.len() != width || !s.bytes().all(is_lower_hex) {
                        return Err(Error::InvalidHex {
                            field: name.clone(),
                            width,
                            got: s.clone(),
                        });
                    }
                    buf.extend_from_slice(s.as_bytes());
                }
                (TextFieldKind::Pairs, Value::Pairs(pairs)) => {
                    for (i, (a, b)) in pairs.iter().enumerate() {
                        if i > 0 {
                            buf.push(b',');
                        }
                        buf.extend_from_slice(format!("{a}-{b}").as_bytes());
                    }
                }
                (TextFieldKind::Bytes, Value::Bytes(data)) => {
                    buf.extend_from_slice(data);
                }
                (kind, other) => {
                    return Err(Error::TypeMismatch {
                        field: name.clone(),
                        expected: kind_name(kind),
                        found: other.kind_name(),
                    });
                }
            }
        }

        Ok(buf)
    }

    /// 바이트 → 레코드
    ///
    /// 리터럴 불일치, 빈 숫자, 오버플로우, 잘못된 16진수/쌍, 남는 바이트는 전부 None.
    pub fn decode(&self, data: &[u8]) -> Option<Record> {
        let mut record = Record::new();
        let mut rest = data;

        for segment in &self.segments {
            match segment {
                Segment::Literal(lit) => {
                    rest = rest.strip_prefix(lit.as_slice())?;
                }
                Segment::Field { name, kind } => {
                    let (value, tail) = decode_field(*kind, rest)?;
                    record.insert(name.clone(), value);
                    rest = tail;
                }
            }
        }

        if !rest.is_empty() {
            return None;
        }
        Some(record)
    }
}

fn decode_field(kind: TextFieldKind, data: &[u8]) -> Option<(Value, &[u8])> {
    match kind {
        TextFieldKind::Num => {
            let len = data.iter().take_while(|b| b.is_ascii_digit()).count();
            if len == 0 {
                return None;
            }
            let v = std::str::from_utf8(&data[..len]).ok()?.parse::<u64>().ok()?;
            Some((Value::Uint(v), &data[len..]))
        }
        TextFieldKind::Hex(width) => {
            let digits = data.get(..width)?;
            if !digits.iter().copied().all(is_lower_hex) {
                return None;
            }
            let s = std::str::from_utf8(digits).ok()?.to_owned();
            Some((Value::Hex(s), &data[width..]))
        }
        TextFieldKind::Pairs => {
            let len = data.iter().take_while(|b| kind.consumes(**b)).count();
            let text = std::str::from_utf8(&data[..len]).ok()?;
            Some((Value::Pairs(parse_pairs(text)?), &data[len..]))
        }
        TextFieldKind::Bytes => Some((Value::Bytes(Bytes::copy_from_slice(data)), &data[data.len()..])),
    }
}

/// 16진수는 소문자만 (대문자는 인코딩/디코딩 모두 거부)
fn is_lower_hex(b: u8) -> bool {
    b.is_ascii_digit() || (b'a'..=b'f').contains(&b)
}

fn parse_pairs(text: &str) -> Option<Vec<(u32, u32)>> {
    if text.is_empty() {
        return Some(Vec::new());
    }
    text.split(',')
        .map(|pair| {
            let (a, b) = pair.split_once('-')?;
            if a.is_empty() || b.is_empty() {
                return None;
            }
            Some((a.parse().ok()?, b.parse().ok()?))
        })
        .collect()
}

fn parse_segments(pattern: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut rest = pattern;

    while !rest.is_empty() {
        match rest.find('{') {
            Some(0) => {
                let (body, tail) = rest[1..]
                    .split_once('}')
                    .ok_or_else(|| Error::SchemaSyntax(format!("닫히지 않은 필드: {rest:?}")))?;
                segments.push(parse_placeholder(body)?);
                rest = tail;
            }
            Some(pos) => {
                segments.push(literal(&rest[..pos])?);
                rest = &rest[pos..];
            }
            None => {
                segments.push(literal(rest)?);
                rest = "";
            }
        }
    }

    if segments.is_empty() {
        return Err(Error::SchemaSyntax("빈 스키마".into()));
    }
    Ok(segments)
}

fn literal(text: &str) -> Result<Segment> {
    if !text.is_ascii() || text.contains('}') {
        return Err(Error::SchemaSyntax(format!("리터럴은 ASCII만 가능: {text:?}")));
    }
    Ok(Segment::Literal(text.as_bytes().to_vec()))
}

fn parse_placeholder(body: &str) -> Result<Segment> {
    let (name, kind) = body
        .split_once(':')
        .ok_or_else(|| Error::SchemaSyntax(format!("'{{이름:종류}}' 형식이 아님: {{{body}}}")))?;
    if name.is_empty() {
        return Err(Error::SchemaSyntax(format!("필드 이름 누락: {{{body}}}")));
    }

    let kind = match kind {
        "num" => TextFieldKind::Num,
        "pairs" => TextFieldKind::Pairs,
        "bytes" => TextFieldKind::Bytes,
        hex if hex.starts_with("hex") => {
            let width: usize = hex[3..]
                .parse()
                .map_err(|_| Error::SchemaSyntax(format!("hex 폭이 숫자가 아님: {hex:?}")))?;
            if width == 0 || width > 16 {
                return Err(Error::HexWidth {
                    field: name.to_string(),
                    width,
                });
            }
            TextFieldKind::Hex(width)
        }
        other => {
            return Err(Error::SchemaSyntax(format!("알 수 없는 필드 종류: {other:?}")));
        }
    };

    Ok(Segment::Field {
        name: name.to_string(),
        kind,
    })
}

fn validate(segments: &[Segment]) -> Result<()> {
    let mut names = HashSet::new();

    for (i, segment) in segments.iter().enumerate() {
        let Segment::Field { name, kind } = segment else {
            continue;
        };
        if !names.insert(name.as_str()) {
            return Err(Error::DuplicateField(name.clone()));
        }

        let next = segments.get(i + 1);
        let ambiguous = match (kind, next) {
            // bytes는 나머지를 전부 먹으므로 마지막이어야 함
            (TextFieldKind::Bytes, Some(_)) => true,
            (k, Some(Segment::Field { .. })) if k.is_delimited() => true,
            (k, Some(Segment::Literal(lit))) if k.is_delimited() => {
                lit.first().map_or(true, |b| k.consumes(*b))
            }
            _ => false,
        };
        if ambiguous {
            return Err(Error::AmbiguousField { field: name.clone() });
        }
    }
    Ok(())
}

fn kind_name(kind: TextFieldKind) -> &'static str {
    match kind {
        TextFieldKind::Num => "uint",
        TextFieldKind::Hex(_) => "hex",
        TextFieldKind::Pairs => "pairs",
        TextFieldKind::Bytes => "bytes",
    }
}
