//! Deterministic Value (DV) codec — a canonical subset of CBOR.
//!
//! `Dv` is a closed sum type; there is no "any" value, so every producer
//! and consumer in this workspace pattern-matches on a fixed set of
//! seven variants. Encoding and decoding are both strict: `encode`
//! refuses to produce anything decode would reject, and `decode` refuses
//! any byte sequence that is not already in canonical form.

use std::collections::BTreeMap;
use std::convert::TryFrom;

/// Largest integer magnitude representable without losing precision in
/// an IEEE-754 double (`2^53 - 1`), and therefore the bound on `Dv::Int`.
pub const MAX_SAFE_INT: i64 = 9_007_199_254_740_991;
pub const MIN_SAFE_INT: i64 = -MAX_SAFE_INT;

/// A Deterministic Value: the only value shape that crosses the
/// engine/host boundary. See `SPEC_FULL.md` §3/§4.3.
#[derive(Debug, Clone, PartialEq)]
pub enum Dv {
    Null,
    Bool(bool),
    /// Always within `[MIN_SAFE_INT, MAX_SAFE_INT]`.
    Int(i64),
    /// Finite, non-integer-valued, never `-0.0`.
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Array(Vec<Dv>),
    /// Keys are unique; iteration order is the sorted byte-lexicographic
    /// order used on the wire, not insertion order.
    Map(BTreeMap<String, Dv>),
}

impl Dv {
    pub fn int(v: i64) -> Self {
        Dv::Int(v)
    }

    pub fn str(s: impl Into<String>) -> Self {
        Dv::Str(s.into())
    }

    pub fn map(entries: impl IntoIterator<Item = (String, Dv)>) -> Self {
        Dv::Map(entries.into_iter().collect())
    }
}

/// Per-call size/depth limits (§3). Defaults are generous but finite —
/// there is no "unlimited" DV limit, unlike the gas sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DvLimits {
    pub max_depth: u32,
    pub max_array_len: u32,
    pub max_map_len: u32,
    pub max_string_bytes: u32,
    pub max_encoded_bytes: u32,
}

impl Default for DvLimits {
    fn default() -> Self {
        Self {
            max_depth: 32,
            max_array_len: 1 << 20,
            max_map_len: 1 << 20,
            max_string_bytes: 1 << 24,
            max_encoded_bytes: 1 << 26,
        }
    }
}

/// DV codec failure kinds (§4.3). The offset, where known, is the byte
/// position in the input at which the violation was detected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DvError {
    #[error("unsupported type at offset {0:?}")]
    UnsupportedType(Option<usize>),
    #[error("NaN or infinite float at offset {0:?}")]
    NanOrInf(Option<usize>),
    #[error("integer out of safe range at offset {0:?}")]
    IntegerOutOfRange(Option<usize>),
    #[error("nesting depth exceeded at offset {0:?}")]
    DepthExceeded(Option<usize>),
    #[error("string exceeds maxStringBytes at offset {0:?}")]
    StringTooLong(Option<usize>),
    #[error("encoded size exceeds maxEncodedBytes")]
    EncodedTooLarge,
    #[error("string is not a valid DV string at offset {0:?}")]
    InvalidString(Option<usize>),
    #[error("input truncated at offset {0:?}")]
    Truncated(Option<usize>),
    #[error("invalid UTF-8 at offset {0:?}")]
    InvalidUtf8(Option<usize>),
    #[error("non-canonical length encoding at offset {0:?}")]
    NonCanonicalLength(Option<usize>),
    #[error("non-canonical float encoding at offset {0:?}")]
    NonCanonicalFloat(Option<usize>),
    #[error("unsupported CBOR feature at offset {0:?}")]
    UnsupportedCbor(Option<usize>),
    #[error("map keys out of order at offset {0:?}")]
    KeyOrder(Option<usize>),
    #[error("duplicate map key at offset {0:?}")]
    DuplicateKey(Option<usize>),
    #[error("array length exceeds maxArrayLen at offset {0:?}")]
    ArrayTooLong(Option<usize>),
    #[error("map length exceeds maxMapLen at offset {0:?}")]
    MapTooLong(Option<usize>),
}

pub type DvResult<T> = Result<T, DvError>;

// ── Major types ──

const MAJ_UINT: u8 = 0;
const MAJ_NINT: u8 = 1;
const MAJ_BYTES: u8 = 2;
const MAJ_TEXT: u8 = 3;
const MAJ_ARRAY: u8 = 4;
const MAJ_MAP: u8 = 5;
const MAJ_SIMPLE: u8 = 7;

const SIMPLE_FALSE: u8 = 20;
const SIMPLE_TRUE: u8 = 21;
const SIMPLE_NULL: u8 = 22;
const SIMPLE_F64: u8 = 27;

// ── Encoder ──

/// Encode a DV into its canonical byte form.
///
/// `encode(decode(b)) == b` for any `b` that decodes successfully, and
/// `decode(encode(v)) == v` for any `v` accepted here.
pub fn encode(value: &Dv, limits: &DvLimits) -> DvResult<Vec<u8>> {
    let mut buf = Vec::new();
    encode_value(value, 0, limits, &mut buf)?;
    if buf.len() as u64 > limits.max_encoded_bytes as u64 {
        return Err(DvError::EncodedTooLarge);
    }
    Ok(buf)
}

fn encode_value(value: &Dv, depth: u32, limits: &DvLimits, buf: &mut Vec<u8>) -> DvResult<()> {
    if depth > limits.max_depth {
        return Err(DvError::DepthExceeded(None));
    }
    match value {
        Dv::Null => buf.push((MAJ_SIMPLE << 5) | SIMPLE_NULL),
        Dv::Bool(false) => buf.push((MAJ_SIMPLE << 5) | SIMPLE_FALSE),
        Dv::Bool(true) => buf.push((MAJ_SIMPLE << 5) | SIMPLE_TRUE),
        Dv::Int(v) => encode_int(*v, buf)?,
        Dv::Float(f) => encode_float(*f, buf)?,
        Dv::Str(s) => encode_text(s, limits, buf)?,
        Dv::Bytes(b) => encode_bytes(b, buf),
        Dv::Array(items) => {
            if items.len() as u64 > limits.max_array_len as u64 {
                return Err(DvError::ArrayTooLong(None));
            }
            write_head(buf, MAJ_ARRAY, items.len() as u64);
            for item in items {
                encode_value(item, depth + 1, limits, buf)?;
            }
        }
        Dv::Map(entries) => {
            if entries.len() as u64 > limits.max_map_len as u64 {
                return Err(DvError::MapTooLong(None));
            }
            write_head(buf, MAJ_MAP, entries.len() as u64);
            // `BTreeMap<String, _>` iterates in byte-lexicographic key
            // order already, which is exactly the canonical order.
            for (key, val) in entries {
                encode_text(key, limits, buf)?;
                encode_value(val, depth + 1, limits, buf)?;
            }
        }
    }
    Ok(())
}

fn encode_int(v: i64, buf: &mut Vec<u8>) -> DvResult<()> {
    if !(MIN_SAFE_INT..=MAX_SAFE_INT).contains(&v) {
        return Err(DvError::IntegerOutOfRange(None));
    }
    if v >= 0 {
        write_head(buf, MAJ_UINT, v as u64);
    } else {
        // CBOR negative-integer major type stores `n` where value == -1 - n.
        let n = (-1i64 - v) as u64;
        write_head(buf, MAJ_NINT, n);
    }
    Ok(())
}

fn encode_float(f: f64, buf: &mut Vec<u8>) -> DvResult<()> {
    if f.is_nan() || f.is_infinite() {
        return Err(DvError::NanOrInf(None));
    }
    if f == 0.0 && f.is_sign_negative() {
        return Err(DvError::NanOrInf(None));
    }
    if is_safe_integer_valued(f) {
        // Integer-valued floats MUST canonicalize to integer encoding.
        return encode_int(f as i64, buf);
    }
    buf.push((MAJ_SIMPLE << 5) | SIMPLE_F64);
    buf.extend_from_slice(&f.to_be_bytes());
    Ok(())
}

fn is_safe_integer_valued(f: f64) -> bool {
    f.fract() == 0.0 && f >= MIN_SAFE_INT as f64 && f <= MAX_SAFE_INT as f64
}

fn encode_text(s: &str, limits: &DvLimits, buf: &mut Vec<u8>) -> DvResult<()> {
    validate_scalar_utf8(s)?;
    if s.len() as u64 > limits.max_string_bytes as u64 {
        return Err(DvError::StringTooLong(None));
    }
    write_head(buf, MAJ_TEXT, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn encode_bytes(b: &[u8], buf: &mut Vec<u8>) {
    write_head(buf, MAJ_BYTES, b.len() as u64);
    buf.extend_from_slice(b);
}

/// Rust `&str` is always valid UTF-8 already; this additionally rejects
/// lone surrogate halves smuggled in via `from_utf8_unchecked`-adjacent
/// paths, matching the "valid scalar values only" requirement in §3.
fn validate_scalar_utf8(s: &str) -> DvResult<()> {
    if s.chars().any(|c| (c as u32) >= 0xD800 && (c as u32) <= 0xDFFF) {
        return Err(DvError::InvalidString(None));
    }
    Ok(())
}

/// Write a CBOR head (major type + length/value) using the smallest
/// encoding that represents `value` — the canonical form.
fn write_head(buf: &mut Vec<u8>, major: u8, value: u64) {
    let mb = major << 5;
    if value < 24 {
        buf.push(mb | value as u8);
    } else if value <= u8::MAX as u64 {
        buf.push(mb | 24);
        buf.push(value as u8);
    } else if value <= u16::MAX as u64 {
        buf.push(mb | 25);
        buf.extend_from_slice(&(value as u16).to_be_bytes());
    } else if value <= u32::MAX as u64 {
        buf.push(mb | 26);
        buf.extend_from_slice(&(value as u32).to_be_bytes());
    } else {
        buf.push(mb | 27);
        buf.extend_from_slice(&value.to_be_bytes());
    }
}

// ── Decoder ──

/// Decode canonical DV bytes. Any deviation from the canonical form
/// (non-minimal lengths, key disorder, trailing garbage, …) is rejected
/// rather than tolerated.
pub fn decode(bytes: &[u8], limits: &DvLimits) -> DvResult<Dv> {
    if bytes.len() as u64 > limits.max_encoded_bytes as u64 {
        return Err(DvError::EncodedTooLarge);
    }
    let mut reader = Reader::new(bytes);
    let value = decode_value(&mut reader, 0, limits)?;
    if reader.pos != reader.data.len() {
        return Err(DvError::UnsupportedCbor(Some(reader.pos)));
    }
    Ok(value)
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> DvResult<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return Err(DvError::Truncated(Some(self.pos)));
        }
        let s = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    fn byte(&mut self) -> DvResult<u8> {
        Ok(self.take(1)?[0])
    }
}

/// Read the major type / additional-info byte and, for majors 0–5,
/// resolve the associated numeric value, enforcing canonical minimality.
fn read_head(r: &mut Reader) -> DvResult<(u8, u64)> {
    let offset = r.pos;
    let first = r.byte()?;
    let major = first >> 5;
    let info = first & 0x1F;
    let value = match info {
        0..=23 => info as u64,
        24 => {
            let v = r.byte()? as u64;
            if v < 24 {
                return Err(DvError::NonCanonicalLength(Some(offset)));
            }
            v
        }
        25 => {
            let b = r.take(2)?;
            let v = u16::from_be_bytes([b[0], b[1]]) as u64;
            if v <= u8::MAX as u64 {
                return Err(DvError::NonCanonicalLength(Some(offset)));
            }
            v
        }
        26 => {
            let b = r.take(4)?;
            let v = u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as u64;
            if v <= u16::MAX as u64 {
                return Err(DvError::NonCanonicalLength(Some(offset)));
            }
            v
        }
        27 => {
            let b = r.take(8)?;
            let v = u64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]);
            if v <= u32::MAX as u64 {
                return Err(DvError::NonCanonicalLength(Some(offset)));
            }
            v
        }
        _ => return Err(DvError::UnsupportedCbor(Some(offset))),
    };
    Ok((major, value))
}

fn decode_value(r: &mut Reader, depth: u32, limits: &DvLimits) -> DvResult<Dv> {
    if depth > limits.max_depth {
        return Err(DvError::DepthExceeded(Some(r.pos)));
    }
    let offset = r.pos;
    let first = *r
        .data
        .get(r.pos)
        .ok_or(DvError::Truncated(Some(r.pos)))?;
    let major = first >> 5;
    let info = first & 0x1F;

    if major == MAJ_SIMPLE {
        return decode_simple(r, offset, info);
    }

    let (_major, value) = read_head(r)?;
    match major {
        MAJ_UINT => {
            let v = i64::try_from(value).map_err(|_| DvError::IntegerOutOfRange(Some(offset)))?;
            if v > MAX_SAFE_INT {
                return Err(DvError::IntegerOutOfRange(Some(offset)));
            }
            Ok(Dv::Int(v))
        }
        MAJ_NINT => {
            // value == n, represents -1 - n
            if value > (i64::MAX as u64) {
                return Err(DvError::IntegerOutOfRange(Some(offset)));
            }
            let v = -1i64 - value as i64;
            if v < MIN_SAFE_INT {
                return Err(DvError::IntegerOutOfRange(Some(offset)));
            }
            Ok(Dv::Int(v))
        }
        MAJ_BYTES => {
            let bytes = r.take(value as usize)?;
            Ok(Dv::Bytes(bytes.to_vec()))
        }
        MAJ_TEXT => {
            if value > limits.max_string_bytes as u64 {
                return Err(DvError::StringTooLong(Some(offset)));
            }
            let raw = r.take(value as usize)?;
            let s = core::str::from_utf8(raw).map_err(|_| DvError::InvalidUtf8(Some(offset)))?;
            validate_scalar_utf8(s).map_err(|_| DvError::InvalidString(Some(offset)))?;
            Ok(Dv::Str(s.to_string()))
        }
        MAJ_ARRAY => {
            if value > limits.max_array_len as u64 {
                return Err(DvError::ArrayTooLong(Some(offset)));
            }
            let mut items = Vec::with_capacity(value as usize);
            for _ in 0..value {
                items.push(decode_value(r, depth + 1, limits)?);
            }
            Ok(Dv::Array(items))
        }
        MAJ_MAP => {
            if value > limits.max_map_len as u64 {
                return Err(DvError::MapTooLong(Some(offset)));
            }
            let mut map = BTreeMap::new();
            let mut last_key: Option<String> = None;
            for _ in 0..value {
                let key_offset = r.pos;
                let key = decode_map_key(r)?;
                if let Some(prev) = &last_key {
                    match prev.as_bytes().cmp(key.as_bytes()) {
                        core::cmp::Ordering::Less => {}
                        core::cmp::Ordering::Equal => {
                            return Err(DvError::DuplicateKey(Some(key_offset)))
                        }
                        core::cmp::Ordering::Greater => {
                            return Err(DvError::KeyOrder(Some(key_offset)))
                        }
                    }
                }
                let val = decode_value(r, depth + 1, limits)?;
                last_key = Some(key.clone());
                map.insert(key, val);
            }
            Ok(Dv::Map(map))
        }
        _ => Err(DvError::UnsupportedType(Some(offset))),
    }
}

fn decode_map_key(r: &mut Reader) -> DvResult<String> {
    let offset = r.pos;
    let first = *r
        .data
        .get(r.pos)
        .ok_or(DvError::Truncated(Some(r.pos)))?;
    if first >> 5 != MAJ_TEXT {
        return Err(DvError::UnsupportedType(Some(offset)));
    }
    let (_major, len) = read_head(r)?;
    let raw = r.take(len as usize)?;
    let s = core::str::from_utf8(raw).map_err(|_| DvError::InvalidUtf8(Some(offset)))?;
    validate_scalar_utf8(s).map_err(|_| DvError::InvalidString(Some(offset)))?;
    Ok(s.to_string())
}

fn decode_simple(r: &mut Reader, offset: usize, info: u8) -> DvResult<Dv> {
    r.byte()?; // consume the head byte already peeked
    match info {
        SIMPLE_FALSE => Ok(Dv::Bool(false)),
        SIMPLE_TRUE => Ok(Dv::Bool(true)),
        SIMPLE_NULL => Ok(Dv::Null),
        SIMPLE_F64 => {
            let b = r.take(8)?;
            let f = f64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]);
            if f.is_nan() || f.is_infinite() {
                return Err(DvError::NanOrInf(Some(offset)));
            }
            if f == 0.0 && f.is_sign_negative() {
                return Err(DvError::NanOrInf(Some(offset)));
            }
            if is_safe_integer_valued(f) {
                return Err(DvError::NonCanonicalFloat(Some(offset)));
            }
            Ok(Dv::Float(f))
        }
        25 | 26 => Err(DvError::NonCanonicalFloat(Some(offset))),
        _ => Err(DvError::UnsupportedCbor(Some(offset))),
    }
}
