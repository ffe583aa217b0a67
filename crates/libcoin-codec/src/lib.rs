//! Wire encoding primitives used by wallet records on disk.
//!
//! Three building blocks: a CompactSize-style varint, a length-prefixed
//! varstr, and a generic container (length-prefixed sequence of
//! encodable elements). Everything here is slice-based: decoding
//! advances the input slice in place rather than taking a `Read`.

use std::fmt;

mod varint;

pub use varint::{read_varint, write_varint};

/// Errors produced while decoding a wire record.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("input ended before expected field was fully read")]
    Truncated,
    #[error("varint encodes a value too large for this field")]
    VarintOversize,
    #[error("trailing bytes after decoding a record")]
    TrailingBytes,
}

/// Types that can serialize themselves onto a growable byte buffer.
pub trait Encodable {
    fn encode(&self, out: &mut Vec<u8>);

    /// Convenience: encode into a freshly allocated buffer.
    fn encode_to_vec(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }
}

/// Types that can reconstruct themselves from the front of a byte slice.
///
/// On success the slice is advanced past the bytes consumed; on failure
/// the slice position is unspecified and the input should be discarded.
pub trait Decodable: Sized {
    fn decode(input: &mut &[u8]) -> Result<Self, CodecError>;

    /// Decode a value and require the slice to be fully consumed.
    fn decode_exact(mut input: &[u8]) -> Result<Self, CodecError> {
        let value = Self::decode(&mut input)?;
        if !input.is_empty() {
            return Err(CodecError::TrailingBytes);
        }
        Ok(value)
    }
}

impl Encodable for u8 {
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(*self);
    }
}

impl Decodable for u8 {
    fn decode(input: &mut &[u8]) -> Result<Self, CodecError> {
        let (&byte, rest) = input.split_first().ok_or(CodecError::Truncated)?;
        *input = rest;
        Ok(byte)
    }
}

impl Encodable for bool {
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(if *self { 1 } else { 0 });
    }
}

impl Decodable for bool {
    fn decode(input: &mut &[u8]) -> Result<Self, CodecError> {
        Ok(u8::decode(input)? != 0)
    }
}

macro_rules! impl_fixed_int {
    ($t:ty, $n:expr) => {
        impl Encodable for $t {
            fn encode(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }
        }

        impl Decodable for $t {
            fn decode(input: &mut &[u8]) -> Result<Self, CodecError> {
                if input.len() < $n {
                    return Err(CodecError::Truncated);
                }
                let (head, rest) = input.split_at($n);
                *input = rest;
                let mut buf = [0u8; $n];
                buf.copy_from_slice(head);
                Ok(<$t>::from_le_bytes(buf))
            }
        }
    };
}

impl_fixed_int!(i32, 4);
impl_fixed_int!(i64, 8);
impl_fixed_int!(u32, 4);

impl Encodable for u64 {
    fn encode(&self, out: &mut Vec<u8>) {
        write_varint(*self, out);
    }
}

impl Decodable for u64 {
    fn decode(input: &mut &[u8]) -> Result<Self, CodecError> {
        read_varint(input)
    }
}

/// Length-prefixed byte string: a varint length followed by that many bytes.
impl Encodable for Vec<u8> {
    fn encode(&self, out: &mut Vec<u8>) {
        write_varint(self.len() as u64, out);
        out.extend_from_slice(self);
    }
}

impl Decodable for Vec<u8> {
    fn decode(input: &mut &[u8]) -> Result<Self, CodecError> {
        let len = read_varint(input)? as usize;
        if input.len() < len {
            return Err(CodecError::Truncated);
        }
        let (head, rest) = input.split_at(len);
        *input = rest;
        Ok(head.to_vec())
    }
}

/// A length-prefixed UTF-8 string (varstr).
///
/// Invalid UTF-8 is reported as [`CodecError::Truncated`] since the wire
/// format carries no distinct "bad encoding" signal for this case — an
/// on-disk string field that isn't valid UTF-8 is as good as absent.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct VarStr(pub String);

impl fmt::Display for VarStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for VarStr {
    fn from(s: &str) -> Self {
        VarStr(s.to_string())
    }
}

impl From<String> for VarStr {
    fn from(s: String) -> Self {
        VarStr(s)
    }
}

impl Encodable for VarStr {
    fn encode(&self, out: &mut Vec<u8>) {
        let bytes = self.0.as_bytes().to_vec();
        bytes.encode(out);
    }
}

impl Decodable for VarStr {
    fn decode(input: &mut &[u8]) -> Result<Self, CodecError> {
        let bytes = Vec::<u8>::decode(input)?;
        let s = String::from_utf8(bytes).map_err(|_| CodecError::Truncated)?;
        Ok(VarStr(s))
    }
}

/// Encode a homogeneous sequence as a varint length followed by each
/// element's own encoding, in order.
///
/// `Vec<u8>` has its own [`Encodable`] impl above (a byte string, not a
/// container of individually-encoded elements), so containers of other
/// element types go through these free functions rather than a second
/// blanket `Vec<T>` impl, which would conflict with it.
pub fn encode_seq<T: Encodable>(items: &[T], out: &mut Vec<u8>) {
    write_varint(items.len() as u64, out);
    for item in items {
        item.encode(out);
    }
}

/// Decode a sequence previously written by [`encode_seq`].
pub fn decode_seq<T: Decodable>(input: &mut &[u8]) -> Result<Vec<T>, CodecError> {
    let len = read_varint(input)? as usize;
    let mut items = Vec::with_capacity(len.min(1 << 20));
    for _ in 0..len {
        items.push(T::decode(input)?);
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u8_roundtrip() {
        for b in [0u8, 1, 127, 128, 255] {
            let bytes = b.encode_to_vec();
            assert_eq!(u8::decode_exact(&bytes).unwrap(), b);
        }
    }

    #[test]
    fn bool_roundtrip() {
        assert_eq!(bool::decode_exact(&true.encode_to_vec()).unwrap(), true);
        assert_eq!(bool::decode_exact(&false.encode_to_vec()).unwrap(), false);
    }

    #[test]
    fn fixed_ints_roundtrip() {
        for v in [i32::MIN, -1, 0, 1, i32::MAX] {
            assert_eq!(i32::decode_exact(&v.encode_to_vec()).unwrap(), v);
        }
        for v in [i64::MIN, -1, 0, 1, i64::MAX] {
            assert_eq!(i64::decode_exact(&v.encode_to_vec()).unwrap(), v);
        }
        for v in [0u32, 1, u32::MAX] {
            assert_eq!(u32::decode_exact(&v.encode_to_vec()).unwrap(), v);
        }
    }

    #[test]
    fn varint_roundtrip_boundaries() {
        for v in [0u64, 0xFC, 0xFD, 0xFFFF, 0x1_0000, 0xFFFF_FFFF, 0x1_0000_0000, u64::MAX] {
            let bytes = v.encode_to_vec();
            assert_eq!(u64::decode_exact(&bytes).unwrap(), v);
        }
    }

    #[test]
    fn varint_encoding_length_matches_magnitude() {
        assert_eq!(0xFCu64.encode_to_vec().len(), 1);
        assert_eq!(0xFDu64.encode_to_vec().len(), 3);
        assert_eq!(0xFFFFu64.encode_to_vec().len(), 3);
        assert_eq!(0x1_0000u64.encode_to_vec().len(), 5);
        assert_eq!(0xFFFF_FFFFu64.encode_to_vec().len(), 5);
        assert_eq!((0xFFFF_FFFFu64 + 1).encode_to_vec().len(), 9);
    }

    #[test]
    fn varstr_roundtrip() {
        let s = VarStr::from("hello wallet");
        let bytes = s.encode_to_vec();
        assert_eq!(VarStr::decode_exact(&bytes).unwrap(), s);
    }

    #[test]
    fn varstr_empty_roundtrip() {
        let s = VarStr::from("");
        let bytes = s.encode_to_vec();
        assert_eq!(VarStr::decode_exact(&bytes).unwrap(), s);
    }

    #[test]
    fn truncated_input_errors() {
        let bytes = 0x1_0000u64.encode_to_vec();
        let short = &bytes[..bytes.len() - 1];
        assert_eq!(u64::decode_exact(short), Err(CodecError::Truncated));
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = 5u64.encode_to_vec();
        bytes.push(0xAA);
        assert_eq!(u64::decode_exact(&bytes), Err(CodecError::TrailingBytes));
    }

    #[test]
    fn vec_u8_roundtrip() {
        let v: Vec<u8> = vec![1, 2, 3, 4, 5];
        let bytes = v.encode_to_vec();
        assert_eq!(Vec::<u8>::decode_exact(&bytes).unwrap(), v);
    }

    #[test]
    fn container_roundtrip() {
        let items: Vec<u32> = vec![1, 2, 3, 4, 0xFFFF_FFFF];
        let mut bytes = Vec::new();
        encode_seq(&items, &mut bytes);
        let mut slice = bytes.as_slice();
        let decoded: Vec<u32> = decode_seq(&mut slice).unwrap();
        assert!(slice.is_empty());
        assert_eq!(decoded, items);
    }

    #[test]
    fn container_empty_roundtrip() {
        let items: Vec<u32> = vec![];
        let mut bytes = Vec::new();
        encode_seq(&items, &mut bytes);
        let mut slice = bytes.as_slice();
        let decoded: Vec<u32> = decode_seq(&mut slice).unwrap();
        assert_eq!(decoded, items);
    }

    #[test]
    fn vec_u8_truncated() {
        let v: Vec<u8> = vec![1, 2, 3];
        let mut bytes = v.encode_to_vec();
        bytes.truncate(bytes.len() - 1);
        assert_eq!(Vec::<u8>::decode_exact(&bytes), Err(CodecError::Truncated));
    }
}
