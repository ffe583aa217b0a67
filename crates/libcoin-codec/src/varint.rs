//! CompactSize-style variable length integer.
//!
//! Encoding mirrors Bitcoin's `CompactSize`: values below `0xFD` encode as
//! a single byte; `0xFD`/`0xFE`/`0xFF` are prefixes for a following
//! little-endian `u16`/`u32`/`u64`.

use crate::CodecError;

const PREFIX_U16: u8 = 0xFD;
const PREFIX_U32: u8 = 0xFE;
const PREFIX_U64: u8 = 0xFF;

pub fn write_varint(value: u64, out: &mut Vec<u8>) {
    if value < PREFIX_U16 as u64 {
        out.push(value as u8);
    } else if value <= u16::MAX as u64 {
        out.push(PREFIX_U16);
        out.extend_from_slice(&(value as u16).to_le_bytes());
    } else if value <= u32::MAX as u64 {
        out.push(PREFIX_U32);
        out.extend_from_slice(&(value as u32).to_le_bytes());
    } else {
        out.push(PREFIX_U64);
        out.extend_from_slice(&value.to_le_bytes());
    }
}

pub fn read_varint(input: &mut &[u8]) -> Result<u64, CodecError> {
    let (&tag, rest) = input.split_first().ok_or(CodecError::Truncated)?;
    *input = rest;
    match tag {
        PREFIX_U16 => {
            if input.len() < 2 {
                return Err(CodecError::Truncated);
            }
            let (head, rest) = input.split_at(2);
            *input = rest;
            let value = u16::from_le_bytes(head.try_into().unwrap()) as u64;
            if value < PREFIX_U16 as u64 {
                return Err(CodecError::VarintOversize);
            }
            Ok(value)
        }
        PREFIX_U32 => {
            if input.len() < 4 {
                return Err(CodecError::Truncated);
            }
            let (head, rest) = input.split_at(4);
            *input = rest;
            let value = u32::from_le_bytes(head.try_into().unwrap()) as u64;
            if value <= u16::MAX as u64 {
                return Err(CodecError::VarintOversize);
            }
            Ok(value)
        }
        PREFIX_U64 => {
            if input.len() < 8 {
                return Err(CodecError::Truncated);
            }
            let (head, rest) = input.split_at(8);
            *input = rest;
            let value = u64::from_le_bytes(head.try_into().unwrap());
            if value <= u32::MAX as u64 {
                return Err(CodecError::VarintOversize);
            }
            Ok(value)
        }
        small => Ok(small as u64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_canonical_encoding_rejected() {
        // 0xFC fits in a single byte; encoding it via the u16 prefix is
        // non-canonical and must be rejected, not silently accepted.
        let bytes = vec![PREFIX_U16, 0xFC, 0x00];
        let mut slice = bytes.as_slice();
        assert_eq!(read_varint(&mut slice), Err(CodecError::VarintOversize));
    }

    #[test]
    fn single_byte_boundary() {
        let mut out = Vec::new();
        write_varint(0xFC, &mut out);
        assert_eq!(out, vec![0xFC]);
    }
}
