// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Fixed-width integer fields exchanged with the peripheral.

use super::ble_constants::PillboxCharacteristic;
use crate::error::EncodingError;

/// Width of an integer characteristic value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldWidth {
    U8,
    U16,
    U32,
}

impl FieldWidth {
    pub fn bytes(&self) -> usize {
        match self {
            FieldWidth::U8 => 1,
            FieldWidth::U16 => 2,
            FieldWidth::U32 => 4,
        }
    }

    pub fn max_value(&self) -> u64 {
        match self {
            FieldWidth::U8 => u8::MAX as u64,
            FieldWidth::U16 => u16::MAX as u64,
            FieldWidth::U32 => u32::MAX as u64,
        }
    }
}

/// Byte order of an encoded field. The pillbox only speaks little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

/// Encode `value` into exactly `width` bytes.
pub fn encode(value: i64, width: FieldWidth, order: ByteOrder) -> Result<Vec<u8>, EncodingError> {
    if value < 0 || value as u64 > width.max_value() {
        return Err(EncodingError::OutOfRange {
            value,
            width: width.bytes(),
        });
    }

    let le = (value as u64).to_le_bytes();
    let mut bytes = le[..width.bytes()].to_vec();
    if order == ByteOrder::Big {
        bytes.reverse();
    }
    Ok(bytes)
}

pub fn encode_u8(value: i64) -> Result<Vec<u8>, EncodingError> {
    encode(value, FieldWidth::U8, ByteOrder::Little)
}

pub fn encode_u16(value: i64) -> Result<Vec<u8>, EncodingError> {
    encode(value, FieldWidth::U16, ByteOrder::Little)
}

pub fn encode_u32(value: i64) -> Result<Vec<u8>, EncodingError> {
    encode(value, FieldWidth::U32, ByteOrder::Little)
}

/// Encode `value` for the characteristic `role`, at the width the protocol
/// assigns to it.
pub fn encode_field(role: PillboxCharacteristic, value: i64) -> Result<Vec<u8>, EncodingError> {
    let width = role.width().ok_or(EncodingError::NotNumeric(role))?;
    encode(value, width, ByteOrder::Little)
}

/// Decode a little-endian u32 from the first four bytes.
///
/// Trailing bytes are ignored.
pub fn decode_u32_le(bytes: &[u8]) -> Result<u32, EncodingError> {
    let head: [u8; 4] = bytes
        .get(..4)
        .and_then(|head| head.try_into().ok())
        .ok_or(EncodingError::Truncated {
            expected: 4,
            actual: bytes.len(),
        })?;
    Ok(u32::from_le_bytes(head))
}

/// Decode a status string. Invalid sequences become U+FFFD.
pub fn decode_utf8(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_widths() {
        assert_eq!(encode_u8(1).unwrap(), vec![0x01]);
        assert_eq!(encode_u16(5).unwrap(), vec![0x05, 0x00]);
        assert_eq!(encode_u32(360).unwrap(), vec![0x68, 0x01, 0x00, 0x00]);
    }

    #[test]
    fn test_field_encoding_follows_role() {
        assert_eq!(
            encode_field(PillboxCharacteristic::StartTime, 360).unwrap(),
            vec![0x68, 0x01, 0x00, 0x00]
        );
        assert_eq!(
            encode_field(PillboxCharacteristic::Count, 5).unwrap(),
            vec![0x05, 0x00]
        );
        assert_eq!(encode_field(PillboxCharacteristic::Reset, 1).unwrap(), vec![0x01]);
        assert_eq!(
            encode_field(PillboxCharacteristic::Count, 70_000),
            Err(EncodingError::OutOfRange { value: 70_000, width: 2 })
        );
        assert_eq!(
            encode_field(PillboxCharacteristic::Status, 1),
            Err(EncodingError::NotNumeric(PillboxCharacteristic::Status))
        );
    }

    #[test]
    fn test_big_endian() {
        assert_eq!(
            encode(0x0102, FieldWidth::U16, ByteOrder::Big).unwrap(),
            vec![0x01, 0x02]
        );
    }

    #[test]
    fn test_width_boundaries() {
        assert!(encode_u8(255).is_ok());
        assert_eq!(
            encode_u8(256),
            Err(EncodingError::OutOfRange { value: 256, width: 1 })
        );
        assert!(encode_u16(65_535).is_ok());
        assert!(encode_u16(65_536).is_err());
        assert!(encode_u32(u32::MAX as i64).is_ok());
        assert!(encode_u32(u32::MAX as i64 + 1).is_err());
        assert!(encode_u32(-1).is_err());
    }

    #[test]
    fn test_decode_seconds() {
        let bytes = encode_u32(86_399).unwrap();
        assert_eq!(decode_u32_le(&bytes).unwrap(), 86_399);
        assert_eq!(decode_u32_le(&[0x10, 0x0e, 0, 0, 0xff]).unwrap(), 3600);
    }

    #[test]
    fn test_decode_truncated() {
        assert_eq!(
            decode_u32_le(&[0x01, 0x02]),
            Err(EncodingError::Truncated { expected: 4, actual: 2 })
        );
    }

    #[test]
    fn test_decode_status() {
        assert_eq!(decode_utf8(b"triggered"), "triggered");
        assert_eq!(decode_utf8(&[0x61, 0xff]), "a\u{fffd}");
    }
}
