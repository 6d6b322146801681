// nrbf-codec - A round-trip codec for the .NET Remoting Binary Format.
// Copyright (C) 2026  driedpampas@proton.me
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! `System.Guid` helpers and raw-buffer GUID locate/patch utilities.
//!
//! A `System.Guid` is wire-encoded as a `SystemClassWithMembersAndTypes`
//! with 11 members `_a.._k`: an Int32, two Int16s, then 8 Bytes. The
//! 16-byte buffer this produces is exactly .NET's mixed-endian GUID layout,
//! which the `uuid` crate calls `bytes_le`.

use crate::error::{Error, Result};
use crate::records::{
    AdditionalTypeInfo, BinaryType, ClassInfo, ClassRecord, MemberTypeInfo, PrimitiveType,
    PrimitiveValue, RecordKind, Value,
};
use uuid::Uuid;

const MEMBER_NAMES: [&str; 11] = [
    "_a", "_b", "_c", "_d", "_e", "_f", "_g", "_h", "_i", "_j", "_k",
];

fn get_i32(c: &ClassRecord, name: &str) -> Result<i32> {
    match c.get_value(name)? {
        Value::Primitive(PrimitiveValue::Int32(v)) => Ok(v),
        _ => Err(Error::InvalidGuid(format!("member {name} is not Int32"))),
    }
}

fn get_i16(c: &ClassRecord, name: &str) -> Result<i16> {
    match c.get_value(name)? {
        Value::Primitive(PrimitiveValue::Int16(v)) => Ok(v),
        _ => Err(Error::InvalidGuid(format!("member {name} is not Int16"))),
    }
}

fn get_byte(c: &ClassRecord, name: &str) -> Result<u8> {
    match c.get_value(name)? {
        Value::Primitive(PrimitiveValue::Byte(v)) => Ok(v),
        _ => Err(Error::InvalidGuid(format!("member {name} is not Byte"))),
    }
}

/// Reads the 11 members of a `System.Guid` class record and formats them as
/// a canonical lowercase hyphenated GUID string.
pub fn parse_guid(class_record: &ClassRecord) -> Result<String> {
    let mut bytes = [0u8; 16];
    bytes[0..4].copy_from_slice(&get_i32(class_record, "_a")?.to_le_bytes());
    bytes[4..6].copy_from_slice(&get_i16(class_record, "_b")?.to_le_bytes());
    bytes[6..8].copy_from_slice(&get_i16(class_record, "_c")?.to_le_bytes());
    for (i, name) in MEMBER_NAMES[3..].iter().enumerate() {
        bytes[8 + i] = get_byte(class_record, name)?;
    }
    Ok(Uuid::from_bytes_le(bytes).to_string())
}

/// Builds a `System.Guid` class record for `guid`, ready to be placed as a
/// `Value::Nested` wherever a `SystemClassWithMembersAndTypes` is expected.
pub fn build_guid_record(object_id: i32, guid: &str) -> Result<ClassRecord> {
    let uuid = Uuid::parse_str(guid).map_err(|_| Error::InvalidGuid(guid.to_string()))?;
    let raw = uuid.to_bytes_le();
    let a = i32::from_le_bytes(raw[0..4].try_into().unwrap());
    let b = i16::from_le_bytes(raw[4..6].try_into().unwrap());
    let c = i16::from_le_bytes(raw[6..8].try_into().unwrap());

    let member_names = MEMBER_NAMES.iter().map(|n| n.to_string()).collect();
    let binary_types = vec![BinaryType::Primitive; 11];
    let mut additional = vec![
        AdditionalTypeInfo::Primitive(PrimitiveType::Int32),
        AdditionalTypeInfo::Primitive(PrimitiveType::Int16),
        AdditionalTypeInfo::Primitive(PrimitiveType::Int16),
    ];
    for _ in 0..8 {
        additional.push(AdditionalTypeInfo::Primitive(PrimitiveType::Byte));
    }

    let mut member_values = vec![
        Value::Primitive(PrimitiveValue::Int32(a)),
        Value::Primitive(PrimitiveValue::Int16(b)),
        Value::Primitive(PrimitiveValue::Int16(c)),
    ];
    for &byte in &raw[8..16] {
        member_values.push(Value::Primitive(PrimitiveValue::Byte(byte)));
    }

    Ok(ClassRecord {
        class_info: ClassInfo {
            object_id,
            name: "System.Guid".to_string(),
            member_names,
        },
        member_type_info: Some(MemberTypeInfo {
            binary_types,
            additional,
        }),
        library_id: None,
        original_kind: RecordKind::SystemClassWithMembersAndTypes,
        metadata_id: None,
        member_values,
    })
}

/// Scans `bytes` for the 16-byte little-endian encoding of `guid`, returning
/// every byte offset where it occurs.
pub fn find_guid_in_buffer(bytes: &[u8], guid: &str) -> Result<Vec<usize>> {
    let uuid = Uuid::parse_str(guid).map_err(|_| Error::InvalidGuid(guid.to_string()))?;
    let needle = uuid.to_bytes_le();
    Ok(bytes
        .windows(16)
        .enumerate()
        .filter(|(_, w)| *w == needle)
        .map(|(i, _)| i)
        .collect())
}

/// Overwrites the 16 bytes at `offset` with the little-endian encoding of
/// `guid`, returning a new buffer.
pub fn replace_guid_at_offset(bytes: &[u8], offset: usize, guid: &str) -> Result<Vec<u8>> {
    let uuid = Uuid::parse_str(guid).map_err(|_| Error::InvalidGuid(guid.to_string()))?;
    if offset.checked_add(16).map_or(true, |end| end > bytes.len()) {
        return Err(Error::PathNotFound(offset.to_string()));
    }
    let mut out = bytes.to_vec();
    out[offset..offset + 16].copy_from_slice(&uuid.to_bytes_le());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guid_round_trips_through_class_record() {
        let guid = "12345678-9abc-def0-1234-56789abcdef0";
        let record = build_guid_record(1, guid).unwrap();
        assert_eq!(parse_guid(&record).unwrap(), guid);
    }

    #[test]
    fn invalid_guid_string_is_rejected() {
        assert!(build_guid_record(1, "not-a-guid").is_err());
    }

    #[test]
    fn find_and_replace_guid_in_buffer() {
        let guid = "00000000-0000-0000-0000-000000000001";
        let uuid = Uuid::parse_str(guid).unwrap();
        let mut buf = vec![0xAAu8; 8];
        buf.extend_from_slice(&uuid.to_bytes_le());
        buf.extend_from_slice(&[0xBBu8; 4]);

        let offsets = find_guid_in_buffer(&buf, guid).unwrap();
        assert_eq!(offsets, vec![8]);

        let replacement = "ffffffff-ffff-ffff-ffff-ffffffffffff";
        let patched = replace_guid_at_offset(&buf, 8, replacement).unwrap();
        assert_eq!(find_guid_in_buffer(&patched, replacement).unwrap(), vec![8]);
        assert!(find_guid_in_buffer(&patched, guid).unwrap().is_empty());
    }
}
