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

//! Dotted-path navigation over a decoded object graph.
//!
//! A path like `"items.0.name"` walks member slots (by name) and array
//! elements (by non-negative integer index), transparently following
//! `MemberReference` slots through the record table as it goes.

use crate::error::{Error, Result};
use crate::records::{ArrayElements, Record, RecordHandle, Value};
use std::collections::HashMap;

fn resolve(value: Value, records: &HashMap<i32, RecordHandle>) -> Result<Value> {
    match value {
        Value::Reference(id) => {
            let handle = records
                .get(&id)
                .cloned()
                .ok_or(Error::UnresolvedReference { id_ref: id })?;
            Ok(Value::Nested(handle))
        }
        other => Ok(other),
    }
}

fn index_into(elements: &ArrayElements, segment: &str) -> Result<Value> {
    let idx: i64 = segment
        .parse()
        .map_err(|_| Error::PathNotFound(segment.to_string()))?;
    elements
        .get(idx)
        .ok_or_else(|| Error::PathNotFound(segment.to_string()))
}

fn advance(current: &Value, segment: &str) -> Result<Value> {
    let Value::Nested(handle) = current else {
        return Err(Error::PathNotFound(segment.to_string()));
    };
    let rec = handle.borrow();
    match &*rec {
        Record::Class(c) => c.get_value(segment),
        Record::BinaryArray(a) => index_into(&a.elements, segment),
        Record::ArraySingleObject(a) => index_into(&a.elements, segment),
        Record::ArraySingleString(a) => index_into(&a.elements, segment),
        Record::ArraySinglePrimitive(a) => {
            let idx: usize = segment
                .parse()
                .map_err(|_| Error::PathNotFound(segment.to_string()))?;
            a.values
                .get(idx)
                .cloned()
                .map(Value::Primitive)
                .ok_or_else(|| Error::PathNotFound(segment.to_string()))
        }
        _ => Err(Error::PathNotFound(segment.to_string())),
    }
}

/// Resolves a dotted path against `root`, following references as it goes.
/// An empty path returns `root` itself (fully resolved).
pub fn get_path(
    root: &RecordHandle,
    records: &HashMap<i32, RecordHandle>,
    path: &str,
) -> Result<Value> {
    let mut current = Value::Nested(root.clone());
    if path.is_empty() {
        return resolve(current, records);
    }
    for segment in path.split('.') {
        current = resolve(current, records)?;
        current = advance(&current, segment)?;
    }
    resolve(current, records)
}

/// Writes `value` at the slot named by `path`, navigating to the parent of
/// the final segment and calling its `setValue`/array-set there.
pub fn set_path(
    root: &RecordHandle,
    records: &HashMap<i32, RecordHandle>,
    path: &str,
    value: Value,
) -> Result<()> {
    let segments: Vec<&str> = path.split('.').collect();
    let (last, init) = segments
        .split_last()
        .ok_or_else(|| Error::PathNotFound(path.to_string()))?;

    let mut current = Value::Nested(root.clone());
    for segment in init {
        current = resolve(current, records)?;
        current = advance(&current, segment)?;
    }
    current = resolve(current, records)?;

    let Value::Nested(handle) = current else {
        return Err(Error::PathNotFound((*last).to_string()));
    };
    let mut rec = handle.borrow_mut();
    match &mut *rec {
        Record::Class(c) => c.set_value(last, value),
        Record::BinaryArray(a) => {
            let idx: i64 = last
                .parse()
                .map_err(|_| Error::PathNotFound((*last).to_string()))?;
            a.elements.set(idx, value)
        }
        Record::ArraySingleObject(a) => {
            let idx: i64 = last
                .parse()
                .map_err(|_| Error::PathNotFound((*last).to_string()))?;
            a.elements.set(idx, value)
        }
        Record::ArraySingleString(a) => {
            let idx: i64 = last
                .parse()
                .map_err(|_| Error::PathNotFound((*last).to_string()))?;
            a.elements.set(idx, value)
        }
        Record::ArraySinglePrimitive(a) => {
            let idx: usize = last
                .parse()
                .map_err(|_| Error::PathNotFound((*last).to_string()))?;
            let crate::records::Value::Primitive(p) = value else {
                return Err(Error::EncodeTypeAmbiguous);
            };
            if idx >= a.values.len() {
                return Err(Error::PathNotFound((*last).to_string()));
            }
            a.values[idx] = p;
            Ok(())
        }
        _ => Err(Error::PathNotFound((*last).to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode;
    use crate::records::PrimitiveValue;

    fn decode_fixture(bytes: &[u8]) -> crate::decoder::DecodeOutput {
        decode(bytes).unwrap()
    }

    fn sample_stream() -> Vec<u8> {
        use crate::cursor::ByteWriter;
        use crate::records::RecordKind;
        let mut w = ByteWriter::new();
        w.write_u8(RecordKind::Header as u8);
        w.write_i32(1);
        w.write_i32(-1);
        w.write_i32(1);
        w.write_i32(0);

        w.write_u8(RecordKind::ClassWithMembers as u8);
        w.write_i32(1);
        w.write_string("Root");
        w.write_i32(1);
        w.write_string("name");
        w.write_i32(5);
        w.write_u8(RecordKind::BinaryLibrary as u8);
        w.write_i32(5);
        w.write_string("Some.Assembly");
        w.write_u8(RecordKind::BinaryObjectString as u8);
        w.write_i32(2);
        w.write_string("hi");

        w.write_u8(RecordKind::MessageEnd as u8);
        w.finish()
    }

    #[test]
    fn get_path_navigates_member_then_nested_string() {
        let bytes = sample_stream();
        let out = decode_fixture(&bytes);
        let root = out.root.unwrap();
        let value = get_path(&root, &out.records, "name").unwrap();
        match value {
            Value::Nested(h) => match &*h.borrow() {
                Record::BinaryObjectString(s) => assert_eq!(s.value, "hi"),
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn set_path_then_get_path_round_trips() {
        let bytes = sample_stream();
        let out = decode_fixture(&bytes);
        let root = out.root.unwrap();
        set_path(
            &root,
            &out.records,
            "name",
            Value::Nested(crate::records::new_handle(Record::BinaryObjectString(
                crate::records::BinaryObjectStringRecord {
                    object_id: 99,
                    value: "replaced".to_string(),
                },
            ))),
        )
        .unwrap();
        let value = get_path(&root, &out.records, "name").unwrap();
        match value {
            Value::Nested(h) => match &*h.borrow() {
                Record::BinaryObjectString(s) => assert_eq!(s.value, "replaced"),
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_path_segment_is_not_found() {
        let bytes = sample_stream();
        let out = decode_fixture(&bytes);
        let root = out.root.unwrap();
        assert!(matches!(
            get_path(&root, &out.records, "missing"),
            Err(Error::UnknownMember { .. })
        ));
        let _ = PrimitiveValue::Null;
    }
}
