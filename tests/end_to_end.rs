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

//! The end-to-end scenarios and the round-trip / idempotent-path /
//! header-sniff / GUID properties named in SPEC_FULL.md's testable
//! properties section, built from raw byte literals.
//!
//! A `BinaryLibrary` record is only ever legal on the wire immediately
//! ahead of the first record that needs it (the encoder emits libraries
//! lazily, on first reference); streams below are laid out to match that
//! so a decode-then-encode round trip is byte-exact.

use nrbf_codec::cursor::ByteWriter;
use nrbf_codec::records::{BinaryType, PrimitiveType, PrimitiveValue, Record, RecordKind, Value};
use nrbf_codec::{decode, encode, get_path, guid, looks_like_nrbf, set_path};

fn header(w: &mut ByteWriter, root_id: i32) {
    w.write_u8(RecordKind::Header as u8);
    w.write_i32(root_id);
    w.write_i32(-1);
    w.write_i32(1);
    w.write_i32(0);
}

#[test]
fn empty_graph_stream_round_trips_byte_exact() {
    let mut w = ByteWriter::new();
    header(&mut w, 1);
    w.write_u8(RecordKind::BinaryObjectString as u8);
    w.write_i32(1);
    w.write_string("hello");
    w.write_u8(RecordKind::MessageEnd as u8);
    let bytes = w.finish();

    let out = decode(&bytes).unwrap();
    match &*out.root.as_ref().unwrap().borrow() {
        Record::BinaryObjectString(s) => assert_eq!(s.value, "hello"),
        other => panic!("unexpected {other:?}"),
    }
    let re_encoded = encode(&out.header, out.root.as_ref(), &out.libraries).unwrap();
    assert_eq!(re_encoded, bytes);
}

#[test]
fn class_with_id_reuses_metadata_and_round_trips() {
    // Root is an array of two elements so both the metadata-bearing class
    // and the ClassWithId that reuses it are reachable from root; ClassWithId
    // has no independent existence in the graph otherwise.
    let mut w = ByteWriter::new();
    header(&mut w, 1);

    w.write_u8(RecordKind::ArraySingleObject as u8);
    w.write_i32(1);
    w.write_i32(2);

    w.write_u8(RecordKind::BinaryLibrary as u8);
    w.write_i32(10);
    w.write_string("Some.Assembly");

    w.write_u8(RecordKind::ClassWithMembersAndTypes as u8);
    w.write_i32(2);
    w.write_string("C");
    w.write_i32(2);
    w.write_string("x");
    w.write_string("y");
    w.write_u8(BinaryType::Primitive as u8);
    w.write_u8(BinaryType::Primitive as u8);
    w.write_u8(PrimitiveType::Int32 as u8);
    w.write_u8(PrimitiveType::Int32 as u8);
    w.write_i32(10); // libraryId
    w.write_i32(1); // x
    w.write_i32(2); // y

    w.write_u8(RecordKind::ClassWithId as u8);
    w.write_i32(3);
    w.write_i32(2); // metadataId -> object 2
    w.write_i32(3); // x
    w.write_i32(4); // y

    w.write_u8(RecordKind::MessageEnd as u8);
    let bytes = w.finish();

    let out = decode(&bytes).unwrap();
    let reused = out.records.get(&3).unwrap();
    match &*reused.borrow() {
        Record::Class(c) => {
            assert_eq!(c.class_info.name, "C");
            assert_eq!(c.original_kind, RecordKind::ClassWithId);
            assert_eq!(c.metadata_id, Some(2));
        }
        other => panic!("unexpected {other:?}"),
    }
    let re_encoded = encode(&out.header, out.root.as_ref(), &out.libraries).unwrap();
    assert_eq!(re_encoded, bytes);
}

#[test]
fn array_with_null_multiple_run_round_trips() {
    let mut w = ByteWriter::new();
    header(&mut w, 1);
    w.write_u8(RecordKind::ArraySingleObject as u8);
    w.write_i32(1);
    w.write_i32(10);

    w.write_u8(RecordKind::BinaryObjectString as u8);
    w.write_i32(2);
    w.write_string("v0");
    w.write_u8(RecordKind::BinaryObjectString as u8);
    w.write_i32(3);
    w.write_string("v1");
    w.write_u8(RecordKind::ObjectNullMultiple as u8);
    w.write_i32(7);
    w.write_u8(RecordKind::BinaryObjectString as u8);
    w.write_i32(4);
    w.write_string("v9");

    w.write_u8(RecordKind::MessageEnd as u8);
    let bytes = w.finish();

    let out = decode(&bytes).unwrap();
    match &*out.root.as_ref().unwrap().borrow() {
        Record::ArraySingleObject(a) => {
            assert_eq!(a.elements.logical_len(), 10);
            assert!(matches!(a.elements.get(2), Some(Value::Null)));
            assert!(matches!(a.elements.get(8), Some(Value::Null)));
        }
        other => panic!("unexpected {other:?}"),
    }
    let re_encoded = encode(&out.header, out.root.as_ref(), &out.libraries).unwrap();
    assert_eq!(re_encoded, bytes);
}

#[test]
fn system_guid_embedded_in_class_round_trips() {
    let guid_str = "037b1f7c-871e-4c44-8c0f-451bb24805ac";
    let guid_record = guid::build_guid_record(1, guid_str).unwrap();
    assert_eq!(guid::parse_guid(&guid_record).unwrap(), guid_str);

    let handle = nrbf_codec::records::new_handle(Record::Class(guid_record));
    let header_rec = nrbf_codec::Header {
        root_id: 1,
        header_id: -1,
        major_version: 1,
        minor_version: 0,
    };
    let libraries = std::collections::HashMap::new();
    let bytes = encode(&header_rec, Some(&handle), &libraries).unwrap();

    let out = decode(&bytes).unwrap();
    match &*out.root.as_ref().unwrap().borrow() {
        Record::Class(c) => assert_eq!(guid::parse_guid(c).unwrap(), guid_str),
        other => panic!("unexpected {other:?}"),
    }
    let re_encoded = encode(&out.header, out.root.as_ref(), &out.libraries).unwrap();
    assert_eq!(re_encoded, bytes);
}

#[test]
fn cyclic_graph_round_trips_and_path_navigates_back() {
    let mut w = ByteWriter::new();
    header(&mut w, 1);

    w.write_u8(RecordKind::BinaryLibrary as u8);
    w.write_i32(1);
    w.write_string("Some.Assembly");

    // A { other: ref to B } -- untyped ClassWithMembers, A's single member
    // slot is filled by decoding B (the very next record) inline.
    w.write_u8(RecordKind::ClassWithMembers as u8);
    w.write_i32(1);
    w.write_string("A");
    w.write_i32(1);
    w.write_string("other");
    w.write_i32(1); // libraryId

    // B { other: ref to A }
    w.write_u8(RecordKind::ClassWithMembers as u8);
    w.write_i32(2);
    w.write_string("B");
    w.write_i32(1);
    w.write_string("other");
    w.write_i32(1); // libraryId
    w.write_u8(RecordKind::MemberReference as u8);
    w.write_i32(1); // B.other -> A

    w.write_u8(RecordKind::MessageEnd as u8);
    let bytes = w.finish();

    let out = decode(&bytes).unwrap();
    let root = out.root.clone().unwrap();
    let via_b = get_path(&root, &out.records, "other.other").unwrap();
    match via_b {
        Value::Nested(h) => match &*h.borrow() {
            Record::Class(c) => assert_eq!(c.class_info.name, "A"),
            other => panic!("unexpected {other:?}"),
        },
        other => panic!("unexpected {other:?}"),
    }

    let re_encoded = encode(&out.header, out.root.as_ref(), &out.libraries).unwrap();
    assert_eq!(re_encoded, bytes);
}

#[test]
fn guid_patch_in_raw_buffer_round_trips_through_decode() {
    let original = "037b1f7c-871e-4c44-8c0f-451bb24805ac";
    let replacement = "522911f7-18ab-40c2-a749-1332e9aa7b96";

    let guid_record = guid::build_guid_record(1, original).unwrap();
    let handle = nrbf_codec::records::new_handle(Record::Class(guid_record));
    let header_rec = nrbf_codec::Header {
        root_id: 1,
        header_id: -1,
        major_version: 1,
        minor_version: 0,
    };
    let libraries = std::collections::HashMap::new();
    let bytes = encode(&header_rec, Some(&handle), &libraries).unwrap();

    let offsets = guid::find_guid_in_buffer(&bytes, original).unwrap();
    assert_eq!(offsets.len(), 1);
    let patched = guid::replace_guid_at_offset(&bytes, offsets[0], replacement).unwrap();

    let out = decode(&patched).unwrap();
    match &*out.root.as_ref().unwrap().borrow() {
        Record::Class(c) => assert_eq!(guid::parse_guid(c).unwrap(), replacement),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn idempotent_path_after_set_survives_re_encode_decode() {
    let mut w = ByteWriter::new();
    header(&mut w, 1);
    w.write_u8(RecordKind::BinaryLibrary as u8);
    w.write_i32(1);
    w.write_string("Some.Assembly");
    w.write_u8(RecordKind::ClassWithMembers as u8);
    w.write_i32(1);
    w.write_string("Root");
    w.write_i32(1);
    w.write_string("name");
    w.write_i32(1); // libraryId
    w.write_u8(RecordKind::BinaryObjectString as u8);
    w.write_i32(2);
    w.write_string("original");
    w.write_u8(RecordKind::MessageEnd as u8);
    let bytes = w.finish();

    let out = decode(&bytes).unwrap();
    let root = out.root.clone().unwrap();
    let replacement = nrbf_codec::records::new_handle(Record::BinaryObjectString(
        nrbf_codec::records::BinaryObjectStringRecord {
            object_id: 3,
            value: "updated".to_string(),
        },
    ));
    set_path(&root, &out.records, "name", Value::Nested(replacement)).unwrap();

    let re_encoded = encode(&out.header, out.root.as_ref(), &out.libraries).unwrap();
    let out2 = decode(&re_encoded).unwrap();
    let root2 = out2.root.unwrap();
    match get_path(&root2, &out2.records, "name").unwrap() {
        Value::Nested(h) => match &*h.borrow() {
            Record::BinaryObjectString(s) => assert_eq!(s.value, "updated"),
            other => panic!("unexpected {other:?}"),
        },
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn header_sniff_accepts_encoded_streams_and_rejects_garbage() {
    let mut w = ByteWriter::new();
    header(&mut w, 0);
    w.write_u8(RecordKind::MessageEnd as u8);
    let bytes = w.finish();
    assert!(looks_like_nrbf(&bytes));

    assert!(!looks_like_nrbf(&[
        0x06, 0, 0, 0, 0, 0, 0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0
    ]));
    assert!(!looks_like_nrbf(b"not an nrbf stream"));
}

#[test]
fn varint_covers_full_range_boundaries() {
    use nrbf_codec::cursor::ByteReader;
    for n in [0i32, 1, 127, 128, 16_384, 2_097_151, 2_097_152, i32::MAX] {
        let mut w = ByteWriter::new();
        w.write_varint(n);
        let bytes = w.finish();
        assert!((1..=5).contains(&bytes.len()));
        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.read_varint().unwrap(), n);
    }
}

#[test]
fn primitive_value_preserves_wire_type_across_round_trip() {
    // A bare MemberPrimitiveTyped carries no object id and is never a valid
    // root (decode would fail to resolve it out of the record table), so
    // it's exercised here as the sole element of an ArraySinglePrimitive,
    // which is.
    let mut w = ByteWriter::new();
    header(&mut w, 1);
    w.write_u8(RecordKind::ArraySinglePrimitive as u8);
    w.write_i32(1);
    w.write_i32(1);
    w.write_u8(PrimitiveType::DateTime as u8);
    w.write_i64(637_000_000_000_000_000);
    w.write_u8(RecordKind::MessageEnd as u8);
    let bytes = w.finish();

    let out = decode(&bytes).unwrap();
    match &*out.root.as_ref().unwrap().borrow() {
        Record::ArraySinglePrimitive(a) => {
            assert_eq!(a.values, vec![PrimitiveValue::DateTime(637_000_000_000_000_000)]);
        }
        other => panic!("unexpected {other:?}"),
    }
    let re_encoded = encode(&out.header, out.root.as_ref(), &out.libraries).unwrap();
    assert_eq!(re_encoded, bytes);
}

#[test]
fn bare_member_primitive_typed_as_root_is_not_found() {
    let mut w = ByteWriter::new();
    header(&mut w, 1);
    w.write_u8(RecordKind::MemberPrimitiveTyped as u8);
    w.write_u8(PrimitiveType::DateTime as u8);
    w.write_i64(637_000_000_000_000_000);
    w.write_u8(RecordKind::MessageEnd as u8);
    let bytes = w.finish();

    assert!(matches!(
        decode(&bytes),
        Err(nrbf_codec::Error::RootNotFound { root_id: 1 })
    ));
}
