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

//! Encodes an in-memory object graph back into an MS-NRBF buffer.
//!
//! Every record replays its own `original_kind`, so a graph decoded and then
//! re-encoded unchanged reproduces the original bytes. Libraries are emitted
//! on first reference, immediately ahead of the record that needs them,
//! mirroring how the decoder discovers them inline.

use crate::cursor::ByteWriter;
use crate::error::{Error, Result};
use crate::records::*;
use std::collections::{HashMap, HashSet};

struct Encoder<'a> {
    w: ByteWriter,
    emitted_objects: HashSet<i32>,
    emitted_libraries: HashSet<i32>,
    libraries: &'a HashMap<i32, String>,
}

/// Encodes `header` and the object graph reachable from `root` (if any).
pub fn encode(
    header: &Header,
    root: Option<&RecordHandle>,
    libraries: &HashMap<i32, String>,
) -> Result<Vec<u8>> {
    let mut enc = Encoder {
        w: ByteWriter::new(),
        emitted_objects: HashSet::new(),
        emitted_libraries: HashSet::new(),
        libraries,
    };
    enc.w.write_u8(RecordKind::Header as u8);
    enc.w.write_i32(header.root_id);
    enc.w.write_i32(header.header_id);
    enc.w.write_i32(header.major_version);
    enc.w.write_i32(header.minor_version);

    if let Some(root) = root {
        enc.emit_value_generic(&Value::Nested(root.clone()))?;
    }

    enc.w.write_u8(RecordKind::MessageEnd as u8);
    Ok(enc.w.finish())
}

impl<'a> Encoder<'a> {
    fn emit_library_if_needed(&mut self, library_id: Option<i32>) -> Result<()> {
        let Some(id) = library_id else {
            return Ok(());
        };
        if self.emitted_libraries.contains(&id) {
            return Ok(());
        }
        let name = self
            .libraries
            .get(&id)
            .ok_or(Error::UnresolvedReference { id_ref: id })?
            .clone();
        self.w.write_u8(RecordKind::BinaryLibrary as u8);
        self.w.write_i32(id);
        self.w.write_string(&name);
        self.emitted_libraries.insert(id);
        Ok(())
    }

    /// Writes a member/array-element value. Shared objects already emitted
    /// once are replayed as `MemberReference` rather than re-emitted in full.
    fn emit_value_generic(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Null => {
                self.w.write_u8(RecordKind::ObjectNull as u8);
                Ok(())
            }
            Value::Reference(id) => {
                self.w.write_u8(RecordKind::MemberReference as u8);
                self.w.write_i32(*id);
                Ok(())
            }
            Value::Primitive(_) => Err(Error::EncodeTypeAmbiguous),
            Value::Nested(handle) => {
                let object_id = handle.borrow().object_id();
                if let Some(id) = object_id {
                    if self.emitted_objects.contains(&id) {
                        self.w.write_u8(RecordKind::MemberReference as u8);
                        self.w.write_i32(id);
                        return Ok(());
                    }
                    self.emitted_objects.insert(id);
                }
                self.emit_record_body(handle)
            }
        }
    }

    fn emit_record_body(&mut self, handle: &RecordHandle) -> Result<()> {
        let rec = handle.borrow();
        match &*rec {
            Record::Class(c) => self.emit_class(c),
            Record::BinaryObjectString(s) => {
                self.w.write_u8(RecordKind::BinaryObjectString as u8);
                self.w.write_i32(s.object_id);
                self.w.write_string(&s.value);
                Ok(())
            }
            Record::BinaryArray(a) => self.emit_binary_array(a),
            Record::ArraySinglePrimitive(a) => self.emit_array_single_primitive(a),
            Record::ArraySingleObject(a) => self.emit_array_single_object(a),
            Record::ArraySingleString(a) => self.emit_array_single_string(a),
            Record::MemberPrimitiveTyped {
                primitive_type,
                value,
            } => {
                self.w.write_u8(RecordKind::MemberPrimitiveTyped as u8);
                self.w.write_u8(*primitive_type as u8);
                self.write_primitive_value(value)
            }
            Record::MemberReference { id_ref } => {
                self.w.write_u8(RecordKind::MemberReference as u8);
                self.w.write_i32(*id_ref);
                Ok(())
            }
            Record::ObjectNull => {
                self.w.write_u8(RecordKind::ObjectNull as u8);
                Ok(())
            }
            Record::MessageEnd => {
                self.w.write_u8(RecordKind::MessageEnd as u8);
                Ok(())
            }
            // A Header can only ever be the first record of a stream.
            Record::Header(_) => Err(Error::EncodeTypeAmbiguous),
        }
    }

    fn class_required_libraries(c: &ClassRecord) -> Vec<i32> {
        let mut ids = Vec::new();
        if let Some(id) = c.library_id {
            ids.push(id);
        }
        if let Some(mti) = &c.member_type_info {
            for add in &mti.additional {
                if let AdditionalTypeInfo::Class { library_id, .. } = add {
                    ids.push(*library_id);
                }
            }
        }
        ids
    }

    fn emit_class(&mut self, c: &ClassRecord) -> Result<()> {
        for id in Self::class_required_libraries(c) {
            self.emit_library_if_needed(Some(id))?;
        }
        match c.original_kind {
            RecordKind::ClassWithId => {
                self.w.write_u8(RecordKind::ClassWithId as u8);
                self.w.write_i32(c.class_info.object_id);
                let metadata_id = c.metadata_id.ok_or(Error::EncodeTypeAmbiguous)?;
                self.w.write_i32(metadata_id);
            }
            RecordKind::SystemClassWithMembers => {
                self.w.write_u8(RecordKind::SystemClassWithMembers as u8);
                self.write_class_info(&c.class_info);
            }
            RecordKind::ClassWithMembers => {
                self.w.write_u8(RecordKind::ClassWithMembers as u8);
                self.write_class_info(&c.class_info);
                self.w
                    .write_i32(c.library_id.ok_or(Error::EncodeTypeAmbiguous)?);
            }
            RecordKind::SystemClassWithMembersAndTypes => {
                self.w
                    .write_u8(RecordKind::SystemClassWithMembersAndTypes as u8);
                self.write_class_info(&c.class_info);
                let mti = c
                    .member_type_info
                    .as_ref()
                    .ok_or(Error::EncodeTypeAmbiguous)?;
                self.write_member_type_info(mti);
            }
            RecordKind::ClassWithMembersAndTypes => {
                self.w.write_u8(RecordKind::ClassWithMembersAndTypes as u8);
                self.write_class_info(&c.class_info);
                let mti = c
                    .member_type_info
                    .as_ref()
                    .ok_or(Error::EncodeTypeAmbiguous)?;
                self.write_member_type_info(mti);
                self.w
                    .write_i32(c.library_id.ok_or(Error::EncodeTypeAmbiguous)?);
            }
            _ => return Err(Error::EncodeTypeAmbiguous),
        }
        self.emit_members(&c.member_type_info, &c.member_values)
    }

    fn emit_members(
        &mut self,
        member_type_info: &Option<MemberTypeInfo>,
        member_values: &[Value],
    ) -> Result<()> {
        match member_type_info {
            Some(mti) => {
                for (i, val) in member_values.iter().enumerate() {
                    let bt = mti
                        .binary_types
                        .get(i)
                        .copied()
                        .ok_or(Error::EncodeTypeAmbiguous)?;
                    match (bt, val) {
                        (BinaryType::Primitive, Value::Primitive(p)) => {
                            self.write_primitive_value(p)?;
                        }
                        (BinaryType::Primitive, _) => return Err(Error::EncodeTypeAmbiguous),
                        _ => self.emit_value_generic(val)?,
                    }
                }
            }
            None => {
                for val in member_values {
                    self.emit_value_generic(val)?;
                }
            }
        }
        Ok(())
    }

    fn write_class_info(&mut self, info: &ClassInfo) {
        self.w.write_i32(info.object_id);
        self.w.write_string(&info.name);
        self.w.write_i32(info.member_count());
        for name in &info.member_names {
            self.w.write_string(name);
        }
    }

    fn write_additional_type_info(&mut self, info: &AdditionalTypeInfo) {
        match info {
            AdditionalTypeInfo::Primitive(pt) => self.w.write_u8(*pt as u8),
            AdditionalTypeInfo::SystemClass(name) => self.w.write_string(name),
            AdditionalTypeInfo::Class {
                type_name,
                library_id,
            } => {
                self.w.write_string(type_name);
                self.w.write_i32(*library_id);
            }
            AdditionalTypeInfo::None => {}
        }
    }

    fn write_member_type_info(&mut self, mti: &MemberTypeInfo) {
        for bt in &mti.binary_types {
            self.w.write_u8(*bt as u8);
        }
        for add in &mti.additional {
            self.write_additional_type_info(add);
        }
    }

    fn array_required_libraries(info: &AdditionalTypeInfo) -> Vec<i32> {
        match info {
            AdditionalTypeInfo::Class { library_id, .. } => vec![*library_id],
            _ => Vec::new(),
        }
    }

    fn emit_binary_array(&mut self, a: &BinaryArrayRecord) -> Result<()> {
        for id in Self::array_required_libraries(&a.element_type_info) {
            self.emit_library_if_needed(Some(id))?;
        }
        self.w.write_u8(RecordKind::BinaryArray as u8);
        self.w.write_i32(a.object_id);
        self.w.write_u8(a.kind as u8);
        self.w.write_i32(a.rank);
        for len in &a.lengths {
            self.w.write_i32(*len);
        }
        if let Some(bounds) = &a.lower_bounds {
            for bound in bounds {
                self.w.write_i32(*bound);
            }
        }
        self.w.write_u8(a.element_type as u8);
        self.write_additional_type_info(&a.element_type_info);

        if a.element_type == BinaryType::Primitive {
            let pt = match &a.element_type_info {
                AdditionalTypeInfo::Primitive(pt) => *pt,
                _ => return Err(Error::EncodeTypeAmbiguous),
            };
            for i in 0..a.elements.logical_len() {
                match a.elements.get(i) {
                    Some(Value::Primitive(p)) if p.primitive_type() == pt => {
                        self.write_primitive_value(&p)?;
                    }
                    _ => return Err(Error::EncodeTypeAmbiguous),
                }
            }
            Ok(())
        } else {
            self.emit_array_elements(&a.elements)
        }
    }

    fn emit_array_single_primitive(&mut self, a: &ArraySinglePrimitiveRecord) -> Result<()> {
        self.w.write_u8(RecordKind::ArraySinglePrimitive as u8);
        self.w.write_i32(a.object_id);
        self.w.write_i32(a.values.len() as i32);
        self.w.write_u8(a.element_type as u8);
        for v in &a.values {
            self.write_primitive_value(v)?;
        }
        Ok(())
    }

    fn emit_array_single_object(&mut self, a: &ArraySingleObjectRecord) -> Result<()> {
        self.w.write_u8(RecordKind::ArraySingleObject as u8);
        self.w.write_i32(a.object_id);
        self.w.write_i32(a.elements.logical_len() as i32);
        self.emit_array_elements(&a.elements)
    }

    fn emit_array_single_string(&mut self, a: &ArraySingleStringRecord) -> Result<()> {
        self.w.write_u8(RecordKind::ArraySingleString as u8);
        self.w.write_i32(a.object_id);
        self.w.write_i32(a.elements.logical_len() as i32);
        self.emit_array_elements(&a.elements)
    }

    /// Replays each physical slot, preserving null-run grouping exactly as
    /// stored rather than flattening runs into individual nulls.
    fn emit_array_elements(&mut self, elements: &ArrayElements) -> Result<()> {
        for slot in elements.slots() {
            match slot {
                ArraySlot::One(v) => self.emit_value_generic(v)?,
                ArraySlot::NullRun { wide: true, count } => {
                    self.w.write_u8(RecordKind::ObjectNullMultiple as u8);
                    self.w.write_i32(*count as i32);
                }
                ArraySlot::NullRun { wide: false, count } => {
                    self.w.write_u8(RecordKind::ObjectNullMultiple256 as u8);
                    self.w.write_u8(*count as u8);
                }
            }
        }
        Ok(())
    }

    fn write_primitive_value(&mut self, p: &PrimitiveValue) -> Result<()> {
        match p {
            PrimitiveValue::Boolean(b) => self.w.write_bool(*b),
            PrimitiveValue::Byte(b) => self.w.write_u8(*b),
            PrimitiveValue::SByte(b) => self.w.write_i8(*b),
            PrimitiveValue::Char(c) => self.w.write_char(*c),
            PrimitiveValue::Decimal(hexstr) => {
                let bytes = hex::decode(hexstr).map_err(|_| Error::EncodeTypeAmbiguous)?;
                if bytes.len() != 16 {
                    return Err(Error::EncodeTypeAmbiguous);
                }
                self.w.write_bytes(&bytes);
            }
            PrimitiveValue::Double(v) => self.w.write_f64(*v),
            PrimitiveValue::Int16(v) => self.w.write_i16(*v),
            PrimitiveValue::Int32(v) => self.w.write_i32(*v),
            PrimitiveValue::Int64(v) => self.w.write_i64(*v),
            PrimitiveValue::Single(v) => self.w.write_f32(*v),
            PrimitiveValue::TimeSpan(v) => self.w.write_i64(*v),
            PrimitiveValue::DateTime(v) => self.w.write_i64(*v),
            PrimitiveValue::UInt16(v) => self.w.write_u16(*v),
            PrimitiveValue::UInt32(v) => self.w.write_u32(*v),
            PrimitiveValue::UInt64(v) => self.w.write_u64(*v),
            PrimitiveValue::String(s) => self.w.write_string(s),
            PrimitiveValue::Null => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode;

    #[test]
    fn round_trips_a_single_string() {
        let mut w = ByteWriter::new();
        w.write_u8(RecordKind::Header as u8);
        w.write_i32(1);
        w.write_i32(-1);
        w.write_i32(1);
        w.write_i32(0);
        w.write_u8(RecordKind::BinaryObjectString as u8);
        w.write_i32(1);
        w.write_string("hello");
        w.write_u8(RecordKind::MessageEnd as u8);
        let original = w.finish();

        let out = decode(&original).unwrap();
        let encoded = encode(&out.header, out.root.as_ref(), &out.libraries).unwrap();
        assert_eq!(encoded, original);
    }

    #[test]
    fn round_trips_a_shared_reference() {
        let mut w = ByteWriter::new();
        w.write_u8(RecordKind::Header as u8);
        w.write_i32(1);
        w.write_i32(-1);
        w.write_i32(1);
        w.write_i32(0);

        // ClassWithMembers with two Object-typed members, both pointing at
        // the same shared string (first inline, then by reference). The
        // library is declared right before the class that needs it, since
        // that's where the encoder itself places it on re-emission.
        w.write_u8(RecordKind::BinaryLibrary as u8);
        w.write_i32(5);
        w.write_string("Some.Assembly");

        w.write_u8(RecordKind::ClassWithMembers as u8);
        w.write_i32(1);
        w.write_string("Pair");
        w.write_i32(2);
        w.write_string("a");
        w.write_string("b");
        w.write_i32(5); // library id

        w.write_u8(RecordKind::BinaryObjectString as u8);
        w.write_i32(2);
        w.write_string("shared");

        w.write_u8(RecordKind::MemberReference as u8);
        w.write_i32(2);

        w.write_u8(RecordKind::MessageEnd as u8);
        let original = w.finish();

        let out = decode(&original).unwrap();
        let encoded = encode(&out.header, out.root.as_ref(), &out.libraries).unwrap();
        assert_eq!(encoded, original);
    }

    #[test]
    fn round_trips_a_null_run_inside_an_array() {
        let mut w = ByteWriter::new();
        w.write_u8(RecordKind::Header as u8);
        w.write_i32(1);
        w.write_i32(-1);
        w.write_i32(1);
        w.write_i32(0);

        w.write_u8(RecordKind::ArraySingleObject as u8);
        w.write_i32(1);
        w.write_i32(4);
        w.write_u8(RecordKind::BinaryObjectString as u8);
        w.write_i32(2);
        w.write_string("x");
        w.write_u8(RecordKind::ObjectNullMultiple256 as u8);
        w.write_u8(3);

        w.write_u8(RecordKind::MessageEnd as u8);
        let original = w.finish();

        let out = decode(&original).unwrap();
        let encoded = encode(&out.header, out.root.as_ref(), &out.libraries).unwrap();
        assert_eq!(encoded, original);
    }
}
