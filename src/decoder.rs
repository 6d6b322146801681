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

//! Decodes a buffered MS-NRBF stream into an in-memory object graph.
//!
//! The whole stream is decoded in one pass: record by record in wire order,
//! registering each object-id-bearing record into a flat table as it's built
//! so that later `MemberReference` records (including self- and forward-
//! references) resolve against a table that already knows about them.

use crate::cursor::ByteReader;
use crate::error::{Error, Result};
use crate::records::*;
use std::collections::HashMap;

/// Safety cap on the number of records a single stream may contain. Guards
/// against a corrupt or adversarial stream driving an unbounded decode loop.
const RECORD_LIMIT: usize = 100_000;

/// Everything recovered from a decoded stream.
pub struct DecodeOutput {
    pub header: Header,
    /// `None` when the header's root id is 0 (the empty-graph case).
    pub root: Option<RecordHandle>,
    pub records: HashMap<i32, RecordHandle>,
    pub libraries: HashMap<i32, String>,
}

#[derive(Clone)]
struct ClassMeta {
    class_info: ClassInfo,
    member_type_info: Option<MemberTypeInfo>,
    library_id: Option<i32>,
}

/// Outcome of consuming one tagged record from the stream.
enum Tagged {
    /// A `BinaryLibrary` record: registers into the library table and never
    /// itself produces a value (SPEC_FULL.md §10.5).
    Library,
    Value(Value),
    /// An `ObjectNullMultiple`/`ObjectNullMultiple256` run, valid only inside
    /// array element storage.
    NullRun { wide: bool, count: i64 },
}

struct Decoder<'a> {
    r: ByteReader<'a>,
    records: HashMap<i32, RecordHandle>,
    libraries: HashMap<i32, String>,
    metadata: HashMap<i32, ClassMeta>,
    record_count: usize,
}

/// Decodes a complete NRBF stream from a buffer.
pub fn decode(bytes: &[u8]) -> Result<DecodeOutput> {
    let mut d = Decoder {
        r: ByteReader::new(bytes),
        records: HashMap::new(),
        libraries: HashMap::new(),
        metadata: HashMap::new(),
        record_count: 0,
    };

    let tag = d.r.read_u8()?;
    if tag != RecordKind::Header as u8 {
        return Err(Error::BadRecordTag {
            byte: tag,
            offset: d.r.offset(),
            context: d.r.context_window(),
        });
    }
    let header = Header {
        root_id: d.r.read_i32()?,
        header_id: d.r.read_i32()?,
        major_version: d.r.read_i32()?,
        minor_version: d.r.read_i32()?,
    };

    let mut saw_message_end = false;
    while !d.r.is_at_end() {
        let tag = d.r.read_u8()?;
        if tag == RecordKind::MessageEnd as u8 {
            saw_message_end = true;
            break;
        }
        match d.decode_tagged(tag)? {
            Tagged::Library | Tagged::Value(_) => {}
            Tagged::NullRun { .. } => {
                return Err(Error::BadRecordTag {
                    byte: tag,
                    offset: d.r.offset(),
                    context: d.r.context_window(),
                });
            }
        }
    }
    if !saw_message_end {
        return Err(Error::TruncatedStream {
            offset: d.r.offset(),
        });
    }

    let root = if header.root_id == 0 {
        None
    } else {
        Some(
            d.records
                .get(&header.root_id)
                .cloned()
                .ok_or(Error::RootNotFound {
                    root_id: header.root_id,
                })?,
        )
    };

    Ok(DecodeOutput {
        header,
        root,
        records: d.records,
        libraries: d.libraries,
    })
}

impl<'a> Decoder<'a> {
    fn guard_record_limit(&mut self) -> Result<()> {
        self.record_count += 1;
        if self.record_count > RECORD_LIMIT {
            return Err(Error::RecordLimitExceeded(RECORD_LIMIT));
        }
        Ok(())
    }

    fn register_record(&mut self, object_id: i32, handle: RecordHandle) -> Result<()> {
        if self.records.contains_key(&object_id) {
            return Err(Error::DuplicateObjectId { id: object_id });
        }
        self.records.insert(object_id, handle);
        Ok(())
    }

    /// Consumes one already-tagged record. This is the single dispatch point
    /// both member-value reads and array-element reads go through, which is
    /// what lets a `BinaryLibrary` appear inline ahead of either without
    /// being mistaken for the value itself.
    fn decode_tagged(&mut self, tag: u8) -> Result<Tagged> {
        self.guard_record_limit()?;
        let kind = RecordKind::try_from(tag).map_err(|_| Error::BadRecordTag {
            byte: tag,
            offset: self.r.offset(),
            context: self.r.context_window(),
        })?;
        match kind {
            RecordKind::BinaryLibrary => {
                let library_id = self.r.read_i32()?;
                let name = self.r.read_string()?;
                self.libraries.insert(library_id, name);
                Ok(Tagged::Library)
            }
            RecordKind::ClassWithId => {
                Ok(Tagged::Value(Value::Nested(self.decode_class_with_id()?)))
            }
            RecordKind::SystemClassWithMembers
            | RecordKind::ClassWithMembers
            | RecordKind::SystemClassWithMembersAndTypes
            | RecordKind::ClassWithMembersAndTypes => {
                Ok(Tagged::Value(Value::Nested(self.decode_class(kind)?)))
            }
            RecordKind::BinaryObjectString => Ok(Tagged::Value(Value::Nested(
                self.decode_binary_object_string()?,
            ))),
            RecordKind::BinaryArray => {
                Ok(Tagged::Value(Value::Nested(self.decode_binary_array()?)))
            }
            RecordKind::MemberPrimitiveTyped => {
                let pt = PrimitiveType::try_from(self.r.read_u8()?)?;
                let value = self.read_primitive_value(pt)?;
                let handle = new_handle(Record::MemberPrimitiveTyped {
                    primitive_type: pt,
                    value,
                });
                Ok(Tagged::Value(Value::Nested(handle)))
            }
            RecordKind::MemberReference => {
                Ok(Tagged::Value(Value::Reference(self.r.read_i32()?)))
            }
            RecordKind::ObjectNull => Ok(Tagged::Value(Value::Null)),
            RecordKind::ObjectNullMultiple256 => {
                let count = self.r.read_u8()? as i64;
                Ok(Tagged::NullRun { wide: false, count })
            }
            RecordKind::ObjectNullMultiple => {
                let count = self.r.read_i32()? as i64;
                Ok(Tagged::NullRun { wide: true, count })
            }
            RecordKind::ArraySinglePrimitive => Ok(Tagged::Value(Value::Nested(
                self.decode_array_single_primitive()?,
            ))),
            RecordKind::ArraySingleObject => Ok(Tagged::Value(Value::Nested(
                self.decode_array_single_object()?,
            ))),
            RecordKind::ArraySingleString => Ok(Tagged::Value(Value::Nested(
                self.decode_array_single_string()?,
            ))),
            RecordKind::Header | RecordKind::MessageEnd => Err(Error::BadRecordTag {
                byte: tag,
                offset: self.r.offset(),
                context: self.r.context_window(),
            }),
        }
    }

    /// Reads exactly one nested record as a member or array-element value,
    /// transparently registering any `BinaryLibrary` records encountered
    /// ahead of it rather than mistaking one for the value.
    fn read_one_record_as_value(&mut self) -> Result<Value> {
        loop {
            let tag = self.r.read_u8()?;
            match self.decode_tagged(tag)? {
                Tagged::Library => continue,
                Tagged::Value(v) => return Ok(v),
                Tagged::NullRun { .. } => {
                    return Err(Error::BadRecordTag {
                        byte: tag,
                        offset: self.r.offset(),
                        context: self.r.context_window(),
                    });
                }
            }
        }
    }

    /// Reads `total` logical array elements, expanding null runs into
    /// `ArraySlot::NullRun` entries rather than individual nulls.
    fn read_array_elements(&mut self, total: i64) -> Result<ArrayElements> {
        let mut elements = ArrayElements::new();
        let mut count = 0i64;
        while count < total {
            let tag = self.r.read_u8()?;
            match self.decode_tagged(tag)? {
                Tagged::Library => continue,
                Tagged::NullRun { wide, count: c } => {
                    elements.push_null_run(wide, c);
                    count += c;
                }
                Tagged::Value(v) => {
                    elements.push_value(v);
                    count += 1;
                }
            }
        }
        Ok(elements)
    }

    fn read_primitive_value(&mut self, pt: PrimitiveType) -> Result<PrimitiveValue> {
        Ok(match pt {
            PrimitiveType::Boolean => PrimitiveValue::Boolean(self.r.read_bool()?),
            PrimitiveType::Byte => PrimitiveValue::Byte(self.r.read_u8()?),
            PrimitiveType::Char => PrimitiveValue::Char(self.r.read_char()?),
            PrimitiveType::Decimal => PrimitiveValue::Decimal(hex::encode(self.r.read_bytes(16)?)),
            PrimitiveType::Double => PrimitiveValue::Double(self.r.read_f64()?),
            PrimitiveType::Int16 => PrimitiveValue::Int16(self.r.read_i16()?),
            PrimitiveType::Int32 => PrimitiveValue::Int32(self.r.read_i32()?),
            PrimitiveType::Int64 => PrimitiveValue::Int64(self.r.read_i64()?),
            PrimitiveType::SByte => PrimitiveValue::SByte(self.r.read_i8()?),
            PrimitiveType::Single => PrimitiveValue::Single(self.r.read_f32()?),
            // Preserved as a dedicated variant, not collapsed into Int64.
            PrimitiveType::TimeSpan => PrimitiveValue::TimeSpan(self.r.read_i64()?),
            PrimitiveType::DateTime => PrimitiveValue::DateTime(self.r.read_i64()?),
            PrimitiveType::UInt16 => PrimitiveValue::UInt16(self.r.read_u16()?),
            PrimitiveType::UInt32 => PrimitiveValue::UInt32(self.r.read_u32()?),
            PrimitiveType::UInt64 => PrimitiveValue::UInt64(self.r.read_u64()?),
            PrimitiveType::Null => PrimitiveValue::Null,
            PrimitiveType::String => PrimitiveValue::String(self.r.read_string()?),
        })
    }

    fn read_class_info(&mut self) -> Result<ClassInfo> {
        let object_id = self.r.read_i32()?;
        let name = self.r.read_string()?;
        let member_count = self.r.read_i32()?;
        let mut member_names = Vec::with_capacity(member_count.max(0) as usize);
        for _ in 0..member_count {
            member_names.push(self.r.read_string()?);
        }
        Ok(ClassInfo {
            object_id,
            name,
            member_names,
        })
    }

    fn read_additional_type_info(&mut self, bt: BinaryType) -> Result<AdditionalTypeInfo> {
        Ok(match bt {
            BinaryType::Primitive => {
                AdditionalTypeInfo::Primitive(PrimitiveType::try_from(self.r.read_u8()?)?)
            }
            BinaryType::SystemClass => AdditionalTypeInfo::SystemClass(self.r.read_string()?),
            BinaryType::Class => AdditionalTypeInfo::Class {
                type_name: self.r.read_string()?,
                library_id: self.r.read_i32()?,
            },
            _ => AdditionalTypeInfo::None,
        })
    }

    fn read_member_type_info(&mut self, count: i32) -> Result<MemberTypeInfo> {
        let mut binary_types = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            binary_types.push(BinaryType::try_from(self.r.read_u8()?)?);
        }
        let mut additional = Vec::with_capacity(count.max(0) as usize);
        for &bt in &binary_types {
            additional.push(self.read_additional_type_info(bt)?);
        }
        Ok(MemberTypeInfo {
            binary_types,
            additional,
        })
    }

    /// Fills in `member_values` for a class record already registered in the
    /// record table, so a member that refers back to the class itself (a
    /// cycle) finds the table entry already present.
    fn fill_members(
        &mut self,
        handle: &RecordHandle,
        class_info: &ClassInfo,
        member_type_info: &Option<MemberTypeInfo>,
    ) -> Result<()> {
        let mut values = Vec::with_capacity(class_info.member_names.len());
        match member_type_info {
            Some(mti) => {
                for i in 0..class_info.member_names.len() {
                    let bt = mti.binary_types[i];
                    let add = &mti.additional[i];
                    let v = match bt {
                        BinaryType::Primitive => {
                            let pt = match add {
                                AdditionalTypeInfo::Primitive(pt) => *pt,
                                _ => return Err(Error::EncodeTypeAmbiguous),
                            };
                            Value::Primitive(self.read_primitive_value(pt)?)
                        }
                        _ => self.read_one_record_as_value()?,
                    };
                    values.push(v);
                }
            }
            // An untyped class has no schema: every member is its own
            // self-describing record (e.g. a bare primitive is boxed as a
            // MemberPrimitiveTyped record on the wire).
            None => {
                for _ in 0..class_info.member_names.len() {
                    values.push(self.read_one_record_as_value()?);
                }
            }
        }
        if let Record::Class(c) = &mut *handle.borrow_mut() {
            c.member_values = values;
        }
        Ok(())
    }

    fn decode_class(&mut self, kind: RecordKind) -> Result<RecordHandle> {
        let class_info = self.read_class_info()?;
        let has_types = matches!(
            kind,
            RecordKind::SystemClassWithMembersAndTypes | RecordKind::ClassWithMembersAndTypes
        );
        let has_library = matches!(
            kind,
            RecordKind::ClassWithMembers | RecordKind::ClassWithMembersAndTypes
        );
        let member_type_info = if has_types {
            Some(self.read_member_type_info(class_info.member_count())?)
        } else {
            None
        };
        let library_id = if has_library {
            Some(self.r.read_i32()?)
        } else {
            None
        };

        let handle = new_handle(Record::Class(ClassRecord {
            class_info: class_info.clone(),
            member_type_info: member_type_info.clone(),
            library_id,
            original_kind: kind,
            metadata_id: None,
            member_values: Vec::new(),
        }));
        self.register_record(class_info.object_id, handle.clone())?;
        self.metadata.insert(
            class_info.object_id,
            ClassMeta {
                class_info: class_info.clone(),
                member_type_info: member_type_info.clone(),
                library_id,
            },
        );
        self.fill_members(&handle, &class_info, &member_type_info)?;
        Ok(handle)
    }

    fn decode_class_with_id(&mut self) -> Result<RecordHandle> {
        let object_id = self.r.read_i32()?;
        let metadata_id = self.r.read_i32()?;
        let meta = self
            .metadata
            .get(&metadata_id)
            .cloned()
            .ok_or(Error::UnknownMetadata { metadata_id })?;
        let class_info = ClassInfo {
            object_id,
            name: meta.class_info.name.clone(),
            member_names: meta.class_info.member_names.clone(),
        };
        let handle = new_handle(Record::Class(ClassRecord {
            class_info: class_info.clone(),
            member_type_info: meta.member_type_info.clone(),
            library_id: meta.library_id,
            original_kind: RecordKind::ClassWithId,
            metadata_id: Some(metadata_id),
            member_values: Vec::new(),
        }));
        self.register_record(object_id, handle.clone())?;
        self.fill_members(&handle, &class_info, &meta.member_type_info)?;
        Ok(handle)
    }

    fn decode_binary_object_string(&mut self) -> Result<RecordHandle> {
        let object_id = self.r.read_i32()?;
        let value = self.r.read_string()?;
        let handle = new_handle(Record::BinaryObjectString(BinaryObjectStringRecord {
            object_id,
            value,
        }));
        self.register_record(object_id, handle.clone())?;
        Ok(handle)
    }

    fn decode_binary_array(&mut self) -> Result<RecordHandle> {
        let object_id = self.r.read_i32()?;
        let kind = BinaryArrayKind::try_from(self.r.read_u8()?)?;
        let rank = self.r.read_i32()?;
        let mut lengths = Vec::with_capacity(rank.max(0) as usize);
        for _ in 0..rank {
            lengths.push(self.r.read_i32()?);
        }
        let lower_bounds = if kind.has_lower_bounds() {
            let mut bounds = Vec::with_capacity(rank.max(0) as usize);
            for _ in 0..rank {
                bounds.push(self.r.read_i32()?);
            }
            Some(bounds)
        } else {
            None
        };
        let element_type = BinaryType::try_from(self.r.read_u8()?)?;
        let element_type_info = self.read_additional_type_info(element_type)?;
        let total: i64 = lengths.iter().map(|&l| l as i64).product();

        let handle = new_handle(Record::BinaryArray(BinaryArrayRecord {
            object_id,
            kind,
            rank,
            lengths,
            lower_bounds,
            element_type,
            element_type_info: element_type_info.clone(),
            elements: ArrayElements::new(),
        }));
        self.register_record(object_id, handle.clone())?;

        let elements = if element_type == BinaryType::Primitive {
            let pt = match &element_type_info {
                AdditionalTypeInfo::Primitive(pt) => *pt,
                _ => return Err(Error::EncodeTypeAmbiguous),
            };
            let mut elements = ArrayElements::new();
            for _ in 0..total {
                elements.push_value(Value::Primitive(self.read_primitive_value(pt)?));
            }
            elements
        } else {
            self.read_array_elements(total)?
        };
        if let Record::BinaryArray(a) = &mut *handle.borrow_mut() {
            a.elements = elements;
        }
        Ok(handle)
    }

    fn decode_array_single_primitive(&mut self) -> Result<RecordHandle> {
        let object_id = self.r.read_i32()?;
        let length = self.r.read_i32()?;
        let element_type = PrimitiveType::try_from(self.r.read_u8()?)?;
        let mut values = Vec::with_capacity(length.max(0) as usize);
        for _ in 0..length {
            values.push(self.read_primitive_value(element_type)?);
        }
        let handle = new_handle(Record::ArraySinglePrimitive(ArraySinglePrimitiveRecord {
            object_id,
            element_type,
            values,
        }));
        self.register_record(object_id, handle.clone())?;
        Ok(handle)
    }

    fn decode_array_single_object(&mut self) -> Result<RecordHandle> {
        let object_id = self.r.read_i32()?;
        let length = self.r.read_i32()?;
        let handle = new_handle(Record::ArraySingleObject(ArraySingleObjectRecord {
            object_id,
            elements: ArrayElements::new(),
        }));
        self.register_record(object_id, handle.clone())?;
        let elements = self.read_array_elements(length as i64)?;
        if let Record::ArraySingleObject(a) = &mut *handle.borrow_mut() {
            a.elements = elements;
        }
        Ok(handle)
    }

    fn decode_array_single_string(&mut self) -> Result<RecordHandle> {
        let object_id = self.r.read_i32()?;
        let length = self.r.read_i32()?;
        let handle = new_handle(Record::ArraySingleString(ArraySingleStringRecord {
            object_id,
            elements: ArrayElements::new(),
        }));
        self.register_record(object_id, handle.clone())?;
        let elements = self.read_array_elements(length as i64)?;
        if let Record::ArraySingleString(a) = &mut *handle.borrow_mut() {
            a.elements = elements;
        }
        Ok(handle)
    }
}
