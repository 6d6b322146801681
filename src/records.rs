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

use crate::error::{Error, Result};
use std::cell::RefCell;
use std::rc::Rc;

/// Shared, mutable handle to a decoded record. Cloning shares identity: the
/// record table and every slot that reached this node via its first
/// occurrence on the wire hold the same `Rc`, so a mutation through one path
/// is visible through the other (see SPEC_FULL.md §10.1).
pub type RecordHandle = Rc<RefCell<Record>>;

pub fn new_handle(record: Record) -> RecordHandle {
    Rc::new(RefCell::new(record))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Header = 0,
    ClassWithId = 1,
    SystemClassWithMembers = 2,
    ClassWithMembers = 3,
    SystemClassWithMembersAndTypes = 4,
    ClassWithMembersAndTypes = 5,
    BinaryObjectString = 6,
    BinaryArray = 7,
    MemberPrimitiveTyped = 8,
    MemberReference = 9,
    ObjectNull = 10,
    MessageEnd = 11,
    BinaryLibrary = 12,
    ObjectNullMultiple256 = 13,
    ObjectNullMultiple = 14,
    ArraySinglePrimitive = 15,
    ArraySingleObject = 16,
    ArraySingleString = 17,
}

impl TryFrom<u8> for RecordKind {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        use RecordKind::*;
        Ok(match value {
            0 => Header,
            1 => ClassWithId,
            2 => SystemClassWithMembers,
            3 => ClassWithMembers,
            4 => SystemClassWithMembersAndTypes,
            5 => ClassWithMembersAndTypes,
            6 => BinaryObjectString,
            7 => BinaryArray,
            8 => MemberPrimitiveTyped,
            9 => MemberReference,
            10 => ObjectNull,
            11 => MessageEnd,
            12 => BinaryLibrary,
            13 => ObjectNullMultiple256,
            14 => ObjectNullMultiple,
            15 => ArraySinglePrimitive,
            16 => ArraySingleObject,
            17 => ArraySingleString,
            other => {
                return Err(Error::BadRecordTag {
                    byte: other,
                    offset: 0,
                    context: String::new(),
                });
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryType {
    Primitive = 0,
    String = 1,
    Object = 2,
    SystemClass = 3,
    Class = 4,
    ObjectArray = 5,
    StringArray = 6,
    PrimitiveArray = 7,
}

impl TryFrom<u8> for BinaryType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        use BinaryType::*;
        Ok(match value {
            0 => Primitive,
            1 => String,
            2 => Object,
            3 => SystemClass,
            4 => Class,
            5 => ObjectArray,
            6 => StringArray,
            7 => PrimitiveArray,
            other => return Err(Error::InvalidBinaryType(other)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    Boolean = 1,
    Byte = 2,
    Char = 3,
    Decimal = 5,
    Double = 6,
    Int16 = 7,
    Int32 = 8,
    Int64 = 9,
    SByte = 10,
    Single = 11,
    TimeSpan = 12,
    DateTime = 13,
    UInt16 = 14,
    UInt32 = 15,
    UInt64 = 16,
    Null = 17,
    String = 18,
}

impl TryFrom<u8> for PrimitiveType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        use PrimitiveType::*;
        Ok(match value {
            1 => Boolean,
            2 => Byte,
            3 => Char,
            5 => Decimal,
            6 => Double,
            7 => Int16,
            8 => Int32,
            9 => Int64,
            10 => SByte,
            11 => Single,
            12 => TimeSpan,
            13 => DateTime,
            14 => UInt16,
            15 => UInt32,
            16 => UInt64,
            17 => Null,
            18 => String,
            other => return Err(Error::InvalidPrimitiveType(other)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryArrayKind {
    Single = 0,
    Jagged = 1,
    Rectangular = 2,
    SingleOffset = 3,
    JaggedOffset = 4,
    RectangularOffset = 5,
}

impl BinaryArrayKind {
    pub fn has_lower_bounds(self) -> bool {
        matches!(
            self,
            BinaryArrayKind::SingleOffset
                | BinaryArrayKind::JaggedOffset
                | BinaryArrayKind::RectangularOffset
        )
    }
}

impl TryFrom<u8> for BinaryArrayKind {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        use BinaryArrayKind::*;
        Ok(match value {
            0 => Single,
            1 => Jagged,
            2 => Rectangular,
            3 => SingleOffset,
            4 => JaggedOffset,
            5 => RectangularOffset,
            other => return Err(Error::InvalidArrayKind(other)),
        })
    }
}

/// A statically-tagged primitive value. Unlike a dynamically-typed value bag,
/// the wire `PrimitiveType` is always recoverable from the variant itself.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveValue {
    Boolean(bool),
    Byte(u8),
    SByte(i8),
    Char(char),
    /// 16 raw bytes rendered as a 32-char hex string; never interpreted.
    Decimal(String),
    Double(f64),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Single(f32),
    /// Raw 8-byte tick count, preserved bit-for-bit.
    TimeSpan(i64),
    /// Raw 8-byte tick count, preserved bit-for-bit.
    DateTime(i64),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    String(String),
    Null,
}

impl PrimitiveValue {
    /// The wire `PrimitiveType` this value was (or would be) tagged with.
    /// Used to box a bare primitive into a `MemberPrimitiveTyped` record when
    /// `setValue` targets a member with no declared member type info.
    pub fn primitive_type(&self) -> PrimitiveType {
        match self {
            PrimitiveValue::Boolean(_) => PrimitiveType::Boolean,
            PrimitiveValue::Byte(_) => PrimitiveType::Byte,
            PrimitiveValue::SByte(_) => PrimitiveType::SByte,
            PrimitiveValue::Char(_) => PrimitiveType::Char,
            PrimitiveValue::Decimal(_) => PrimitiveType::Decimal,
            PrimitiveValue::Double(_) => PrimitiveType::Double,
            PrimitiveValue::Int16(_) => PrimitiveType::Int16,
            PrimitiveValue::Int32(_) => PrimitiveType::Int32,
            PrimitiveValue::Int64(_) => PrimitiveType::Int64,
            PrimitiveValue::Single(_) => PrimitiveType::Single,
            PrimitiveValue::TimeSpan(_) => PrimitiveType::TimeSpan,
            PrimitiveValue::DateTime(_) => PrimitiveType::DateTime,
            PrimitiveValue::UInt16(_) => PrimitiveType::UInt16,
            PrimitiveValue::UInt32(_) => PrimitiveType::UInt32,
            PrimitiveValue::UInt64(_) => PrimitiveType::UInt64,
            PrimitiveValue::String(_) => PrimitiveType::String,
            PrimitiveValue::Null => PrimitiveType::Null,
        }
    }
}

#[derive(Debug, Clone)]
pub enum AdditionalTypeInfo {
    Primitive(PrimitiveType),
    SystemClass(String),
    Class { type_name: String, library_id: i32 },
    None,
}

#[derive(Debug, Clone)]
pub struct MemberTypeInfo {
    pub binary_types: Vec<BinaryType>,
    pub additional: Vec<AdditionalTypeInfo>,
}

#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub object_id: i32,
    pub name: String,
    pub member_names: Vec<String>,
}

impl ClassInfo {
    pub fn member_count(&self) -> i32 {
        self.member_names.len() as i32
    }
}

/// A member slot or array element. See SPEC_FULL.md §3 and §10.1.
#[derive(Debug, Clone)]
pub enum Value {
    Primitive(PrimitiveValue),
    Null,
    /// A `MemberReference` decoded at this position: lazily resolved against
    /// the record table, since the target may not exist yet (forward ref).
    Reference(i32),
    /// A record decoded inline at this position. Shared with the record
    /// table when the record carries an object id.
    Nested(RecordHandle),
}

impl From<RecordHandle> for Value {
    fn from(handle: RecordHandle) -> Self {
        Value::Nested(handle)
    }
}

/// One physical entry in an array's element storage. Contiguous null slots
/// that were encoded as a single run record are kept grouped so re-encoding
/// reproduces the same run record rather than degenerate singleton nulls.
#[derive(Debug, Clone)]
pub enum ArraySlot {
    One(Value),
    /// `wide = true` is `ObjectNullMultiple` (i32 count); `false` is the
    /// 256-capped `ObjectNullMultiple256` (u8 count).
    NullRun { wide: bool, count: i64 },
}

impl ArraySlot {
    fn logical_len(&self) -> i64 {
        match self {
            ArraySlot::One(_) => 1,
            ArraySlot::NullRun { count, .. } => *count,
        }
    }
}

/// Flat element storage for arrays, exposing logical (post-null-run-expansion)
/// indexing over a compact physical representation.
#[derive(Debug, Clone, Default)]
pub struct ArrayElements {
    slots: Vec<ArraySlot>,
}

impl ArrayElements {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub fn push_value(&mut self, value: Value) {
        self.slots.push(ArraySlot::One(value));
    }

    pub fn push_null_run(&mut self, wide: bool, count: i64) {
        if count > 0 {
            self.slots.push(ArraySlot::NullRun { wide, count });
        }
    }

    pub fn slots(&self) -> &[ArraySlot] {
        &self.slots
    }

    pub fn logical_len(&self) -> i64 {
        self.slots.iter().map(ArraySlot::logical_len).sum()
    }

    /// Logical indexing: returns `Value::Null` for any index falling inside
    /// a null run, without exposing the run as a node.
    pub fn get(&self, index: i64) -> Option<Value> {
        if index < 0 {
            return None;
        }
        let mut base = 0i64;
        for slot in &self.slots {
            let len = slot.logical_len();
            if index < base + len {
                return Some(match slot {
                    ArraySlot::One(v) => v.clone(),
                    ArraySlot::NullRun { .. } => Value::Null,
                });
            }
            base += len;
        }
        None
    }

    /// Writes `value` at logical `index`. Setting an index inside a null run
    /// splits it into up to two residual runs of the same width flanking the
    /// written element (SPEC_FULL.md §4.5).
    pub fn set(&mut self, index: i64, value: Value) -> Result<()> {
        if index < 0 {
            return Err(Error::PathNotFound(index.to_string()));
        }
        let mut base = 0i64;
        for slot_idx in 0..self.slots.len() {
            let len = self.slots[slot_idx].logical_len();
            if index < base + len {
                match self.slots[slot_idx] {
                    ArraySlot::One(_) => {
                        self.slots[slot_idx] = ArraySlot::One(value);
                    }
                    ArraySlot::NullRun { wide, count } => {
                        let offset_in_run = index - base;
                        let before = offset_in_run;
                        let after = count - offset_in_run - 1;
                        let mut replacement = Vec::with_capacity(3);
                        if before > 0 {
                            replacement.push(ArraySlot::NullRun {
                                wide,
                                count: before,
                            });
                        }
                        replacement.push(ArraySlot::One(value));
                        if after > 0 {
                            replacement.push(ArraySlot::NullRun { wide, count: after });
                        }
                        self.slots.splice(slot_idx..=slot_idx, replacement);
                    }
                }
                return Ok(());
            }
            base += len;
        }
        Err(Error::PathNotFound(index.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct Header {
    pub root_id: i32,
    pub header_id: i32,
    pub major_version: i32,
    pub minor_version: i32,
}

/// Covers wire kinds 1 (`ClassWithId`) through 5 (`ClassWithMembersAndTypes`).
#[derive(Debug, Clone)]
pub struct ClassRecord {
    pub class_info: ClassInfo,
    pub member_type_info: Option<MemberTypeInfo>,
    pub library_id: Option<i32>,
    pub original_kind: RecordKind,
    /// For a `ClassWithId` record, the object id of the class record whose
    /// metadata (name, members, type info) this one reuses. `None` for the
    /// other four kinds, which carry their own metadata inline.
    pub metadata_id: Option<i32>,
    pub member_values: Vec<Value>,
}

impl ClassRecord {
    fn member_index(&self, name: &str) -> Option<usize> {
        self.class_info.member_names.iter().position(|n| n == name)
    }

    pub fn get_value(&self, name: &str) -> Result<Value> {
        let idx = self
            .member_index(name)
            .ok_or_else(|| Error::UnknownMember {
                class: self.class_info.name.clone(),
                name: name.to_string(),
            })?;
        Ok(self.member_values[idx].clone())
    }

    /// Sets a member value. A bare `Value::Primitive` set on a member whose
    /// class carries no `member_type_info` is boxed into an explicit
    /// `MemberPrimitiveTyped` nested record, since that is always how an
    /// untyped class wire-encodes a primitive member (SPEC_FULL.md §4.2).
    pub fn set_value(&mut self, name: &str, value: Value) -> Result<()> {
        let idx = self
            .member_index(name)
            .ok_or_else(|| Error::UnknownMember {
                class: self.class_info.name.clone(),
                name: name.to_string(),
            })?;
        let boxed = if self.member_type_info.is_none() {
            box_bare_primitive(value)
        } else {
            value
        };
        self.member_values[idx] = boxed;
        Ok(())
    }
}

fn box_bare_primitive(value: Value) -> Value {
    match value {
        Value::Primitive(p) => {
            let pt = p.primitive_type();
            new_handle(Record::MemberPrimitiveTyped {
                primitive_type: pt,
                value: p,
            })
            .into()
        }
        other => other,
    }
}

#[derive(Debug, Clone)]
pub struct BinaryObjectStringRecord {
    pub object_id: i32,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct BinaryArrayRecord {
    pub object_id: i32,
    pub kind: BinaryArrayKind,
    pub rank: i32,
    pub lengths: Vec<i32>,
    pub lower_bounds: Option<Vec<i32>>,
    pub element_type: BinaryType,
    pub element_type_info: AdditionalTypeInfo,
    pub elements: ArrayElements,
}

#[derive(Debug, Clone)]
pub struct ArraySinglePrimitiveRecord {
    pub object_id: i32,
    pub element_type: PrimitiveType,
    pub values: Vec<PrimitiveValue>,
}

#[derive(Debug, Clone)]
pub struct ArraySingleObjectRecord {
    pub object_id: i32,
    pub elements: ArrayElements,
}

#[derive(Debug, Clone)]
pub struct ArraySingleStringRecord {
    pub object_id: i32,
    pub elements: ArrayElements,
}

/// The full union of decodable NRBF records. `BinaryLibrary` is
/// deliberately absent: it is ambient side-table state, never a node
/// reachable from a member slot or array element (SPEC_FULL.md §10.5).
#[derive(Debug, Clone)]
pub enum Record {
    Header(Header),
    Class(ClassRecord),
    BinaryObjectString(BinaryObjectStringRecord),
    BinaryArray(BinaryArrayRecord),
    ArraySinglePrimitive(ArraySinglePrimitiveRecord),
    ArraySingleObject(ArraySingleObjectRecord),
    ArraySingleString(ArraySingleStringRecord),
    MemberPrimitiveTyped {
        primitive_type: PrimitiveType,
        value: PrimitiveValue,
    },
    MemberReference {
        id_ref: i32,
    },
    ObjectNull,
    MessageEnd,
}

impl Record {
    pub fn record_kind(&self) -> RecordKind {
        match self {
            Record::Header(_) => RecordKind::Header,
            Record::Class(c) => c.original_kind,
            Record::BinaryObjectString(_) => RecordKind::BinaryObjectString,
            Record::BinaryArray(_) => RecordKind::BinaryArray,
            Record::ArraySinglePrimitive(_) => RecordKind::ArraySinglePrimitive,
            Record::ArraySingleObject(_) => RecordKind::ArraySingleObject,
            Record::ArraySingleString(_) => RecordKind::ArraySingleString,
            Record::MemberPrimitiveTyped { .. } => RecordKind::MemberPrimitiveTyped,
            Record::MemberReference { .. } => RecordKind::MemberReference,
            Record::ObjectNull => RecordKind::ObjectNull,
            Record::MessageEnd => RecordKind::MessageEnd,
        }
    }

    pub fn object_id(&self) -> Option<i32> {
        match self {
            Record::Class(c) => Some(c.class_info.object_id),
            Record::BinaryObjectString(s) => Some(s.object_id),
            Record::BinaryArray(a) => Some(a.object_id),
            Record::ArraySinglePrimitive(a) => Some(a.object_id),
            Record::ArraySingleObject(a) => Some(a.object_id),
            Record::ArraySingleString(a) => Some(a.object_id),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&ClassRecord> {
        match self {
            Record::Class(c) => Some(c),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_elements_indexing_through_null_run() {
        let mut elems = ArrayElements::new();
        elems.push_value(Value::Primitive(PrimitiveValue::Int32(1)));
        elems.push_value(Value::Primitive(PrimitiveValue::Int32(2)));
        elems.push_null_run(true, 7);
        elems.push_value(Value::Primitive(PrimitiveValue::Int32(9)));
        assert_eq!(elems.logical_len(), 10);
        assert!(matches!(elems.get(2), Some(Value::Null)));
        assert!(matches!(elems.get(8), Some(Value::Null)));
        match elems.get(9) {
            Some(Value::Primitive(PrimitiveValue::Int32(9))) => {}
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn setting_inside_null_run_splits_it() {
        let mut elems = ArrayElements::new();
        elems.push_null_run(false, 5);
        elems
            .set(2, Value::Primitive(PrimitiveValue::Int32(42)))
            .unwrap();
        assert_eq!(elems.logical_len(), 5);
        assert!(matches!(elems.get(0), Some(Value::Null)));
        assert!(matches!(elems.get(1), Some(Value::Null)));
        match elems.get(2) {
            Some(Value::Primitive(PrimitiveValue::Int32(42))) => {}
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(elems.get(3), Some(Value::Null)));
        assert!(matches!(elems.get(4), Some(Value::Null)));
        assert_eq!(elems.slots().len(), 3);
    }

    #[test]
    fn class_record_get_set_unknown_member() {
        let mut rec = ClassRecord {
            class_info: ClassInfo {
                object_id: 1,
                name: "C".into(),
                member_names: vec!["x".into()],
            },
            member_type_info: None,
            library_id: None,
            original_kind: RecordKind::ClassWithMembers,
            metadata_id: None,
            member_values: vec![Value::Primitive(PrimitiveValue::Int32(5))],
        };
        assert!(rec.get_value("missing").is_err());
        rec.set_value("x", Value::Primitive(PrimitiveValue::Int32(9)))
            .unwrap();
        match rec.get_value("x").unwrap() {
            Value::Nested(handle) => match &*handle.borrow() {
                Record::MemberPrimitiveTyped { value, .. } => {
                    assert_eq!(*value, PrimitiveValue::Int32(9));
                }
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }
}
