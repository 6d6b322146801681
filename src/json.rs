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

//! JSON import/export of a decoded graph.
//!
//! Every object-id-bearing record is emitted once, tagged `"$record"` with
//! its wire kind and `"$id"` with its object id; later occurrences of the
//! same object collapse to `{"$ref": id}`. Null runs inside arrays keep
//! their run shape as `{"$nullRun": {"wide": bool, "count": n}}` entries
//! rather than flattening to repeated nulls, so a decode -> to_json ->
//! from_json -> encode round trip reproduces the original bytes.

use crate::error::{Error, Result};
use crate::records::*;
use serde_json::{json, Map, Value as Json};
use std::collections::HashMap;

fn primitive_type_name(pt: PrimitiveType) -> &'static str {
    match pt {
        PrimitiveType::Boolean => "Boolean",
        PrimitiveType::Byte => "Byte",
        PrimitiveType::Char => "Char",
        PrimitiveType::Decimal => "Decimal",
        PrimitiveType::Double => "Double",
        PrimitiveType::Int16 => "Int16",
        PrimitiveType::Int32 => "Int32",
        PrimitiveType::Int64 => "Int64",
        PrimitiveType::SByte => "SByte",
        PrimitiveType::Single => "Single",
        PrimitiveType::TimeSpan => "TimeSpan",
        PrimitiveType::DateTime => "DateTime",
        PrimitiveType::UInt16 => "UInt16",
        PrimitiveType::UInt32 => "UInt32",
        PrimitiveType::UInt64 => "UInt64",
        PrimitiveType::Null => "Null",
        PrimitiveType::String => "String",
    }
}

fn primitive_type_from_name(name: &str) -> Result<PrimitiveType> {
    Ok(match name {
        "Boolean" => PrimitiveType::Boolean,
        "Byte" => PrimitiveType::Byte,
        "Char" => PrimitiveType::Char,
        "Decimal" => PrimitiveType::Decimal,
        "Double" => PrimitiveType::Double,
        "Int16" => PrimitiveType::Int16,
        "Int32" => PrimitiveType::Int32,
        "Int64" => PrimitiveType::Int64,
        "SByte" => PrimitiveType::SByte,
        "Single" => PrimitiveType::Single,
        "TimeSpan" => PrimitiveType::TimeSpan,
        "DateTime" => PrimitiveType::DateTime,
        "UInt16" => PrimitiveType::UInt16,
        "UInt32" => PrimitiveType::UInt32,
        "UInt64" => PrimitiveType::UInt64,
        "Null" => PrimitiveType::Null,
        "String" => PrimitiveType::String,
        other => {
            return Err(Error::UnknownTypeName {
                kind: "primitive type",
                name: other.to_string(),
            })
        }
    })
}

fn binary_type_name(bt: BinaryType) -> &'static str {
    match bt {
        BinaryType::Primitive => "Primitive",
        BinaryType::String => "String",
        BinaryType::Object => "Object",
        BinaryType::SystemClass => "SystemClass",
        BinaryType::Class => "Class",
        BinaryType::ObjectArray => "ObjectArray",
        BinaryType::StringArray => "StringArray",
        BinaryType::PrimitiveArray => "PrimitiveArray",
    }
}

fn binary_type_from_name(name: &str) -> Result<BinaryType> {
    Ok(match name {
        "Primitive" => BinaryType::Primitive,
        "String" => BinaryType::String,
        "Object" => BinaryType::Object,
        "SystemClass" => BinaryType::SystemClass,
        "Class" => BinaryType::Class,
        "ObjectArray" => BinaryType::ObjectArray,
        "StringArray" => BinaryType::StringArray,
        "PrimitiveArray" => BinaryType::PrimitiveArray,
        other => {
            return Err(Error::UnknownTypeName {
                kind: "binary type",
                name: other.to_string(),
            })
        }
    })
}

fn binary_array_kind_name(kind: BinaryArrayKind) -> &'static str {
    match kind {
        BinaryArrayKind::Single => "Single",
        BinaryArrayKind::Jagged => "Jagged",
        BinaryArrayKind::Rectangular => "Rectangular",
        BinaryArrayKind::SingleOffset => "SingleOffset",
        BinaryArrayKind::JaggedOffset => "JaggedOffset",
        BinaryArrayKind::RectangularOffset => "RectangularOffset",
    }
}

fn binary_array_kind_from_name(name: &str) -> Result<BinaryArrayKind> {
    Ok(match name {
        "Single" => BinaryArrayKind::Single,
        "Jagged" => BinaryArrayKind::Jagged,
        "Rectangular" => BinaryArrayKind::Rectangular,
        "SingleOffset" => BinaryArrayKind::SingleOffset,
        "JaggedOffset" => BinaryArrayKind::JaggedOffset,
        "RectangularOffset" => BinaryArrayKind::RectangularOffset,
        other => {
            return Err(Error::UnknownTypeName {
                kind: "binary array kind",
                name: other.to_string(),
            })
        }
    })
}

fn record_kind_name(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Header => "Header",
        RecordKind::ClassWithId => "ClassWithId",
        RecordKind::SystemClassWithMembers => "SystemClassWithMembers",
        RecordKind::ClassWithMembers => "ClassWithMembers",
        RecordKind::SystemClassWithMembersAndTypes => "SystemClassWithMembersAndTypes",
        RecordKind::ClassWithMembersAndTypes => "ClassWithMembersAndTypes",
        RecordKind::BinaryObjectString => "BinaryObjectString",
        RecordKind::BinaryArray => "BinaryArray",
        RecordKind::MemberPrimitiveTyped => "MemberPrimitiveTyped",
        RecordKind::MemberReference => "MemberReference",
        RecordKind::ObjectNull => "ObjectNull",
        RecordKind::MessageEnd => "MessageEnd",
        RecordKind::BinaryLibrary => "BinaryLibrary",
        RecordKind::ObjectNullMultiple256 => "ObjectNullMultiple256",
        RecordKind::ObjectNullMultiple => "ObjectNullMultiple",
        RecordKind::ArraySinglePrimitive => "ArraySinglePrimitive",
        RecordKind::ArraySingleObject => "ArraySingleObject",
        RecordKind::ArraySingleString => "ArraySingleString",
    }
}

fn record_kind_from_name(name: &str) -> Result<RecordKind> {
    Ok(match name {
        "ClassWithId" => RecordKind::ClassWithId,
        "SystemClassWithMembers" => RecordKind::SystemClassWithMembers,
        "ClassWithMembers" => RecordKind::ClassWithMembers,
        "SystemClassWithMembersAndTypes" => RecordKind::SystemClassWithMembersAndTypes,
        "ClassWithMembersAndTypes" => RecordKind::ClassWithMembersAndTypes,
        "BinaryObjectString" => RecordKind::BinaryObjectString,
        "BinaryArray" => RecordKind::BinaryArray,
        "MemberPrimitiveTyped" => RecordKind::MemberPrimitiveTyped,
        "ArraySinglePrimitive" => RecordKind::ArraySinglePrimitive,
        "ArraySingleObject" => RecordKind::ArraySingleObject,
        "ArraySingleString" => RecordKind::ArraySingleString,
        other => {
            return Err(Error::BadRecordTag {
                byte: 0,
                offset: 0,
                context: other.to_string(),
            });
        }
    })
}

fn primitive_to_json(p: &PrimitiveValue) -> Json {
    let type_name = primitive_type_name(p.primitive_type());
    let value = match p {
        PrimitiveValue::Boolean(b) => json!(b),
        PrimitiveValue::Byte(b) => json!(b),
        PrimitiveValue::SByte(b) => json!(b),
        PrimitiveValue::Char(c) => json!(c.to_string()),
        PrimitiveValue::Decimal(hex) => json!(hex),
        PrimitiveValue::Double(d) => json!(d),
        PrimitiveValue::Int16(v) => json!(v),
        PrimitiveValue::Int32(v) => json!(v),
        PrimitiveValue::Int64(v) => json!(v),
        PrimitiveValue::Single(v) => json!(v),
        PrimitiveValue::TimeSpan(v) => json!(v),
        PrimitiveValue::DateTime(v) => json!(v),
        PrimitiveValue::UInt16(v) => json!(v),
        PrimitiveValue::UInt32(v) => json!(v),
        PrimitiveValue::UInt64(v) => json!(v),
        PrimitiveValue::String(s) => json!(s),
        PrimitiveValue::Null => Json::Null,
    };
    json!({ "type": type_name, "value": value })
}

fn primitive_from_json(j: &Json) -> Result<PrimitiveValue> {
    let obj = j
        .as_object()
        .ok_or_else(|| Error::InvalidGuid("primitive is not an object".to_string()))?;
    let type_name = obj
        .get("type")
        .and_then(Json::as_str)
        .ok_or_else(|| Error::InvalidGuid("primitive missing type".to_string()))?;
    let pt = primitive_type_from_name(type_name)?;
    let value = obj.get("value").cloned().unwrap_or(Json::Null);
    Ok(match pt {
        PrimitiveType::Boolean => PrimitiveValue::Boolean(value.as_bool().unwrap_or_default()),
        PrimitiveType::Byte => PrimitiveValue::Byte(value.as_u64().unwrap_or_default() as u8),
        PrimitiveType::SByte => PrimitiveValue::SByte(value.as_i64().unwrap_or_default() as i8),
        PrimitiveType::Char => PrimitiveValue::Char(
            value
                .as_str()
                .and_then(|s| s.chars().next())
                .unwrap_or_default(),
        ),
        PrimitiveType::Decimal => {
            PrimitiveValue::Decimal(value.as_str().unwrap_or_default().to_string())
        }
        PrimitiveType::Double => PrimitiveValue::Double(value.as_f64().unwrap_or_default()),
        PrimitiveType::Int16 => PrimitiveValue::Int16(value.as_i64().unwrap_or_default() as i16),
        PrimitiveType::Int32 => PrimitiveValue::Int32(value.as_i64().unwrap_or_default() as i32),
        PrimitiveType::Int64 => PrimitiveValue::Int64(value.as_i64().unwrap_or_default()),
        PrimitiveType::Single => PrimitiveValue::Single(value.as_f64().unwrap_or_default() as f32),
        PrimitiveType::TimeSpan => PrimitiveValue::TimeSpan(value.as_i64().unwrap_or_default()),
        PrimitiveType::DateTime => PrimitiveValue::DateTime(value.as_i64().unwrap_or_default()),
        PrimitiveType::UInt16 => PrimitiveValue::UInt16(value.as_u64().unwrap_or_default() as u16),
        PrimitiveType::UInt32 => PrimitiveValue::UInt32(value.as_u64().unwrap_or_default() as u32),
        PrimitiveType::UInt64 => PrimitiveValue::UInt64(value.as_u64().unwrap_or_default()),
        PrimitiveType::String => {
            PrimitiveValue::String(value.as_str().unwrap_or_default().to_string())
        }
        PrimitiveType::Null => PrimitiveValue::Null,
    })
}

fn additional_type_info_to_json(a: &AdditionalTypeInfo) -> Json {
    match a {
        AdditionalTypeInfo::Primitive(pt) => json!({ "kind": "Primitive", "primitiveType": primitive_type_name(*pt) }),
        AdditionalTypeInfo::SystemClass(name) => json!({ "kind": "SystemClass", "typeName": name }),
        AdditionalTypeInfo::Class { type_name, library_id } => {
            json!({ "kind": "Class", "typeName": type_name, "libraryId": library_id })
        }
        AdditionalTypeInfo::None => json!({ "kind": "None" }),
    }
}

fn additional_type_info_from_json(j: &Json) -> Result<AdditionalTypeInfo> {
    let kind = j
        .get("kind")
        .and_then(Json::as_str)
        .ok_or_else(|| Error::InvalidGuid("additionalTypeInfo missing kind".to_string()))?;
    Ok(match kind {
        "Primitive" => AdditionalTypeInfo::Primitive(primitive_type_from_name(
            j.get("primitiveType").and_then(Json::as_str).unwrap_or(""),
        )?),
        "SystemClass" => AdditionalTypeInfo::SystemClass(
            j.get("typeName").and_then(Json::as_str).unwrap_or("").to_string(),
        ),
        "Class" => AdditionalTypeInfo::Class {
            type_name: j.get("typeName").and_then(Json::as_str).unwrap_or("").to_string(),
            library_id: j.get("libraryId").and_then(Json::as_i64).unwrap_or(0) as i32,
        },
        _ => AdditionalTypeInfo::None,
    })
}

fn member_type_info_to_json(m: &MemberTypeInfo) -> Json {
    json!({
        "binaryTypes": m.binary_types.iter().map(|bt| binary_type_name(*bt)).collect::<Vec<_>>(),
        "additional": m.additional.iter().map(additional_type_info_to_json).collect::<Vec<_>>(),
    })
}

fn member_type_info_from_json(j: &Json) -> Result<MemberTypeInfo> {
    let binary_types = j
        .get("binaryTypes")
        .and_then(Json::as_array)
        .ok_or_else(|| Error::InvalidGuid("memberTypeInfo missing binaryTypes".to_string()))?
        .iter()
        .map(|v| binary_type_from_name(v.as_str().unwrap_or("")))
        .collect::<Result<Vec<_>>>()?;
    let additional = j
        .get("additional")
        .and_then(Json::as_array)
        .ok_or_else(|| Error::InvalidGuid("memberTypeInfo missing additional".to_string()))?
        .iter()
        .map(additional_type_info_from_json)
        .collect::<Result<Vec<_>>>()?;
    Ok(MemberTypeInfo {
        binary_types,
        additional,
    })
}

fn array_elements_from_json(j: &Json, seen: &mut HashMap<i32, RecordHandle>) -> Result<ArrayElements> {
    let mut elements = ArrayElements::new();
    for item in j
        .as_array()
        .ok_or_else(|| Error::InvalidGuid("array elements is not a json array".to_string()))?
    {
        if let Some(run) = item.get("$nullRun") {
            let wide = run.get("wide").and_then(Json::as_bool).unwrap_or(false);
            let count = run.get("count").and_then(Json::as_i64).unwrap_or(0);
            elements.push_null_run(wide, count);
        } else {
            elements.push_value(value_from_json(item, seen)?);
        }
    }
    Ok(elements)
}

/// Walks an object graph once, emitting each object-id-bearing record in
/// full the first time it's seen and collapsing later occurrences to
/// `{"$ref": id}` (mirrors the encoder's `emitted_objects` dedup).
struct JsonWriter {
    seen: std::collections::HashSet<i32>,
}

impl JsonWriter {
    fn value_to_json(&mut self, v: &Value) -> Json {
        match v {
            Value::Null => Json::Null,
            Value::Primitive(p) => primitive_to_json(p),
            Value::Reference(id) => json!({ "$ref": id }),
            Value::Nested(handle) => self.record_handle_to_json(handle),
        }
    }

    fn record_handle_to_json(&mut self, handle: &RecordHandle) -> Json {
        let rec = handle.borrow();
        let object_id = rec.object_id();
        if let Some(id) = object_id {
            if self.seen.contains(&id) {
                return json!({ "$ref": id });
            }
            self.seen.insert(id);
        }
        self.record_body_to_json(&rec, object_id)
    }

    fn record_body_to_json(&mut self, rec: &Record, object_id: Option<i32>) -> Json {
        let mut obj = Map::new();
        obj.insert(
            "$record".to_string(),
            json!(record_kind_name(rec.record_kind())),
        );
        if let Some(id) = object_id {
            obj.insert("$id".to_string(), json!(id));
        }
        match rec {
            Record::Class(c) => {
                obj.insert("name".to_string(), json!(c.class_info.name));
                if let Some(mid) = c.metadata_id {
                    obj.insert("metadataId".to_string(), json!(mid));
                }
                if let Some(lib) = c.library_id {
                    obj.insert("libraryId".to_string(), json!(lib));
                }
                if let Some(mti) = &c.member_type_info {
                    obj.insert("memberTypeInfo".to_string(), member_type_info_to_json(mti));
                }
                let mut members = Map::new();
                for (name, value) in c.class_info.member_names.iter().zip(&c.member_values) {
                    members.insert(name.clone(), self.value_to_json(value));
                }
                obj.insert("members".to_string(), Json::Object(members));
            }
            Record::BinaryObjectString(s) => {
                obj.insert("value".to_string(), json!(s.value));
            }
            Record::BinaryArray(a) => {
                obj.insert("kind".to_string(), json!(binary_array_kind_name(a.kind)));
                obj.insert("rank".to_string(), json!(a.rank));
                obj.insert("lengths".to_string(), json!(a.lengths));
                obj.insert("lowerBounds".to_string(), json!(a.lower_bounds));
                obj.insert(
                    "elementType".to_string(),
                    json!(binary_type_name(a.element_type)),
                );
                obj.insert(
                    "elementTypeInfo".to_string(),
                    additional_type_info_to_json(&a.element_type_info),
                );
                obj.insert(
                    "elements".to_string(),
                    self.array_elements_to_json(&a.elements),
                );
            }
            Record::ArraySinglePrimitive(a) => {
                obj.insert(
                    "elementType".to_string(),
                    json!(primitive_type_name(a.element_type)),
                );
                obj.insert(
                    "values".to_string(),
                    json!(a.values.iter().map(primitive_to_json).collect::<Vec<_>>()),
                );
            }
            Record::ArraySingleObject(a) => {
                obj.insert(
                    "elements".to_string(),
                    self.array_elements_to_json(&a.elements),
                );
            }
            Record::ArraySingleString(a) => {
                obj.insert(
                    "elements".to_string(),
                    self.array_elements_to_json(&a.elements),
                );
            }
            Record::MemberPrimitiveTyped { value, .. } => {
                return primitive_to_json(value);
            }
            Record::ObjectNull => return Json::Null,
            Record::MessageEnd | Record::Header(_) => {}
        }
        Json::Object(obj)
    }

    fn array_elements_to_json(&mut self, elements: &ArrayElements) -> Json {
        let items: Vec<Json> = elements
            .slots()
            .iter()
            .map(|slot| match slot {
                ArraySlot::One(v) => self.value_to_json(v),
                ArraySlot::NullRun { wide, count } => {
                    json!({ "$nullRun": { "wide": wide, "count": count } })
                }
            })
            .collect();
        Json::Array(items)
    }
}

fn value_from_json(j: &Json, seen: &mut HashMap<i32, RecordHandle>) -> Result<Value> {
    if j.is_null() {
        return Ok(Value::Null);
    }
    if let Some(r) = j.get("$ref") {
        let id = r
            .as_i64()
            .ok_or_else(|| Error::InvalidGuid("$ref is not an integer".to_string()))? as i32;
        return Ok(Value::Reference(id));
    }
    if j.get("$record").is_some() {
        return Ok(Value::Nested(record_from_json(j, seen)?));
    }
    // bare {"type": ..., "value": ...} primitive, used for boxed members.
    Ok(Value::Primitive(primitive_from_json(j)?))
}

fn record_from_json(j: &Json, seen: &mut HashMap<i32, RecordHandle>) -> Result<RecordHandle> {
    let kind_name = j
        .get("$record")
        .and_then(Json::as_str)
        .ok_or_else(|| Error::InvalidGuid("record missing $record".to_string()))?;
    let kind = record_kind_from_name(kind_name)?;
    let object_id = j.get("$id").and_then(Json::as_i64).map(|v| v as i32);

    if let (Some(id), Some(existing)) = (object_id, object_id.and_then(|id| seen.get(&id))) {
        let _ = id;
        return Ok(existing.clone());
    }

    let handle = match kind {
        RecordKind::BinaryObjectString => new_handle(Record::BinaryObjectString(
            BinaryObjectStringRecord {
                object_id: object_id.unwrap_or(0),
                value: j
                    .get("value")
                    .and_then(Json::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
        )),
        RecordKind::MemberPrimitiveTyped => {
            let p = primitive_from_json(j)?;
            new_handle(Record::MemberPrimitiveTyped {
                primitive_type: p.primitive_type(),
                value: p,
            })
        }
        RecordKind::ArraySinglePrimitive => {
            let element_type = primitive_type_from_name(
                j.get("elementType").and_then(Json::as_str).unwrap_or(""),
            )?;
            let values = j
                .get("values")
                .and_then(Json::as_array)
                .ok_or_else(|| Error::InvalidGuid("values missing".to_string()))?
                .iter()
                .map(primitive_from_json)
                .collect::<Result<Vec<_>>>()?;
            new_handle(Record::ArraySinglePrimitive(ArraySinglePrimitiveRecord {
                object_id: object_id.unwrap_or(0),
                element_type,
                values,
            }))
        }
        RecordKind::ArraySingleObject | RecordKind::ArraySingleString | RecordKind::BinaryArray => {
            // Register a placeholder first so self-referential elements
            // resolve against a live handle, then fill it in below.
            let placeholder = match kind {
                RecordKind::ArraySingleObject => Record::ArraySingleObject(ArraySingleObjectRecord {
                    object_id: object_id.unwrap_or(0),
                    elements: ArrayElements::new(),
                }),
                RecordKind::ArraySingleString => Record::ArraySingleString(ArraySingleStringRecord {
                    object_id: object_id.unwrap_or(0),
                    elements: ArrayElements::new(),
                }),
                _ => Record::BinaryArray(BinaryArrayRecord {
                    object_id: object_id.unwrap_or(0),
                    kind: binary_array_kind_from_name(
                        j.get("kind").and_then(Json::as_str).unwrap_or("Single"),
                    )?,
                    rank: j.get("rank").and_then(Json::as_i64).unwrap_or(1) as i32,
                    lengths: j
                        .get("lengths")
                        .and_then(Json::as_array)
                        .map(|a| a.iter().filter_map(Json::as_i64).map(|v| v as i32).collect())
                        .unwrap_or_default(),
                    lower_bounds: j.get("lowerBounds").and_then(Json::as_array).map(|a| {
                        a.iter().filter_map(Json::as_i64).map(|v| v as i32).collect()
                    }),
                    element_type: binary_type_from_name(
                        j.get("elementType").and_then(Json::as_str).unwrap_or(""),
                    )?,
                    element_type_info: j
                        .get("elementTypeInfo")
                        .map(additional_type_info_from_json)
                        .transpose()?
                        .unwrap_or(AdditionalTypeInfo::None),
                    elements: ArrayElements::new(),
                }),
            };
            let handle = new_handle(placeholder);
            if let Some(id) = object_id {
                seen.insert(id, handle.clone());
            }
            let elements = array_elements_from_json(
                j.get("elements").unwrap_or(&Json::Array(Vec::new())),
                seen,
            )?;
            match &mut *handle.borrow_mut() {
                Record::ArraySingleObject(a) => a.elements = elements,
                Record::ArraySingleString(a) => a.elements = elements,
                Record::BinaryArray(a) => a.elements = elements,
                _ => unreachable!(),
            }
            return Ok(handle);
        }
        RecordKind::ClassWithId
        | RecordKind::SystemClassWithMembers
        | RecordKind::ClassWithMembers
        | RecordKind::SystemClassWithMembersAndTypes
        | RecordKind::ClassWithMembersAndTypes => {
            let name = j
                .get("name")
                .and_then(Json::as_str)
                .unwrap_or_default()
                .to_string();
            let members_obj = j
                .get("members")
                .and_then(Json::as_object)
                .ok_or_else(|| Error::InvalidGuid("class missing members".to_string()))?;
            let member_names: Vec<String> = members_obj.keys().cloned().collect();
            let member_type_info = j
                .get("memberTypeInfo")
                .map(member_type_info_from_json)
                .transpose()?;
            let class_info = ClassInfo {
                object_id: object_id.unwrap_or(0),
                name,
                member_names: member_names.clone(),
            };
            let placeholder = new_handle(Record::Class(ClassRecord {
                class_info: class_info.clone(),
                member_type_info: member_type_info.clone(),
                library_id: j.get("libraryId").and_then(Json::as_i64).map(|v| v as i32),
                original_kind: kind,
                metadata_id: j.get("metadataId").and_then(Json::as_i64).map(|v| v as i32),
                member_values: Vec::new(),
            }));
            if let Some(id) = object_id {
                seen.insert(id, placeholder.clone());
            }
            let mut member_values = Vec::with_capacity(member_names.len());
            for name in &member_names {
                let v = members_obj.get(name).ok_or_else(|| Error::UnknownMember {
                    class: class_info.name.clone(),
                    name: name.clone(),
                })?;
                member_values.push(value_from_json(v, seen)?);
            }
            if let Record::Class(c) = &mut *placeholder.borrow_mut() {
                c.member_values = member_values;
            }
            return Ok(placeholder);
        }
        RecordKind::Header
        | RecordKind::ObjectNull
        | RecordKind::MessageEnd
        | RecordKind::BinaryLibrary
        | RecordKind::ObjectNullMultiple256
        | RecordKind::ObjectNullMultiple
        | RecordKind::MemberReference => {
            return Err(Error::BadRecordTag {
                byte: 0,
                offset: 0,
                context: kind_name.to_string(),
            });
        }
    };

    if let Some(id) = object_id {
        seen.insert(id, handle.clone());
    }
    Ok(handle)
}

/// Serializes a decoded graph to a JSON document: header, library table,
/// and the root value (or `null` for an empty graph).
pub fn to_json(header: &Header, root: Option<&RecordHandle>, libraries: &HashMap<i32, String>) -> Json {
    let mut writer = JsonWriter {
        seen: std::collections::HashSet::new(),
    };
    let root_json = match root {
        Some(r) => writer.record_handle_to_json(r),
        None => Json::Null,
    };
    json!({
        "header": {
            "rootId": header.root_id,
            "headerId": header.header_id,
            "majorVersion": header.major_version,
            "minorVersion": header.minor_version,
        },
        "libraries": libraries,
        "root": root_json,
    })
}

/// Reconstructs `(header, root, libraries)` from a document produced by
/// [`to_json`].
pub fn from_json(doc: &Json) -> Result<(Header, Option<RecordHandle>, HashMap<i32, String>)> {
    let h = doc
        .get("header")
        .ok_or_else(|| Error::InvalidGuid("missing header".to_string()))?;
    let header = Header {
        root_id: h.get("rootId").and_then(Json::as_i64).unwrap_or(0) as i32,
        header_id: h.get("headerId").and_then(Json::as_i64).unwrap_or(-1) as i32,
        major_version: h.get("majorVersion").and_then(Json::as_i64).unwrap_or(1) as i32,
        minor_version: h.get("minorVersion").and_then(Json::as_i64).unwrap_or(0) as i32,
    };
    let libraries: HashMap<i32, String> = doc
        .get("libraries")
        .and_then(Json::as_object)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| {
                    Some((k.parse::<i32>().ok()?, v.as_str()?.to_string()))
                })
                .collect()
        })
        .unwrap_or_default();

    let mut seen: HashMap<i32, RecordHandle> = HashMap::new();
    let root = match doc.get("root") {
        Some(Json::Null) | None => None,
        Some(r) => Some(record_from_json(r, &mut seen)?),
    };

    Ok((header, root, libraries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode;
    use crate::encoder::encode;
    use crate::cursor::ByteWriter;
    use crate::records::RecordKind as RK;

    fn sample_stream() -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.write_u8(RK::Header as u8);
        w.write_i32(1);
        w.write_i32(-1);
        w.write_i32(1);
        w.write_i32(0);
        w.write_u8(RK::BinaryObjectString as u8);
        w.write_i32(1);
        w.write_string("hi");
        w.write_u8(RK::MessageEnd as u8);
        w.finish()
    }

    #[test]
    fn to_json_then_from_json_round_trips_bytes() {
        let bytes = sample_stream();
        let out = decode(&bytes).unwrap();
        let doc = to_json(&out.header, out.root.as_ref(), &out.libraries);
        let (header, root, libraries) = from_json(&doc).unwrap();
        let re_encoded = encode(&header, root.as_ref(), &libraries).unwrap();
        assert_eq!(re_encoded, bytes);
    }

    #[test]
    fn to_json_tags_string_record_with_id_and_value() {
        let bytes = sample_stream();
        let out = decode(&bytes).unwrap();
        let doc = to_json(&out.header, out.root.as_ref(), &out.libraries);
        assert_eq!(doc["root"]["$record"], "BinaryObjectString");
        assert_eq!(doc["root"]["$id"], 1);
        assert_eq!(doc["root"]["value"], "hi");
    }
}
