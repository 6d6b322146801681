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

use thiserror::Error;

/// Result type used throughout the codec.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unexpected end of stream at offset {offset}")]
    TruncatedStream { offset: usize },

    #[error("invalid record tag 0x{byte:02x} at offset {offset} (context: {context})")]
    BadRecordTag {
        byte: u8,
        offset: usize,
        context: String,
    },

    #[error("malformed variable-length integer at offset {offset}")]
    MalformedVarint { offset: usize },

    #[error("negative length-prefixed string length {0}")]
    NegativeStringLength(i32),

    #[error("invalid UTF-8 in length-prefixed string")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("invalid binary type tag {0}")]
    InvalidBinaryType(u8),

    #[error("invalid primitive type tag {0}")]
    InvalidPrimitiveType(u8),

    #[error("invalid binary array kind tag {0}")]
    InvalidArrayKind(u8),

    #[error("ClassWithId references unknown metadata id {metadata_id}")]
    UnknownMetadata { metadata_id: i32 },

    #[error("duplicate object id {id}")]
    DuplicateObjectId { id: i32 },

    #[error("root object id {root_id} is not present in the record table")]
    RootNotFound { root_id: i32 },

    #[error("class {class} has no member named {name}")]
    UnknownMember { class: String, name: String },

    #[error("unresolved reference to object id {id_ref}")]
    UnresolvedReference { id_ref: i32 },

    #[error("cannot determine the wire primitive type for this value in an untyped context")]
    EncodeTypeAmbiguous,

    #[error("stream exceeds the maximum of {0} records")]
    RecordLimitExceeded(usize),

    #[error("malformed GUID string: {0}")]
    InvalidGuid(String),

    #[error("unrecognized {kind} name {name:?} in JSON document")]
    UnknownTypeName { kind: &'static str, name: String },

    #[error("path segment {0:?} did not resolve")]
    PathNotFound(String),
}
