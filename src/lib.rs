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

//! A round-trip codec for the .NET Remoting Binary Format (MS-NRBF).
//!
//! [`decoder::decode`] turns a buffer into an in-memory object graph;
//! [`encoder::encode`] turns it back into bytes, reproducing the original
//! stream exactly when the graph is unmodified. [`pathnav`] lets a caller
//! navigate and edit that graph with dotted paths instead of matching on
//! [`records::Record`] directly. [`guid`], [`sniff`], and [`json`] are
//! peripheral helpers layered on top of the same graph.

pub mod cursor;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod guid;
pub mod json;
pub mod pathnav;
pub mod records;
pub mod sniff;

pub use decoder::{decode, DecodeOutput};
pub use encoder::encode;
pub use error::{Error, Result};
pub use pathnav::{get_path, set_path};
pub use records::{Header, Record, RecordHandle, Value};
pub use sniff::looks_like_nrbf;
