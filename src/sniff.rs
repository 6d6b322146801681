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

//! Cheap header sniff, for callers that want to check "is this NRBF?"
//! before paying for a full decode.

/// `true` if `bytes` starts with a well-formed NRBF `SerializationHeaderRecord`:
/// at least 17 bytes, a leading `Header` tag byte, and a major/minor version
/// of 1.0 at offset 9.
pub fn looks_like_nrbf(bytes: &[u8]) -> bool {
    bytes.len() >= 17 && bytes[0] == 0 && bytes[9..17] == [1, 0, 0, 0, 0, 0, 0, 0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::ByteWriter;
    use crate::records::RecordKind;

    #[test]
    fn accepts_a_well_formed_header() {
        let mut w = ByteWriter::new();
        w.write_u8(RecordKind::Header as u8);
        w.write_i32(1);
        w.write_i32(-1);
        w.write_i32(1);
        w.write_i32(0);
        assert!(looks_like_nrbf(&w.finish()));
    }

    #[test]
    fn rejects_short_buffers() {
        assert!(!looks_like_nrbf(&[0u8; 16]));
        assert!(!looks_like_nrbf(&[]));
    }

    #[test]
    fn rejects_wrong_leading_byte_or_version() {
        let mut bytes = vec![1u8; 17];
        bytes[9..17].copy_from_slice(&[1, 0, 0, 0, 0, 0, 0, 0]);
        assert!(!looks_like_nrbf(&bytes));

        let mut bytes2 = vec![0u8; 17];
        bytes2[9..17].copy_from_slice(&[2, 0, 0, 0, 0, 0, 0, 0]);
        assert!(!looks_like_nrbf(&bytes2));
    }
}
