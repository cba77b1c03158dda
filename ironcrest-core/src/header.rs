// Copyright 2016 The Grin Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The 80-byte block header: the only part of a block that carries
//! proof-of-work and is replicated ahead of block bodies during sync
//! (header-first download).

use crate::hash::{Hash, Hashed};
use crate::height::Height;
use crate::ser::{self, BinReader, BinWriter, Readable, Writeable};
use crate::target::Target;

/// Fixed-width, bit-exact 80-byte header:
/// `version:u32 | prevHash:32 | merkleRoot:32 | timestamp:u32 | target:u32 | nonce:u32`.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Header {
	/// Format version, allows the wire layout itself to evolve.
	pub version: u32,
	/// Hash of the previous header; [`crate::hash::ZERO_HASH`] at genesis.
	pub prev_hash: Hash,
	/// Root of the block body's Merkle tree (see [`crate::block::Body::merkle_root`]).
	pub merkle_root: Hash,
	/// Unix timestamp, seconds.
	pub timestamp: u32,
	/// Raw 4-byte difficulty target; interpretation (V1 vs V2) depends on height.
	pub target_raw: u32,
	/// Proof-of-work nonce.
	pub nonce: u32,
}

/// Wire size of a header in bytes.
pub const HEADER_SIZE: usize = 4 + 32 + 32 + 4 + 4 + 4;

impl Header {
	/// Interprets [`Self::target_raw`] according to the header's height.
	pub fn target(&self, height: Height) -> Target {
		Target::from_raw(self.target_raw, height)
	}

	/// The header hash used for chain linking (distinct from the
	/// proof-of-work hash dispatched in [`crate::pow`]).
	pub fn id_hash(&self) -> Hash {
		self.hash()
	}
}

impl Writeable for Header {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		writer.write_u32(self.version)?;
		self.prev_hash.write(writer)?;
		self.merkle_root.write(writer)?;
		writer.write_u32(self.timestamp)?;
		writer.write_u32(self.target_raw)?;
		writer.write_u32(self.nonce)
	}
}

impl Readable for Header {
	fn read(reader: &mut BinReader) -> Result<Header, ser::Error> {
		let version = reader.read_u32()?;
		let prev_hash = Hash::read(reader)?;
		let merkle_root = Hash::read(reader)?;
		let timestamp = reader.read_u32()?;
		let target_raw = reader.read_u32()?;
		let nonce = reader.read_u32()?;
		Ok(Header { version, prev_hash, merkle_root, timestamp, target_raw, nonce })
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn header_roundtrips_through_wire_encoding() {
		let h = Header {
			version: 1,
			prev_hash: crate::hash::ZERO_HASH,
			merkle_root: crate::hash::ZERO_HASH,
			timestamp: 1_700_000_000,
			target_raw: crate::target::TargetV1::genesis().raw(),
			nonce: 42,
		};
		let bytes = ser::ser_vec(&h).unwrap();
		assert_eq!(bytes.len(), HEADER_SIZE);
		let h2: Header = ser::deserialize(&bytes).unwrap();
		assert_eq!(h, h2);
	}
}
