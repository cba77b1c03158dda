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

//! 32-byte hash type (`Hash`: 32 bytes).

use std::fmt;

use ironcrest_util::to_hex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ser::{self, BinReader, BinWriter, Readable, Writeable};

/// Zero hash, used as the genesis block's `prevHash`.
pub const ZERO_HASH: Hash = Hash([0u8; 32]);

/// A 32-byte hash.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash(pub [u8; 32]);

impl Hash {
	/// Builds a `Hash` from a byte slice, failing if its length isn't 32.
	pub fn from_slice(bytes: &[u8]) -> Option<Hash> {
		if bytes.len() != 32 {
			return None;
		}
		let mut buf = [0u8; 32];
		buf.copy_from_slice(bytes);
		Some(Hash(buf))
	}

	/// The hash as a byte slice.
	pub fn as_bytes(&self) -> &[u8; 32] {
		&self.0
	}
}

impl fmt::Debug for Hash {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", to_hex(&self.0[..6]))
	}
}

impl fmt::Display for Hash {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", to_hex(&self.0))
	}
}

impl Writeable for Hash {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		writer.write_fixed_bytes(&self.0)
	}
}

impl Readable for Hash {
	fn read(reader: &mut BinReader) -> Result<Hash, ser::Error> {
		let bytes = reader.read_fixed_bytes(32)?;
		Ok(Hash::from_slice(&bytes).expect("read_fixed_bytes(32) returns 32 bytes"))
	}
}

impl Serialize for Hash {
	fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
		s.serialize_str(&to_hex(&self.0))
	}
}

impl<'de> Deserialize<'de> for Hash {
	fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Hash, D::Error> {
		let s = String::deserialize(d)?;
		let bytes = ironcrest_util::from_hex(&s).map_err(serde::de::Error::custom)?;
		Hash::from_slice(&bytes).ok_or_else(|| serde::de::Error::custom("expected 32-byte hash"))
	}
}

/// Implemented by types with a canonical hash over their wire encoding.
pub trait Hashed {
	/// Computes the hash of `self`.
	fn hash(&self) -> Hash;
}

impl<W: Writeable> Hashed for W {
	fn hash(&self) -> Hash {
		let bytes = ser::ser_vec(self).expect("in-memory serialization cannot fail");
		Hash(ironcrest_util::hash::double_sha256(&bytes))
	}
}
