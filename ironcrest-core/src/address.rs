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

//! Account addressing (`Address`: 20 bytes) and the internal dense
//! account-id assigned on first appearance in a block's address table
//! (recovered from `original_source/src/node/chainserver/account_cache.hpp`).

use std::fmt;

use ironcrest_util::to_hex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ser::{self, BinReader, BinWriter, Readable, Writeable};

/// A 20-byte account address, derived externally from a public key; the
/// derivation itself is the secp256k1 collaborator's concern.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub [u8; 20]);

impl Address {
	/// Builds an `Address` from a byte slice, failing if its length isn't 20.
	pub fn from_slice(bytes: &[u8]) -> Option<Address> {
		if bytes.len() != 20 {
			return None;
		}
		let mut buf = [0u8; 20];
		buf.copy_from_slice(bytes);
		Some(Address(buf))
	}
}

impl fmt::Debug for Address {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", to_hex(&self.0))
	}
}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", to_hex(&self.0))
	}
}

impl Writeable for Address {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		writer.write_fixed_bytes(&self.0)
	}
}

impl Readable for Address {
	fn read(reader: &mut BinReader) -> Result<Address, ser::Error> {
		let bytes = reader.read_fixed_bytes(20)?;
		Ok(Address::from_slice(&bytes).expect("read_fixed_bytes(20) returns 20 bytes"))
	}
}

impl Serialize for Address {
	fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
		s.serialize_str(&to_hex(&self.0))
	}
}

impl<'de> Deserialize<'de> for Address {
	fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Address, D::Error> {
		let s = String::deserialize(d)?;
		let bytes = ironcrest_util::from_hex(&s).map_err(serde::de::Error::custom)?;
		Address::from_slice(&bytes).ok_or_else(|| serde::de::Error::custom("expected 20-byte address"))
	}
}

/// A dense internal account identifier, assigned the first time an
/// `Address` appears in a block's address table. Recovered from
/// `original_source/src/node/chainserver/account_cache.hpp`: the chain
/// never indexes balances by `Address` directly, only by `AccountId`.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct AccountId(pub u64);

impl Writeable for AccountId {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		writer.write_u64(self.0)
	}
}

impl Readable for AccountId {
	fn read(reader: &mut BinReader) -> Result<AccountId, ser::Error> {
		Ok(AccountId(reader.read_u64()?))
	}
}

/// Either an `AccountId` or an `Address`; several read operations
/// (`get_balance`, `get_history`) accept either.
#[derive(Copy, Clone, Debug)]
pub enum AccountRef {
	/// A resolved internal account id.
	Id(AccountId),
	/// An address to resolve against the address table.
	Addr(Address),
}
