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

//! Row types and key encodings for the tables the chain store keeps in
//! its single LMDB database: headers, bodies, undo logs, consensus tip,
//! accounts, history, and rejected ("bad") blocks.

use ironcrest_core::address::{AccountId, Address};
use ironcrest_core::hash::Hash;
use ironcrest_core::header::Header;
use ironcrest_core::height::Height;
use ironcrest_core::ser::{self, BinReader, BinWriter, Readable, Writeable};

fn height_key(prefix: &[u8], height: Height) -> Vec<u8> {
	let mut key = prefix.to_vec();
	key.extend_from_slice(&height.to_be_bytes());
	key
}

/// Key for a stored header at `height`.
pub fn header_key(height: Height) -> Vec<u8> {
	height_key(b"H", height)
}
/// Key for a stored body at `height`.
pub fn body_key(height: Height) -> Vec<u8> {
	height_key(b"B", height)
}
/// Key for the undo log recorded when the block at `height` was applied.
pub fn undo_key(height: Height) -> Vec<u8> {
	height_key(b"U", height)
}
/// Key mapping a header hash back to its height, for `get_block(hash)`.
pub fn hash_index_key(hash: &Hash) -> Vec<u8> {
	let mut key = b"X".to_vec();
	key.extend_from_slice(hash.as_bytes());
	key
}
/// Key for a height the chain once had a block at but has since
/// overwritten by a reorg; kept so a rejected competing block's header is
/// still answerable against a retired descriptor.
pub fn badblock_key(height: Height) -> Vec<u8> {
	height_key(b"D", height)
}

/// Key for the account record of `account_id`.
pub fn account_key(account_id: AccountId) -> Vec<u8> {
	let mut key = b"A".to_vec();
	key.extend_from_slice(&account_id.0.to_be_bytes());
	key
}
/// Key mapping an `Address` to its assigned `AccountId`.
pub fn address_index_key(address: &Address) -> Vec<u8> {
	let mut key = b"R".to_vec();
	key.extend_from_slice(&address.0);
	key
}

/// Key for a globally-ordered history entry.
pub fn history_key(history_id: u64) -> Vec<u8> {
	let mut key = b"L".to_vec();
	key.extend_from_slice(&history_id.to_be_bytes());
	key
}
/// Key for one `(account_id, history_id)` membership row in the per-account
/// secondary index.
pub fn account_history_key(account_id: AccountId, history_id: u64) -> Vec<u8> {
	let mut key = b"C".to_vec();
	key.extend_from_slice(&account_id.0.to_be_bytes());
	key.extend_from_slice(&history_id.to_be_bytes());
	key
}
/// Prefix shared by every `account_history_key` row for `account_id`, used
/// to range-scan that account's history.
pub fn account_history_prefix(account_id: AccountId) -> Vec<u8> {
	let mut key = b"C".to_vec();
	key.extend_from_slice(&account_id.0.to_be_bytes());
	key
}

/// The single row describing where the consensus chain currently stands;
/// stored under a fixed key, overwritten on every mutation.
pub const CONSENSUS_TIP_KEY: &[u8] = b"TIP";

/// Single row describing the consensus chain's current extent.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct ConsensusRow {
	/// Current chain length.
	pub height: Height,
	/// Monotonic descriptor, bumped on every fork.
	pub descriptor: u64,
	/// Next unused history id.
	pub history_cursor: u64,
	/// Next unused account id.
	pub account_cursor: u64,
}

impl Writeable for ConsensusRow {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		writer.write_u32(self.height)?;
		writer.write_u64(self.descriptor)?;
		writer.write_u64(self.history_cursor)?;
		writer.write_u64(self.account_cursor)
	}
}

impl Readable for ConsensusRow {
	fn read(reader: &mut BinReader) -> Result<ConsensusRow, ser::Error> {
		Ok(ConsensusRow {
			height: reader.read_u32()?,
			descriptor: reader.read_u64()?,
			history_cursor: reader.read_u64()?,
			account_cursor: reader.read_u64()?,
		})
	}
}

/// One row per known account: its registered address and current balance.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct AccountRow {
	/// The account's registered address.
	pub address: Address,
	/// Current balance, in the smallest denomination.
	pub balance: u64,
}

impl Writeable for AccountRow {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		self.address.write(writer)?;
		writer.write_u64(self.balance)
	}
}

impl Readable for AccountRow {
	fn read(reader: &mut BinReader) -> Result<AccountRow, ser::Error> {
		Ok(AccountRow { address: Address::read(reader)?, balance: reader.read_u64()? })
	}
}

/// A flat, globally-ordered ledger entry.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct HistoryRow {
	/// Hash of whatever produced this entry (a transaction or a reward).
	pub hash: Hash,
	/// Opaque payload (amount/counterparty encoded by the caller).
	pub data: Vec<u8>,
}

impl Writeable for HistoryRow {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		self.hash.write(writer)?;
		writer.write_bytes(&self.data)
	}
}

impl Readable for HistoryRow {
	fn read(reader: &mut BinReader) -> Result<HistoryRow, ser::Error> {
		Ok(HistoryRow { hash: Hash::read(reader)?, data: reader.read_bytes()? })
	}
}

/// Headers rejected by consensus, retained so a probe against a retired
/// descriptor can still be answered.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct BadblockRow {
	/// The rejected header.
	pub header: Header,
}

impl Writeable for BadblockRow {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		self.header.write(writer)
	}
}

impl Readable for BadblockRow {
	fn read(reader: &mut BinReader) -> Result<BadblockRow, ser::Error> {
		Ok(BadblockRow { header: Header::read(reader)? })
	}
}
