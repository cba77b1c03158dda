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

//! Transaction identity and the pin/nonce replay-protection scheme
//! (`TxId`, recovered in detail from
//! `original_source/src/node/state/helpers/consensus.hpp`).
//!
//! There are no UTXOs here: a transaction's identity is the triple of its
//! sending account, the height it pins against, and a nonce unique to that
//! account at that pin height. The chain keeps a short window of recently
//! used `TxId`s (the replay cache) to reject replays without needing
//! full history.

use crate::address::AccountId;
use crate::height::Height;
use crate::ser::{self, BinReader, BinWriter, Readable, Writeable};

/// Uniquely identifies a transaction for replay-protection purposes.
/// Distinct from any content hash of the transaction: two transactions
/// with the same `TxId` are the same transaction for pin/nonce purposes
/// even if fee or payload differ, and the second is rejected.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct TxId {
	/// The paying account.
	pub account_id: AccountId,
	/// The height this transaction pins against; it is valid only while
	/// the chain tip is within the pin window of this height.
	pub pin_height: Height,
	/// Disambiguates multiple transactions from the same account pinned
	/// at the same height.
	pub nonce_id: u32,
}

impl Writeable for TxId {
	fn write(&self, writer: &mut BinWriter) -> Result<(), ser::Error> {
		self.account_id.write(writer)?;
		writer.write_u32(self.pin_height)?;
		writer.write_u32(self.nonce_id)
	}
}

impl Readable for TxId {
	fn read(reader: &mut BinReader) -> Result<TxId, ser::Error> {
		let account_id = AccountId::read(reader)?;
		let pin_height = reader.read_u32()?;
		let nonce_id = reader.read_u32()?;
		Ok(TxId { account_id, pin_height, nonce_id })
	}
}

/// The recovered pin-window constant: a `TxId` pinned at height `h` is
/// valid for inclusion while the chain tip is in `[h, h + PIN_WINDOW)`.
/// Past that window, the pin height is considered stale and the
/// transaction is dropped from the mempool rather than replay-cached
/// (recovered from `original_source/src/node/state/helpers/consensus.cpp`).
pub const PIN_WINDOW: Height = 10_800; // roughly three days at 1 block/45s
