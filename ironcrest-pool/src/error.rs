// Copyright 2017 The Grin Developers
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

//! Mempool admission errors (`put_mempool`).

/// Reasons `put_mempool` rejects a transaction.
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum PoolError {
	/// `pinHeight` lies outside the current replay window.
	#[fail(display = "pin height {} outside replay window", _0)]
	PinHeightOutOfRange(u32),
	/// The header hash at `pinHeight` doesn't match what the transaction committed to.
	#[fail(display = "pin hash mismatch at height {}", _0)]
	BadPinHash(u32),
	/// The signature doesn't recover to the claimed sending account's address.
	#[fail(display = "signature does not recover to sender's address")]
	BadSignature,
	/// A transaction with this `(account, nonce, pinHeight)` is already known
	/// (either already in the pool, or already applied and replay-cached).
	#[fail(display = "nonce already used")]
	NonceAlreadyUsed,
	/// The sending account's balance is insufficient for `amount + fee`.
	#[fail(display = "insufficient funds: need {}, have {}", needed, available)]
	InsufficientFunds {
 /// Amount plus fee required.
 needed: u64,
 /// Balance actually available.
 available: u64,
	},
}
