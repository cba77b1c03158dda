// Copyright 2018 The Grin Developers
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

//! `ChainEngine` error definitions. Every invariant-violation from a
//! peer-originated block is carried as a `ChainError{code, height}`;
//! `height` is attached on the way up rather than threaded through every
//! call.

use std::fmt::{self, Display};

use failure::{Backtrace, Context, Fail};

use ironcrest_core::height::Height;
use ironcrest_pool::PoolError;

/// Top-level chain error, carrying a backtrace via `failure::Context`.
#[derive(Debug, Fail)]
pub struct Error {
	inner: Context<ErrorKind>,
}

/// The flat set of ways a chain mutation can fail.
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum ErrorKind {
	/// `append_mined`/`stage_add`: block height isn't `consensus.length + 1`.
	#[fail(display = "wrong height")]
	WrongHeight,
	/// Header's proof-of-work hash doesn't satisfy its own target.
	#[fail(display = "bad proof of work")]
	BadPow,
	/// Body's computed Merkle root doesn't match the header's commitment.
	#[fail(display = "bad merkle root")]
	BadMerkle,
	/// Body fails validation independent of Merkle/PoW (malformed address
	/// table, malformed reward, etc).
	#[fail(display = "bad body: {}", _0)]
	BadBody(String),
	/// Timestamp fails the median-of-11 or future-drift rule.
	#[fail(display = "bad timestamp")]
	BadTimestamp,
	/// A `TxId` in the block is already present in the replay cache.
	#[fail(display = "duplicate tx id")]
	DuplicateTxId,
	/// A transfer spends more than the sender's balance covers.
	#[fail(display = "insufficient balance")]
	InsufficientBalance,
	/// `set_signed_snapshot`: new snapshot isn't higher-priority than current.
	#[fail(display = "snapshot priority too low")]
	LowPriority,
	/// `append_mined`/`apply_stage`: a block conflicts with an acknowledged
	/// signed snapshot at or below its height.
	#[fail(display = "conflicts with signed snapshot")]
	LeaderMismatch,
	/// Signature on the snapshot does not recover to the configured signer.
	#[fail(display = "bad snapshot signature")]
	BadLeaderSignature,
	/// Mempool admission failed; wraps the pool's own reason.
	#[fail(display = "mempool: {}", _0)]
	Pool(PoolError),
	/// The requested height/hash/account isn't known to this chain.
	#[fail(display = "not found")]
	NotFound,
	/// The underlying store reported an I/O or corruption error; treated
	/// as fatal to the whole engine rather than to just one block.
	#[fail(display = "store error: {}", _0)]
	StoreErr(String),
}

impl Fail for ErrorKind {
	fn cause(&self) -> Option<&dyn Fail> {
		None
	}
	fn backtrace(&self) -> Option<&Backtrace> {
		None
	}
}

impl Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		Display::fmt(&self.inner, f)
	}
}

impl Error {
	/// The error classification, without the backtrace.
	pub fn kind(&self) -> ErrorKind {
		self.inner.get_context().clone()
	}

	/// Whether this error, if it originated in a peer-supplied block,
	/// should be treated as fatal to that specific block (i.e. every
	/// `ErrorKind` here except `StoreErr`, which is fatal to the whole
	/// engine).
	pub fn is_block_fatal_only(&self) -> bool {
		!matches!(self.kind(), ErrorKind::StoreErr(_))
	}
}

impl From<ErrorKind> for Error {
	fn from(kind: ErrorKind) -> Error {
		Error { inner: Context::new(kind) }
	}
}

impl From<Context<ErrorKind>> for Error {
	fn from(inner: Context<ErrorKind>) -> Error {
		Error { inner }
	}
}

impl From<PoolError> for Error {
	fn from(e: PoolError) -> Error {
		ErrorKind::Pool(e).into()
	}
}

impl From<ironcrest_store::Error> for Error {
	fn from(e: ironcrest_store::Error) -> Error {
		ErrorKind::StoreErr(e.to_string()).into()
	}
}

/// A chain error tagged with the height it occurred at.
#[derive(Debug)]
pub struct ChainError {
	/// The underlying classification.
	pub error: Error,
	/// The height the error was discovered at.
	pub height: Height,
}

impl fmt::Display for ChainError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "chain error at height {}: {}", self.height, self.error)
	}
}
