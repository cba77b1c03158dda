// Copyright 2020 The Grin Developers
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

//! Errors a [`crate::ChainApi`] method can return. This crate never
//! talks HTTP, so there is no status-code mapping here, only the
//! classification an external router would map from.

use std::fmt::{self, Display};

use failure::{Backtrace, Context, Fail};

use ironcrest_chain::{ChainError, Error as EngineError};
use ironcrest_pool::PoolError;

#[derive(Debug)]
pub struct Error {
	inner: Context<ErrorKind>,
}

#[derive(Clone, Eq, PartialEq, Debug, Fail, Serialize, Deserialize)]
pub enum ErrorKind {
	/// The requested height, hash, account, or connection id is unknown.
	#[fail(display = "not found")]
	NotFound,
	/// `submit_block`/`put_mempool` rejected by the chain engine.
	#[fail(display = "chain rejected request: {}", _0)]
	Chain(String),
	/// `put_mempool` rejected by pool admission rules.
	#[fail(display = "mempool rejected transaction: {}", _0)]
	Pool(String),
	/// Caller-supplied argument couldn't be resolved (e.g. neither height
	/// nor hash given to `get_header`).
	#[fail(display = "bad argument: {}", _0)]
	Argument(String),
}

impl Fail for Error {
	fn cause(&self) -> Option<&dyn Fail> {
		self.inner.cause()
	}
	fn backtrace(&self) -> Option<&Backtrace> {
		self.inner.backtrace()
	}
}

impl Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		Display::fmt(&self.inner, f)
	}
}

impl Error {
	pub fn kind(&self) -> &ErrorKind {
		self.inner.get_context()
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

impl From<EngineError> for Error {
	fn from(e: EngineError) -> Error {
		match e.kind() {
			ironcrest_chain::ErrorKind::NotFound => ErrorKind::NotFound.into(),
			other => ErrorKind::Chain(other.to_string()).into(),
		}
	}
}

impl From<ChainError> for Error {
	fn from(e: ChainError) -> Error {
		ErrorKind::Chain(format!("height {}: {}", e.height, e.error)).into()
	}
}

impl From<PoolError> for Error {
	fn from(e: PoolError) -> Error {
		ErrorKind::Pool(e.to_string()).into()
	}
}
