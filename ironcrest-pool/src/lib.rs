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

//! The mempool : admission, fee-ordered retrieval for
//! mining templates, pruning past the replay window, and re-entry on
//! rollback. Has no knowledge of storage; the chain engine owns one
//! `TransactionPool` instance and drives it through [`types::ChainView`].

#[macro_use]
extern crate failure_derive;

pub mod error;
pub mod pool;
pub mod types;

pub use crate::error::PoolError;
pub use crate::pool::{replay_window, signing_message, TransactionPool};
pub use crate::types::{ChainView, TxSource};
