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

//! Chain height ("Height: 32-bit unsigned integer.
//! `NonzeroHeight` is the subtype with `value >= 1`").

use std::fmt;

/// A chain height, including the genesis height 0.
pub type Height = u32;

/// A height known to be at least 1 (i.e. not the genesis height), the
/// subtype most chain operations actually work with since height 0 never
/// has a stored block.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct NonzeroHeight(Height);

impl NonzeroHeight {
	/// Wraps `h`, returning `None` if `h == 0`.
	pub fn new(h: Height) -> Option<NonzeroHeight> {
 if h == 0 {
 None
 } else {
 Some(NonzeroHeight(h))
 }
	}

	/// Same as [`NonzeroHeight::new`] but panics on 0. Used where the
	/// caller has already established `h >= 1` (e.g. "the height after
	/// genesis").
	pub fn new_assert(h: Height) -> NonzeroHeight {
 Self::new(h).expect("height must be nonzero")
	}

	/// The underlying height.
	pub fn value(self) -> Height {
 self.0
	}

	/// The previous height, which may be the genesis height 0.
	pub fn prev(self) -> Height {
 self.0 - 1
	}
}

impl fmt::Display for NonzeroHeight {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
 write!(f, "{}", self.0)
	}
}

impl From<NonzeroHeight> for Height {
	fn from(h: NonzeroHeight) -> Height {
 h.0
	}
}
