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

//! Configuration-loading errors: a plain enum rather than the
//! `failure::Context` pattern the chain/API crates use, since there is
//! nothing here worth a typed cause chain.

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum ConfigError {
	/// The config file's TOML couldn't be parsed.
	ParseError(String, String),
	/// The config file couldn't be read or written.
	FileIOError(String, String),
	/// No file exists at the given path.
	FileNotFoundError(String),
	/// The `leaderPrivateKey` entry wasn't valid hex, or didn't decode
	/// to a secp256k1 secret key.
	BadLeaderKey(String),
}

impl fmt::Display for ConfigError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
 match self {
 ConfigError::ParseError(file, msg) => write!(f, "error parsing {}: {}", file, msg),
 ConfigError::FileIOError(file, msg) => write!(f, "{}: {}", file, msg),
 ConfigError::FileNotFoundError(file) => write!(f, "config file not found: {}", file),
 ConfigError::BadLeaderKey(msg) => write!(f, "invalid leaderPrivateKey: {}", msg),
 }
	}
}

impl std::error::Error for ConfigError {}

impl From<io::Error> for ConfigError {
	fn from(e: io::Error) -> ConfigError {
		ConfigError::FileIOError(String::new(), e.to_string())
	}
}
