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

//! Configuration file management: loading a [`NodeConfig`] from TOML,
//! writing out defaults, and translating a loaded config into the
//! [`ironcrest_servers::ServerParams`] the node is actually wired from.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::types::NodeConfig;

/// Default config file name, looked for first in the current directory
/// and then under the user's home directory.
pub const CONFIG_FILE_NAME: &str = "ironcrest.toml";

/// `~/.ironcrest`, used when no config file is found in the current
/// directory.
pub fn default_data_dir() -> PathBuf {
	dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".ironcrest")
}

impl NodeConfig {
	/// Parses a `NodeConfig` from the TOML file at `path`.
	pub fn from_file(path: &Path) -> Result<NodeConfig, ConfigError> {
		let contents = fs::read_to_string(path)
			.map_err(|e| ConfigError::FileIOError(path.display().to_string(), e.to_string()))?;
		toml::from_str(&contents).map_err(|e| ConfigError::ParseError(path.display().to_string(), e.to_string()))
	}

	/// Looks for `ironcrest.toml` in the current directory, then under
	/// [`default_data_dir`]; falls back to built-in defaults if neither
	/// exists.
	pub fn from_file_or_default() -> Result<NodeConfig, ConfigError> {
		let cwd_candidate = PathBuf::from(CONFIG_FILE_NAME);
		if cwd_candidate.exists() {
			return NodeConfig::from_file(&cwd_candidate);
		}
		let data_dir_candidate = default_data_dir().join(CONFIG_FILE_NAME);
		if data_dir_candidate.exists() {
			return NodeConfig::from_file(&data_dir_candidate);
		}
		Ok(NodeConfig::default())
	}

	/// Serializes this config to TOML and writes it to `path`, failing
	/// if a file already exists there.
	pub fn write_to_file(&self, path: &Path) -> Result<(), ConfigError> {
		if path.exists() {
			return Err(ConfigError::FileIOError(
				path.display().to_string(),
				"refusing to overwrite an existing config file".to_owned(),
			));
		}
		let rendered = toml::to_string_pretty(self)
			.map_err(|e| ConfigError::ParseError(path.display().to_string(), e.to_string()))?;
		fs::write(path, rendered).map_err(|e| ConfigError::FileIOError(path.display().to_string(), e.to_string()))
	}

	/// Translates this config into the parameters `ironcrest_servers::start`
	/// wires the node's actors from, resolving `leaderPrivateKey` to the
	/// address it signs under.
	pub fn into_server_params(self) -> Result<ironcrest_servers::ServerParams, ConfigError> {
		let leader_address = match &self.leader_private_key {
			Some(hex) => {
				Some(ironcrest_servers::crypto::leader_address(hex).map_err(|e| ConfigError::BadLeaderKey(e.to_string()))?)
			}
			None => None,
		};
		Ok(ironcrest_servers::ServerParams {
			chain_db_path: self.chain_db_path,
			peers_db_path: Some(self.peers_db_path),
			bind: Some(self.bind.to_socket_addr()),
			connect: self.connect,
			enable_ban: self.enable_ban,
			leader_address,
			isolated: self.isolated,
			testnet: self.testnet,
		})
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn defaults_round_trip_through_toml() {
		let config = NodeConfig::default();
		let rendered = toml::to_string_pretty(&config).unwrap();
		let parsed: NodeConfig = toml::from_str(&rendered).unwrap();
		assert_eq!(parsed.chain_db_path, config.chain_db_path);
		assert_eq!(parsed.bind, config.bind);
		assert!(!parsed.isolated);
	}

	#[test]
	fn from_file_or_default_falls_back_with_no_files_present() {
		let dir = tempfile::tempdir().unwrap();
		std::env::set_current_dir(dir.path()).unwrap();
		let config = NodeConfig::from_file_or_default().unwrap();
		assert_eq!(config.chain_db_path, NodeConfig::default().chain_db_path);
	}
}
