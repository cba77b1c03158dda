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

//! The recognized configuration surface, one struct mirroring a habit of
//! flattening a nested TOML file into a single
//! `#[derive(Serialize, Deserialize)]` struct with per-field defaults
//! rather than a separate "members" layer (there is only one node type
//! here, unlike a server/mining/wallet split).

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// `{ ip, port }`, the shape every bind address takes.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BindAddr {
	pub ip: IpAddr,
	pub port: u16,
}

impl BindAddr {
	pub fn to_socket_addr(&self) -> SocketAddr {
		SocketAddr::new(self.ip, self.port)
	}
}

fn default_bind() -> BindAddr {
	BindAddr { ip: "0.0.0.0".parse().unwrap(), port: 3414 }
}

fn default_rpc_bind() -> BindAddr {
	BindAddr { ip: "127.0.0.1".parse().unwrap(), port: 3415 }
}

fn default_chain_db_path() -> PathBuf {
	PathBuf::from("chain_data")
}

fn default_peers_db_path() -> PathBuf {
	PathBuf::from("peers.json")
}

/// Recognized options: `{ chainDbPath, peersDbPath, bind,
/// rpcBind, connect, enableBan, allowLocalhost, leaderPrivateKey,
/// isolated, testnet, stratumBind, publicRpcBind }`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
	#[serde(default = "default_chain_db_path")]
	pub chain_db_path: PathBuf,
	#[serde(default = "default_peers_db_path")]
	pub peers_db_path: PathBuf,
	#[serde(default = "default_bind")]
	pub bind: BindAddr,
	#[serde(default = "default_rpc_bind")]
	pub rpc_bind: BindAddr,
	#[serde(default)]
	pub connect: Vec<SocketAddr>,
	#[serde(default = "default_true")]
	pub enable_ban: bool,
	#[serde(default)]
	pub allow_localhost: bool,
	#[serde(default)]
	pub leader_private_key: Option<String>,
	#[serde(default)]
	pub isolated: bool,
	#[serde(default)]
	pub testnet: bool,
	#[serde(default)]
	pub stratum_bind: Option<BindAddr>,
	#[serde(default)]
	pub public_rpc_bind: Option<BindAddr>,
	/// Logging section, carried the way every other ambient concern in
	/// this workspace is: a feature non-goal never drops the ambient stack.
	#[serde(default)]
	pub logging: ironcrest_util::LoggingConfig,
}

fn default_true() -> bool {
	true
}

impl Default for NodeConfig {
	fn default() -> NodeConfig {
		NodeConfig {
			chain_db_path: default_chain_db_path(),
			peers_db_path: default_peers_db_path(),
			bind: default_bind(),
			rpc_bind: default_rpc_bind(),
			connect: Vec::new(),
			enable_ban: true,
			allow_localhost: false,
			leader_private_key: None,
			isolated: false,
			testnet: false,
			stratum_bind: None,
			public_rpc_bind: None,
			logging: ironcrest_util::LoggingConfig::default(),
		}
	}
}
