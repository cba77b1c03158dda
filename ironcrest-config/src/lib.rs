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

//! Crate wrapping up the ironcrest node's configuration file. Reads and
//! writes TOML; never touches an actor handle itself, instead
//! translating into [`ironcrest_servers::ServerParams`] for
//! `ironcrest_servers::start` to consume.

#[macro_use]
extern crate serde_derive;

pub mod config;
pub mod error;
pub mod types;

pub use crate::config::{default_data_dir, CONFIG_FILE_NAME};
pub use crate::error::ConfigError;
pub use crate::types::{BindAddr, NodeConfig};
