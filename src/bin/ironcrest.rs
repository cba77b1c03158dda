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

//! Main entry point for the ironcrest binary.

use std::path::PathBuf;
use std::process::exit;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{load_yaml, App, ArgMatches};

use ironcrest_config::NodeConfig;

/// Build-time version/dependency info, embedded by `src/build/build.rs`.
pub mod built_info {
	include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

fn load_config(args: &ArgMatches) -> NodeConfig {
	let loaded = match args.value_of("config_file") {
		Some(path) => NodeConfig::from_file(&PathBuf::from(path)),
		None => NodeConfig::from_file_or_default(),
	};
	loaded.unwrap_or_else(|e| {
		eprintln!("Error loading config: {}", e);
		exit(1);
	})
}

fn config_command(file_name: &str) {
	let config = NodeConfig::default();
	let path = PathBuf::from(file_name);
	config.write_to_file(&path).unwrap_or_else(|e| {
		eprintln!("Error writing config file: {}", e);
		exit(1);
	});
	println!("{} written to the current directory", file_name);
}

fn server_command(mut config: NodeConfig, testnet: bool) -> i32 {
	if testnet {
		config.testnet = true;
	}
	ironcrest_util::init_logger(Some(config.logging.clone()));
	log::info!("Starting ironcrest {}", built_info::PKG_VERSION);

	let runtime = tokio::runtime::Runtime::new().expect("failed to start the Tokio runtime");
	let result = runtime.block_on(async {
		let params = config.into_server_params().unwrap_or_else(|e| {
			log::error!("Invalid configuration: {}", e);
			exit(1);
		});
		let mut env = ironcrest_servers::start(params)?;

		let running = Arc::new(AtomicBool::new(true));
		let r = running.clone();
		ctrlc::set_handler(move || {
			r.store(false, Ordering::SeqCst);
		})
		.expect("Error setting handler for SIGINT/SIGTERM");

		while running.load(Ordering::SeqCst) {
			if env.join_handles.iter().any(|h| h.is_finished()) {
				log::error!("An actor task exited unexpectedly, shutting down");
				break;
			}
			tokio::time::sleep(Duration::from_secs(1)).await;
		}
		log::warn!("Received shutdown signal, stopping");
		Ok::<(), ironcrest_servers::Error>(())
	});

	if let Err(e) = result {
		log::error!("Server error: {}", e);
		return 1;
	}
	0
}

fn main() {
	let yml = load_yaml!("ironcrest.yml");
	let args = App::from_yaml(yml).get_matches();

	match args.subcommand() {
		("config", Some(sub)) => {
			config_command(sub.value_of("file_name").unwrap_or("ironcrest.toml"));
		}
		("server", Some(_)) | (_, None) => {
			let config = load_config(&args);
			let testnet = args.is_present("testnet");
			exit(server_command(config, testnet));
		}
		(cmd, _) => {
			eprintln!("Unknown subcommand: {}", cmd);
			exit(1);
		}
	}
}
