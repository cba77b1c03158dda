//! Logging wrapper to be used throughout all crates in the workspace.
//!
//! Mirrors a `log4rs`-backed setup: a console appender and an optional
//! rolling file appender, both filtered by independently configurable
//! levels.

use std::panic;

use backtrace::Backtrace;
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::types::{LogLevel, LoggingConfig};
use parking_lot::Mutex;

fn convert_log_level(level: &LogLevel) -> LevelFilter {
	match *level {
		LogLevel::Error => LevelFilter::Error,
		LogLevel::Warning => LevelFilter::Warn,
		LogLevel::Info => LevelFilter::Info,
		LogLevel::Debug => LevelFilter::Debug,
		LogLevel::Trace => LevelFilter::Trace,
	}
}

const LOGGING_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} {h({l})} {M} - {m}{n}";

lazy_static! {
	static ref WAS_INIT: Mutex<bool> = Mutex::new(false);
}

/// Initializes the global logger from a `LoggingConfig`. Safe to call more
/// than once; subsequent calls are no-ops.
pub fn init_logger(config: Option<LoggingConfig>) {
	let mut was_init = WAS_INIT.lock();
	if *was_init {
		return;
	}
	let config = config.unwrap_or_default();

	let mut root_builder = Root::builder();
	let mut config_builder = Config::builder();

	if config.log_to_stdout {
		let stdout = ConsoleAppender::builder().encoder(Box::new(PatternEncoder::new(LOGGING_PATTERN))).build();
		config_builder = config_builder.appender(Appender::builder().build("stdout", Box::new(stdout)));
		root_builder = root_builder.appender("stdout");
	}

	if config.log_to_file {
		let log_path = config.log_file_path.clone();
		let encoder = Box::new(PatternEncoder::new(LOGGING_PATTERN));
		let appender: Box<dyn log4rs::append::Append> = if let Some(max_size) = config.log_max_size {
			let trigger = Box::new(SizeTrigger::new(max_size));
			let roller = Box::new(
				FixedWindowRoller::builder()
					.build(&format!("{}.{{}}.gz", log_path), 10)
					.expect("failed to build rolling file roller"),
			);
			let policy = Box::new(CompoundPolicy::new(trigger, roller));
			Box::new(
				RollingFileAppender::builder()
					.encoder(encoder)
					.append(config.log_file_append)
					.build(&log_path, policy)
					.expect("failed to build rolling file appender"),
			)
		} else {
			Box::new(
				FileAppender::builder()
					.encoder(encoder)
					.append(config.log_file_append)
					.build(&log_path)
					.expect("failed to build file appender"),
			)
		};
		config_builder = config_builder.appender(Appender::builder().build("file", appender));
		root_builder = root_builder.appender("file");
	}

	let max_level = convert_log_level(&config.stdout_log_level).max(convert_log_level(&config.file_log_level));
	let log_config = config_builder.build(root_builder.build(max_level)).expect("failed to assemble log4rs config");

	log4rs::init_config(log_config).expect("failed to install global logger");
	*was_init = true;

	panic::set_hook(Box::new(|info| {
		let backtrace = Backtrace::new();
		log::error!("thread panicked: {}\n{:?}", info, backtrace);
	}));
}

/// Initializes a stdout-only logger at debug level, for use in tests.
pub fn init_test_logger() {
	init_logger(Some(LoggingConfig {
		log_to_stdout: true,
		stdout_log_level: LogLevel::Debug,
		log_to_file: false,
		..LoggingConfig::default()
	}));
}
