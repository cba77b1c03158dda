//! Logging, hashing helpers, and low-level utilities shared across the
//! ironcrest workspace.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate serde_derive;

pub mod hash;
pub mod logger;
pub mod rate_counter;
pub mod types;

pub use crate::logger::init_logger;
pub use crate::rate_counter::RateCounter;
pub use crate::types::LoggingConfig;

pub use parking_lot::{Mutex, RwLock};

/// Hex-encodes a byte slice.
pub fn to_hex(bytes: &[u8]) -> String {
	hex::encode(bytes)
}

/// Decodes a hex string into bytes.
pub fn from_hex(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
	hex::decode(s)
}
