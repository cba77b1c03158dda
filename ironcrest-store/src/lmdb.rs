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

//! Generic LMDB key/value store. Every table the chain engine needs
//! (headers, bodies, undo logs, consensus, accounts, history, bad
//! blocks) is a named LMDB database sharing one environment, keyed by a
//! fixed-width prefix plus a big-endian integer so range scans (e.g.
//! "history before id N") iterate in key order without a secondary index.

use std::fs;
use std::marker;
use std::sync::Arc;

use lmdb_zero as lmdb;
use lmdb_zero::traits::CreateCursor;
use lmdb_zero::LmdbResultExt;

use ironcrest_core::ser;

/// Errors arising from the LMDB-backed store.
#[derive(Debug, Fail)]
pub enum Error {
	/// Couldn't find what we were looking for.
	#[fail(display = "store: not found: {}", _0)]
	NotFoundErr(String),
	/// Wraps an error returned by the LMDB bindings.
	#[fail(display = "store: lmdb error: {}", _0)]
	LmdbErr(String),
	/// Wraps a `ironcrest_core::ser` error.
	#[fail(display = "store: serialization error: {}", _0)]
	SerErr(String),
}

impl From<lmdb::error::Error> for Error {
	fn from(e: lmdb::error::Error) -> Error {
		Error::LmdbErr(e.to_string())
	}
}

impl From<ser::Error> for Error {
	fn from(e: ser::Error) -> Error {
		Error::SerErr(e.to_string())
	}
}

/// Turns a `Ok(None)` into a named-field not-found error.
pub fn option_to_not_found<T>(res: Result<Option<T>, Error>, field_name: &str) -> Result<T, Error> {
	match res {
		Ok(None) => Err(Error::NotFoundErr(field_name.to_owned())),
		Ok(Some(o)) => Ok(o),
		Err(e) => Err(e),
	}
}

/// Opens (creating if absent) the single LMDB environment all of this
/// crate's named databases live under.
pub fn new_env(path: &str) -> Arc<lmdb::Environment> {
	fs::create_dir_all(path).expect("failed to create chain db directory");
	unsafe {
		let mut builder = lmdb::EnvBuilder::new().expect("failed to build lmdb env builder");
		builder.set_maxdbs(16).expect("failed to set lmdb maxdbs");
		// 128GB ought to outlast any test network; production deployments
		// size this from config rather than hardcoding further.
		builder
			.set_mapsize(128 * 1024 * 1024 * 1024)
			.unwrap_or_else(|e| panic!("unable to reserve lmdb address space: {:?}", e));
		Arc::new(
			builder
				.open(path, lmdb::open::Flags::empty(), 0o600)
				.expect("failed to open lmdb environment"),
		)
	}
}

/// A single named table within the shared environment.
pub struct Store {
	env: Arc<lmdb::Environment>,
	db: Arc<lmdb::Database<'static>>,
}

impl Store {
	/// Opens (creating if absent) the named database under `env`.
	pub fn open(env: Arc<lmdb::Environment>, name: &str) -> Store {
		let db = Arc::new(
			lmdb::Database::open(env.clone(), Some(name), &lmdb::DatabaseOptions::new(lmdb::db::CREATE))
				.unwrap_or_else(|e| panic!("failed to open lmdb database {}: {:?}", name, e)),
		);
		Store { env, db }
	}

	/// Raw byte read.
	pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
		let txn = lmdb::ReadTransaction::new(self.env.clone())?;
		let access = txn.access();
		let res: lmdb::error::Result<&[u8]> = access.get(&self.db, key);
		res.map(|v| v.to_vec()).to_opt().map_err(From::from)
	}

	/// Reads and deserializes a `Readable` value.
	pub fn get_ser<T: ser::Readable>(&self, key: &[u8]) -> Result<Option<T>, Error> {
		let txn = lmdb::ReadTransaction::new(self.env.clone())?;
		let access = txn.access();
		self.get_ser_access(key, &access)
	}

	fn get_ser_access<T: ser::Readable>(
		&self,
		key: &[u8],
		access: &lmdb::ConstAccessor,
	) -> Result<Option<T>, Error> {
		let res: lmdb::error::Result<&[u8]> = access.get(&self.db, key);
		match res.to_opt()? {
			Some(mut bytes) => Ok(Some(ser::deserialize(&mut bytes)?)),
			None => Ok(None),
		}
	}

	/// Whether `key` is present.
	pub fn exists(&self, key: &[u8]) -> Result<bool, Error> {
		let txn = lmdb::ReadTransaction::new(self.env.clone())?;
		let access = txn.access();
		let res: lmdb::error::Result<&lmdb::Ignore> = access.get(&self.db, key);
		Ok(res.to_opt()?.is_some())
	}

	/// Iterates `Readable` values whose keys share `prefix`, in key order.
	pub fn iter<T: ser::Readable>(&self, prefix: &[u8]) -> Result<SerIterator<T>, Error> {
		let txn = Arc::new(lmdb::ReadTransaction::new(self.env.clone())?);
		let cursor = Arc::new(txn.cursor(self.db.clone())?);
		Ok(SerIterator {
			tx: txn,
			cursor,
			seek: false,
			prefix: prefix.to_vec(),
			_marker: marker::PhantomData,
		})
	}

	/// Collects the raw keys sharing `prefix`, in key order. Used for
	/// membership-only rows (e.g. the account-history index) where the
	/// information of interest is encoded in the key itself, not the value.
	pub fn keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>, Error> {
		let txn = lmdb::ReadTransaction::new(self.env.clone())?;
		let access = txn.access();
		let mut cursor = txn.cursor(self.db.clone())?;
		let mut out = Vec::new();
		let mut kv: lmdb::error::Result<(&[u8], &lmdb::Ignore)> = cursor.seek_range_k(&access, prefix);
		loop {
			match kv {
				Ok((k, _)) if k.len() >= prefix.len() && &k[..prefix.len()] == prefix => {
					out.push(k.to_vec());
					kv = cursor.next(&access);
				}
				_ => break,
			}
		}
		Ok(out)
	}

	/// Opens a write batch against this table.
	pub fn batch(&self) -> Result<Batch, Error> {
		let tx = lmdb::WriteTransaction::new(self.env.clone())?;
		Ok(Batch { store: self, tx })
	}
}

/// A single atomic write transaction against a [`Store`].
pub struct Batch<'a> {
	store: &'a Store,
	tx: lmdb::WriteTransaction<'a>,
}

impl<'a> Batch<'a> {
	/// Writes a raw key/value pair.
	pub fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), Error> {
		self.tx.access().put(&self.store.db, key, &value, lmdb::put::Flags::empty())?;
		Ok(())
	}

	/// Writes a `Writeable` value under `key`.
	pub fn put_ser<W: ser::Writeable>(&self, key: &[u8], value: &W) -> Result<(), Error> {
		self.put(key, ser::ser_vec(value)?)
	}

	/// Reads back a raw value, observing the batch's own uncommitted writes.
	pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
		let access = self.tx.access();
		let res: lmdb::error::Result<&[u8]> = access.get(&self.store.db, key);
		res.map(|v| v.to_vec()).to_opt().map_err(From::from)
	}

	/// Reads back a `Readable` value, observing the batch's own uncommitted writes.
	pub fn get_ser<T: ser::Readable>(&self, key: &[u8]) -> Result<Option<T>, Error> {
		let access = self.tx.access();
		self.store.get_ser_access(key, &access)
	}

	/// Whether `key` exists, observing the batch's own uncommitted writes.
	pub fn exists(&self, key: &[u8]) -> Result<bool, Error> {
		let access = self.tx.access();
		let res: lmdb::error::Result<&lmdb::Ignore> = access.get(&self.store.db, key);
		Ok(res.to_opt()?.is_some())
	}

	/// Deletes a key, no-op if absent.
	pub fn delete(&self, key: &[u8]) -> Result<(), Error> {
		match self.tx.access().del_key(&self.store.db, key) {
			Ok(()) => Ok(()),
			Err(lmdb::Error::Code(code)) if code == lmdb::error::NOTFOUND => Ok(()),
			Err(e) => Err(e.into()),
		}
	}

	/// Commits every write made through this batch atomically. On any
	/// error the whole batch is discarded.
	pub fn commit(self) -> Result<(), Error> {
		self.tx.commit()?;
		Ok(())
	}
}

/// Forward iterator over `Readable` values sharing a key prefix.
pub struct SerIterator<T: ser::Readable> {
	tx: Arc<lmdb::ReadTransaction<'static>>,
	cursor: Arc<lmdb::Cursor<'static, 'static>>,
	seek: bool,
	prefix: Vec<u8>,
	_marker: marker::PhantomData<T>,
}

impl<T: ser::Readable> Iterator for SerIterator<T> {
	type Item = T;

	fn next(&mut self) -> Option<T> {
		let access = self.tx.access();
		let kv = if self.seek {
			Arc::get_mut(&mut self.cursor).unwrap().next(&access)
		} else {
			self.seek = true;
			Arc::get_mut(&mut self.cursor).unwrap().seek_range_k(&access, &self.prefix[..])
		};
		self.deser_if_prefix_match(kv)
	}
}

impl<T: ser::Readable> SerIterator<T> {
	fn deser_if_prefix_match(&self, kv: Result<(&[u8], &[u8]), lmdb::Error>) -> Option<T> {
		match kv {
			Ok((k, v)) => {
				let plen = self.prefix.len();
				if plen == 0 || k.len() >= plen && k[0..plen] == self.prefix[..] {
					ser::deserialize(&mut &v[..]).ok()
				} else {
					None
				}
			}
			Err(_) => None,
		}
	}
}
