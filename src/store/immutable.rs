// Copyright 2023 Strixpyrr
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The read-only store: populated by whole-segment file transfer rather
//! than by `append`, used on the receiving end of a replication stream.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::segment::SegmentFile;
use crate::store::{Core, Stats};
use crate::Position;

/// A read-only, position-addressed journal store, built by installing
/// whole segment files rather than by appending bytes directly. Every
/// segment it holds is durable by construction, so `flushed()` always
/// equals `max()`.
pub struct ImmutableStore {
	core: Core,
}

impl ImmutableStore {
	/// Opens `base`, recovering any segments already present, creating the
	/// directory if it doesn't exist.
	pub fn recover(base: impl Into<PathBuf>, min_hint: Position, config: Config) -> Result<Self> {
		let core = Core::recover(base, min_hint, config)?;
		Ok(Self { core })
	}

	/// Installs `src`, a whole segment file produced elsewhere, as the new
	/// tail segment. `src`'s file name must be the decimal encoding of the
	/// store's current `max()` (or the store must be empty with `max() ==
	/// 0`), matching the naming contract every segment file follows.
	pub fn append_file(&self, src: impl AsRef<Path>) -> Result<Position> {
		let src = src.as_ref();
		let max = self.core.max();
		let name = src
			.file_name()
			.and_then(|n| n.to_str())
			.ok_or_else(|| Error::illegal(format!("segment file {} has no valid name", src.display())))?;
		let claimed: Position = name.parse().map_err(|_| {
			Error::illegal(format!("segment file name {name:?} is not a valid position"))
		})?;
		if claimed != max {
			return Err(Error::illegal(format!(
				"segment file {name} does not continue the store at {max}"
			)));
		}

		let header_size = self.core.config().file_header_size;
		let data_size = self.core.config().file_data_size;
		let on_disk_len = std::fs::metadata(src)
			.map_err(|e| Error::io(src, e))?
			.len();
		self.core.check_free_space(on_disk_len)?;

		let dest = self.core.segment_path(claimed);
		if std::fs::rename(src, &dest).is_err() {
			std::fs::copy(src, &dest).map_err(|e| Error::io(&dest, e))?;
			std::fs::remove_file(src).map_err(|e| Error::io(src, e))?;
		}

		let content_len = (on_disk_len as usize).saturating_sub(header_size);
		let segment = SegmentFile::open_existing(
			dest,
			claimed,
			header_size,
			data_size,
			content_len,
			true,
			self.core.cache().clone(),
		)?;
		let written = segment.write_pos() as Position;
		self.core.segments().write().insert(claimed, Arc::new(segment));

		let new_max = claimed + written;
		self.core.set_max(new_max);
		self.core.set_flushed(new_max);
		debug!(start = claimed, new_max, "segment file installed");
		Ok(new_max)
	}

	/// Always fails: an immutable store accepts new data only through
	/// [`append_file`](Self::append_file).
	pub fn append(&self, _bytes: &[u8]) -> Result<Position> {
		Err(Error::Unsupported { operation: "append" })
	}

	/// Always fails: an immutable store accepts new data only through
	/// [`append_file`](Self::append_file).
	pub fn append_vectored(&self, _parts: &[&[u8]]) -> Result<Position> {
		Err(Error::Unsupported { operation: "append" })
	}

	/// Reads `length` bytes starting at `position`.
	pub fn read(&self, position: Position, length: usize) -> Result<Vec<u8>> {
		self.core.read(position, length)
	}

	/// Reads an 8-byte big-endian integer at `position`.
	pub fn read_long(&self, position: Position) -> Result<i64> {
		self.core.read_long(position)
	}

	/// Always a no-op success: every installed segment is already durable.
	pub fn flush(&self) -> Result<()> {
		Ok(())
	}

	/// Always fails: an immutable store has no write tail to roll back.
	pub fn truncate(&self, _given_max: Position) -> Result<()> {
		Err(Error::Unsupported { operation: "truncate" })
	}

	/// Discards whole segments entirely below `given_min`. Returns the
	/// number of bytes deleted.
	pub fn compact(&self, given_min: Position) -> Result<u64> {
		self.core.compact(given_min)
	}

	pub fn min(&self) -> Position { self.core.min() }
	pub fn physical_min(&self) -> Position { self.core.physical_min() }
	pub fn max(&self) -> Position { self.core.max() }
	/// Always equal to `max()`: every segment an immutable store holds
	/// arrived already durable on disk.
	pub fn flushed(&self) -> Position { self.core.max() }
	pub fn segment_count(&self) -> usize { self.core.segment_count() }
	pub fn is_empty(&self) -> bool { self.core.is_empty() }
	pub fn get_free_space(&self) -> Result<u64> { self.core.get_free_space() }
	pub fn get_total_space(&self) -> Result<u64> { self.core.get_total_space() }

	pub fn stats(&self) -> Stats {
		Stats { writable: false, flushed: self.core.max(), ..self.core.stats() }
	}

	/// Force-unloads and removes every segment, then deletes the directory.
	pub fn delete(&self) -> Result<()> {
		self.core.delete()
	}

	/// Force-unloads every segment and deregisters this store's preload
	/// class with the buffer cache. Nothing is dirty, so there is nothing
	/// to flush first.
	pub fn close(&self) -> Result<()> {
		self.core.close()
	}
}
