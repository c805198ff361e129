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

//! The writable, primary store: the workhorse journal that accepts
//! `append`, `flush`, `truncate` and `compact`.

use std::path::PathBuf;
use std::sync::Arc;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::segment::SegmentFile;
use crate::store::{Core, Stats};
use crate::Position;

/// A writable, position-addressed journal store.
///
/// Designed for one writer thread calling [`append`](Self::append),
/// [`truncate`](Self::truncate) and [`compact`](Self::compact), one flusher
/// thread calling [`flush`](Self::flush), and any number of concurrent
/// readers. `append` is never safe to call concurrently with `truncate`;
/// the embedding layer must guarantee that itself.
pub struct LocalStore {
	core: Core,
	write_tail: Mutex<Option<Arc<SegmentFile>>>,
	backpressure_lock: Mutex<()>,
	flush_cond: Condvar,
}

impl LocalStore {
	/// Opens `base`, recovering any segments already present, creating the
	/// directory if it doesn't exist. `min_hint` drops segments entirely
	/// below it from consideration (see `spec.md`'s `recover`).
	pub fn recover(base: impl Into<PathBuf>, min_hint: Position, config: Config) -> Result<Self> {
		let core = Core::recover(base, min_hint, config)?;
		let write_tail = core
			.segments()
			.read()
			.values()
			.next_back()
			.filter(|segment| !segment.write_closed())
			.cloned();
		Ok(Self {
			core,
			write_tail: Mutex::new(write_tail),
			backpressure_lock: Mutex::new(()),
			flush_cond: Condvar::new(),
		})
	}

	/// Appends `bytes`, creating a new tail segment first if the current
	/// one lacks room. Returns the new `max`.
	pub fn append(&self, bytes: &[u8]) -> Result<Position> {
		self.append_vectored(&[bytes])
	}

	/// Vectored append: the concatenation of `parts` is treated as one
	/// record and must fit within a single segment's `data_size`.
	pub fn append_vectored(&self, parts: &[&[u8]]) -> Result<Position> {
		let len: usize = parts.iter().map(|p| p.len()).sum();
		let data_size = self.core.config().file_data_size;
		if len > data_size {
			return Err(Error::TooManyBytes { len, data_size });
		}

		self.wait_for_backpressure();

		let mut tail_guard = self.write_tail.lock();
		let need_new_tail = match tail_guard.as_deref() {
			Some(tail) => tail.remaining() < len,
			None => true,
		};
		if need_new_tail {
			// A new segment always starts at the *full* boundary of the
			// previous tail, not at its partial write position: the
			// unused remainder becomes accepted padding, per I1.
			let start = match tail_guard.take() {
				Some(old_tail) => {
					old_tail.close_write();
					old_tail.start() + old_tail.data_size() as Position
				}
				None => self.core.max(),
			};
			let header_size = self.core.config().file_header_size;
			self.core.check_free_space((header_size + data_size) as u64)?;
			let path = self.core.segment_path(start);
			let segment = Arc::new(SegmentFile::create(
				path,
				start,
				header_size,
				data_size,
				self.core.cache().clone(),
			)?);
			self.core.segments().write().insert(start, segment.clone());
			if start > self.core.max() {
				self.core.set_max(start);
			}
			debug!(start, "new tail segment created");
			*tail_guard = Some(segment);
		}

		let tail = tail_guard.as_ref().expect("tail just ensured");
		tail.append_vectored(parts)?;
		let new_max = tail.start() + tail.write_pos() as Position;
		self.core.set_max(new_max);
		Ok(new_max)
	}

	/// Reads `length` bytes starting at `position`.
	pub fn read(&self, position: Position, length: usize) -> Result<Vec<u8>> {
		self.core.read(position, length)
	}

	/// Reads an 8-byte big-endian integer at `position`.
	pub fn read_long(&self, position: Position) -> Result<i64> {
		self.core.read_long(position)
	}

	/// Writes dirty bytes of every segment from the one containing
	/// `flushed()` forward, `fsync`ing a segment's predecessor the first
	/// time that segment is ever written to, per the ordering contract in
	/// `spec.md` §4.3. Idempotent when there's nothing dirty.
	pub fn flush(&self) -> Result<()> {
		let floor = self.core.flushed();
		let (predecessor, snapshot) = {
			let segments = self.core.segments().read();
			let start_key = segments
				.range(..=floor)
				.next_back()
				.map(|(&k, _)| k)
				.unwrap_or(floor);
			// The segment immediately before `start_key`, looked up
			// independently of the snapshot below: when `flushed` sits
			// exactly on a segment boundary, `start_key` is the *next*
			// segment and its true predecessor would otherwise never be
			// seen by this flush call, silently skipping its `force()`.
			let predecessor = segments
				.range(..start_key)
				.next_back()
				.map(|(_, v)| v.clone());
			let snapshot: Vec<(Position, Arc<SegmentFile>)> = segments
				.range(start_key..)
				.map(|(&k, v)| (k, v.clone()))
				.collect();
			(predecessor, snapshot)
		};

		let mut prev = predecessor;
		for (start, segment) in snapshot {
			if !self.core.segments().read().contains_key(&start) {
				break;
			}
			if !segment.is_clean() {
				if segment.flush_pos() == 0 {
					if let Some(prev) = &prev {
						prev.force()?;
					}
				}
				segment.flush()?;
			}
			let watermark = start + segment.flush_pos() as Position;
			if watermark > self.core.flushed() {
				self.core.set_flushed(watermark);
			}
			prev = Some(segment);
		}

		self.flush_cond.notify_all();
		Ok(())
	}

	/// Discards everything at positions `>= given_max`.
	pub fn truncate(&self, given_max: Position) -> Result<()> {
		let min = self.core.min();
		let max = self.core.max();
		if given_max < min || given_max > max {
			return Err(Error::illegal(format!(
				"truncate target {given_max} out of range [{min}, {max}]"
			)));
		}

		let _structural = self.core.structural().lock();
		let mut tail_guard = self.write_tail.lock();
		let mut segments = self.core.segments().write();

		let floor_start = segments.range(..=given_max).next_back().map(|(&k, _)| k);
		let mut new_tail = None;
		if let Some(start) = floor_start {
			if given_max > start {
				let segment = segments.get(&start).unwrap().clone();
				segment.rollback((given_max - start) as usize)?;
				new_tail = Some(segment);
			}
			let to_delete: Vec<Position> = segments.range(given_max..).map(|(&k, _)| k).collect();
			for doomed in to_delete {
				if let Some(segment) = segments.remove(&doomed) {
					segment.delete()?;
					debug!(start = doomed, "segment truncated away");
				}
			}
		}

		self.core.set_max(given_max);
		if self.core.flushed() > given_max {
			self.core.set_flushed(given_max);
		}
		*tail_guard = new_tail;
		drop(segments);
		drop(tail_guard);
		self.flush_cond.notify_all();
		Ok(())
	}

	/// Discards whole segments entirely below `given_min`. Requires
	/// `given_min > min()` and `given_min <= flushed()`. Returns the
	/// number of bytes deleted.
	pub fn compact(&self, given_min: Position) -> Result<u64> {
		let deleted = self.core.compact(given_min)?;
		let mut tail_guard = self.write_tail.lock();
		if let Some(tail) = tail_guard.as_ref() {
			if !self.core.segments().read().contains_key(&tail.start()) {
				*tail_guard = None;
			}
		}
		Ok(deleted)
	}

	pub fn min(&self) -> Position { self.core.min() }
	pub fn physical_min(&self) -> Position { self.core.physical_min() }
	pub fn max(&self) -> Position { self.core.max() }
	pub fn flushed(&self) -> Position { self.core.flushed() }
	pub fn segment_count(&self) -> usize { self.core.segment_count() }
	pub fn is_empty(&self) -> bool { self.core.is_empty() }
	pub fn get_free_space(&self) -> Result<u64> { self.core.get_free_space() }
	pub fn get_total_space(&self) -> Result<u64> { self.core.get_total_space() }

	pub fn stats(&self) -> Stats {
		Stats { writable: self.write_tail.lock().is_some(), ..self.core.stats() }
	}

	/// Force-unloads and removes every segment, then deletes the directory.
	pub fn delete(&self) -> Result<()> {
		self.core.delete()?;
		*self.write_tail.lock() = None;
		Ok(())
	}

	/// Flushes and force-unloads every segment, then deregisters this
	/// store's preload class with the buffer cache. The first error
	/// encountered is returned, but every segment is still processed.
	pub fn close(&self) -> Result<()> {
		let result = self.core.close();
		*self.write_tail.lock() = None;
		result
	}

	fn wait_for_backpressure(&self) {
		let max_dirty = self.core.config().max_dirty_size;
		if max_dirty == 0 {
			return;
		}
		if self.core.max() - self.core.flushed() <= max_dirty {
			return;
		}
		warn!(max = self.core.max(), flushed = self.core.flushed(), max_dirty, "append back-pressured");
		let mut guard = self.backpressure_lock.lock();
		while self.core.max() - self.core.flushed() > max_dirty {
			self.flush_cond.wait(&mut guard);
		}
	}
}
