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

//! The shared core behind both store flavors: the ordered segment
//! directory, continuity and recovery logic, and the read-only operations
//! common to [`LocalStore`](crate::store::LocalStore) and
//! [`ImmutableStore`](crate::store::ImmutableStore).

pub mod immutable;
pub mod local;

pub use immutable::ImmutableStore;
pub use local::LocalStore;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering::SeqCst};
use std::sync::Arc;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error};
use crate::cache::BufferCache;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::segment::SegmentFile;
use crate::Position;

type SegmentMap = BTreeMap<Position, Arc<SegmentFile>>;

/// A point-in-time snapshot of a store's bookkeeping, useful for logging
/// and metrics export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
	pub min: Position,
	pub max: Position,
	pub flushed: Position,
	pub segment_count: usize,
	pub writable: bool,
}

/// Shared state and operations common to both store flavors. Not exposed
/// directly; embedded in [`LocalStore`] and [`ImmutableStore`].
pub(crate) struct Core {
	base: PathBuf,
	config: Config,
	cache: BufferCache,
	segments: RwLock<SegmentMap>,
	/// Serializes structural mutation of the segment set: truncate, compact,
	/// delete. Append does not take this lock (spec: the embedding layer
	/// guarantees append is never concurrent with truncate).
	structural: Mutex<()>,
	min: AtomicU64,
	max: AtomicU64,
	flushed: AtomicU64,
}

impl Core {
	/// Recovers (or creates) a store directory, applying `min_hint` as the
	/// cutoff below which segments are dropped from consideration, exactly
	/// as `spec.md`'s `recover` operation describes.
	pub(crate) fn recover(base: impl Into<PathBuf>, min_hint: Position, config: Config) -> Result<Self> {
		let base = base.into();
		fs::create_dir_all(&base).map_err(|e| Error::io(&base, e))?;
		let cache = BufferCache::new();
		cache.add_pre_load(
			config.file_data_size,
			config.cached_file_core_count,
			config.cached_file_max_count,
		);

		let mut found: Vec<(Position, u64)> = Vec::new();
		for entry in fs::read_dir(&base).map_err(|e| Error::io(&base, e))? {
			let entry = entry.map_err(|e| Error::io(&base, e))?;
			if !entry.file_type().map_err(|e| Error::io(&base, e))?.is_file() {
				continue;
			}
			let name = entry.file_name();
			let Some(name) = name.to_str() else { continue };
			let Ok(start) = name.parse::<Position>() else { continue };
			if start.to_string() != name {
				continue;
			}
			let len = entry.metadata().map_err(|e| Error::io(&base, e))?.len();
			found.push((start, len));
		}
		found.sort_by_key(|(start, _)| *start);

		let header_size = config.file_header_size as u64;
		let included: Vec<(Position, u64)> = found
			.into_iter()
			.filter(|(start, len)| {
				let content_len = len.saturating_sub(header_size);
				*start >= min_hint || start + content_len > min_hint
			})
			.collect();

		let mut segments = SegmentMap::new();
		let (min, max) = if included.is_empty() {
			(min_hint, min_hint)
		} else {
			let data_size = config.file_data_size as u64;
			let last_index = included.len() - 1;
			let mut position = included[0].0;
			for (i, (start, len)) in included.iter().enumerate() {
				if *start != position {
					error!(
						path = %base.display(), expected = position, found = start,
						"segment store recovery found a gap"
					);
					return Err(Error::CorruptedStore {
						path: base.clone(),
						expected: position,
						found: Some(*start),
					});
				}
				let content_len = len.saturating_sub(header_size);
				let path = base.join(start.to_string());
				let segment = SegmentFile::open_existing(
					path,
					*start,
					config.file_header_size,
					config.file_data_size,
					content_len as usize,
					true,
					cache.clone(),
				)?;
				segments.insert(*start, Arc::new(segment));
				// Every non-tail segment occupies a full `data_size` span of
				// position space regardless of how many bytes it actually
				// holds (I1): the remainder is accepted padding from a
				// rollover, never written to disk. Only the last segment's
				// content length reflects real, unwritten-beyond bytes.
				position += if i == last_index { content_len } else { data_size };
			}
			(included[0].0.max(min_hint), position)
		};

		debug!(path = %base.display(), min, max, segments = segments.len(), "store recovered");

		Ok(Self {
			base,
			config,
			cache,
			segments: RwLock::new(segments),
			structural: Mutex::new(()),
			min: AtomicU64::new(min),
			max: AtomicU64::new(max),
			// Open question (see DESIGN.md): everything found on disk is
			// treated as durable, matching the source's loose behavior.
			flushed: AtomicU64::new(max),
		})
	}

	pub(crate) fn base(&self) -> &Path { &self.base }
	pub(crate) fn config(&self) -> &Config { &self.config }
	pub(crate) fn cache(&self) -> &BufferCache { &self.cache }
	pub(crate) fn segments(&self) -> &RwLock<SegmentMap> { &self.segments }
	pub(crate) fn structural(&self) -> &Mutex<()> { &self.structural }

	pub(crate) fn segment_path(&self, start: Position) -> PathBuf {
		self.base.join(start.to_string())
	}

	pub fn min(&self) -> Position { self.min.load(SeqCst) }
	pub fn max(&self) -> Position { self.max.load(SeqCst) }
	pub fn flushed(&self) -> Position { self.flushed.load(SeqCst) }

	pub(crate) fn set_min(&self, value: Position) { self.min.store(value, SeqCst); }
	pub(crate) fn set_max(&self, value: Position) { self.max.store(value, SeqCst); }
	pub(crate) fn set_flushed(&self, value: Position) { self.flushed.store(value, SeqCst); }

	/// The start position of the first remaining segment, or `min()` if the
	/// store holds no segments.
	pub fn physical_min(&self) -> Position {
		self.segments.read().keys().next().copied().unwrap_or_else(|| self.min())
	}

	pub fn segment_count(&self) -> usize { self.segments.read().len() }
	pub fn is_empty(&self) -> bool { self.segments.read().is_empty() }

	pub fn stats(&self) -> Stats {
		Stats {
			min: self.min(),
			max: self.max(),
			flushed: self.flushed(),
			segment_count: self.segment_count(),
			writable: false,
		}
	}

	/// Reads `length` bytes starting at `position`.
	pub fn read(&self, position: Position, length: usize) -> Result<Vec<u8>> {
		let min = self.min();
		let max = self.max();
		if position < min {
			return Err(Error::PositionUnderflow { position, min });
		}
		if position >= max {
			return Err(Error::PositionOverflow { position, max });
		}
		let segments = self.segments.read();
		let Some((&start, segment)) = segments.range(..=position).next_back() else {
			return Err(Error::PositionUnderflow { position, min });
		};
		let rel_pos = (position - start) as usize;
		segment.read(rel_pos, length)
	}

	pub fn read_long(&self, position: Position) -> Result<i64> {
		let bytes = self.read(position, 8)?;
		Ok(i64::from_be_bytes(bytes.try_into().unwrap()))
	}

	/// Free bytes available on the filesystem backing this store's directory.
	pub fn get_free_space(&self) -> Result<u64> {
		fs2::free_space(&self.base).map_err(|e| Error::io(&self.base, e))
	}

	/// Total bytes of the filesystem backing this store's directory.
	pub fn get_total_space(&self) -> Result<u64> {
		fs2::total_space(&self.base).map_err(|e| Error::io(&self.base, e))
	}

	pub(crate) fn check_free_space(&self, needed: u64) -> Result<()> {
		let free = self.get_free_space()?;
		if free < needed {
			return Err(Error::DiskFull { path: self.base.clone(), needed, free });
		}
		Ok(())
	}

	/// Discards whole segments entirely below `given_min`. Shared by both
	/// store flavors; the caller enforces the flavor-specific precondition
	/// on `given_min` relative to `flushed`.
	pub(crate) fn compact(&self, given_min: Position) -> Result<u64> {
		if given_min <= self.min() {
			return Err(Error::illegal(format!(
				"compact target {given_min} must be greater than min {}", self.min()
			)));
		}
		if given_min > self.flushed() {
			return Err(Error::illegal(format!(
				"compact target {given_min} exceeds flushed watermark {}", self.flushed()
			)));
		}

		let _guard = self.structural.lock();
		let mut segments = self.segments.write();
		let mut deleted = 0u64;
		let starts: Vec<Position> = segments.keys().copied().collect();
		for start in starts {
			let segment = segments.get(&start).unwrap().clone();
			let effective_size = segment.write_pos() as u64;
			if start + effective_size > given_min {
				break;
			}
			segment.delete()?;
			deleted += effective_size;
			segments.remove(&start);
			debug!(start, "segment compacted away");
		}

		self.set_min(given_min);
		Ok(deleted)
	}

	/// Force-unloads and removes every segment, then deletes the directory.
	pub fn delete(&self) -> Result<()> {
		let _guard = self.structural.lock();
		let mut segments = self.segments.write();
		for (_, segment) in segments.iter() {
			segment.force_unload();
			fs::remove_file(segment.path()).map_err(|e| Error::io(segment.path(), e))?;
		}
		segments.clear();
		self.cache.remove_pre_load(self.config.file_data_size);
		fs::remove_dir_all(&self.base).map_err(|e| Error::io(&self.base, e))
	}

	/// Flushes every dirty segment then force-unloads all of them, keeping
	/// going (and returning the first error) even if one segment fails, as
	/// the propagation policy requires.
	pub fn close(&self) -> Result<()> {
		let segments = self.segments.read();
		let mut first_error = None;
		for (_, segment) in segments.iter() {
			if let Err(e) = segment.flush() {
				first_error.get_or_insert(e);
			}
			if segment.has_page() {
				if let Err(e) = segment.force() {
					first_error.get_or_insert(e);
				}
			}
			segment.force_unload();
		}
		self.cache.remove_pre_load(self.config.file_data_size);
		match first_error {
			Some(e) => Err(e),
			None => Ok(()),
		}
	}
}
