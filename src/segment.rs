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

//! A single segment file: a contiguous, disk-backed `data_size`-byte range
//! of the logical journal, lazily cached in memory.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering::SeqCst};
use parking_lot::Mutex;
use tracing::{debug, trace};
use crate::cache::{BufferCache, Page};
use crate::error::{Error, Result};
use crate::Position;

/// Where a segment currently sits in its lazy-load lifecycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SegmentState {
	/// No page in memory; on-disk only.
	Unloaded,
	/// Page present, still accepting appends.
	LoadedWritable,
	/// Page present, `write_closed` is set; reads only.
	LoadedClosed,
}

/// One segment file: `[header_size opaque bytes][up to data_size data bytes]`,
/// named by the decimal ASCII encoding of its `start` position.
pub struct SegmentFile {
	start: Position,
	header_size: usize,
	data_size: usize,
	path: PathBuf,
	cache: BufferCache,
	file: File,
	page: Mutex<Option<Page>>,
	write_pos: AtomicUsize,
	flush_pos: AtomicUsize,
	write_closed: AtomicBool,
}

impl SegmentFile {
	/// Creates a brand-new, empty segment file at `start`.
	pub fn create(
		path: impl Into<PathBuf>,
		start: Position,
		header_size: usize,
		data_size: usize,
		cache: BufferCache,
	) -> Result<Self> {
		let path = path.into();
		let file = OpenOptions::new()
			.read(true)
			.write(true)
			.create_new(true)
			.open(&path)
			.map_err(|e| Error::io(&path, e))?;
		file.set_len(header_size as u64).map_err(|e| Error::io(&path, e))?;
		debug!(start, data_size, path = %path.display(), "segment created");
		Ok(Self {
			start,
			header_size,
			data_size,
			path,
			cache,
			file,
			page: Mutex::new(None),
			write_pos: AtomicUsize::new(0),
			flush_pos: AtomicUsize::new(0),
			write_closed: AtomicBool::new(false),
		})
	}

	/// Opens an already-existing segment file discovered at recovery,
	/// with `write_pos` (and, for durable stores, `flush_pos`) set to the
	/// number of data bytes already on disk.
	pub fn open_existing(
		path: impl Into<PathBuf>,
		start: Position,
		header_size: usize,
		data_size: usize,
		on_disk_len: usize,
		flushed: bool,
		cache: BufferCache,
	) -> Result<Self> {
		let path = path.into();
		let file = OpenOptions::new()
			.read(true)
			.write(true)
			.open(&path)
			.map_err(|e| Error::io(&path, e))?;
		let write_pos = on_disk_len.min(data_size);
		let flush_pos = if flushed { write_pos } else { 0 };
		debug!(start, write_pos, path = %path.display(), "segment recovered");
		Ok(Self {
			start,
			header_size,
			data_size,
			path,
			cache,
			file,
			page: Mutex::new(None),
			write_pos: AtomicUsize::new(write_pos),
			flush_pos: AtomicUsize::new(flush_pos),
			write_closed: AtomicBool::new(write_pos >= data_size),
		})
	}

	pub fn start(&self) -> Position { self.start }
	pub fn header_size(&self) -> usize { self.header_size }
	pub fn data_size(&self) -> usize { self.data_size }
	pub fn path(&self) -> &Path { &self.path }
	pub fn write_pos(&self) -> usize { self.write_pos.load(SeqCst) }
	pub fn flush_pos(&self) -> usize { self.flush_pos.load(SeqCst) }
	pub fn write_closed(&self) -> bool { self.write_closed.load(SeqCst) }
	pub fn is_clean(&self) -> bool { self.flush_pos() == self.write_pos() }
	pub fn has_page(&self) -> bool { self.page.lock().is_some() }
	pub fn remaining(&self) -> usize { self.data_size - self.write_pos() }

	pub fn state(&self) -> SegmentState {
		if !self.has_page() {
			SegmentState::Unloaded
		} else if self.write_closed() {
			SegmentState::LoadedClosed
		} else {
			SegmentState::LoadedWritable
		}
	}

	/// Ends the segment's writable phase; no further appends are accepted.
	pub fn close_write(&self) {
		self.write_closed.store(true, SeqCst);
	}

	/// Appends as many of `bytes` as fit in the segment's remaining room,
	/// returning the number of bytes consumed.
	pub fn append(&self, bytes: &[u8]) -> Result<usize> {
		self.append_vectored(&[bytes])
	}

	/// Vectored append: writes from `parts` in order until the segment is
	/// full or all parts are consumed, returning the total bytes written.
	pub fn append_vectored(&self, parts: &[&[u8]]) -> Result<usize> {
		let mut guard = self.load()?;
		let page = guard.as_mut().expect("page loaded");
		let mut pos = self.write_pos.load(SeqCst);
		let mut written = 0;
		'outer: for part in parts {
			let mut part = *part;
			while !part.is_empty() {
				let remaining = self.data_size - pos;
				if remaining == 0 {
					break 'outer;
				}
				let n = remaining.min(part.len());
				page[pos..pos + n].copy_from_slice(&part[..n]);
				pos += n;
				written += n;
				part = &part[n..];
			}
		}
		self.write_pos.store(pos, SeqCst);
		if pos >= self.data_size {
			self.write_closed.store(true, SeqCst);
		}
		trace!(start = self.start, written, pos, "segment append");
		Ok(written)
	}

	/// Reads `length` bytes starting at `rel_pos` within the data region,
	/// loading the page first if unloaded. The caller must ensure
	/// `rel_pos + length <= write_pos()`.
	pub fn read(&self, rel_pos: usize, length: usize) -> Result<Vec<u8>> {
		let guard = self.load()?;
		let page = guard.as_ref().expect("page loaded");
		Ok(page[rel_pos..rel_pos + length].to_vec())
	}

	/// Reads an 8-byte big-endian integer at `rel_pos`.
	pub fn read_long(&self, rel_pos: usize) -> Result<i64> {
		let bytes = self.read(rel_pos, 8)?;
		Ok(i64::from_be_bytes(bytes.try_into().unwrap()))
	}

	/// Writes dirty bytes `[flush_pos, write_pos)` to the file. Does not
	/// `fsync`; pair with [`force`](Self::force) for durability.
	pub fn flush(&self) -> Result<()> {
		let guard = self.page.lock();
		let Some(page) = guard.as_ref() else { return Ok(()) };
		let flush_pos = self.flush_pos.load(SeqCst);
		let write_pos = self.write_pos.load(SeqCst);
		if flush_pos >= write_pos {
			return Ok(());
		}
		let offset = (self.header_size + flush_pos) as u64;
		self.file
			.write_at(&page[flush_pos..write_pos], offset)
			.map_err(|e| Error::io(&self.path, e))?;
		self.flush_pos.store(write_pos, SeqCst);
		trace!(start = self.start, flush_pos = write_pos, "segment flushed");
		Ok(())
	}

	/// `fsync`s the underlying file descriptor.
	pub fn force(&self) -> Result<()> {
		self.file.sync_all().map_err(|e| Error::io(&self.path, e))
	}

	/// Rolls the segment back to `rel_pos`: `write_pos` becomes `rel_pos`,
	/// and if `flush_pos > rel_pos` the file is truncated to
	/// `header_size + rel_pos` on disk. Reopens the segment for writes.
	pub fn rollback(&self, rel_pos: usize) -> Result<()> {
		self.write_pos.store(rel_pos, SeqCst);
		if self.flush_pos.load(SeqCst) > rel_pos {
			self.file
				.set_len((self.header_size + rel_pos) as u64)
				.map_err(|e| Error::io(&self.path, e))?;
			self.flush_pos.store(rel_pos, SeqCst);
		}
		self.write_closed.store(rel_pos >= self.data_size, SeqCst);
		debug!(start = self.start, rel_pos, "segment rolled back");
		Ok(())
	}

	/// Releases the page to the buffer cache. Requires the segment to be
	/// clean (no dirty bytes); returns `IllegalArgument` otherwise.
	pub fn unload(&self) -> Result<()> {
		let mut guard = self.page.lock();
		if guard.is_none() {
			return Ok(());
		}
		if !self.is_clean() {
			return Err(Error::illegal(format!(
				"cannot unload dirty segment at {}", self.start
			)));
		}
		if let Some(page) = guard.take() {
			self.cache.release(self.data_size, page);
		}
		Ok(())
	}

	/// Releases the page unconditionally, discarding any unflushed bytes.
	/// Used only by paths that are about to delete the file anyway.
	pub fn force_unload(&self) {
		let mut guard = self.page.lock();
		if let Some(page) = guard.take() {
			self.cache.release(self.data_size, page);
		}
	}

	/// Force-unloads and deletes the segment file.
	pub fn delete(&self) -> Result<()> {
		self.force_unload();
		std::fs::remove_file(&self.path).map_err(|e| Error::io(&self.path, e))
	}

	fn load(&self) -> Result<parking_lot::MutexGuard<'_, Option<Page>>> {
		let mut guard = self.page.lock();
		if guard.is_none() {
			let mut page = self.cache.borrow(self.data_size);
			let on_disk = self.write_pos.load(SeqCst);
			if on_disk > 0 {
				self.file
					.read_exact_at(&mut page[..on_disk], self.header_size as u64)
					.map_err(|e| Error::io(&self.path, e))?;
			}
			*guard = Some(page);
			trace!(start = self.start, "segment page loaded");
		}
		Ok(guard)
	}
}

impl std::fmt::Debug for SegmentFile {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SegmentFile")
			.field("start", &self.start)
			.field("data_size", &self.data_size)
			.field("write_pos", &self.write_pos())
			.field("flush_pos", &self.flush_pos())
			.field("write_closed", &self.write_closed())
			.field("state", &self.state())
			.finish()
	}
}
