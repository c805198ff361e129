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

//! A process-wide registry of fixed-size byte buffers ("pages"), shared
//! across every store of the same `data_size`. Stores register a
//! core/max preload policy on open and deregister on close; segments
//! borrow a page when loaded and release it when unloaded.

use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::Mutex;
use tracing::trace;

/// A page buffer handed out by a [`BufferCache`]. Its length always equals
/// the `size` it was borrowed for.
pub type Page = Box<[u8]>;

#[derive(Default)]
struct Class {
	core: usize,
	max: usize,
	registrants: usize,
	idle: Vec<Page>,
}

impl Class {
	fn top_up(&mut self, size: usize) {
		while self.idle.len() < self.core {
			self.idle.push(alloc(size));
		}
	}
}

fn alloc(size: usize) -> Page {
	vec![0u8; size].into_boxed_slice()
}

/// Shared registry of idle page buffers, partitioned by size.
///
/// Cloning a `BufferCache` clones a handle to the same underlying registry
/// (it's an `Arc` internally), matching the teacher's `LocalPool`/`SharedPool`
/// clone-a-handle convention, made thread-safe since a store's writer,
/// flusher and readers all borrow from the same cache concurrently.
#[derive(Clone, Default)]
pub struct BufferCache {
	classes: Arc<Mutex<HashMap<usize, Class>>>,
}

impl BufferCache {
	/// Returns a fresh, empty cache, not shared with any other instance.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a preload policy for `size`-byte pages: at least `core`
	/// idle instances are eagerly allocated, at most `max` are retained
	/// when idle. Multiple registrants for the same `size` are refcounted;
	/// the effective core/max are the maximum requested by any registrant.
	pub fn add_pre_load(&self, size: usize, core: usize, max: usize) {
		let mut classes = self.classes.lock();
		let class = classes.entry(size).or_default();
		class.core = class.core.max(core);
		class.max = class.max.max(max);
		class.registrants += 1;
		class.top_up(size);
		trace!(size, core = class.core, max = class.max, "buffer cache preload registered");
	}

	/// Deregisters one prior [`add_pre_load`](Self::add_pre_load) call for
	/// `size`. When the last registrant is removed, idle pages of that size
	/// are released.
	pub fn remove_pre_load(&self, size: usize) {
		let mut classes = self.classes.lock();
		if let Some(class) = classes.get_mut(&size) {
			class.registrants = class.registrants.saturating_sub(1);
			if class.registrants == 0 {
				classes.remove(&size);
				trace!(size, "buffer cache preload released");
			}
		}
	}

	/// Returns an idle `size`-byte page if one is available, else allocates
	/// a fresh, zero-initialized one. Never fails; allocation failure is an
	/// abort, as with any other Rust allocation.
	pub fn borrow(&self, size: usize) -> Page {
		let mut classes = self.classes.lock();
		if let Some(class) = classes.get_mut(&size) {
			if let Some(page) = class.idle.pop() {
				return page;
			}
		}
		alloc(size)
	}

	/// Returns a page of `size` bytes to the cache. If the idle count for
	/// `size` is already at its max, the page is dropped instead.
	pub fn release(&self, size: usize, page: Page) {
		debug_assert_eq!(page.len(), size);
		let mut classes = self.classes.lock();
		let class = classes.entry(size).or_default();
		if class.idle.len() < class.max {
			class.idle.push(page);
		}
	}

	/// Number of idle pages currently cached for `size`.
	pub fn idle_count(&self, size: usize) -> usize {
		self.classes.lock().get(&size).map_or(0, |c| c.idle.len())
	}

	/// The preload core count currently registered for `size`.
	pub fn core(&self, size: usize) -> usize {
		self.classes.lock().get(&size).map_or(0, |c| c.core)
	}

	/// The preload max count currently registered for `size`.
	pub fn max(&self, size: usize) -> usize {
		self.classes.lock().get(&size).map_or(0, |c| c.max)
	}
}
