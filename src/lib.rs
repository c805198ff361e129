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

//! ## How it works
//!
//! A store is a directory of *segment* files, each holding a contiguous
//! `[start, start + data_size)` byte range of one logical, append-only
//! journal. Segment file names are the decimal encoding of their `start`
//! position, so the on-disk directory listing doubles as the position
//! index.
//!
//! Appends land in the current *tail* segment's in-memory page, claimed
//! from a process-wide [`BufferCache`](cache::BufferCache) keyed by page
//! size. When the tail fills, it is closed and a fresh segment is opened
//! starting where the old one ended. `flush` copies dirty page bytes to
//! disk and advances a durable watermark; `compact`/`truncate` drop whole
//! or partial segments from either end of the journal.
//!
//! Two store flavors share this layout: [`store::LocalStore`] is the
//! writable primary store, and [`store::ImmutableStore`] only accepts
//! whole segment files installed via `append_file`, used by followers
//! that receive segments over the wire instead of writing them directly.

pub mod cache;
pub mod config;
pub mod error;
pub mod segment;
pub mod store;

pub use cache::BufferCache;
pub use config::Config;
pub use error::{Error, Result};
pub use segment::SegmentFile;
pub use store::{ImmutableStore, LocalStore};

/// A 64-bit, non-negative byte offset into the logical journal.
///
/// Positions are monotone; a store's live data occupies `[min(), max())`.
pub type Position = u64;
