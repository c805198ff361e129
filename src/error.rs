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

use std::io;
use std::path::PathBuf;
use thiserror::Error as ThisError;
use crate::Position;

/// The result type returned by every fallible store and segment operation.
pub type Result<T = ()> = std::result::Result<T, Error>;

/// Errors surfaced by the journal store. Nothing is swallowed internally;
/// every variant is reported to the caller with enough context to act on.
#[derive(Debug, ThisError)]
pub enum Error {
	/// A single `append` exceeded a segment's `data_size`.
	#[error("append of {len} bytes exceeds segment data size {data_size}")]
	TooManyBytes { len: usize, data_size: usize },

	/// A read position fell below the store's `min`.
	#[error("position {position} is before the journal start ({min})")]
	PositionUnderflow { position: Position, min: Position },

	/// A read position fell at or beyond the store's `max`.
	#[error("position {position} is at or past the journal end ({max})")]
	PositionOverflow { position: Position, max: Position },

	/// `recover` found a gap between segments.
	#[error(
		"segment store at {path} is corrupted: expected a segment starting at {expected}, found {found}",
		path = path.display(),
		found = found.map_or("none".to_string(), |p| p.to_string())
	)]
	CorruptedStore {
		path: PathBuf,
		expected: Position,
		found: Option<Position>,
	},

	/// Free disk space was insufficient to create a new segment.
	#[error(
		"not enough free space to create a {needed}-byte segment at {path}: {free} bytes free",
		path = path.display()
	)]
	DiskFull { path: PathBuf, needed: u64, free: u64 },

	/// A mutating operation was attempted on an immutable store.
	#[error("{operation} is not supported by an immutable store")]
	Unsupported { operation: &'static str },

	/// A filesystem operation failed.
	#[error("I/O error at {path}: {source}", path = path.display())]
	Io {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	/// An operation was called with an argument outside its valid range.
	#[error("illegal argument: {message}")]
	IllegalArgument { message: String },
}

impl Error {
	pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
		Self::Io { path: path.into(), source }
	}

	pub(crate) fn illegal(message: impl Into<String>) -> Self {
		Self::IllegalArgument { message: message.into() }
	}
}
