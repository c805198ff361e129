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

//! Store configuration, built from the string-keyed properties a store is
//! opened with (see the key table in the crate's specification).

use std::collections::HashMap;
use std::str::FromStr;
use crate::error::{Error, Result};

/// Bytes reserved at the head of every segment file, opaque to the core.
pub const DEFAULT_HEADER_SIZE: usize = 128;
/// Data bytes held per segment.
pub const DEFAULT_DATA_SIZE: usize = 128 * 1024 * 1024;
/// Idle pages preloaded per store at startup.
pub const DEFAULT_CORE_COUNT: usize = 0;
/// Max idle pages cached per store.
pub const DEFAULT_MAX_COUNT: usize = 2;
/// `max - flushed` may exceed this many bytes before `append` back-pressures.
/// Zero disables back-pressure.
pub const DEFAULT_MAX_DIRTY_SIZE: u64 = 0;

/// Typed store configuration, parsed from [string-keyed properties](Self::from_properties).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
	pub file_header_size: usize,
	pub file_data_size: usize,
	pub cached_file_core_count: usize,
	pub cached_file_max_count: usize,
	pub max_dirty_size: u64,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			file_header_size: DEFAULT_HEADER_SIZE,
			file_data_size: DEFAULT_DATA_SIZE,
			cached_file_core_count: DEFAULT_CORE_COUNT,
			cached_file_max_count: DEFAULT_MAX_COUNT,
			max_dirty_size: DEFAULT_MAX_DIRTY_SIZE,
		}
	}
}

impl Config {
	/// Parses a config from string-keyed properties, falling back to the
	/// documented default for any key that's absent. Unknown keys are
	/// ignored; present but unparsable values are `IllegalArgument`.
	pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self> {
		let mut config = Self::default();
		if let Some(v) = properties.get("file_header_size") {
			config.file_header_size = parse(v, "file_header_size")?;
		}
		if let Some(v) = properties.get("file_data_size") {
			config.file_data_size = parse(v, "file_data_size")?;
		}
		if let Some(v) = properties.get("cached_file_core_count") {
			config.cached_file_core_count = parse(v, "cached_file_core_count")?;
		}
		if let Some(v) = properties.get("cached_file_max_count") {
			config.cached_file_max_count = parse(v, "cached_file_max_count")?;
		}
		if let Some(v) = properties.get("max_dirty_size") {
			config.max_dirty_size = parse(v, "max_dirty_size")?;
		}
		Ok(config)
	}
}

fn parse<T: FromStr>(value: &str, key: &str) -> Result<T> {
	value.parse().map_err(|_| {
		Error::illegal(format!("invalid value {value:?} for property {key:?}"))
	})
}
