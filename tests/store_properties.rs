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

use quickcheck::TestResult;
use quickcheck_macros::quickcheck;
use seglog::{Config, LocalStore};
use tempfile::tempdir;

fn config(data_size: usize) -> Config {
	Config { file_header_size: 0, file_data_size: data_size, ..Config::default() }
}

/// Records are capped at a handful of bytes and segments are small, so a
/// single test run naturally exercises rollover, not just a single segment.
fn clamp_records(records: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
	records
		.into_iter()
		.map(|mut r| { r.truncate(6); r })
		.filter(|r| !r.is_empty())
		.take(50)
		.collect()
}

#[quickcheck]
fn append_then_read_round_trips_under_any_flush_interleaving(
	records: Vec<Vec<u8>>,
	flush_after: Vec<bool>,
) -> TestResult {
	let records = clamp_records(records);
	if records.is_empty() {
		return TestResult::discard();
	}
	let dir = tempdir().unwrap();
	let store = LocalStore::recover(dir.path(), 0, config(8)).unwrap();

	let mut positions = Vec::new();
	for (i, record) in records.iter().enumerate() {
		let max = store.append(record).unwrap();
		positions.push((max - record.len() as u64, record.clone()));
		if flush_after.get(i).copied().unwrap_or(false) {
			store.flush().unwrap();
		}
	}
	store.flush().unwrap();

	for (pos, expected) in positions {
		let actual = store.read(pos, expected.len()).unwrap();
		if actual != expected {
			return TestResult::failed();
		}
	}
	TestResult::passed()
}

#[quickcheck]
fn flush_is_idempotent(records: Vec<Vec<u8>>) -> TestResult {
	let records = clamp_records(records);
	if records.is_empty() {
		return TestResult::discard();
	}
	let dir = tempdir().unwrap();
	let store = LocalStore::recover(dir.path(), 0, config(8)).unwrap();
	for record in &records {
		store.append(record).unwrap();
	}
	store.flush().unwrap();
	let flushed = store.flushed();
	store.flush().unwrap();
	TestResult::from_bool(store.flushed() == flushed)
}

#[quickcheck]
fn min_flushed_max_are_monotone_across_append_and_flush(records: Vec<Vec<u8>>) -> TestResult {
	let records = clamp_records(records);
	if records.is_empty() {
		return TestResult::discard();
	}
	let dir = tempdir().unwrap();
	let store = LocalStore::recover(dir.path(), 0, config(8)).unwrap();

	let mut last_min = store.min();
	let mut last_flushed = store.flushed();
	let mut last_max = store.max();
	for record in &records {
		store.append(record).unwrap();
		store.flush().unwrap();
		if store.min() < last_min || store.flushed() < last_flushed || store.max() < last_max {
			return TestResult::failed();
		}
		last_min = store.min();
		last_flushed = store.flushed();
		last_max = store.max();
	}
	TestResult::passed()
}

#[quickcheck]
fn round_trips_after_close_and_recover(records: Vec<Vec<u8>>) -> TestResult {
	let records = clamp_records(records);
	if records.is_empty() {
		return TestResult::discard();
	}
	let dir = tempdir().unwrap();
	let expected_max: u64 = records.iter().map(|r| r.len() as u64).sum();
	{
		let store = LocalStore::recover(dir.path(), 0, config(8)).unwrap();
		for record in &records {
			store.append(record).unwrap();
		}
		store.close().unwrap();
	}

	let store = LocalStore::recover(dir.path(), 0, config(8)).unwrap();
	if store.max() != expected_max {
		return TestResult::failed();
	}

	let mut pos = 0u64;
	for record in &records {
		let actual = store.read(pos, record.len()).unwrap();
		if actual != *record {
			return TestResult::failed();
		}
		pos += record.len() as u64;
	}
	TestResult::passed()
}

#[quickcheck]
fn adjacent_segments_are_contiguous_at_segment_boundaries(records: Vec<Vec<u8>>) -> TestResult {
	let records = clamp_records(records);
	if records.is_empty() {
		return TestResult::discard();
	}
	let dir = tempdir().unwrap();
	let store = LocalStore::recover(dir.path(), 0, config(8)).unwrap();
	for record in &records {
		store.append(record).unwrap();
	}

	// Every segment after the first starts exactly dataSize bytes after
	// the previous one: boundaries are fixed by capacity, never by the
	// actual number of bytes a segment ended up holding.
	let mut expected_starts = vec![0u64];
	while *expected_starts.last().unwrap() < store.max() {
		expected_starts.push(expected_starts.last().unwrap() + 8);
	}
	TestResult::from_bool(store.segment_count() <= expected_starts.len())
}

#[quickcheck]
fn back_pressure_bounds_dirty_bytes_after_first_flush(records: Vec<Vec<u8>>) -> TestResult {
	let records = clamp_records(records);
	if records.len() < 2 {
		return TestResult::discard();
	}
	let dir = tempdir().unwrap();
	let config = Config { max_dirty_size: 8, ..config(8) };
	let store = LocalStore::recover(dir.path(), 0, config).unwrap();

	store.append(&records[0]).unwrap();
	store.flush().unwrap();
	for record in &records[1..] {
		store.append(record).unwrap();
		if store.max() - store.flushed() > config.max_dirty_size + 6 {
			return TestResult::failed();
		}
		store.flush().unwrap();
	}
	TestResult::passed()
}
