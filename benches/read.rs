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

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use seglog::{Config, LocalStore};
use tempfile::tempdir;

const RECORD: &[u8] = b"the quick brown fox jumps over the lazy dog";

fn config(data_size: usize) -> Config {
	Config { file_header_size: 0, file_data_size: data_size, ..Config::default() }
}

fn read_from_loaded_segment(c: &mut Criterion) {
	let dir = tempdir().unwrap();
	let store = LocalStore::recover(dir.path(), 0, config(1 << 20)).unwrap();
	let mut positions = Vec::new();
	for _ in 0..256 {
		positions.push(store.append(RECORD).unwrap() - RECORD.len() as u64);
	}

	let mut i = 0;
	c.bench_function("read_from_loaded_segment", |b| b.iter(|| {
		let pos = positions[i % positions.len()];
		i += 1;
		black_box(store.read(pos, RECORD.len()).unwrap())
	}));
}

fn read_from_unloaded_segment(c: &mut Criterion) {
	let dir = tempdir().unwrap();
	let store = LocalStore::recover(dir.path(), 0, config(RECORD.len())).unwrap();
	store.append(RECORD).unwrap();
	store.flush().unwrap();
	store.close().unwrap();
	drop(store);

	let store = LocalStore::recover(dir.path(), 0, config(RECORD.len())).unwrap();
	c.bench_function("read_from_unloaded_segment", |b| b.iter(|| {
		black_box(store.read(0, RECORD.len()).unwrap())
	}));
}

criterion_group!(read, read_from_loaded_segment, read_from_unloaded_segment);
criterion_main!(read);
