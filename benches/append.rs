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

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use seglog::{Config, LocalStore};
use tempfile::tempdir;

const RECORD: &[u8] = b"the quick brown fox jumps over the lazy dog";

fn config(data_size: usize) -> Config {
	Config { file_header_size: 0, file_data_size: data_size, ..Config::default() }
}

fn append_within_segment(c: &mut Criterion) {
	c.bench_function("append_within_segment", |b| {
		b.iter_batched(
			|| {
				let dir = tempdir().unwrap();
				let store = LocalStore::recover(dir.path(), 0, config(1 << 20)).unwrap();
				(dir, store)
			},
			|(_dir, store)| {
				for _ in 0..64 {
					black_box(store.append(RECORD).unwrap());
				}
			},
			BatchSize::SmallInput,
		)
	});
}

fn append_with_rollover(c: &mut Criterion) {
	c.bench_function("append_with_rollover", |b| {
		b.iter_batched(
			|| {
				let dir = tempdir().unwrap();
				let store = LocalStore::recover(dir.path(), 0, config(RECORD.len() * 4)).unwrap();
				(dir, store)
			},
			|(_dir, store)| {
				for _ in 0..64 {
					black_box(store.append(RECORD).unwrap());
				}
			},
			BatchSize::SmallInput,
		)
	});
}

fn append_then_flush(c: &mut Criterion) {
	c.bench_function("append_then_flush", |b| {
		b.iter_batched(
			|| {
				let dir = tempdir().unwrap();
				let store = LocalStore::recover(dir.path(), 0, config(1 << 20)).unwrap();
				(dir, store)
			},
			|(_dir, store)| {
				for _ in 0..64 {
					store.append(RECORD).unwrap();
				}
				store.flush().unwrap();
			},
			BatchSize::SmallInput,
		)
	});
}

criterion_group!(append, append_within_segment, append_with_rollover, append_then_flush);
criterion_main!(append);
