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
use seglog::BufferCache;

fn borrow_release_with_preload(c: &mut Criterion) {
	let cache = BufferCache::new();
	cache.add_pre_load(4096, 8, 8);
	c.bench_function("borrow_release_with_preload", |b| b.iter(|| {
		let page = black_box(cache.borrow(4096));
		cache.release(4096, page);
	}));
}

fn borrow_release_without_preload(c: &mut Criterion) {
	let cache = BufferCache::new();
	c.bench_function("borrow_release_without_preload", |b| b.iter(|| {
		let page = black_box(cache.borrow(4096));
		cache.release(4096, page);
	}));
}

criterion_group!(cache, borrow_release_with_preload, borrow_release_without_preload);
criterion_main!(cache);
