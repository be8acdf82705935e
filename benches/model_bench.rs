// Benchmarks for loading and looking up folders in the model

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};
use fsmodel::{FilePath, FileSystemModel, MemoryFileSystem, ModelConfig, PlatformSettings, PlatformState};

fn runtime() -> Runtime {
    Builder::new_current_thread().enable_all().build().unwrap()
}

fn populated(files: usize) -> MemoryFileSystem {
    let fs = MemoryFileSystem::new();
    for i in 0..files {
        fs.add_file(&format!("file:///big/file{:05}.txt", i), i as u64).unwrap();
    }
    fs
}

fn model(fs: &MemoryFileSystem) -> FileSystemModel {
    FileSystemModel::with_config(
        Arc::new(fs.clone()),
        ModelConfig::bare("file:///"),
        PlatformSettings::ready_with(PlatformState::default()),
    )
    .unwrap()
}

fn bench_load_large_folder(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("load_folder");

    for files in [100, 1_000, 5_000].iter() {
        let fs = populated(*files);
        group.bench_with_input(BenchmarkId::from_parameter(files), files, |b, _| {
            b.to_async(&rt).iter(|| async {
                let mut model = model(&fs);
                let big = model.load_uri("file:///big").await.unwrap();
                black_box(model.children(&big).len());
            });
        });
    }

    group.finish();
}

fn bench_find_path(c: &mut Criterion) {
    let rt = runtime();
    let fs = populated(1_000);
    let model = rt.block_on(async {
        let mut model = model(&fs);
        model.load_uri("file:///big").await.unwrap();
        model
    });
    let target = FilePath::parse("file:///big/file00999.txt").unwrap();

    c.bench_function("find_path", |b| {
        b.iter(|| black_box(model.find_path(&target)));
    });
}

criterion_group!(benches, bench_load_large_folder, bench_find_path);
criterion_main!(benches);
