//! Benchmarks for the code runner.
//!
//! Run with: cargo bench
//!
//! Execution benchmarks use `sh`; the python benchmark is skipped when
//! python3 is not on PATH.

use std::sync::Arc;
use std::time::Duration;

use code_runner_rs::prelude::*;
use code_runner_rs::Arg;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::runtime::Runtime;

fn toolchain_available(program: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}

fn shell_runner(mode: StagingMode) -> CodeRunner {
    let registry = LanguageRegistry::builtin()
        .with_language("sh", LanguageProfile::interpreted("sh", "sh", [Arg::Source]));
    let config = RunnerConfig::builder()
        .staging_mode(mode)
        .timeout(Duration::from_secs(30))
        .build();
    CodeRunner::with_registry(config, Arc::new(registry))
}

/// Benchmark language lookup.
fn bench_resolve(c: &mut Criterion) {
    let registry = LanguageRegistry::builtin();

    let mut group = c.benchmark_group("resolve");
    group.bench_function("supported", |b| b.iter(|| black_box(registry.resolve("cpp"))));
    group.bench_function("unsupported", |b| b.iter(|| black_box(registry.resolve("ruby"))));
    group.finish();
}

/// Benchmark a trivial run under each staging mode.
fn bench_staging_modes(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("staging");
    group.sample_size(20);

    for (name, mode) in [("shared", StagingMode::Shared), ("isolated", StagingMode::Isolated)] {
        let runner = shell_runner(mode);
        group.bench_function(name, |b| {
            b.iter(|| {
                let result = rt.block_on(runner.run("sh", "echo hi")).unwrap();
                black_box(result)
            });
        });
    }

    group.finish();
}

/// Benchmark concurrent execution throughput.
fn bench_concurrent_execution(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let runner = shell_runner(StagingMode::Isolated);

    let mut group = c.benchmark_group("concurrent");
    group.sample_size(10);

    for concurrency in [1, 2, 4, 8].iter() {
        group.throughput(Throughput::Elements(*concurrency as u64));
        group.bench_with_input(
            BenchmarkId::new("executions", concurrency),
            concurrency,
            |b, &concurrency| {
                b.iter(|| {
                    rt.block_on(async {
                        let mut handles = Vec::new();

                        for _ in 0..concurrency {
                            let runner = runner.clone();
                            handles.push(tokio::spawn(async move {
                                runner.run("sh", "echo hi").await.unwrap()
                            }));
                        }

                        for handle in handles {
                            black_box(handle.await.unwrap());
                        }
                    });
                });
            },
        );
    }

    group.finish();
}

/// Benchmark interpreter start-up through the full pipeline.
fn bench_python(c: &mut Criterion) {
    if !toolchain_available("python3") {
        eprintln!("Skipping python benchmark: python3 not found");
        return;
    }

    let rt = Runtime::new().unwrap();
    let runner = shell_runner(StagingMode::Isolated);

    let mut group = c.benchmark_group("python");
    group.sample_size(10);
    group.bench_function("simple_print", |b| {
        b.iter(|| {
            let result = rt.block_on(runner.run("python", "print(1 + 1)")).unwrap();
            black_box(result)
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_resolve,
    bench_staging_modes,
    bench_concurrent_execution,
    bench_python,
);

criterion_main!(benches);
