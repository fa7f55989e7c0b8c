use rowflow_model::SortKeySpec;
use rowflow_model::codec::CsvRecords;
use rowflow_stand::*;

use std::time::Duration;

const SORT_BENCH_NAME: &str = "sort_file";
const SORT_GROUP_NAME: &str = const_format::formatc!("bench.{SORT_BENCH_NAME}");

const LOAD_BENCH_NAME: &str = "load_sorted";
const LOAD_GROUP_NAME: &str = const_format::formatc!("bench.{LOAD_BENCH_NAME}");

fn scenario_bencher<S: Scenario>(b: &mut criterion::Bencher, context: &Context<S>, input: &S::Input) {
    b.to_async(&context.runtime).iter_batched(
        || context.block(async { context.scenario.prepare(input).await.unwrap() }),
        async |bench| bench.run().await.unwrap(),
        criterion::BatchSize::PerIteration,
    );
}

fn sort_file_benchmark(c: &mut criterion::Criterion) {
    let scenario = SortFile {
        keys: SortKeySpec::parse("last_name:asc,first_name:asc").unwrap(),
    };
    let context = Context::new(scenario).unwrap();
    let _enter = context.runtime.enter();

    let mut group = c.benchmark_group(SORT_GROUP_NAME);
    for (quality, file_path) in data_files().unwrap() {
        group.throughput(criterion::Throughput::Elements(quality));
        let bench_id = criterion::BenchmarkId::new(SORT_BENCH_NAME, quality);
        group.bench_function(bench_id, |b| scenario_bencher(b, &context, &file_path));
    }
    group.finish();
}

fn load_sorted_benchmark(c: &mut criterion::Criterion) {
    let Some((quality, file_path)) = data_files().unwrap().pop() else {
        return;
    };
    let rows: Vec<_> = CsvRecords::open(&file_path)
        .unwrap()
        .collect::<anyhow::Result<_>>()
        .unwrap();

    let mut group = c.benchmark_group(LOAD_GROUP_NAME);
    group.throughput(criterion::Throughput::Elements(quality));
    for max_concurrent_flushes in [1, 2, 4, 8] {
        let scenario = LoadSorted {
            batch_size: 1_000,
            max_concurrent_flushes,
            write_delay: Duration::from_millis(5),
        };
        let context = Context::new(scenario).unwrap();
        let _enter = context.runtime.enter();
        let bench_id = criterion::BenchmarkId::new(LOAD_BENCH_NAME, max_concurrent_flushes);
        group.bench_function(bench_id, |b| scenario_bencher(b, &context, &rows));
    }
    group.finish();
}

criterion::criterion_group! {
    name = pipeline;
    config = criterion::Criterion::default()
        .sample_size(20)
        .warm_up_time(Duration::from_secs(3))
        .measurement_time(Duration::from_secs(20));
    targets =
        sort_file_benchmark,
        load_sorted_benchmark,
}

criterion::criterion_main!(pipeline);
