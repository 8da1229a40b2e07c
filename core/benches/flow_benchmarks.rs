// benches/flow_benchmarks.rs
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use milkflow::{ContextData, FlowError, Pipeline, PipelineControl, Registry};
use tokio::runtime::Runtime;

#[derive(Default)]
struct BenchCtx {
  total: i64,
}

fn build_pipeline(steps: usize) -> Pipeline<BenchCtx, FlowError> {
  let names: Vec<String> = (0..steps).map(|i| format!("step_{i}")).collect();
  let defs: Vec<(&str, bool, Option<milkflow::SkipCondition<BenchCtx>>)> =
    names.iter().map(|n| (n.as_str(), false, None)).collect();
  let mut pipeline = Pipeline::new(&defs);
  for name in &names {
    pipeline.on_root(name, |ctx: ContextData<BenchCtx>| async move {
      ctx.write().total += 1;
      Ok::<_, FlowError>(PipelineControl::Continue)
    });
  }
  pipeline
}

fn bench_pipeline_run(c: &mut Criterion) {
  let rt = match Runtime::new() {
    Ok(rt) => rt,
    Err(e) => panic!("tokio runtime: {e}"),
  };
  let mut group = c.benchmark_group("pipeline_run");
  for steps in [1usize, 5, 20] {
    let pipeline = build_pipeline(steps);
    group.bench_with_input(BenchmarkId::from_parameter(steps), &steps, |b, _| {
      b.to_async(&rt).iter(|| async {
        let ctx = ContextData::new(BenchCtx::default());
        pipeline.run(ctx).await
      })
    });
  }
  group.finish();
}

fn bench_registry_dispatch(c: &mut Criterion) {
  let rt = match Runtime::new() {
    Ok(rt) => rt,
    Err(e) => panic!("tokio runtime: {e}"),
  };
  let registry = Registry::<FlowError>::new();
  registry.register_pipeline(build_pipeline(5));
  c.bench_function("registry_dispatch_5_steps", |b| {
    b.to_async(&rt).iter(|| async {
      let ctx = ContextData::new(BenchCtx::default());
      registry.run(ctx).await
    })
  });
}

criterion_group!(benches, bench_pipeline_run, bench_registry_dispatch);
criterion_main!(benches);
