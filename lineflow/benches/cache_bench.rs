//! Benchmarks for cache lookup over a populated pipeline history.

use criterion::{criterion_group, criterion_main, Criterion};
use std::sync::Arc;

use lineflow::prelude::*;
use lineflow::testing::{new_artifact, properties, run_identity};

async fn populate(metadata: &Metadata, runs: usize) {
    let exec_properties = properties(&[("lr", "0.1")]);
    for run in 0..runs {
        let (pipeline_info, component_info) =
            run_identity("bench-pipeline", &format!("r{run}"), "Trainer", "c1");
        let contexts = metadata
            .register_contexts(&pipeline_info, &component_info)
            .await
            .unwrap();
        let execution_id = metadata
            .register_execution(&exec_properties, &pipeline_info, &component_info, &contexts)
            .await
            .unwrap();
        let mut outputs = ArtifactMap::new();
        outputs.insert(
            "model".to_string(),
            vec![new_artifact("Model", &format!("/m/{run}"))],
        );
        metadata
            .publish_execution(
                execution_id,
                &ArtifactMap::new(),
                outputs,
                EXECUTION_STATE_COMPLETE,
            )
            .await
            .unwrap();
    }
}

fn cache_lookup_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let metadata = Metadata::with_store(Arc::new(InMemoryMetadataStore::new()));
    rt.block_on(populate(&metadata, 200));

    let exec_properties = properties(&[("lr", "0.1")]);
    let (pipeline_info, component_info) =
        run_identity("bench-pipeline", "query-run", "Trainer", "c1");

    c.bench_function("previous_execution_over_200_runs", |b| {
        b.iter(|| {
            let cached = rt
                .block_on(metadata.previous_execution(
                    &ArtifactMap::new(),
                    &exec_properties,
                    &pipeline_info,
                    &component_info,
                ))
                .unwrap();
            assert!(cached.is_some());
        });
    });
}

criterion_group!(benches, cache_lookup_benchmark);
criterion_main!(benches);
