//! Benchmarks for the assignment scan and retry backoff.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use conductor_core::{AgentId, CapabilitySet, ProjectId};
use conductor_infra::{AssignmentService, InMemoryTaskStore, TaskStore};
use conductor_jobs::RetryPolicy;
use conductor_tasks::{NewTask, Task};

fn seed_backlog(store: &InMemoryTaskStore, size: usize) {
    let project = ProjectId::new();
    for i in 0..size {
        let task = Task::new(NewTask {
            project_id: project,
            title: format!("task {i}"),
            description: None,
            priority: (i % 10) as i32,
            dependencies: Vec::new(),
            required_capabilities: if i % 3 == 0 {
                ["review"].into_iter().collect()
            } else {
                CapabilitySet::new()
            },
        })
        .unwrap();
        store.insert(task).unwrap();
    }
}

fn bench_poll_next(c: &mut Criterion) {
    let mut group = c.benchmark_group("poll_next");
    for backlog in [100usize, 1_000, 5_000] {
        group.bench_with_input(
            BenchmarkId::from_parameter(backlog),
            &backlog,
            |b, &backlog| {
                let store = Arc::new(InMemoryTaskStore::new());
                seed_backlog(&store, backlog);
                let svc = AssignmentService::new(Arc::clone(&store));
                let capabilities: CapabilitySet = ["coding"].into_iter().collect();

                b.iter(|| {
                    // Claim one task per iteration; the backlog shrinks but
                    // stays large relative to the sample count.
                    let claimed = svc.poll_next(AgentId::new(), &capabilities).unwrap();
                    black_box(claimed)
                });
            },
        );
    }
    group.finish();
}

fn bench_pending_scan(c: &mut Criterion) {
    let store = Arc::new(InMemoryTaskStore::new());
    seed_backlog(&store, 5_000);

    c.bench_function("pending_ordered_5000", |b| {
        b.iter(|| black_box(store.pending_ordered().unwrap()))
    });
}

fn bench_backoff(c: &mut Criterion) {
    let policy = RetryPolicy::default();
    c.bench_function("retry_backoff", |b| {
        b.iter(|| {
            for attempt in 1..16u32 {
                black_box(policy.delay_after(black_box(attempt)));
            }
        })
    });
}

criterion_group!(benches, bench_poll_next, bench_pending_scan, bench_backoff);
criterion_main!(benches);
