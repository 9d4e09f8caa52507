use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use brainflow_core::{ContentItem, Priority, UserId};
use brainflow_infra::jobs::{JobPayload, Lane, RetryPolicy};
use brainflow_infra::lease::{InMemoryLeaseStore, LeaseStore};
use brainflow_infra::repository::{ContentRepository, InMemoryContentRepository};
use brainflow_infra::WorkflowScheduler;

const NOTES: &str = "Meeting about Project Alpha. Action: review API by Friday";

fn scheduler() -> WorkflowScheduler {
    WorkflowScheduler::builder().build()
}

fn bench_enqueue_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("enqueue_latency");
    group.sample_size(500);

    group.bench_function("submit_brain_dump", |b| {
        let scheduler = scheduler();
        b.iter(|| {
            let item = ContentItem::new(UserId::new(), NOTES, Utc::now());
            black_box(scheduler.submit_brain_dump(item).unwrap());
        });
    });

    group.bench_function("enqueue_urgent_with_routing", |b| {
        let content = Arc::new(InMemoryContentRepository::new());
        let scheduler = WorkflowScheduler::builder()
            .with_content_repository(content.clone())
            .build();
        let item = ContentItem::new(UserId::new(), NOTES, Utc::now());
        content.insert(item.clone()).unwrap();

        b.iter(|| {
            black_box(
                scheduler
                    .enqueue(JobPayload::brain_dump(item.id), Priority::Urgent, None)
                    .unwrap(),
            );
        });
    });

    group.finish();
}

fn bench_pipeline_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_then_embed");

    for batch_size in [1usize, 10, 100] {
        group.throughput(Throughput::Elements(batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            &batch_size,
            |b, &batch_size| {
                b.iter_batched(
                    || {
                        let scheduler = scheduler();
                        for i in 0..batch_size {
                            let item = ContentItem::new(
                                UserId::new(),
                                format!("{NOTES} (note {i})"),
                                Utc::now(),
                            );
                            scheduler.submit_brain_dump(item).unwrap();
                        }
                        scheduler
                    },
                    |scheduler| {
                        let parsed = scheduler.drain(Lane::AiProcessing).unwrap();
                        let embedded = scheduler.drain(Lane::AiEmbeddings).unwrap();
                        black_box((parsed.len(), embedded.len()));
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

fn bench_duplicate_guard(c: &mut Criterion) {
    let mut group = c.benchmark_group("duplicate_guard");
    group.sample_size(1000);

    group.bench_function("acquire_release_uncontended", |b| {
        let leases = InMemoryLeaseStore::new();
        let ttl = Duration::from_secs(300);
        b.iter(|| {
            let now = Utc::now();
            let lease = leases.acquire("content:bench", ttl, now).unwrap().unwrap();
            black_box(leases.release(&lease).unwrap());
        });
    });

    group.bench_function("acquire_contended", |b| {
        let leases = InMemoryLeaseStore::new();
        let ttl = Duration::from_secs(300);
        let _held = leases.acquire("content:bench", ttl, Utc::now()).unwrap().unwrap();
        b.iter(|| {
            black_box(leases.acquire("content:bench", ttl, Utc::now()).unwrap());
        });
    });

    group.finish();
}

fn bench_backoff_schedule(c: &mut Criterion) {
    let policy = RetryPolicy::default();
    c.bench_function("linear_backoff_delays", |b| {
        b.iter(|| {
            for attempt in 1..=policy.max_attempts {
                black_box(policy.delay_for_attempt(black_box(attempt)));
            }
        });
    });
}

criterion_group!(
    benches,
    bench_enqueue_latency,
    bench_pipeline_throughput,
    bench_duplicate_guard,
    bench_backoff_schedule
);
criterion_main!(benches);
