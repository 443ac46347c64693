// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Benchmarks for the liveness hot path.
//!
//! The oracle runs before every directive and between streamed chunks, so its
//! cost bounds chunk throughput:
//! - Verdicts against registries of growing size
//! - Start/cancel churn on the live-input registry
//! - A full echo run through the scheduler
//!
//! Run with: `cargo bench --bench oracle`

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;

use agent_relay::invoker::EchoInvoker;
use agent_relay::scheduler::{AgentCatalog, RunRequest, StepScheduler};
use agent_relay::{oracle, RuntimeContext};

fn populated(users: usize, inputs_per_user: usize) -> RuntimeContext {
    let ctx = RuntimeContext::new();
    for u in 0..users {
        let user = format!("user-{}", u);
        for r in 0..inputs_per_user {
            ctx.live_inputs.start_user_input(&user, &format!("req-{}-{}", u, r));
        }
    }
    ctx.sessions.set_connected("session", true);
    ctx
}

/// Benchmark verdicts as live inputs per user grow.
fn bench_is_live(c: &mut Criterion) {
    let mut group = c.benchmark_group("oracle_is_live");

    for inputs in [1usize, 4, 16, 64] {
        let ctx = populated(100, inputs);
        let child = format!("req-7-{}-context-pruner-abcdef12", inputs - 1);
        group.throughput(Throughput::Elements(1));

        group.bench_with_input(BenchmarkId::new("child_hit", inputs), &inputs, |b, _| {
            b.iter(|| black_box(oracle::is_live(&ctx, Some("user-7"), &child, Some("session"))));
        });

        group.bench_with_input(BenchmarkId::new("miss", inputs), &inputs, |b, _| {
            b.iter(|| black_box(oracle::is_live(&ctx, Some("user-7"), "other", Some("session"))));
        });
    }

    let ctx = populated(100, 4);
    group.bench_function("unknown_user", |b| {
        b.iter(|| black_box(oracle::is_live(&ctx, Some("nobody"), "req", Some("session"))));
    });
    group.bench_function("disconnected", |b| {
        b.iter(|| black_box(oracle::is_live(&ctx, Some("user-1"), "req-1-0", Some("gone"))));
    });

    group.finish();
}

/// Benchmark registry churn.
fn bench_registry(c: &mut Criterion) {
    let mut group = c.benchmark_group("live_inputs");

    group.bench_function("start_cancel", |b| {
        let ctx = RuntimeContext::new();
        b.iter(|| {
            ctx.live_inputs.start_user_input("u1", "r1");
            black_box(ctx.live_inputs.cancel_user_input("u1", "r1"))
        });
    });

    group.bench_function("start_duplicate", |b| {
        let ctx = RuntimeContext::new();
        ctx.live_inputs.start_user_input("u1", "r1");
        b.iter(|| ctx.live_inputs.start_user_input(black_box("u1"), black_box("r1")));
    });

    group.finish();
}

/// Benchmark a complete run with a spawned child.
fn bench_scheduler_run(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let ctx = Arc::new(RuntimeContext::embedded());
    let scheduler = StepScheduler::new(
        ctx,
        Arc::new(AgentCatalog::with_builtins()),
        Arc::new(EchoInvoker::new()),
    );

    c.bench_function("scheduler_base_single_step", |b| {
        b.to_async(&runtime).iter(|| async {
            let (tx, mut rx) = tokio::sync::mpsc::channel(256);
            let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });
            let outcome = scheduler
                .run(RunRequest::new("r1", "base-single-step", "bench prompt"), tx)
                .await;
            let _ = drain.await;
            black_box(outcome)
        });
    });
}

criterion_group!(benches, bench_is_live, bench_registry, bench_scheduler_run);
criterion_main!(benches);
