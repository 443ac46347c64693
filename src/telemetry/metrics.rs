// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-process counters for runs, directives and connections.
//!
//! Nothing is exported; [`MetricsSnapshot::format_report`] is logged when the
//! telemetry guard drops.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::scheduler::RunState;

/// Process-wide collector.
pub static GLOBAL_METRICS: Lazy<Metrics> = Lazy::new(Metrics::new);

/// Upper bounds of the latency buckets, in milliseconds. Model turns dominate,
/// so the scale runs up to a minute.
const BUCKET_BOUNDS_MS: [u64; 6] = [1, 10, 100, 1_000, 10_000, 60_000];

#[derive(Debug)]
pub struct Metrics {
    directives: DashMap<String, LatencyStats>,
    operations: DashMap<String, LatencyStats>,
    counters: Counters,
    started: Instant,
}

#[derive(Debug, Default)]
struct Counters {
    completed: AtomicU64,
    cancelled: AtomicU64,
    failed: AtomicU64,
    chunks: AtomicU64,
    connections: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
}

impl Counters {
    fn all(&self) -> [&AtomicU64; 7] {
        [
            &self.completed,
            &self.cancelled,
            &self.failed,
            &self.chunks,
            &self.connections,
            &self.input_tokens,
            &self.output_tokens,
        ]
    }
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

fn get(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            directives: DashMap::new(),
            operations: DashMap::new(),
            counters: Counters::default(),
            started: Instant::now(),
        }
    }

    /// Time spent in one scheduler directive (`run_step`, `spawn_child`).
    pub fn record_directive(&self, name: &str, duration: Duration, success: bool) {
        self.directives
            .entry(name.to_owned())
            .or_default()
            .observe(duration, success);
    }

    /// Wall time of a named operation that has no failure notion, e.g. a whole prompt.
    pub fn record_operation(&self, name: &str, duration: Duration) {
        self.operations
            .entry(name.to_owned())
            .or_default()
            .observe(duration, true);
    }

    /// Count a run that reached a terminal state. Non-terminal states are ignored.
    pub fn record_run(&self, state: RunState) {
        let counter = match state {
            RunState::Completed => &self.counters.completed,
            RunState::Cancelled => &self.counters.cancelled,
            RunState::Failed => &self.counters.failed,
            RunState::Ready | RunState::Running | RunState::AwaitingChild => return,
        };
        bump(counter, 1);
    }

    pub fn record_chunk(&self) {
        bump(&self.counters.chunks, 1);
    }

    pub fn record_connection(&self) {
        bump(&self.counters.connections, 1);
    }

    pub fn record_tokens(&self, input: u64, output: u64) {
        bump(&self.counters.input_tokens, input);
        bump(&self.counters.output_tokens, output);
    }

    pub fn directive_metrics(&self, name: &str) -> Option<LatencyStats> {
        self.directives.get(name).map(|stats| stats.clone())
    }

    pub fn operation_metrics(&self, name: &str) -> Option<LatencyStats> {
        self.operations.get(name).map(|stats| stats.clone())
    }

    /// `(completed, cancelled, failed)`
    pub fn run_counts(&self) -> (u64, u64, u64) {
        (
            get(&self.counters.completed),
            get(&self.counters.cancelled),
            get(&self.counters.failed),
        )
    }

    /// `(input, output)`
    pub fn token_counts(&self) -> (u64, u64) {
        (get(&self.counters.input_tokens), get(&self.counters.output_tokens))
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let collect = |map: &DashMap<String, LatencyStats>| {
            map.iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect::<BTreeMap<_, _>>()
        };
        let (runs_completed, runs_cancelled, runs_failed) = self.run_counts();
        let (input_tokens, output_tokens) = self.token_counts();

        MetricsSnapshot {
            directives: collect(&self.directives),
            operations: collect(&self.operations),
            runs_completed,
            runs_cancelled,
            runs_failed,
            chunks: get(&self.counters.chunks),
            connections: get(&self.counters.connections),
            input_tokens,
            output_tokens,
            uptime: self.uptime(),
        }
    }

    /// Zero every counter and forget all timings. Uptime keeps running.
    pub fn reset(&self) {
        self.directives.clear();
        self.operations.clear();
        for counter in self.counters.all() {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency and outcome tally for one directive or operation name.
#[derive(Debug, Clone)]
pub struct LatencyStats {
    pub count: u64,
    pub failures: u64,
    pub total: Duration,
    pub fastest: Duration,
    pub slowest: Duration,
    /// One slot per entry of the bucket bounds plus a final overflow slot.
    buckets: [u64; BUCKET_BOUNDS_MS.len() + 1],
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self {
            count: 0,
            failures: 0,
            total: Duration::ZERO,
            fastest: Duration::MAX,
            slowest: Duration::ZERO,
            buckets: [0; BUCKET_BOUNDS_MS.len() + 1],
        }
    }
}

impl LatencyStats {
    pub fn observe(&mut self, duration: Duration, success: bool) {
        self.count += 1;
        if !success {
            self.failures += 1;
        }
        self.total += duration;
        self.fastest = self.fastest.min(duration);
        self.slowest = self.slowest.max(duration);

        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        let slot = BUCKET_BOUNDS_MS
            .iter()
            .position(|&bound| millis <= bound)
            .unwrap_or(BUCKET_BOUNDS_MS.len());
        self.buckets[slot] += 1;
    }

    pub fn mean(&self) -> Duration {
        match u32::try_from(self.count) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.total / n,
            Err(_) => Duration::from_secs_f64(self.total.as_secs_f64() / self.count as f64),
        }
    }

    /// Fraction of observations that succeeded; 1.0 when nothing was observed.
    pub fn success_ratio(&self) -> f64 {
        if self.count == 0 {
            return 1.0;
        }
        (self.count - self.failures) as f64 / self.count as f64
    }

    /// Observations per bucket, overflow last.
    pub fn bucket_counts(&self) -> &[u64] {
        &self.buckets
    }

    /// Upper bound of the bucket holding the `pct`th percentile. Overflow
    /// observations report the slowest value seen.
    pub fn quantile(&self, pct: f64) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        let rank = ((self.count as f64) * pct / 100.0).ceil().max(1.0) as u64;
        let mut seen = 0;
        for (slot, hits) in self.buckets.iter().enumerate() {
            seen += hits;
            if seen >= rank {
                return BUCKET_BOUNDS_MS
                    .get(slot)
                    .map(|&ms| Duration::from_millis(ms))
                    .unwrap_or(self.slowest);
            }
        }
        self.slowest
    }

    pub fn p99(&self) -> Duration {
        self.quantile(99.0)
    }
}

/// Point-in-time copy of [`Metrics`], names sorted.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub directives: BTreeMap<String, LatencyStats>,
    pub operations: BTreeMap<String, LatencyStats>,
    pub runs_completed: u64,
    pub runs_cancelled: u64,
    pub runs_failed: u64,
    pub chunks: u64,
    pub connections: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub uptime: Duration,
}

impl MetricsSnapshot {
    pub fn format_report(&self) -> String {
        let mut out = String::from("relay metrics\n");
        let _ = writeln!(out, "  uptime       {:.2?}", self.uptime);
        let _ = writeln!(out, "  connections  {}", self.connections);
        let _ = writeln!(
            out,
            "  runs         completed={} cancelled={} failed={}",
            self.runs_completed, self.runs_cancelled, self.runs_failed
        );
        let _ = writeln!(out, "  chunks       {}", self.chunks);
        let _ = writeln!(
            out,
            "  tokens       in={} out={}",
            self.input_tokens, self.output_tokens
        );

        for (heading, table) in [("directives", &self.directives), ("operations", &self.operations)] {
            if table.is_empty() {
                continue;
            }
            let _ = writeln!(out, "  {}:", heading);
            for (name, stats) in table {
                let _ = writeln!(
                    out,
                    "    {:<12} n={} ok={:.0}% mean={:.2?} p99<={:.2?}",
                    name,
                    stats.count,
                    stats.success_ratio() * 100.0,
                    stats.mean(),
                    stats.p99()
                );
            }
        }

        out
    }
}
