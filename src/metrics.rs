//! Latency bookkeeping for generated and processed ticks.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;
use std::time::Instant;

use crate::feed::lock_recover;

/// Receiver of generation and processing events. The core only writes to it.
pub trait MetricsSink: Send + Sync {
    fn record_generation(&self, key: &str, at: Instant);

    fn record_processing(
        &self,
        key: &str,
        statistic: &str,
        generated_at: Instant,
        processed_at: Instant,
    );
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl MetricsSink for NullSink {
    fn record_generation(&self, _key: &str, _at: Instant) {}

    fn record_processing(
        &self,
        _key: &str,
        _statistic: &str,
        _generated_at: Instant,
        _processed_at: Instant,
    ) {
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencyStats {
    pub min_us: f64,
    pub max_us: f64,
    pub avg_us: f64,
    pub samples: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SystemStats {
    pub generations: u64,
    pub calculations: u64,
    pub uptime_secs: f64,
}

#[derive(Debug, Clone, Copy)]
struct LatencyAccumulator {
    min_us: f64,
    max_us: f64,
    sum_us: f64,
    samples: u64,
}

impl LatencyAccumulator {
    fn new() -> Self {
        Self {
            min_us: f64::INFINITY,
            max_us: f64::NEG_INFINITY,
            sum_us: 0.0,
            samples: 0,
        }
    }

    fn add(&mut self, latency_us: f64) {
        self.min_us = self.min_us.min(latency_us);
        self.max_us = self.max_us.max(latency_us);
        self.sum_us += latency_us;
        self.samples += 1;
    }

    fn stats(&self) -> Option<LatencyStats> {
        if self.samples == 0 {
            return None;
        }
        Some(LatencyStats {
            min_us: self.min_us,
            max_us: self.max_us,
            avg_us: self.sum_us / self.samples as f64,
            samples: self.samples,
        })
    }
}

#[derive(Debug, Default)]
struct MonitorState {
    // key -> statistic -> latencies
    latencies: BTreeMap<String, BTreeMap<String, LatencyAccumulator>>,
    last_generation: BTreeMap<String, Instant>,
    generations: u64,
    calculations: u64,
}

/// Thread-safe latency monitor: tick generation to statistic computation.
#[derive(Debug)]
pub struct LatencyMonitor {
    started: Instant,
    state: Mutex<MonitorState>,
}

impl Default for LatencyMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyMonitor {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            state: Mutex::new(MonitorState::default()),
        }
    }

    pub fn latency_stats(&self, key: &str, statistic: &str) -> Option<LatencyStats> {
        let state = lock_recover(&self.state, "monitor_state");
        state.latencies.get(key)?.get(statistic)?.stats()
    }

    pub fn last_generation(&self, key: &str) -> Option<Instant> {
        lock_recover(&self.state, "monitor_state")
            .last_generation
            .get(key)
            .copied()
    }

    pub fn system_stats(&self) -> SystemStats {
        let state = lock_recover(&self.state, "monitor_state");
        SystemStats {
            generations: state.generations,
            calculations: state.calculations,
            uptime_secs: self.started.elapsed().as_secs_f64(),
        }
    }

    pub fn report(&self) -> MonitorReport {
        let state = lock_recover(&self.state, "monitor_state");
        let uptime_secs = self.started.elapsed().as_secs_f64();
        let rows = state
            .latencies
            .iter()
            .flat_map(|(key, per_stat)| {
                per_stat.iter().filter_map(move |(statistic, acc)| {
                    acc.stats().map(|stats| LatencyRow {
                        key: key.clone(),
                        statistic: statistic.clone(),
                        stats,
                    })
                })
            })
            .collect();
        let rate = |n: u64| if uptime_secs > 0.0 { n as f64 / uptime_secs } else { 0.0 };
        MonitorReport {
            uptime_secs,
            generations: state.generations,
            calculations: state.calculations,
            generation_rate: rate(state.generations),
            calculation_rate: rate(state.calculations),
            rows,
        }
    }
}

impl MetricsSink for LatencyMonitor {
    fn record_generation(&self, key: &str, at: Instant) {
        let mut state = lock_recover(&self.state, "monitor_state");
        state.last_generation.insert(key.to_string(), at);
        state.generations += 1;
    }

    fn record_processing(
        &self,
        key: &str,
        statistic: &str,
        generated_at: Instant,
        processed_at: Instant,
    ) {
        let latency_us =
            processed_at.saturating_duration_since(generated_at).as_secs_f64() * 1_000_000.0;
        let mut state = lock_recover(&self.state, "monitor_state");
        state
            .latencies
            .entry(key.to_string())
            .or_default()
            .entry(statistic.to_string())
            .or_insert_with(LatencyAccumulator::new)
            .add(latency_us);
        state.calculations += 1;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LatencyRow {
    pub key: String,
    pub statistic: String,
    #[serde(flatten)]
    pub stats: LatencyStats,
}

/// Snapshot of the monitor, rows sorted by key then statistic.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorReport {
    pub uptime_secs: f64,
    pub generations: u64,
    pub calculations: u64,
    pub generation_rate: f64,
    pub calculation_rate: f64,
    pub rows: Vec<LatencyRow>,
}

impl fmt::Display for MonitorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Performance Report ===")?;
        writeln!(f, "Uptime: {:.1}s", self.uptime_secs)?;
        writeln!(f, "Generations: {} ({:.2}/s)", self.generations, self.generation_rate)?;
        writeln!(f, "Calculations: {} ({:.2}/s)", self.calculations, self.calculation_rate)?;
        writeln!(f)?;
        writeln!(
            f,
            "{:>10} {:>12} {:>10} {:>12} {:>12} {:>12}",
            "Symbol", "Statistic", "Samples", "Min (us)", "Max (us)", "Avg (us)"
        )?;
        writeln!(f, "{}", "-".repeat(73))?;
        for row in &self.rows {
            writeln!(
                f,
                "{:>10} {:>12} {:>10} {:>12.2} {:>12.2} {:>12.2}",
                row.key,
                row.statistic,
                row.stats.samples,
                row.stats.min_us,
                row.stats.max_us,
                row.stats.avg_us
            )?;
        }
        Ok(())
    }
}
