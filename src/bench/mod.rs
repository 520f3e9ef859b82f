//! # Benchmark Harness
//!
//! Timing, per-iteration aggregation, and formatted summary output for the
//! I/O benchmarks built around the store.
//!
//! Bandwidth is computed as `bytes / microseconds / 1.024 / 1.024`, which
//! yields MiB/s. The 1.024² divisor is part of the reporting contract —
//! downstream tooling parses these numbers — so it is spelled out rather
//! than folded into a single constant.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::fmt::Write as _;
use std::time::Instant;

use thiserror::Error;
use tracing::debug;

/// Fixed header of every formatted report.
const REPORT_HEADER: &str = "access,max(MiB/s),min(MiB/s),mean(MiB/s),total(MiB),total(Ops),iteration\n\
                             ------,----------,----------,-----------,-----------,----------,----------\n";

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Misuse of the benchmark clock.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum BenchError {
    /// `start` was called while the clock was already running.
    #[error("Benchmark already started")]
    AlreadyStarted,

    /// `stop` or `sofar` was called before `start`.
    #[error("Benchmark not started")]
    NotStarted,

    /// `duration` was called while the clock was still running.
    #[error("Benchmark still running")]
    StillRunning,
}

// ------------------------------------------------------------------------------------------------
// Summary
// ------------------------------------------------------------------------------------------------

/// Aggregate over every iteration recorded under one label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationSummary {
    /// Slowest iteration bandwidth in MiB/s.
    pub min_bw: f64,
    /// Mean of the per-iteration bandwidths in MiB/s.
    pub mean_bw: f64,
    /// Fastest iteration bandwidth in MiB/s.
    pub max_bw: f64,
    /// Number of iterations recorded under the label.
    pub iterations: usize,
    /// Sum of iteration byte counts (raw bytes, not MiB).
    pub total_bytes: f64,
    /// Sum of iteration operation counts.
    pub total_ops: f64,
}

// ------------------------------------------------------------------------------------------------
// Benchmark Core
// ------------------------------------------------------------------------------------------------

/// One recorded iteration.
#[derive(Debug, Clone, Copy)]
struct Iteration {
    micros: i64,
    bytes: f64,
    ops: f64,
}

impl Iteration {
    /// MiB/s, per the reporting contract.
    fn bandwidth(&self) -> f64 {
        self.bytes / self.micros as f64 / 1.024 / 1.024
    }
}

/// Wall-clock bracketing plus labelled iteration aggregation.
#[derive(Debug, Default)]
pub struct Benchmark {
    /// Set while the clock runs.
    started_at: Option<Instant>,

    /// Microseconds measured by the last completed start/stop bracket.
    elapsed_micros: i64,

    /// Recorded iterations; labels may repeat.
    iterations: Vec<(String, Iteration)>,
}

impl Benchmark {
    /// Creates an idle benchmark with no recorded iterations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the wall clock.
    pub fn start(&mut self) -> Result<(), BenchError> {
        if self.started_at.is_some() {
            return Err(BenchError::AlreadyStarted);
        }
        self.started_at = Some(Instant::now());
        Ok(())
    }

    /// Stops the wall clock. With `idempotent`, a stop without a running
    /// clock is ignored instead of reported.
    pub fn stop(&mut self, idempotent: bool) -> Result<(), BenchError> {
        match self.started_at.take() {
            Some(started) => {
                self.elapsed_micros = started.elapsed().as_micros() as i64;
                Ok(())
            }
            None if idempotent => {
                debug!("ignoring stop of a benchmark that is not running");
                Ok(())
            }
            None => Err(BenchError::NotStarted),
        }
    }

    /// Microseconds elapsed so far on a running clock.
    pub fn sofar(&self) -> Result<i64, BenchError> {
        match self.started_at {
            Some(started) => Ok(started.elapsed().as_micros() as i64),
            None => Err(BenchError::NotStarted),
        }
    }

    /// Microseconds measured by the last start/stop bracket.
    pub fn duration(&self) -> Result<i64, BenchError> {
        if self.started_at.is_some() {
            return Err(BenchError::StillRunning);
        }
        Ok(self.elapsed_micros)
    }

    /// Records one iteration under `label`.
    pub fn add_iteration(&mut self, label: &str, micros: i64, bytes: f64, ops: f64) {
        self.iterations
            .push((label.to_string(), Iteration { micros, bytes, ops }));
    }

    /// Aggregates every iteration recorded under `label`.
    ///
    /// With no matching iterations every field is zero; callers can tell
    /// by `iterations == 0`.
    pub fn summary(&self, label: &str) -> IterationSummary {
        let mut summary = IterationSummary {
            min_bw: 0.0,
            mean_bw: 0.0,
            max_bw: 0.0,
            iterations: 0,
            total_bytes: 0.0,
            total_ops: 0.0,
        };
        let mut total_bw = 0.0;

        for (name, iteration) in &self.iterations {
            if name != label {
                continue;
            }

            let bw = iteration.bandwidth();
            if summary.iterations == 0 {
                summary.min_bw = bw;
                summary.max_bw = bw;
            } else if bw < summary.min_bw {
                summary.min_bw = bw;
            } else if bw > summary.max_bw {
                summary.max_bw = bw;
            }

            summary.iterations += 1;
            total_bw += bw;
            summary.total_bytes += iteration.bytes;
            summary.total_ops += iteration.ops;
        }

        if summary.iterations > 0 {
            summary.mean_bw = total_bw / summary.iterations as f64;
        }

        summary
    }

    /// Renders the aggregate line for `label`; an empty label yields just
    /// the report header. `alias` replaces the label in the output when
    /// given.
    pub fn format_summary(&self, label: &str, alias: Option<&str>) -> String {
        if label.is_empty() {
            return REPORT_HEADER.to_string();
        }

        let summary = self.summary(label);
        let name = alias.unwrap_or(label);

        if summary.total_bytes <= 0.0 {
            return format!("{name}, FAILED\n");
        }

        format!(
            "{name},{:.2},{:.2},{:.2},{:.2},{:.0},{}\n",
            summary.max_bw,
            summary.min_bw,
            summary.mean_bw,
            summary.total_bytes / 1024.0 / 1024.0,
            summary.total_ops,
            summary.iterations,
        )
    }

    /// Renders one line per recorded iteration of `label`, preceded by the
    /// report header.
    pub fn format_iterations(&self, label: &str) -> String {
        let mut output = REPORT_HEADER.to_string();

        for (name, iteration) in &self.iterations {
            if name != label {
                continue;
            }

            let bw = iteration.bandwidth();
            let _ = writeln!(
                output,
                "{name},{bw:.2},{bw:.2},{bw:.2},{:.2},{:.0},1",
                iteration.bytes / 1024.0 / 1024.0,
                iteration.ops,
            );
        }

        output
    }

    /// Discards every recorded iteration.
    pub fn clear(&mut self) {
        self.iterations.clear();
    }
}
