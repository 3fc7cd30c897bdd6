use std::time::Duration;

use serde::Serialize;

use super::case::CaseOutcome;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    pub min_ms: f64,
    pub max_ms: f64,
    pub avg_ms: f64,
    pub p95_ms: f64,
}

impl LatencySummary {
    /// Zeroes for an empty sample. p95 is the element at `floor(n * 0.95)`, clamped.
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len();
        let p95_index = ((n as f64 * 0.95) as usize).min(n - 1);
        Self {
            min_ms: sorted[0],
            max_ms: sorted[n - 1],
            avg_ms: sorted.iter().sum::<f64>() / n as f64,
            p95_ms: sorted[p95_index],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkReport {
    pub samples: usize,
    pub concurrency: usize,
    pub latency: LatencySummary,
    /// Cases per second over the whole run.
    pub throughput: f64,
    pub success_rate: f64,
    pub elapsed_ms: f64,
}

impl BenchmarkReport {
    pub fn from_outcomes(outcomes: &[CaseOutcome], concurrency: usize, elapsed: Duration) -> Self {
        let samples = outcomes.len();
        let durations: Vec<f64> = outcomes.iter().map(|o| o.duration_ms).collect();
        let successes = outcomes.iter().filter(|o| o.is_success()).count();
        let secs = elapsed.as_secs_f64();

        Self {
            samples,
            concurrency,
            latency: LatencySummary::from_samples(&durations),
            throughput: if secs > 0.0 { samples as f64 / secs } else { 0.0 },
            success_rate: if samples > 0 {
                successes as f64 / samples as f64
            } else {
                0.0
            },
            elapsed_ms: secs * 1000.0,
        }
    }
}
