//! Request, model, cache and error accounting for one pipeline instance.
//!
//! A [`MetricsRegistry`] is constructed explicitly and shared by `Arc` with the
//! components that feed it. [`MetricsRegistry::summary`] is the structured view
//! and [`MetricsRegistry::render`] the plain-text exposition.


use std::collections::{BTreeMap, VecDeque};
use std::fmt::Write as _;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

/// Most recent error records kept for the summary.
pub const RECENT_ERROR_CAPACITY: usize = 50;

const METRIC_PREFIX: &str = "kestrel";

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RequestTotals {
    pub total: u64,
    pub success: u64,
    pub error: u64,
    /// Percentage, `0.0` before the first request.
    pub success_rate: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ResponseTimes {
    pub count: u64,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CallCounts {
    pub success: u64,
    pub error: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HitMiss {
    pub hits: u64,
    pub misses: u64,
}

impl HitMiss {
    /// Percentage, `0.0` before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        percentage(self.hits, self.hits + self.misses)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub error_type: String,
    pub model: Option<String>,
    pub detail: String,
    /// RFC 3339.
    pub at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub uptime_secs: u64,
    pub uptime: String,
    pub requests: RequestTotals,
    pub response_times: ResponseTimes,
    /// Route class → reply kind → count.
    pub requests_by_method: BTreeMap<String, BTreeMap<String, u64>>,
    pub models: BTreeMap<String, CallCounts>,
    pub cache: BTreeMap<String, HitMiss>,
    /// Percentage over every cache type.
    pub cache_hit_rate: f64,
    pub errors: BTreeMap<String, u64>,
    /// Newest last.
    pub recent_errors: Vec<ErrorRecord>,
    pub components: BTreeMap<String, bool>,
    pub performance: BTreeMap<String, f64>,
}

#[derive(Debug, Default)]
struct MetricsState {
    requests: RequestTotals,
    response_count: u64,
    response_sum_ms: f64,
    response_min_ms: Option<f64>,
    response_max_ms: f64,
    by_method: BTreeMap<String, BTreeMap<String, u64>>,
    models: BTreeMap<String, CallCounts>,
    cache: BTreeMap<String, HitMiss>,
    errors: BTreeMap<String, u64>,
    recent_errors: VecDeque<ErrorRecord>,
    components: BTreeMap<String, bool>,
    performance: BTreeMap<String, f64>,
}

pub struct MetricsRegistry {
    started: Instant,
    state: Mutex<MetricsState>,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MetricsRegistry")
            .field("requests", &state.requests.total)
            .field("errors", &state.errors.values().sum::<u64>())
            .finish_non_exhaustive()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            state: Mutex::new(MetricsState::default()),
        }
    }

    /// One handled case. `method` is the route class and `status` the reply kind.
    pub fn record_request(&self, method: &str, status: &str, success: bool, elapsed: Duration) {
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let mut state = self.state.lock();

        state.requests.total += 1;
        if success {
            state.requests.success += 1;
        } else {
            state.requests.error += 1;
        }
        state.requests.success_rate = percentage(state.requests.success, state.requests.total);

        state.response_count += 1;
        state.response_sum_ms += elapsed_ms;
        state.response_min_ms = Some(
            state
                .response_min_ms
                .map_or(elapsed_ms, |min| min.min(elapsed_ms)),
        );
        state.response_max_ms = state.response_max_ms.max(elapsed_ms);

        *state
            .by_method
            .entry(method.to_string())
            .or_default()
            .entry(status.to_string())
            .or_default() += 1;
    }

    /// One model in a failover chain answered, or finally failed.
    pub fn record_model_call(&self, model: &str, success: bool) {
        let mut state = self.state.lock();
        let counts = state.models.entry(model.to_string()).or_default();
        if success {
            counts.success += 1;
        } else {
            counts.error += 1;
        }
    }

    pub fn record_cache(&self, cache: &str, hit: bool) {
        let mut state = self.state.lock();
        let counts = state.cache.entry(cache.to_string()).or_default();
        if hit {
            counts.hits += 1;
        } else {
            counts.misses += 1;
        }
    }

    pub fn record_error(&self, error_type: &str, model: Option<&str>, detail: impl Into<String>) {
        let record = ErrorRecord {
            error_type: error_type.to_string(),
            model: model.map(str::to_string),
            detail: detail.into(),
            at: chrono::Utc::now().to_rfc3339(),
        };
        let mut state = self.state.lock();
        *state.errors.entry(record.error_type.clone()).or_default() += 1;
        if state.recent_errors.len() == RECENT_ERROR_CAPACITY {
            state.recent_errors.pop_front();
        }
        state.recent_errors.push_back(record);
    }

    pub fn set_component_status(&self, component: &str, healthy: bool) {
        self.state
            .lock()
            .components
            .insert(component.to_string(), healthy);
    }

    pub fn set_performance(&self, metric: &str, value: f64) {
        self.state
            .lock()
            .performance
            .insert(metric.to_string(), value);
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn summary(&self) -> MetricsSummary {
        let uptime = self.uptime();
        let state = self.state.lock();

        let response_times = if state.response_count == 0 {
            ResponseTimes::default()
        } else {
            ResponseTimes {
                count: state.response_count,
                avg_ms: state.response_sum_ms / state.response_count as f64,
                min_ms: state.response_min_ms.unwrap_or_default(),
                max_ms: state.response_max_ms,
            }
        };
        let (hits, lookups) = state
            .cache
            .values()
            .fold((0, 0), |(h, n), c| (h + c.hits, n + c.hits + c.misses));

        MetricsSummary {
            uptime_secs: uptime.as_secs(),
            uptime: format_uptime(uptime),
            requests: state.requests,
            response_times,
            requests_by_method: state.by_method.clone(),
            models: state.models.clone(),
            cache: state.cache.clone(),
            cache_hit_rate: percentage(hits, lookups),
            errors: state.errors.clone(),
            recent_errors: state.recent_errors.iter().cloned().collect(),
            components: state.components.clone(),
            performance: state.performance.clone(),
        }
    }

    /// Text exposition, one `name{labels} value` sample per line.
    pub fn render(&self) -> String {
        let summary = self.summary();
        let mut out = String::new();

        sample(&mut out, "uptime_seconds", &[], summary.uptime_secs as f64);
        for (method, statuses) in &summary.requests_by_method {
            for (status, count) in statuses {
                sample(
                    &mut out,
                    "requests_total",
                    &[("method", method), ("status", status)],
                    *count as f64,
                );
            }
        }
        sample(&mut out, "response_time_avg_ms", &[], summary.response_times.avg_ms);
        for (model, counts) in &summary.models {
            for (status, count) in [("success", counts.success), ("error", counts.error)] {
                sample(
                    &mut out,
                    "model_calls_total",
                    &[("model", model), ("status", status)],
                    count as f64,
                );
            }
        }
        for (cache, counts) in &summary.cache {
            for (result, count) in [("hit", counts.hits), ("miss", counts.misses)] {
                sample(
                    &mut out,
                    "cache_lookups_total",
                    &[("type", cache), ("result", result)],
                    count as f64,
                );
            }
        }
        for (error_type, count) in &summary.errors {
            sample(&mut out, "errors_total", &[("type", error_type)], *count as f64);
        }
        for (component, healthy) in &summary.components {
            let up = if *healthy { 1.0 } else { 0.0 };
            sample(&mut out, "component_up", &[("component", component)], up);
        }
        for (metric, value) in &summary.performance {
            sample(&mut out, "performance", &[("metric", metric)], *value);
        }
        out
    }
}

fn sample(out: &mut String, name: &str, labels: &[(&str, &str)], value: f64) {
    let _ = write!(out, "{METRIC_PREFIX}_{name}");
    if !labels.is_empty() {
        let rendered: Vec<String> = labels
            .iter()
            .map(|(k, v)| format!("{k}=\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\"")))
            .collect();
        let _ = write!(out, "{{{}}}", rendered.join(","));
    }
    let _ = writeln!(out, " {value}");
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Coarsest units first, e.g. `1天2小时3分钟`, `5分钟7秒`, `9秒`.
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let days = secs / 86_400;
    let hours = secs % 86_400 / 3_600;
    let minutes = secs % 3_600 / 60;
    let seconds = secs % 60;
    if days > 0 {
        format!("{days}天{hours}小时{minutes}分钟")
    } else if hours > 0 {
        format!("{hours}小时{minutes}分钟")
    } else if minutes > 0 {
        format!("{minutes}分钟{seconds}秒")
    } else {
        format!("{seconds}秒")
    }
}
