/* collector.rs

*
* Author: M.R.Siavash Katebzadeh <mr@katebzadeh.xyz>
* Keywords: Rust
* Version: 0.0.1
*
* This program is free software; you can redistribute it and/or modify
* it under the terms of the GNU General Public License as published by
* the Free Software Foundation, either version 3 of the License, or
* (at your option) any later version.
*
* This program is distributed in the hope that it will be useful,
* but WITHOUT ANY WARRANTY; without even the implied warranty of
* MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
* GNU General Public License for more details.
*
* You should have received a copy of the GNU General Public License
* along with this program.  If not, see <http://www.gnu.org/licenses/>.
*/

use crate::generator::RequestRecord;
use crate::sampler::Sample;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::time::{Duration, Instant};

/// Returns the value at quantile `q` of an ascending slice using the
/// nearest-rank rule: index `ceil(q * n) - 1`, clamped to the slice.
///
/// # Returns
/// `None` for an empty slice.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (sorted.len() as f64 * q).ceil() as i64 - 1;
    let index = rank.clamp(0, sorted.len() as i64 - 1) as usize;
    Some(sorted[index])
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Median of an ascending slice; the two middle values are averaged when
/// the length is even.
pub fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 1 => sorted[n / 2],
        _ => (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0,
    }
}

/// Sample standard deviation (divides by `n - 1`); zero below two values.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance =
        values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Descriptive statistics of one numeric sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
    pub p95: f64,
    pub p99: f64,
}

impl Summary {
    /// Summarizes `values` in any order. Empty input yields all zeros.
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let mut sorted = values.to_vec();
        sorted.sort_unstable_by(f64::total_cmp);

        Self {
            count: sorted.len(),
            mean: mean(&sorted),
            median: median(&sorted),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            std_dev: std_dev(&sorted),
            p95: quantile(&sorted, 0.95).unwrap_or_default(),
            p99: quantile(&sorted, 0.99).unwrap_or_default(),
        }
    }

    /// Like [`Summary::from_values`], ignoring NaN and infinite values.
    pub fn from_finite(values: impl IntoIterator<Item = f64>) -> Self {
        let finite: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
        Self::from_values(&finite)
    }
}

impl Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mean {:.2} | median {:.2} | min {:.2} | max {:.2} | std {:.2} | p95 {:.2} | p99 {:.2}",
            self.mean, self.median, self.min, self.max, self.std_dev, self.p95, self.p99
        )
    }
}

/// Collects request records together with the wall-clock span of the run.
#[derive(Debug, Default, Clone)]
pub struct RecordCollector {
    records: Vec<RequestRecord>,
    start: Option<Instant>,
    end: Option<Instant>,
}

impl RecordCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Records the start time. Later calls keep the first value.
    pub fn record_start(&mut self) {
        if self.start.is_none() {
            self.start = Some(Instant::now());
        }
    }

    pub fn record_end(&mut self) {
        self.end = Some(Instant::now());
    }

    pub fn insert(&mut self, record: RequestRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[RequestRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<RequestRecord> {
        self.records
    }

    /// Span between `record_start` and `record_end`, if both were called.
    pub fn duration(&self) -> Option<Duration> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some(end.saturating_duration_since(start)),
            _ => None,
        }
    }

    /// Completed requests per second over the recorded span.
    pub fn throughput(&self) -> Option<f64> {
        let secs = self.duration()?.as_secs_f64();
        (secs > 0.0).then(|| self.records.len() as f64 / secs)
    }
}

/// Statistics of one batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchStats {
    pub batch: usize,
    /// Successful requests in the batch.
    pub count: usize,
    pub failed: usize,
    pub latency: Summary,
    pub function_time: Summary,
}

/// Latency of successful records, and execution time of those that
/// reported one.
fn latency_and_function_time<'a>(
    records: impl IntoIterator<Item = &'a RequestRecord>,
) -> (Vec<f64>, Vec<f64>) {
    let mut latency = Vec::new();
    let mut function_time = Vec::new();
    for record in records.into_iter().filter(|r| r.success) {
        latency.push(record.latency_ms);
        if let Some(ms) = record.function_execution_ms.filter(|ms| *ms > 0.0) {
            function_time.push(ms);
        }
    }
    (latency, function_time)
}

/// Global and per-batch view of a load run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyReport {
    pub total: usize,
    pub successful: usize,
    pub success_rate: f64,
    pub duration_s: f64,
    pub throughput_rps: f64,
    pub latency: Summary,
    pub function_time: Summary,
    pub batches: Vec<BatchStats>,
}

impl LatencyReport {
    pub fn from_collector(collector: &RecordCollector) -> Self {
        Self::from_records(collector.records(), collector.duration().unwrap_or_default())
    }

    pub fn from_records(records: &[RequestRecord], duration: Duration) -> Self {
        let total = records.len();
        let successful = records.iter().filter(|r| r.success).count();
        let (latency, function_time) = latency_and_function_time(records);

        let mut by_batch: BTreeMap<usize, Vec<&RequestRecord>> = BTreeMap::new();
        for record in records {
            by_batch.entry(record.batch).or_default().push(record);
        }
        let batches = by_batch
            .into_iter()
            .map(|(batch, members)| {
                let (latency, function_time) = latency_and_function_time(members.iter().copied());
                BatchStats {
                    batch,
                    count: latency.len(),
                    failed: members.len() - latency.len(),
                    latency: Summary::from_values(&latency),
                    function_time: Summary::from_values(&function_time),
                }
            })
            .collect();

        let duration_s = duration.as_secs_f64();
        Self {
            total,
            successful,
            success_rate: if total == 0 {
                0.0
            } else {
                successful as f64 / total as f64 * 100.0
            },
            duration_s,
            throughput_rps: if duration_s > 0.0 {
                total as f64 / duration_s
            } else {
                0.0
            },
            latency: Summary::from_values(&latency),
            function_time: Summary::from_values(&function_time),
            batches,
        }
    }
}

impl Display for LatencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Load summary:")?;
        writeln!(
            f,
            "  Requests:   {} ({} successful, {:.1}%)",
            self.total, self.successful, self.success_rate
        )?;
        writeln!(f, "  Duration:   {:.2} s", self.duration_s)?;
        writeln!(f, "  Throughput: {:.2} req/s", self.throughput_rps)?;
        writeln!(f, "  Latency (ms):        {}", self.latency)?;
        if self.function_time.count > 0 {
            writeln!(f, "  Function time (ms):  {}", self.function_time)?;
        } else {
            writeln!(f, "  Function time (ms):  not reported")?;
        }
        for batch in &self.batches {
            writeln!(
                f,
                "  Batch {:>3}: {} ok, {} failed, latency mean {:.2} p95 {:.2}",
                batch.batch, batch.count, batch.failed, batch.latency.mean, batch.latency.p95
            )?;
        }
        Ok(())
    }
}

/// Aggregate of a sample sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResourceSummary {
    pub total_samples: usize,
    pub duration_seconds: f64,
    pub sampling_interval: f64,
    pub cpu: Summary,
    pub ram: Summary,
    pub ram_used_gb: Summary,
    pub load_avg: Summary,
}

impl ResourceSummary {
    pub fn from_samples(samples: &[Sample], interval: Duration) -> Self {
        let duration_seconds = match (samples.first(), samples.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => 0.0,
        };

        Self {
            total_samples: samples.len(),
            duration_seconds,
            sampling_interval: interval.as_secs_f64(),
            cpu: Summary::from_finite(samples.iter().map(|s| s.cpu_percent)),
            ram: Summary::from_finite(samples.iter().map(|s| s.ram_percent)),
            ram_used_gb: Summary::from_finite(samples.iter().map(|s| s.ram_used_gb)),
            load_avg: Summary::from_finite(samples.iter().map(|s| s.load_avg_1min)),
        }
    }
}

impl Display for ResourceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Resource summary:")?;
        writeln!(
            f,
            "  Samples:  {} over {:.2} s (every {:.3} s)",
            self.total_samples, self.duration_seconds, self.sampling_interval
        )?;
        writeln!(f, "  CPU %:    {}", self.cpu)?;
        writeln!(f, "  RAM %:    {}", self.ram)?;
        writeln!(f, "  RAM GB:   {}", self.ram_used_gb)?;
        writeln!(f, "  Load 1m:  {}", self.load_avg)
    }
}


/* collector.rs ends here */
