/* sampler.rs

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

use chrono::{DateTime, Local};
use spdlog::{debug, error, info, warn};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Progress is reported every this many samples.
const PROGRESS_EVERY: u64 = 50;

/// One snapshot of host and function-process resource usage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sample {
    pub sample_id: u64,
    pub datetime: String,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub cpu_percent: f64,
    pub cpu_count: usize,
    pub cpu_freq_mhz: f64,
    pub ram_total_gb: f64,
    pub ram_used_gb: f64,
    pub ram_percent: f64,
    pub ram_available_gb: f64,
    pub swap_used_gb: f64,
    pub swap_percent: f64,
    pub load_avg_1min: f64,
    pub load_avg_5min: f64,
    pub load_avg_15min: f64,
    pub disk_read_mb: f64,
    pub disk_write_mb: f64,
    pub net_sent_mb: f64,
    pub net_recv_mb: f64,
    pub active_processes: usize,
    pub process_cpu_total: f64,
    pub process_memory_total_mb: f64,
}

/// Source of resource snapshots.
///
/// A probe fills in everything except `sample_id` and `datetime`, which the
/// sampling loop assigns. `collect` may block; the loop runs it on the
/// blocking pool.
pub trait ResourceProbe: Send {
    fn collect(&mut self) -> anyhow::Result<Sample>;
}

/// Formats an epoch timestamp as a local ISO-8601 date-time.
pub fn iso_datetime(timestamp: f64) -> String {
    let secs = timestamp.trunc() as i64;
    let nanos = (timestamp.fract() * 1e9) as u32;
    DateTime::from_timestamp(secs, nanos)
        .map(|utc| {
            utc.with_timezone(&Local)
                .format("%Y-%m-%dT%H:%M:%S%.6f")
                .to_string()
        })
        .unwrap_or_default()
}

/// Fixed-period sampling loop.
///
/// Ticks are scheduled from the loop's own start, so a slow collection does
/// not push later ticks back; ticks that are missed entirely are skipped.
pub struct SamplingLoop<P> {
    probe: P,
    interval: Duration,
}

impl<P: ResourceProbe + 'static> SamplingLoop<P> {
    pub fn new(probe: P, interval: Duration) -> Self {
        Self { probe, interval }
    }

    /// Samples until `stop` is cancelled and returns the collected sequence.
    ///
    /// The flag is checked once per tick, so the loop exits at most one
    /// interval plus one collection after the flag is raised. A failed
    /// collection only loses its own tick.
    pub async fn run(self, stop: CancellationToken) -> Vec<Sample> {
        info!("Sampling every {:?}", self.interval);

        let mut probe = self.probe;

        let mut ticker = interval_at(Instant::now(), self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut samples: Vec<Sample> = Vec::new();
        let mut next_id: u64 = 0;

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let collected = tokio::task::spawn_blocking(move || {
                let result = probe.collect();
                (probe, result)
            })
            .await;
            let result = match collected {
                Ok((returned, result)) => {
                    probe = returned;
                    result
                }
                Err(e) => {
                    error!("Sampling: collection task failed, stopping: {}", e);
                    break;
                }
            };

            let mut sample = match result {
                Ok(sample) => sample,
                Err(e) => {
                    warn!("Sampling: skipping tick: {:#}", e);
                    continue;
                }
            };

            if let Some(last) = samples.last() {
                if sample.timestamp <= last.timestamp {
                    debug!(
                        "Sampling: dropping sample at {} (not after {})",
                        sample.timestamp, last.timestamp
                    );
                    continue;
                }
            }

            sample.sample_id = next_id;
            sample.datetime = iso_datetime(sample.timestamp);
            samples.push(sample);
            next_id += 1;

            if next_id % PROGRESS_EVERY == 0 {
                info!("Samples collected: {}", next_id);
            }
        }

        info!("Sampling stopped after {} samples", samples.len());
        samples
    }
}


/* sampler.rs ends here */
