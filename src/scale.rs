/* scale.rs

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

//! Periodic collection of device-registry and cluster state during a
//! scalability scenario.

use crate::collector::{mean, Summary};
use crate::config::Config;
use crate::extract::lenient;
use crate::generator::millis;
use crate::pods::{self, PodResources};
use crate::sink::ResultSink;
use anyhow::Context;
use chrono::Local;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use spdlog::{debug, info, warn};
use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Connection state counted towards "all enrolled".
const ENROLLED: &str = "Enrolled";

/// A named scenario and its expected size.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub name: String,
    pub devices: usize,
    pub gateways: usize,
    pub duration: Duration,
    pub interval: Duration,
}

impl Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} devices, {} gateways, {:?} every {:?}",
            self.name, self.devices, self.gateways, self.duration, self.interval
        )
    }
}

#[derive(Debug, Default, Deserialize)]
struct DeviceList {
    #[serde(default, deserialize_with = "lenient")]
    devices: Option<Vec<Device>>,
}

#[derive(Debug, Default, Deserialize)]
struct Device {
    #[serde(default, deserialize_with = "lenient")]
    gateway: Option<String>,
    #[serde(default, rename = "mcuType", deserialize_with = "lenient")]
    mcu_type: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    status: Option<String>,
}

/// Registry snapshot, counted three ways.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceStats {
    pub total_devices: usize,
    pub gateway_distribution: BTreeMap<String, usize>,
    pub mcu_types: BTreeMap<String, usize>,
    pub connection_states: BTreeMap<String, usize>,
}

impl DeviceStats {
    pub fn enrolled(&self) -> usize {
        self.connection_states.get(ENROLLED).copied().unwrap_or(0)
    }
}

/// Parses a device-registry response. `None` when the document has no
/// `devices` list.
pub fn analyze_devices(raw: &[u8]) -> Option<DeviceStats> {
    let list: DeviceList = serde_json::from_slice(raw).ok()?;
    let devices = list.devices?;

    let mut stats = DeviceStats {
        total_devices: devices.len(),
        ..DeviceStats::default()
    };
    for device in devices {
        *stats
            .gateway_distribution
            .entry(device.gateway.unwrap_or_else(|| "none".to_string()))
            .or_insert(0) += 1;
        *stats
            .mcu_types
            .entry(device.mcu_type.unwrap_or_else(|| "unknown".to_string()))
            .or_insert(0) += 1;
        *stats
            .connection_states
            .entry(device.status.unwrap_or_else(|| "unknown".to_string()))
            .or_insert(0) += 1;
    }
    Some(stats)
}

/// Latency and throughput of one burst of API requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApiStats {
    pub latencies_ms: Vec<f64>,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub throughput_rps: f64,
    pub requests: usize,
    pub window_s: f64,
}

/// Issues `requests` sequential GETs against `url`. Failed requests still
/// contribute the time until they failed.
pub async fn measure_api_latency(client: &Client, url: &str, requests: usize) -> ApiStats {
    let mut latencies = Vec::with_capacity(requests);
    let window = Instant::now();

    for _ in 0..requests {
        let start = Instant::now();
        match client.get(url).send().await {
            Ok(response) => {
                let _ = response.bytes().await;
            }
            Err(e) => debug!("API probe failed: {}", e),
        }
        latencies.push(millis(start.elapsed()));
    }

    let window_s = window.elapsed().as_secs_f64();
    let summary = Summary::from_values(&latencies);
    ApiStats {
        min: summary.min,
        max: summary.max,
        avg: summary.mean,
        p50: summary.median,
        p95: summary.p95,
        p99: summary.p99,
        throughput_rps: if window_s > 0.0 {
            requests as f64 / window_s
        } else {
            0.0
        },
        requests,
        window_s,
        latencies_ms: latencies,
    }
}

/// One collection round.
#[derive(Debug, Clone, Serialize)]
pub struct ScaleSample {
    /// 1-based.
    pub sample_id: usize,
    pub timestamp: String,
    pub elapsed_time: f64,
    pub device_stats: Option<DeviceStats>,
    pub pod_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_phases: Option<BTreeMap<String, usize>>,
    pub api_stats: ApiStats,
    pub resources: PodResources,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioConfig {
    pub num_devices: usize,
    pub num_gateways: usize,
    pub devices_per_gateway: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApiLatencySummary {
    pub avg: f64,
    pub p95: f64,
    pub p99: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResourceAverages {
    pub device_cpu_m_avg: f64,
    pub gateway_cpu_m_avg: f64,
    #[serde(rename = "device_mem_Mi_avg")]
    pub device_mem_mi_avg: f64,
    #[serde(rename = "gateway_mem_Mi_avg")]
    pub gateway_mem_mi_avg: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScaleSummary {
    pub total_samples: usize,
    pub avg_device_count: f64,
    pub min_device_count: usize,
    pub max_device_count: usize,
    pub final_gateway_distribution: BTreeMap<String, usize>,
    pub final_connection_states: BTreeMap<String, usize>,
    pub api_latency_ms: ApiLatencySummary,
    pub throughput_rps_avg: f64,
    /// Elapsed seconds at the first sample with every expected device
    /// registered and enrolled, or -1.
    pub time_to_all_enrolled_s: f64,
    pub resources: ResourceAverages,
}

impl ScaleSummary {
    pub fn from_samples(samples: &[ScaleSample], expected_devices: usize) -> Self {
        let counts: Vec<usize> = samples
            .iter()
            .filter_map(|s| s.device_stats.as_ref())
            .map(|d| d.total_devices)
            .collect();
        let counts_f: Vec<f64> = counts.iter().map(|c| *c as f64).collect();
        let final_stats = samples.last().and_then(|s| s.device_stats.clone()).unwrap_or_default();

        let api = |f: fn(&ApiStats) -> f64| -> f64 {
            mean(&samples.iter().map(|s| f(&s.api_stats)).collect::<Vec<_>>())
        };
        let res = |f: fn(&PodResources) -> u64| -> f64 {
            mean(&samples.iter().map(|s| f(&s.resources) as f64).collect::<Vec<_>>())
        };

        let time_to_all_enrolled_s = samples
            .iter()
            .find(|s| {
                s.device_stats.as_ref().is_some_and(|d| {
                    d.total_devices >= expected_devices && d.enrolled() >= expected_devices
                })
            })
            .map(|s| s.elapsed_time)
            .unwrap_or(-1.0);

        Self {
            total_samples: samples.len(),
            avg_device_count: mean(&counts_f),
            min_device_count: counts.iter().copied().min().unwrap_or(0),
            max_device_count: counts.iter().copied().max().unwrap_or(0),
            final_gateway_distribution: final_stats.gateway_distribution,
            final_connection_states: final_stats.connection_states,
            api_latency_ms: ApiLatencySummary {
                avg: api(|a| a.avg),
                p95: api(|a| a.p95),
                p99: api(|a| a.p99),
            },
            throughput_rps_avg: api(|a| a.throughput_rps),
            time_to_all_enrolled_s,
            resources: ResourceAverages {
                device_cpu_m_avg: res(|r| r.device_cpu_m),
                gateway_cpu_m_avg: res(|r| r.gateway_cpu_m),
                device_mem_mi_avg: res(|r| r.device_mem_mi),
                gateway_mem_mi_avg: res(|r| r.gateway_mem_mi),
            },
        }
    }
}

/// Everything written for one scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct ScalabilityMetrics {
    pub scenario: String,
    pub timestamp: String,
    pub config: ScenarioConfig,
    pub samples: Vec<ScaleSample>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ScaleSummary>,
}

fn now_iso() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// Scalability role.
pub struct ScalabilityCollector {
    config: Config,
    scenario: Scenario,
    client: Client,
}

impl ScalabilityCollector {
    pub fn new(config: Config, scenario: Scenario) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.scale.probe_timeout())
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            config,
            scenario,
            client,
        })
    }

    async fn devices(&self) -> Option<DeviceStats> {
        let url = self.config.scale.devices_url();
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Device API unreachable: {}", e);
                return None;
            }
        };
        if response.status() != StatusCode::OK {
            warn!("Device API returned {}", response.status());
            return None;
        }
        let body = response.bytes().await.ok()?;
        let stats = analyze_devices(&body);
        if stats.is_none() {
            warn!("Device API response has no device list");
        }
        stats
    }

    /// Takes one sample; every source is optional.
    pub async fn sample(&self, sample_id: usize, started: Instant) -> ScaleSample {
        let scale = &self.config.scale;

        let device_stats = self.devices().await;
        let pods = pods::kubectl_pods(&scale.namespace).await;
        let api_stats =
            measure_api_latency(&self.client, &scale.devices_url(), scale.probe_requests).await;
        let resources = pods::kubectl_top(&scale.namespace).await.unwrap_or_default();

        let (pod_count, pod_phases) = match pods {
            Some((count, phases)) => (count, Some(phases)),
            None => (0, None),
        };

        ScaleSample {
            sample_id,
            timestamp: now_iso(),
            elapsed_time: started.elapsed().as_secs_f64(),
            device_stats,
            pod_count,
            pod_phases,
            api_stats,
            resources,
        }
    }

    /// Samples every interval until the scenario's duration has elapsed or
    /// `cancel` fires. A round is only started if the next wait would still
    /// end inside the duration.
    ///
    /// When the wait after a round would reach the duration, collection ends
    /// there. No extra back-to-back rounds are fired to fill the remainder, so
    /// a scenario yields `ceil(duration / interval)` rounds at most, and a
    /// single round when the interval is not shorter than the duration.
    pub async fn collect(&self, cancel: &CancellationToken) -> ScalabilityMetrics {
        let scenario = &self.scenario;
        let mut metrics = ScalabilityMetrics {
            scenario: scenario.name.clone(),
            timestamp: now_iso(),
            config: ScenarioConfig {
                num_devices: scenario.devices,
                num_gateways: scenario.gateways,
                devices_per_gateway: if scenario.gateways == 0 {
                    0.0
                } else {
                    scenario.devices as f64 / scenario.gateways as f64
                },
            },
            samples: Vec::new(),
            summary: None,
        };

        let started = Instant::now();
        while started.elapsed() < scenario.duration && !cancel.is_cancelled() {
            let round = Instant::now();
            let id = metrics.samples.len() + 1;
            info!("[{}] Collecting sample", id);

            let sample = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                sample = self.sample(id, started) => sample,
            };
            if let Some(stats) = &sample.device_stats {
                info!(
                    "  Devices: {} (enrolled {}), gateways {:?}",
                    stats.total_devices,
                    stats.enrolled(),
                    stats.gateway_distribution
                );
            }
            metrics.samples.push(sample);

            let wait = scenario.interval.saturating_sub(round.elapsed());
            if started.elapsed() + wait >= scenario.duration {
                break;
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        if !metrics.samples.is_empty() {
            metrics.summary = Some(ScaleSummary::from_samples(&metrics.samples, scenario.devices));
        }
        metrics
    }

    pub async fn start(&mut self) -> anyhow::Result<()> {
        info!("Collecting metrics for {}", self.scenario);

        let cancel = CancellationToken::new();
        let interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, saving collected samples");
                interrupt.cancel();
            }
        });

        let metrics = self.collect(&cancel).await;
        let sink = ResultSink::new(&self.config.output.dir);
        let path = sink.write_json("scalability_metrics", &metrics)?;

        println!("Scalability summary ({}):", path.display());
        match &metrics.summary {
            Some(summary) => {
                println!("  Samples collected: {}", summary.total_samples);
                println!("  Average devices:   {:.1}", summary.avg_device_count);
                println!("  Final distribution: {:?}", summary.final_gateway_distribution);
                println!("  API latency avg:   {:.2} ms", summary.api_latency_ms.avg);
                println!("  Time to enrolled:  {:.1} s", summary.time_to_all_enrolled_s);
            }
            None => println!("  No samples collected"),
        }
        Ok(())
    }
}


/* scale.rs ends here */
