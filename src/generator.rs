/* generator.rs

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

use crate::collector::RecordCollector;
use crate::config::Load;
use crate::extract::{self, ERROR_STATUS, EXECUTION_TIME_HEADER};
use anyhow::Context;
use reqwest::{Client, Method, StatusCode};
use spdlog::{debug, info, warn};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;

/// Progress is reported every this many iterations.
const PROGRESS_EVERY: usize = 10;

/// Outcome of one timed request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestRecord {
    /// 1-based batch index.
    pub batch: usize,
    /// 1-based iteration index within the batch.
    pub iteration: usize,
    /// Issue time, seconds since the Unix epoch.
    pub timestamp: f64,
    pub latency_ms: f64,
    /// Function-reported execution time; `None` when not reported.
    pub function_execution_ms: Option<f64>,
    pub function_status: String,
    pub success: bool,
    /// HTTP status, 0 when no response was received.
    pub status_code: u16,
}

impl RequestRecord {
    /// A record for a request that did not succeed. Failed records never
    /// carry an execution time.
    pub fn failed(
        batch: usize,
        iteration: usize,
        timestamp: f64,
        latency_ms: f64,
        status_code: u16,
    ) -> Self {
        Self {
            batch,
            iteration,
            timestamp,
            latency_ms,
            function_execution_ms: None,
            function_status: ERROR_STATUS.to_string(),
            success: false,
            status_code,
        }
    }
}

pub(crate) fn epoch_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

pub(crate) fn millis(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}

/// Issues batches of timed requests against one endpoint.
pub struct LoadGenerator {
    config: Load,
    client: Client,
    method: Method,
    body: serde_json::Value,
}

impl LoadGenerator {
    /// Validates the method and body up front so a bad configuration fails
    /// before any signal is sent.
    pub fn new(config: Load) -> anyhow::Result<Self> {
        let method = Method::from_bytes(config.method.to_uppercase().as_bytes())
            .with_context(|| format!("invalid HTTP method {:?}", config.method))?;
        let body = serde_json::from_str(&config.body).context("load.body is not valid JSON")?;
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            config,
            client,
            method,
            body,
        })
    }

    pub fn config(&self) -> &Load {
        &self.config
    }

    /// Performs one request and times it up to the end of the body.
    pub async fn request(&self, batch: usize, iteration: usize) -> RequestRecord {
        let timestamp = epoch_secs();
        let start = Instant::now();

        let response = match self
            .client
            .request(self.method.clone(), &self.config.url)
            .json(&self.body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!("Request {}/{} failed: {}", batch, iteration, e);
                return RequestRecord::failed(batch, iteration, timestamp, millis(start.elapsed()), 0);
            }
        };

        let status = response.status();
        let header = response
            .headers()
            .get(EXECUTION_TIME_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let body = response.bytes().await;
        let latency_ms = millis(start.elapsed());

        let body = match body {
            Ok(body) => body,
            Err(e) => {
                debug!("Request {}/{}: body read failed: {}", batch, iteration, e);
                return RequestRecord::failed(batch, iteration, timestamp, latency_ms, status.as_u16());
            }
        };

        if status != StatusCode::OK {
            debug!("Request {}/{}: status {}", batch, iteration, status);
            return RequestRecord::failed(batch, iteration, timestamp, latency_ms, status.as_u16());
        }

        let extraction = extract::extract(header.as_deref(), &body);
        RequestRecord {
            batch,
            iteration,
            timestamp,
            latency_ms,
            function_execution_ms: extraction.execution_ms,
            function_status: extraction.status,
            success: true,
            status_code: status.as_u16(),
        }
    }

    /// Runs all batches, pausing between them, until done or cancelled.
    ///
    /// A request still in flight when `cancel` fires is abandoned and not
    /// recorded.
    pub async fn run(&self, cancel: &CancellationToken) -> RecordCollector {
        let batches = self.config.batches;
        let iterations = self.config.iterations;
        let mut collector = RecordCollector::with_capacity(self.config.total_requests());

        collector.record_start();
        'batches: for batch in 1..=batches {
            info!("Starting batch {}/{}", batch, batches);

            for iteration in 1..=iterations {
                let record = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        warn!("Load interrupted in batch {} at iteration {}", batch, iteration);
                        break 'batches;
                    }
                    record = self.request(batch, iteration) => record,
                };
                collector.insert(record);

                if iteration % PROGRESS_EVERY == 0 {
                    info!("  {}/{} iterations completed", iteration, iterations);
                }
            }

            if batch < batches {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        warn!("Load interrupted during pause after batch {}", batch);
                        break 'batches;
                    }
                    _ = tokio::time::sleep(self.config.pause()) => {}
                }
            }
        }
        collector.record_end();

        collector
    }
}


/* generator.rs ends here */
