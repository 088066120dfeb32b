/* client.rs

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

use crate::collector::LatencyReport;
use crate::config::Config;
use crate::generator::LoadGenerator;
use crate::message::SyncMessage;
use crate::signal;
use crate::sink::ResultSink;
use spdlog::{info, warn};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Sends Stop to the monitor exactly once, on whichever path leaves the
/// load run first.
///
/// [`StopGuard::fire`] is the normal path. If the guard is dropped while
/// still armed (early return or panic) the signal is sent from `Drop` with
/// a blocking socket.
pub struct StopGuard {
    host: String,
    port: u16,
    budget: Duration,
    armed: bool,
}

impl StopGuard {
    pub fn new(host: impl Into<String>, port: u16, budget: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            budget,
            armed: true,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Sends Stop and disarms the guard. Returns whether the monitor was
    /// reached; later calls do nothing and return `false`.
    pub async fn fire(&mut self) -> bool {
        if !self.armed {
            return false;
        }
        self.armed = false;

        let sent = signal::send(SyncMessage::Stop, &self.host, self.port, self.budget).await;
        if !sent {
            warn!(
                "Could not deliver STOP to {}:{}; stop the monitor manually",
                self.host, self.port
            );
        }
        sent
    }
}

impl Drop for StopGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;
        warn!("Load run ended early, sending STOP");
        if !signal::send_blocking(SyncMessage::Stop, &self.host, self.port, self.budget) {
            warn!("Could not deliver STOP to {}:{}", self.host, self.port);
        }
    }
}

/// Load-generator role: signals the monitor, drives the load and persists
/// the request records.
pub struct Client {
    config: Config,
}

impl Client {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn start(&mut self) -> anyhow::Result<()> {
        let sync = &self.config.sync;
        let generator = LoadGenerator::new(self.config.load.clone())?;
        let sink = ResultSink::new(&self.config.output.dir);

        let cancel = CancellationToken::new();
        let interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, finishing up");
                interrupt.cancel();
            }
        });

        info!("Client: signalling START to {}:{}", sync.host, sync.port);
        if !signal::send(SyncMessage::Start, &sync.host, sync.port, sync.connect_timeout()).await {
            warn!(
                "Could not reach monitor at {}:{}, running unsynchronized",
                sync.host, sync.port
            );
        }
        let mut guard = StopGuard::new(sync.host.clone(), sync.port, sync.connect_timeout());

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(sync.start_delay()) => {}
        }

        let load = generator.config();
        info!(
            "Client: {} batches x {} iterations against {}",
            load.batches, load.iterations, load.url
        );
        let collector = generator.run(&cancel).await;
        guard.fire().await;

        let report = LatencyReport::from_collector(&collector);
        println!("{}", report);

        sink.write_records(collector.records())?;
        sink.write_batch_summary(&report)?;
        info!("Client: test finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SignalListener;

    #[tokio::test]
    async fn guard_fires_once() {
        let listener = SignalListener::bind("127.0.0.1", 0).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let received = tokio::spawn(async move { listener.listen_once(Some(Duration::from_secs(5))).await });

        let mut guard = StopGuard::new("127.0.0.1", port, Duration::from_secs(2));
        assert!(guard.fire().await);
        assert!(!guard.is_armed());
        assert!(!guard.fire().await);
        assert_eq!(received.await.unwrap(), SyncMessage::Stop);
    }

    #[tokio::test]
    async fn dropped_guard_still_signals() {
        let listener = SignalListener::bind("127.0.0.1", 0).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let received = tokio::spawn(async move { listener.listen_once(Some(Duration::from_secs(5))).await });

        tokio::task::spawn_blocking(move || {
            let _guard = StopGuard::new("127.0.0.1", port, Duration::from_secs(2));
        })
        .await
        .unwrap();

        assert_eq!(received.await.unwrap(), SyncMessage::Stop);
    }

    #[tokio::test]
    async fn unreachable_monitor_does_not_fail_guard() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut guard = StopGuard::new("127.0.0.1", port, Duration::from_millis(500));
        assert!(!guard.fire().await);
        assert!(!guard.is_armed());
    }
}

/* client.rs ends here */
