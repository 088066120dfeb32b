/* monitor.rs

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

use crate::collector::ResourceSummary;
use crate::config::Config;
use crate::host::{HostProbe, ProcessFilter};
use crate::sampler::{ResourceProbe, Sample, SamplingLoop};
use crate::session::{MonitoringSession, SessionState, StopReason};
use crate::signal::{self, SignalListener};
use crate::sink::ResultSink;
use anyhow::Context;
use spdlog::{info, warn};
use std::sync::Arc;
use std::time::Duration;

/// Drives one session on an already bound listener: waits for Start,
/// samples until Stop (or until the session is stopped locally) and
/// returns the samples.
///
/// A session stopped before Start arrives yields no samples.
pub async fn run_session<P>(
    listener: SignalListener,
    probe: P,
    interval: Duration,
    poll: Duration,
    session: Arc<MonitoringSession>,
) -> anyhow::Result<Vec<Sample>>
where
    P: ResourceProbe + 'static,
{
    session.advance(SessionState::WaitingForStart)?;
    let (mut rx, listener_task) = signal::spawn_listener(listener, poll, session.stop_token());

    info!("Monitor: waiting for START");
    if !signal::wait_for_start(&mut rx, &session).await {
        info!("Monitor: stopped before START");
        listener_task.abort();
        return Ok(Vec::new());
    }

    // A Stop racing in after Start has already moved the session to Stopped.
    if session.advance(SessionState::Sampling).is_err() {
        listener_task.abort();
        return Ok(Vec::new());
    }
    info!("Monitor: START received, sampling");

    let sampler = tokio::spawn(SamplingLoop::new(probe, interval).run(session.stop_token()));
    signal::listen_until_stop(&mut rx, &session).await;

    let samples = sampler.await.context("sampling task failed")?;
    listener_task.abort();
    Ok(samples)
}

/// Resource-monitor role.
pub struct Monitor {
    config: Config,
}

impl Monitor {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn start(&mut self) -> anyhow::Result<()> {
        let sync = &self.config.sync;
        let monitor = &self.config.monitor;

        let listener = SignalListener::bind(&sync.bind_addr, sync.port).await?;
        let filter = ProcessFilter::new(&monitor.process_name, monitor.cmdline_marker.as_deref());
        let probe = HostProbe::new(filter);
        let session = Arc::new(MonitoringSession::new());

        let interrupted = session.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping monitor");
                interrupted.stop(StopReason::Interrupt);
            }
        });

        let samples = run_session(
            listener,
            probe,
            monitor.interval(),
            sync.poll_timeout(),
            session.clone(),
        )
        .await?;

        if samples.is_empty() {
            warn!("Monitor: no samples collected, nothing to write");
            return Ok(());
        }

        let summary = ResourceSummary::from_samples(&samples, monitor.interval());
        println!("{}", summary);

        let sink = ResultSink::new(&self.config.output.dir);
        sink.write_samples(&samples)?;
        sink.write_resource_summary(&summary)?;
        info!(
            "Monitor: finished ({:?}) with {} samples",
            session.stop_reason(),
            samples.len()
        );
        Ok(())
    }
}

/* monitor.rs ends here */
