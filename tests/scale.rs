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

mod common;

use benchsync::config::Config;
use benchsync::scale::{ScalabilityCollector, Scenario};
use common::{Reply, Responder};
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn scenario(duration: Duration, interval: Duration) -> Scenario {
    Scenario {
        name: "2d_1g".to_string(),
        devices: 2,
        gateways: 1,
        duration,
        interval,
    }
}

fn config_for(server: &Responder) -> Config {
    let mut config = Config::default();
    config.scale.api_url = format!("http://127.0.0.1:{}/", server.port);
    config.scale.namespace = "benchsync-test-absent".to_string();
    config.scale.probe_requests = 3;
    config
}

#[tokio::test]
async fn collects_one_round_against_device_api() {
    let devices = json!({"devices": [
        {"gateway": "gateway-0", "mcuType": "nrf52", "status": "Enrolled"},
        {"gateway": "gateway-0", "mcuType": "nrf52", "status": "Enrolled"}
    ]})
    .to_string();
    let server = Responder::spawn(move |_| Reply::ok(devices.clone())).await;

    let collector = ScalabilityCollector::new(
        config_for(&server),
        scenario(Duration::from_secs(1), Duration::from_secs(5)),
    )
    .unwrap();
    let metrics = collector.collect(&CancellationToken::new()).await;

    assert_eq!(metrics.scenario, "2d_1g");
    assert_eq!(metrics.config.devices_per_gateway, 2.0);
    assert_eq!(metrics.samples.len(), 1);
    // One registry query plus the latency burst.
    assert_eq!(server.served(), 1 + 3);

    let sample = &metrics.samples[0];
    assert_eq!(sample.sample_id, 1);
    assert_eq!(sample.api_stats.latencies_ms.len(), 3);
    assert_eq!(sample.device_stats.as_ref().unwrap().total_devices, 2);

    let summary = metrics.summary.unwrap();
    assert_eq!(summary.total_samples, 1);
    assert_eq!(summary.final_gateway_distribution["gateway-0"], 2);
    assert!(summary.time_to_all_enrolled_s >= 0.0);
}

#[tokio::test]
async fn stops_when_next_wait_reaches_duration() {
    let server = Responder::spawn(|_| Reply::ok("{\"devices\": []}")).await;

    // Rounds start near 0 s, 0.8 s and 1.6 s; the wait after the third
    // would end past 2 s, so collection stops instead of sampling again.
    let collector = ScalabilityCollector::new(
        config_for(&server),
        scenario(Duration::from_secs(2), Duration::from_millis(800)),
    )
    .unwrap();
    let metrics = collector.collect(&CancellationToken::new()).await;

    assert_eq!(metrics.samples.len(), 3);
    let ids: Vec<usize> = metrics.samples.iter().map(|s| s.sample_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(metrics.samples[2].elapsed_time < 2.0);
    assert_eq!(metrics.summary.unwrap().total_samples, 3);
}

#[tokio::test]
async fn failing_api_still_records_a_sample() {
    let server = Responder::spawn(|_| Reply::status(500)).await;

    let collector = ScalabilityCollector::new(
        config_for(&server),
        scenario(Duration::from_secs(1), Duration::from_secs(5)),
    )
    .unwrap();
    let metrics = collector.collect(&CancellationToken::new()).await;

    assert_eq!(metrics.samples.len(), 1);
    assert!(metrics.samples[0].device_stats.is_none());
    let summary = metrics.summary.unwrap();
    assert_eq!(summary.avg_device_count, 0.0);
    assert_eq!(summary.time_to_all_enrolled_s, -1.0);
}

#[tokio::test]
async fn cancelled_collection_writes_no_summary() {
    let server = Responder::spawn(|_| Reply::ok("{}")).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let collector = ScalabilityCollector::new(
        config_for(&server),
        scenario(Duration::from_secs(30), Duration::from_secs(1)),
    )
    .unwrap();
    let metrics = collector.collect(&cancel).await;

    assert!(metrics.samples.is_empty());
    assert!(metrics.summary.is_none());
}

/* scale.rs ends here */
