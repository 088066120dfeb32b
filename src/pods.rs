/* pods.rs

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

//! Pod-level resource usage and phases, read through `kubectl`.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use spdlog::debug;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

const KUBECTL: &str = "kubectl";
const KUBECTL_TIMEOUT: Duration = Duration::from_secs(10);

/// Which aggregate a pod's usage is added to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodRole {
    Device,
    Gateway,
}

pub fn classify(name: &str) -> Option<PodRole> {
    if name.starts_with("scale-device-") || name.ends_with("-pod") {
        Some(PodRole::Device)
    } else if name.starts_with("gateway-") {
        Some(PodRole::Gateway)
    } else {
        None
    }
}

/// `108m` is 108 millicores, a bare number is whole cores. Unparseable
/// values count as zero.
pub fn cpu_to_millicores(raw: &str) -> u64 {
    match raw.strip_suffix('m') {
        Some(milli) => milli.parse().unwrap_or(0),
        None => raw
            .parse::<f64>()
            .ok()
            .filter(|cores| cores.is_finite() && *cores >= 0.0)
            .map(|cores| (cores * 1000.0) as u64)
            .unwrap_or(0),
    }
}

/// Converts `Mi`, `Gi` and `Ki` quantities to whole mebibytes; any other
/// unit counts as zero.
pub fn mem_to_mebibytes(raw: &str) -> u64 {
    if let Some(mi) = raw.strip_suffix("Mi") {
        mi.parse().unwrap_or(0)
    } else if let Some(gi) = raw.strip_suffix("Gi") {
        gi.parse::<f64>()
            .ok()
            .filter(|g| g.is_finite() && *g >= 0.0)
            .map(|g| (g * 1024.0) as u64)
            .unwrap_or(0)
    } else if let Some(ki) = raw.strip_suffix("Ki") {
        ki.parse::<u64>().map(|k| k / 1024).unwrap_or(0)
    } else {
        0
    }
}

/// One `NAME CPU MEMORY` line of `kubectl top pods`.
pub fn parse_top_line(line: &str) -> Option<(&str, u64, u64)> {
    let mut fields = line.split_whitespace();
    let name = fields.next()?;
    let cpu = fields.next()?;
    let mem = fields.next()?;
    Some((name, cpu_to_millicores(cpu), mem_to_mebibytes(mem)))
}

/// Summed usage per bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PodResources {
    pub device_cpu_m: u64,
    #[serde(rename = "device_mem_Mi")]
    pub device_mem_mi: u64,
    pub gateway_cpu_m: u64,
    #[serde(rename = "gateway_mem_Mi")]
    pub gateway_mem_mi: u64,
}

impl PodResources {
    pub fn from_top_output(output: &str) -> Self {
        let mut resources = Self::default();
        for (name, cpu, mem) in output.lines().filter_map(parse_top_line) {
            match classify(name) {
                Some(PodRole::Device) => {
                    resources.device_cpu_m += cpu;
                    resources.device_mem_mi += mem;
                }
                Some(PodRole::Gateway) => {
                    resources.gateway_cpu_m += cpu;
                    resources.gateway_mem_mi += mem;
                }
                None => {}
            }
        }
        resources
    }
}

async fn kubectl(args: &[&str]) -> anyhow::Result<String> {
    let output = timeout(KUBECTL_TIMEOUT, Command::new(KUBECTL).args(args).kill_on_drop(true).output())
        .await
        .with_context(|| format!("kubectl {} timed out", args.join(" ")))?
        .context("running kubectl")?;

    if !output.status.success() {
        bail!(
            "kubectl {} exited with {}: {}",
            args.join(" "),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    String::from_utf8(output.stdout).context("kubectl output is not UTF-8")
}

/// Current usage in `namespace`, or `None` when metrics are unavailable.
pub async fn kubectl_top(namespace: &str) -> Option<PodResources> {
    match kubectl(&["top", "pods", "-n", namespace, "--no-headers"]).await {
        Ok(output) => Some(PodResources::from_top_output(&output)),
        Err(e) => {
            debug!("Pod metrics unavailable: {:#}", e);
            None
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<Pod>,
}

#[derive(Debug, Default, Deserialize)]
struct Pod {
    #[serde(default)]
    status: PodStatus,
}

#[derive(Debug, Default, Deserialize)]
struct PodStatus {
    #[serde(default)]
    phase: Option<String>,
}

/// Pod count and per-phase counts from a `kubectl get pods -o json`
/// document.
pub fn pod_phases(raw: &str) -> anyhow::Result<(usize, BTreeMap<String, usize>)> {
    let list: PodList = serde_json::from_str(raw).context("parsing pod list")?;
    let mut phases = BTreeMap::new();
    for pod in &list.items {
        let phase = pod.status.phase.clone().unwrap_or_else(|| "Unknown".to_string());
        *phases.entry(phase).or_insert(0) += 1;
    }
    Ok((list.items.len(), phases))
}

/// Pod count and phases in `namespace`, or `None` when kubectl fails.
pub async fn kubectl_pods(namespace: &str) -> Option<(usize, BTreeMap<String, usize>)> {
    let result = match kubectl(&["get", "pods", "-n", namespace, "-o", "json"]).await {
        Ok(raw) => pod_phases(&raw),
        Err(e) => Err(e),
    };
    match result {
        Ok(phases) => Some(phases),
        Err(e) => {
            debug!("Pod status unavailable: {:#}", e);
            None
        }
    }
}


/* pods.rs ends here */
