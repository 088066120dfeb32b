/* host.rs

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

use crate::sampler::{ResourceProbe, Sample};
use anyhow::{bail, Context};
use spdlog::trace;
use std::time::{SystemTime, UNIX_EPOCH};
use sysinfo::{CpuRefreshKind, Networks, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const MIB: f64 = 1024.0 * 1024.0;
const SECTOR_BYTES: u64 = 512;

/// Selects the processes whose usage is reported as the function's own.
#[derive(Debug, Clone)]
pub struct ProcessFilter {
    name: String,
    cmdline_marker: Option<String>,
}

impl ProcessFilter {
    pub fn new(name: &str, cmdline_marker: Option<&str>) -> Self {
        Self {
            name: name.to_lowercase(),
            cmdline_marker: cmdline_marker.filter(|m| !m.is_empty()).map(str::to_owned),
        }
    }

    /// A process matches when its name contains the configured name
    /// (case-insensitive) or any argument contains the command-line marker.
    /// Nameless processes never match.
    pub fn matches<S: AsRef<str>>(&self, name: &str, cmd: &[S]) -> bool {
        if name.is_empty() {
            return false;
        }
        if !self.name.is_empty() && name.to_lowercase().contains(&self.name) {
            return true;
        }
        match &self.cmdline_marker {
            Some(marker) => cmd.iter().any(|arg| arg.as_ref().contains(marker.as_str())),
            None => false,
        }
    }
}

/// Resource probe backed by `sysinfo` and, on Linux, `/proc/diskstats`.
pub struct HostProbe {
    system: System,
    networks: Networks,
    filter: ProcessFilter,
}

impl HostProbe {
    /// Creates the probe and primes the CPU counters, so the first sample
    /// already carries a usage delta.
    pub fn new(filter: ProcessFilter) -> Self {
        let mut system = System::new();
        system.refresh_cpu_specifics(CpuRefreshKind::everything());
        system.refresh_memory();
        system.refresh_processes_specifics(ProcessesToUpdate::All, true, Self::process_refresh());

        Self {
            system,
            networks: Networks::new_with_refreshed_list(),
            filter,
        }
    }

    fn process_refresh() -> ProcessRefreshKind {
        ProcessRefreshKind::new()
            .with_cpu()
            .with_memory()
            .with_cmd(UpdateKind::OnlyIfNotSet)
    }

    fn function_processes(&self) -> (usize, f64, f64) {
        let mut count = 0;
        let mut cpu = 0.0;
        let mut memory = 0.0;

        for process in self.system.processes().values() {
            let name = process.name().to_string_lossy();
            let cmd: Vec<String> = process
                .cmd()
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect();
            if !self.filter.matches(&name, &cmd) {
                continue;
            }
            count += 1;
            cpu += process.cpu_usage() as f64;
            memory += process.memory() as f64 / MIB;
        }

        (count, cpu, memory)
    }
}

impl ResourceProbe for HostProbe {
    fn collect(&mut self) -> anyhow::Result<Sample> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("system clock before Unix epoch")?
            .as_secs_f64();

        self.system.refresh_cpu_specifics(CpuRefreshKind::everything());
        self.system.refresh_memory();
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            Self::process_refresh(),
        );
        self.networks.refresh();

        let total = self.system.total_memory();
        if total == 0 {
            bail!("memory counters unavailable");
        }
        let available = self.system.available_memory();
        let used = self.system.used_memory();
        let total_swap = self.system.total_swap();
        let used_swap = self.system.used_swap();

        let cpus = self.system.cpus();
        let cpu_freq_mhz = cpus.first().map(|cpu| cpu.frequency()).unwrap_or(0) as f64;

        let load = System::load_average();
        let (disk_read, disk_write) = disk_io_bytes();
        let (net_sent, net_recv) = self
            .networks
            .list()
            .iter()
            .fold((0u64, 0u64), |(sent, recv), (_, data)| {
                (sent + data.total_transmitted(), recv + data.total_received())
            });
        let (active_processes, process_cpu_total, process_memory_total_mb) =
            self.function_processes();

        trace!(
            "Host: cpu {:.1}% mem {}/{} procs {}",
            self.system.global_cpu_usage(),
            used,
            total,
            active_processes
        );

        Ok(Sample {
            timestamp,
            cpu_percent: self.system.global_cpu_usage() as f64,
            cpu_count: cpus.len(),
            cpu_freq_mhz,
            ram_total_gb: total as f64 / GIB,
            ram_used_gb: used as f64 / GIB,
            ram_percent: percent(total.saturating_sub(available), total),
            ram_available_gb: available as f64 / GIB,
            swap_used_gb: used_swap as f64 / GIB,
            swap_percent: percent(used_swap, total_swap),
            load_avg_1min: load.one,
            load_avg_5min: load.five,
            load_avg_15min: load.fifteen,
            disk_read_mb: disk_read as f64 / MIB,
            disk_write_mb: disk_write as f64 / MIB,
            net_sent_mb: net_sent as f64 / MIB,
            net_recv_mb: net_recv as f64 / MIB,
            active_processes,
            process_cpu_total,
            process_memory_total_mb,
            ..Sample::default()
        })
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Cumulative bytes read and written by whole block devices. Missing
/// counters read as zero.
#[cfg(target_os = "linux")]
fn disk_io_bytes() -> (u64, u64) {
    match std::fs::read_to_string("/proc/diskstats") {
        Ok(raw) => parse_diskstats(&raw, |name| {
            std::path::Path::new("/sys/block").join(name).exists()
        }),
        Err(e) => {
            trace!("Host: /proc/diskstats unavailable: {}", e);
            (0, 0)
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn disk_io_bytes() -> (u64, u64) {
    (0, 0)
}

/// Sums sectors read and written (fields 6 and 10) over the devices
/// accepted by `is_disk`.
pub fn parse_diskstats(raw: &str, is_disk: impl Fn(&str) -> bool) -> (u64, u64) {
    raw.lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 10 || !is_disk(fields[2]) {
                return None;
            }
            let read: u64 = fields[5].parse().ok()?;
            let written: u64 = fields[9].parse().ok()?;
            Some((read * SECTOR_BYTES, written * SECTOR_BYTES))
        })
        .fold((0, 0), |(r, w), (read, written)| (r + read, w + written))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_matches_name_case_insensitively() {
        let filter = ProcessFilter::new("Python", None);
        assert!(filter.matches("python3", &[] as &[&str]));
        assert!(filter.matches("PYTHON", &[] as &[&str]));
        assert!(!filter.matches("bash", &["python"]));
    }

    #[test]
    fn filter_matches_cmdline_marker() {
        let filter = ProcessFilter::new("python", Some("onmarco"));
        assert!(filter.matches("node", &["node", "/srv/onmarco/handler.js"]));
        assert!(!filter.matches("node", &["node", "server.js"]));
        assert!(!filter.matches("", &["onmarco"]));
    }

    #[test]
    fn empty_marker_is_ignored() {
        let filter = ProcessFilter::new("python", Some(""));
        assert!(!filter.matches("node", &["anything"]));
    }

    #[test]
    fn diskstats_sums_whole_disks_only() {
        let raw = "\
   8       0 sda 100 0 2048 10 50 0 4096 20 0 30 30
   8       1 sda1 90 0 1024 9 40 0 2048 18 0 27 27
 259       0 nvme0n1 10 0 8 1 5 0 16 2 0 3 3
   7       0 loop0 short
";
        let (read, written) = parse_diskstats(raw, |name| name == "sda" || name == "nvme0n1");
        assert_eq!(read, (2048 + 8) * 512);
        assert_eq!(written, (4096 + 16) * 512);
    }

    #[test]
    fn percent_of_zero_is_zero() {
        assert_eq!(percent(10, 0), 0.0);
        assert_eq!(percent(25, 100), 25.0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn collects_a_host_sample() {
        let mut probe = HostProbe::new(ProcessFilter::new("benchsync", None));
        let sample = probe.collect().unwrap();
        assert!(sample.timestamp > 0.0);
        assert!(sample.ram_total_gb > 0.0);
        assert!(sample.cpu_count > 0);
        assert!((0.0..=100.0).contains(&sample.ram_percent));
    }
}

/* host.rs ends here */
