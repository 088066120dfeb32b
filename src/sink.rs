/* sink.rs

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

use crate::collector::{LatencyReport, ResourceSummary};
use crate::generator::RequestRecord;
use crate::sampler::Sample;
use anyhow::Context;
use chrono::Local;
use serde::Serialize;
use spdlog::info;
use std::borrow::Cow;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Quotes a CSV field when it contains a separator, quote or newline.
pub fn escape(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// Writes result files into one directory, all stamped with the time the
/// sink was created.
#[derive(Debug, Clone)]
pub struct ResultSink {
    dir: PathBuf,
    stamp: String,
}

impl ResultSink {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self::with_stamp(dir, Local::now().format("%Y%m%d_%H%M%S").to_string())
    }

    pub fn with_stamp(dir: impl AsRef<Path>, stamp: impl Into<String>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            stamp: stamp.into(),
        }
    }

    pub fn path(&self, prefix: &str, extension: &str) -> PathBuf {
        self.dir
            .join(format!("{}_{}.{}", prefix, self.stamp, extension))
    }

    fn create(&self, prefix: &str, extension: &str) -> anyhow::Result<(PathBuf, BufWriter<File>)> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating output directory {}", self.dir.display()))?;
        let path = self.path(prefix, extension);
        let file =
            File::create(&path).with_context(|| format!("creating {}", path.display()))?;
        Ok((path, BufWriter::new(file)))
    }

    /// Raw request rows. An unreported execution time is written as 0.
    pub fn write_records(&self, records: &[RequestRecord]) -> anyhow::Result<PathBuf> {
        let (path, mut writer) = self.create("latency_results", "csv")?;

        writeln!(
            writer,
            "batch,iteration,timestamp,latency_ms,function_execution_ms,function_status,success,status_code"
        )?;
        for r in records {
            writeln!(
                writer,
                "{},{},{:.6},{:.3},{:.3},{},{},{}",
                r.batch,
                r.iteration,
                r.timestamp,
                r.latency_ms,
                r.function_execution_ms.unwrap_or(0.0),
                escape(&r.function_status),
                r.success,
                r.status_code
            )?;
        }

        writer.flush()?;
        info!("Wrote {} request records to {}", records.len(), path.display());
        Ok(path)
    }

    /// One row per batch.
    pub fn write_batch_summary(&self, report: &LatencyReport) -> anyhow::Result<PathBuf> {
        let (path, mut writer) = self.create("latency_summary", "csv")?;

        writeln!(
            writer,
            "batch,count,failed,\
             latency_mean_ms,latency_median_ms,latency_min_ms,latency_max_ms,latency_std_dev_ms,latency_p95_ms,latency_p99_ms,\
             function_time_mean_ms,function_time_median_ms,function_time_min_ms,function_time_max_ms,function_time_std_dev_ms"
        )?;
        for b in &report.batches {
            let l = &b.latency;
            let f = &b.function_time;
            writeln!(
                writer,
                "{},{},{},{:.3},{:.3},{:.3},{:.3},{:.3},{:.3},{:.3},{:.3},{:.3},{:.3},{:.3},{:.3}",
                b.batch,
                b.count,
                b.failed,
                l.mean,
                l.median,
                l.min,
                l.max,
                l.std_dev,
                l.p95,
                l.p99,
                f.mean,
                f.median,
                f.min,
                f.max,
                f.std_dev
            )?;
        }

        writer.flush()?;
        info!("Wrote batch summary to {}", path.display());
        Ok(path)
    }

    pub fn write_samples(&self, samples: &[Sample]) -> anyhow::Result<PathBuf> {
        let (path, mut writer) = self.create("resource_monitoring", "csv")?;

        writeln!(
            writer,
            "sample_id,datetime,timestamp,cpu_percent,cpu_count,cpu_freq_mhz,\
             ram_total_gb,ram_used_gb,ram_percent,ram_available_gb,swap_used_gb,swap_percent,\
             load_avg_1min,load_avg_5min,load_avg_15min,disk_read_mb,disk_write_mb,\
             net_sent_mb,net_recv_mb,active_processes,process_cpu_total,process_memory_total_mb"
        )?;
        for s in samples {
            writeln!(
                writer,
                "{},{},{:.6},{:.2},{},{:.1},{:.3},{:.3},{:.2},{:.3},{:.3},{:.2},{:.2},{:.2},{:.2},{:.3},{:.3},{:.3},{:.3},{},{:.2},{:.2}",
                s.sample_id,
                s.datetime,
                s.timestamp,
                s.cpu_percent,
                s.cpu_count,
                s.cpu_freq_mhz,
                s.ram_total_gb,
                s.ram_used_gb,
                s.ram_percent,
                s.ram_available_gb,
                s.swap_used_gb,
                s.swap_percent,
                s.load_avg_1min,
                s.load_avg_5min,
                s.load_avg_15min,
                s.disk_read_mb,
                s.disk_write_mb,
                s.net_sent_mb,
                s.net_recv_mb,
                s.active_processes,
                s.process_cpu_total,
                s.process_memory_total_mb
            )?;
        }

        writer.flush()?;
        info!("Wrote {} samples to {}", samples.len(), path.display());
        Ok(path)
    }

    pub fn write_resource_summary(&self, summary: &ResourceSummary) -> anyhow::Result<PathBuf> {
        let (path, mut writer) = self.create("resource_summary", "csv")?;

        writeln!(
            writer,
            "total_samples,duration_seconds,sampling_interval,\
             cpu_mean_percent,cpu_max_percent,cpu_min_percent,cpu_std_dev,\
             ram_mean_percent,ram_max_percent,ram_min_percent,ram_std_dev,\
             ram_used_mean_gb,ram_used_max_gb,ram_used_min_gb,\
             load_avg_mean,load_avg_max,load_avg_min"
        )?;
        let (c, r, u, l) = (
            &summary.cpu,
            &summary.ram,
            &summary.ram_used_gb,
            &summary.load_avg,
        );
        writeln!(
            writer,
            "{},{:.3},{:.3},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.3},{:.3},{:.3},{:.2},{:.2},{:.2}",
            summary.total_samples,
            summary.duration_seconds,
            summary.sampling_interval,
            c.mean,
            c.max,
            c.min,
            c.std_dev,
            r.mean,
            r.max,
            r.min,
            r.std_dev,
            u.mean,
            u.max,
            u.min,
            l.mean,
            l.max,
            l.min
        )?;

        writer.flush()?;
        info!("Wrote resource summary to {}", path.display());
        Ok(path)
    }

    /// Pretty-printed JSON document.
    pub fn write_json<T: Serialize>(&self, prefix: &str, value: &T) -> anyhow::Result<PathBuf> {
        let (path, mut writer) = self.create(prefix, "json")?;
        serde_json::to_writer_pretty(&mut writer, value)
            .with_context(|| format!("serializing {}", path.display()))?;
        writeln!(writer)?;
        writer.flush()?;
        info!("Wrote {}", path.display());
        Ok(path)
    }
}


/* sink.rs ends here */
