/* config.rs

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

use anyhow::Context;
use serde::Deserialize;
use spdlog::warn;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SignalChannel {
    /// Monitor host the load generator signals.
    pub host: String,
    pub port: u16,
    /// Address the monitor binds its listener to.
    pub bind_addr: String,
    pub poll_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Pause between sending Start and issuing the first request.
    pub start_delay_ms: u64,
}
impl Default for SignalChannel {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9999,
            bind_addr: "0.0.0.0".to_string(),
            poll_timeout_ms: 1000,
            connect_timeout_ms: 5000,
            start_delay_ms: 3000,
        }
    }
}
impl SignalChannel {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Load {
    pub url: String,
    pub method: String,
    pub batches: usize,
    pub iterations: usize,
    pub pause_ms: u64,
    pub timeout_s: u64,
    /// JSON document sent as the request body.
    pub body: String,
}
impl Default for Load {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8080/function".to_string(),
            method: "POST".to_string(),
            batches: 10,
            iterations: 100,
            pause_ms: 2000,
            timeout_s: 30,
            body: r#"{"input":"test"}"#.to_string(),
        }
    }
}
impl Load {
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_s)
    }

    pub fn total_requests(&self) -> usize {
        self.batches * self.iterations
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Monitor {
    pub interval_ms: u64,
    /// Case-insensitive substring matched against process names.
    pub process_name: String,
    /// Substring matched against any command-line argument.
    pub cmdline_marker: Option<String>,
}
impl Default for Monitor {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            process_name: "python".to_string(),
            cmdline_marker: None,
        }
    }
}
impl Monitor {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Scale {
    pub api_url: String,
    pub namespace: String,
    pub probe_requests: usize,
    pub probe_timeout_s: u64,
}
impl Default for Scale {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3001".to_string(),
            namespace: "wasmbed".to_string(),
            probe_requests: 20,
            probe_timeout_s: 5,
        }
    }
}
impl Scale {
    pub fn devices_url(&self) -> String {
        format!("{}/api/v1/devices", self.api_url.trim_end_matches('/'))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_s)
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Output {
    pub dir: String,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            dir: ".".to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub sync: SignalChannel,
    pub load: Load,
    pub monitor: Monitor,
    pub scale: Scale,
    pub output: Output,
}

impl Config {
    /// Reads the configuration file at `path`, falling back to defaults when
    /// the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(
                "Config file {} not found, using defaults",
                path.display()
            );
            return Ok(Config::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_scenario() {
        let config = Config::default();
        assert_eq!(config.sync.port, 9999);
        assert_eq!(config.load.batches, 10);
        assert_eq!(config.load.iterations, 100);
        assert_eq!(config.load.total_requests(), 1000);
        assert_eq!(config.load.timeout(), Duration::from_secs(30));
        assert_eq!(config.monitor.interval(), Duration::from_millis(100));
        assert_eq!(config.scale.probe_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = Config::parse(
            r#"
            [sync]
            host = "192.168.100.42"

            [load]
            url = "http://10.42.0.131:50012/function/on2"
            batches = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.sync.host, "192.168.100.42");
        assert_eq!(config.sync.port, 9999);
        assert_eq!(config.load.batches, 2);
        assert_eq!(config.load.iterations, 100);
        assert_eq!(config.monitor.process_name, "python");
    }

    #[test]
    fn devices_url_tolerates_trailing_slash() {
        let scale = Scale {
            api_url: "http://localhost:3001/".to_string(),
            ..Scale::default()
        };
        assert_eq!(scale.devices_url(), "http://localhost:3001/api/v1/devices");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load("/nonexistent/benchsync.toml").unwrap();
        assert_eq!(config.output.dir, ".");
    }
}

/* config.rs ends here */
