/* args.rs

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

use crate::config::Config;
use crate::scale::Scenario;
use clap::{Parser, Subcommand};
use std::fmt::{self, Display};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None, term_width = 80)]
pub struct Args {
    #[arg(short = 'c', long, value_name = "FILE", help = "Configuration file")]
    #[clap(default_value = "benchsync.toml")]
    pub config: String,

    #[arg(short, long, action = clap::ArgAction::Count)]
    #[arg(help = "Increment verbosity level (repeat for more detail, e.g., -vvv)")]
    pub verbose: u8,

    #[command(subcommand)]
    pub role: Role,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Role {
    /// Sample host resources between START and STOP signals
    Monitor {
        #[arg(short, long, help = "Signal port to listen on")]
        port: Option<u16>,

        #[arg(short, long, help = "Sampling interval in milliseconds")]
        interval_ms: Option<u64>,
    },
    /// Drive batched load against the target and signal the monitor
    Load {
        #[arg(short, long, help = "Target URL")]
        url: Option<String>,

        #[arg(short, long, help = "Host running the monitor")]
        monitor_host: Option<String>,

        #[arg(short, long, help = "Number of batches")]
        batches: Option<usize>,

        #[arg(short, long, help = "Requests per batch")]
        iterations: Option<usize>,
    },
    /// Collect device and pod metrics for a scalability scenario
    Scale {
        scenario: String,
        devices: usize,
        gateways: usize,
        #[clap(default_value_t = 180)]
        duration: u64,
        #[clap(default_value_t = 15)]
        interval: u64,
    },
}

impl Role {
    /// Writes command-line overrides into `config`.
    pub fn apply(&self, config: &mut Config) {
        match self {
            Role::Monitor { port, interval_ms } => {
                if let Some(port) = port {
                    config.sync.port = *port;
                }
                if let Some(interval_ms) = interval_ms {
                    config.monitor.interval_ms = *interval_ms;
                }
            }
            Role::Load {
                url,
                monitor_host,
                batches,
                iterations,
            } => {
                if let Some(url) = url {
                    config.load.url = url.clone();
                }
                if let Some(host) = monitor_host {
                    config.sync.host = host.clone();
                }
                if let Some(batches) = batches {
                    config.load.batches = *batches;
                }
                if let Some(iterations) = iterations {
                    config.load.iterations = *iterations;
                }
            }
            Role::Scale { .. } => {}
        }
    }

    /// The scenario to run, for the `scale` role.
    pub fn scenario(&self) -> Option<Scenario> {
        match self {
            Role::Scale {
                scenario,
                devices,
                gateways,
                duration,
                interval,
            } => Some(Scenario {
                name: scenario.clone(),
                devices: *devices,
                gateways: *gateways,
                duration: Duration::from_secs(*duration),
                interval: Duration::from_secs(*interval),
            }),
            _ => None,
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Monitor { .. } => f.write_str("monitor"),
            Role::Load { .. } => f.write_str("load"),
            Role::Scale { scenario, .. } => write!(f, "scale ({})", scenario),
        }
    }
}

impl Display for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Args:\n\
            Role:       {}\n\
            Config:     {}\n\
            Verbose:    {}",
            self.role, self.config, self.verbose
        )
    }
}

/* args.rs ends here */
