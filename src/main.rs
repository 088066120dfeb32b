/* main.rs

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

use benchsync::args::{Args, Role};
use benchsync::client::Client;
use benchsync::monitor::Monitor;
use benchsync::scale::ScalabilityCollector;
use benchsync::Config;
use clap::Parser;
use spdlog::{self, info, Level, LevelFilter, Logger};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::Warn,
        1 => Level::Info,
        2 => Level::Debug,
        _ => Level::Trace,
    };

    let default_logger: Arc<Logger> = spdlog::default_logger();
    default_logger.set_level_filter(LevelFilter::MoreSevereEqual(level));

    let mut config = Config::load(&args.config)?;
    args.role.apply(&mut config);

    info!("{}", args);
    info!("Parsed config from {}:\n{:#?}", args.config, config);

    match &args.role {
        Role::Monitor { .. } => Monitor::new(config).start().await,
        Role::Load { .. } => Client::new(config).start().await,
        Role::Scale { .. } => {
            let scenario = args
                .role
                .scenario()
                .ok_or_else(|| anyhow::anyhow!("scale role without a scenario"))?;
            ScalabilityCollector::new(config, scenario)?.start().await
        }
    }
}

/* main.rs ends here */
