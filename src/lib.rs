/* lib.rs

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

//! Synchronized load generation and resource monitoring for function
//! benchmarks.

pub mod args;
pub mod client;
pub mod collector;
pub mod config;
pub mod extract;
pub mod generator;
pub mod host;
pub mod message;
pub mod monitor;
pub mod pods;
pub mod sampler;
pub mod scale;
pub mod session;
pub mod signal;
pub mod sink;

pub use config::Config;

/* lib.rs ends here */
