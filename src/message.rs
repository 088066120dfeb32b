/* message.rs

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

use std::fmt::{self, Display};

/// Wire token asking the monitor to start sampling.
pub const START_TOKEN: &str = "START_TEST";
/// Wire token asking the monitor to stop sampling.
pub const STOP_TOKEN: &str = "STOP_TEST";

/// Upper bound on the bytes read from a single signal connection.
pub const MAX_MESSAGE_LEN: usize = 1024;

/// A synchronization message exchanged between the load generator and the
/// resource monitor.
///
/// Each message travels alone on its own TCP connection. The connection
/// boundary frames it, though a listener stops reading as soon as a known
/// token has arrived.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SyncMessage {
    Start,
    Stop,
    /// Anything that did not decode to a known token, or a poll timeout.
    #[default]
    Unknown,
}

impl SyncMessage {
    /// Returns the ASCII token sent on the wire, `None` for `Unknown`.
    pub fn token(&self) -> Option<&'static str> {
        match self {
            SyncMessage::Start => Some(START_TOKEN),
            SyncMessage::Stop => Some(STOP_TOKEN),
            SyncMessage::Unknown => None,
        }
    }

    /// Classifies a raw payload read from a signal connection.
    ///
    /// The payload must be valid UTF-8 and match a token exactly.
    pub fn classify(payload: &[u8]) -> Self {
        match std::str::from_utf8(payload) {
            Ok(START_TOKEN) => SyncMessage::Start,
            Ok(STOP_TOKEN) => SyncMessage::Stop,
            _ => SyncMessage::Unknown,
        }
    }
}

impl From<&[u8]> for SyncMessage {
    fn from(slice: &[u8]) -> Self {
        SyncMessage::classify(slice)
    }
}

impl Display for SyncMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token().unwrap_or("UNKNOWN"))
    }
}


/* message.rs ends here */
