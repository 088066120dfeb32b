/* session.rs

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

use anyhow::anyhow;
use spdlog::{debug, info};
use std::fmt::{self, Display};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Lifecycle of a monitoring session. Variants are ordered; a session only
/// ever moves to a later state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum SessionState {
    Idle = 0,
    WaitingForStart = 1,
    Sampling = 2,
    Stopped = 3,
}

impl SessionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => SessionState::Idle,
            1 => SessionState::WaitingForStart,
            2 => SessionState::Sampling,
            _ => SessionState::Stopped,
        }
    }
}

impl Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::WaitingForStart => "waiting-for-start",
            SessionState::Sampling => "sampling",
            SessionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// What ended a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A `STOP_TEST` token arrived on the signal channel.
    Signal,
    /// The local process was interrupted.
    Interrupt,
}

/// Shared state of one monitor run.
///
/// The session owns the stop flag. Only [`MonitoringSession::stop`] can raise
/// it, and it is raised at most once; readers get child tokens that observe
/// the flag but cannot set it.
#[derive(Debug)]
pub struct MonitoringSession {
    state: AtomicU8,
    stop: CancellationToken,
    reason: OnceLock<StopReason>,
}

impl MonitoringSession {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(SessionState::Idle as u8),
            stop: CancellationToken::new(),
            reason: OnceLock::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves the session forward to `next`.
    ///
    /// # Errors
    ///
    /// Fails when `next` is not strictly later than the current state.
    pub fn advance(&self, next: SessionState) -> anyhow::Result<SessionState> {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (next as u8 > current).then_some(next as u8)
            })
            .map(|previous| {
                let previous = SessionState::from_u8(previous);
                debug!("Session: {} -> {}", previous, next);
                previous
            })
            .map_err(|current| {
                anyhow!(
                    "invalid session transition {} -> {}",
                    SessionState::from_u8(current),
                    next
                )
            })
    }

    /// Raises the stop flag. Returns `false` if it was already raised, in
    /// which case the first reason is kept.
    pub fn stop(&self, reason: StopReason) -> bool {
        if self.reason.set(reason).is_err() {
            return false;
        }
        let _ = self.advance(SessionState::Stopped);
        self.stop.cancel();
        info!("Session stopped ({:?})", reason);
        true
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.reason.get().copied()
    }

    /// Resolves once the stop flag is raised.
    pub fn stopped(&self) -> WaitForCancellationFuture<'_> {
        self.stop.cancelled()
    }

    /// A read-only view of the stop flag for tasks that must observe it.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.child_token()
    }
}

impl Default for MonitoringSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_forward_lifecycle() {
        let session = MonitoringSession::new();
        assert_eq!(session.state(), SessionState::Idle);
        session.advance(SessionState::WaitingForStart).unwrap();
        session.advance(SessionState::Sampling).unwrap();
        assert!(session.stop(StopReason::Signal));
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[test]
    fn rejects_backward_and_repeated_transitions() {
        let session = MonitoringSession::new();
        session.advance(SessionState::Sampling).unwrap();
        assert!(session.advance(SessionState::WaitingForStart).is_err());
        assert!(session.advance(SessionState::Sampling).is_err());
        assert_eq!(session.state(), SessionState::Sampling);
    }

    #[test]
    fn stopped_is_terminal() {
        let session = MonitoringSession::new();
        session.advance(SessionState::WaitingForStart).unwrap();
        session.stop(StopReason::Interrupt);
        assert!(session.advance(SessionState::Sampling).is_err());
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[test]
    fn stop_flag_is_raised_once() {
        let session = MonitoringSession::new();
        assert!(!session.is_stopped());
        assert!(session.stop(StopReason::Interrupt));
        assert!(!session.stop(StopReason::Signal));
        assert!(session.is_stopped());
        assert_eq!(session.stop_reason(), Some(StopReason::Interrupt));
    }

    #[test]
    fn readers_cannot_raise_the_flag() {
        let session = MonitoringSession::new();
        let reader = session.stop_token();
        reader.cancel();
        assert!(!session.is_stopped());

        let reader = session.stop_token();
        session.stop(StopReason::Signal);
        assert!(reader.is_cancelled());
    }

    #[tokio::test]
    async fn stopped_future_resolves_after_stop() {
        let session = std::sync::Arc::new(MonitoringSession::new());
        let waiter = {
            let session = session.clone();
            tokio::spawn(async move { session.stopped().await })
        };
        session.stop(StopReason::Signal);
        waiter.await.unwrap();
    }
}

/* session.rs ends here */
