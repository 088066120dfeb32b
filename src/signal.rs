/* signal.rs

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

//! Best-effort start/stop signalling over one-shot TCP connections.
//!
//! The sender connects, writes a single token and closes. The listener
//! accepts one connection per message and never answers; a lost message is
//! simply lost.

use crate::message::{SyncMessage, MAX_MESSAGE_LEN};
use crate::session::{MonitoringSession, StopReason};
use anyhow::Context;
use spdlog::{debug, info, trace, warn};
use std::io::Write;
use std::net::{Shutdown, SocketAddr, TcpStream as StdTcpStream, ToSocketAddrs};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpListener, TcpSocket, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tokio_util::sync::CancellationToken;

/// Time a connected peer gets to deliver its token.
const READ_TIMEOUT: Duration = Duration::from_secs(2);
/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);
/// Messages buffered between the listener task and its consumer.
const CHANNEL_CAPACITY: usize = 8;

/// Sends `message` to `host:port` and closes the connection.
///
/// Connection failures, refusals and timeouts are logged and reported as
/// `false`; the caller is expected to carry on unsynchronized.
pub async fn send(message: SyncMessage, host: &str, port: u16, budget: Duration) -> bool {
    let Some(token) = message.token() else {
        warn!("Signal: refusing to send {}", message);
        return false;
    };

    let attempt = async {
        let mut stream = TcpStream::connect((host, port)).await?;
        stream.write_all(token.as_bytes()).await?;
        stream.shutdown().await?;
        Ok::<_, std::io::Error>(())
    };

    match timeout(budget, attempt).await {
        Ok(Ok(())) => {
            info!("Signal '{}' sent to {}:{}", token, host, port);
            true
        }
        Ok(Err(e)) => {
            warn!("Signal '{}' to {}:{} failed: {}", token, host, port, e);
            false
        }
        Err(_) => {
            warn!(
                "Signal '{}' to {}:{} timed out after {:?}",
                token, host, port, budget
            );
            false
        }
    }
}

/// Blocking counterpart of [`send`] for contexts that cannot await, such as
/// `Drop` implementations.
pub fn send_blocking(message: SyncMessage, host: &str, port: u16, budget: Duration) -> bool {
    let Some(token) = message.token() else {
        return false;
    };

    let attempt = || -> std::io::Result<()> {
        let mut last_err = None;
        for addr in (host, port).to_socket_addrs()? {
            match StdTcpStream::connect_timeout(&addr, budget) {
                Ok(mut stream) => {
                    stream.set_write_timeout(Some(budget))?;
                    stream.write_all(token.as_bytes())?;
                    stream.shutdown(Shutdown::Write)?;
                    return Ok(());
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "no address resolved")
        }))
    };

    match attempt() {
        Ok(()) => {
            info!("Signal '{}' sent to {}:{}", token, host, port);
            true
        }
        Err(e) => {
            warn!("Signal '{}' to {}:{} failed: {}", token, host, port, e);
            false
        }
    }
}

/// Listening side of the signal channel.
pub struct SignalListener {
    listener: TcpListener,
}

impl SignalListener {
    /// Binds a reusable-address listener on `addr:port`. Port 0 picks an
    /// ephemeral port.
    pub async fn bind(addr: &str, port: u16) -> anyhow::Result<Self> {
        let local = lookup_host((addr, port))
            .await
            .with_context(|| format!("resolving {}:{}", addr, port))?
            .next()
            .with_context(|| format!("no address for {}:{}", addr, port))?;

        let socket = match local {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .context("Signal: creating socket")?;
        socket
            .set_reuseaddr(true)
            .context("Signal: setting SO_REUSEADDR")?;
        socket
            .bind(local)
            .with_context(|| format!("Signal: binding {}", local))?;
        let listener = socket.listen(16).context("Signal: listen")?;

        info!("Signal listener bound on {}", local);
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts one connection and classifies its payload.
    ///
    /// Accept and read errors are logged and the accept is retried. With a
    /// `poll` timeout, `SyncMessage::Unknown` is returned when nothing
    /// arrives in time so the caller can re-check its own state.
    pub async fn listen_once(&self, poll: Option<Duration>) -> SyncMessage {
        loop {
            let accepted = match poll {
                Some(limit) => match timeout(limit, self.listener.accept()).await {
                    Ok(accepted) => accepted,
                    Err(_) => return SyncMessage::Unknown,
                },
                None => self.listener.accept().await,
            };

            let (stream, peer) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("Signal: accept failed: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            match read_message(stream).await {
                Ok(message) => {
                    debug!("Signal: {} from {}", message, peer);
                    return message;
                }
                Err(e) => warn!("Signal: failed to read from {}: {:#}", peer, e),
            }
        }
    }
}

/// Reads at most `MAX_MESSAGE_LEN` bytes. Reading ends at EOF, once the
/// bytes so far form a known token, or when the peer stalls past
/// `READ_TIMEOUT`; whatever arrived by then is classified.
async fn read_message(mut stream: TcpStream) -> anyhow::Result<SyncMessage> {
    let mut payload = Vec::with_capacity(MAX_MESSAGE_LEN);
    let mut chunk = [0u8; MAX_MESSAGE_LEN];
    let deadline = Instant::now() + READ_TIMEOUT;

    while payload.len() < MAX_MESSAGE_LEN {
        let room = MAX_MESSAGE_LEN - payload.len();
        let read = match timeout_at(deadline, stream.read(&mut chunk[..room])).await {
            Ok(read) => read.context("reading signal payload")?,
            Err(_) => {
                trace!("Signal: peer stalled after {} bytes", payload.len());
                break;
            }
        };
        if read == 0 {
            break;
        }
        payload.extend_from_slice(&chunk[..read]);
        if SyncMessage::classify(&payload) != SyncMessage::Unknown {
            break;
        }
    }

    Ok(SyncMessage::classify(&payload))
}

/// Runs the listener on its own task and forwards every recognized message
/// through a bounded channel until `cancel` fires or the receiver is
/// dropped.
pub fn spawn_listener(
    listener: SignalListener,
    poll: Duration,
    cancel: CancellationToken,
) -> (mpsc::Receiver<SyncMessage>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    let handle = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                message = listener.listen_once(Some(poll)) => message,
            };

            match message {
                SyncMessage::Unknown => trace!("Signal: nothing recognized this poll"),
                message => {
                    if tx.send(message).await.is_err() {
                        break;
                    }
                }
            }
        }
        debug!("Signal listener task finished");
    });

    (rx, handle)
}

/// Waits in `WaitingForStart` for a Start message.
///
/// Returns `false` if the session was stopped first, either by an early
/// Stop message or by a local interrupt.
pub async fn wait_for_start(
    rx: &mut mpsc::Receiver<SyncMessage>,
    session: &MonitoringSession,
) -> bool {
    loop {
        let message = tokio::select! {
            biased;
            _ = session.stopped() => return false,
            message = rx.recv() => message,
        };

        match message {
            Some(SyncMessage::Start) => return true,
            Some(SyncMessage::Stop) => {
                session.stop(StopReason::Signal);
                return false;
            }
            Some(SyncMessage::Unknown) => continue,
            None => {
                session.stopped().await;
                return false;
            }
        }
    }
}

/// Background stop watcher: consumes messages until Stop arrives and then
/// raises the session's stop flag. Also returns when the flag is raised by
/// someone else.
pub async fn listen_until_stop(rx: &mut mpsc::Receiver<SyncMessage>, session: &MonitoringSession) {
    loop {
        let message = tokio::select! {
            biased;
            _ = session.stopped() => return,
            message = rx.recv() => message,
        };

        match message {
            Some(SyncMessage::Stop) => {
                session.stop(StopReason::Signal);
                return;
            }
            Some(other) => debug!("Signal: ignoring {} while sampling", other),
            None => {
                session.stopped().await;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use std::sync::Arc;

    const BUDGET: Duration = Duration::from_secs(2);

    async fn ephemeral() -> (SignalListener, u16) {
        let listener = SignalListener::bind("127.0.0.1", 0).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[tokio::test]
    async fn delivers_start_and_stop() {
        let (listener, port) = ephemeral().await;

        assert!(send(SyncMessage::Start, "127.0.0.1", port, BUDGET).await);
        assert_eq!(listener.listen_once(Some(BUDGET)).await, SyncMessage::Start);

        assert!(send(SyncMessage::Stop, "127.0.0.1", port, BUDGET).await);
        assert_eq!(listener.listen_once(Some(BUDGET)).await, SyncMessage::Stop);
    }

    #[tokio::test]
    async fn unknown_token_is_classified_not_fatal() {
        let (listener, port) = ephemeral().await;

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream.write_all(b"HELLO").await.unwrap();
        stream.shutdown().await.unwrap();

        assert_eq!(listener.listen_once(Some(BUDGET)).await, SyncMessage::Unknown);
    }

    #[tokio::test]
    async fn poll_timeout_returns_unknown() {
        let (listener, _) = ephemeral().await;
        let message = listener
            .listen_once(Some(Duration::from_millis(50)))
            .await;
        assert_eq!(message, SyncMessage::Unknown);
    }

    #[tokio::test]
    async fn send_to_closed_port_returns_false() {
        let port = {
            let (listener, port) = ephemeral().await;
            drop(listener);
            port
        };
        assert!(!send(SyncMessage::Stop, "127.0.0.1", port, BUDGET).await);
    }

    #[tokio::test]
    async fn send_unknown_is_refused() {
        assert!(!send(SyncMessage::Unknown, "127.0.0.1", 1, BUDGET).await);
    }

    #[tokio::test]
    async fn blocking_send_reaches_listener() {
        let (listener, port) = ephemeral().await;
        let sent = tokio::task::spawn_blocking(move || {
            send_blocking(SyncMessage::Stop, "127.0.0.1", port, BUDGET)
        })
        .await
        .unwrap();
        assert!(sent);
        assert_eq!(listener.listen_once(Some(BUDGET)).await, SyncMessage::Stop);
    }

    #[tokio::test]
    async fn early_stop_ends_the_wait() {
        let (listener, port) = ephemeral().await;
        let session = Arc::new(MonitoringSession::new());
        session.advance(SessionState::WaitingForStart).unwrap();
        let (mut rx, task) =
            spawn_listener(listener, Duration::from_millis(50), session.stop_token());

        assert!(send(SyncMessage::Stop, "127.0.0.1", port, BUDGET).await);
        assert!(!wait_for_start(&mut rx, &session).await);
        assert_eq!(session.stop_reason(), Some(StopReason::Signal));
        task.await.unwrap();
    }

    #[tokio::test]
    async fn watcher_raises_flag_on_stop() {
        let (listener, port) = ephemeral().await;
        let session = Arc::new(MonitoringSession::new());
        let (mut rx, task) =
            spawn_listener(listener, Duration::from_millis(50), session.stop_token());

        assert!(send(SyncMessage::Start, "127.0.0.1", port, BUDGET).await);
        assert!(wait_for_start(&mut rx, &session).await);

        // A duplicate Start is ignored by the watcher.
        assert!(send(SyncMessage::Start, "127.0.0.1", port, BUDGET).await);
        assert!(send(SyncMessage::Stop, "127.0.0.1", port, BUDGET).await);
        timeout(BUDGET, listen_until_stop(&mut rx, &session))
            .await
            .unwrap();

        assert!(session.is_stopped());
        assert_eq!(session.stop_reason(), Some(StopReason::Signal));
        task.await.unwrap();
    }

    #[tokio::test]
    async fn watcher_returns_on_local_interrupt() {
        let (listener, _) = ephemeral().await;
        let session = Arc::new(MonitoringSession::new());
        let (mut rx, task) =
            spawn_listener(listener, Duration::from_millis(50), session.stop_token());

        let interrupter = {
            let session = session.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                session.stop(StopReason::Interrupt);
            })
        };

        timeout(BUDGET, listen_until_stop(&mut rx, &session))
            .await
            .unwrap();
        assert_eq!(session.stop_reason(), Some(StopReason::Interrupt));
        interrupter.await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn token_from_a_sender_holding_the_connection_open() {
        let (listener, port) = ephemeral().await;

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream.write_all(b"STOP_TEST").await.unwrap();

        // Well inside the read timeout, with the connection still open.
        let message = timeout(
            Duration::from_millis(1000),
            listener.listen_once(Some(BUDGET)),
        )
        .await
        .unwrap();
        assert_eq!(message, SyncMessage::Stop);
        drop(stream);
    }

    #[tokio::test]
    async fn token_split_across_writes() {
        let (listener, port) = ephemeral().await;

        let sender = tokio::spawn(async move {
            let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
            stream.write_all(b"STOP_").await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            stream.write_all(b"TEST").await.unwrap();
            tokio::time::sleep(Duration::from_secs(3)).await;
        });

        assert_eq!(listener.listen_once(Some(BUDGET)).await, SyncMessage::Stop);
        sender.abort();
    }

    #[tokio::test]
    async fn stalled_partial_token_is_unknown() {
        let (listener, port) = ephemeral().await;

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream.write_all(b"STOP_").await.unwrap();

        let message = timeout(READ_TIMEOUT + BUDGET, listener.listen_once(None))
            .await
            .unwrap();
        assert_eq!(message, SyncMessage::Unknown);
        drop(stream);
    }

    #[tokio::test]
    async fn oversized_payload_is_capped_and_unknown() {
        let (listener, port) = ephemeral().await;

        let mut payload = b"STOP_TEST".to_vec();
        payload.resize(4 * 1024, b'x');
        let sender = tokio::spawn(async move {
            let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
            // The listener stops reading after the cap, so the tail may be refused.
            let _ = stream.write_all(&payload).await;
            tokio::time::sleep(Duration::from_secs(3)).await;
        });

        let message = timeout(Duration::from_millis(1500), listener.listen_once(Some(BUDGET)))
            .await
            .unwrap();
        assert_eq!(message, SyncMessage::Unknown);
        sender.abort();
    }
}

/* signal.rs ends here */
