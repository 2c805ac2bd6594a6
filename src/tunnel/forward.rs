//! Local port forwarding.
//!
//! A [`LocalForwarder`] owns one loopback listener on an OS-assigned port.
//! Each accepted connection gets its own remote stream from a
//! [`ChannelOpener`], and bytes are copied by two tasks, one per direction.
//! When either direction finishes, both ends of the pair are closed.

use crate::error::{AgentError, AgentResult};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Bytes read per copy step in each direction.
pub const FORWARD_BUFFER_SIZE: usize = 4096;

const LOOPBACK: &str = "127.0.0.1";

/// Pause after a failed accept so a persistent error cannot spin the loop.
const ACCEPT_ERROR_PAUSE: Duration = Duration::from_millis(50);

/// Source of remote streams, one per accepted local connection.
pub trait ChannelOpener: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Open a stream to the forwarding target on behalf of `originator`.
    fn open(&self, originator: SocketAddr)
    -> impl Future<Output = AgentResult<Self::Stream>> + Send;
}

/// A loopback listener whose connections are forwarded through a [`ChannelOpener`].
#[derive(Debug)]
pub struct LocalForwarder {
    local_addr: SocketAddr,
    active: Arc<AtomicUsize>,
    accept_task: Option<JoinHandle<()>>,
}

impl LocalForwarder {
    /// Bind `127.0.0.1:0` and start accepting connections in the background.
    pub async fn bind<O: ChannelOpener>(opener: Arc<O>) -> AgentResult<Self> {
        let listener = TcpListener::bind((LOOPBACK, 0)).await.map_err(|e| {
            AgentError::connectivity(
                format!("Failed to bind local forwarding port: {}", e),
                "Check that loopback networking is available",
            )
        })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| AgentError::internal(format!("Listener has no local address: {}", e)))?;

        let active = Arc::new(AtomicUsize::new(0));
        let accept_task = tokio::spawn(accept_loop(listener, opener, active.clone()));

        debug!(local_addr = %local_addr, "Forwarding listener started");

        Ok(Self {
            local_addr,
            active,
            accept_task: Some(accept_task),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn local_port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Number of forwarded pairs currently open.
    pub fn active_streams(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Stop accepting connections and release the listening socket.
    ///
    /// Pairs that are already forwarding keep running until either end closes.
    pub async fn close(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
            match task.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => warn!(error = %e, "Accept loop ended abnormally"),
            }
            debug!(local_addr = %self.local_addr, "Forwarding listener closed");
        }
    }
}

impl Drop for LocalForwarder {
    fn drop(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
    }
}

/// Decrements the active pair count when a forwarded connection ends.
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn accept_loop<O: ChannelOpener>(
    listener: TcpListener,
    opener: Arc<O>,
    active: Arc<AtomicUsize>,
) {
    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                error!(error = %e, "Failed to accept forwarded connection");
                tokio::time::sleep(ACCEPT_ERROR_PAUSE).await;
                continue;
            }
        };

        debug!(peer = %peer, "New forwarded connection");

        let opener = opener.clone();
        let active = active.clone();
        tokio::spawn(async move {
            let channel = match opener.open(peer).await {
                Ok(channel) => channel,
                Err(e) => {
                    warn!(peer = %peer, error = %e, "Failed to open forwarding channel");
                    return;
                }
            };

            let _guard = ActiveGuard::new(active);
            let (sent, received) = forward_pair(socket, channel).await;
            info!(peer = %peer, sent, received, "Forwarded connection closed");
        });
    }
}

/// Copy bytes both ways between `local` and `remote` until either side ends.
///
/// Returns `(bytes local->remote, bytes remote->local)`. Both streams are
/// dropped before this returns, so neither side is left half-open.
pub async fn forward_pair<L, R>(local: L, remote: R) -> (u64, u64)
where
    L: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    R: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (local_read, local_write) = tokio::io::split(local);
    let (remote_read, remote_write) = tokio::io::split(remote);

    let sent = Arc::new(AtomicU64::new(0));
    let received = Arc::new(AtomicU64::new(0));

    let mut upstream = tokio::spawn(pump(local_read, remote_write, sent.clone(), "local->remote"));
    let mut downstream = tokio::spawn(pump(
        remote_read,
        local_write,
        received.clone(),
        "remote->local",
    ));

    // The first direction to finish takes the other one down with it.
    let survivor = tokio::select! {
        _ = &mut upstream => downstream,
        _ = &mut downstream => upstream,
    };
    survivor.abort();
    if let Err(e) = survivor.await {
        if !e.is_cancelled() {
            warn!(error = %e, "Forwarding task failed");
        }
    }

    (sent.load(Ordering::SeqCst), received.load(Ordering::SeqCst))
}

async fn pump<R, W>(mut reader: R, mut writer: W, copied: Arc<AtomicU64>, direction: &'static str)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; FORWARD_BUFFER_SIZE];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(direction, error = %e, "Forwarding read failed");
                break;
            }
        };
        if let Err(e) = writer.write_all(&buf[..n]).await {
            debug!(direction, error = %e, "Forwarding write failed");
            break;
        }
        copied.fetch_add(n as u64, Ordering::SeqCst);
    }

    if let Err(e) = writer.shutdown().await {
        debug!(direction, error = %e, "Forwarding shutdown failed");
    }
}
