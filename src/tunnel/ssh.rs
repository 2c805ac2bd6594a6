//! SSH session management for the database tunnel.
//!
//! The tunnel authenticates with a single private key file, then serves a
//! [`LocalForwarder`] whose connections each become a `direct-tcpip` channel
//! to the database endpoint as seen from the SSH host.

use crate::error::{AgentError, AgentResult};
use crate::tunnel::forward::{ChannelOpener, LocalForwarder};
use russh::client::{self, Handle};
use russh::keys::ssh_key::{Algorithm, HashAlg, PublicKey};
use russh::keys::{PrivateKey, PrivateKeyWithHashAlg, load_secret_key};
use russh::{ChannelStream, Disconnect};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Upper bound on the SSH handshake.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Connection details for the SSH host and the database behind it.
#[derive(Debug, Clone)]
pub struct SshSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub key_path: PathBuf,
    /// Database host as resolved on the SSH host
    pub remote_host: String,
    pub remote_port: u16,
}

/// Private key formats accepted for authentication, in preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    Ed25519,
    Rsa,
}

impl KeyFormat {
    pub const PREFERENCE: [KeyFormat; 2] = [KeyFormat::Ed25519, KeyFormat::Rsa];

    pub fn matches(&self, algorithm: &Algorithm) -> bool {
        match self {
            Self::Ed25519 => matches!(algorithm, Algorithm::Ed25519),
            Self::Rsa => matches!(algorithm, Algorithm::Rsa { .. }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Ed25519 => "Ed25519",
            Self::Rsa => "RSA",
        }
    }
}

/// Load the private key at `path`, accepting Ed25519 first and RSA second.
pub fn load_identity(path: &Path) -> AgentResult<(KeyFormat, PrivateKey)> {
    let key = load_secret_key(path, None).map_err(|e| {
        AgentError::authentication(format!(
            "Cannot load private key {}: {}",
            path.display(),
            e
        ))
    })?;

    let algorithm = key.algorithm();
    match KeyFormat::PREFERENCE.iter().find(|f| f.matches(&algorithm)) {
        Some(format) => Ok((*format, key)),
        None => Err(AgentError::authentication(format!(
            "Unsupported key type {} in {}; expected Ed25519 or RSA",
            algorithm.as_str(),
            path.display()
        ))),
    }
}

/// russh client callbacks. Any host key is accepted, as a first-use policy.
pub struct TunnelClient;

impl client::Handler for TunnelClient {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!(
            fingerprint = %server_public_key.fingerprint(HashAlg::Sha256),
            "Accepting SSH host key"
        );
        Ok(true)
    }
}

/// Opens one `direct-tcpip` channel per forwarded connection.
struct SshChannelOpener {
    handle: Arc<Handle<TunnelClient>>,
    remote_host: String,
    remote_port: u16,
}

impl ChannelOpener for SshChannelOpener {
    type Stream = ChannelStream<client::Msg>;

    async fn open(&self, originator: SocketAddr) -> AgentResult<Self::Stream> {
        let channel = self
            .handle
            .channel_open_direct_tcpip(
                self.remote_host.clone(),
                u32::from(self.remote_port),
                originator.ip().to_string(),
                u32::from(originator.port()),
            )
            .await
            .map_err(|e| {
                AgentError::connectivity(
                    format!(
                        "Failed to open channel to {}:{}: {}",
                        self.remote_host, self.remote_port, e
                    ),
                    "Check that the database listens on the remote host",
                )
            })?;
        Ok(channel.into_stream())
    }
}

struct TunnelSession {
    handle: Arc<Handle<TunnelClient>>,
    forwarder: LocalForwarder,
}

/// Owns the SSH transport and the loopback listener that forwards through it.
pub struct TunnelManager {
    settings: SshSettings,
    session: Mutex<Option<TunnelSession>>,
}

impl TunnelManager {
    pub fn new(settings: SshSettings) -> Self {
        Self {
            settings,
            session: Mutex::new(None),
        }
    }

    /// Establish the tunnel and return the local port to connect to.
    ///
    /// Calling this on a running tunnel returns the existing port.
    pub async fn start(&self) -> AgentResult<u16> {
        let mut session = self.session.lock().await;
        if let Some(active) = session.as_ref() {
            debug!(local_port = active.forwarder.local_port(), "Tunnel already running");
            return Ok(active.forwarder.local_port());
        }

        info!(
            host = %self.settings.host,
            port = self.settings.port,
            "Establishing SSH tunnel"
        );

        let (format, key) = load_identity(&self.settings.key_path)?;
        let handle = Arc::new(self.connect(format, key).await?);

        let opener = Arc::new(SshChannelOpener {
            handle: handle.clone(),
            remote_host: self.settings.remote_host.clone(),
            remote_port: self.settings.remote_port,
        });
        let forwarder = match LocalForwarder::bind(opener).await {
            Ok(forwarder) => forwarder,
            Err(e) => {
                disconnect(&handle).await;
                return Err(e);
            }
        };

        let local_port = forwarder.local_port();
        info!(
            local_port,
            remote = %format!("{}:{}", self.settings.remote_host, self.settings.remote_port),
            "SSH tunnel established"
        );

        *session = Some(TunnelSession { handle, forwarder });
        Ok(local_port)
    }

    async fn connect(&self, format: KeyFormat, key: PrivateKey) -> AgentResult<Handle<TunnelClient>> {
        let config = Arc::new(client::Config {
            keepalive_interval: Some(KEEPALIVE_INTERVAL),
            ..Default::default()
        });
        let addr = (self.settings.host.as_str(), self.settings.port);

        let mut handle = match timeout(HANDSHAKE_TIMEOUT, client::connect(config, addr, TunnelClient)).await {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                return Err(AgentError::connectivity(
                    format!(
                        "SSH handshake with {}:{} failed: {}",
                        self.settings.host, self.settings.port, e
                    ),
                    "Check the SSH host, port and network reachability",
                ));
            }
            Err(_) => {
                return Err(AgentError::connectivity(
                    format!(
                        "SSH handshake with {}:{} did not complete within {}s",
                        self.settings.host,
                        self.settings.port,
                        HANDSHAKE_TIMEOUT.as_secs()
                    ),
                    "Check that the SSH port is reachable from this machine",
                ));
            }
        };

        let hash_alg = match format {
            KeyFormat::Ed25519 => None,
            KeyFormat::Rsa => handle.best_supported_rsa_hash().await?.flatten(),
        };

        let auth = handle
            .authenticate_publickey(
                self.settings.username.clone(),
                PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
            )
            .await
            .map_err(|e| AgentError::authentication(e.to_string()))?;

        if !auth.success() {
            disconnect(&handle).await;
            return Err(AgentError::authentication(format!(
                "Server rejected {} key for user '{}'",
                format.name(),
                self.settings.username
            )));
        }

        debug!(key_format = format.name(), "SSH authentication succeeded");
        Ok(handle)
    }

    /// Tear the tunnel down. Safe to call any number of times.
    ///
    /// The listener is closed before the transport so no new channel is
    /// requested from a closing session.
    pub async fn stop(&self) {
        let Some(mut session) = self.session.lock().await.take() else {
            debug!("Tunnel not running, nothing to stop");
            return;
        };

        info!("Closing SSH tunnel");
        session.forwarder.close().await;
        disconnect(&session.handle).await;
        info!("SSH tunnel closed");
    }

    pub async fn is_running(&self) -> bool {
        self.session.lock().await.is_some()
    }

    pub async fn local_port(&self) -> Option<u16> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.forwarder.local_port())
    }

    /// Number of forwarded connections currently open.
    pub async fn active_streams(&self) -> usize {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.forwarder.active_streams())
            .unwrap_or(0)
    }
}

async fn disconnect(handle: &Handle<TunnelClient>) {
    if let Err(e) = handle
        .disconnect(Disconnect::ByApplication, "", "English")
        .await
    {
        warn!(error = %e, "Error closing SSH transport");
    }
}
