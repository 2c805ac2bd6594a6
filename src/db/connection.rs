//! Read-only PostgreSQL sessions through the tunnel.
//!
//! Every session is opened with `default_transaction_read_only=on` as a
//! startup option and runs in autocommit, so the server refuses writes even if
//! a statement slips past the safety gate.

use crate::error::{AgentError, AgentResult};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{ConnectOptions, Connection};
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use tracing::{debug, warn};

/// Host used for the local end of the tunnel.
pub const TUNNEL_HOST: &str = "127.0.0.1";

/// Credentials for the database behind the tunnel.
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub database: String,
    pub user: String,
    pub password: String,
}

/// Exponential backoff for transient connection failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// A policy that tries exactly once.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based), doubling up to the cap.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Produces read-only sessions on demand.
#[derive(Debug, Clone)]
pub struct ConnectionFactory {
    options: PgConnectOptions,
    retry: RetryPolicy,
}

impl ConnectionFactory {
    /// Use `options` as given, adding the read-only startup option.
    pub fn new(options: PgConnectOptions, retry: RetryPolicy) -> Self {
        let options = options.options([("default_transaction_read_only", "on")]);
        Self { options, retry }
    }

    /// Connect to the local end of a tunnel listening on `local_port`.
    pub fn for_tunnel(local_port: u16, settings: &DatabaseSettings, retry: RetryPolicy) -> Self {
        let options = PgConnectOptions::new()
            .host(TUNNEL_HOST)
            .port(local_port)
            .database(&settings.database)
            .username(&settings.user)
            .password(&settings.password);
        Self::new(options, retry)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Open a session, retrying connectivity failures with backoff.
    ///
    /// Authentication and configuration failures are returned immediately.
    pub async fn connect(&self) -> AgentResult<ScopedConnection> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.connect_once().await {
                Ok(conn) => {
                    debug!(attempt, "Database session opened");
                    return Ok(ScopedConnection::new(conn));
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Database connection failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn connect_once(&self) -> AgentResult<PgConnection> {
        self.options.connect().await.map_err(|e| match e {
            sqlx::Error::Database(ref db_err) => {
                let suggestion = connection_suggestion(&e);
                let message = db_err.message().to_string();
                // 28xxx: invalid authorization, 3D000: unknown database
                match db_err.code().as_deref() {
                    Some(code) if code.starts_with("28") || code == "3D000" => {
                        AgentError::execution(message, Some(code.to_string()), "")
                    }
                    _ => AgentError::connectivity(message, suggestion),
                }
            }
            other => AgentError::from(other),
        })
    }

    /// Report the server version string, used to check connectivity.
    pub async fn server_version(&self) -> AgentResult<String> {
        let mut conn = self.connect().await?;
        let version = sqlx::query_scalar::<_, String>("SELECT version()")
            .fetch_one(&mut *conn)
            .await;
        conn.close().await;

        let version = version?;
        debug!(version = %version, "Got server version");
        Ok(version)
    }
}

/// Generate a helpful suggestion for connection errors.
fn connection_suggestion(error: &sqlx::Error) -> String {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") {
        return "Check that PostgreSQL is listening on the remote host".to_string();
    }
    if error_str.contains("authentication") || error_str.contains("password") {
        return "Verify the database user and password".to_string();
    }
    if error_str.contains("does not exist") {
        return "Check that the database name exists".to_string();
    }
    "Check that the tunnel is running and the remote database is up".to_string()
}

/// A session that is closed when the caller is done with it.
///
/// Prefer [`ScopedConnection::close`]; dropping still releases the socket,
/// just without the protocol-level goodbye.
pub struct ScopedConnection(PgConnection);

impl ScopedConnection {
    fn new(conn: PgConnection) -> Self {
        Self(conn)
    }

    /// Close the session gracefully. Failures are logged, not returned.
    pub async fn close(self) {
        if let Err(e) = self.0.close().await {
            debug!(error = %e, "Error closing database session");
        }
    }
}

impl Deref for ScopedConnection {
    type Target = PgConnection;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for ScopedConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}
