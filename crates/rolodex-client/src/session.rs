//! Directory sessions.

use crate::config::SessionConfig;
use crate::connection::Connection;
use rolodex_core::{BindCredentials, Error, Result};
use rolodex_proto::message::BindRequest;
use rolodex_proto::ProtocolOp;
use secrecy::ExposeSecret;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::time::timeout;
use tracing::debug;

/// Authentication state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// The transport is up; no bind has succeeded yet.
    Unauthenticated = 0,
    /// The last bind succeeded.
    Authenticated = 1,
    /// The last bind was rejected. The transport stays usable, so a bind
    /// with different credentials can be retried.
    Failed = 2,
}

/// One authenticated transport to a directory server.
///
/// A session is a cheap handle over a background driver task that owns the
/// socket and multiplexes responses by message ID, so overlapping operations
/// on one session are safe. The transport is released by [`Session::close`]
/// (which sends an UnbindRequest first) or, best-effort, when the session is
/// dropped.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    conn: Connection,
    state: AtomicU8,
}

impl Session {
    /// Opens the transport without binding; the session starts
    /// [`AuthState::Unauthenticated`].
    ///
    /// # Errors
    ///
    /// [`Error::Config`] when the URL in `config` cannot be resolved to a
    /// host and port, [`Error::Timeout`] when the dial exceeds the connect
    /// timeout, and [`Error::Connection`] for transport failure.
    pub async fn open(config: SessionConfig) -> Result<Self> {
        let (host, port) = config.server_addr()?;
        let conn = Connection::open(&host, port, config.connect_timeout()).await?;
        Ok(Self {
            config,
            conn,
            state: AtomicU8::new(AuthState::Unauthenticated as u8),
        })
    }

    /// Opens the transport and binds with the configured credentials.
    ///
    /// # Errors
    ///
    /// Everything [`Session::open`] returns, plus
    /// [`Error::Authentication`] when the server rejects the credentials.
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        let session = Self::open(config).await?;
        let credentials = session.config.credentials().clone();
        session.bind(&credentials).await?;
        Ok(session)
    }

    /// Performs the simple bind handshake with `credentials`.
    ///
    /// On success the session moves to [`AuthState::Authenticated`]. On
    /// rejection it moves to [`AuthState::Failed`] and the transport stays
    /// usable for another attempt.
    ///
    /// # Errors
    ///
    /// [`Error::Authentication`] carrying the server's result code and
    /// diagnostic message when the bind is rejected; [`Error::Timeout`],
    /// [`Error::SessionClosed`], or [`Error::Protocol`] for transport-level
    /// trouble.
    pub async fn bind(&self, credentials: &BindCredentials) -> Result<()> {
        let request = BindRequest::simple(
            credentials.bind_dn(),
            credentials.password().expose_secret().as_bytes(),
        );
        let mut op = self.conn.send(ProtocolOp::BindRequest(request), Vec::new())?;
        let response = timeout(self.config.operation_timeout(), op.recv())
            .await
            .map_err(|_| Error::Timeout("bind timed out".to_string()))??;

        let result = match response.op {
            ProtocolOp::BindResponse(result) => result,
            other => {
                return Err(Error::Protocol(format!(
                    "expected BindResponse, got {}",
                    other.name()
                )))
            }
        };

        if result.code.is_success() {
            self.set_state(AuthState::Authenticated);
            debug!(bind_dn = credentials.bind_dn(), "bind succeeded");
            Ok(())
        } else {
            self.set_state(AuthState::Failed);
            debug!(bind_dn = credentials.bind_dn(), code = %result.code, "bind rejected");
            Err(Error::Authentication {
                code: result.code,
                message: result.message,
            })
        }
    }

    /// Current authentication state.
    #[must_use]
    pub fn state(&self) -> AuthState {
        match self.state.load(Ordering::SeqCst) {
            1 => AuthState::Authenticated,
            2 => AuthState::Failed,
            _ => AuthState::Unauthenticated,
        }
    }

    /// The configuration this session was opened with.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Sends an UnbindRequest and releases the transport, waiting for the
    /// driver to finish its final writes.
    pub async fn close(self) {
        let Self { conn, .. } = self;
        conn.close().await;
    }

    pub(crate) const fn connection(&self) -> &Connection {
        &self.conn
    }

    fn set_state(&self, state: AuthState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}
