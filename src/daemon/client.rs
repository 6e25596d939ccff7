//! Blocking client for the transcription daemon.
//!
//! Each call opens a fresh TCP connection, writes one request, half-closes
//! and reads the single response. The session token handed out by the
//! daemon is cached and attached to later requests.

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use super::health::ServiceStatus;
use super::protocol::{Action, DEFAULT_HOST, DEFAULT_PORT, Request, Response, Status};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("daemon not reachable at {addr}: {source}")]
    Unavailable {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out waiting for daemon")]
    Timeout,

    #[error("i/o error talking to daemon: {0}")]
    Io(#[from] std::io::Error),

    /// The daemon closed the connection without answering.
    #[error("daemon closed the connection without a response")]
    NoResponse,

    #[error("invalid response: {0}")]
    Decode(#[from] serde_json::Error),

    /// A structured `error` response.
    #[error("daemon error: {0}")]
    Server(String),

    #[error("unexpected response status {0:?}")]
    UnexpectedStatus(Status),
}

impl ClientError {
    /// Token rejected by the daemon; a fresh one will be issued on retry.
    fn is_token_rejection(&self) -> bool {
        matches!(self, ClientError::Server(msg) if msg.starts_with("Invalid token") || msg == "Token expired")
    }

    fn is_not_ready(&self) -> bool {
        matches!(self, ClientError::Server(msg) if msg.starts_with("Model not ready"))
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Extra attempts when the model is still loading.
    pub not_ready_retries: u32,
    pub retry_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(120),
            not_ready_retries: 30,
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Defaults overridden by `ASR_DAEMON_HOST`, `ASR_DAEMON_PORT` and
    /// `ASR_DAEMON_CLIENT_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(host) = dotenvy::var("ASR_DAEMON_HOST") {
            cfg.host = host;
        }

        if let Ok(val) = dotenvy::var("ASR_DAEMON_PORT")
            && let Ok(port) = val.parse()
        {
            cfg.port = port;
        }

        if let Ok(val) = dotenvy::var("ASR_DAEMON_CLIENT_TIMEOUT_SECS")
            && let Ok(secs) = val.parse()
        {
            cfg.request_timeout = Duration::from_secs(secs);
        }

        cfg
    }

    fn addr_string(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug)]
pub struct DaemonClient {
    config: ClientConfig,
    token: Mutex<Option<String>>,
}

impl DaemonClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            token: Mutex::new(None),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ClientConfig::from_env())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Token currently held, if any.
    pub fn token(&self) -> Option<String> {
        self.token.lock().clone()
    }

    fn resolve(&self) -> Result<SocketAddr, ClientError> {
        let addr = self.config.addr_string();
        addr.to_socket_addrs()
            .map_err(|source| ClientError::Unavailable {
                addr: addr.clone(),
                source,
            })?
            .next()
            .ok_or_else(|| ClientError::Unavailable {
                addr,
                source: std::io::Error::new(ErrorKind::NotFound, "no address resolved"),
            })
    }

    /// Send a request as-is and return the raw response, whatever its status.
    pub fn send_raw(&self, request: &Request) -> Result<Response, ClientError> {
        let addr = self.resolve()?;
        let mut stream = TcpStream::connect_timeout(&addr, self.config.connect_timeout).map_err(
            |source| ClientError::Unavailable {
                addr: addr.to_string(),
                source,
            },
        )?;
        stream.set_read_timeout(Some(self.config.request_timeout))?;
        stream.set_write_timeout(Some(self.config.request_timeout))?;

        stream.write_all(&request.to_bytes()?)?;
        stream.shutdown(Shutdown::Write)?;

        let mut reply = Vec::new();
        match stream.read_to_end(&mut reply) {
            Ok(_) => {}
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Err(ClientError::Timeout);
            }
            Err(e) if e.kind() == ErrorKind::ConnectionReset && reply.is_empty() => {
                return Err(ClientError::NoResponse);
            }
            Err(e) => return Err(e.into()),
        }

        if reply.is_empty() {
            return Err(ClientError::NoResponse);
        }
        Ok(Response::from_slice(&reply)?)
    }

    /// Send with the cached token, store any newly issued token, and turn
    /// `error` responses into [`ClientError::Server`].
    pub fn send(&self, request: Request) -> Result<Response, ClientError> {
        let request = request.with_token(self.token());
        let response = self.send_raw(&request)?;

        if let Some(token) = &response.token {
            debug!("Stored session token");
            *self.token.lock() = Some(token.clone());
        }

        match response.status {
            Status::Error => Err(ClientError::Server(response.error.unwrap_or_default())),
            _ => Ok(response),
        }
    }

    /// `send`, retrying once with a fresh token if ours was rejected.
    fn send_authenticated(&self, request: Request) -> Result<Response, ClientError> {
        match self.send(request.clone()) {
            Err(e) if e.is_token_rejection() => {
                debug!(error = %e, "Token rejected, requesting a new one");
                *self.token.lock() = None;
                self.send(request)
            }
            other => other,
        }
    }

    /// Transcribe a file, waiting out a model that is still loading.
    pub fn transcribe(&self, audio: &Path) -> Result<String, ClientError> {
        let request = Request::transcribe(audio.to_string_lossy());
        let mut attempts = 0;
        loop {
            match self.send_authenticated(request.clone()) {
                Ok(response) if response.status == Status::Success => {
                    return Ok(response.text.unwrap_or_default());
                }
                Ok(response) => return Err(ClientError::UnexpectedStatus(response.status)),
                Err(e) if e.is_not_ready() && attempts < self.config.not_ready_retries => {
                    attempts += 1;
                    debug!(attempts, "Model not ready, retrying");
                    std::thread::sleep(self.config.retry_delay);
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn health(&self) -> Result<ServiceStatus, ClientError> {
        let response = self.send(Request::new(Action::HealthCheck))?;
        match response.health {
            Some(status) if response.status == Status::Success => Ok(status),
            _ => Err(ClientError::UnexpectedStatus(response.status)),
        }
    }

    pub fn shutdown(&self) -> Result<(), ClientError> {
        let response = self.send_authenticated(Request::new(Action::Shutdown))?;
        match response.status {
            Status::Shutdown => {
                *self.token.lock() = None;
                Ok(())
            }
            other => Err(ClientError::UnexpectedStatus(other)),
        }
    }
}
