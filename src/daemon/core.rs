//! Connection server for the transcription daemon.
//!
//! Listens on TCP and serves exactly one request per connection on its own
//! worker thread. The accept loop polls a running flag, so a `shutdown`
//! request or [`ShutdownHandle::request_shutdown`] stops new accepts while
//! in-flight workers finish.

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::config::ServiceConfig;

use super::error::DaemonError;
use super::health::{ConnectionCounters, HealthReporter, ServiceStatus};
use super::model::{ModelBackend, ModelHandle};
use super::protocol::{DEFAULT_HOST, DEFAULT_PORT, ParseOutcome, Response, parse_request};
use super::router::RequestRouter;
use super::security::SecurityGate;
use super::validation::Validator;

const ACCEPT_POLL: Duration = Duration::from_millis(10);
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);
const READ_CHUNK: usize = 4096;

/// Listener and worker settings.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub host: String,
    pub port: u16,
    /// Maximum concurrently active workers.
    pub max_connections: usize,
    /// Read/write timeout on each client socket.
    pub request_timeout: Duration,
    /// Largest request body accepted.
    pub max_message_bytes: usize,
    /// How often expired tokens are swept.
    pub token_sweep_interval: Duration,
    pub enable_input_validation: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_connections: 10,
            request_timeout: Duration::from_secs(30),
            max_message_bytes: 64 * 1024,
            token_sweep_interval: Duration::from_secs(300),
            enable_input_validation: true,
        }
    }
}

/// Stops a running server from another thread.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    running: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn request_shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Owns the listening socket and the accept loop.
#[derive(Debug)]
pub struct ConnectionServer {
    options: ServerOptions,
    model: Arc<ModelHandle>,
    security: Arc<SecurityGate>,
    health: Arc<HealthReporter>,
    router: Arc<RequestRouter>,
    connections: Arc<ConnectionCounters>,
    running: Arc<AtomicBool>,
}

impl ConnectionServer {
    pub fn new(
        options: ServerOptions,
        model: Arc<ModelHandle>,
        security: Arc<SecurityGate>,
        validator: Arc<Validator>,
    ) -> Self {
        let connections = Arc::new(ConnectionCounters::default());
        let running = Arc::new(AtomicBool::new(true));
        let health = Arc::new(HealthReporter::new(
            Arc::clone(&model),
            Arc::clone(&security),
            Arc::clone(&validator),
            Arc::clone(&connections),
        ));
        let router = RequestRouter::new(
            Arc::clone(&model),
            Arc::clone(&security),
            validator,
            Arc::clone(&health),
            Arc::clone(&running),
        )
        .with_input_validation(options.enable_input_validation);

        Self {
            options,
            model,
            security,
            health,
            router: Arc::new(router),
            connections,
            running,
        }
    }

    /// Wire every component from a validated configuration.
    pub fn from_config(config: &ServiceConfig, backend: Arc<dyn ModelBackend>) -> Self {
        let model = Arc::new(ModelHandle::new(
            config.model.model_identifier.clone(),
            config.model.cache_dir.clone(),
            backend,
            config.model.inference_policy,
        ));
        let security = Arc::new(SecurityGate::new(config.security_config()));
        let validator = Arc::new(Validator::new(config.validator_config()));
        Self::new(config.server_options(), model, security, validator)
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    pub fn model(&self) -> &Arc<ModelHandle> {
        &self.model
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            running: Arc::clone(&self.running),
        }
    }

    pub fn get_status(&self) -> ServiceStatus {
        self.health.get_status()
    }

    /// Bind the listening socket. Failure here is the only fatal error.
    pub fn bind(&self) -> std::io::Result<TcpListener> {
        let listener = TcpListener::bind((self.options.host.as_str(), self.options.port))?;
        listener.set_nonblocking(true)?;
        Ok(listener)
    }

    /// Bind and serve until shutdown.
    pub fn run(&self) -> std::io::Result<()> {
        let listener = self.bind()?;
        self.serve(listener)
    }

    /// Run the accept loop on an already bound listener.
    pub fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        listener.set_nonblocking(true)?;
        let local = listener.local_addr()?;
        info!(
            addr = %local,
            model = self.model.model_id(),
            max_connections = self.options.max_connections,
            "Daemon listening"
        );

        if self.model.spawn_background_load() {
            info!("Pre-warming model");
        }

        let mut workers: Vec<JoinHandle<()>> = Vec::new();
        let mut last_sweep = Instant::now();

        loop {
            if !self.running.load(Ordering::SeqCst) {
                info!("Shutdown requested, no longer accepting connections");
                break;
            }

            if last_sweep.elapsed() >= self.options.token_sweep_interval {
                let swept = self.security.sweep();
                if swept > 0 {
                    info!(swept, "Expired tokens removed");
                }
                last_sweep = Instant::now();
            }

            workers.retain(|worker| !worker.is_finished());

            match listener.accept() {
                Ok((stream, peer)) => {
                    if !self.running.load(Ordering::SeqCst) {
                        debug!(client = %peer, "Connection arrived after shutdown, dropping");
                        break;
                    }

                    let active = self.connections.active();
                    if active >= self.options.max_connections as u64 {
                        warn!(
                            client = %peer,
                            active,
                            max = self.options.max_connections,
                            "Max connections reached, rejecting"
                        );
                        drop(stream);
                        continue;
                    }

                    match self.spawn_worker(stream, peer) {
                        Ok(worker) => workers.push(worker),
                        Err(e) => error!(error = %e, "Failed to spawn connection worker"),
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(ACCEPT_POLL);
                }
                Err(e) => {
                    error!(error = %e, "Accept error");
                    std::thread::sleep(ACCEPT_ERROR_BACKOFF);
                }
            }
        }

        drop(listener);
        let draining = workers.len();
        if draining > 0 {
            info!(draining, "Waiting for in-flight connections");
        }
        for worker in workers {
            if worker.join().is_err() {
                warn!("Connection worker panicked");
            }
        }

        info!("Daemon stopped");
        Ok(())
    }

    fn spawn_worker(&self, stream: TcpStream, peer: SocketAddr) -> std::io::Result<JoinHandle<()>> {
        self.connections.opened();
        let guard = ActiveGuard(Arc::clone(&self.connections));
        let router = Arc::clone(&self.router);
        let options = self.options.clone();

        // On spawn failure the closure is dropped, and the guard with it.
        std::thread::Builder::new()
            .name(format!("asr-conn-{}", peer.port()))
            .spawn(move || {
                let _guard = guard;
                debug!(client = %peer, "Client connected");
                if let Err(e) = handle_connection(stream, peer, &router, &options) {
                    debug!(client = %peer, error = %e, "Connection error");
                }
            })
    }
}

/// Decrements the active count when a worker ends, even on panic.
struct ActiveGuard(Arc<ConnectionCounters>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.closed();
    }
}

/// Read one request, route it, write one response, close.
///
/// Malformed or oversized bodies close the socket without a response.
fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    router: &RequestRouter,
    options: &ServerOptions,
) -> std::io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(options.request_timeout))?;
    stream.set_write_timeout(Some(options.request_timeout))?;

    let Some(parsed) = read_request(&mut stream, peer, options.max_message_bytes)? else {
        return Ok(());
    };

    let response = match parsed {
        Ok(request) => router.handle(&request, peer),
        Err(e) if e.is_silent() => {
            warn!(client = %peer, error = %e, "Malformed request, closing connection");
            return Ok(());
        }
        Err(e) => Response::from(&e),
    };
    let encoded = response.to_bytes().map_err(std::io::Error::other)?;
    stream.write_all(&encoded)?;
    stream.flush()?;
    let _ = stream.shutdown(Shutdown::Both);
    Ok(())
}

fn read_request(
    stream: &mut TcpStream,
    peer: SocketAddr,
    max_message_bytes: usize,
) -> std::io::Result<Option<Result<super::protocol::Request, DaemonError>>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let n = match stream.read(&mut chunk) {
            Ok(n) => n,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                debug!(client = %peer, "Read timed out, abandoning connection");
                return Ok(None);
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        if n > 0 {
            buf.extend_from_slice(&chunk[..n]);
            if buf.len() > max_message_bytes {
                warn!(
                    client = %peer,
                    len = buf.len(),
                    max = max_message_bytes,
                    "Request too large, closing connection"
                );
                return Ok(None);
            }
        }

        match parse_request(&buf) {
            Ok(ParseOutcome::Complete(request)) => return Ok(Some(Ok(request))),
            Ok(ParseOutcome::Incomplete) if n > 0 => continue,
            Ok(ParseOutcome::Incomplete) => {
                debug!(client = %peer, "Client closed before sending a complete request");
                return Ok(None);
            }
            Err(e) => return Ok(Some(Err(e))),
        }
    }
}
