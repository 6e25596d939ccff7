//! Per-request state machine.
//!
//! ```text
//! Idle ─▶ Validating ─▶ Authorizing ─▶ Dispatching ─▶ Responded
//!              │              │              │
//!              └──────────────┴──────────────┴──▶ Responded (error)
//! ```
//!
//! `health_check` is only rate limited; it skips token authentication so
//! it stays usable as a lightweight probe. `shutdown` skips file checks.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::{debug, info, trace, warn};

use super::error::{DaemonError, ResourceError};
use super::health::HealthReporter;
use super::model::ModelHandle;
use super::protocol::{Action, Request, Response};
use super::security::SecurityGate;
use super::validation::Validator;

/// Longest transcript prefix written to logs.
const LOG_PREVIEW_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    Idle,
    Validating,
    Authorizing,
    Dispatching,
    Responded,
}

struct Route<'a> {
    action: &'a Action,
    client: &'a str,
    state: RouteState,
}

impl Route<'_> {
    fn advance(&mut self, next: RouteState) {
        trace!(
            action = %self.action,
            client = self.client,
            from = ?self.state,
            to = ?next,
            "Route transition"
        );
        self.state = next;
    }
}

/// Routes a parsed request through validation, security and dispatch.
#[derive(Debug)]
pub struct RequestRouter {
    model: Arc<ModelHandle>,
    security: Arc<SecurityGate>,
    validator: Arc<Validator>,
    health: Arc<HealthReporter>,
    running: Arc<AtomicBool>,
    validate_input: bool,
}

impl RequestRouter {
    pub fn new(
        model: Arc<ModelHandle>,
        security: Arc<SecurityGate>,
        validator: Arc<Validator>,
        health: Arc<HealthReporter>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            model,
            security,
            validator,
            health,
            running,
            validate_input: true,
        }
    }

    /// Turn content screening off. Structural checks still apply.
    pub fn with_input_validation(mut self, enabled: bool) -> Self {
        self.validate_input = enabled;
        self
    }

    /// Handle one request from `peer` and produce its single response.
    pub fn handle(&self, request: &Request, peer: SocketAddr) -> Response {
        let client_id = peer.ip().to_string();
        let mut route = Route {
            action: request.action(),
            client: &client_id,
            state: RouteState::Idle,
        };
        let mut issued_token = None;

        let response = match self.route(request, peer, &mut route, &mut issued_token) {
            Ok(response) => response,
            Err(err) => {
                debug!(
                    action = %request.action(),
                    client = %client_id,
                    category = err.category(),
                    retryable = err.is_retryable(),
                    error = %err,
                    "Request failed"
                );
                Response::from(&err)
            }
        };
        route.advance(RouteState::Responded);
        response.with_token(issued_token)
    }

    fn route(
        &self,
        request: &Request,
        peer: SocketAddr,
        route: &mut Route<'_>,
        issued_token: &mut Option<String>,
    ) -> Result<Response, DaemonError> {
        route.advance(RouteState::Validating);
        self.validate(request, peer)?;

        route.advance(RouteState::Authorizing);
        if *request.action() == Action::HealthCheck {
            self.security.check_rate_limit(route.client)?;
        } else {
            let auth = self.security.authorize(route.client, request.token())?;
            *issued_token = auth.issued_token().map(str::to_string);
        }

        route.advance(RouteState::Dispatching);
        match request.action() {
            Action::Transcribe => self.transcribe(request),
            Action::Shutdown => Ok(self.shutdown(route.client)),
            Action::HealthCheck => Ok(self.health_check()),
            Action::Unknown(raw) => Err(DaemonError::Protocol(raw.clone())),
        }
    }

    fn validate(&self, request: &Request, peer: SocketAddr) -> Result<(), DaemonError> {
        let address = self.validator.validate_client_address(&peer);
        if address.blocks() {
            return Err(DaemonError::Validation(address.message));
        }

        if let Action::Unknown(raw) = request.action() {
            return Err(DaemonError::Protocol(raw.clone()));
        }

        if !self.validate_input {
            if *request.action() == Action::Transcribe && request.audio_file().is_none() {
                return Err(DaemonError::Validation(
                    "audio_file is required for transcribe action".into(),
                ));
            }
            return Ok(());
        }

        let result = self.validator.validate(request);
        if result.blocks() {
            return Err(DaemonError::Validation(result.message));
        }
        Ok(())
    }

    fn transcribe(&self, request: &Request) -> Result<Response, DaemonError> {
        let audio_file = request.audio_file().ok_or_else(|| {
            DaemonError::Validation("audio_file is required for transcribe action".into())
        })?;

        let start = Instant::now();
        match self.model.transcribe(Path::new(audio_file)) {
            Ok(text) => {
                let preview: String = text.chars().take(LOG_PREVIEW_CHARS).collect();
                info!(
                    audio = audio_file,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    preview = %preview,
                    "Transcription complete"
                );
                Ok(Response::success(text))
            }
            Err(err @ ResourceError::ModelNotReady { .. }) => {
                if self.model.spawn_background_load() {
                    info!(model = self.model.model_id(), "Started model load on demand");
                }
                Err(err.into())
            }
            Err(err) => {
                warn!(audio = audio_file, error = %err, "Transcription failed");
                Err(err.into())
            }
        }
    }

    fn shutdown(&self, client: &str) -> Response {
        info!(client, "Shutdown requested");
        self.running.store(false, Ordering::SeqCst);
        Response::shutdown()
    }

    fn health_check(&self) -> Response {
        let status = self.health.get_status();
        Response::success(status.model_state.as_str()).with_health(status)
    }
}
