//! Authentication and rate limiting.
//!
//! [`SecurityGate::authorize`] runs the sliding-window rate limiter first,
//! then token authentication. A client that presents no token is issued
//! one and allowed through; the token must accompany later requests.
//!
//! Token layout: `base64url(json payload) "." hex(hmac_sha256(secret, base64 part))`.
//! The signing secret is random per process.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use parking_lot::Mutex;
use rand::RngCore;
use ring::hmac;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::error::SecurityError;

/// Knobs for the gate. Built from the `security` config section.
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub enable_authentication: bool,
    pub enable_rate_limiting: bool,
    pub max_requests_per_window: usize,
    pub rate_limit_window: Duration,
    pub token_expiry: Duration,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_authentication: true,
            enable_rate_limiting: true,
            max_requests_per_window: 60,
            rate_limit_window: Duration::from_secs(60),
            token_expiry: Duration::from_secs(3600),
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Rate limiting
// ---------------------------------------------------------------------------

/// Current window usage for one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClientRateStats {
    pub requests_in_window: usize,
    pub remaining: usize,
}

/// Sliding-window limiter keyed by client id.
///
/// Timestamps older than the window are pruned lazily on each check.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    requests: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            requests: Mutex::new(HashMap::new()),
        }
    }

    pub fn check(&self, client_id: &str) -> bool {
        self.check_at(client_id, Instant::now())
    }

    /// Record a request at `now` if the client has room in its window.
    ///
    /// A rejected request does not consume a slot.
    pub fn check_at(&self, client_id: &str, now: Instant) -> bool {
        let mut requests = self.requests.lock();
        let timestamps = requests.entry(client_id.to_string()).or_default();
        prune(timestamps, now, self.window);

        if timestamps.len() >= self.max_requests {
            warn!(
                client = client_id,
                request_count = timestamps.len(),
                limit = self.max_requests,
                "Rate limit exceeded"
            );
            return false;
        }

        timestamps.push_back(now);
        true
    }

    pub fn client_stats(&self, client_id: &str) -> ClientRateStats {
        self.client_stats_at(client_id, Instant::now())
    }

    pub fn client_stats_at(&self, client_id: &str, now: Instant) -> ClientRateStats {
        let mut requests = self.requests.lock();
        let count = match requests.get_mut(client_id) {
            Some(timestamps) => {
                prune(timestamps, now, self.window);
                timestamps.len()
            }
            None => 0,
        };
        ClientRateStats {
            requests_in_window: count,
            remaining: self.max_requests.saturating_sub(count),
        }
    }

    /// Drop clients with no requests inside the window.
    pub fn prune_idle_at(&self, now: Instant) -> usize {
        let mut requests = self.requests.lock();
        let before = requests.len();
        requests.retain(|_, timestamps| {
            prune(timestamps, now, self.window);
            !timestamps.is_empty()
        });
        before - requests.len()
    }

    pub fn tracked_clients(&self) -> usize {
        self.requests.lock().len()
    }
}

fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = timestamps.front() {
        if now.saturating_duration_since(*oldest) >= window {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenClaims {
    client_id: String,
    issued_at: u64,
    expires_at: u64,
    nonce: String,
}

#[derive(Debug, Clone)]
struct TokenRecord {
    client_id: String,
    expires_at: u64,
}

/// Issues, verifies and revokes signed tokens.
pub struct TokenManager {
    key: hmac::Key,
    expiry: Duration,
    tokens: Mutex<HashMap<String, TokenRecord>>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("expiry", &self.expiry)
            .field("active", &self.active_count())
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    /// Manager with a fresh random secret.
    pub fn new(expiry: Duration) -> Self {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Self::with_secret(&secret, expiry)
    }

    pub fn with_secret(secret: &[u8], expiry: Duration) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
            expiry,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    pub fn issue(&self, client_id: &str) -> String {
        self.issue_at(client_id, unix_now())
    }

    /// Issue a token whose clock starts at `now` (unix seconds).
    pub fn issue_at(&self, client_id: &str, now: u64) -> String {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);
        let claims = TokenClaims {
            client_id: client_id.to_string(),
            issued_at: now,
            expires_at: now.saturating_add(self.expiry.as_secs()),
            nonce: hex::encode(nonce),
        };

        // Serialising a struct of strings and integers cannot fail.
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap_or_default());
        let signature = hex::encode(hmac::sign(&self.key, payload.as_bytes()).as_ref());
        let token = format!("{payload}.{signature}");

        self.tokens.lock().insert(
            token.clone(),
            TokenRecord {
                client_id: claims.client_id,
                expires_at: claims.expires_at,
            },
        );
        info!(client = client_id, expires_at = claims.expires_at, "Token issued");
        token
    }

    pub fn verify(&self, token: &str) -> Result<String, SecurityError> {
        self.verify_at(token, unix_now())
    }

    /// Verify signature, expiry and presence in the store.
    ///
    /// Returns the client id the token was issued to.
    pub fn verify_at(&self, token: &str, now: u64) -> Result<String, SecurityError> {
        let (payload, signature) = token
            .rsplit_once('.')
            .ok_or_else(|| SecurityError::TokenInvalid("malformed token".into()))?;

        let signature = hex::decode(signature)
            .map_err(|_| SecurityError::TokenInvalid("malformed signature".into()))?;
        hmac::verify(&self.key, payload.as_bytes(), &signature)
            .map_err(|_| SecurityError::TokenInvalid("signature mismatch".into()))?;

        let claims: TokenClaims = URL_SAFE_NO_PAD
            .decode(payload)
            .ok()
            .and_then(|raw| serde_json::from_slice(&raw).ok())
            .ok_or_else(|| SecurityError::TokenInvalid("malformed payload".into()))?;

        if now >= claims.expires_at {
            self.tokens.lock().remove(token);
            warn!(client = %claims.client_id, "Token expired");
            return Err(SecurityError::TokenExpired);
        }

        if !self.tokens.lock().contains_key(token) {
            return Err(SecurityError::TokenInvalid("Token not found".into()));
        }

        Ok(claims.client_id)
    }

    pub fn revoke(&self, token: &str) -> bool {
        match self.tokens.lock().remove(token) {
            Some(record) => {
                info!(client = %record.client_id, "Token revoked");
                true
            }
            None => false,
        }
    }

    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(unix_now())
    }

    pub fn sweep_expired_at(&self, now: u64) -> usize {
        let mut tokens = self.tokens.lock();
        let before = tokens.len();
        tokens.retain(|_, record| record.expires_at > now);
        let removed = before - tokens.len();
        if removed > 0 {
            debug!(removed, "Swept expired tokens");
        }
        removed
    }

    pub fn active_count(&self) -> usize {
        self.tokens.lock().len()
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// Result of a successful [`SecurityGate::authorize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    /// Authentication is turned off.
    Disabled,
    /// No token was presented; this one was issued.
    Issued(String),
    /// The presented token checked out.
    Verified { client_id: String },
}

impl Authorization {
    /// Token to hand back to the client, if one was issued.
    pub fn issued_token(&self) -> Option<&str> {
        match self {
            Authorization::Issued(token) => Some(token.as_str()),
            _ => None,
        }
    }
}

/// Counters since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityStats {
    pub total_requests: u64,
    pub blocked_requests: u64,
    pub authentication_failures: u64,
    pub rate_limit_violations: u64,
    pub tokens_issued: u64,
    pub active_tokens: u64,
    pub block_rate: f64,
    pub auth_failure_rate: f64,
    pub rate_limit_violation_rate: f64,
}

#[derive(Debug, Default)]
struct Counters {
    total_requests: AtomicU64,
    blocked_requests: AtomicU64,
    authentication_failures: AtomicU64,
    rate_limit_violations: AtomicU64,
    tokens_issued: AtomicU64,
}

#[derive(Debug)]
pub struct SecurityGate {
    config: SecurityConfig,
    limiter: RateLimiter,
    tokens: TokenManager,
    counters: Counters,
}

impl SecurityGate {
    pub fn new(config: SecurityConfig) -> Self {
        let limiter = RateLimiter::new(config.max_requests_per_window, config.rate_limit_window);
        let tokens = TokenManager::new(config.token_expiry);
        Self {
            config,
            limiter,
            tokens,
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn authorize(
        &self,
        client_id: &str,
        token: Option<&str>,
    ) -> Result<Authorization, SecurityError> {
        self.authorize_at(client_id, token, Instant::now(), unix_now())
    }

    /// Rate limit, then authenticate. `now`/`unix_now` drive both clocks.
    pub fn authorize_at(
        &self,
        client_id: &str,
        token: Option<&str>,
        now: Instant,
        unix_now: u64,
    ) -> Result<Authorization, SecurityError> {
        self.counters.total_requests.fetch_add(1, Ordering::Relaxed);

        self.check_rate_limit_at(client_id, now)?;

        if !self.config.enable_authentication {
            return Ok(Authorization::Disabled);
        }

        match token.filter(|t| !t.is_empty()) {
            None => {
                self.counters.tokens_issued.fetch_add(1, Ordering::Relaxed);
                Ok(Authorization::Issued(self.tokens.issue_at(client_id, unix_now)))
            }
            Some(token) => match self.tokens.verify_at(token, unix_now) {
                Ok(client_id) => Ok(Authorization::Verified { client_id }),
                Err(e) => {
                    self.counters
                        .authentication_failures
                        .fetch_add(1, Ordering::Relaxed);
                    self.counters.blocked_requests.fetch_add(1, Ordering::Relaxed);
                    warn!(client = client_id, reason = %e, "Authentication failed");
                    Err(e)
                }
            },
        }
    }

    /// Rate limit only, for actions that skip authentication.
    pub fn check_rate_limit(&self, client_id: &str) -> Result<(), SecurityError> {
        self.counters.total_requests.fetch_add(1, Ordering::Relaxed);
        self.check_rate_limit_at(client_id, Instant::now())
    }

    fn check_rate_limit_at(&self, client_id: &str, now: Instant) -> Result<(), SecurityError> {
        if !self.config.enable_rate_limiting || self.limiter.check_at(client_id, now) {
            return Ok(());
        }
        self.counters
            .rate_limit_violations
            .fetch_add(1, Ordering::Relaxed);
        self.counters.blocked_requests.fetch_add(1, Ordering::Relaxed);
        Err(SecurityError::RateLimitExceeded {
            limit: self.config.max_requests_per_window,
            window_secs: self.config.rate_limit_window.as_secs(),
        })
    }

    /// Periodic housekeeping: expired tokens and idle rate-limit entries.
    pub fn sweep(&self) -> usize {
        let idle = self.limiter.prune_idle_at(Instant::now());
        if idle > 0 {
            debug!(idle, "Pruned idle rate-limit entries");
        }
        self.tokens.sweep_expired()
    }

    pub fn stats(&self) -> SecurityStats {
        let total = self.counters.total_requests.load(Ordering::Relaxed);
        let blocked = self.counters.blocked_requests.load(Ordering::Relaxed);
        let auth = self.counters.authentication_failures.load(Ordering::Relaxed);
        let limited = self.counters.rate_limit_violations.load(Ordering::Relaxed);
        let rate = |n: u64| n as f64 / total.max(1) as f64 * 100.0;
        SecurityStats {
            total_requests: total,
            blocked_requests: blocked,
            authentication_failures: auth,
            rate_limit_violations: limited,
            tokens_issued: self.counters.tokens_issued.load(Ordering::Relaxed),
            active_tokens: self.tokens.active_count() as u64,
            block_rate: rate(blocked),
            auth_failure_rate: rate(auth),
            rate_limit_violation_rate: rate(limited),
        }
    }
}
