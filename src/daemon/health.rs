//! Service status for `health_check` and operators.

use std::fs::File;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use super::model::{ModelHandle, ModelState};
use super::resource::ResourceProbe;
use super::security::{SecurityGate, SecurityStats};
use super::validation::{ValidationStats, Validator};

/// Aggregate health, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallHealth {
    Healthy,
    Warning,
    Critical,
}

/// A named check and its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: OverallHealth,
    pub message: String,
}

impl HealthCheck {
    fn new(name: &str, status: OverallHealth, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
        }
    }
}

/// Snapshot returned by `get_status()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub model_id: String,
    pub model_state: ModelState,
    pub active_connections: u64,
    pub total_requests: u64,
    pub pid: u32,
    pub uptime_secs: u64,
    pub memory_bytes: u64,
    pub memory_human: String,
    pub security_stats: SecurityStats,
    pub validation_stats: ValidationStats,
    pub checks: Vec<HealthCheck>,
    pub overall: OverallHealth,
    pub version: String,
}

/// Connection counters shared between the accept loop and reporting.
#[derive(Debug, Default)]
pub struct ConnectionCounters {
    active: AtomicU64,
    total: AtomicU64,
}

impl ConnectionCounters {
    pub fn opened(&self) {
        self.active.fetch_add(1, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn closed(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn active(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

/// Builds [`ServiceStatus`] from the live components.
#[derive(Debug)]
pub struct HealthReporter {
    model: Arc<ModelHandle>,
    security: Arc<SecurityGate>,
    validator: Arc<Validator>,
    connections: Arc<ConnectionCounters>,
    probe: ResourceProbe,
}

impl HealthReporter {
    pub fn new(
        model: Arc<ModelHandle>,
        security: Arc<SecurityGate>,
        validator: Arc<Validator>,
        connections: Arc<ConnectionCounters>,
    ) -> Self {
        Self {
            model,
            security,
            validator,
            connections,
            probe: ResourceProbe::new(),
        }
    }

    pub fn get_status(&self) -> ServiceStatus {
        let model_state = self.model.state();
        let checks = vec![self.check_model(model_state), self.check_model_cache()];
        let process = self.probe.snapshot();
        let overall = checks
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or(OverallHealth::Healthy);

        ServiceStatus {
            model_id: self.model.model_id().to_string(),
            model_state,
            active_connections: self.connections.active(),
            total_requests: self.connections.total(),
            pid: process.pid,
            uptime_secs: process.uptime_secs,
            memory_bytes: process.memory_bytes,
            memory_human: process.memory_human,
            security_stats: self.security.stats(),
            validation_stats: self.validator.stats(),
            checks,
            overall,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    fn check_model(&self, state: ModelState) -> HealthCheck {
        match state {
            ModelState::Ready => HealthCheck::new("model", OverallHealth::Healthy, "Model ready"),
            ModelState::Loading => {
                HealthCheck::new("model", OverallHealth::Warning, "Model loading")
            }
            ModelState::Unloaded => {
                HealthCheck::new("model", OverallHealth::Warning, "Model not loaded")
            }
            ModelState::Failed => HealthCheck::new(
                "model",
                OverallHealth::Critical,
                format!(
                    "Model load failed: {}",
                    self.model.last_error().unwrap_or_default()
                ),
            ),
        }
    }

    fn check_model_cache(&self) -> HealthCheck {
        let path = self.model.cache_path();
        if !path.exists() {
            return HealthCheck::new(
                "model_cache",
                OverallHealth::Warning,
                "No cached model artifact",
            );
        }
        match File::open(&path) {
            Ok(_) => HealthCheck::new(
                "model_cache",
                OverallHealth::Healthy,
                format!("Cache present at {}", path.display()),
            ),
            Err(e) => HealthCheck::new(
                "model_cache",
                OverallHealth::Warning,
                format!("Cache unreadable: {e}"),
            ),
        }
    }
}
