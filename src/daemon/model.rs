//! Ownership and lifecycle of the speech model.
//!
//! [`ModelHandle`] is the only place the expensive model lives. Loading is
//! gated so that overlapping callers of [`ModelHandle::ensure_loaded`]
//! rendezvous on a single attempt:
//!
//! ```text
//!   unloaded ──ensure_loaded──▶ loading ──ok──▶ ready
//!       ▲                          │
//!       └──────── failed ◀──err────┘   (failed ──ensure_loaded──▶ loading)
//! ```
//!
//! Loads try the on-disk cache first. A missing or corrupt cache artifact
//! is a cache miss: the backend loads fresh and a new artifact is written.

use std::fmt;
use std::fs;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::error::ResourceError;

/// A loaded speech-to-text model.
pub trait SpeechModel: Send + Sync {
    /// Transcribe the audio file at `audio`.
    fn transcribe(&self, audio: &Path) -> anyhow::Result<String>;

    /// Serialised form for the on-disk cache, if the model supports it.
    fn snapshot(&self) -> Option<Vec<u8>> {
        None
    }
}

/// Produces [`SpeechModel`] instances, either fresh or from a cache snapshot.
pub trait ModelBackend: Send + Sync {
    fn load_fresh(&self, model_id: &str) -> anyhow::Result<Arc<dyn SpeechModel>>;

    fn restore(&self, model_id: &str, snapshot: &[u8]) -> anyhow::Result<Arc<dyn SpeechModel>>;
}

/// Lifecycle state of the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    Unloaded,
    Loading,
    Ready,
    Failed,
}

impl ModelState {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelState::Unloaded => "unloaded",
            ModelState::Loading => "loading",
            ModelState::Ready => "ready",
            ModelState::Failed => "failed",
        }
    }
}

impl fmt::Display for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether inference calls may overlap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferencePolicy {
    /// One transcription at a time.
    #[default]
    Serialized,
    /// Backend is thread-safe; calls run concurrently.
    Parallel,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to load model {model}: {reason}")]
pub struct ModelLoadError {
    pub model: String,
    pub reason: String,
}

#[derive(Debug, Error)]
enum CacheError {
    #[error("cache artifact not found")]
    Missing,
    #[error("cache read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache artifact corrupt: {0}")]
    Corrupt(String),
}

// -------------------------------------------------------------------------
// Cache envelope
// -------------------------------------------------------------------------
// magic(4) | version u32 BE | id_len u32 BE | id | payload_len u64 BE |
// sha256(payload)(32) | payload

const CACHE_MAGIC: &[u8; 4] = b"ASRC";
const CACHE_VERSION: u32 = 1;
const CACHE_EXTENSION: &str = "model";

fn encode_envelope(model_id: &str, payload: &[u8]) -> Vec<u8> {
    let id = model_id.as_bytes();
    let mut buf = Vec::with_capacity(4 + 4 + 4 + id.len() + 8 + 32 + payload.len());
    buf.extend_from_slice(CACHE_MAGIC);
    buf.extend_from_slice(&CACHE_VERSION.to_be_bytes());
    buf.extend_from_slice(&(id.len() as u32).to_be_bytes());
    buf.extend_from_slice(id);
    buf.extend_from_slice(&(payload.len() as u64).to_be_bytes());
    buf.extend_from_slice(&Sha256::digest(payload));
    buf.extend_from_slice(payload);
    buf
}

fn take<'a>(data: &mut &'a [u8], n: usize, what: &str) -> Result<&'a [u8], CacheError> {
    if data.len() < n {
        return Err(CacheError::Corrupt(format!("truncated {what}")));
    }
    let (head, rest) = data.split_at(n);
    *data = rest;
    Ok(head)
}

fn decode_envelope(model_id: &str, bytes: &[u8]) -> Result<Vec<u8>, CacheError> {
    let mut data = bytes;
    if take(&mut data, 4, "magic")? != CACHE_MAGIC {
        return Err(CacheError::Corrupt("bad magic".into()));
    }
    let version = u32::from_be_bytes(take(&mut data, 4, "version")?.try_into().unwrap_or_default());
    if version != CACHE_VERSION {
        return Err(CacheError::Corrupt(format!("unsupported version {version}")));
    }
    let id_len =
        u32::from_be_bytes(take(&mut data, 4, "id length")?.try_into().unwrap_or_default()) as usize;
    let id = take(&mut data, id_len, "model id")?;
    if id != model_id.as_bytes() {
        return Err(CacheError::Corrupt(format!(
            "artifact is for model {}",
            String::from_utf8_lossy(id)
        )));
    }
    let payload_len =
        u64::from_be_bytes(take(&mut data, 8, "payload length")?.try_into().unwrap_or_default());
    let checksum = take(&mut data, 32, "checksum")?;
    if data.len() as u64 != payload_len {
        return Err(CacheError::Corrupt(format!(
            "payload length {} != declared {payload_len}",
            data.len()
        )));
    }
    if Sha256::digest(data).as_slice() != checksum {
        return Err(CacheError::Corrupt("checksum mismatch".into()));
    }
    Ok(data.to_vec())
}

/// Cache file name for a model identifier.
pub fn cache_file_name(model_id: &str) -> String {
    let safe: String = model_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .take(128)
        .collect();
    let safe = if safe.is_empty() || safe.chars().all(|c| c == '.') {
        "model".to_string()
    } else {
        safe
    };
    format!("{safe}.{CACHE_EXTENSION}")
}

struct Slot {
    state: ModelState,
    model: Option<Arc<dyn SpeechModel>>,
    last_error: Option<String>,
    /// Bumped each time a load attempt resolves.
    generation: u64,
}

/// Owner of the loaded model and its cache artifact.
pub struct ModelHandle {
    model_id: String,
    cache_dir: PathBuf,
    backend: Arc<dyn ModelBackend>,
    policy: InferencePolicy,
    slot: Mutex<Slot>,
    resolved: Condvar,
    inference_gate: Mutex<()>,
    load_attempts: AtomicU64,
    background_load: AtomicBool,
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("model_id", &self.model_id)
            .field("cache_dir", &self.cache_dir)
            .field("policy", &self.policy)
            .field("state", &self.state())
            .finish()
    }
}

impl ModelHandle {
    pub fn new(
        model_id: impl Into<String>,
        cache_dir: impl Into<PathBuf>,
        backend: Arc<dyn ModelBackend>,
        policy: InferencePolicy,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            cache_dir: cache_dir.into(),
            backend,
            policy,
            slot: Mutex::new(Slot {
                state: ModelState::Unloaded,
                model: None,
                last_error: None,
                generation: 0,
            }),
            resolved: Condvar::new(),
            inference_gate: Mutex::new(()),
            load_attempts: AtomicU64::new(0),
            background_load: AtomicBool::new(false),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn state(&self) -> ModelState {
        self.slot.lock().state
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ModelState::Ready
    }

    /// Error message of the most recent failed load, if the model is `failed`.
    pub fn last_error(&self) -> Option<String> {
        self.slot.lock().last_error.clone()
    }

    /// Number of load attempts started since construction.
    pub fn load_attempts(&self) -> u64 {
        self.load_attempts.load(Ordering::SeqCst)
    }

    pub fn cache_path(&self) -> PathBuf {
        self.cache_dir.join(cache_file_name(&self.model_id))
    }

    /// Block until the model is loaded.
    ///
    /// The first caller performs the load; callers arriving while it is in
    /// flight wait for that same attempt and observe its outcome.
    pub fn ensure_loaded(&self) -> Result<(), ModelLoadError> {
        let mut slot = self.slot.lock();
        match slot.state {
            ModelState::Ready => Ok(()),
            ModelState::Loading => {
                let generation = slot.generation;
                while slot.generation == generation {
                    self.resolved.wait(&mut slot);
                }
                match slot.state {
                    ModelState::Ready => Ok(()),
                    _ => Err(ModelLoadError {
                        model: self.model_id.clone(),
                        reason: slot
                            .last_error
                            .clone()
                            .unwrap_or_else(|| "load did not complete".into()),
                    }),
                }
            }
            ModelState::Unloaded | ModelState::Failed => {
                slot.state = ModelState::Loading;
                let outcome = MutexGuard::unlocked(&mut slot, || self.load_guarded());
                slot.generation += 1;
                let result = match outcome {
                    Ok(model) => {
                        slot.model = Some(model);
                        slot.state = ModelState::Ready;
                        slot.last_error = None;
                        Ok(())
                    }
                    Err(err) => {
                        slot.model = None;
                        slot.state = ModelState::Failed;
                        slot.last_error = Some(err.reason.clone());
                        Err(err)
                    }
                };
                self.resolved.notify_all();
                result
            }
        }
    }

    /// Start a load on a background thread unless one is already running
    /// or the model is ready. Returns whether a thread was spawned.
    pub fn spawn_background_load(self: &Arc<Self>) -> bool {
        if !matches!(self.state(), ModelState::Unloaded | ModelState::Failed) {
            return false;
        }
        if self
            .background_load
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        let handle = Arc::clone(self);
        let spawned = std::thread::Builder::new()
            .name("model-loader".into())
            .spawn(move || {
                let _reset = FlagReset(&handle.background_load);
                if let Err(e) = handle.ensure_loaded() {
                    warn!(error = %e, "Background model load failed");
                }
            });

        match spawned {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Failed to spawn model loader thread");
                self.background_load.store(false, Ordering::SeqCst);
                false
            }
        }
    }

    /// Transcribe `audio` with the loaded model.
    ///
    /// Fails with `ModelNotReady` unless the model is `ready`. Inference
    /// failures leave the model `ready`.
    pub fn transcribe(&self, audio: &Path) -> Result<String, ResourceError> {
        let model = {
            let slot = self.slot.lock();
            match (&slot.model, slot.state) {
                (Some(model), ModelState::Ready) => Arc::clone(model),
                (_, state) => {
                    return Err(ResourceError::ModelNotReady {
                        state: state.to_string(),
                    });
                }
            }
        };

        let start = Instant::now();
        let result = match self.policy {
            InferencePolicy::Serialized => {
                let _gate = self.inference_gate.lock();
                model.transcribe(audio)
            }
            InferencePolicy::Parallel => model.transcribe(audio),
        };

        match result {
            Ok(text) => {
                debug!(
                    audio = %audio.display(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    chars = text.chars().count(),
                    "Inference complete"
                );
                Ok(text)
            }
            Err(e) => Err(ResourceError::InferenceFailed(format!("{e:#}"))),
        }
    }

    /// [`Self::load`], with a backend panic reported as a failed load.
    fn load_guarded(&self) -> Result<Arc<dyn SpeechModel>, ModelLoadError> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.load())) {
            Ok(outcome) => outcome,
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                error!(model = %self.model_id, reason = %reason, "Model backend panicked during load");
                Err(ModelLoadError {
                    model: self.model_id.clone(),
                    reason: format!("model backend panicked: {reason}"),
                })
            }
        }
    }

    fn load(&self) -> Result<Arc<dyn SpeechModel>, ModelLoadError> {
        self.load_attempts.fetch_add(1, Ordering::SeqCst);
        let start = Instant::now();
        let cache_path = self.cache_path();

        match read_cache(&cache_path, &self.model_id) {
            Ok(snapshot) => match self.backend.restore(&self.model_id, &snapshot) {
                Ok(model) => {
                    info!(
                        model = %self.model_id,
                        cache = %cache_path.display(),
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Loaded model from cache"
                    );
                    return Ok(model);
                }
                Err(e) => {
                    warn!(
                        cache = %cache_path.display(),
                        error = %e,
                        "Cached model could not be restored, loading fresh"
                    );
                }
            },
            Err(CacheError::Missing) => {
                debug!(cache = %cache_path.display(), "No cached model");
            }
            Err(e) => {
                warn!(
                    cache = %cache_path.display(),
                    error = %e,
                    "Ignoring unusable model cache, loading fresh"
                );
            }
        }

        info!(model = %self.model_id, "Loading fresh model");
        let model = self
            .backend
            .load_fresh(&self.model_id)
            .map_err(|e| ModelLoadError {
                model: self.model_id.clone(),
                reason: format!("{e:#}"),
            })?;
        info!(
            model = %self.model_id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Model loaded"
        );

        match model.snapshot() {
            Some(snapshot) => match write_cache(&cache_path, &self.model_id, &snapshot) {
                Ok(()) => info!(cache = %cache_path.display(), "Model cached"),
                Err(e) => warn!(cache = %cache_path.display(), error = %e, "Failed to cache model"),
            },
            None => debug!(model = %self.model_id, "Backend does not support snapshots"),
        }

        Ok(model)
    }
}

/// Clears a flag when dropped, including on unwind.
struct FlagReset<'a>(&'a AtomicBool);

impl Drop for FlagReset<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn read_cache(path: &Path, model_id: &str) -> Result<Vec<u8>, CacheError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(CacheError::Missing),
        Err(e) => return Err(e.into()),
    };
    decode_envelope(model_id, &bytes)
}

fn write_cache(path: &Path, model_id: &str, payload: &[u8]) -> std::io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| std::io::Error::other("cache path has no parent directory"))?;
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&encode_envelope(model_id, payload))?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::time::Duration;
    use tempfile::TempDir;

    struct CannedModel {
        text: String,
        fail: bool,
    }

    impl SpeechModel for CannedModel {
        fn transcribe(&self, _audio: &Path) -> anyhow::Result<String> {
            if self.fail {
                anyhow::bail!("decoder exploded");
            }
            Ok(self.text.clone())
        }

        fn snapshot(&self) -> Option<Vec<u8>> {
            Some(self.text.as_bytes().to_vec())
        }
    }

    #[derive(Default)]
    struct CountingBackend {
        fresh: AtomicU64,
        restored: AtomicU64,
        fail_fresh: AtomicBool,
        panic_fresh: AtomicBool,
        fail_inference: bool,
        delay: Duration,
    }

    impl ModelBackend for CountingBackend {
        fn load_fresh(&self, _model_id: &str) -> anyhow::Result<Arc<dyn SpeechModel>> {
            self.fresh.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            if self.panic_fresh.load(Ordering::SeqCst) {
                panic!("loader crashed");
            }
            if self.fail_fresh.load(Ordering::SeqCst) {
                anyhow::bail!("weights missing");
            }
            Ok(Arc::new(CannedModel {
                text: "hello world".into(),
                fail: self.fail_inference,
            }))
        }

        fn restore(&self, _model_id: &str, snapshot: &[u8]) -> anyhow::Result<Arc<dyn SpeechModel>> {
            self.restored.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(CannedModel {
                text: String::from_utf8(snapshot.to_vec())?,
                fail: self.fail_inference,
            }))
        }
    }

    fn handle(dir: &TempDir, backend: Arc<CountingBackend>) -> ModelHandle {
        ModelHandle::new(
            "test/model-v1",
            dir.path(),
            backend,
            InferencePolicy::Serialized,
        )
    }

    #[test]
    fn test_transcribe_before_load_is_not_ready() {
        let dir = TempDir::new().unwrap();
        let model = handle(&dir, Arc::new(CountingBackend::default()));
        let err = model.transcribe(Path::new("/tmp/a.wav")).unwrap_err();
        assert_eq!(
            err,
            ResourceError::ModelNotReady {
                state: "unloaded".into()
            }
        );
    }

    #[test]
    fn test_fresh_load_writes_cache() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(CountingBackend::default());
        let model = handle(&dir, backend.clone());

        model.ensure_loaded().unwrap();
        assert_eq!(model.state(), ModelState::Ready);
        assert_eq!(backend.fresh.load(Ordering::SeqCst), 1);
        assert!(model.cache_path().is_file());
        assert_eq!(model.transcribe(Path::new("/tmp/a.wav")).unwrap(), "hello world");
    }

    #[test]
    fn test_second_handle_loads_from_cache() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(CountingBackend::default());
        handle(&dir, backend.clone()).ensure_loaded().unwrap();

        let second = handle(&dir, backend.clone());
        second.ensure_loaded().unwrap();
        assert_eq!(backend.fresh.load(Ordering::SeqCst), 1);
        assert_eq!(backend.restored.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_corrupt_cache_degrades_to_fresh_load() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(CountingBackend::default());
        let model = handle(&dir, backend.clone());
        fs::write(model.cache_path(), b"definitely not an envelope").unwrap();

        model.ensure_loaded().unwrap();
        assert_eq!(model.state(), ModelState::Ready);
        assert_eq!(backend.restored.load(Ordering::SeqCst), 0);
        assert_eq!(backend.fresh.load(Ordering::SeqCst), 1);

        // The corrupt artifact was replaced by a valid one.
        let bytes = fs::read(model.cache_path()).unwrap();
        assert_eq!(decode_envelope("test/model-v1", &bytes).unwrap(), b"hello world");
    }

    #[test]
    fn test_envelope_rejects_flipped_payload_byte() {
        let mut bytes = encode_envelope("m", b"payload");
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(matches!(
            decode_envelope("m", &bytes),
            Err(CacheError::Corrupt(_))
        ));
    }

    #[test]
    fn test_envelope_rejects_other_model() {
        let bytes = encode_envelope("model-a", b"payload");
        assert!(matches!(
            decode_envelope("model-b", &bytes),
            Err(CacheError::Corrupt(_))
        ));
    }

    #[test]
    fn test_concurrent_ensure_loaded_runs_one_attempt() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(CountingBackend {
            delay: Duration::from_millis(100),
            ..Default::default()
        });
        let model = Arc::new(handle(&dir, backend.clone()));
        let callers = 8;
        let barrier = Arc::new(Barrier::new(callers));

        let threads: Vec<_> = (0..callers)
            .map(|_| {
                let model = Arc::clone(&model);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    model.ensure_loaded()
                })
            })
            .collect();

        for t in threads {
            assert!(t.join().unwrap().is_ok());
        }
        assert_eq!(backend.fresh.load(Ordering::SeqCst), 1);
        assert_eq!(model.load_attempts(), 1);
        assert_eq!(model.state(), ModelState::Ready);
    }

    #[test]
    fn test_failed_load_can_be_retried() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(CountingBackend::default());
        backend.fail_fresh.store(true, Ordering::SeqCst);
        let model = handle(&dir, backend.clone());

        let err = model.ensure_loaded().unwrap_err();
        assert!(err.reason.contains("weights missing"));
        assert_eq!(model.state(), ModelState::Failed);
        assert!(matches!(
            model.transcribe(Path::new("/tmp/a.wav")),
            Err(ResourceError::ModelNotReady { .. })
        ));

        backend.fail_fresh.store(false, Ordering::SeqCst);
        model.ensure_loaded().unwrap();
        assert_eq!(model.state(), ModelState::Ready);
        assert_eq!(model.load_attempts(), 2);
        assert!(model.last_error().is_none());
    }

    #[test]
    fn test_inference_failure_keeps_model_ready() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(CountingBackend {
            fail_inference: true,
            ..Default::default()
        });
        let model = handle(&dir, backend);
        model.ensure_loaded().unwrap();

        let err = model.transcribe(Path::new("/tmp/a.wav")).unwrap_err();
        assert!(matches!(err, ResourceError::InferenceFailed(ref m) if m.contains("decoder exploded")));
        assert_eq!(model.state(), ModelState::Ready);
    }

    #[test]
    fn test_background_load_is_single_flight() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(CountingBackend {
            delay: Duration::from_millis(100),
            ..Default::default()
        });
        let model = Arc::new(handle(&dir, backend.clone()));

        assert!(model.spawn_background_load());
        assert!(!model.spawn_background_load());
        model.ensure_loaded().unwrap();
        assert_eq!(backend.fresh.load(Ordering::SeqCst), 1);
        assert!(!model.spawn_background_load());
    }

    #[test]
    fn test_panicking_backend_leaves_model_failed() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(CountingBackend::default());
        backend.panic_fresh.store(true, Ordering::SeqCst);
        let model = Arc::new(handle(&dir, backend.clone()));

        let err = model.ensure_loaded().unwrap_err();
        assert!(err.reason.contains("loader crashed"));
        assert_eq!(model.state(), ModelState::Failed);

        // A second caller gets a fresh attempt instead of waiting forever.
        let (tx, rx) = std::sync::mpsc::channel();
        let again = Arc::clone(&model);
        std::thread::spawn(move || {
            let _ = tx.send(again.ensure_loaded());
        });
        let second = rx.recv_timeout(Duration::from_secs(5)).expect("load wedged");
        assert!(second.is_err());
        assert_eq!(model.load_attempts(), 2);

        // The background loader clears its flag after a panic too.
        assert!(model.spawn_background_load());
        let deadline = Instant::now() + Duration::from_secs(5);
        while model.background_load.load(Ordering::SeqCst) {
            assert!(Instant::now() < deadline, "background flag never cleared");
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(model.state(), ModelState::Failed);

        backend.panic_fresh.store(false, Ordering::SeqCst);
        assert!(model.spawn_background_load());
        let deadline = Instant::now() + Duration::from_secs(5);
        while !model.is_ready() {
            assert!(Instant::now() < deadline, "reload never finished");
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_cache_file_name_is_sanitised() {
        assert_eq!(
            cache_file_name("nvidia/parakeet-tdt-0.6b-v2"),
            "nvidia_parakeet-tdt-0.6b-v2.model"
        );
        assert_eq!(cache_file_name(".."), "model.model");
        assert_eq!(cache_file_name(""), "model.model");
    }
}
