use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use asr_daemon::daemon::{
    ConnectionServer, InferencePolicy, ModelBackend, ModelHandle, SecurityConfig, SecurityGate,
    ServerOptions, SpeechModel, Validator, ValidatorConfig,
};
use tempfile::TempDir;

/// Captures tracing output for tests.
#[allow(dead_code)]
pub struct TestTracing {
    buffer: Arc<std::sync::Mutex<Vec<u8>>>,
}

#[allow(dead_code)]
impl TestTracing {
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.buffer.clone();
        let make_writer = move || TestWriter(writer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(make_writer)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn output(&self) -> String {
        let buf = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    pub fn assert_contains(&self, needle: &str) {
        let out = self.output();
        assert!(
            out.contains(needle),
            "expected logs to contain `{needle}`, got:\n{out}"
        );
    }
}

struct TestWriter(Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Model that answers every request with the same text.
#[allow(dead_code)]
pub struct CannedModel {
    text: String,
    delay: Duration,
    calls: Arc<AtomicU64>,
}

impl SpeechModel for CannedModel {
    fn transcribe(&self, _audio: &Path) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        Ok(self.text.clone())
    }

    fn snapshot(&self) -> Option<Vec<u8>> {
        Some(self.text.as_bytes().to_vec())
    }
}

/// Backend that counts loads and can be told to fail or stall.
#[allow(dead_code)]
pub struct FakeBackend {
    pub text: String,
    pub fresh_loads: AtomicU64,
    pub restores: AtomicU64,
    pub fail: AtomicBool,
    pub inferences: Arc<AtomicU64>,
    pub load_delay: Duration,
    pub inference_delay: Duration,
}

#[allow(dead_code)]
impl FakeBackend {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            fresh_loads: AtomicU64::new(0),
            restores: AtomicU64::new(0),
            fail: AtomicBool::new(false),
            inferences: Arc::new(AtomicU64::new(0)),
            load_delay: Duration::ZERO,
            inference_delay: Duration::ZERO,
        }
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn with_inference_delay(mut self, delay: Duration) -> Self {
        self.inference_delay = delay;
        self
    }

    pub fn fresh_loads(&self) -> u64 {
        self.fresh_loads.load(Ordering::SeqCst)
    }

    pub fn restores(&self) -> u64 {
        self.restores.load(Ordering::SeqCst)
    }

    /// Transcribe calls that reached any model this backend produced.
    pub fn inferences(&self) -> u64 {
        self.inferences.load(Ordering::SeqCst)
    }

    fn model(&self, text: String) -> Arc<dyn SpeechModel> {
        Arc::new(CannedModel {
            text,
            delay: self.inference_delay,
            calls: Arc::clone(&self.inferences),
        })
    }
}

impl ModelBackend for FakeBackend {
    fn load_fresh(&self, _model_id: &str) -> anyhow::Result<Arc<dyn SpeechModel>> {
        self.fresh_loads.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.load_delay);
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("weights unavailable");
        }
        Ok(self.model(self.text.clone()))
    }

    fn restore(&self, _model_id: &str, snapshot: &[u8]) -> anyhow::Result<Arc<dyn SpeechModel>> {
        self.restores.fetch_add(1, Ordering::SeqCst);
        Ok(self.model(String::from_utf8(snapshot.to_vec())?))
    }
}

/// A live server on an ephemeral loopback port.
#[allow(dead_code)]
pub struct TestServer {
    pub addr: SocketAddr,
    pub server: Arc<ConnectionServer>,
    thread: Option<JoinHandle<std::io::Result<()>>>,
}

#[allow(dead_code)]
impl TestServer {
    pub fn start(
        cache_dir: &Path,
        backend: Arc<FakeBackend>,
        security: SecurityConfig,
        options: ServerOptions,
    ) -> Self {
        let model = Arc::new(ModelHandle::new(
            "fake-model",
            cache_dir,
            backend,
            InferencePolicy::Parallel,
        ));
        let server = Arc::new(ConnectionServer::new(
            ServerOptions { port: 0, ..options },
            model,
            Arc::new(SecurityGate::new(security)),
            Arc::new(Validator::new(ValidatorConfig::default())),
        ));
        let listener = server.bind().expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");
        let srv = Arc::clone(&server);
        let thread = std::thread::spawn(move || srv.serve(listener));
        Self {
            addr,
            server,
            thread: Some(thread),
        }
    }

    pub fn with_defaults(cache_dir: &Path, backend: Arc<FakeBackend>) -> Self {
        Self::start(
            cache_dir,
            backend,
            SecurityConfig::default(),
            ServerOptions {
                request_timeout: Duration::from_secs(2),
                ..Default::default()
            },
        )
    }

    pub fn client(&self) -> asr_daemon::daemon::DaemonClient {
        let mut config = asr_daemon::daemon::ClientConfig::new("127.0.0.1", self.addr.port());
        config.request_timeout = Duration::from_secs(10);
        config.retry_delay = Duration::from_millis(50);
        config.not_ready_retries = 100;
        asr_daemon::daemon::DaemonClient::new(config)
    }

    /// Block until the model is ready or the timeout passes.
    pub fn wait_ready(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while std::time::Instant::now() < deadline {
            if self.server.model().is_ready() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    pub fn stop(mut self) {
        self.server.shutdown_handle().request_shutdown();
        if let Some(thread) = self.thread.take() {
            thread.join().expect("server thread").expect("serve result");
        }
    }

    /// Wait for a server that was stopped over the wire.
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            thread.join().expect("server thread").expect("serve result");
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.shutdown_handle().request_shutdown();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Temp dir under `/tmp` so fixture paths avoid screened system prefixes.
#[allow(dead_code)]
pub fn fixture_dir() -> TempDir {
    tempfile::Builder::new()
        .prefix("asr")
        .tempdir_in("/tmp")
        .expect("tempdir")
}

/// Write a minimal RIFF/WAVE file and return its path.
#[allow(dead_code)]
pub fn write_wav(dir: &Path, name: &str) -> PathBuf {
    let mut data = b"RIFF\x24\x00\x00\x00WAVEfmt \x10\x00\x00\x00".to_vec();
    data.resize(256, 0);
    let path = dir.join(name);
    std::fs::write(&path, data).expect("write wav");
    path
}

/// Send raw bytes, half-close, and return everything the daemon wrote.
#[allow(dead_code)]
pub fn raw_exchange(addr: SocketAddr, body: &[u8]) -> Vec<u8> {
    use std::io::{Read, Write};
    let mut stream = std::net::TcpStream::connect(addr).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("timeout");
    stream.write_all(body).expect("write");
    stream.shutdown(std::net::Shutdown::Write).expect("half close");
    let mut out = Vec::new();
    let _ = stream.read_to_end(&mut out);
    out
}
