//! Request screening before anything touches the model.
//!
//! Validation never fails with an error of its own: every check produces a
//! [`ValidationResult`] and only `error`/`critical` results block the
//! request. Checks run in a fixed order and short-circuit:
//!
//! 1. structure (known action, required fields)
//! 2. request size and injection patterns over every string field
//! 3. for `transcribe`: path traversal, existence/regular file/readable,
//!    size ceiling, extension allow-list, MIME sniff (warning only),
//!    executable signatures and suspicious text in the first kilobyte

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use super::protocol::{Action, Request};

/// Bytes of the file inspected by the content checks.
const HEADER_BYTES: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn blocks(self) -> bool {
        matches!(self, Severity::Error | Severity::Critical)
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

/// Outcome of a validation step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub severity: Severity,
    pub message: String,
    pub details: BTreeMap<String, Value>,
}

impl ValidationResult {
    fn with_severity(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            valid: !severity.blocks(),
            severity,
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Error, message)
    }

    pub fn critical(message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Critical, message).with("security_issue", true)
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn blocks(&self) -> bool {
        self.severity.blocks()
    }

    pub fn is_security_issue(&self) -> bool {
        self.details
            .get("security_issue")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Limits the validator enforces.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Lowercase extensions without the dot.
    pub allowed_extensions: Vec<String>,
    /// Ceiling on audio file size in bytes.
    pub max_file_size: u64,
    /// Ceiling on the encoded request in bytes.
    pub max_message_bytes: usize,
    pub allow_remote_clients: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: ["wav", "mp3", "flac", "m4a"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            max_file_size: 100 * 1024 * 1024,
            max_message_bytes: 64 * 1024,
            allow_remote_clients: false,
        }
    }
}

/// Counters since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationStats {
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub security_issues: u64,
    pub success_rate: f64,
}

#[derive(Debug, Default)]
struct StatsCounters {
    total: AtomicU64,
    passed: AtomicU64,
    failed: AtomicU64,
    security_issues: AtomicU64,
}

// Substrings that mark a path as a traversal attempt or a system location.
const TRAVERSAL_PATTERNS: &[&str] = &[
    "..", "~", "/etc/", "/var/", "/usr/", "/bin/", "/sbin/", "/home/", "/root/", "\\\\", "%2e%2e",
    "%2f", "%5c",
];

const EXECUTABLE_SIGNATURES: &[(&[u8], &str)] = &[
    (b"\x7fELF", "elf"),
    (b"MZ", "pe"),
    (b"\xca\xfe\xba\xbe", "mach-o"),
    (b"\xfe\xed\xfa\xce", "mach-o"),
    (b"\xfe\xed\xfa\xcf", "mach-o"),
    (b"\xce\xfa\xed\xfe", "mach-o"),
    (b"\xcf\xfa\xed\xfe", "mach-o"),
];

const SUSPICIOUS_CONTENT: &[&[u8]] = &[
    b"<script",
    b"javascript:",
    b"eval(",
    b"exec(",
    b"system(",
    b"shell_exec(",
    b"passthru(",
    b"file_get_contents(",
    b"fopen(",
    b"curl_exec(",
];

static SQL_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    compile_patterns(&[
        r"(\bunion\b.*\bselect\b)",
        r"(\bselect\b.*\bfrom\b)",
        r"(\binsert\b.*\binto\b)",
        r"(\bupdate\b.*\bset\b)",
        r"(\bdelete\b.*\bfrom\b)",
        r"(\bdrop\b.*\btable\b)",
        r"(\bor\b.*\b=\b.*\bor\b)",
        r"(\band\b.*\b=\b.*\band\b)",
        r"(--\s*)",
        r"(;\s*--)",
        r"(\bexec\b.*\()",
        r"(\bsp_\w+)",
    ])
});

static XSS_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    compile_patterns(&[
        r"<script[^>]*>.*?</script>",
        r"javascript:",
        r"vbscript:",
        r"onload\s*=",
        r"onclick\s*=",
        r"onmouseover\s*=",
        r"onfocus\s*=",
        r"onblur\s*=",
        r"onchange\s*=",
        r"onsubmit\s*=",
        r"<iframe[^>]*>",
        r"<object[^>]*>",
        r"<embed[^>]*>",
        r"<link[^>]*>",
        r"<meta[^>]*>",
        r"eval\s*\(",
        r"document\.cookie",
        r"document\.write",
        r"window\.location",
    ])
});

fn compile_patterns(raw: &[&'static str]) -> Vec<(&'static str, Regex)> {
    raw.iter()
        .filter_map(|p| match Regex::new(&format!("(?i){p}")) {
            Ok(re) => Some((*p, re)),
            Err(e) => {
                error!(pattern = p, error = %e, "Invalid screening pattern");
                None
            }
        })
        .collect()
}

/// Stateless request screening plus counters.
#[derive(Debug, Default)]
pub struct Validator {
    config: ValidatorConfig,
    stats: StatsCounters,
}

impl Validator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self {
            config,
            stats: StatsCounters::default(),
        }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validate a parsed request and record the outcome.
    pub fn validate(&self, request: &Request) -> ValidationResult {
        let result = self.check_request(request);
        self.record(&result);
        log_result(&result, request.action());
        result
    }

    /// Screen the peer address. Loopback always passes.
    pub fn validate_client_address(&self, addr: &SocketAddr) -> ValidationResult {
        if addr.ip().is_loopback() {
            return ValidationResult::success("Client address validation passed");
        }
        let result = if self.config.allow_remote_clients {
            ValidationResult::warning("Non-localhost connection")
        } else {
            ValidationResult::error("Remote clients are not allowed")
        };
        result.with("client_address", addr.to_string())
    }

    pub fn stats(&self) -> ValidationStats {
        let total = self.stats.total.load(Ordering::Relaxed);
        let passed = self.stats.passed.load(Ordering::Relaxed);
        ValidationStats {
            total,
            passed,
            failed: self.stats.failed.load(Ordering::Relaxed),
            security_issues: self.stats.security_issues.load(Ordering::Relaxed),
            success_rate: passed as f64 / total.max(1) as f64 * 100.0,
        }
    }

    fn record(&self, result: &ValidationResult) {
        self.stats.total.fetch_add(1, Ordering::Relaxed);
        if result.blocks() {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
            if result.is_security_issue() {
                self.stats.security_issues.fetch_add(1, Ordering::Relaxed);
            }
        } else {
            self.stats.passed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn check_request(&self, request: &Request) -> ValidationResult {
        if let Action::Unknown(raw) = request.action() {
            return ValidationResult::error("Unknown action")
                .with("action", raw.as_str())
                .with("valid_actions", Action::KNOWN.to_vec());
        }

        match request.mistyped_field() {
            Some("audio_file") => {
                return ValidationResult::error("Invalid file path").with("field", "audio_file");
            }
            Some(field) => return ValidationResult::error("Invalid token").with("field", field),
            None => {}
        }

        let audio_file = match (request.action(), request.audio_file()) {
            (Action::Transcribe, None) => {
                return ValidationResult::error("audio_file is required for transcribe action")
                    .with("missing_field", "audio_file");
            }
            (Action::Transcribe, Some(path)) if path.is_empty() => {
                return ValidationResult::error("File path is required");
            }
            (_, path) => path,
        };

        let size = request.encoded_len();
        if size > self.config.max_message_bytes {
            return ValidationResult::error("Request too large")
                .with("request_size", size)
                .with("max_size", self.config.max_message_bytes);
        }

        let injection = check_injection(request);
        if injection.blocks() {
            return injection;
        }

        if *request.action() == Action::Transcribe
            && let Some(path) = audio_file
        {
            let file = self.validate_file(path);
            if file.blocks() || file.severity == Severity::Warning {
                return file;
            }
        }

        ValidationResult::success("Request validation passed")
            .with("action", request.action().as_str())
            .with("request_size", size)
    }

    /// Screen an audio file path and its contents.
    pub fn validate_file(&self, file_path: &str) -> ValidationResult {
        if file_path.is_empty() {
            return ValidationResult::error("File path is required");
        }

        if let Some(pattern) = traversal_pattern(file_path) {
            return ValidationResult::critical("Path traversal attack detected")
                .with("file_path", file_path)
                .with("pattern", pattern);
        }

        let path = Path::new(file_path);
        let metadata = match path.metadata() {
            Ok(m) => m,
            Err(_) => {
                return ValidationResult::error("File does not exist").with("file_path", file_path);
            }
        };
        if !metadata.is_file() {
            return ValidationResult::error("Path is not a file").with("file_path", file_path);
        }
        let mut file = match File::open(path) {
            Ok(f) => f,
            Err(e) => {
                return ValidationResult::error("File is not readable")
                    .with("file_path", file_path)
                    .with("reason", e.to_string());
            }
        };

        let file_size = metadata.len();
        if file_size > self.config.max_file_size {
            return ValidationResult::error("File too large")
                .with("file_path", file_path)
                .with("file_size", file_size)
                .with("max_size", self.config.max_file_size);
        }

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if !self.config.allowed_extensions.iter().any(|a| *a == extension) {
            return ValidationResult::error("File type not allowed")
                .with("file_path", file_path)
                .with("extension", extension.as_str())
                .with("allowed_extensions", self.config.allowed_extensions.clone());
        }

        let mut header = Vec::with_capacity(HEADER_BYTES);
        if let Err(e) = (&mut file).take(HEADER_BYTES as u64).read_to_end(&mut header) {
            return ValidationResult::error("File is not readable")
                .with("file_path", file_path)
                .with("reason", e.to_string());
        }

        let mime = check_mime(&extension, &header);

        let content = check_content(&header);
        if content.blocks() {
            return content.with("file_path", file_path);
        }

        if mime.severity == Severity::Warning {
            return mime.with("file_path", file_path);
        }

        ValidationResult::success("File validation passed")
            .with("file_path", file_path)
            .with("file_size", file_size)
            .with("extension", extension.as_str())
    }
}

fn traversal_pattern(file_path: &str) -> Option<&'static str> {
    let lower = file_path.to_lowercase();
    TRAVERSAL_PATTERNS
        .iter()
        .copied()
        .find(|pattern| lower.contains(pattern))
}

/// Guess an audio MIME type from leading bytes.
fn sniff_mime(header: &[u8]) -> Option<&'static str> {
    if header.len() >= 12 && &header[0..4] == b"RIFF" && &header[8..12] == b"WAVE" {
        Some("audio/wav")
    } else if header.starts_with(b"ID3")
        || (header.len() >= 2 && header[0] == 0xff && header[1] & 0xe0 == 0xe0)
    {
        Some("audio/mpeg")
    } else if header.starts_with(b"fLaC") {
        Some("audio/flac")
    } else if header.len() >= 8 && &header[4..8] == b"ftyp" {
        Some("audio/mp4")
    } else if header.starts_with(b"OggS") {
        Some("audio/ogg")
    } else {
        None
    }
}

fn expected_mime(extension: &str) -> Option<&'static str> {
    match extension {
        "wav" => Some("audio/wav"),
        "mp3" => Some("audio/mpeg"),
        "flac" => Some("audio/flac"),
        "m4a" | "mp4" => Some("audio/mp4"),
        "ogg" | "opus" => Some("audio/ogg"),
        _ => None,
    }
}

fn check_mime(extension: &str, header: &[u8]) -> ValidationResult {
    let Some(expected) = expected_mime(extension) else {
        return ValidationResult::success("No MIME expectation for extension");
    };
    match sniff_mime(header) {
        Some(detected) if detected == expected => {
            ValidationResult::success("MIME type validation passed")
        }
        detected => ValidationResult::warning("MIME type mismatch")
            .with("detected_mime", detected.unwrap_or("unknown"))
            .with("expected_mime", expected),
    }
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

fn check_content(header: &[u8]) -> ValidationResult {
    if let Some((_, kind)) = EXECUTABLE_SIGNATURES
        .iter()
        .find(|(sig, _)| header.starts_with(sig))
    {
        return ValidationResult::critical("Executable file detected").with("signature", *kind);
    }

    let lower = header.to_ascii_lowercase();
    if let Some(needle) = SUSPICIOUS_CONTENT
        .iter()
        .find(|needle| contains_subslice(&lower, needle))
    {
        return ValidationResult::critical("Suspicious content detected")
            .with("pattern", String::from_utf8_lossy(needle).into_owned());
    }

    ValidationResult::success("Malicious content check passed")
}

/// Scan every string field for SQL-injection and script patterns.
///
/// The token is skipped: it is an opaque signed value checked by the
/// security gate, and its alphabet is not prose.
fn check_injection(request: &Request) -> ValidationResult {
    for (field, value) in request.string_fields() {
        if field == "token" {
            continue;
        }
        if let Some((pattern, _)) = SQL_PATTERNS.iter().find(|(_, re)| re.is_match(value)) {
            return ValidationResult::critical("SQL injection pattern detected")
                .with("field", field)
                .with("pattern", *pattern);
        }
        if let Some((pattern, _)) = XSS_PATTERNS.iter().find(|(_, re)| re.is_match(value)) {
            return ValidationResult::critical("XSS pattern detected")
                .with("field", field)
                .with("pattern", *pattern);
        }
    }
    ValidationResult::success("Injection check passed")
}

fn log_result(result: &ValidationResult, action: &Action) {
    let details = serde_json::to_string(&result.details).unwrap_or_default();
    match result.severity {
        Severity::Critical => error!(
            action = %action,
            reason = %result.message,
            details = %details,
            "Validation failed"
        ),
        Severity::Error => warn!(
            action = %action,
            reason = %result.message,
            details = %details,
            "Validation failed"
        ),
        Severity::Warning => warn!(
            action = %action,
            reason = %result.message,
            details = %details,
            "Validation warning"
        ),
        Severity::Info => debug!(action = %action, "Validation passed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tmp() -> TempDir {
        tempfile::Builder::new().tempdir_in("/tmp").unwrap()
    }

    fn wav_bytes() -> Vec<u8> {
        let mut data = b"RIFF\x24\x00\x00\x00WAVEfmt ".to_vec();
        data.extend_from_slice(&[0u8; 64]);
        data
    }

    fn write(dir: &TempDir, name: &str, bytes: &[u8]) -> String {
        let path = dir.path().join(name);
        fs::write(&path, bytes).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_valid_wav_passes() {
        let dir = tmp();
        let path = write(&dir, "clip.wav", &wav_bytes());
        let v = Validator::default();
        let result = v.validate(&Request::transcribe(path));
        assert!(result.valid, "{result:?}");
        assert_eq!(result.severity, Severity::Info);
    }

    #[test]
    fn test_unknown_action_is_error() {
        let v = Validator::default();
        let result = v.validate(&Request::new(Action::Unknown("reboot".into())));
        assert!(!result.valid);
        assert_eq!(result.message, "Unknown action");
    }

    #[test]
    fn test_transcribe_requires_audio_file() {
        let v = Validator::default();
        let result = v.validate(&Request::new(Action::Transcribe));
        assert_eq!(result.severity, Severity::Error);
    }

    #[test]
    fn test_traversal_patterns_are_critical() {
        let v = Validator::default();
        for path in [
            "../../etc/passwd",
            "~/secret.wav",
            "/etc/shadow.wav",
            "/home/user/clip.wav",
            "/tmp/%2e%2e/clip.wav",
            "/tmp/a%2Fb.wav",
            "\\\\server\\share\\a.wav",
        ] {
            let result = v.validate_file(path);
            assert_eq!(result.severity, Severity::Critical, "{path}");
            assert!(result.is_security_issue());
        }
    }

    #[test]
    fn test_missing_file_and_directory() {
        let dir = tmp();
        let v = Validator::default();
        let missing = dir.path().join("nope.wav");
        assert_eq!(
            v.validate_file(&missing.to_string_lossy()).message,
            "File does not exist"
        );
        let sub = dir.path().join("folder.wav");
        fs::create_dir(&sub).unwrap();
        assert_eq!(
            v.validate_file(&sub.to_string_lossy()).message,
            "Path is not a file"
        );
    }

    #[test]
    fn test_size_ceiling() {
        let dir = tmp();
        let path = write(&dir, "big.wav", &wav_bytes());
        let v = Validator::new(ValidatorConfig {
            max_file_size: 10,
            ..Default::default()
        });
        let result = v.validate_file(&path);
        assert_eq!(result.message, "File too large");
        assert!(result.blocks());
    }

    #[test]
    fn test_extension_allow_list() {
        let dir = tmp();
        let path = write(&dir, "clip.txt", b"hello");
        let result = Validator::default().validate_file(&path);
        assert_eq!(result.message, "File type not allowed");
    }

    #[test]
    fn test_mime_mismatch_is_only_a_warning() {
        let dir = tmp();
        let path = write(&dir, "clip.mp3", &wav_bytes());
        let result = Validator::default().validate_file(&path);
        assert!(result.valid);
        assert_eq!(result.severity, Severity::Warning);
        assert_eq!(result.details["detected_mime"], "audio/wav");
    }

    #[test]
    fn test_executable_signatures_are_critical() {
        let dir = tmp();
        let v = Validator::default();
        for (name, bytes) in [
            ("elf.wav", b"\x7fELF\x02\x01\x01".as_slice()),
            ("pe.wav", b"MZ\x90\x00".as_slice()),
            ("macho.wav", b"\xcf\xfa\xed\xfe\x07".as_slice()),
        ] {
            let path = write(&dir, name, bytes);
            let result = v.validate_file(&path);
            assert_eq!(result.message, "Executable file detected", "{name}");
            assert_eq!(result.severity, Severity::Critical);
        }
    }

    #[test]
    fn test_suspicious_text_in_header() {
        let dir = tmp();
        let mut bytes = wav_bytes();
        bytes.extend_from_slice(b"<SCRIPT>alert(1)</script>");
        let path = write(&dir, "clip.wav", &bytes);
        let result = Validator::default().validate_file(&path);
        assert_eq!(result.message, "Suspicious content detected");
    }

    #[test]
    fn test_suspicious_text_after_first_kilobyte_is_ignored() {
        let dir = tmp();
        let mut bytes = wav_bytes();
        bytes.resize(HEADER_BYTES + 16, 0);
        bytes.extend_from_slice(b"eval(");
        let path = write(&dir, "clip.wav", &bytes);
        assert!(Validator::default().validate_file(&path).valid);
    }

    #[test]
    fn test_sql_and_xss_in_any_field() {
        let v = Validator::default();
        let sql = Request::transcribe("/tmp/x.wav' union select * from users");
        assert_eq!(v.validate(&sql).message, "SQL injection pattern detected");

        let xss = Request::transcribe("/tmp/<script>alert(1)</script>.wav");
        let result = v.validate(&xss);
        assert_eq!(result.severity, Severity::Critical);
    }

    #[test]
    fn test_injection_blocks_non_transcribe_actions() {
        let bytes = br#"{"action":"health_check","note":"javascript:alert(1)"}"#;
        let request = match crate::daemon::protocol::parse_request(bytes).unwrap() {
            crate::daemon::protocol::ParseOutcome::Complete(r) => r,
            _ => panic!("incomplete"),
        };
        let result = Validator::default().validate(&request);
        assert_eq!(result.message, "XSS pattern detected");
        assert_eq!(result.details["field"], "note");
    }

    #[test]
    fn test_injection_patterns_do_not_span_lines() {
        let parse = |bytes: &[u8]| match crate::daemon::protocol::parse_request(bytes).unwrap() {
            crate::daemon::protocol::ParseOutcome::Complete(r) => r,
            _ => panic!("incomplete"),
        };
        let v = Validator::default();
        let split = parse(br#"{"action":"health_check","note":"union\nselect 1"}"#);
        assert!(v.validate(&split).valid);

        let joined = parse(br#"{"action":"health_check","note":"UNION select 1"}"#);
        assert_eq!(v.validate(&joined).message, "SQL injection pattern detected");
    }

    #[test]
    fn test_mistyped_members_fail_validation() {
        let parse = |bytes: &[u8]| match crate::daemon::protocol::parse_request(bytes).unwrap() {
            crate::daemon::protocol::ParseOutcome::Complete(r) => r,
            _ => panic!("incomplete"),
        };
        let v = Validator::default();
        let result = v.validate(&parse(br#"{"action":"transcribe","audio_file":123}"#));
        assert!(!result.valid);
        assert_eq!(result.message, "Invalid file path");

        let result = v.validate(&parse(br#"{"action":"shutdown","token":{"a":1}}"#));
        assert_eq!(result.message, "Invalid token");

        let result = v.validate(&parse(br#"{"action":42}"#));
        assert_eq!(result.message, "Unknown action");
    }

    #[test]
    fn test_token_field_is_not_screened() {
        let request = Request::new(Action::HealthCheck).with_token(Some("abc--def".into()));
        assert!(Validator::default().validate(&request).valid);
    }

    #[test]
    fn test_request_size_limit() {
        let v = Validator::new(ValidatorConfig {
            max_message_bytes: 32,
            ..Default::default()
        });
        let request = Request::transcribe(format!("/tmp/{}.wav", "a".repeat(64)));
        assert_eq!(v.validate(&request).message, "Request too large");
    }

    #[test]
    fn test_client_address_screening() {
        let strict = Validator::default();
        let local: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        let remote: SocketAddr = "10.1.2.3:5000".parse().unwrap();
        assert!(strict.validate_client_address(&local).valid);
        assert!(strict.validate_client_address(&remote).blocks());

        let lenient = Validator::new(ValidatorConfig {
            allow_remote_clients: true,
            ..Default::default()
        });
        let result = lenient.validate_client_address(&remote);
        assert!(result.valid);
        assert_eq!(result.severity, Severity::Warning);
    }

    #[test]
    fn test_stats_track_outcomes() {
        let v = Validator::default();
        v.validate(&Request::new(Action::Shutdown));
        v.validate(&Request::transcribe("../../etc/passwd"));
        v.validate(&Request::new(Action::Unknown("x".into())));
        let stats = v.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.passed, 1);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.security_issues, 1);
    }
}
