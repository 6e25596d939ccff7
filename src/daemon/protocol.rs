//! Wire protocol for the transcription daemon.
//!
//! One JSON object per direction per connection. The client writes a
//! request, the daemon writes at most one response and closes the socket.
//!
//! ```text
//! Request:  {"action": "transcribe"|"shutdown"|"health_check", "audio_file"?: "<path>", "token"?: "<opaque>"}
//! Response: {"status": "success"|"error"|"shutdown", "text"?: "<string>", "error"?: "<string>", "token"?: "<opaque>"}
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::DaemonError;
use super::health::ServiceStatus;

/// Default TCP port the daemon listens on.
pub const DEFAULT_PORT: u16 = 8765;

/// Default bind host. Loopback only.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Actions a client may request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Transcribe,
    Shutdown,
    HealthCheck,
    /// Anything else. Carried through so the router can answer it.
    Unknown(String),
}

impl Action {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "transcribe" => Action::Transcribe,
            "shutdown" => Action::Shutdown,
            "health_check" => Action::HealthCheck,
            other => Action::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Action::Transcribe => "transcribe",
            Action::Shutdown => "shutdown",
            Action::HealthCheck => "health_check",
            Action::Unknown(raw) => raw,
        }
    }

    /// Names accepted by the structural validator.
    pub const KNOWN: [&'static str; 3] = ["transcribe", "shutdown", "health_check"];
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw request body as it appears on the wire.
///
/// `extra` keeps any additional members so the injection screen can see
/// every string field the client sent.
#[derive(Debug, Clone, Serialize)]
struct WireRequest {
    action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    audio_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(flatten)]
    extra: BTreeMap<String, serde_json::Value>,
}

/// A parsed request. Immutable once parsed.
#[derive(Debug, Clone)]
pub struct Request {
    action: Action,
    audio_file: Option<String>,
    token: Option<String>,
    /// First well-known member that arrived with a non-string value.
    mistyped: Option<&'static str>,
    extra: BTreeMap<String, serde_json::Value>,
}

impl Request {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            audio_file: None,
            token: None,
            mistyped: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn transcribe(audio_file: impl Into<String>) -> Self {
        Self::new(Action::Transcribe).with_audio_file(audio_file)
    }

    pub fn with_audio_file(mut self, audio_file: impl Into<String>) -> Self {
        self.audio_file = Some(audio_file.into());
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn audio_file(&self) -> Option<&str> {
        self.audio_file.as_deref()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Name of a member (`audio_file` or `token`) whose value was not a
    /// string. Such requests are well-formed but fail validation.
    pub fn mistyped_field(&self) -> Option<&'static str> {
        self.mistyped
    }

    /// Every string-valued member of the request, keyed by field name.
    pub fn string_fields(&self) -> Vec<(&str, &str)> {
        let mut fields = vec![("action", self.action.as_str())];
        if let Some(path) = &self.audio_file {
            fields.push(("audio_file", path.as_str()));
        }
        if let Some(token) = &self.token {
            fields.push(("token", token.as_str()));
        }
        for (key, value) in &self.extra {
            if let Some(s) = value.as_str() {
                fields.push((key.as_str(), s));
            }
        }
        fields
    }

    /// Encode for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&WireRequest {
            action: self.action.as_str().to_string(),
            audio_file: self.audio_file.clone(),
            token: self.token.clone(),
            extra: self.extra.clone(),
        })
    }

    /// Size of the request once re-serialised.
    pub fn encoded_len(&self) -> usize {
        self.to_bytes().map(|b| b.len()).unwrap_or(usize::MAX)
    }
}

/// Outcome of feeding bytes to [`parse_request`].
#[derive(Debug)]
pub enum ParseOutcome {
    /// A complete request.
    Complete(Request),
    /// The bytes so far are a valid prefix; keep reading.
    Incomplete,
}

/// Parse a request body.
///
/// Returns `Incomplete` when the buffer ends mid-value so the caller can
/// keep reading. Invalid JSON, a non-object body or a missing `action`
/// are terminal parse failures. Members of the wrong type are carried
/// through for the validator to reject.
pub fn parse_request(buf: &[u8]) -> Result<ParseOutcome, DaemonError> {
    let mut stream = serde_json::Deserializer::from_slice(buf).into_iter::<serde_json::Value>();
    let value = match stream.next() {
        None => return Ok(ParseOutcome::Incomplete),
        Some(Err(e)) if e.is_eof() => return Ok(ParseOutcome::Incomplete),
        Some(Err(e)) => return Err(DaemonError::Parse(e.to_string())),
        Some(Ok(value)) => value,
    };

    let serde_json::Value::Object(map) = value else {
        return Err(DaemonError::Parse("request body must be a JSON object".into()));
    };
    let mut extra: BTreeMap<String, serde_json::Value> = map.into_iter().collect();

    let action = match extra.remove("action") {
        None => return Err(DaemonError::Parse("missing field `action`".into())),
        Some(serde_json::Value::String(raw)) => Action::parse(&raw),
        Some(other) => Action::Unknown(other.to_string()),
    };

    let mut mistyped = None;
    let audio_file = take_string(&mut extra, "audio_file", &mut mistyped);
    let token = take_string(&mut extra, "token", &mut mistyped);

    Ok(ParseOutcome::Complete(Request {
        action,
        audio_file,
        token,
        mistyped,
        extra,
    }))
}

/// Remove `key` if it holds a string. Any other non-null value stays in
/// `extra` and is reported through `mistyped`.
fn take_string(
    extra: &mut BTreeMap<String, serde_json::Value>,
    key: &'static str,
    mistyped: &mut Option<&'static str>,
) -> Option<String> {
    match extra.remove(key) {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => {
            mistyped.get_or_insert(key);
            extra.insert(key.to_string(), other);
            None
        }
    }
}

/// Response status on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    Error,
    Shutdown,
}

/// Response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Freshly issued token; the client must present it on later requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Service status, only on `health_check` responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<ServiceStatus>,
}

impl Response {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            status: Status::Success,
            text: Some(text.into()),
            error: None,
            token: None,
            health: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            text: None,
            error: Some(message.into()),
            token: None,
            health: None,
        }
    }

    pub fn shutdown() -> Self {
        Self {
            status: Status::Shutdown,
            text: None,
            error: None,
            token: None,
            health: None,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_health(mut self, health: ServiceStatus) -> Self {
        self.health = Some(health);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_slice(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

impl From<&DaemonError> for Response {
    fn from(err: &DaemonError) -> Self {
        Response::error(err.to_string())
    }
}
