//! Transcription daemon: keeps a speech model warm behind a local socket.
//!
//! ## Architecture
//!
//! ```text
//!   client ──TCP──▶ ConnectionServer (accept loop, thread per connection)
//!                          │
//!                          ▼
//!                   RequestRouter ──▶ Validator      (shape, paths, content)
//!                          │      ──▶ SecurityGate   (rate limit, tokens)
//!                          ▼
//!                     ModelHandle  ──▶ ModelBackend   (load / restore / cache)
//! ```
//!
//! One connection carries one JSON request and at most one JSON response.
//! Every component is constructed explicitly and shared by `Arc`, so
//! several independent servers can run in one process.
//!
//! ## Usage
//!
//! ```ignore
//! use asr_daemon::daemon::{ConnectionServer, DaemonClient, ClientConfig};
//!
//! let server = ConnectionServer::from_config(&config, backend);
//! server.run()?;
//!
//! let client = DaemonClient::new(ClientConfig::new("127.0.0.1", 8765));
//! let text = client.transcribe(Path::new("/tmp/clip.wav"))?;
//! ```

pub mod backend;
pub mod client;
pub mod core;
pub mod error;
pub mod health;
pub mod model;
pub mod protocol;
pub mod resource;
pub mod router;
pub mod security;
pub mod validation;

pub use backend::CommandBackend;
pub use client::{ClientConfig, ClientError, DaemonClient};
pub use core::{ConnectionServer, ServerOptions, ShutdownHandle};
pub use error::{DaemonError, ResourceError, SecurityError};
pub use health::{HealthReporter, OverallHealth, ServiceStatus};
pub use model::{InferencePolicy, ModelBackend, ModelHandle, ModelState, SpeechModel};
pub use protocol::{Action, Request, Response, Status};
pub use router::RequestRouter;
pub use security::{SecurityConfig, SecurityGate};
pub use validation::{Severity, ValidationResult, Validator, ValidatorConfig};
