//! Model backend that delegates inference to an external transcriber.
//!
//! The command is an argv template. `{audio}` is replaced by the audio
//! path and `{model}` by the model identifier, e.g.
//! `whisper-cli -m {model} -f {audio} --no-timestamps`.
//! "Loading" resolves the executable once; the snapshot stores the
//! resolved argv so a cached load skips the `PATH` lookup.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::model::{ModelBackend, SpeechModel};

const AUDIO_PLACEHOLDER: &str = "{audio}";
const MODEL_PLACEHOLDER: &str = "{model}";

/// Longest stderr excerpt carried into an inference error.
const STDERR_EXCERPT: usize = 200;

#[derive(Debug, Clone)]
pub struct CommandBackend {
    template: Vec<String>,
}

impl CommandBackend {
    /// Build from a template using shell quoting rules.
    pub fn from_template(template: &str) -> Result<Self> {
        let argv = shell_words::split(template)
            .with_context(|| format!("inference command is not valid shell syntax: {template}"))?;
        if argv.is_empty() {
            bail!("inference command is empty");
        }
        if !argv.iter().any(|a| a.contains(AUDIO_PLACEHOLDER)) {
            bail!("inference command must contain {AUDIO_PLACEHOLDER}");
        }
        Ok(Self { template: argv })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ResolvedCommand {
    program: PathBuf,
    args: Vec<String>,
}

impl ModelBackend for CommandBackend {
    fn load_fresh(&self, model_id: &str) -> Result<Arc<dyn SpeechModel>> {
        let program = which::which(&self.template[0])
            .with_context(|| format!("transcriber {} not found on PATH", self.template[0]))?;
        let args = self.template[1..]
            .iter()
            .map(|a| a.replace(MODEL_PLACEHOLDER, model_id))
            .collect();
        Ok(Arc::new(CommandModel {
            resolved: ResolvedCommand { program, args },
        }))
    }

    fn restore(&self, _model_id: &str, snapshot: &[u8]) -> Result<Arc<dyn SpeechModel>> {
        let resolved: ResolvedCommand =
            serde_json::from_slice(snapshot).context("decoding cached command")?;
        if !resolved.program.is_file() {
            return Err(anyhow!(
                "cached transcriber {} no longer exists",
                resolved.program.display()
            ));
        }
        Ok(Arc::new(CommandModel { resolved }))
    }
}

struct CommandModel {
    resolved: ResolvedCommand,
}

impl SpeechModel for CommandModel {
    fn transcribe(&self, audio: &Path) -> Result<String> {
        let audio = audio.to_string_lossy();
        let args: Vec<String> = self
            .resolved
            .args
            .iter()
            .map(|a| a.replace(AUDIO_PLACEHOLDER, &audio))
            .collect();

        debug!(program = %self.resolved.program.display(), "Running transcriber");
        let output = Command::new(&self.resolved.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("spawning {}", self.resolved.program.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let excerpt: String = stderr.trim().chars().take(STDERR_EXCERPT).collect();
            bail!("transcriber exited with {}: {excerpt}", output.status);
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn snapshot(&self) -> Option<Vec<u8>> {
        serde_json::to_vec(&self.resolved).ok()
    }
}
