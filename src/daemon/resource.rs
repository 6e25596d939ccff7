//! Process resource probe used by health reporting.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Point-in-time view of the daemon process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub pid: u32,
    pub memory_bytes: u64,
    pub memory_human: String,
    pub uptime_secs: u64,
}

/// Reads memory and uptime for the current process.
#[derive(Debug)]
pub struct ResourceProbe {
    pid: u32,
    started: Instant,
}

impl Default for ResourceProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe {
    pub fn new() -> Self {
        Self {
            pid: std::process::id(),
            started: Instant::now(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Resident set size in bytes. Returns 0 where unsupported.
    pub fn memory_bytes(&self) -> u64 {
        #[cfg(target_os = "linux")]
        {
            linux_rss()
        }
        #[cfg(not(target_os = "linux"))]
        {
            0
        }
    }

    pub fn snapshot(&self) -> ResourceSnapshot {
        let memory_bytes = self.memory_bytes();
        ResourceSnapshot {
            pid: self.pid,
            memory_bytes,
            memory_human: format_bytes(memory_bytes),
            uptime_secs: self.uptime().as_secs(),
        }
    }
}

#[cfg(target_os = "linux")]
fn linux_rss() -> u64 {
    use std::fs;
    use tracing::debug;

    // statm fields are in pages: size resident share text lib data dt
    const PAGE_SIZE: u64 = 4096;

    match fs::read_to_string("/proc/self/statm") {
        Ok(content) => content
            .split_whitespace()
            .nth(1)
            .and_then(|pages| pages.parse::<u64>().ok())
            .map(|pages| pages * PAGE_SIZE)
            .unwrap_or(0),
        Err(e) => {
            debug!(error = %e, "Failed to read /proc/self/statm");
            0
        }
    }
}

/// Human-readable byte count, `"unknown"` for zero.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes == 0 {
        "unknown".to_string()
    } else if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
