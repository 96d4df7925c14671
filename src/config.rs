use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Attendance reconciliation sidecar: JSON requests on stdin, responses on stdout.
#[derive(Parser, Debug, Clone)]
#[command(name = "attendanced", version)]
pub struct Config {
    /// Workspace directory to open at startup
    #[arg(long, env = "ATTENDANCED_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Tracing filter directive (e.g. "info", "attendanced=debug")
    #[arg(long, env = "ATTENDANCED_LOG", default_value = "info")]
    pub log_level: String,

    /// How long a writer waits for the database lock, in milliseconds
    #[arg(long, env = "ATTENDANCED_BUSY_TIMEOUT_MS", default_value = "5000")]
    pub busy_timeout_ms: u64,
}

impl Config {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
