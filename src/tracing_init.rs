//! Tracing initialization: per-repository log file under the user data dir.
//!
//! The engine is a library first; the host decides when to initialize. Log
//! files are keyed by a hash of the repository path so two analyses never
//! interleave their logs.

use std::path::Path;
use std::sync::Mutex;

use md5::{Digest, Md5};

/// Stable short slug for a repository path.
pub fn repo_slug(repo_root: &Path) -> String {
    let mut hasher = Md5::new();
    hasher.update(repo_root.to_string_lossy().as_bytes());
    let hash = hasher.finalize();
    hash.iter().take(8).map(|b| format!("{:02x}", b)).collect()
}

/// Initialize tracing to `{data_dir}/gitdigest/logs/{slug}.log` (append
/// mode). Filter from `RUST_LOG`, default `info`.
pub fn init_file_tracing(repo_root: &Path) {
    use tracing_subscriber::EnvFilter;

    let log_dir = dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("gitdigest")
        .join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_path = log_dir.join(format!("{}.log", repo_slug(repo_root)));

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .unwrap_or_else(|_| {
            let null = if cfg!(windows) { "NUL" } else { "/dev/null" };
            std::fs::File::create(null).expect("Cannot create log fallback")
        });

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(log_file))
        .with_target(true)
        .with_ansi(false)
        .init();
}
