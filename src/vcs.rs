//! Version-control backend boundary.
//!
//! The engine consumes raw text: a structured log, per-commit diffs, and the
//! current head hash. Parsing is the history aggregator's job; the backend
//! only produces text.
//!
//! Log wire format (one header line per commit, fields separated by 0x1f):
//!   <hash>\x1f<author name>\x1f<author email>\x1f<RFC3339 date>\x1f<subject>
//! followed by that commit's `--numstat` lines.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::{DigestError, DigestResult};

/// Field separator used in log header lines.
pub const LOG_FIELD_SEP: char = '\x1f';

const LOG_PRETTY: &str = "--pretty=format:%H%x1f%an%x1f%ae%x1f%aI%x1f%s";

pub trait VcsBackend: Send + Sync {
    /// Full history: header + numstat text for every commit.
    fn log(&self) -> DigestResult<String>;

    /// Unified diff text for one commit.
    fn diff(&self, hash: &str) -> DigestResult<String>;

    /// Current head commit hash, for the snapshot freshness test.
    fn head(&self) -> DigestResult<String>;
}

/// Shells out to the `git` binary in a working directory.
pub struct GitCli {
    workdir: PathBuf,
}

impl GitCli {
    pub fn new(workdir: &Path) -> Self {
        Self { workdir: workdir.to_path_buf() }
    }

    fn run(&self, args: &[&str]) -> DigestResult<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .output()
            .map_err(|e| {
                DigestError::Backend(format!(
                    "Failed to spawn git: {}. Is `git` installed?",
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DigestError::Backend(format!(
                "git {} failed (exit {}): {}",
                args.first().unwrap_or(&""),
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl VcsBackend for GitCli {
    fn log(&self) -> DigestResult<String> {
        self.run(&["log", LOG_PRETTY, "--numstat"])
    }

    fn diff(&self, hash: &str) -> DigestResult<String> {
        // First-parent range; for a root commit fall back to the full show.
        let range = format!("{}^..{}", hash, hash);
        match self.run(&["diff", &range]) {
            Ok(diff) => Ok(diff),
            Err(_) => self.run(&["show", "--format=", hash]),
        }
    }

    fn head(&self) -> DigestResult<String> {
        Ok(self.run(&["rev-parse", "HEAD"])?.trim().to_string())
    }
}
