//! Shared test utilities: fixture builders and scripted collaborators.
//!
//! Available only under `#[cfg(test)]`.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::DateTime;

use crate::history::{CommitRecord, FileStat};
use crate::provider::ChatProvider;
use crate::vcs::{VcsBackend, LOG_FIELD_SEP};
use crate::DigestResult;

/// One log header line in the backend wire format.
pub fn log_header(hash: &str, name: &str, email: &str, date: &str, subject: &str) -> String {
    [hash, name, email, date, subject].join(&LOG_FIELD_SEP.to_string())
}

/// One numstat line.
pub fn numstat(additions: u64, deletions: u64, path: &str) -> String {
    format!("{}\t{}\t{}", additions, deletions, path)
}

/// A commit fixture with a fixed date; override fields as needed.
pub fn commit(
    hash: &str,
    author: &str,
    email: &str,
    message: &str,
    files: &[(&str, u64, u64)],
) -> CommitRecord {
    let mut file_map = BTreeMap::new();
    let mut additions = 0;
    let mut deletions = 0;
    for (path, add, del) in files {
        additions += add;
        deletions += del;
        file_map.insert(path.to_string(), FileStat::new(*add, *del));
    }
    CommitRecord {
        hash: hash.to_string(),
        author: author.to_string(),
        email: email.to_string(),
        date: DateTime::parse_from_rfc3339("2026-08-07T10:00:00+00:00").unwrap(),
        is_merge: message.starts_with("Merge"),
        message: message.to_string(),
        additions,
        deletions,
        files: file_map,
    }
}

/// Provider that answers every call with a fixed reply and records the
/// requests it saw.
pub struct ScriptedProvider {
    reply: String,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedProvider {
    pub fn uniform(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// (system, user) pairs in call order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

impl ChatProvider for ScriptedProvider {
    fn complete(&self, system: &str, user: &str) -> DigestResult<String> {
        self.calls
            .lock()
            .unwrap()
            .push((system.to_string(), user.to_string()));
        Ok(self.reply.clone())
    }
}

/// Clonable handle around a `ScriptedProvider` so tests can keep inspecting
/// calls after boxing the provider into a session.
#[derive(Clone)]
pub struct SharedProvider(pub std::sync::Arc<ScriptedProvider>);

impl SharedProvider {
    pub fn uniform(reply: &str) -> Self {
        Self(std::sync::Arc::new(ScriptedProvider::uniform(reply)))
    }
}

impl ChatProvider for SharedProvider {
    fn complete(&self, system: &str, user: &str) -> DigestResult<String> {
        self.0.complete(system, user)
    }
}

/// Provider that always fails, for abort-path tests.
pub struct FailingProvider;

impl ChatProvider for FailingProvider {
    fn complete(&self, _system: &str, _user: &str) -> DigestResult<String> {
        Err(crate::DigestError::Provider("scripted failure".to_string()))
    }
}

/// Backend serving canned log/diff/head text.
pub struct StaticBackend {
    pub log: String,
    pub diffs: BTreeMap<String, String>,
    pub head: String,
}

impl StaticBackend {
    pub fn new(log: &str, head: &str) -> Self {
        Self {
            log: log.to_string(),
            diffs: BTreeMap::new(),
            head: head.to_string(),
        }
    }

    pub fn with_diff(mut self, hash: &str, diff: &str) -> Self {
        self.diffs.insert(hash.to_string(), diff.to_string());
        self
    }
}

impl VcsBackend for StaticBackend {
    fn log(&self) -> DigestResult<String> {
        Ok(self.log.clone())
    }

    fn diff(&self, hash: &str) -> DigestResult<String> {
        Ok(self.diffs.get(hash).cloned().unwrap_or_default())
    }

    fn head(&self) -> DigestResult<String> {
        Ok(self.head.clone())
    }
}

/// Backend whose log always fails, for fail-closed tests.
pub struct BrokenBackend;

impl VcsBackend for BrokenBackend {
    fn log(&self) -> DigestResult<String> {
        Err(crate::DigestError::Backend("scripted backend failure".to_string()))
    }

    fn diff(&self, _hash: &str) -> DigestResult<String> {
        Err(crate::DigestError::Backend("scripted backend failure".to_string()))
    }

    fn head(&self) -> DigestResult<String> {
        Err(crate::DigestError::Backend("scripted backend failure".to_string()))
    }
}
