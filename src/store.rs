//! Memoizing cache store.
//!
//! One structured JSON record per repository (`.gitdigest/digest.json`)
//! holds the repository summary, per-user summaries and per-user rewritten
//! commit messages. Daily reports are large free-form text, so each lives
//! in its own document under `.gitdigest/reports/`. A derived `DIGEST.md`
//! is regenerated from the record after every write; it is a projection,
//! never read back.
//!
//! Read failures degrade to a cache miss. Write failures surface as
//! `DigestError::Cache` for the caller to report as a warning; results
//! already computed stay valid. The record is read-modify-write, so all
//! mutation is serialized behind one lock.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::constants::{MARKDOWN_FILE, RECORD_FILE, REPORTS_DIR, STORE_DIR};
use crate::{DigestError, DigestResult};

/// The durable record: three of the four namespaces (daily reports are
/// separate documents).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DigestRecord {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub user_summaries: BTreeMap<String, String>,
    /// user -> (commit hash -> rewritten message)
    #[serde(default)]
    pub user_commits: BTreeMap<String, BTreeMap<String, String>>,
}

/// Counters shown in the markdown projection's per-user table.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContributorStats {
    pub commits: u64,
    pub additions: u64,
    pub deletions: u64,
}

pub struct Store {
    dir: PathBuf,
    repo_name: String,
    lock: Mutex<()>,
}

impl Store {
    /// Open (or lazily create on first write) the store for a repository.
    pub fn open(repo_root: &Path) -> Self {
        let repo_name = repo_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| repo_root.display().to_string());
        Self {
            dir: repo_root.join(STORE_DIR),
            repo_name,
            lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self) -> PathBuf {
        self.dir.join(RECORD_FILE)
    }

    fn report_path(&self, user: &str, date: &str) -> PathBuf {
        let slug: String = user
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect();
        self.dir.join(REPORTS_DIR).join(format!("{}-{}.md", slug, date))
    }

    /// Unreadable or corrupt records are a miss, not a failure.
    fn read_record(&self) -> DigestRecord {
        let path = self.record_path();
        if !path.exists() {
            return DigestRecord::default();
        }
        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Corrupt digest record, treating as empty");
                DigestRecord::default()
            }),
            Err(e) => {
                tracing::warn!(error = %e, "Unreadable digest record, treating as empty");
                DigestRecord::default()
            }
        }
    }

    fn write_record(&self, record: &DigestRecord) -> DigestResult<()> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| DigestError::Cache(format!("create {}: {}", self.dir.display(), e)))?;
        let json = serde_json::to_string_pretty(record)?;
        std::fs::write(self.record_path(), json)
            .map_err(|e| DigestError::Cache(format!("write digest record: {}", e)))?;
        Ok(())
    }

    fn mutate(&self, apply: impl FnOnce(&mut DigestRecord)) -> DigestResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut record = self.read_record();
        apply(&mut record);
        self.write_record(&record)
    }

    // === Namespace: repository summary ===

    pub fn repo_summary(&self) -> Option<String> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        self.read_record().summary.filter(|s| !s.is_empty())
    }

    pub fn set_repo_summary(&self, summary: &str) -> DigestResult<()> {
        self.mutate(|r| r.summary = Some(summary.to_string()))
    }

    // === Namespace: per-user summary ===

    pub fn user_summary(&self, user: &str) -> Option<String> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        self.read_record()
            .user_summaries
            .get(user)
            .filter(|s| !s.is_empty())
            .cloned()
    }

    pub fn set_user_summary(&self, user: &str, summary: &str) -> DigestResult<()> {
        self.mutate(|r| {
            r.user_summaries.insert(user.to_string(), summary.to_string());
        })
    }

    // === Namespace: per-user rewritten commit messages ===

    pub fn user_commit_messages(&self, user: &str) -> BTreeMap<String, String> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        self.read_record()
            .user_commits
            .get(user)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_user_commit_message(
        &self,
        user: &str,
        hash: &str,
        message: &str,
    ) -> DigestResult<()> {
        self.mutate(|r| {
            r.user_commits
                .entry(user.to_string())
                .or_default()
                .insert(hash.to_string(), message.to_string());
        })
    }

    // === Namespace: per-user per-day report (independent documents) ===

    pub fn daily_report(&self, user: &str, date: &str) -> Option<String> {
        let path = self.report_path(user, date);
        match std::fs::read_to_string(&path) {
            Ok(report) if !report.is_empty() => Some(report),
            Ok(_) => None,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(error = %e, "Unreadable report document, treating as miss");
                None
            }
        }
    }

    pub fn set_daily_report(&self, user: &str, date: &str, report: &str) -> DigestResult<()> {
        let path = self.report_path(user, date);
        let parent = path.parent().expect("report path has a parent");
        std::fs::create_dir_all(parent)
            .map_err(|e| DigestError::Cache(format!("create {}: {}", parent.display(), e)))?;
        std::fs::write(&path, report)
            .map_err(|e| DigestError::Cache(format!("write report document: {}", e)))?;
        Ok(())
    }

    // === Derived markdown projection ===

    /// Regenerate `DIGEST.md` from the current record. Pure projection;
    /// users missing from `stats` get a zero row.
    pub fn refresh_markdown(&self, stats: &BTreeMap<String, ContributorStats>) -> DigestResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let record = self.read_record();

        let mut markdown = String::new();
        markdown.push_str(&format!("## {}\n\n", self.repo_name));
        markdown.push_str("### Summary\n\n");
        markdown.push_str(record.summary.as_deref().unwrap_or(""));
        markdown.push_str("\n\n### User Summary\n\n");
        for (user, summary) in &record.user_summaries {
            let s = stats.get(user).copied().unwrap_or_default();
            markdown.push_str(&format!("#### {}\n\n", user));
            markdown.push_str("| Commits | Additions | Deletions |\n");
            markdown.push_str("| ------- | --------- | --------- |\n");
            markdown.push_str(&format!("| {} | {} | {} |\n\n", s.commits, s.additions, s.deletions));
            markdown.push_str(&format!("{}\n\n", summary));
        }

        std::fs::create_dir_all(&self.dir)
            .map_err(|e| DigestError::Cache(format!("create {}: {}", self.dir.display(), e)))?;
        std::fs::write(self.dir.join(MARKDOWN_FILE), markdown)
            .map_err(|e| DigestError::Cache(format!("write markdown projection: {}", e)))?;
        Ok(())
    }
}
