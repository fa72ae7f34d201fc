//! Analysis session: one repository handle owning its contributor registry,
//! history snapshot, cache store and single-flight slots.
//!
//! Replaces process-wide mutable state with an explicit context object whose
//! lifecycle is one analysis session. Registry mutation is serialized behind
//! the snapshot lock; a concurrent refresh can never expose a half-built
//! registry.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::DigestConfig;
use crate::flight::SingleFlight;
use crate::history::{self, CommitRecord, ContributorProfile};
use crate::provider::ChatProvider;
use crate::reduce::Reducer;
use crate::store::{ContributorStats, Store};
use crate::token_count::TokenCounter;
use crate::vcs::VcsBackend;
use crate::DigestResult;

/// The most recent full log pull plus the derived contributor registry.
/// Valid only while `head` still matches the backend's current head.
#[derive(Debug, Clone)]
pub struct HistorySnapshot {
    pub head: String,
    pub contributors: BTreeMap<String, ContributorProfile>,
}

pub struct DigestSession {
    pub(crate) repo_root: PathBuf,
    pub(crate) config: DigestConfig,
    pub(crate) backend: Box<dyn VcsBackend>,
    pub(crate) provider: Box<dyn ChatProvider>,
    pub(crate) counter: Box<dyn TokenCounter>,
    pub(crate) store: Store,
    pub(crate) flights: SingleFlight,
    pub(crate) snapshot: Mutex<Option<HistorySnapshot>>,
}

impl DigestSession {
    pub fn new(
        repo_root: &Path,
        config: DigestConfig,
        backend: Box<dyn VcsBackend>,
        provider: Box<dyn ChatProvider>,
        counter: Box<dyn TokenCounter>,
    ) -> Self {
        Self {
            repo_root: repo_root.to_path_buf(),
            store: Store::open(repo_root),
            config,
            backend,
            provider,
            counter,
            flights: SingleFlight::new(),
            snapshot: Mutex::new(None),
        }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Refresh the contributor registry from the backend, or reuse the
    /// snapshot when it is still fresh (its head matches the backend's
    /// current head). Returns the contributors and whether the snapshot was
    /// reused.
    ///
    /// Fail-closed: commits fold into the registry only after the whole log
    /// parsed; on a backend error the previous snapshot stays untouched and
    /// the error propagates.
    pub fn aggregate(&self) -> DigestResult<(Vec<ContributorProfile>, bool)> {
        let mut snapshot = self.snapshot.lock().unwrap_or_else(|p| p.into_inner());

        if let Some(existing) = snapshot.as_ref() {
            match self.backend.head() {
                Ok(head) if head == existing.head => {
                    tracing::debug!(head = %head, "History snapshot is fresh");
                    return Ok((existing.contributors.values().cloned().collect(), true));
                }
                Ok(_) => tracing::debug!("History snapshot is stale, refreshing"),
                // Unreadable head counts as stale; a full pull decides.
                Err(e) => tracing::warn!(error = %e, "Head lookup failed, refreshing"),
            }
        }

        let raw = self.backend.log()?;
        let commits = history::parse_log(&raw);
        let contributors = history::fold_contributors(&commits);
        let head = self.backend.head().unwrap_or_default();

        tracing::info!(
            commits = commits.len(),
            contributors = contributors.len(),
            head = %head,
            "History aggregated"
        );

        *snapshot = Some(HistorySnapshot {
            head,
            contributors: contributors.clone(),
        });
        Ok((contributors.into_values().collect(), false))
    }

    /// Point-in-time read of one contributor from the current snapshot.
    /// None when the name is unknown or nothing has been aggregated yet.
    pub fn contributor(&self, name: &str) -> Option<ContributorProfile> {
        let snapshot = self.snapshot.lock().unwrap_or_else(|p| p.into_inner());
        snapshot
            .as_ref()
            .and_then(|s| s.contributors.get(name).cloned())
    }

    /// All commits by `name`, newest first as the backend emitted them, with
    /// cached AI-rewritten messages overlaid per hash. Empty for unknown
    /// names.
    pub fn user_commits(&self, name: &str) -> DigestResult<Vec<CommitRecord>> {
        self.aggregate()?;
        let Some(profile) = self.contributor(name) else {
            return Ok(Vec::new());
        };
        let mut commits = profile.log;
        let overlay = self.store.user_commit_messages(name);
        history::overlay_messages(&mut commits, &overlay);
        Ok(commits)
    }

    /// `name`'s commits dated today in local time, overlay applied.
    pub fn today_user_commits(&self, name: &str) -> DigestResult<Vec<CommitRecord>> {
        Ok(history::today_commits(&self.user_commits(name)?))
    }

    /// Hashes of `name`'s commits whose (possibly overlaid) message is too
    /// short to convey intent.
    pub fn check_commits(&self, name: &str) -> DigestResult<Vec<String>> {
        Ok(history::leaky_commits(&self.user_commits(name)?))
    }

    /// Per-user counters for the markdown projection, from the current
    /// snapshot. Empty before the first aggregation.
    pub(crate) fn contributor_stats(&self) -> BTreeMap<String, ContributorStats> {
        let snapshot = self.snapshot.lock().unwrap_or_else(|p| p.into_inner());
        snapshot
            .as_ref()
            .map(|s| {
                s.contributors
                    .iter()
                    .map(|(name, p)| {
                        (
                            name.clone(),
                            ContributorStats {
                                commits: p.commits,
                                additions: p.additions,
                                deletions: p.deletions,
                            },
                        )
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn reducer(&self) -> Reducer<'_> {
        Reducer::new(self.counter.as_ref(), self.config.token_ceiling)
            .with_parallel_leaves(self.config.parallel_leaves)
    }

    /// One external reduce call, in closure form for the reducer.
    pub(crate) fn reduce_one(&self) -> impl Fn(&str, &str) -> DigestResult<String> + Sync + '_ {
        move |preamble: &str, payload: &str| self.provider.complete(preamble, payload)
    }

    /// First README variant present in the repository root, or empty.
    pub(crate) fn read_readme(&self) -> String {
        for candidate in ["README.md", "README.MD", "readme.md", "README"] {
            let path = self.repo_root.join(candidate);
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(content) => return content,
                    Err(e) => {
                        tracing::warn!(error = %e, path = %path.display(), "Unreadable README");
                    }
                }
            }
        }
        String::new()
    }
}
