//! Summarization entry points: whole repository, one contributor, one
//! commit message.
//!
//! Every entry point is idempotent through the cache store, exclusive
//! through its single-flight slot, and writes through only on full success.
//! A cache write failure is logged and surfaced as a warning; the computed
//! result stays valid.

use crate::flight::FlightKind;
use crate::progress::{MonotonicProgress, ProgressSink, ScaledProgress};
use crate::prompts;
use crate::reduce::{CancelToken, ReducePrompts};
use crate::session::DigestSession;
use crate::{DigestError, DigestResult};

impl DigestSession {
    /// Summarize the repository from its README. Cached under the
    /// repository key; a concurrent summarization of the same session is
    /// rejected, not queued.
    pub fn summarize_repository(
        &self,
        progress: &mut dyn ProgressSink,
        cancel: &CancelToken,
    ) -> DigestResult<String> {
        let Some(_guard) = self.flights.try_enter(FlightKind::Summary) else {
            return Err(DigestError::AlreadyInProgress(
                FlightKind::Summary.as_str().to_string(),
            ));
        };
        let mut progress = MonotonicProgress::new(progress);
        self.repository_summary_inner(&mut progress, cancel)
    }

    /// Unguarded repository summary, shared by every flow that embeds it in
    /// a prompt. Callers hold whichever flight slot applies to them.
    pub(crate) fn repository_summary_inner(
        &self,
        progress: &mut dyn ProgressSink,
        cancel: &CancelToken,
    ) -> DigestResult<String> {
        if let Some(cached) = self.store.repo_summary() {
            tracing::debug!("Repository summary served from cache");
            return Ok(cached);
        }

        progress.update(0, "Summarizing repository...");
        let readme = self.read_readme();
        let body = if readme.trim().is_empty() {
            tracing::info!("No README found, repository summary is the header only");
            String::new()
        } else {
            let paragraphs: Vec<String> = readme
                .split("\n\n")
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
            self.reducer().reduce(
                paragraphs,
                ReducePrompts {
                    leaf: prompts::REPOSITORY_README,
                    combine: prompts::REPOSITORY_README,
                },
                &self.reduce_one(),
                progress,
                cancel,
            )?
        };

        let name = self
            .repo_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.repo_root.display().to_string());
        let summary = if body.is_empty() {
            format!("The repository is named {}.", name)
        } else {
            format!("The repository is named {}.\n{}", name, body)
        };

        if let Err(e) = self.store.set_repo_summary(&summary) {
            tracing::warn!(error = %e, "Repository summary computed but not cached");
        } else if let Err(e) = self.store.refresh_markdown(&self.contributor_stats()) {
            tracing::warn!(error = %e, "Markdown projection refresh failed");
        }
        Ok(summary)
    }

    /// Summarize one contributor's work across the whole history.
    pub fn summarize_user(
        &self,
        user: &str,
        progress: &mut dyn ProgressSink,
        cancel: &CancelToken,
    ) -> DigestResult<String> {
        let Some(_guard) = self.flights.try_enter(FlightKind::Summary) else {
            return Err(DigestError::AlreadyInProgress(
                FlightKind::Summary.as_str().to_string(),
            ));
        };
        let mut progress = MonotonicProgress::new(progress);

        if let Some(cached) = self.store.user_summary(user) {
            tracing::debug!(user, "User summary served from cache");
            return Ok(cached);
        }

        let commits = self.user_commits(user)?;
        if commits.is_empty() {
            return Err(DigestError::InvalidInput(format!(
                "no commits for contributor '{}'",
                user
            )));
        }

        let repo_summary = self
            .repository_summary_inner(&mut ScaledProgress::new(&mut progress, 0, 20), cancel)?;

        progress.update(20, "Summarizing commits...");
        let units: Vec<String> = commits
            .iter()
            .map(|c| format!("{} - {}", c.date.format("%Y-%m-%d"), c.message))
            .collect();
        let leaf = prompts::user_leaf(&repo_summary);
        let combine = prompts::user_combine(&repo_summary);
        let summary = self.reducer().reduce(
            units,
            ReducePrompts { leaf: leaf.as_str(), combine: combine.as_str() },
            &self.reduce_one(),
            &mut ScaledProgress::new(&mut progress, 20, 100),
            cancel,
        )?;

        if let Err(e) = self.store.set_user_summary(user, &summary) {
            tracing::warn!(error = %e, user, "User summary computed but not cached");
        } else if let Err(e) = self.store.refresh_markdown(&self.contributor_stats()) {
            tracing::warn!(error = %e, "Markdown projection refresh failed");
        }
        progress.update(100, "Done");
        Ok(summary)
    }

    /// Regenerate the message of one commit from its diff and cache it under
    /// `(user, hash)`. Idempotent: an already-rewritten hash returns the
    /// cached message untouched.
    pub fn rewrite_commit_message(
        &self,
        user: &str,
        hash: &str,
        progress: &mut dyn ProgressSink,
        cancel: &CancelToken,
    ) -> DigestResult<String> {
        let Some(_guard) = self.flights.try_enter(FlightKind::Backfill) else {
            return Err(DigestError::AlreadyInProgress(
                FlightKind::Backfill.as_str().to_string(),
            ));
        };
        let mut progress = MonotonicProgress::new(progress);

        if let Some(cached) = self.store.user_commit_messages(user).get(hash) {
            tracing::debug!(user, hash, "Commit message served from cache");
            return Ok(cached.clone());
        }
        self.rewrite_commit_inner(user, hash, &mut progress, cancel)
    }

    fn rewrite_commit_inner(
        &self,
        user: &str,
        hash: &str,
        progress: &mut dyn ProgressSink,
        cancel: &CancelToken,
    ) -> DigestResult<String> {
        let repo_summary = self
            .repository_summary_inner(&mut ScaledProgress::new(progress, 0, 20), cancel)?;

        let short_hash = &hash[..8.min(hash.len())];
        progress.update(20, &format!("Summarizing commit {}...", short_hash));

        let diff = self.backend.diff(hash)?;
        let lines: Vec<String> = diff
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();
        if lines.is_empty() {
            return Err(DigestError::InvalidInput(format!(
                "commit {} has an empty diff",
                short_hash
            )));
        }

        let leaf = prompts::commit_message_leaf(&repo_summary);
        let combine = prompts::commit_message_combine(&repo_summary);
        let message = self.reducer().reduce(
            lines,
            ReducePrompts { leaf: leaf.as_str(), combine: combine.as_str() },
            &self.reduce_one(),
            &mut ScaledProgress::new(progress, 20, 100),
            cancel,
        )?;

        if let Err(e) = self.store.set_user_commit_message(user, hash, &message) {
            tracing::warn!(error = %e, user, hash, "Commit message computed but not cached");
        } else if let Err(e) = self.store.refresh_markdown(&self.contributor_stats()) {
            tracing::warn!(error = %e, "Markdown projection refresh failed");
        }
        Ok(message)
    }

    /// Rewrite every leak-flagged commit of `user`. Returns `(hash,
    /// message)` pairs in history order for the hashes actually rewritten.
    pub fn backfill_user(
        &self,
        user: &str,
        progress: &mut dyn ProgressSink,
        cancel: &CancelToken,
    ) -> DigestResult<Vec<(String, String)>> {
        let Some(_guard) = self.flights.try_enter(FlightKind::Backfill) else {
            return Err(DigestError::AlreadyInProgress(
                FlightKind::Backfill.as_str().to_string(),
            ));
        };
        let mut progress = MonotonicProgress::new(progress);

        let leaks = self.check_commits(user)?;
        if leaks.is_empty() {
            progress.update(100, "No commits need backfilling");
            return Ok(Vec::new());
        }

        let total = leaks.len();
        let mut rewritten = Vec::new();
        for (done, hash) in leaks.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(DigestError::Cancelled);
            }
            let lo = ((done * 100) / total) as u8;
            let hi = (((done + 1) * 100) / total) as u8;
            let message = self.rewrite_commit_inner(
                user,
                hash,
                &mut ScaledProgress::new(&mut progress, lo, hi),
                cancel,
            )?;
            rewritten.push((hash.clone(), message));
        }
        Ok(rewritten)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DigestConfig;
    use crate::progress::NullProgress;
    use crate::session::DigestSession;
    use crate::test_helpers::{
        log_header, numstat, FailingProvider, SharedProvider, StaticBackend,
    };
    use crate::token_count::HeuristicTokenCounter;
    use crate::vcs::VcsBackend;

    fn make_session(
        repo: &std::path::Path,
        backend: Box<dyn VcsBackend>,
        provider: SharedProvider,
        ceiling: usize,
    ) -> DigestSession {
        let config = DigestConfig { token_ceiling: ceiling, ..DigestConfig::default() };
        DigestSession::new(
            repo,
            config,
            backend,
            Box::new(provider),
            Box::new(HeuristicTokenCounter),
        )
    }

    fn small_log() -> String {
        [
            log_header("aaaa1111", "Alice", "a@x.io", "2026-08-07T10:00:00+00:00", "Add tokenizer adapter"),
            numstat(12, 0, "src/token.rs"),
            log_header("bbbb2222", "Alice", "a@x.io", "2026-08-07T11:00:00+00:00", "fix"),
            numstat(2, 2, "src/lib.rs"),
        ]
        .join("\n")
    }

    #[test]
    fn test_scenario_small_readme_single_direct_call() {
        let dir = tempfile::tempdir().unwrap();
        let readme: String = (0..50).map(|i| format!("line {} of prose\n", i)).collect();
        std::fs::write(dir.path().join("README.md"), &readme).unwrap();

        let provider = SharedProvider::uniform("A compact digest of the project.");
        let backend = StaticBackend::new("", "head");
        let session = make_session(dir.path(), Box::new(backend), provider.clone(), 16_000);

        let summary = session
            .summarize_repository(&mut NullProgress, &CancelToken::new())
            .unwrap();
        assert!(summary.contains("A compact digest of the project."));
        assert!(summary.starts_with("The repository is named"));
        assert_eq!(provider.0.call_count(), 1, "one direct reduce call, no recursion");
    }

    #[test]
    fn test_scenario_large_readme_leaf_plus_combine() {
        let dir = tempfile::tempdir().unwrap();
        let readme: String = (0..60)
            .map(|i| format!("Paragraph number {} with a reasonable amount of text in it.\n\n", i))
            .collect();
        std::fs::write(dir.path().join("README.md"), &readme).unwrap();

        let provider = SharedProvider::uniform("partial digest");
        let backend = StaticBackend::new("", "head");
        // Tight ceiling: paragraphs split across several leaf groups, while
        // the short partial digests pack into far fewer combine groups.
        let session = make_session(dir.path(), Box::new(backend), provider.clone(), 150);

        let summary = session
            .summarize_repository(&mut NullProgress, &CancelToken::new())
            .unwrap();
        assert!(summary.contains("partial digest"));
        let calls = provider.0.call_count();
        assert!(calls >= 3, "expected >=2 leaf groups plus a combine call, got {}", calls);

        // Result cached under the repository key.
        assert_eq!(session.store().repo_summary().unwrap(), summary);
    }

    #[test]
    fn test_repository_summary_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README.md"), "One paragraph only.").unwrap();

        let provider = SharedProvider::uniform("digest");
        let backend = StaticBackend::new("", "head");
        let session = make_session(dir.path(), Box::new(backend), provider.clone(), 16_000);

        let first = session
            .summarize_repository(&mut NullProgress, &CancelToken::new())
            .unwrap();
        let second = session
            .summarize_repository(&mut NullProgress, &CancelToken::new())
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(provider.0.call_count(), 1, "second request served from cache");
    }

    #[test]
    fn test_scenario_unknown_contributor_reports_no_commits() {
        let dir = tempfile::tempdir().unwrap();
        let provider = SharedProvider::uniform("digest");
        let backend = StaticBackend::new(&small_log(), "bbbb2222");
        let session = make_session(dir.path(), Box::new(backend), provider.clone(), 16_000);

        let err = session
            .summarize_user("Nobody", &mut NullProgress, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, DigestError::InvalidInput(_)));
        assert_eq!(provider.0.call_count(), 0, "reducer never invoked");
    }

    #[test]
    fn test_user_summary_written_through() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README.md"), "Project readme.").unwrap();
        let provider = SharedProvider::uniform("contribution digest");
        let backend = StaticBackend::new(&small_log(), "bbbb2222");
        let session = make_session(dir.path(), Box::new(backend), provider.clone(), 16_000);

        let summary = session
            .summarize_user("Alice", &mut NullProgress, &CancelToken::new())
            .unwrap();
        assert_eq!(summary, "contribution digest");
        assert_eq!(session.store().user_summary("Alice").unwrap(), summary);

        // Second call is pure cache; no further provider traffic.
        let calls = provider.0.call_count();
        session
            .summarize_user("Alice", &mut NullProgress, &CancelToken::new())
            .unwrap();
        assert_eq!(provider.0.call_count(), calls);
    }

    #[test]
    fn test_scenario_backfill_replaces_only_target_hash() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README.md"), "Project readme.").unwrap();
        let provider = SharedProvider::uniform("Correct tokenizer edge case");
        let backend = StaticBackend::new(&small_log(), "bbbb2222")
            .with_diff("bbbb2222", "--- a/src/lib.rs\n+++ b/src/lib.rs\n+pub mod token;\n-mod token;");
        let session = make_session(dir.path(), Box::new(backend), provider.clone(), 16_000);

        // "fix" is flagged, the descriptive message is not.
        assert_eq!(session.check_commits("Alice").unwrap(), vec!["bbbb2222".to_string()]);

        let rewritten = session
            .backfill_user("Alice", &mut NullProgress, &CancelToken::new())
            .unwrap();
        assert_eq!(rewritten.len(), 1);
        assert_eq!(rewritten[0].0, "bbbb2222");

        let commits = session.user_commits("Alice").unwrap();
        let by_hash: std::collections::BTreeMap<_, _> =
            commits.iter().map(|c| (c.hash.as_str(), c.message.as_str())).collect();
        assert_eq!(by_hash["bbbb2222"], "Correct tokenizer edge case");
        assert_eq!(by_hash["aaaa1111"], "Add tokenizer adapter", "other commits untouched");

        // The leak is gone and the backfill is idempotent.
        assert!(session.check_commits("Alice").unwrap().is_empty());
        let calls = provider.0.call_count();
        session
            .rewrite_commit_message("Alice", "bbbb2222", &mut NullProgress, &CancelToken::new())
            .unwrap();
        assert_eq!(provider.0.call_count(), calls);
    }

    #[test]
    fn test_provider_failure_leaves_cache_clean() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README.md"), "Some readme body.").unwrap();
        let backend = StaticBackend::new(&small_log(), "bbbb2222");
        let session = DigestSession::new(
            dir.path(),
            DigestConfig::default(),
            Box::new(backend),
            Box::new(FailingProvider),
            Box::new(HeuristicTokenCounter),
        );

        let err = session
            .summarize_repository(&mut NullProgress, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, DigestError::Provider(_)));
        assert!(session.store().repo_summary().is_none(), "no partial cache write");
    }

    #[test]
    fn test_concurrent_summary_rejected_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let provider = SharedProvider::uniform("digest");
        let backend = StaticBackend::new(&small_log(), "bbbb2222");
        let session = make_session(dir.path(), Box::new(backend), provider, 16_000);

        let held = session.flights.try_enter(crate::flight::FlightKind::Summary).unwrap();
        let err = session
            .summarize_repository(&mut NullProgress, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, DigestError::AlreadyInProgress(_)));

        drop(held);
        assert!(session
            .summarize_repository(&mut NullProgress, &CancelToken::new())
            .is_ok());
    }
}
