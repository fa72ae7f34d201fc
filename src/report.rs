//! Daily report generation: today's diffs, leaf-reduced into working notes,
//! then combined into one markdown report per contributor per calendar day.

use chrono::Local;

use crate::flight::FlightKind;
use crate::progress::{MonotonicProgress, ProgressSink, ScaledProgress};
use crate::prompts;
use crate::reduce::{CancelToken, ReducePrompts};
use crate::session::DigestSession;
use crate::{DigestError, DigestResult};

impl DigestSession {
    /// Write the report for `user` covering today's commits (local time).
    /// Cached as an independent document keyed by `(repo, user, date)`.
    pub fn write_daily_report(
        &self,
        user: &str,
        progress: &mut dyn ProgressSink,
        cancel: &CancelToken,
    ) -> DigestResult<String> {
        let Some(_guard) = self.flights.try_enter(FlightKind::Report) else {
            return Err(DigestError::AlreadyInProgress(
                FlightKind::Report.as_str().to_string(),
            ));
        };
        let mut progress = MonotonicProgress::new(progress);

        let date = Local::now().format("%Y-%m-%d").to_string();
        if let Some(cached) = self.store.daily_report(user, &date) {
            tracing::debug!(user, date, "Daily report served from cache");
            return Ok(cached);
        }

        let commits = self.today_user_commits(user)?;
        if commits.is_empty() {
            return Err(DigestError::InvalidInput(format!(
                "no commits today for contributor '{}'",
                user
            )));
        }

        let repo_summary = self
            .repository_summary_inner(&mut ScaledProgress::new(&mut progress, 0, 10), cancel)?;

        progress.update(10, "Collecting diffs...");
        let mut diff = String::new();
        for commit in &commits {
            diff.push_str(&self.backend.diff(&commit.hash)?);
            diff.push('\n');
        }
        let lines: Vec<String> = diff
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();
        if lines.is_empty() {
            return Err(DigestError::InvalidInput(format!(
                "today's commits for '{}' have empty diffs",
                user
            )));
        }

        progress.update(10, "Summarizing changes...");
        let leaf = prompts::report_leaf(&repo_summary);
        let notes = self.reducer().leaf_pass(
            &lines,
            &leaf,
            &self.reduce_one(),
            &mut ScaledProgress::new(&mut progress, 10, 70),
            cancel,
        )?;

        progress.update(70, "Writing the report...");
        let final_prompt = prompts::report_final(&date, user, &repo_summary);
        let report = self.reducer().reduce(
            notes,
            ReducePrompts { leaf: final_prompt.as_str(), combine: final_prompt.as_str() },
            &self.reduce_one(),
            &mut ScaledProgress::new(&mut progress, 70, 100),
            cancel,
        )?;

        if let Err(e) = self.store.set_daily_report(user, &date, &report) {
            tracing::warn!(error = %e, user, date, "Daily report computed but not cached");
        }
        progress.update(100, "Done");
        Ok(report)
    }
}
