//! History aggregation: raw log text to commits, contributors and file trees.
//!
//! Contributor identity is the author NAME string, not the email; two
//! commits sharing a name but not an email merge into one profile. Known
//! limitation carried over from the system this replaces.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset, Local};
use regex::Regex;

use crate::constants::LEAK_MIN_TOKENS;
use crate::vcs::LOG_FIELD_SEP;

/// Aggregated add/delete counts for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub additions: u64,
    pub deletions: u64,
}

impl FileStat {
    pub fn new(additions: u64, deletions: u64) -> Self {
        Self { additions, deletions }
    }

    fn absorb(&mut self, other: &FileStat) {
        self.additions += other.additions;
        self.deletions += other.deletions;
    }
}

/// One parsed commit. `hash` is the identity; `message` may later be
/// replaced by a cached AI-generated message when listing commits.
#[derive(Debug, Clone)]
pub struct CommitRecord {
    pub hash: String,
    pub author: String,
    pub email: String,
    pub date: DateTime<FixedOffset>,
    pub message: String,
    pub is_merge: bool,
    pub additions: u64,
    pub deletions: u64,
    pub files: BTreeMap<String, FileStat>,
}

/// Running totals for one author name, plus their commit log.
#[derive(Debug, Clone)]
pub struct ContributorProfile {
    pub name: String,
    pub email: String,
    pub commits: u64,
    pub additions: u64,
    pub deletions: u64,
    pub files: BTreeMap<String, FileStat>,
    pub log: Vec<CommitRecord>,
}

impl ContributorProfile {
    fn new(name: &str, email: &str) -> Self {
        Self {
            name: name.to_string(),
            email: email.to_string(),
            commits: 0,
            additions: 0,
            deletions: 0,
            files: BTreeMap::new(),
            log: Vec::new(),
        }
    }

    fn fold(&mut self, commit: &CommitRecord) {
        self.commits += 1;
        self.additions += commit.additions;
        self.deletions += commit.deletions;
        for (path, stat) in &commit.files {
            self.files
                .entry(path.clone())
                .and_modify(|existing| existing.absorb(stat))
                .or_insert_with(|| stat.clone());
        }
        self.log.push(commit.clone());
    }

    /// Hierarchical path tree, derived on demand from the file-stat map so
    /// it can never drift from the map it summarizes.
    pub fn file_tree(&self) -> FileNode {
        FileNode::build(&self.files)
    }
}

/// One node of the path hierarchy. Invariant: a node's counts equal the sum
/// of its descendant leaves' counts.
#[derive(Debug, Clone)]
pub struct FileNode {
    pub name: String,
    pub additions: u64,
    pub deletions: u64,
    pub children: BTreeMap<String, FileNode>,
}

impl FileNode {
    fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            additions: 0,
            deletions: 0,
            children: BTreeMap::new(),
        }
    }

    fn build(files: &BTreeMap<String, FileStat>) -> FileNode {
        let mut root = FileNode::empty("root");
        for (path, stat) in files {
            let mut node = &mut root;
            node.additions += stat.additions;
            node.deletions += stat.deletions;
            for segment in path.split('/') {
                node = node
                    .children
                    .entry(segment.to_string())
                    .or_insert_with(|| FileNode::empty(segment));
                node.additions += stat.additions;
                node.deletions += stat.deletions;
            }
        }
        root
    }
}

fn numstat_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)\t(\d+)\t(.+)$").expect("static regex"))
}

/// Parse raw backend log text into commit records.
///
/// Header lines carry 0x1f-separated fields; numstat lines attach to the
/// commit above them. Lines matching neither form are ignored, as are
/// binary-file numstat entries (`-\t-\tpath`).
pub fn parse_log(raw: &str) -> Vec<CommitRecord> {
    let mut commits: Vec<CommitRecord> = Vec::new();

    for line in raw.lines() {
        if line.contains(LOG_FIELD_SEP) {
            let fields: Vec<&str> = line.splitn(5, LOG_FIELD_SEP).collect();
            if fields.len() != 5 {
                tracing::warn!(line_len = line.len(), "Skipping malformed log header");
                continue;
            }
            let date = match DateTime::parse_from_rfc3339(fields[3]) {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!(error = %e, hash = fields[0], "Skipping commit with bad date");
                    continue;
                }
            };
            let message = fields[4].to_string();
            commits.push(CommitRecord {
                hash: fields[0].to_string(),
                author: fields[1].to_string(),
                email: fields[2].to_string(),
                date,
                is_merge: message.starts_with("Merge"),
                message,
                additions: 0,
                deletions: 0,
                files: BTreeMap::new(),
            });
        } else if let Some(caps) = numstat_re().captures(line) {
            let Some(commit) = commits.last_mut() else {
                continue;
            };
            let additions: u64 = caps[1].parse().unwrap_or(0);
            let deletions: u64 = caps[2].parse().unwrap_or(0);
            let path = caps[3].to_string();
            commit.additions += additions;
            commit.deletions += deletions;
            commit
                .files
                .entry(path)
                .and_modify(|stat| {
                    stat.additions += additions;
                    stat.deletions += deletions;
                })
                .or_insert_with(|| FileStat::new(additions, deletions));
        }
    }

    commits
}

/// Fold commits into a name-keyed contributor registry.
pub fn fold_contributors(commits: &[CommitRecord]) -> BTreeMap<String, ContributorProfile> {
    let mut registry: BTreeMap<String, ContributorProfile> = BTreeMap::new();
    for commit in commits {
        registry
            .entry(commit.author.clone())
            .or_insert_with(|| ContributorProfile::new(&commit.author, &commit.email))
            .fold(commit);
    }
    registry
}

/// Replace messages by hash where the overlay has an entry.
pub fn overlay_messages(commits: &mut [CommitRecord], overlay: &BTreeMap<String, String>) {
    for commit in commits.iter_mut() {
        if let Some(rewritten) = overlay.get(&commit.hash) {
            commit.message = rewritten.clone();
        }
    }
}

/// Commits authored today, in local time.
pub fn today_commits(commits: &[CommitRecord]) -> Vec<CommitRecord> {
    let today = Local::now().date_naive();
    commits
        .iter()
        .filter(|c| c.date.with_timezone(&Local).date_naive() == today)
        .cloned()
        .collect()
}

fn leak_split_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[\s,;:"']+"#).expect("static regex"))
}

/// Hashes of commits whose message is too short to convey intent: splitting
/// on whitespace and punctuation yields fewer than two tokens.
pub fn leaky_commits(commits: &[CommitRecord]) -> Vec<String> {
    commits
        .iter()
        .filter(|c| {
            leak_split_re()
                .split(&c.message)
                .filter(|fragment| !fragment.is_empty())
                .count()
                < LEAK_MIN_TOKENS
        })
        .map(|c| c.hash.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{commit, log_header, numstat};

    #[test]
    fn test_parse_header_and_numstat() {
        let raw = format!(
            "{}\n{}\n{}\n",
            log_header("abc123", "Alice", "alice@example.com", "2026-08-07T10:00:00+00:00", "Add parser"),
            numstat(10, 2, "src/parse.rs"),
            numstat(3, 1, "src/lib.rs"),
        );
        let commits = parse_log(&raw);
        assert_eq!(commits.len(), 1);
        let c = &commits[0];
        assert_eq!(c.hash, "abc123");
        assert_eq!(c.author, "Alice");
        assert_eq!(c.additions, 13);
        assert_eq!(c.deletions, 3);
        assert_eq!(c.files.len(), 2);
        assert_eq!(c.files["src/parse.rs"], FileStat::new(10, 2));
        assert!(!c.is_merge);
    }

    #[test]
    fn test_merge_flag_from_subject() {
        let raw = log_header("d4", "Bob", "b@x.io", "2026-08-07T09:00:00+00:00", "Merge branch 'dev'");
        let commits = parse_log(&raw);
        assert!(commits[0].is_merge);
    }

    #[test]
    fn test_binary_numstat_and_noise_ignored() {
        let raw = format!(
            "{}\n-\t-\tassets/logo.png\nnot a numstat line\n",
            log_header("e5", "Bob", "b@x.io", "2026-08-07T09:00:00+00:00", "Add logo"),
        );
        let commits = parse_log(&raw);
        assert_eq!(commits[0].files.len(), 0);
        assert_eq!(commits[0].additions, 0);
    }

    #[test]
    fn test_bad_date_skips_commit_but_not_rest() {
        let raw = format!(
            "{}\n{}\n",
            log_header("bad", "Bob", "b@x.io", "yesterday-ish", "Broken"),
            log_header("good", "Bob", "b@x.io", "2026-08-07T09:00:00+00:00", "Fine"),
        );
        let commits = parse_log(&raw);
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].hash, "good");
    }

    #[test]
    fn test_fold_merges_same_name_different_email() {
        let commits = vec![
            commit("a1", "Alice", "alice@work.com", "first change", &[("src/a.rs", 5, 1)]),
            commit("a2", "Alice", "alice@home.net", "second change", &[("src/a.rs", 2, 2), ("src/b.rs", 7, 0)]),
        ];
        let registry = fold_contributors(&commits);
        assert_eq!(registry.len(), 1);
        let alice = &registry["Alice"];
        assert_eq!(alice.commits, 2);
        assert_eq!(alice.additions, 14);
        assert_eq!(alice.deletions, 3);
        assert_eq!(alice.files["src/a.rs"], FileStat::new(7, 3));
        assert_eq!(alice.email, "alice@work.com", "first-seen email wins");
        assert_eq!(alice.log.len(), 2);
    }

    #[test]
    fn test_file_tree_nodes_sum_descendant_leaves() {
        let commits = vec![commit(
            "c1",
            "Alice",
            "a@x.io",
            "touch several files",
            &[("src/core/parse.rs", 10, 4), ("src/core/emit.rs", 6, 0), ("docs/guide.md", 1, 1)],
        )];
        let registry = fold_contributors(&commits);
        let tree = registry["Alice"].file_tree();

        assert_eq!(tree.additions, 17);
        assert_eq!(tree.deletions, 5);
        let src = &tree.children["src"];
        assert_eq!(src.additions, 16);
        assert_eq!(src.deletions, 4);
        let core = &src.children["core"];
        assert_eq!(core.additions, 16);
        assert_eq!(core.children["parse.rs"].additions, 10);
        assert_eq!(tree.children["docs"].children["guide.md"].deletions, 1);
    }

    #[test]
    fn test_overlay_replaces_only_matching_hashes() {
        let mut commits = vec![
            commit("h1", "A", "a@x.io", "fix", &[]),
            commit("h2", "A", "a@x.io", "improve docs", &[]),
        ];
        let mut overlay = BTreeMap::new();
        overlay.insert("h1".to_string(), "Correct parser offset handling".to_string());
        overlay_messages(&mut commits, &overlay);
        assert_eq!(commits[0].message, "Correct parser offset handling");
        assert_eq!(commits[1].message, "improve docs");
    }

    #[test]
    fn test_leaky_commits_single_word_flagged() {
        let commits = vec![
            commit("h1", "A", "a@x.io", "fix", &[]),
            commit("h2", "A", "a@x.io", "fix login validation", &[]),
            commit("h3", "A", "a@x.io", "wip.", &[]),
        ];
        let leaks = leaky_commits(&commits);
        assert_eq!(leaks, vec!["h1".to_string(), "h3".to_string()]);
    }

    #[test]
    fn test_today_commits_filters_by_local_date() {
        let now = Local::now().fixed_offset();
        let mut fresh = commit("new", "A", "a@x.io", "today work", &[]);
        fresh.date = now;
        let mut old = commit("old", "A", "a@x.io", "ancient work", &[]);
        old.date = DateTime::parse_from_rfc3339("2020-01-01T12:00:00+00:00").unwrap();

        let today = today_commits(&[fresh, old]);
        assert_eq!(today.len(), 1);
        assert_eq!(today[0].hash, "new");
    }
}
