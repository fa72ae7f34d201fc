//! CLI host: wires the engine to the real collaborators (git subprocess,
//! OpenAI-compatible endpoint, configured tokenizer) and prints results.

use std::path::PathBuf;

use anyhow::{Context, Result};

use gitdigest::config::DigestConfig;
use gitdigest::constants::STORE_DIR;
use gitdigest::progress::ProgressSink;
use gitdigest::provider::OpenAiChat;
use gitdigest::reduce::CancelToken;
use gitdigest::token_count::{HeuristicTokenCounter, HfTokenCounter, TokenCounter};
use gitdigest::vcs::GitCli;
use gitdigest::DigestSession;

/// Progress printed to stderr so stdout stays clean for the result.
struct ConsoleProgress {
    last: Option<(u8, String)>,
}

impl ConsoleProgress {
    fn new() -> Self {
        Self { last: None }
    }
}

impl ProgressSink for ConsoleProgress {
    fn update(&mut self, percent: u8, label: &str) {
        let state = (percent, label.to_string());
        if self.last.as_ref() != Some(&state) {
            eprintln!("[{:>3}%] {}", percent, label);
            self.last = Some(state);
        }
    }
}

fn resolve_repo(path: Option<&str>) -> Result<PathBuf> {
    let root = match path {
        Some(p) => PathBuf::from(p),
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let root = root
        .canonicalize()
        .with_context(|| format!("No such directory: {}", root.display()))?;
    if !root.join(".git").exists() {
        anyhow::bail!("{} is not a git repository", root.display());
    }
    Ok(root)
}

fn open_session(path: Option<&str>) -> Result<DigestSession> {
    let root = resolve_repo(path)?;
    gitdigest::tracing_init::init_file_tracing(&root);

    let config = DigestConfig::load(&root.join(STORE_DIR));
    let counter: Box<dyn TokenCounter> = match &config.tokenizer_file {
        Some(file) => Box::new(HfTokenCounter::from_file(file)?),
        None => Box::new(HeuristicTokenCounter),
    };
    let provider = OpenAiChat::from_config(&config)?;

    Ok(DigestSession::new(
        &root,
        config,
        Box::new(GitCli::new(&root)),
        Box::new(provider),
        counter,
    ))
}

pub fn run_repo(path: Option<&str>) -> Result<()> {
    let session = open_session(path)?;
    let summary =
        session.summarize_repository(&mut ConsoleProgress::new(), &CancelToken::new())?;
    println!("{}", summary);
    Ok(())
}

pub fn run_user(name: &str, path: Option<&str>) -> Result<()> {
    let session = open_session(path)?;
    let summary = session.summarize_user(name, &mut ConsoleProgress::new(), &CancelToken::new())?;
    println!("{}", summary);
    Ok(())
}

pub fn run_report(name: &str, path: Option<&str>) -> Result<()> {
    let session = open_session(path)?;
    let report =
        session.write_daily_report(name, &mut ConsoleProgress::new(), &CancelToken::new())?;
    println!("{}", report);
    Ok(())
}

pub fn run_check(name: &str, path: Option<&str>) -> Result<()> {
    let session = open_session(path)?;
    let leaks = session.check_commits(name)?;
    if leaks.is_empty() {
        println!("All of {}'s commit messages look informative.", name);
    } else {
        println!("Commits with messages too short to convey intent:");
        for hash in leaks {
            println!("  {}", hash);
        }
        println!("Run `gitdigest backfill {}` to rewrite them from diffs.", name);
    }
    Ok(())
}

pub fn run_backfill(name: &str, hash: Option<&str>, path: Option<&str>) -> Result<()> {
    let session = open_session(path)?;
    match hash {
        Some(hash) => {
            let message = session.rewrite_commit_message(
                name,
                hash,
                &mut ConsoleProgress::new(),
                &CancelToken::new(),
            )?;
            println!("{}  {}", hash, message);
        }
        None => {
            let rewritten =
                session.backfill_user(name, &mut ConsoleProgress::new(), &CancelToken::new())?;
            if rewritten.is_empty() {
                println!("Nothing to backfill for {}.", name);
            }
            for (hash, message) in rewritten {
                println!("{}  {}", hash, message);
            }
        }
    }
    Ok(())
}

pub fn run_contributors(path: Option<&str>) -> Result<()> {
    let session = open_session(path)?;
    let (mut contributors, fresh) = session.aggregate()?;
    tracing::debug!(fresh, "Contributor listing");
    contributors.sort_by(|a, b| b.commits.cmp(&a.commits));
    for c in contributors {
        println!(
            "{} <{}>: {} commits, +{} -{}",
            c.name, c.email, c.commits, c.additions, c.deletions
        );
    }
    Ok(())
}
