mod cli;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "gitdigest", version, about = "LLM-backed summaries of git history")]
struct App {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize the repository
    Repo {
        /// Repository path (defaults to current directory)
        path: Option<String>,
    },
    /// Summarize one contributor's work
    User {
        name: String,
        #[arg(long)]
        path: Option<String>,
    },
    /// Write today's report for a contributor
    Report {
        name: String,
        #[arg(long)]
        path: Option<String>,
    },
    /// List commits whose messages are too short to convey intent
    Check {
        name: String,
        #[arg(long)]
        path: Option<String>,
    },
    /// Rewrite flagged commit messages from their diffs
    Backfill {
        name: String,
        /// Rewrite only this commit instead of every flagged one
        #[arg(long)]
        hash: Option<String>,
        #[arg(long)]
        path: Option<String>,
    },
    /// List contributors with their aggregate stats
    Contributors {
        path: Option<String>,
    },
}

fn main() {
    let app = App::parse();

    let result = match app.command {
        Commands::Repo { path } => cli::run_repo(path.as_deref()),
        Commands::User { name, path } => cli::run_user(&name, path.as_deref()),
        Commands::Report { name, path } => cli::run_report(&name, path.as_deref()),
        Commands::Check { name, path } => cli::run_check(&name, path.as_deref()),
        Commands::Backfill { name, hash, path } => {
            cli::run_backfill(&name, hash.as_deref(), path.as_deref())
        }
        Commands::Contributors { path } => cli::run_contributors(path.as_deref()),
    };

    result.unwrap_or_else(|e| eprintln!("Error: {:#}", e));
}
