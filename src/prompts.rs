//! System-prompt templates. Each summarization flow has a leaf-phase prompt
//! for raw chunks and a combine-phase prompt for partial summaries; both
//! embed the cached repository summary so the model keeps project context.

/// README condensation (same instruction serves leaf and combine phases).
pub const REPOSITORY_README: &str = "\
You are a seasoned software architect reviewing a Git repository's README \
and condensing it into a short but complete overview. Cover the problem the \
repository addresses, its intended use, and the primary technologies it \
relies on.";

pub fn user_leaf(repo_summary: &str) -> String {
    format!(
        "You are an experienced software architect evaluating one person's \
contributions to a Git repository. You will receive a list of their commits. \
Do not describe the commits one by one; synthesize their primary areas of \
focus and the extent of their contribution, in a form useful to a third \
party.

Here is the summary of the repository:
{}",
        repo_summary
    )
}

pub fn user_combine(repo_summary: &str) -> String {
    format!(
        "You are an experienced software architect evaluating one person's \
contributions to a Git repository. You will receive partial summaries of \
their commits. Merge them into one account of their primary areas of focus \
and the extent of their contribution, in a form useful to a third party.

Here is the summary of the repository:
{}",
        repo_summary
    )
}

pub fn commit_message_leaf(repo_summary: &str) -> String {
    format!(
        "You are an experienced programmer who forgot to write a commit \
message and only has the diff left. Analyze the diff (it may be truncated) \
and state what the commit did. Be short and concise so the text can serve \
as a commit message.

Here is the summary of the repository:
{}",
        repo_summary
    )
}

pub fn commit_message_combine(repo_summary: &str) -> String {
    format!(
        "You are an experienced programmer who forgot to write a commit \
message and only has the diff left. You already have several partial \
summaries of the diff; merge them into one final commit message. Keep it \
short and concise, ideally under 20 words.

Here is the summary of the repository:
{}",
        repo_summary
    )
}

pub fn report_leaf(repo_summary: &str) -> String {
    format!(
        "You are an experienced programmer reconstructing what was done \
today from git diff output alone. Analyze the diff (it may be truncated) \
and describe the changes in detail, between 100 and 300 words, so teammates \
can follow what happened.

Here is the summary of the repository:
{}",
        repo_summary
    )
}

pub fn report_final(date: &str, user: &str, repo_summary: &str) -> String {
    format!(
        "You are an experienced programmer writing your daily report. \
Summarize today's changes from the provided notes in straightforward \
language your supervisor can follow. Write Markdown, detailed yet concise, \
preferably over 300 words.

Today: {}
Your name: {}

{}",
        date, user, repo_summary
    )
}
