use thiserror::Error;

#[derive(Error, Debug)]
pub enum DigestError {
    /// Structural problem in the caller's data (empty unit list, unknown user).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A single unit cannot fit under the token ceiling even alone.
    #[error("Size exceeded: unit costs {cost} tokens with preamble, ceiling is {ceiling}")]
    SizeExceeded { cost: usize, ceiling: usize },

    /// A reduction pass failed to shrink the unit count.
    #[error("Reduction cannot make progress: {units} units still yield {groups} groups")]
    NonProgress { units: usize, groups: usize },

    /// LLM call failed: network error, non-2xx status, or malformed body.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Persistent store unreadable/unwritable.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Single-flight rejection: the same operation kind is already in flight.
    #[error("Already in progress: {0}")]
    AlreadyInProgress(String),

    /// Operation aborted through its cancellation token.
    #[error("Cancelled")]
    Cancelled,

    /// Version-control backend failure (git unavailable, bad exit status).
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Date parse errors from chrono
    #[error("Date parse error: {0}")]
    DateParse(#[from] chrono::ParseError),
}

pub type DigestResult<T> = Result<T, DigestError>;
