// === Token Budget ===
pub const DEFAULT_TOKEN_CEILING: usize = 16_000;
/// Chat-format overhead billed per message (role framing).
pub const TOKENS_PER_MESSAGE: usize = 4;
/// Tokens reserved for the assistant reply primer.
pub const TOKENS_REPLY_PRIMER: usize = 3;
/// Chars-per-token ratio for the heuristic counter (overestimates slightly).
pub const HEURISTIC_CHARS_PER_TOKEN: f32 = 3.5;

// === Reduction ===
/// Hard cap on reduce passes; reachable only if the non-progress guard is evaded.
pub const MAX_REDUCE_PASSES: usize = 32;

// === Provider ===
pub const PROVIDER_TIMEOUT_SECS: u64 = 60;
/// 0 = no retry, 1 = one retry on timeout/transport failure.
pub const PROVIDER_MAX_RETRIES: u32 = 1;
pub const DEFAULT_COMPLETION_TOKENS: u32 = 512;
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

// === Leak Detection ===
/// Commit messages splitting into fewer fragments than this are "leaks".
pub const LEAK_MIN_TOKENS: usize = 2;

// === Store ===
/// Directory created inside the analyzed repository.
pub const STORE_DIR: &str = ".gitdigest";
pub const RECORD_FILE: &str = "digest.json";
pub const CONFIG_FILE: &str = "config.json";
pub const MARKDOWN_FILE: &str = "DIGEST.md";
pub const REPORTS_DIR: &str = "reports";
