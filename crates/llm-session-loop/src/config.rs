use serde::{Deserialize, Serialize};

pub const DEFAULT_END_MARKER: &str = "<eop>";
pub const DEFAULT_MAX_NEW_TOKENS: i64 = 512;

/// Configuration for one generation pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GenerationConfig {
    /// Ceiling on generated tokens and on decode steps per submission.
    pub max_new_tokens: i64,
    /// In-band marker the engine writes when its turn is over.
    pub end_marker: String,
    pub format_version: u32,
    /// Log progress every this many decode steps.
    pub log_interval: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            end_marker: DEFAULT_END_MARKER.to_string(),
            format_version: 1,
            log_interval: 10,
        }
    }
}
