use serde::{Deserialize, Serialize};

/// Counters reported by the engine for the current submission.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerationState {
    pub prompt_len: i64,
    pub gen_seq_len: i64,
    pub vision_us: i64,
    pub audio_us: i64,
    pub prefill_us: i64,
    pub decode_us: i64,
}
