use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use llm_session_engine::GenerationState;
use llm_session_loop::StopReason;

/// Final counters of one text submission. Times are microseconds.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerationMetrics {
    pub prompt_len: i64,
    pub decode_len: i64,
    pub vision_time: i64,
    pub audio_time: i64,
    pub prefill_time: i64,
    pub decode_time: i64,
}

impl GenerationMetrics {
    /// Prompt tokens per second during prefill, if prefill took any time.
    pub fn prefill_speed(&self) -> Option<f64> {
        tokens_per_second(self.prompt_len, self.prefill_time)
    }

    /// Generated tokens per second during decode, if decode took any time.
    pub fn decode_speed(&self) -> Option<f64> {
        tokens_per_second(self.decode_len, self.decode_time)
    }

    /// Flat map keyed the way host bindings expect.
    pub fn to_map(&self) -> BTreeMap<&'static str, i64> {
        BTreeMap::from([
            ("prompt_len", self.prompt_len),
            ("decode_len", self.decode_len),
            ("vision_time", self.vision_time),
            ("audio_time", self.audio_time),
            ("prefill_time", self.prefill_time),
            ("decode_time", self.decode_time),
        ])
    }

    pub fn log(&self, session_id: &str) {
        log::debug!("[{}] Model performance metrics:", session_id);
        log::debug!("[{}] - Prompt length: {} tokens", session_id, self.prompt_len);
        log::debug!("[{}] - Generated length: {} tokens", session_id, self.decode_len);
        log::debug!("[{}] - Vision processing time: {} us", session_id, self.vision_time);
        log::debug!("[{}] - Audio processing time: {} us", session_id, self.audio_time);
        log::debug!("[{}] - Prefill time: {} us", session_id, self.prefill_time);
        log::debug!("[{}] - Decode time: {} us", session_id, self.decode_time);
    }
}

impl From<GenerationState> for GenerationMetrics {
    fn from(state: GenerationState) -> Self {
        Self {
            prompt_len: state.prompt_len,
            decode_len: state.gen_seq_len,
            vision_time: state.vision_us,
            audio_time: state.audio_us,
            prefill_time: state.prefill_us,
            decode_time: state.decode_us,
        }
    }
}

fn tokens_per_second(tokens: i64, micros: i64) -> Option<f64> {
    if micros <= 0 {
        return None;
    }
    Some(tokens as f64 * 1_000_000.0 / micros as f64)
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageMetrics {
    pub total_timeus: i64,
}

impl ImageMetrics {
    pub fn to_map(&self) -> BTreeMap<&'static str, i64> {
        BTreeMap::from([("total_timeus", self.total_timeus)])
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Completed,
    Cancelled,
    TokenLimit,
    Error,
}

impl SubmissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::TokenLimit => "token_limit",
            Self::Error => "error",
        }
    }
}

impl From<StopReason> for SubmissionStatus {
    fn from(reason: StopReason) -> Self {
        match reason {
            StopReason::EndMarker => Self::Completed,
            StopReason::Cancelled => Self::Cancelled,
            StopReason::TokenLimit => Self::TokenLimit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmissionRecord {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub status: SubmissionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<GenerationMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_map_engine_counters() {
        let metrics = GenerationMetrics::from(GenerationState {
            prompt_len: 10,
            gen_seq_len: 20,
            vision_us: 1,
            audio_us: 2,
            prefill_us: 500_000,
            decode_us: 2_000_000,
        });

        assert_eq!(metrics.decode_len, 20);
        assert_eq!(metrics.prefill_speed(), Some(20.0));
        assert_eq!(metrics.decode_speed(), Some(10.0));
        assert_eq!(metrics.to_map()["audio_time"], 2);
    }

    #[test]
    fn speeds_are_absent_without_elapsed_time() {
        let metrics = GenerationMetrics::default();
        assert_eq!(metrics.prefill_speed(), None);
        assert_eq!(metrics.decode_speed(), None);
    }

    #[test]
    fn metrics_serialize_with_host_keys() {
        let value = serde_json::to_value(GenerationMetrics::default()).unwrap();
        for key in [
            "prompt_len",
            "decode_len",
            "vision_time",
            "audio_time",
            "prefill_time",
            "decode_time",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        let image = serde_json::to_value(ImageMetrics { total_timeus: 7 }).unwrap();
        assert_eq!(image["total_timeus"], 7);
    }

    #[test]
    fn stop_reasons_map_to_statuses() {
        assert_eq!(
            SubmissionStatus::from(StopReason::EndMarker),
            SubmissionStatus::Completed
        );
        assert_eq!(SubmissionStatus::from(StopReason::TokenLimit).as_str(), "token_limit");
    }
}
