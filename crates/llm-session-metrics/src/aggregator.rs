use serde::{Deserialize, Serialize};

use crate::types::{SubmissionRecord, SubmissionStatus};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricsSummary {
    pub total_submissions: u32,
    pub completed: u32,
    pub cancelled: u32,
    pub token_limited: u32,
    pub errored: u32,
    pub total_prompt_tokens: i64,
    pub total_decode_tokens: i64,
    pub total_prefill_us: i64,
    pub total_decode_us: i64,
}

impl MetricsSummary {
    pub fn average_prefill_speed(&self) -> Option<f64> {
        rate(self.total_prompt_tokens, self.total_prefill_us)
    }

    pub fn average_decode_speed(&self) -> Option<f64> {
        rate(self.total_decode_tokens, self.total_decode_us)
    }
}

fn rate(tokens: i64, micros: i64) -> Option<f64> {
    (micros > 0).then(|| tokens as f64 * 1_000_000.0 / micros as f64)
}

pub fn aggregate(records: &[SubmissionRecord]) -> MetricsSummary {
    let mut summary = MetricsSummary::default();

    for record in records {
        summary.total_submissions += 1;
        match record.status {
            SubmissionStatus::Completed => summary.completed += 1,
            SubmissionStatus::Cancelled => summary.cancelled += 1,
            SubmissionStatus::TokenLimit => summary.token_limited += 1,
            SubmissionStatus::Error => summary.errored += 1,
        }

        if let Some(metrics) = &record.metrics {
            summary.total_prompt_tokens += metrics.prompt_len;
            summary.total_decode_tokens += metrics.decode_len;
            summary.total_prefill_us += metrics.prefill_time;
            summary.total_decode_us += metrics.decode_time;
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::types::GenerationMetrics;

    fn record(status: SubmissionStatus, metrics: Option<GenerationMetrics>) -> SubmissionRecord {
        SubmissionRecord {
            session_id: "s".to_string(),
            started_at: Utc::now(),
            completed_at: Utc::now(),
            status,
            metrics,
            error: None,
        }
    }

    #[test]
    fn aggregate_counts_statuses_and_tokens() {
        let metrics = GenerationMetrics {
            prompt_len: 8,
            decode_len: 4,
            prefill_time: 1_000_000,
            decode_time: 2_000_000,
            ..Default::default()
        };
        let summary = aggregate(&[
            record(SubmissionStatus::Completed, Some(metrics)),
            record(SubmissionStatus::Cancelled, Some(metrics)),
            record(SubmissionStatus::Error, None),
        ]);

        assert_eq!(summary.total_submissions, 3);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.cancelled, 1);
        assert_eq!(summary.errored, 1);
        assert_eq!(summary.total_decode_tokens, 8);
        assert_eq!(summary.average_prefill_speed(), Some(8.0));
        assert_eq!(summary.average_decode_speed(), Some(2.0));
    }

    #[test]
    fn empty_aggregate_has_no_rates() {
        let summary = aggregate(&[]);
        assert_eq!(summary, MetricsSummary::default());
        assert_eq!(summary.average_decode_speed(), None);
    }
}
