use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::aggregator::{aggregate, MetricsSummary};
use crate::types::{GenerationMetrics, SubmissionRecord, SubmissionStatus};

const DEFAULT_RETENTION: usize = 1024;

/// In-memory record of recent submissions, shared between sessions.
///
/// Oldest records are dropped once `retention` is exceeded.
#[derive(Clone)]
pub struct MetricsCollector {
    records: Arc<Mutex<VecDeque<SubmissionRecord>>>,
    retention: usize,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

impl MetricsCollector {
    pub fn new(retention: usize) -> Self {
        Self {
            records: Arc::new(Mutex::new(VecDeque::new())),
            retention: retention.max(1),
        }
    }

    pub fn submission_completed(
        &self,
        session_id: impl Into<String>,
        started_at: DateTime<Utc>,
        status: SubmissionStatus,
        metrics: GenerationMetrics,
    ) {
        self.push(SubmissionRecord {
            session_id: session_id.into(),
            started_at,
            completed_at: Utc::now(),
            status,
            metrics: Some(metrics),
            error: None,
        });
    }

    pub fn submission_failed(
        &self,
        session_id: impl Into<String>,
        started_at: DateTime<Utc>,
        error: impl Into<String>,
    ) {
        self.push(SubmissionRecord {
            session_id: session_id.into(),
            started_at,
            completed_at: Utc::now(),
            status: SubmissionStatus::Error,
            metrics: None,
            error: Some(error.into()),
        });
    }

    pub fn records(&self) -> Vec<SubmissionRecord> {
        match self.records.lock() {
            Ok(records) => records.iter().cloned().collect(),
            Err(error) => {
                log::error!("metrics records lock poisoned: {}", error);
                Vec::new()
            }
        }
    }

    pub fn records_for(&self, session_id: &str) -> Vec<SubmissionRecord> {
        self.records()
            .into_iter()
            .filter(|record| record.session_id == session_id)
            .collect()
    }

    pub fn summary(&self) -> MetricsSummary {
        aggregate(&self.records())
    }

    pub fn summary_for(&self, session_id: &str) -> MetricsSummary {
        aggregate(&self.records_for(session_id))
    }

    fn push(&self, record: SubmissionRecord) {
        let Ok(mut records) = self.records.lock() else {
            log::error!("metrics records lock poisoned, dropping record");
            return;
        };
        records.push_back(record);
        while records.len() > self.retention {
            records.pop_front();
        }
    }
}
