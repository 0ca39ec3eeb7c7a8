use chrono::{DateTime, Utc};
use facefind_core::Source;
use serde::Serialize;
use uuid::Uuid;

/// How one source's contribution to a search ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum SourceStatus {
    Completed,
    /// The adapter returned an error or panicked.
    Failed(String),
    /// The per-source timeout or the search deadline elapsed first.
    TimedOut,
    Cancelled,
    /// No adapter could be instantiated for the configured platform.
    Unavailable(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: Source,
    pub status: SourceStatus,
    pub result_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

/// Merged results of one search plus per-source outcomes.
#[derive(Debug, Clone, Serialize)]
pub struct SearchReport<T> {
    pub search_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub results: Vec<T>,
    pub sources: Vec<SourceReport>,
    /// For image searches: whether the query image had a detectable face.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_face_detected: Option<bool>,
}

impl<T> SearchReport<T> {
    /// `true` when at least one source was queried and none completed.
    ///
    /// Separates "every source failed" from "no matches".
    pub fn all_sources_failed(&self) -> bool {
        !self.sources.is_empty()
            && self
                .sources
                .iter()
                .all(|s| s.status != SourceStatus::Completed)
    }

    pub fn completed_sources(&self) -> usize {
        self.sources
            .iter()
            .filter(|s| s.status == SourceStatus::Completed)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(statuses: Vec<SourceStatus>) -> SearchReport<()> {
        SearchReport {
            search_id: Uuid::new_v4(),
            started_at: Utc::now(),
            results: Vec::new(),
            sources: statuses
                .into_iter()
                .map(|status| SourceReport {
                    source: Source::Google,
                    status,
                    result_count: 0,
                    elapsed_ms: None,
                })
                .collect(),
            query_face_detected: None,
        }
    }

    #[test]
    fn test_all_sources_failed() {
        assert!(!report(vec![]).all_sources_failed());
        assert!(report(vec![SourceStatus::TimedOut, SourceStatus::Failed("x".into())])
            .all_sources_failed());
        let mixed = report(vec![SourceStatus::TimedOut, SourceStatus::Completed]);
        assert!(!mixed.all_sources_failed());
        assert_eq!(mixed.completed_sources(), 1);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_value(SourceStatus::Failed("blocked".into())).unwrap();
        assert_eq!(json, serde_json::json!({ "state": "failed", "reason": "blocked" }));
        let json = serde_json::to_value(SourceStatus::TimedOut).unwrap();
        assert_eq!(json, serde_json::json!({ "state": "timed_out" }));
    }
}
