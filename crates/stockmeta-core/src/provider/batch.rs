//! Batch job snapshots and result correlation.
//!
//! Cloud batch jobs are polled; local and neural batches are executed eagerly
//! and come back already `Completed`. Both shapes share [`BatchJob`].

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::ProviderError;
use crate::message::{AiResponse, Message};

/// Lifecycle state of a batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Queued,
    InProgress,
    /// The backend finished processing (its "ended" or "completed").
    Completed,
    Failed,
    Cancelled,
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Result for one prompt in a batch. Failed items carry an error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub custom_id: String,
    pub response: AiResponse,
}

impl BatchResult {
    pub fn is_error(&self) -> bool {
        self.response.is_error()
    }
}

/// Snapshot of a batch job at the time it was fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    pub job_id: String,
    pub status: BatchStatus,
    pub results: Vec<BatchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl BatchJob {
    pub fn new(job_id: impl Into<String>, status: BatchStatus) -> Self {
        Self {
            job_id: job_id.into(),
            status,
            results: Vec::new(),
            created_at: None,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn result_for(&self, custom_id: &str) -> Option<&AiResponse> {
        self.results
            .iter()
            .find(|r| r.custom_id == custom_id)
            .map(|r| &r.response)
    }
}

/// Check the `len(messages_list) == len(custom_ids)` precondition.
pub fn validate_batch_input(
    messages_list: &[Vec<Message>],
    custom_ids: &[String],
) -> Result<(), ProviderError> {
    if messages_list.len() != custom_ids.len() {
        return Err(ProviderError::InvalidArgument(format!(
            "batch has {} prompts but {} custom ids",
            messages_list.len(),
            custom_ids.len()
        )));
    }
    if messages_list.is_empty() {
        return Err(ProviderError::InvalidArgument(
            "batch must contain at least one prompt".to_string(),
        ));
    }
    Ok(())
}

/// Order backend result items by `custom_ids`.
///
/// Ids the backend did not report become error results. Items whose id is not
/// in `custom_ids` are appended in backend order.
pub fn correlate_results(
    model: &str,
    custom_ids: &[String],
    items: Vec<(String, AiResponse)>,
) -> Vec<BatchResult> {
    let mut by_id: HashMap<String, AiResponse> = HashMap::with_capacity(items.len());
    let mut extra_order = Vec::new();
    for (id, response) in items {
        if !custom_ids.contains(&id) {
            extra_order.push(id.clone());
        }
        by_id.insert(id, response);
    }

    let mut results: Vec<BatchResult> = custom_ids
        .iter()
        .map(|id| BatchResult {
            custom_id: id.clone(),
            response: by_id
                .remove(id)
                .unwrap_or_else(|| AiResponse::error(model, "no result returned for this item")),
        })
        .collect();

    for id in extra_order {
        if let Some(response) = by_id.remove(&id) {
            results.push(BatchResult {
                custom_id: id,
                response,
            });
        }
    }
    results
}

/// Identifier for an eagerly executed local batch.
pub(crate) fn local_job_id() -> String {
    let suffix: u64 = rand::thread_rng().gen();
    format!("local-batch-{suffix:016x}")
}

#[derive(Debug, Default)]
struct RegistryEntry {
    custom_ids: Vec<String>,
    cancel_requested: bool,
}

/// Remembers the correlation list and cancel state of submitted jobs.
#[derive(Debug, Default)]
pub struct BatchRegistry {
    entries: Mutex<HashMap<String, RegistryEntry>>,
}

impl BatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, job_id: &str, custom_ids: &[String]) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                job_id.to_string(),
                RegistryEntry {
                    custom_ids: custom_ids.to_vec(),
                    cancel_requested: false,
                },
            );
        }
    }

    /// Correlation list for a job, empty when the job was created elsewhere.
    pub fn custom_ids(&self, job_id: &str) -> Vec<String> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(job_id).map(|e| e.custom_ids.clone()))
            .unwrap_or_default()
    }

    pub fn cancel_requested(&self, job_id: &str) -> bool {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(job_id).map(|e| e.cancel_requested))
            .unwrap_or(false)
    }

    pub fn mark_cancel_requested(&self, job_id: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.entry(job_id.to_string()).or_default().cancel_requested = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_validate_batch_input_length_mismatch() {
        let err = validate_batch_input(&[vec![Message::user("a")]], &ids(&["1", "2"])).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidArgument(_)));
    }

    #[test]
    fn test_correlate_follows_custom_id_order() {
        let items = vec![
            ("id2".to_string(), AiResponse::new("second", "m")),
            ("id1".to_string(), AiResponse::new("first", "m")),
        ];
        let results = correlate_results("m", &ids(&["id1", "id2"]), items);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].custom_id, "id1");
        assert_eq!(results[0].response.content, "first");
        assert_eq!(results[1].custom_id, "id2");
    }

    #[test]
    fn test_correlate_missing_item_becomes_error() {
        let items = vec![("id1".to_string(), AiResponse::new("first", "m"))];
        let results = correlate_results("m", &ids(&["id1", "id2"]), items);
        assert!(!results[0].is_error());
        assert!(results[1].is_error());
    }

    #[test]
    fn test_correlate_without_ids_keeps_backend_order() {
        let items = vec![
            ("b".to_string(), AiResponse::new("1", "m")),
            ("a".to_string(), AiResponse::new("2", "m")),
        ];
        let results = correlate_results("m", &[], items);
        assert_eq!(results[0].custom_id, "b");
        assert_eq!(results[1].custom_id, "a");
    }

    #[test]
    fn test_registry_tracks_cancel() {
        let registry = BatchRegistry::new();
        registry.register("job", &ids(&["x"]));
        assert_eq!(registry.custom_ids("job"), ids(&["x"]));
        assert!(!registry.cancel_requested("job"));
        registry.mark_cancel_requested("job");
        assert!(registry.cancel_requested("job"));
        assert!(registry.custom_ids("unknown").is_empty());
    }

    #[test]
    fn test_terminal_states() {
        assert!(BatchStatus::Completed.is_terminal());
        assert!(BatchStatus::Cancelled.is_terminal());
        assert!(!BatchStatus::InProgress.is_terminal());
        assert!(local_job_id().starts_with("local-batch-"));
    }
}
