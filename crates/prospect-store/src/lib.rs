//! Row-store contracts for profiles and enrichment jobs, plus an
//! in-memory implementation.
//!
//! The engine coordinates purely through these seams; swapping in a real
//! database means implementing the two traits, nothing more.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prospect_core::{EnrichedStatus, EnrichmentJob, JobStatus, Profile};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

pub const CRATE_NAME: &str = "prospect-store";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("profile {0} not found")]
    ProfileNotFound(Uuid),
    #[error("job {0} not found")]
    JobNotFound(Uuid),
    #[error("job {0} already completed")]
    JobAlreadyCompleted(Uuid),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Partial update applied to a profile row; absent fields keep their value.
#[derive(Debug, Clone, Default)]
pub struct ProfilePatch {
    pub enriched_status: Option<EnrichedStatus>,
    pub enriched_provider: Option<String>,
    pub enriched_data: Option<JsonValue>,
    pub enriched_at: Option<DateTime<Utc>>,
}

impl ProfilePatch {
    pub fn status(status: EnrichedStatus) -> Self {
        Self {
            enriched_status: Some(status),
            ..Self::default()
        }
    }
}

/// Terminal state written to a job exactly once.
#[derive(Debug, Clone)]
pub struct JobCompletion {
    pub status: JobStatus,
    pub finished_at: DateTime<Utc>,
    pub response_payload_excerpt: Option<String>,
    pub error_message: Option<String>,
}

impl JobCompletion {
    pub fn success(excerpt: Option<String>) -> Self {
        Self {
            status: JobStatus::Success,
            finished_at: Utc::now(),
            response_payload_excerpt: excerpt,
            error_message: None,
        }
    }

    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            finished_at: Utc::now(),
            response_payload_excerpt: None,
            error_message: Some(error_message.into()),
        }
    }
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Profile>, StoreError>;

    /// All profiles, newest first.
    async fn list(&self) -> Result<Vec<Profile>, StoreError>;

    async fn insert(&self, profile: Profile) -> Result<Profile, StoreError>;

    /// Applies a partial update and bumps `updated_at`.
    async fn update(&self, id: Uuid, patch: ProfilePatch) -> Result<Profile, StoreError>;
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: EnrichmentJob) -> Result<EnrichmentJob, StoreError>;

    /// Writes the terminal state of a job. Completed jobs are immutable.
    async fn complete(&self, id: Uuid, completion: JobCompletion) -> Result<(), StoreError>;

    /// Jobs newest first, optionally narrowed to one profile.
    async fn list(&self, profile_id: Option<Uuid>) -> Result<Vec<EnrichmentJob>, StoreError>;
}

/// HashMap-backed store used by the service binary and by tests.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    profiles: RwLock<HashMap<Uuid, Profile>>,
    jobs: RwLock<HashMap<Uuid, EnrichmentJob>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for InMemoryStore {
    async fn get(&self, id: Uuid) -> Result<Option<Profile>, StoreError> {
        Ok(self.profiles.read().await.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Profile>, StoreError> {
        let mut rows: Vec<Profile> = self.profiles.read().await.values().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn insert(&self, profile: Profile) -> Result<Profile, StoreError> {
        let mut rows = self.profiles.write().await;
        rows.insert(profile.id, profile.clone());
        Ok(profile)
    }

    async fn update(&self, id: Uuid, patch: ProfilePatch) -> Result<Profile, StoreError> {
        let mut rows = self.profiles.write().await;
        let profile = rows.get_mut(&id).ok_or(StoreError::ProfileNotFound(id))?;
        if let Some(status) = patch.enriched_status {
            profile.enriched_status = status;
        }
        if let Some(provider) = patch.enriched_provider {
            profile.enriched_provider = Some(provider);
        }
        if let Some(data) = patch.enriched_data {
            profile.enriched_data = Some(data);
        }
        if let Some(enriched_at) = patch.enriched_at {
            profile.enriched_at = Some(enriched_at);
        }
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }
}

#[async_trait]
impl JobStore for InMemoryStore {
    async fn insert(&self, job: EnrichmentJob) -> Result<EnrichmentJob, StoreError> {
        let mut rows = self.jobs.write().await;
        rows.insert(job.id, job.clone());
        Ok(job)
    }

    async fn complete(&self, id: Uuid, completion: JobCompletion) -> Result<(), StoreError> {
        let mut rows = self.jobs.write().await;
        let job = rows.get_mut(&id).ok_or(StoreError::JobNotFound(id))?;
        if matches!(job.status, JobStatus::Success | JobStatus::Failed) {
            return Err(StoreError::JobAlreadyCompleted(id));
        }
        job.status = completion.status;
        job.finished_at = Some(completion.finished_at);
        job.response_payload_excerpt = completion.response_payload_excerpt;
        job.error_message = completion.error_message;
        Ok(())
    }

    async fn list(&self, profile_id: Option<Uuid>) -> Result<Vec<EnrichmentJob>, StoreError> {
        let mut rows: Vec<EnrichmentJob> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| profile_id.is_none_or(|wanted| job.profile_id == wanted))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }
}
