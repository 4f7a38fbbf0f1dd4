//! Enrichment orchestrator: the state machine that takes a profile from
//! trigger to enriched (or failed) exactly once per attempt.
//!
//! Every invocation is stateless; eligibility is re-derived from the
//! profile row on each call. The `processing` status, written before the
//! outbound provider call and checked at entry, is the single-flight
//! guard. It is advisory: two triggers that read the row before either
//! writes `processing` can both pass, so the guarantee is best-effort,
//! exact for sequential or well-separated calls.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use prospect_core::{
    extract_fields, parse_source_url, truncate_chars, EnrichOptions, EnrichedStatus,
    EnrichmentBrief, EnrichmentJob, FRESHNESS_WINDOW_HOURS, RESPONSE_EXCERPT_MAX_CHARS,
};
use prospect_provider::{EnrichmentProvider, ProviderError};
use prospect_store::{JobCompletion, JobStore, ProfilePatch, ProfileStore, StoreError};
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "prospect-engine";

const DRY_RUN_MESSAGE: &str = "dry run completed - no actual enrichment performed";
const DRY_RUN_EXCERPT: &str = r#"{"dry_run":true}"#;

/// Precondition failures surfaced before any state transition happens.
/// None of these leave side effects behind.
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("profile {0} not found")]
    NotFound(Uuid),
    #[error("{0}")]
    InvalidInput(String),
    #[error("profile is already being processed")]
    Conflict,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of one orchestrator invocation that got past the preconditions.
#[derive(Debug, Clone, PartialEq)]
pub enum EnrichOutcome {
    /// Freshness window suppressed the trigger; nothing was written.
    NotModified {
        message: String,
        enriched_at: DateTime<Utc>,
    },
    /// Dry run exercised the transitions without calling the provider.
    DryRun { profile_id: Uuid, message: String },
    Enriched {
        profile_id: Uuid,
        brief: EnrichmentBrief,
        enriched_at: DateTime<Utc>,
        processing_time_ms: u64,
    },
    /// The attempt failed after the profile was marked `processing`; the
    /// profile has been moved to `failed` and the job completed.
    Failed {
        profile_id: Uuid,
        error: String,
        upstream: bool,
    },
}

/// Anything that goes wrong inside the guarded section. Converted into a
/// `failed` profile write plus a `Failed` outcome, never propagated raw.
#[derive(Debug)]
enum RunFailure {
    Provider(ProviderError),
    Store(StoreError),
}

impl RunFailure {
    fn is_upstream(&self) -> bool {
        matches!(self, Self::Provider(err) if err.is_upstream())
    }

    fn message(&self) -> String {
        match self {
            Self::Provider(err) => err.to_string(),
            Self::Store(err) => format!("failed to record enrichment result: {err}"),
        }
    }
}

pub struct EnrichmentEngine {
    profiles: Arc<dyn ProfileStore>,
    jobs: Arc<dyn JobStore>,
    provider: Arc<dyn EnrichmentProvider>,
}

impl EnrichmentEngine {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        jobs: Arc<dyn JobStore>,
        provider: Arc<dyn EnrichmentProvider>,
    ) -> Self {
        Self {
            profiles,
            jobs,
            provider,
        }
    }

    /// Runs one enrichment attempt for `profile_id`.
    pub async fn enrich(
        &self,
        profile_id: Uuid,
        options: EnrichOptions,
    ) -> Result<EnrichOutcome, EnrichError> {
        let profile = self
            .profiles
            .get(profile_id)
            .await?
            .ok_or(EnrichError::NotFound(profile_id))?;

        if parse_source_url(&profile.linkedin_url).is_none() {
            return Err(EnrichError::InvalidInput(
                "profile has no well-formed LinkedIn URL".to_string(),
            ));
        }

        if profile.enriched_status == EnrichedStatus::Processing {
            return Err(EnrichError::Conflict);
        }

        if profile.enriched_status == EnrichedStatus::Success && !options.force {
            if let Some(enriched_at) = profile.enriched_at {
                let age = Utc::now().signed_duration_since(enriched_at);
                if age < Duration::hours(FRESHNESS_WINDOW_HOURS) {
                    return Ok(EnrichOutcome::NotModified {
                        message: "profile was recently enriched; use force=true to override"
                            .to_string(),
                        enriched_at,
                    });
                }
            }
        }

        let provider_name = self.provider.provider_name().to_string();
        let request_summary = json!({
            "linkedin_url": &profile.linkedin_url,
            "options": &options,
        })
        .to_string();

        // Job bookkeeping is best-effort audit; a failed insert is logged
        // and the attempt proceeds without it.
        let job_id = match self
            .jobs
            .insert(EnrichmentJob::running(
                profile_id,
                provider_name.clone(),
                request_summary,
            ))
            .await
        {
            Ok(job) => Some(job.id),
            Err(err) => {
                warn!(%profile_id, error = %err, "failed to create enrichment job");
                None
            }
        };

        // Ordering invariant: the profile must read `processing` before the
        // outbound call is made, so a concurrent trigger is rejected at
        // entry instead of doubling the provider call. If the mark itself
        // fails the attempt is over; the job must still reach a terminal
        // state, or a retry would stack a second `running` job.
        if let Err(err) = self
            .profiles
            .update(
                profile_id,
                ProfilePatch {
                    enriched_status: Some(EnrichedStatus::Processing),
                    enriched_provider: Some(provider_name.clone()),
                    ..ProfilePatch::default()
                },
            )
            .await
        {
            let error = format!("failed to mark profile as processing: {err}");
            warn!(%profile_id, %error, "enrichment attempt aborted");
            self.complete_job(profile_id, job_id, JobCompletion::failed(&error))
                .await;
            return Err(err.into());
        }

        match self.run_guarded(profile_id, &provider_name, &profile.linkedin_url, &options, job_id).await
        {
            Ok(outcome) => Ok(outcome),
            Err(failure) => {
                let error = failure.message();
                warn!(%profile_id, %error, "enrichment attempt failed");
                self.finalize_failure(profile_id, job_id, &error).await;
                Ok(EnrichOutcome::Failed {
                    profile_id,
                    error,
                    upstream: failure.is_upstream(),
                })
            }
        }
    }

    /// Everything between the `processing` mark and the terminal write.
    /// Errors here are converted by the caller, never propagated.
    async fn run_guarded(
        &self,
        profile_id: Uuid,
        provider_name: &str,
        linkedin_url: &str,
        options: &EnrichOptions,
        job_id: Option<Uuid>,
    ) -> Result<EnrichOutcome, RunFailure> {
        if options.dry_run {
            // Dry runs intentionally do not claim success on the profile.
            self.profiles
                .update(profile_id, ProfilePatch::status(EnrichedStatus::Never))
                .await
                .map_err(RunFailure::Store)?;
            self.complete_job(
                profile_id,
                job_id,
                JobCompletion::success(Some(DRY_RUN_EXCERPT.to_string())),
            )
            .await;
            return Ok(EnrichOutcome::DryRun {
                profile_id,
                message: DRY_RUN_MESSAGE.to_string(),
            });
        }

        let started = Instant::now();
        let raw = self
            .provider
            .trigger(linkedin_url, &options.provider_options)
            .await
            .map_err(RunFailure::Provider)?;
        let processing_time_ms = started.elapsed().as_millis() as u64;

        let fields = extract_fields(&raw);
        let brief = fields.brief();
        let enriched_at = Utc::now();

        // The raw payload is persisted verbatim; the normalized projection
        // only feeds the brief and the bounded job excerpt.
        self.profiles
            .update(
                profile_id,
                ProfilePatch {
                    enriched_status: Some(EnrichedStatus::Success),
                    enriched_provider: Some(provider_name.to_string()),
                    enriched_data: Some(raw),
                    enriched_at: Some(enriched_at),
                },
            )
            .await
            .map_err(RunFailure::Store)?;

        let excerpt = serde_json::to_string(&fields)
            .map(|text| truncate_chars(&text, RESPONSE_EXCERPT_MAX_CHARS))
            .ok();
        self.complete_job(profile_id, job_id, JobCompletion::success(excerpt))
            .await;

        info!(
            %profile_id,
            experience = brief.experience_count,
            education = brief.education_count,
            skills = brief.skills_count,
            processing_time_ms,
            "profile enriched"
        );

        Ok(EnrichOutcome::Enriched {
            profile_id,
            brief,
            enriched_at,
            processing_time_ms,
        })
    }

    /// The profile must never stay in `processing`: move it to `failed`
    /// and complete the job, logging (not propagating) secondary errors.
    async fn finalize_failure(&self, profile_id: Uuid, job_id: Option<Uuid>, error: &str) {
        if let Err(err) = self
            .profiles
            .update(profile_id, ProfilePatch::status(EnrichedStatus::Failed))
            .await
        {
            warn!(%profile_id, error = %err, "failed to mark profile as failed");
        }
        self.complete_job(profile_id, job_id, JobCompletion::failed(error))
            .await;
    }

    async fn complete_job(&self, profile_id: Uuid, job_id: Option<Uuid>, completion: JobCompletion) {
        let Some(job_id) = job_id else { return };
        if let Err(err) = self.jobs.complete(job_id, completion).await {
            warn!(%profile_id, %job_id, error = %err, "failed to complete enrichment job");
        }
    }
}
