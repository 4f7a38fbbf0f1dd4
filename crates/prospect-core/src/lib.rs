//! Core domain model and field normalization for the Prospect enrichment service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use url::Url;
use uuid::Uuid;

pub const CRATE_NAME: &str = "prospect-core";

/// Successful enrichments within this window suppress repeat triggers
/// unless the caller forces a refresh.
pub const FRESHNESS_WINDOW_HOURS: i64 = 24;

/// Upper bound on the serialized normalized-fields excerpt stored on a job.
pub const RESPONSE_EXCERPT_MAX_CHARS: usize = 2000;

/// Enrichment lifecycle of a profile row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EnrichedStatus {
    #[default]
    Never,
    Pending,
    Processing,
    Success,
    Failed,
}

/// Lifecycle of one enrichment attempt's audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Success,
    Failed,
}

/// A tracked person record with a source URL to enrich.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub name: Option<String>,
    pub title: Option<String>,
    pub linkedin_url: String,
    pub enriched_data: Option<JsonValue>,
    pub enriched_provider: Option<String>,
    pub enriched_status: EnrichedStatus,
    pub enriched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(linkedin_url: impl Into<String>, name: Option<String>, title: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            title,
            linkedin_url: linkedin_url.into(),
            enriched_data: None,
            enriched_provider: None,
            enriched_status: EnrichedStatus::Never,
            enriched_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Audit record of one enrichment attempt. Completed exactly once,
/// immutable afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentJob {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub provider: String,
    pub status: JobStatus,
    pub requested_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub request_payload_summary: Option<String>,
    pub response_payload_excerpt: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl EnrichmentJob {
    /// A job that has started running against the provider.
    pub fn running(profile_id: Uuid, provider: impl Into<String>, request_summary: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            profile_id,
            provider: provider.into(),
            status: JobStatus::Running,
            requested_at: now,
            started_at: Some(now),
            finished_at: None,
            request_payload_summary: Some(request_summary),
            response_payload_excerpt: None,
            error_message: None,
            created_at: now,
        }
    }
}

/// Caller-supplied knobs for one enrichment trigger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrichOptions {
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub provider_options: Map<String, JsonValue>,
}

/// Entry counts surfaced in the success response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentBrief {
    pub experience_count: usize,
    pub education_count: usize,
    pub skills_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ExperienceEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EducationEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub school: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degree: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageEntry {
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proficiency: Option<String>,
}

/// Provider-agnostic projection of a person's professional profile.
///
/// Derived from the raw provider payload at read time; every field is
/// optional because the upstream schema is untrusted and drifts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ExtractedFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_position: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experience: Option<Vec<ExperienceEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub education: Option<Vec<EducationEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skills: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub languages: Option<Vec<LanguageEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connections_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

impl ExtractedFields {
    pub fn brief(&self) -> EnrichmentBrief {
        EnrichmentBrief {
            experience_count: self.experience.as_ref().map_or(0, Vec::len),
            education_count: self.education.as_ref().map_or(0, Vec::len),
            skills_count: self.skills.as_ref().map_or(0, Vec::len),
        }
    }
}

/// Parses a source URL, accepting only absolute http(s) URLs.
pub fn parse_source_url(raw: &str) -> Option<Url> {
    Url::parse(raw.trim())
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
}

/// Truncates to at most `max_chars` characters without splitting a char.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn first_string(raw: &JsonValue, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| raw.get(key).and_then(JsonValue::as_str))
        .map(ToString::to_string)
}

fn nested_string(raw: &JsonValue, outer: &str, inner: &str) -> Option<String> {
    raw.get(outer)
        .and_then(|v| v.get(inner))
        .and_then(JsonValue::as_str)
        .map(ToString::to_string)
}

fn string_at(entry: &JsonValue, key: &str) -> Option<String> {
    entry.get(key).and_then(JsonValue::as_str).map(ToString::to_string)
}

fn first_number(raw: &JsonValue, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| raw.get(key).and_then(JsonValue::as_u64))
}

fn experience_entries(raw: &JsonValue) -> Option<Vec<ExperienceEntry>> {
    let entries = raw.get("experience")?.as_array()?;
    Some(
        entries
            .iter()
            .map(|entry| ExperienceEntry {
                title: string_at(entry, "title"),
                company: string_at(entry, "company"),
                start_date: string_at(entry, "start_date"),
                end_date: string_at(entry, "end_date"),
                location: string_at(entry, "location"),
                description: string_at(entry, "description"),
            })
            .collect(),
    )
}

fn education_entries(raw: &JsonValue) -> Option<Vec<EducationEntry>> {
    let entries = raw.get("education")?.as_array()?;
    Some(
        entries
            .iter()
            .map(|entry| EducationEntry {
                school: string_at(entry, "school"),
                degree: string_at(entry, "degree"),
                field: string_at(entry, "field"),
                start_date: string_at(entry, "start_date"),
                end_date: string_at(entry, "end_date"),
            })
            .collect(),
    )
}

fn skill_entries(raw: &JsonValue) -> Option<Vec<String>> {
    let entries = raw.get("skills")?.as_array()?;
    Some(
        entries
            .iter()
            .filter_map(|entry| match entry {
                JsonValue::String(name) => Some(name.clone()),
                other => string_at(other, "name"),
            })
            .collect(),
    )
}

fn language_entries(raw: &JsonValue) -> Option<Vec<LanguageEntry>> {
    let entries = raw.get("languages")?.as_array()?;
    Some(
        entries
            .iter()
            .filter_map(|entry| match entry {
                JsonValue::String(language) => Some(LanguageEntry {
                    language: language.clone(),
                    proficiency: None,
                }),
                other => string_at(other, "language").map(|language| LanguageEntry {
                    language,
                    proficiency: string_at(other, "proficiency"),
                }),
            })
            .collect(),
    )
}

/// Normalizes an arbitrary provider payload into [`ExtractedFields`].
///
/// Total and pure: each target field probes a short ordered set of synonym
/// keys and takes the first present value, so missing, malformed, or extra
/// input maps to absent output instead of an error. List entries may be
/// bare scalars or objects; both resolve to one canonical shape.
pub fn extract_fields(raw: &JsonValue) -> ExtractedFields {
    // `location` may itself be a string or an object with `name`/`country`.
    let location = nested_string(raw, "location", "name").or_else(|| first_string(raw, &["location"]));

    ExtractedFields {
        full_name: first_string(raw, &["name", "full_name"]),
        headline: first_string(raw, &["headline", "title"]),
        current_position: nested_string(raw, "current_position", "title"),
        current_company: nested_string(raw, "current_position", "company"),
        location,
        country: nested_string(raw, "location", "country"),
        email: first_string(raw, &["email"]),
        phone: first_string(raw, &["phone"]),
        website: first_string(raw, &["website"]),
        experience: experience_entries(raw),
        education: education_entries(raw),
        skills: skill_entries(raw),
        languages: language_entries(raw),
        connections_count: first_number(raw, &["connections_count", "connections"]),
        profile_url: first_string(raw, &["profile_url", "url"]),
        photo_url: first_string(raw, &["photo_url", "image"]),
    }
}
