//! Outbound provider adapter: one trigger call against a dataset-style
//! enrichment API, with typed failure classification.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value as JsonValue};
use thiserror::Error;
use tracing::{info_span, Instrument};

pub const CRATE_NAME: &str = "prospect-provider";

pub const DEFAULT_PROVIDER_NAME: &str = "brightdata";
pub const DEFAULT_BASE_URL: &str = "https://api.brightdata.com";
/// Sample value shipped in deployment templates; treated the same as unset.
pub const PLACEHOLDER_DATASET_ID: &str = "linkedin-profile";

/// Credentials and endpoint shape for the enrichment provider.
///
/// Loaded once at the process edge and injected at construction; call
/// logic never reads the environment.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub provider_name: String,
    pub api_key: Option<String>,
    pub base_url: String,
    pub dataset_id: Option<String>,
    pub auth_scheme: String,
    /// Full trigger URL override. Some API generations embed the dataset id
    /// in the path, others take a generic endpoint plus the id in the body.
    pub trigger_url: Option<String>,
    pub timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_name: DEFAULT_PROVIDER_NAME.to_string(),
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            dataset_id: None,
            auth_scheme: "Bearer".to_string(),
            trigger_url: None,
            timeout: Duration::from_secs(60),
        }
    }
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            provider_name: std::env::var("ENRICH_PROVIDER_NAME")
                .unwrap_or(defaults.provider_name),
            api_key: std::env::var("BRIGHTDATA_API_KEY").ok().filter(|v| !v.is_empty()),
            base_url: std::env::var("BRIGHTDATA_BASE_URL").unwrap_or(defaults.base_url),
            dataset_id: std::env::var("BRIGHTDATA_COLLECTOR_ID")
                .ok()
                .filter(|v| !v.is_empty()),
            auth_scheme: std::env::var("BRIGHTDATA_AUTH_SCHEME")
                .map(|v| v.trim().to_string())
                .unwrap_or(defaults.auth_scheme),
            trigger_url: std::env::var("BRIGHTDATA_TRIGGER_URL")
                .ok()
                .filter(|v| !v.is_empty()),
            timeout: std::env::var("BRIGHTDATA_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider configuration error: {0}")]
    Config(String),
    #[error("provider api error: {status} - {body}")]
    Upstream { status: u16, body: String },
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl ProviderError {
    /// True when the provider itself answered with a failure status, as
    /// opposed to a local configuration or transport problem.
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Upstream { .. })
    }
}

/// Seam between the orchestrator and the outside world. The orchestrator
/// only ever sees this trait; tests substitute a scripted implementation.
#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    fn provider_name(&self) -> &str;

    /// Triggers one enrichment of `linkedin_url` and returns the parsed
    /// response body as an opaque document.
    async fn trigger(
        &self,
        linkedin_url: &str,
        provider_options: &Map<String, JsonValue>,
    ) -> Result<JsonValue, ProviderError>;
}

/// Fully shaped outbound request, separated from I/O so it can be asserted
/// on without a network.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerPlan {
    pub url: String,
    pub body: JsonValue,
}

pub fn plan_trigger(
    config: &ProviderConfig,
    linkedin_url: &str,
    provider_options: &Map<String, JsonValue>,
) -> Result<TriggerPlan, ProviderError> {
    if config.api_key.as_deref().unwrap_or_default().is_empty() {
        return Err(ProviderError::Config("api key not configured".to_string()));
    }
    let dataset_id = match config.dataset_id.as_deref() {
        Some(id) if !id.is_empty() && id != PLACEHOLDER_DATASET_ID => id,
        _ => {
            return Err(ProviderError::Config(
                "dataset id not configured; set it to your actual collector/dataset id"
                    .to_string(),
            ))
        }
    };

    // Generic trigger endpoints want the dataset id in the body; endpoints
    // that already embed the id in their path must not repeat it.
    let dataset_id_in_body = config
        .trigger_url
        .as_deref()
        .is_some_and(|url| !url.contains(dataset_id));

    let url = config.trigger_url.clone().unwrap_or_else(|| {
        format!(
            "{}/datasets/v3/{}/trigger",
            config.base_url.trim_end_matches('/'),
            dataset_id
        )
    });

    let mut body = Map::new();
    body.insert("url".to_string(), json!(linkedin_url));
    body.insert("format".to_string(), json!("json"));
    if dataset_id_in_body {
        body.insert("dataset_id".to_string(), json!(dataset_id));
    }
    for (key, value) in provider_options {
        body.insert(key.clone(), value.clone());
    }

    Ok(TriggerPlan {
        url,
        body: JsonValue::Object(body),
    })
}

/// reqwest-backed [`EnrichmentProvider`] for dataset-trigger APIs.
#[derive(Debug)]
pub struct DatasetTriggerClient {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl DatasetTriggerClient {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl EnrichmentProvider for DatasetTriggerClient {
    fn provider_name(&self) -> &str {
        &self.config.provider_name
    }

    async fn trigger(
        &self,
        linkedin_url: &str,
        provider_options: &Map<String, JsonValue>,
    ) -> Result<JsonValue, ProviderError> {
        let plan = plan_trigger(&self.config, linkedin_url, provider_options)?;
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Config("api key not configured".to_string()))?;

        let span = info_span!("provider_trigger", provider = %self.config.provider_name, url = %plan.url);
        async {
            let response = self
                .client
                .post(&plan.url)
                .header(
                    reqwest::header::AUTHORIZATION,
                    format!("{} {}", self.config.auth_scheme, api_key),
                )
                .json(&plan.body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ProviderError::Upstream {
                    status: status.as_u16(),
                    body,
                });
            }

            Ok(response.json().await?)
        }
        .instrument(span)
        .await
    }
}
