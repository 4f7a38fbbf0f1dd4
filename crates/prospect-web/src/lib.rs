//! Request gateway: axum surface over the enrichment engine and the
//! profile/job stores.
//!
//! The enrich endpoint translates orchestrator outcomes to transport
//! status codes; the read endpoints exist for the live table view, which
//! polls profiles and renders `enriched_data` through the same field
//! normalization the engine uses for its summaries.

use std::sync::Arc;

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::{header, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prospect_core::{extract_fields, parse_source_url, EnrichOptions, EnrichmentBrief, Profile};
use prospect_engine::{EnrichError, EnrichOutcome, EnrichmentEngine};
use prospect_store::{JobStore, ProfileStore};
use serde::Deserialize;
use serde_json::json;
use tracing::error;
use uuid::Uuid;

pub const CRATE_NAME: &str = "prospect-web";

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<EnrichmentEngine>,
    pub profiles: Arc<dyn ProfileStore>,
    pub jobs: Arc<dyn JobStore>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api/v1/enrich",
            post(enrich_handler).options(preflight_handler),
        )
        .route(
            "/api/v1/profiles",
            get(list_profiles_handler)
                .post(create_profile_handler)
                .options(preflight_handler),
        )
        .route(
            "/api/v1/profiles/{id}",
            get(get_profile_handler).options(preflight_handler),
        )
        .route(
            "/api/v1/jobs",
            get(list_jobs_handler).options(preflight_handler),
        )
        .layer(middleware::map_response(apply_cors))
        .with_state(state)
}

/// Browser clients call the enrich endpoint cross-origin; every response
/// carries the permissive headers the original deployment used.
async fn apply_cors(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("authorization, x-client-info, apikey, content-type"),
    );
    response
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Preflight probes get an empty success before any other processing.
async fn preflight_handler() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
struct EnrichRequest {
    // Kept as a string so a malformed id is a 400, not an extractor reject.
    profile_id: Option<String>,
    #[serde(default)]
    options: EnrichOptions,
}

async fn enrich_handler(
    State(state): State<AppState>,
    Json(request): Json<EnrichRequest>,
) -> Response {
    let Some(raw_id) = request.profile_id else {
        return error_response(StatusCode::BAD_REQUEST, "profile_id is required");
    };
    let Ok(profile_id) = Uuid::parse_str(&raw_id) else {
        return error_response(StatusCode::BAD_REQUEST, "profile_id must be a UUID");
    };

    match state.engine.enrich(profile_id, request.options).await {
        Ok(EnrichOutcome::Enriched {
            profile_id,
            brief,
            enriched_at,
            processing_time_ms,
        }) => (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "profile_id": profile_id,
                "brief": brief,
                "enriched_at": enriched_at,
                "processing_time_ms": processing_time_ms,
            })),
        )
            .into_response(),
        Ok(EnrichOutcome::DryRun {
            profile_id,
            message,
        }) => (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "profile_id": profile_id,
                "message": message,
            })),
        )
            .into_response(),
        Ok(EnrichOutcome::NotModified {
            message,
            enriched_at,
        }) => (
            StatusCode::NOT_MODIFIED,
            Json(json!({ "message": message, "enriched_at": enriched_at })),
        )
            .into_response(),
        Ok(EnrichOutcome::Failed {
            profile_id,
            error,
            upstream,
        }) => {
            let status = if upstream {
                StatusCode::BAD_GATEWAY
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (
                status,
                Json(json!({
                    "status": "failed",
                    "profile_id": profile_id,
                    "error": error,
                })),
            )
                .into_response()
        }
        Err(EnrichError::NotFound(_)) => {
            error_response(StatusCode::NOT_FOUND, "profile not found")
        }
        Err(EnrichError::InvalidInput(message)) => {
            error_response(StatusCode::BAD_REQUEST, &message)
        }
        Err(EnrichError::Conflict) => error_response(
            StatusCode::CONFLICT,
            "profile is already being processed",
        ),
        Err(EnrichError::Store(err)) => {
            error!(%profile_id, error = %err, "store failure before enrichment started");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
        }
    }
}

/// Profile row plus the normalized summary the table view renders.
fn profile_view(profile: Profile) -> serde_json::Value {
    let summary: Option<EnrichmentBrief> = profile
        .enriched_data
        .as_ref()
        .map(|data| extract_fields(data).brief());
    let mut view = json!(profile);
    if let (Some(object), Some(summary)) = (view.as_object_mut(), summary) {
        object.insert("summary".to_string(), json!(summary));
    }
    view
}

async fn list_profiles_handler(State(state): State<AppState>) -> Response {
    match state.profiles.list().await {
        Ok(profiles) => Json(
            profiles
                .into_iter()
                .map(profile_view)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(err) => {
            error!(error = %err, "failed to list profiles");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
        }
    }
}

async fn get_profile_handler(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<Uuid>,
) -> Response {
    match state.profiles.get(id).await {
        Ok(Some(profile)) => Json(profile_view(profile)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "profile not found"),
        Err(err) => {
            error!(%id, error = %err, "failed to load profile");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreateProfileRequest {
    linkedin_url: String,
    name: Option<String>,
    title: Option<String>,
}

async fn create_profile_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateProfileRequest>,
) -> Response {
    if parse_source_url(&request.linkedin_url).is_none() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "linkedin_url must be a well-formed http(s) URL",
        );
    }

    let profile = Profile::new(request.linkedin_url, request.name, request.title);
    match state.profiles.insert(profile).await {
        Ok(created) => (StatusCode::CREATED, Json(profile_view(created))).into_response(),
        Err(err) => {
            error!(error = %err, "failed to create profile");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct JobsQuery {
    profile_id: Option<Uuid>,
}

async fn list_jobs_handler(
    State(state): State<AppState>,
    Query(query): Query<JobsQuery>,
) -> Response {
    match state.jobs.list(query.profile_id).await {
        Ok(jobs) => Json(jobs).into_response(),
        Err(err) => {
            error!(error = %err, "failed to list enrichment jobs");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::{Duration, Utc};
    use http_body_util::BodyExt;
    use prospect_core::EnrichedStatus;
    use prospect_provider::{EnrichmentProvider, ProviderError};
    use prospect_store::InMemoryStore;
    use serde_json::{Map, Value as JsonValue};
    use tower::ServiceExt;

    enum Script {
        Payload(JsonValue),
        Upstream(u16, &'static str),
    }

    struct StubProvider {
        script: Script,
    }

    #[async_trait]
    impl EnrichmentProvider for StubProvider {
        fn provider_name(&self) -> &str {
            "brightdata"
        }

        async fn trigger(
            &self,
            _linkedin_url: &str,
            _provider_options: &Map<String, JsonValue>,
        ) -> Result<JsonValue, ProviderError> {
            match &self.script {
                Script::Payload(payload) => Ok(payload.clone()),
                Script::Upstream(status, body) => Err(ProviderError::Upstream {
                    status: *status,
                    body: (*body).to_string(),
                }),
            }
        }
    }

    fn test_app(script: Script) -> (Router, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let engine = Arc::new(EnrichmentEngine::new(
            store.clone(),
            store.clone(),
            Arc::new(StubProvider { script }),
        ));
        let state = AppState {
            engine,
            profiles: store.clone(),
            jobs: store.clone(),
        };
        (app(state), store)
    }

    fn json_request(method: &str, uri: &str, body: JsonValue) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request builds")
    }

    async fn body_json(response: Response) -> JsonValue {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body collects")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("body is json")
    }

    async fn seed_profile(store: &InMemoryStore, profile: Profile) -> Uuid {
        let id = profile.id;
        ProfileStore::insert(store, profile).await.expect("seed");
        id
    }

    #[tokio::test]
    async fn preflight_answers_on_every_api_route() {
        for uri in [
            "/api/v1/enrich",
            "/api/v1/profiles",
            "/api/v1/profiles/00000000-0000-0000-0000-000000000000",
            "/api/v1/jobs",
        ] {
            let (app, _store) = test_app(Script::Payload(json!({})));
            let response = app
                .oneshot(
                    Request::builder()
                        .method("OPTIONS")
                        .uri(uri)
                        .body(Body::empty())
                        .expect("request builds"),
                )
                .await
                .expect("response");
            assert_eq!(response.status(), StatusCode::OK, "uri: {uri}");
            assert_eq!(
                response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
                HeaderValue::from_static("*")
            );
        }
    }

    #[tokio::test]
    async fn missing_profile_id_is_bad_request() {
        let (app, _store) = test_app(Script::Payload(json!({})));
        let response = app
            .oneshot(json_request("POST", "/api/v1/enrich", json!({})))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "profile_id is required");
    }

    #[tokio::test]
    async fn malformed_profile_id_is_bad_request() {
        let (app, _store) = test_app(Script::Payload(json!({})));
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/v1/enrich",
                json!({ "profile_id": "not-a-uuid" }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "profile_id must be a UUID");
    }

    #[tokio::test]
    async fn unknown_profile_is_not_found() {
        let (app, _store) = test_app(Script::Payload(json!({})));
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/v1/enrich",
                json!({ "profile_id": Uuid::new_v4() }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"], "profile not found");
    }

    #[tokio::test]
    async fn processing_profile_conflicts() {
        let (app, store) = test_app(Script::Payload(json!({})));
        let mut profile = Profile::new("https://www.linkedin.com/in/janedoe", None, None);
        profile.enriched_status = EnrichedStatus::Processing;
        let id = seed_profile(&store, profile).await;

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/v1/enrich",
                json!({ "profile_id": id }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn fresh_profile_is_not_modified() {
        let (app, store) = test_app(Script::Payload(json!({})));
        let mut profile = Profile::new("https://www.linkedin.com/in/janedoe", None, None);
        profile.enriched_status = EnrichedStatus::Success;
        profile.enriched_at = Some(Utc::now() - Duration::hours(1));
        profile.enriched_data = Some(json!({"name": "Jane Doe"}));
        let id = seed_profile(&store, profile).await;

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/v1/enrich",
                json!({ "profile_id": id }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    }

    #[tokio::test]
    async fn enrich_happy_path_end_to_end() {
        let (app, store) = test_app(Script::Payload(
            json!({"name": "Jane Doe", "skills": ["Go", "Rust"]}),
        ));
        let id = seed_profile(
            &store,
            Profile::new("https://www.linkedin.com/in/janedoe", None, None),
        )
        .await;

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/enrich",
                json!({ "profile_id": id, "options": { "force": true } }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["brief"]["skills_count"], 2);
        assert_eq!(body["brief"]["experience_count"], 0);
        assert!(body["enriched_at"].is_string());
        assert!(body["processing_time_ms"].is_number());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/profiles")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let rows = body.as_array().expect("profile list");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["enriched_status"], "success");
        assert_eq!(rows[0]["summary"]["skills_count"], 2);

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/v1/jobs?profile_id={id}"))
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("response");
        let body = body_json(response).await;
        let jobs = body.as_array().expect("job list");
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0]["status"], "success");
    }

    #[tokio::test]
    async fn dry_run_reports_success_message() {
        let (app, store) = test_app(Script::Payload(json!({})));
        let id = seed_profile(
            &store,
            Profile::new("https://www.linkedin.com/in/janedoe", None, None),
        )
        .await;

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/v1/enrich",
                json!({ "profile_id": id, "options": { "dry_run": true } }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "success");
        assert!(body["message"].as_str().expect("message").contains("dry run"));
        assert!(body.get("brief").is_none());
    }

    #[tokio::test]
    async fn upstream_failure_maps_to_bad_gateway() {
        let (app, store) = test_app(Script::Upstream(503, "dataset busy"));
        let id = seed_profile(
            &store,
            Profile::new("https://www.linkedin.com/in/janedoe", None, None),
        )
        .await;

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/v1/enrich",
                json!({ "profile_id": id }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(response).await;
        assert_eq!(body["status"], "failed");
        assert!(!body["error"].as_str().expect("error").is_empty());

        let after = store.get(id).await.expect("get").expect("profile");
        assert_eq!(after.enriched_status, EnrichedStatus::Failed);
    }

    #[tokio::test]
    async fn create_profile_validates_url() {
        let (app, _store) = test_app(Script::Payload(json!({})));
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/profiles",
                json!({ "linkedin_url": "not a url" }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/v1/profiles",
                json!({
                    "linkedin_url": "https://www.linkedin.com/in/janedoe",
                    "name": "Jane Doe"
                }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["enriched_status"], "never");
        assert_eq!(body["name"], "Jane Doe");
        assert!(body["id"].is_string());
    }

    #[tokio::test]
    async fn get_profile_by_id() {
        let (app, store) = test_app(Script::Payload(json!({})));
        let id = seed_profile(
            &store,
            Profile::new("https://www.linkedin.com/in/janedoe", None, None),
        )
        .await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/v1/profiles/{id}"))
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/v1/profiles/{}", Uuid::new_v4()))
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
