//! HTTP query API.
//!
//! | route | response |
//! |-------|----------|
//! | `GET /entries/` | one page of central entries for the query filters |
//! | `GET /searchKeywords/` | distinct terms per faceted field |
//! | `GET /health` | `{"status": "OK"}` |
//! | `POST`, `GET /topics/{topic}/messages` | hosted broker, see [`BrokerIngress`] |
//!
//! Both query routes also answer without the trailing slash. They and the
//! broker routes consult the configured
//! [`RequestAuthorizer`](crate::RequestAuthorizer).

mod broker;
mod error;
mod query;

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use custody_storage::AuditRepo;
use custody_types::{AuditSearchResults, SearchKeywords};
use serde_json::{Value, json};
use tracing::debug;

pub use broker::{BrokerIngress, MAX_FETCH, MAX_FETCH_WAIT};
pub use error::ApiError;

use crate::auth::RequestAuthorizer;

/// Shared state of the query routes.
#[derive(Clone)]
pub struct ApiState {
    repo: Arc<dyn AuditRepo>,
    authorizer: Arc<dyn RequestAuthorizer>,
    ingress: Option<BrokerIngress>,
}

impl ApiState {
    /// Create state over a repository and an authorizer.
    #[must_use]
    pub fn new(repo: Arc<dyn AuditRepo>, authorizer: Arc<dyn RequestAuthorizer>) -> Self {
        Self {
            repo,
            authorizer,
            ingress: None,
        }
    }

    /// Serve the hosted broker routes for `ingress`, if any.
    #[must_use]
    pub fn with_ingress(mut self, ingress: Option<BrokerIngress>) -> Self {
        self.ingress = ingress;
        self
    }
}

impl std::fmt::Debug for ApiState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiState").finish_non_exhaustive()
    }
}

/// Build the query router, plus the broker routes when `state` hosts one.
pub fn router(state: ApiState) -> Router {
    let mut guarded = Router::new()
        .route("/entries", get(search_entries))
        .route("/entries/", get(search_entries))
        .route("/searchKeywords", get(search_keywords))
        .route("/searchKeywords/", get(search_keywords));
    if state.ingress.is_some() {
        guarded = guarded.merge(broker::routes());
    }
    let queries =
        guarded.route_layer(middleware::from_fn_with_state(state.clone(), authorize));

    Router::new()
        .merge(queries)
        .route("/health", get(health))
        .fallback(not_found)
        .with_state(state)
}

async fn authorize(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    state
        .authorizer
        .authorize(request.uri().path(), request.headers())
        .await?;
    Ok(next.run(request).await)
}

async fn search_entries(
    State(state): State<ApiState>,
    params: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> Result<Json<AuditSearchResults>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let filter = query::parse_search_filter(&params)?;
    let results = state.repo.search_entries(&filter).await?;
    debug!(
        items = results.items.len(),
        page_index = results.page_index,
        total_pages = results.total_pages,
        "Served entry search"
    );
    Ok(Json(results))
}

async fn search_keywords(State(state): State<ApiState>) -> Json<Vec<SearchKeywords>> {
    Json(state.repo.get_search_keywords().await)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "OK" }))
}

async fn not_found() -> Response {
    ApiError::NotFound.into_response()
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request as HttpRequest, StatusCode, header};
    use custody_storage::{MemoryAuditRepo, StorageError, StorageResult};
    use custody_test::{RecordingRepo, sample_central_entry};
    use custody_types::{SearchFilter, SignedCentralAuditEntry};
    use tower::ServiceExt;

    use super::*;
    use crate::auth::{AllowAll, BearerTokenAuthorizer};

    struct BrokenRepo;

    #[async_trait]
    impl AuditRepo for BrokenRepo {
        async fn init(&self) -> StorageResult<()> {
            Ok(())
        }

        async fn destroy(&self) -> StorageResult<()> {
            Ok(())
        }

        async fn store(&self, _entries: &[SignedCentralAuditEntry]) -> StorageResult<usize> {
            Ok(0)
        }

        async fn search_entries(&self, _filter: &SearchFilter) -> StorageResult<AuditSearchResults> {
            Err(StorageError::Connection("index offline".into()))
        }

        async fn get_search_keywords(&self) -> Vec<SearchKeywords> {
            Vec::new()
        }
    }

    async fn seeded_repo() -> Arc<RecordingRepo> {
        let repo = RecordingRepo::new();
        repo.store(&[
            sample_central_entry("u1", "login", 10),
            sample_central_entry("u1", "logout", 20),
            sample_central_entry("u2", "login", 30),
        ])
        .await
        .unwrap();
        Arc::new(repo)
    }

    fn app(repo: Arc<dyn AuditRepo>) -> Router {
        router(ApiState::new(repo, Arc::new(AllowAll)))
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(HttpRequest::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get(app(Arc::new(MemoryAuditRepo::new())), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "OK" }));
    }

    #[tokio::test]
    async fn test_search_by_user() {
        let (status, body) = get(app(seeded_repo().await), "/entries/?userId=u1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pageIndex"], 0);
        assert_eq!(body["pageSize"], 100);
        assert_eq!(body["totalPages"], 1);

        let items = body["items"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["actionType"], "logout");
        assert_eq!(items[0]["securityContext"]["userId"], "u1");
        assert_eq!(items[1]["actionType"], "login");
    }

    #[tokio::test]
    async fn test_search_without_trailing_slash_and_aliases() {
        let (status, body) = get(
            app(seeded_repo().await),
            "/entries?actionType=login&pagesize=1&pageindex=1",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pageSize"], 1);
        assert_eq!(body["pageIndex"], 1);
        assert_eq!(body["totalPages"], 2);
        assert_eq!(body["items"][0]["securityContext"]["userId"], "u1");
    }

    #[tokio::test]
    async fn test_page_size_clamped() {
        let (_, body) = get(app(seeded_repo().await), "/entries/?pageSize=1000&pageIndex=-5").await;
        assert_eq!(body["pageSize"], 100);
        assert_eq!(body["pageIndex"], 0);
    }

    #[tokio::test]
    async fn test_bad_parameter_is_400() {
        let (status, body) = get(app(seeded_repo().await), "/entries/?startDate=soon").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
        assert!(body["msg"].as_str().unwrap().contains("startDate"));
    }

    #[tokio::test]
    async fn test_repository_failure_is_500() {
        let (status, body) = get(app(Arc::new(BrokenRepo)), "/entries/").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "error");
        assert!(body["msg"].as_str().unwrap().contains("index offline"));
    }

    #[tokio::test]
    async fn test_search_keywords() {
        let (status, body) = get(app(seeded_repo().await), "/searchKeywords/").await;
        assert_eq!(status, StatusCode::OK);
        let action_types = body
            .as_array()
            .unwrap()
            .iter()
            .find(|k| k["fieldName"] == "actionType")
            .unwrap();
        assert_eq!(action_types["distinctTerms"], json!(["login", "logout"]));

        let (status, _) = get(app(seeded_repo().await), "/searchKeywords").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let (status, body) = get(app(seeded_repo().await), "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "status": "error", "msg": "not found" }));
    }

    #[tokio::test]
    async fn test_authorizer_outcomes() {
        let repo = seeded_repo().await;
        let app = router(ApiState::new(
            repo,
            Arc::new(BearerTokenAuthorizer::new("secret")),
        ));

        let (status, body) = get(app.clone(), "/entries/").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status"], "error");

        let request = |token: &str| {
            HttpRequest::builder()
                .uri("/searchKeywords/")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap()
        };
        let forbidden = app.clone().oneshot(request("wrong")).await.unwrap();
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
        let allowed = app.clone().oneshot(request("secret")).await.unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);

        // Health stays open.
        let (status, _) = get(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
    }
}
