/**
 * API REST FLEETDECK - Serveur HTTP du registre
 *
 * RÔLE :
 * Expose le registre services/instances, les vues dérivées (notations, usage)
 * et le jeu de feedback aux consommateurs (dashboard, scripts, CLI).
 *
 * FONCTIONNEMENT :
 * - Serveur Axum, middleware x-api-key => Caller dans les extensions
 * - Routes : /health, /system, /services, /metrics, /suggestions, /feedback
 * - Erreurs du registre traduites en statut HTTP + corps JSON {error, kind, status}
 * - Corps JSON invalide => 400 ValidationError (jamais de 422 opaque)
 */

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::auth::{require_api_key, ApiKeys, Caller};
use crate::feedback::{FeedbackLog, FeedbackPage, NewFeedback, Suggestion};
use crate::health::{HealthTracker, KernelHealth};
use crate::metrics::{FeedbackMetricsSummary, MetricsSnapshot, RatingView, UsageView};
use crate::models::{FeedbackRecord, InstanceSpec, MetricsPatch, NewService, Service, ServicePatch};
use crate::registry::{RegistryError, ServiceRegistry};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ServiceRegistry>,
    pub feedback: Arc<FeedbackLog>,
    pub health_tracker: HealthTracker,
    pub api_keys: ApiKeys,
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = match &self {
            RegistryError::Validation(_) => StatusCode::BAD_REQUEST,
            RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
            RegistryError::Conflict(_) => StatusCode::CONFLICT,
            RegistryError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            RegistryError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        };
        if status.is_server_error() {
            error!(error = %self, "[http] store unavailable");
        }
        let body = Json(serde_json::json!({
            "error": self.to_string(),
            "kind": self.kind(),
            "status": status.as_u16(),
        }));
        (status, body).into_response()
    }
}

type ApiResult<T> = Result<T, RegistryError>;

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| RegistryError::Validation(format!("invalid request body: {}", e.body_text())))
}

fn query<T>(params: Result<Query<T>, QueryRejection>) -> ApiResult<T> {
    params
        .map(|Query(v)| v)
        .map_err(|e| RegistryError::Validation(format!("invalid query string: {}", e.body_text())))
}

pub fn build_router(app_state: AppState) -> Router {
    let api_keys = app_state.api_keys.clone();
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/services", get(list_services).post(create_service))
        .route(
            "/services/{id}",
            get(get_service).patch(update_service).delete(delete_service),
        )
        .route("/services/{id}/instances", post(add_instance))
        .route(
            "/services/{id}/instances/{instance_id}",
            put(update_instance_status).delete(remove_instance),
        )
        .route("/services/{id}/metrics", post(record_metrics))
        .route("/services/{id}/ratings", get(get_ratings))
        .route("/services/{id}/usage", get(get_usage))
        .route("/metrics", get(get_metrics_summary))
        .route("/metrics/{service_name}", get(get_service_metrics))
        .route("/suggestions/{service_name}", get(get_suggestions))
        .route("/feedback", get(list_feedback).post(append_feedback))
        .with_state(app_state)
        .layer(middleware::from_fn_with_state(api_keys, require_api_key))
        .layer(TraceLayer::new_for_http())
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> ApiResult<Json<KernelHealth>> {
    Ok(Json(app.health_tracker.get_health(&app.registry, &app.feedback)?))
}

// GET /services
async fn list_services(State(app): State<AppState>, caller: Caller) -> ApiResult<Json<Vec<Service>>> {
    Ok(Json(app.registry.list_services(&caller)?))
}

// POST /services
async fn create_service(
    State(app): State<AppState>,
    caller: Caller,
    payload: Result<Json<NewService>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Service>)> {
    let svc = app.registry.create_service(&caller, body(payload)?)?;
    Ok((StatusCode::CREATED, Json(svc)))
}

// GET /services/{id}
async fn get_service(
    State(app): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<Service>> {
    Ok(Json(app.registry.get_service(&caller, &id)?))
}

// PATCH /services/{id}
async fn update_service(
    State(app): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    payload: Result<Json<ServicePatch>, JsonRejection>,
) -> ApiResult<Json<Service>> {
    Ok(Json(app.registry.update_service(&caller, &id, body(payload)?)?))
}

#[derive(Serialize)]
struct MessageView {
    message: String,
}

// DELETE /services/{id}
async fn delete_service(
    State(app): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageView>> {
    app.registry.delete_service(&caller, &id)?;
    Ok(Json(MessageView {
        message: "Service deleted successfully".into(),
    }))
}

// POST /services/{id}/instances
async fn add_instance(
    State(app): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    payload: Result<Json<InstanceSpec>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Service>)> {
    let svc = app.registry.add_instance(&caller, &id, body(payload)?)?;
    Ok((StatusCode::CREATED, Json(svc)))
}

// DELETE /services/{id}/instances/{instance_id}
async fn remove_instance(
    State(app): State<AppState>,
    caller: Caller,
    Path((id, instance_id)): Path<(String, String)>,
) -> ApiResult<Json<Service>> {
    Ok(Json(app.registry.remove_instance(&caller, &id, &instance_id)?))
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: String,
}

// PUT /services/{id}/instances/{instance_id}
async fn update_instance_status(
    State(app): State<AppState>,
    caller: Caller,
    Path((id, instance_id)): Path<(String, String)>,
    payload: Result<Json<StatusBody>, JsonRejection>,
) -> ApiResult<Json<Service>> {
    let StatusBody { status } = body(payload)?;
    Ok(Json(app.registry.update_instance_status(&caller, &id, &instance_id, &status)?))
}

// POST /services/{id}/metrics
async fn record_metrics(
    State(app): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    payload: Result<Json<MetricsPatch>, JsonRejection>,
) -> ApiResult<Json<Service>> {
    Ok(Json(app.registry.record_metrics(&caller, &id, body(payload)?)?))
}

// GET /services/{id}/ratings
async fn get_ratings(
    State(app): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<RatingView>> {
    Ok(Json(app.registry.get_service_ratings(&caller, &id)?))
}

// GET /services/{id}/usage
async fn get_usage(
    State(app): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<UsageView>> {
    Ok(Json(app.registry.get_service_usage(&caller, &id)?))
}

// GET /metrics
async fn get_metrics_summary(
    State(app): State<AppState>,
    caller: Caller,
) -> ApiResult<Json<FeedbackMetricsSummary>> {
    Ok(Json(app.registry.get_feedback_metrics_summary(&caller)?))
}

#[derive(Debug, Deserialize)]
struct MetricsParams {
    days: Option<i64>,
}

#[derive(Serialize)]
struct MetricsResponse {
    #[serde(flatten)]
    snapshot: MetricsSnapshot,
    #[serde(rename = "windowDays", skip_serializing_if = "Option::is_none")]
    window_days: Option<i64>,
}

// GET /metrics/{service_name}?days=N
async fn get_service_metrics(
    State(app): State<AppState>,
    caller: Caller,
    Path(service_name): Path<String>,
    params: Result<Query<MetricsParams>, QueryRejection>,
) -> ApiResult<Json<MetricsResponse>> {
    let MetricsParams { days } = query(params)?;
    if let Some(d) = days {
        if d < 1 {
            return Err(RegistryError::Validation(format!("days must be >= 1, got {d}")));
        }
    }
    let snapshot = app.registry.get_metrics_snapshot(&caller, &service_name)?;
    Ok(Json(MetricsResponse { snapshot, window_days: days }))
}

#[derive(Debug, Deserialize)]
struct LimitParams {
    limit: Option<usize>,
}

// GET /suggestions/{service_name}?limit=N
async fn get_suggestions(
    State(app): State<AppState>,
    caller: Caller,
    Path(service_name): Path<String>,
    params: Result<Query<LimitParams>, QueryRejection>,
) -> ApiResult<Json<Vec<Suggestion>>> {
    let LimitParams { limit } = query(params)?;
    let service = app.registry.find_service_by_name(&caller, &service_name)?;
    Ok(Json(app.feedback.suggestions(&service.name, limit)))
}

#[derive(Debug, Deserialize)]
struct PageParams {
    page: Option<usize>,
    limit: Option<usize>,
}

// GET /feedback?page=&limit=
async fn list_feedback(
    State(app): State<AppState>,
    params: Result<Query<PageParams>, QueryRejection>,
) -> ApiResult<Json<FeedbackPage>> {
    let PageParams { page, limit } = query(params)?;
    Ok(Json(app.feedback.list(page, limit)))
}

// POST /feedback
async fn append_feedback(
    State(app): State<AppState>,
    payload: Result<Json<NewFeedback>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<FeedbackRecord>)> {
    let record = app.feedback.append(body(payload)?)?;
    Ok((StatusCode::CREATED, Json(record)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use tower::ServiceExt;

    const KEY: &str = "test-key";

    fn app_with_keys(keys: HashMap<String, String>) -> Router {
        build_router(AppState {
            registry: Arc::new(ServiceRegistry::new(Arc::new(MemoryStore::new()))),
            feedback: Arc::new(FeedbackLog::in_memory()),
            health_tracker: HealthTracker::new(),
            api_keys: ApiKeys::new(keys),
        })
    }

    fn app() -> Router {
        app_with_keys(HashMap::from([(KEY.to_string(), "dashboard".to_string())]))
    }

    async fn send(app: &Router, method: &str, uri: &str, payload: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri).header("x-api-key", KEY);
        let req = match payload {
            Some(v) => builder
                .header("content-type", "application/json")
                .body(Body::from(v.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn create(app: &Router, name: &str, instances: Value) -> Value {
        let (status, svc) = send(
            app,
            "POST",
            "/services",
            Some(json!({
                "name": name, "type": "nlp", "framework": "pytorch",
                "version": "1.0", "description": "demo", "instances": instances
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        svc
    }

    #[tokio::test]
    async fn health_is_public_and_everything_else_needs_a_key() {
        let app = app();
        let resp = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .clone()
            .oneshot(Request::builder().uri("/services").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let err: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(err["kind"], "UnauthorizedError");
        assert_eq!(err["status"], 401);
        assert!(err["error"].is_string());

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/services")
                    .header("x-api-key", "wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn no_configured_keys_denies_access() {
        let app = app_with_keys(HashMap::new());
        let (status, err) = send(&app, "GET", "/services", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(err["kind"], "UnauthorizedError");
    }

    #[tokio::test]
    async fn instance_lifecycle_over_http() {
        let app = app();
        let svc = create(&app, "svc1", json!([{ "host": "h1", "port": 8080, "endPoint": "/a" }])).await;
        assert_eq!(svc["replicas"], 1);
        let id = svc["id"].as_str().unwrap().to_string();

        let (status, svc) = send(
            &app,
            "POST",
            &format!("/services/{id}/instances"),
            Some(json!({ "host": "h2", "port": 8081, "endPoint": "/b" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(svc["replicas"], 2);
        assert_eq!(svc["instances"].as_array().unwrap().len(), 2);

        let first = svc["instances"][0]["id"].as_str().unwrap().to_string();
        let (status, svc) = send(
            &app,
            "PUT",
            &format!("/services/{id}/instances/{first}"),
            Some(json!({ "status": "Stopped" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(svc["instances"][0]["status"], "Stopped");

        let (status, svc) = send(&app, "DELETE", &format!("/services/{id}/instances/{first}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(svc["replicas"], 1);

        let (status, err) = send(&app, "DELETE", &format!("/services/{id}/instances/{first}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(err["kind"], "NotFoundError");
    }

    #[tokio::test]
    async fn validation_errors_are_bad_requests() {
        let app = app();
        let svc = create(&app, "svc", json!([])).await;
        let id = svc["id"].as_str().unwrap();

        for port in [json!(0), json!(65536), json!("8080"), json!(80.5)] {
            let (status, err) = send(
                &app,
                "POST",
                &format!("/services/{id}/instances"),
                Some(json!({ "host": "h", "port": port, "endPoint": "/" })),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "port {port}");
            assert_eq!(err["kind"], "ValidationError");
        }

        let (status, _) = send(&app, "POST", "/services", Some(json!({ "name": "svc", "version": "1" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "POST", "/services", Some(json!({ "name": "", "version": "1" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "GET", "/metrics/svc?days=0", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn ratings_metrics_and_summary() {
        let app = app();
        let svc = create(&app, "rated", json!([])).await;
        let id = svc["id"].as_str().unwrap();

        let (status, ratings) = send(&app, "GET", &format!("/services/{id}/ratings"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ratings, json!({ "thumbUp": 0.0, "neutral": 0.0, "thumbDown": 0.0 }));

        let (status, _) = send(
            &app,
            "POST",
            &format!("/services/{id}/metrics"),
            Some(json!({
                "thumbs_up_total": 70, "neutral_total": 10, "thumbs_down_total": 20,
                "usage_total": 3, "rejection_total": 1, "latency_ms": 1.5
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, ratings) = send(&app, "GET", &format!("/services/{id}/ratings"), None).await;
        assert_eq!(ratings, json!({ "thumbUp": 70.0, "neutral": 10.0, "thumbDown": 20.0 }));

        let (_, usage) = send(&app, "GET", &format!("/services/{id}/usage"), None).await;
        assert_eq!(usage["usageRate"], 75.0);

        let (status, m) = send(&app, "GET", "/metrics/rated?days=7", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(m["thumbs_up_total"], 70);
        assert_eq!(m["rejection_total"], 1);
        assert_eq!(m["windowDays"], 7);

        let (_, summary) = send(&app, "GET", "/metrics", None).await;
        assert_eq!(summary["rated"]["usage_total"], 3);

        let (status, _) = send(&app, "GET", "/metrics/unknown", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_service_then_reads_are_not_found() {
        let app = app();
        let svc = create(&app, "doomed", json!([{ "host": "h", "port": 1 }])).await;
        let id = svc["id"].as_str().unwrap();

        let (status, body) = send(&app, "DELETE", &format!("/services/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Service deleted successfully");

        let (_, list) = send(&app, "GET", "/services", None).await;
        assert!(list.as_array().unwrap().iter().all(|s| s["id"] != id));

        let (status, _) = send(&app, "GET", &format!("/services/{id}/ratings"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, "DELETE", &format!("/services/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn feedback_and_suggestions() {
        let app = app();
        create(&app, "chat", json!([])).await;

        let (status, _) = send(
            &app,
            "POST",
            "/feedback",
            Some(json!({ "initial": "How can I reset my password?", "tokenized": "password_reset_query",
                         "userfeedback": "bad", "service": "chat" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = send(&app, "POST", "/feedback", Some(json!({ "initial": "x", "tokenized": "" , "userfeedback": "good" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, page) = send(&app, "GET", "/feedback?page=1&limit=5", None).await;
        assert_eq!(page["count"], 1);
        assert_eq!(page["pagination"]["totalEntries"], 1);

        let (status, s) = send(&app, "GET", "/suggestions/chat?limit=5", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(s[0]["value"], "password_reset_query");
        assert!(s[0]["timestamp"].is_string());

        let (status, _) = send(&app, "GET", "/suggestions/nobody", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn patch_service_and_system_health() {
        let app = app();
        let svc = create(&app, "edit-me", json!([{ "host": "h", "port": 1 }])).await;
        let id = svc["id"].as_str().unwrap();

        let (status, svc) = send(
            &app,
            "PATCH",
            &format!("/services/{id}"),
            Some(json!({ "description": "updated", "status": "active" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(svc["description"], "updated");
        assert_eq!(svc["status"], "active");
        assert_eq!(svc["replicas"], 1);

        let (status, health) = send(&app, "GET", "/system/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["servicesTracked"], 1);
        assert_eq!(health["instancesTracked"], 1);
        assert_eq!(health["store"], "memory");
    }
}
