//! HTTP request handlers for the payroll API.
//!
//! This module contains the handler functions for all API endpoints.

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::EngineError;

use super::request::{CreatePeriodRequest, ListPeriodsQuery, PayrollInfoRequest};
use super::response::{ApiError, ApiErrorResponse};
use super::state::AppState;

/// Creates the API router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/periods", post(create_period_handler).get(list_periods_handler))
        .route("/periods/:id", get(get_period_handler))
        .route("/periods/:id/recalculate", post(recalculate_handler))
        .route("/periods/:id/approve", post(approve_handler))
        .route("/periods/:id/cancel", post(cancel_handler))
        .route("/periods/:id/calculations", get(calculations_handler))
        .route("/runs/:id", get(run_handler))
        .route("/employees/payroll-info", get(list_payroll_info_handler))
        .route(
            "/employees/:id/payroll-info",
            get(get_payroll_info_handler).put(upsert_payroll_info_handler),
        )
        .with_state(state)
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    (status, [(header::CONTENT_TYPE, "application/json")], Json(body)).into_response()
}

fn error_response(correlation_id: Uuid, err: EngineError) -> Response {
    match &err {
        EngineError::StoreUnavailable { .. } | EngineError::SystemicFailure { .. } => {
            warn!(correlation_id = %correlation_id, error = %err, "Request failed")
        }
        _ => info!(correlation_id = %correlation_id, error = %err, "Request rejected"),
    }
    ApiErrorResponse::from(err).into_response()
}

/// Maps a JSON body rejection to a 400 with a useful code.
fn json_rejection_response(correlation_id: Uuid, rejection: JsonRejection) -> Response {
    let error = match rejection {
        JsonRejection::JsonDataError(err) => {
            // The body text carries serde's message, including the field
            let body_text = err.body_text();
            warn!(
                correlation_id = %correlation_id,
                error = %body_text,
                "JSON data error"
            );
            if body_text.contains("missing field") {
                ApiError::validation_error(body_text)
            } else {
                ApiError::malformed_json(body_text)
            }
        }
        JsonRejection::JsonSyntaxError(err) => {
            warn!(
                correlation_id = %correlation_id,
                error = %err,
                "JSON syntax error"
            );
            ApiError::malformed_json(format!("Invalid JSON syntax: {}", err))
        }
        JsonRejection::MissingJsonContentType(_) => {
            ApiError::new("MISSING_CONTENT_TYPE", "Content-Type must be application/json")
        }
        _ => ApiError::malformed_json("Failed to parse request body"),
    };
    ApiErrorResponse::bad_request(error).into_response()
}

fn path_rejection_response(correlation_id: Uuid, rejection: PathRejection) -> Response {
    warn!(correlation_id = %correlation_id, error = %rejection, "Invalid path parameter");
    ApiErrorResponse::bad_request(ApiError::validation_error(format!(
        "Invalid id in path: {}",
        rejection.body_text()
    )))
    .into_response()
}

/// Handler for GET /health.
///
/// Returns 503 when the store cannot be reached.
async fn health_handler(State(state): State<AppState>) -> Response {
    match state.lifecycle().health_check().await {
        Ok(()) => json_response(
            StatusCode::OK,
            json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }),
        ),
        Err(err) => {
            warn!(error = %err, "Health check failed");
            json_response(
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "status": "unavailable", "version": env!("CARGO_PKG_VERSION") }),
            )
        }
    }
}

/// Handler for POST /periods.
async fn create_period_handler(
    State(state): State<AppState>,
    payload: Result<Json<CreatePeriodRequest>, JsonRejection>,
) -> Response {
    let correlation_id = Uuid::new_v4();
    info!(correlation_id = %correlation_id, "Processing create period request");

    let request = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return json_rejection_response(correlation_id, rejection),
    };

    match state.lifecycle().create_period(request.into()).await {
        Ok(period) => json_response(StatusCode::CREATED, period),
        Err(err) => error_response(correlation_id, err),
    }
}

/// Handler for GET /periods.
async fn list_periods_handler(
    State(state): State<AppState>,
    query: Result<Query<ListPeriodsQuery>, QueryRejection>,
) -> Response {
    let correlation_id = Uuid::new_v4();

    let filter = match query {
        Ok(Query(query)) => query.into(),
        Err(rejection) => {
            warn!(correlation_id = %correlation_id, error = %rejection, "Invalid query");
            return ApiErrorResponse::bad_request(ApiError::validation_error(
                rejection.body_text(),
            ))
            .into_response();
        }
    };

    match state.lifecycle().list_periods(&filter).await {
        Ok(periods) => json_response(StatusCode::OK, periods),
        Err(err) => error_response(correlation_id, err),
    }
}

/// Handler for GET /periods/{id}.
async fn get_period_handler(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Response {
    let correlation_id = Uuid::new_v4();
    let Path(id) = match id {
        Ok(id) => id,
        Err(rejection) => return path_rejection_response(correlation_id, rejection),
    };

    match state.lifecycle().get_period(id).await {
        Ok(period) => json_response(StatusCode::OK, period),
        Err(err) => error_response(correlation_id, err),
    }
}

/// Handler for POST /periods/{id}/recalculate.
///
/// Returns 202 with the run id as soon as the run is reserved.
async fn recalculate_handler(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Response {
    let correlation_id = Uuid::new_v4();
    let Path(id) = match id {
        Ok(id) => id,
        Err(rejection) => return path_rejection_response(correlation_id, rejection),
    };
    info!(correlation_id = %correlation_id, period_id = %id, "Processing recalculate request");

    match state.lifecycle().recalculate(id).await {
        Ok(accepted) => json_response(StatusCode::ACCEPTED, accepted),
        Err(err) => error_response(correlation_id, err),
    }
}

/// Handler for POST /periods/{id}/approve.
async fn approve_handler(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Response {
    let correlation_id = Uuid::new_v4();
    let Path(id) = match id {
        Ok(id) => id,
        Err(rejection) => return path_rejection_response(correlation_id, rejection),
    };
    info!(correlation_id = %correlation_id, period_id = %id, "Processing approve request");

    match state.lifecycle().approve(id).await {
        Ok(period) => json_response(StatusCode::OK, period),
        Err(err) => error_response(correlation_id, err),
    }
}

/// Handler for POST /periods/{id}/cancel.
async fn cancel_handler(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Response {
    let correlation_id = Uuid::new_v4();
    let Path(id) = match id {
        Ok(id) => id,
        Err(rejection) => return path_rejection_response(correlation_id, rejection),
    };
    info!(correlation_id = %correlation_id, period_id = %id, "Processing cancel request");

    match state.lifecycle().cancel(id).await {
        Ok(period) => json_response(StatusCode::OK, period),
        Err(err) => error_response(correlation_id, err),
    }
}

/// Handler for GET /periods/{id}/calculations.
async fn calculations_handler(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Response {
    let correlation_id = Uuid::new_v4();
    let Path(id) = match id {
        Ok(id) => id,
        Err(rejection) => return path_rejection_response(correlation_id, rejection),
    };

    match state.lifecycle().calculations(id).await {
        Ok(batch) => json_response(StatusCode::OK, batch),
        Err(err) => error_response(correlation_id, err),
    }
}

/// Handler for GET /runs/{id}.
async fn run_handler(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Response {
    let correlation_id = Uuid::new_v4();
    let Path(id) = match id {
        Ok(id) => id,
        Err(rejection) => return path_rejection_response(correlation_id, rejection),
    };

    match state.lifecycle().run(id) {
        Ok(run) => json_response(StatusCode::OK, run),
        Err(err) => error_response(correlation_id, err),
    }
}

/// Handler for GET /employees/payroll-info.
async fn list_payroll_info_handler(State(state): State<AppState>) -> Response {
    let correlation_id = Uuid::new_v4();
    match state.lifecycle().payroll_info().await {
        Ok(records) => json_response(StatusCode::OK, records),
        Err(err) => error_response(correlation_id, err),
    }
}

/// Handler for GET /employees/{id}/payroll-info.
async fn get_payroll_info_handler(
    State(state): State<AppState>,
    Path(employee_id): Path<String>,
) -> Response {
    let correlation_id = Uuid::new_v4();
    match state.lifecycle().employee_payroll_info(&employee_id).await {
        Ok(info) => json_response(StatusCode::OK, info),
        Err(err) => error_response(correlation_id, err),
    }
}

/// Handler for PUT /employees/{id}/payroll-info.
async fn upsert_payroll_info_handler(
    State(state): State<AppState>,
    Path(employee_id): Path<String>,
    payload: Result<Json<PayrollInfoRequest>, JsonRejection>,
) -> Response {
    let correlation_id = Uuid::new_v4();
    info!(
        correlation_id = %correlation_id,
        employee_id = %employee_id,
        "Processing payroll info update"
    );

    let request = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return json_rejection_response(correlation_id, rejection),
    };

    let info = request.into_info(employee_id);
    match state.lifecycle().upsert_payroll_info(info.clone()).await {
        Ok(()) => json_response(StatusCode::OK, info),
        Err(err) => error_response(correlation_id, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculation::CalculationEngine;
    use crate::config::ConfigLoader;
    use crate::lifecycle::PayrollLifecycle;
    use crate::error::EngineResult;
    use crate::models::{CalculationBatch, NewPeriod, PayrollPeriod, PeriodFilter, PeriodStatus};
    use crate::store::{InMemoryPayrollInfo, InMemoryPeriodStore, PeriodStore};
    use async_trait::async_trait;
    use axum::{body::Body, http::Request};
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn create_test_state() -> AppState {
        let config = ConfigLoader::load("./config/payroll").expect("Failed to load config");
        AppState::new(PayrollLifecycle::new(
            Arc::new(InMemoryPeriodStore::new()),
            Arc::new(InMemoryPayrollInfo::new()),
            CalculationEngine::new(config.config().clone()),
        ))
    }

    async fn send(router: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = router.oneshot(builder.body(body).unwrap()).await.unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health_returns_ok() {
        let (status, body) = send(create_router(create_test_state()), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_create_period_returns_201_draft() {
        let (status, body) = send(
            create_router(create_test_state()),
            "POST",
            "/periods",
            Some(json!({"start_date": "2026-01-12", "end_date": "2026-01-25"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "draft");
        assert_eq!(body["pay_group"], "default");
        assert_eq!(body["version"], 0);
    }

    #[tokio::test]
    async fn test_create_period_inverted_range_returns_400() {
        let (status, body) = send(
            create_router(create_test_state()),
            "POST",
            "/periods",
            Some(json!({"start_date": "2026-01-25", "end_date": "2026-01-12"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_create_period_missing_field_returns_400() {
        let (status, body) = send(
            create_router(create_test_state()),
            "POST",
            "/periods",
            Some(json!({"start_date": "2026-01-12"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert!(body["message"].as_str().unwrap().contains("end_date"));
    }

    #[tokio::test]
    async fn test_malformed_json_returns_400() {
        let router = create_router(create_test_state());
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/periods")
                    .header("Content-Type", "application/json")
                    .body(Body::from("{ not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_period_returns_404() {
        let uri = format!("/periods/{}", Uuid::new_v4());
        let (status, body) = send(create_router(create_test_state()), "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_invalid_uuid_returns_400() {
        let (status, body) = send(
            create_router(create_test_state()),
            "POST",
            "/periods/not-a-uuid/approve",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_approve_draft_returns_409_invalid_transition() {
        let router = create_router(create_test_state());
        let (_, period) = send(
            router.clone(),
            "POST",
            "/periods",
            Some(json!({"start_date": "2026-01-12", "end_date": "2026-01-25"})),
        )
        .await;
        let uri = format!("/periods/{}/approve", period["id"].as_str().unwrap());

        let (status, body) = send(router, "POST", &uri, None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "INVALID_TRANSITION");
    }

    #[tokio::test]
    async fn test_list_periods_rejects_unknown_status() {
        let (status, body) = send(
            create_router(create_test_state()),
            "GET",
            "/periods?status=paid",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_upsert_payroll_info_uses_path_id() {
        let router = create_router(create_test_state());
        let (status, body) = send(
            router.clone(),
            "PUT",
            "/employees/emp_042/payroll-info",
            Some(json!({
                "rate_basis": "salary",
                "rate": "91000",
                "effective_from": "2025-07-01"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["employee_id"], "emp_042");

        let (status, body) = send(router.clone(), "GET", "/employees/payroll-info", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, body) = send(router.clone(), "GET", "/employees/emp_042/payroll-info", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rate"], "91000");

        let (status, body) = send(router, "GET", "/employees/emp_404/payroll-info", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    /// A period store whose database is down.
    struct UnreachableStore;

    fn unreachable() -> EngineError {
        EngineError::StoreUnavailable {
            message: "connection refused".to_string(),
        }
    }

    #[async_trait]
    impl PeriodStore for UnreachableStore {
        async fn create(&self, _input: NewPeriod) -> EngineResult<PayrollPeriod> {
            Err(unreachable())
        }

        async fn get(&self, _id: Uuid) -> EngineResult<PayrollPeriod> {
            Err(unreachable())
        }

        async fn list(&self, _filter: &PeriodFilter) -> EngineResult<Vec<PayrollPeriod>> {
            Err(unreachable())
        }

        async fn set_status(
            &self,
            _id: Uuid,
            _expected: PeriodStatus,
            _expected_version: u64,
            _next: PeriodStatus,
        ) -> EngineResult<PayrollPeriod> {
            Err(unreachable())
        }

        async fn replace_calculations(
            &self,
            _period_id: Uuid,
            _expected_version: u64,
            _batch: CalculationBatch,
        ) -> EngineResult<()> {
            Err(unreachable())
        }

        async fn calculations(&self, _period_id: Uuid) -> EngineResult<CalculationBatch> {
            Err(unreachable())
        }

        async fn health_check(&self) -> EngineResult<()> {
            Err(unreachable())
        }
    }

    #[tokio::test]
    async fn test_health_returns_503_when_store_unreachable() {
        let config = ConfigLoader::load("./config/payroll").expect("Failed to load config");
        let state = AppState::new(PayrollLifecycle::new(
            Arc::new(UnreachableStore),
            Arc::new(InMemoryPayrollInfo::new()),
            CalculationEngine::new(config.config().clone()),
        ));
        let (status, body) = send(create_router(state), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "unavailable");
    }

    #[tokio::test]
    async fn test_unknown_run_returns_404() {
        let uri = format!("/runs/{}", Uuid::new_v4());
        let (status, _) = send(create_router(create_test_state()), "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
