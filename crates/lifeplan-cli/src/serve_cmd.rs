use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::sync::OnceCell;
use tower_http::cors::CorsLayer;

use lifeplan_core::{Agent, AgentRequest, AgentResponse, PipelineError, Services};
use lifeplan_db::{PgRecordStore, pool};

use crate::config::LifeplanConfig;

const DEFAULT_EXTENSION_WEEKS: i64 = 4;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Renders as the `{type: "error", error}` envelope.
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: msg.into(),
        }
    }

    pub fn internal(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{err:#}"),
        }
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        let status = StatusCode::from_u16(err.status_class().http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        } else {
            tracing::warn!(error = %err, "request rejected");
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = AgentResponse::Error {
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Shared server state. The agent (and everything it holds) is built on
/// first use; a failed build leaves the cell empty for the next request.
#[derive(Clone)]
pub struct AppState {
    config: Option<Arc<LifeplanConfig>>,
    agent: Arc<OnceCell<Arc<Agent>>>,
}

impl AppState {
    pub fn new(config: LifeplanConfig) -> Self {
        Self {
            config: Some(Arc::new(config)),
            agent: Arc::new(OnceCell::new()),
        }
    }

    /// State over an already-built bundle.
    #[cfg(test)]
    pub fn with_services(services: Services) -> Self {
        Self {
            config: None,
            agent: Arc::new(OnceCell::from(Arc::new(Agent::new(Arc::new(services))))),
        }
    }

    async fn agent(&self) -> Result<Arc<Agent>, AppError> {
        self.agent
            .get_or_try_init(|| async {
                let config = self
                    .config
                    .as_ref()
                    .context("server has no configuration to build services from")?;
                build_agent(config)
            })
            .await
            .cloned()
            .map_err(AppError::internal)
    }
}

fn build_agent(config: &LifeplanConfig) -> Result<Arc<Agent>> {
    let pool = pool::create_lazy_pool(&config.db_config)?;
    let store = Arc::new(PgRecordStore::new(pool));
    let services = Services::build(&config.services, store)?;
    Ok(Arc::new(Agent::new(Arc::new(services))))
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/health", get(health))
        .route("/api/agent", post(handle_agent))
        .route("/api/extend-learning-plan", post(extend_learning_plan))
        .route("/api/enrich-grocery-item", post(enrich_grocery_item))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(config: LifeplanConfig, bind: &str, port: u16) -> Result<()> {
    let app = build_router(AppState::new(config));
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!("lifeplan serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("lifeplan serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn index() -> Json<Value> {
    Json(json!({ "message": "AI Life Planner Agent API", "version": "1.0.0" }))
}

async fn health(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    state.agent().await?;
    Ok(Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

fn parse_body(body: &Bytes) -> Result<Value, AppError> {
    serde_json::from_slice(body).map_err(|_| AppError::bad_request("Invalid JSON in request body."))
}

async fn handle_agent(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<AgentResponse>, AppError> {
    let request: AgentRequest = serde_json::from_value(parse_body(&body)?)
        .map_err(|e| AppError::bad_request(format!("Invalid request body: {e}")))?;
    let agent = state.agent().await?;
    Ok(Json(agent.handle(request).await?))
}

async fn extend_learning_plan(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<AgentResponse>, AppError> {
    let body = parse_body(&body)?;
    let plan_id = body
        .get("plan_id")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("Invalid request data: Plan ID is required"))?;
    let additional_weeks = match body.get("additional_weeks") {
        None | Some(Value::Null) => DEFAULT_EXTENSION_WEEKS,
        Some(Value::Number(n)) => n.as_i64().ok_or_else(|| {
            AppError::bad_request("Invalid request data: additional_weeks must be an integer")
        })?,
        Some(Value::String(s)) => s.trim().parse().map_err(|_| {
            AppError::bad_request("Invalid request data: additional_weeks must be an integer")
        })?,
        Some(_) => {
            return Err(AppError::bad_request(
                "Invalid request data: additional_weeks must be an integer",
            ));
        }
    };

    let user_id = headers
        .get("user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AppError::unauthorized("Authentication required. Please log in again."))?;

    let agent = state.agent().await?;
    Ok(Json(
        agent
            .extend_plan(user_id, plan_id, additional_weeks)
            .await?,
    ))
}

async fn enrich_grocery_item(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let body = parse_body(&body)?;
    let agent = state.agent().await?;
    let outcome = agent.enrich_grocery(&body).await?;
    Ok(Json(json!({
        "message": outcome.message,
        "enriched": outcome.enriched,
        "item": outcome.record,
    })))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{TimeZone, Utc};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use lifeplan_core::Services;
    use lifeplan_core::clock::FixedClock;
    use lifeplan_core::model::{
        ChainBudget, GenerationRequest, LanguageModel, ModelChain, ModelError,
    };
    use lifeplan_db::Collection;
    use lifeplan_test_utils::MemoryStore;

    use super::{AppState, build_router};
    use crate::config::LifeplanConfig;

    struct Scripted(Mutex<VecDeque<String>>);

    #[async_trait]
    impl LanguageModel for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, _request: &GenerationRequest) -> Result<String, ModelError> {
            self.0.lock().unwrap().pop_front().ok_or(ModelError::NoChoices)
        }
    }

    fn state(store: Arc<MemoryStore>, replies: Vec<Value>) -> AppState {
        let model = Arc::new(Scripted(Mutex::new(
            replies.into_iter().map(|v| v.to_string()).collect(),
        )));
        let chain = Arc::new(ModelChain::new(model, None, ChainBudget::default()));
        let clock = Arc::new(FixedClock(Utc.with_ymd_and_hms(2026, 10, 16, 3, 30, 0).unwrap()));
        AppState::with_services(Services::new(store, chain, clock, chrono_tz::Asia::Kolkata))
    }

    // -----------------------------------------------------------------------
    // HTTP helpers
    // -----------------------------------------------------------------------

    async fn send(state: AppState, request: Request<Body>) -> axum::response::Response {
        build_router(state).oneshot(request).await.unwrap()
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn milestone(week: usize) -> Value {
        json!({
            "week": week,
            "title": format!("Week {week}: Basics"),
            "description": "d",
            "topics_covered": ["t"],
            "learning_objectives": ["o"],
            "tasks": ["Read (1h)"],
            "estimated_hours": 5,
            "tips": ["tip"],
            "resources": ["r"]
        })
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn index_describes_the_api() {
        let resp = send(
            state(Arc::new(MemoryStore::new()), vec![]),
            Request::builder().uri("/").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            body_json(resp).await,
            json!({ "message": "AI Life Planner Agent API", "version": "1.0.0" })
        );
    }

    #[tokio::test]
    async fn health_reports_healthy() {
        let resp = send(
            state(Arc::new(MemoryStore::new()), vec![]),
            Request::builder().uri("/api/health").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "healthy");
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn health_fails_when_services_cannot_be_built() {
        // No model API key configured.
        let config = LifeplanConfig::resolve_from(None, None, |_| None).unwrap();
        let resp = send(
            AppState::new(config),
            Request::builder().uri("/api/health").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(resp).await;
        assert_eq!(json["type"], "error");
        assert!(json["error"].as_str().unwrap().contains("API key"));
    }

    #[tokio::test]
    async fn agent_creates_item() {
        let store = Arc::new(MemoryStore::new());
        let resp = send(
            state(
                store.clone(),
                vec![json!({
                    "intent": "create_item",
                    "type": "grocery",
                    "data": { "item_name": "Milk", "quantity": 2, "unit": "l" }
                })],
            ),
            post("/api/agent", json!({ "userInput": "add 2l milk", "userId": "u-1" })),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["type"], "creation_success");
        assert_eq!(json["message"], "Successfully created grocery: Milk");
        assert_eq!(store.rows(Collection::Groceries).len(), 1);
    }

    #[tokio::test]
    async fn agent_requires_user_id() {
        let resp = send(
            state(Arc::new(MemoryStore::new()), vec![]),
            post("/api/agent", json!({ "userInput": "hello" })),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["type"], "error");
    }

    #[tokio::test]
    async fn agent_rejects_invalid_json() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/agent")
            .body(Body::from("{not json"))
            .unwrap();
        let resp = send(state(Arc::new(MemoryStore::new()), vec![]), request).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(resp).await["error"],
            "Invalid JSON in request body."
        );
    }

    #[tokio::test]
    async fn unknown_intent_is_bad_request() {
        let resp = send(
            state(
                Arc::new(MemoryStore::new()),
                vec![json!({ "intent": "order_pizza" })],
            ),
            post("/api/agent", json!({ "userInput": "pizza", "userId": "u-1" })),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "unknown intent: order_pizza");
    }

    #[tokio::test]
    async fn extend_requires_user_header() {
        let resp = send(
            state(Arc::new(MemoryStore::new()), vec![]),
            post("/api/extend-learning-plan", json!({ "plan_id": "p-1" })),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn extend_requires_plan_id() {
        let mut request = post("/api/extend-learning-plan", json!({ "additional_weeks": 2 }));
        request
            .headers_mut()
            .insert("user-id", "u-1".parse().unwrap());
        let resp = send(state(Arc::new(MemoryStore::new()), vec![]), request).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn extend_unknown_plan_is_not_found() {
        let mut request = post(
            "/api/extend-learning-plan",
            json!({ "plan_id": "missing", "additional_weeks": 2 }),
        );
        request
            .headers_mut()
            .insert("user-id", "u-1".parse().unwrap());
        let resp = send(state(Arc::new(MemoryStore::new()), vec![]), request).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn extend_appends_default_four_weeks() {
        let store = Arc::new(MemoryStore::new());
        let rows = store.seed(
            Collection::LearningPlans,
            "u-1",
            vec![json!({
                "topic": "Rust",
                "duration_text": "4 weeks",
                "duration_months": 1,
                "weekly_milestones": (1..=4).map(milestone).collect::<Vec<_>>()
            })],
        );
        let plan_id = rows[0]["id"].as_str().unwrap().to_owned();

        let mut request = post("/api/extend-learning-plan", json!({ "plan_id": plan_id }));
        request
            .headers_mut()
            .insert("user-id", "u-1".parse().unwrap());
        let replies = vec![Value::Array((1..=4).map(milestone).collect())];
        let resp = send(state(store.clone(), replies), request).await;

        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["type"], "plan_extended");
        assert_eq!(json["new_weeks_added"], 4);
        assert_eq!(json["total_weeks"], 8);
        assert_eq!(json["duration_months"], 2);
        assert_eq!(
            store.rows(Collection::LearningPlans)[0]["weekly_milestones"][7]["title"],
            "Week 8: Basics"
        );
    }

    #[tokio::test]
    async fn enrich_names_missing_fields() {
        let resp = send(
            state(Arc::new(MemoryStore::new()), vec![]),
            post("/api/enrich-grocery-item", json!({ "item_name": "Oats" })),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(resp).await["error"],
            "missing required fields: quantity, unit, grocery_id, user_id"
        );
    }

    #[tokio::test]
    async fn enrich_without_nutrition_key_returns_item() {
        let store = Arc::new(MemoryStore::new());
        let rows = store.seed(
            Collection::Groceries,
            "u-1",
            vec![json!({ "item_name": "Oats", "quantity": 1, "unit": "kg" })],
        );
        let resp = send(
            state(store, vec![]),
            post(
                "/api/enrich-grocery-item",
                json!({
                    "item_name": "Oats",
                    "quantity": 1,
                    "unit": "kg",
                    "grocery_id": rows[0]["id"],
                    "user_id": "u-1"
                }),
            ),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["enriched"], false);
        assert_eq!(json["item"]["item_name"], "Oats");
    }
}
