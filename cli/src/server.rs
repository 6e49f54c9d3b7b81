use std::sync::{Arc, Mutex};

use anyhow::Context;
use axum::{
    Extension, Json, Router,
    extract::{Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, error, info};

use dietsync_core::db::Database;
use dietsync_core::models::{SyncKey, SyncValue, validate_value};

const BODY_LIMIT: usize = 5 * 1024 * 1024; // 5 MB

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) db: Arc<Mutex<Database>>,
}

/// The user a request's bearer token belongs to.
#[derive(Clone)]
struct AuthUser(String);

// --- Request / Response types ---

#[derive(Deserialize)]
struct SyncQuery {
    key: Option<String>,
}

fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Deserialize)]
struct PutRequest {
    key: Option<String>,
    /// `None` when absent; an explicit `null` arrives as `Some(Value::Null)`.
    #[serde(default, deserialize_with = "deserialize_some")]
    data: Option<Value>,
}

#[derive(Serialize)]
struct GetResponse {
    data: Option<Value>,
}

#[derive(Serialize)]
struct PutResponse {
    success: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WhoamiResponse {
    user_id: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    Unauthorized,
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Invalid or missing token".to_string(),
            ),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(err) => {
                error!("Internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

fn parse_key(raw: Option<&str>) -> Result<SyncKey, ApiError> {
    let raw = raw.ok_or_else(|| ApiError::BadRequest("Missing key".to_string()))?;
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("{e}")))
}

// --- Middleware ---

async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);

    let Some(token) = token else {
        return ApiError::Unauthorized.into_response();
    };

    let user = {
        let db = state
            .db
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        db.user_for_token(&token)
    };

    match user {
        Ok(Some(user_id)) => {
            request.extensions_mut().insert(AuthUser(user_id));
            next.run(request).await
        }
        Ok(None) => ApiError::Unauthorized.into_response(),
        Err(e) => ApiError::Internal(e.context("token lookup failed")).into_response(),
    }
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Handlers ---

async fn get_value(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(params): Query<SyncQuery>,
) -> Result<Json<GetResponse>, ApiError> {
    let key = parse_key(params.key.as_deref())?;
    let data = {
        let db = state
            .db
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        db.get_value(&user_id, key).context("database error")?
    };
    debug!(user = %user_id, %key, found = data.is_some(), "get");
    Ok(Json(GetResponse { data }))
}

async fn put_value(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<PutRequest>,
) -> Result<Json<PutResponse>, ApiError> {
    let key = parse_key(req.key.as_deref())?;
    let data = req
        .data
        .ok_or_else(|| ApiError::BadRequest("Missing data".to_string()))?;

    let value = SyncValue::from_json(key, data)
        .map_err(|e| ApiError::BadRequest(format!("Invalid {key}: {e}")))?;
    validate_value(&value).map_err(|e| ApiError::BadRequest(format!("{e}")))?;
    let stored = value.to_json().context("failed to encode value")?;

    {
        let db = state
            .db
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        db.put_value(&user_id, key, &stored)
            .context("database error")?;
    }
    debug!(user = %user_id, %key, "put");
    Ok(Json(PutResponse { success: true }))
}

/// The user id the presented token was issued for.
async fn whoami(Extension(AuthUser(user_id)): Extension<AuthUser>) -> Json<WhoamiResponse> {
    Json(WhoamiResponse { user_id })
}

// --- Router builder ---

pub(crate) fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/sync", get(get_value).post(put_value))
        .route("/api/whoami", get(whoami))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(db: Database, port: u16, bind: &str) -> anyhow::Result<()> {
    let users = db.list_tokens()?.len();
    let state = AppState {
        db: Arc::new(Mutex::new(db)),
    };

    let app = build_router(state);

    if users == 0 {
        eprintln!("Warning: no tokens issued yet. Run `dietsync user add <user-id>` to create one.");
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    eprintln!("Listening on http://{bind}:{port}");
    info!("serving /api/sync for {users} token(s)");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    Ok(())
}
