// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use crate::application::association_bridge::AssociationBridge;
use crate::application::authentication_service::AuthenticationService;
use crate::application::tool_invocation_service::{RouteRequest, ToolCall, ToolInvocationService};
use crate::domain::association::ConnectionId;
use crate::domain::errors::GatewayError;
use crate::domain::session::SessionId;

/// Header carrying the protocol connection identifier.
pub const CONNECTION_HEADER: &str = "mcp-session-id";

pub struct AppState {
    pub auth: Arc<AuthenticationService>,
    pub tools: Arc<ToolInvocationService>,
    pub bridge: Arc<AssociationBridge>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/auth/login", get(login))
        .route("/auth/callback", get(callback))
        .route("/auth/logout", post(logout))
        .route("/auth/status", get(status))
        .route("/mcp/tools", get(list_tools))
        .route("/mcp/tools/call", post(call_tool))
        .route("/mcp/route", post(route_request))
        .route("/mcp/request", post(handle_request))
        .route("/mcp/connection", delete(close_connection))
        .with_state(Arc::new(state))
}

/// [`GatewayError`] rendered as `{"error": {code, message, details}}`.
pub struct ApiError(GatewayError);

impl From<GatewayError> for ApiError {
    fn from(value: GatewayError) -> Self {
        Self(value)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        Self(GatewayError::Infrastructure(value))
    }
}

fn status_for(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::AuthenticationRequired { .. }
        | GatewayError::SessionExpired { .. }
        | GatewayError::ValidationError { .. } => StatusCode::UNAUTHORIZED,
        GatewayError::InsufficientScope { .. } => StatusCode::FORBIDDEN,
        GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        GatewayError::UnknownTool(_) => StatusCode::NOT_FOUND,
        GatewayError::RoutingAmbiguous { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        GatewayError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        GatewayError::WorkflowStepFailed { .. } => StatusCode::BAD_GATEWAY,
        GatewayError::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let message = match &self.0 {
            GatewayError::Infrastructure(e) => {
                error!("Internal error: {:#}", e);
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        let body = json!({
            "error": {
                "code": self.0.code(),
                "message": message,
                "details": self.0.details(),
            }
        });
        (status, Json(body)).into_response()
    }
}

fn connection_id(headers: &HeaderMap) -> Option<ConnectionId> {
    headers
        .get(CONNECTION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ConnectionId::from)
}

#[derive(Debug, Deserialize)]
struct LoginQuery {
    #[serde(default)]
    connection_id: Option<String>,
}

async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<LoginQuery>,
) -> Result<Response, ApiError> {
    let connection = query
        .connection_id
        .as_deref()
        .map(ConnectionId::from)
        .or_else(|| connection_id(&headers));
    let challenge = state.auth.begin_login(connection).await?;
    Ok((StatusCode::FOUND, [(header::LOCATION, challenge.authorization_url)]).into_response())
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

async fn callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<Value>, ApiError> {
    if let Some(error) = query.error {
        let detail = query.error_description.unwrap_or_default();
        return Err(GatewayError::InvalidRequest(format!("identity provider returned {error}: {detail}")).into());
    }
    let (Some(code), Some(login_state)) = (query.code, query.state) else {
        return Err(GatewayError::InvalidRequest("callback requires code and state".to_string()).into());
    };

    let result = state.auth.complete_login(&login_state, &code).await?;
    Ok(Json(json!(result)))
}

#[derive(Debug, Deserialize)]
struct LogoutRequest {
    session_id: String,
}

async fn logout(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LogoutRequest>,
) -> Result<Json<Value>, ApiError> {
    let logged_out = state.auth.logout(&SessionId::from(body.session_id.as_str())).await?;
    Ok(Json(json!({ "logged_out": logged_out })))
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    #[serde(default)]
    session_id: Option<String>,
}

async fn status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<StatusQuery>,
) -> Result<Json<Value>, ApiError> {
    let connection = connection_id(&headers);
    let session_id = match query.session_id {
        Some(id) => Some(SessionId::from(id.as_str())),
        None => match &connection {
            Some(conn) => state.bridge.resolve(conn).await?,
            None => None,
        },
    };
    let auth_state = state.auth.status(connection.as_ref(), session_id.as_ref()).await?;
    Ok(Json(json!(auth_state)))
}

async fn list_tools(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "tools": state.tools.list_tools() }))
}

#[derive(Debug, Deserialize)]
struct ToolCallBody {
    name: String,
    #[serde(default)]
    arguments: Value,
}

async fn call_tool(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ToolCallBody>,
) -> Result<Json<Value>, ApiError> {
    let response = state
        .tools
        .invoke(ToolCall {
            name: body.name,
            arguments: body.arguments,
            connection_id: connection_id(&headers),
        })
        .await?;
    Ok(Json(json!(response)))
}

#[derive(Debug, Deserialize)]
struct RouteBody {
    request: String,
    #[serde(default)]
    arguments: Value,
}

async fn route_request(State(state): State<Arc<AppState>>, Json(body): Json<RouteBody>) -> Json<Value> {
    Json(json!(state.tools.route(&body.request, &body.arguments)))
}

async fn handle_request(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<RouteBody>,
) -> Result<Json<Value>, ApiError> {
    let response = state
        .tools
        .route_and_invoke(RouteRequest {
            request: body.request,
            arguments: body.arguments,
            connection_id: connection_id(&headers),
        })
        .await?;
    Ok(Json(json!(response)))
}

async fn close_connection(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Json<Value>, ApiError> {
    let Some(connection) = connection_id(&headers) else {
        return Err(GatewayError::InvalidRequest(format!("missing {CONNECTION_HEADER} header")).into());
    };
    let closed = state.auth.close_connection(&connection).await?;
    Ok(Json(json!({ "closed": closed.is_some() })))
}
