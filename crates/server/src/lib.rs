use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use server_api::ApiContext;
use shared::{
    domain::{AgentId, CommentId, LeadId, TagId},
    error::{ApiError, ErrorCode},
    protocol::{
        AgentDraft, AgentPatch, AgentPayload, AgentsPayload, CommentDraft, CommentPatch,
        CommentsEnvelope, DataEnvelope, LeadDraft, LeadPatch, LeadPayload, LeadsPayload,
        MessageResponse, TagDraft, TagPatch, TagPayload, TagsPayload,
    },
};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, warn};

pub mod config;

type HttpError = (StatusCode, Json<ApiError>);

pub struct AppState {
    pub api: ApiContext,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(api: ApiContext) -> Self {
        Self {
            api,
            max_body_bytes: config::Settings::default().max_body_bytes,
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = RequestBodyLimitLayer::new(state.max_body_bytes);
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/leads", get(http_list_leads).post(http_create_lead))
        .route(
            "/api/leads/:id",
            get(http_get_lead).put(http_update_lead).delete(http_delete_lead),
        )
        .route(
            "/api/leads/:id/comments",
            get(http_list_comments).post(http_add_comment),
        )
        .route(
            "/api/leads/:id/comments/:comment_id",
            get(http_get_comment)
                .put(http_update_comment)
                .delete(http_delete_comment),
        )
        .route("/api/agents", get(http_list_agents).post(http_create_agent))
        .route(
            "/api/agents/:id",
            get(http_get_agent)
                .put(http_update_agent)
                .delete(http_delete_agent),
        )
        .route("/api/tags", get(http_list_tags).post(http_create_tag))
        .route(
            "/api/tags/:id",
            get(http_get_tag).put(http_update_tag).delete(http_delete_tag),
        )
        .route("/api/reports", get(http_report))
        .layer(body_limit)
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

fn into_http(err: ApiError) -> HttpError {
    let status = match err.code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(message = %err.message, "request failed");
    } else {
        warn!(status = status.as_u16(), message = %err.message, "request rejected");
    }
    (status, Json(err))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, HttpError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| into_http(ApiError::validation(rejection.body_text())))
}

fn deleted(what: &str) -> Json<MessageResponse> {
    Json(MessageResponse::new(format!("{what} deleted successfully")))
}

async fn http_list_leads(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DataEnvelope<LeadsPayload>>, HttpError> {
    let leads = server_api::list_leads(&state.api).await.map_err(into_http)?;
    Ok(Json(DataEnvelope::new(LeadsPayload { leads })))
}

async fn http_get_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataEnvelope<LeadPayload>>, HttpError> {
    let lead = server_api::get_lead(&state.api, &LeadId::new(id))
        .await
        .map_err(into_http)?;
    Ok(Json(DataEnvelope::new(LeadPayload { lead })))
}

async fn http_create_lead(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LeadDraft>, JsonRejection>,
) -> Result<impl IntoResponse, HttpError> {
    let lead = server_api::create_lead(&state.api, body(payload)?)
        .await
        .map_err(into_http)?;
    Ok((
        StatusCode::CREATED,
        Json(DataEnvelope::new(LeadPayload { lead })),
    ))
}

async fn http_update_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<LeadPatch>, JsonRejection>,
) -> Result<Json<DataEnvelope<LeadPayload>>, HttpError> {
    let lead = server_api::update_lead(&state.api, &LeadId::new(id), body(payload)?)
        .await
        .map_err(into_http)?;
    Ok(Json(DataEnvelope::new(LeadPayload { lead })))
}

async fn http_delete_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, HttpError> {
    server_api::delete_lead(&state.api, &LeadId::new(id))
        .await
        .map_err(into_http)?;
    Ok(deleted("Lead"))
}

async fn http_list_comments(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CommentsEnvelope>, HttpError> {
    let comments = server_api::list_comments(&state.api, &LeadId::new(id))
        .await
        .map_err(into_http)?;
    Ok(Json(CommentsEnvelope { comments }))
}

async fn http_add_comment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<CommentDraft>, JsonRejection>,
) -> Result<impl IntoResponse, HttpError> {
    let comment = server_api::add_comment(&state.api, &LeadId::new(id), body(payload)?)
        .await
        .map_err(into_http)?;
    Ok((StatusCode::CREATED, Json(DataEnvelope::new(comment))))
}

async fn http_get_comment(
    State(state): State<Arc<AppState>>,
    Path((id, comment_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, HttpError> {
    let comment =
        server_api::get_comment(&state.api, &LeadId::new(id), &CommentId::new(comment_id))
            .await
            .map_err(into_http)?;
    Ok(Json(DataEnvelope::new(comment)))
}

async fn http_update_comment(
    State(state): State<Arc<AppState>>,
    Path((id, comment_id)): Path<(String, String)>,
    payload: Result<Json<CommentPatch>, JsonRejection>,
) -> Result<impl IntoResponse, HttpError> {
    let comment = server_api::update_comment(
        &state.api,
        &LeadId::new(id),
        &CommentId::new(comment_id),
        body(payload)?,
    )
    .await
    .map_err(into_http)?;
    Ok(Json(DataEnvelope::new(comment)))
}

async fn http_delete_comment(
    State(state): State<Arc<AppState>>,
    Path((id, comment_id)): Path<(String, String)>,
) -> Result<Json<MessageResponse>, HttpError> {
    server_api::delete_comment(&state.api, &LeadId::new(id), &CommentId::new(comment_id))
        .await
        .map_err(into_http)?;
    Ok(deleted("Comment"))
}

async fn http_list_agents(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DataEnvelope<AgentsPayload>>, HttpError> {
    let agents = server_api::list_agents(&state.api)
        .await
        .map_err(into_http)?;
    Ok(Json(DataEnvelope::new(AgentsPayload { agents })))
}

async fn http_get_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataEnvelope<AgentPayload>>, HttpError> {
    let agent = server_api::get_agent(&state.api, &AgentId::new(id))
        .await
        .map_err(into_http)?;
    Ok(Json(DataEnvelope::new(AgentPayload { agent })))
}

async fn http_create_agent(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AgentDraft>, JsonRejection>,
) -> Result<impl IntoResponse, HttpError> {
    let agent = server_api::create_agent(&state.api, body(payload)?)
        .await
        .map_err(into_http)?;
    Ok((
        StatusCode::CREATED,
        Json(DataEnvelope::new(AgentPayload { agent })),
    ))
}

async fn http_update_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<AgentPatch>, JsonRejection>,
) -> Result<Json<DataEnvelope<AgentPayload>>, HttpError> {
    let agent = server_api::update_agent(&state.api, &AgentId::new(id), body(payload)?)
        .await
        .map_err(into_http)?;
    Ok(Json(DataEnvelope::new(AgentPayload { agent })))
}

async fn http_delete_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, HttpError> {
    server_api::delete_agent(&state.api, &AgentId::new(id))
        .await
        .map_err(into_http)?;
    Ok(deleted("Agent"))
}

async fn http_list_tags(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DataEnvelope<TagsPayload>>, HttpError> {
    let tags = server_api::list_tags(&state.api).await.map_err(into_http)?;
    Ok(Json(DataEnvelope::new(TagsPayload { tags })))
}

async fn http_get_tag(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataEnvelope<TagPayload>>, HttpError> {
    let tag = server_api::get_tag(&state.api, &TagId::new(id))
        .await
        .map_err(into_http)?;
    Ok(Json(DataEnvelope::new(TagPayload { tag })))
}

async fn http_create_tag(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TagDraft>, JsonRejection>,
) -> Result<impl IntoResponse, HttpError> {
    let tag = server_api::create_tag(&state.api, body(payload)?)
        .await
        .map_err(into_http)?;
    Ok((StatusCode::CREATED, Json(DataEnvelope::new(TagPayload { tag }))))
}

async fn http_update_tag(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<TagPatch>, JsonRejection>,
) -> Result<Json<DataEnvelope<TagPayload>>, HttpError> {
    let tag = server_api::update_tag(&state.api, &TagId::new(id), body(payload)?)
        .await
        .map_err(into_http)?;
    Ok(Json(DataEnvelope::new(TagPayload { tag })))
}

async fn http_delete_tag(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, HttpError> {
    server_api::delete_tag(&state.api, &TagId::new(id))
        .await
        .map_err(into_http)?;
    Ok(deleted("Tag"))
}

async fn http_report(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    let report = server_api::report(&state.api).await.map_err(into_http)?;
    Ok(Json(DataEnvelope::new(report)))
}

#[cfg(test)]
#[path = "tests/router_tests.rs"]
mod tests;
