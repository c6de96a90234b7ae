use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::sessions::{
        AnswerResponse, CreateSessionRequest, CreateSessionResponse, HostCommandRequest,
        JoinSessionRequest, JoinSessionResponse, PauseRequest, SelectCategoryRequest,
        SessionResponse, SubmitAnswerRequest, SubmitVoteRequest, SuccessResponse, TeamCommandRequest,
    },
    error::{AppError, ErrorBody},
    services::session_service,
    state::SharedState,
};

/// Routes carrying the host and team commands.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/join", post(join_session))
        .route("/sessions/{id}/start", post(start_session))
        .route("/sessions/{id}/advance", post(advance_phase))
        .route("/sessions/{id}/advance-if-expired", post(advance_if_expired))
        .route("/sessions/{id}/category", post(select_category))
        .route("/sessions/{id}/answers", post(submit_answer))
        .route("/sessions/{id}/votes", post(submit_vote))
        .route("/sessions/{id}/pause", post(pause_session))
        .route("/sessions/{id}/kick", post(kick_team))
        .route("/sessions/{id}/ban", post(ban_team))
        .route("/sessions/{id}/end", post(end_session))
}

/// Open a new session; the caller becomes its host.
#[utoipa::path(
    post,
    path = "/sessions",
    tag = "sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 200, description = "Session created", body = CreateSessionResponse),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 503, description = "Storage unavailable", body = ErrorBody)
    )
)]
pub async fn create_session(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateSessionRequest>>,
) -> Result<Json<CreateSessionResponse>, AppError> {
    let response = session_service::create_session(&state, payload).await?;
    Ok(Json(response))
}

/// Join a session by its code.
#[utoipa::path(
    post,
    path = "/sessions/join",
    tag = "sessions",
    request_body = JoinSessionRequest,
    responses(
        (status = 200, description = "Team joined", body = JoinSessionResponse),
        (status = 403, description = "Team is banned", body = ErrorBody),
        (status = 404, description = "Unknown code", body = ErrorBody),
        (status = 409, description = "Team name taken", body = ErrorBody),
        (status = 429, description = "Room full", body = ErrorBody)
    )
)]
pub async fn join_session(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<JoinSessionRequest>>,
) -> Result<Json<JoinSessionResponse>, AppError> {
    let response = session_service::join_session(&state, payload).await?;
    Ok(Json(response))
}

/// Leave the lobby and open the first round.
#[utoipa::path(
    post,
    path = "/sessions/{id}/start",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = HostCommandRequest,
    responses(
        (status = 200, description = "Session started", body = SessionResponse),
        (status = 403, description = "Caller is not the host", body = ErrorBody),
        (status = 412, description = "Not in the lobby or too few teams", body = ErrorBody)
    )
)]
pub async fn start_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<HostCommandRequest>>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = session_service::start_session(&state, id, payload.host_id).await?;
    Ok(Json(SessionResponse { session }))
}

/// Force the next phase.
#[utoipa::path(
    post,
    path = "/sessions/{id}/advance",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = HostCommandRequest,
    responses(
        (status = 200, description = "Phase advanced", body = SessionResponse),
        (status = 403, description = "Caller is not the host", body = ErrorBody),
        (status = 412, description = "Phase cannot be advanced", body = ErrorBody)
    )
)]
pub async fn advance_phase(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<HostCommandRequest>>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = session_service::advance_phase(&state, id, payload.host_id).await?;
    Ok(Json(SessionResponse { session }))
}

/// Advance if the phase deadline has passed; otherwise return the session unchanged.
#[utoipa::path(
    post,
    path = "/sessions/{id}/advance-if-expired",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Current session", body = SessionResponse),
        (status = 404, description = "Unknown session", body = ErrorBody)
    )
)]
pub async fn advance_if_expired(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = session_service::advance_if_expired(&state, id).await?;
    Ok(Json(SessionResponse { session }))
}

/// Pick the prompt library and open the first round.
#[utoipa::path(
    post,
    path = "/sessions/{id}/category",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = SelectCategoryRequest,
    responses(
        (status = 200, description = "Category picked, round opened", body = SessionResponse),
        (status = 403, description = "Caller is not the host", body = ErrorBody),
        (status = 404, description = "Unknown prompt library", body = ErrorBody),
        (status = 412, description = "Not selecting a category", body = ErrorBody)
    )
)]
pub async fn select_category(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<SelectCategoryRequest>>,
) -> Result<Json<SessionResponse>, AppError> {
    let session =
        session_service::select_category(&state, id, payload.host_id, payload.prompt_library_id)
            .await?;
    Ok(Json(SessionResponse { session }))
}

/// Submit or replace the caller's answer for the current round.
#[utoipa::path(
    post,
    path = "/sessions/{id}/answers",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = SubmitAnswerRequest,
    responses(
        (status = 200, description = "Answer accepted", body = AnswerResponse),
        (status = 408, description = "Answer window closed", body = ErrorBody),
        (status = 412, description = "Not accepting answers", body = ErrorBody)
    )
)]
pub async fn submit_answer(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<SubmitAnswerRequest>>,
) -> Result<Json<AnswerResponse>, AppError> {
    let response =
        session_service::submit_answer(&state, id, payload.team_id, payload.text).await?;
    Ok(Json(response))
}

/// Vote for an answer of the group currently voting.
#[utoipa::path(
    post,
    path = "/sessions/{id}/votes",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = SubmitVoteRequest,
    responses(
        (status = 200, description = "Vote accepted", body = SuccessResponse),
        (status = 404, description = "Unknown answer", body = ErrorBody),
        (status = 408, description = "Vote window closed", body = ErrorBody),
        (status = 412, description = "Wrong phase, wrong group or self-vote", body = ErrorBody)
    )
)]
pub async fn submit_vote(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<SubmitVoteRequest>>,
) -> Result<Json<SuccessResponse>, AppError> {
    session_service::submit_vote(&state, id, payload.team_id, payload.answer_id).await?;
    Ok(Json(SuccessResponse::ok()))
}

/// Freeze or resume the session clock.
#[utoipa::path(
    post,
    path = "/sessions/{id}/pause",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = PauseRequest,
    responses(
        (status = 200, description = "Pause state applied", body = SessionResponse),
        (status = 403, description = "Caller is not the host", body = ErrorBody)
    )
)]
pub async fn pause_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<PauseRequest>>,
) -> Result<Json<SessionResponse>, AppError> {
    let session =
        session_service::pause_session(&state, id, payload.host_id, payload.pause).await?;
    Ok(Json(SessionResponse { session }))
}

/// Remove a team from the session.
#[utoipa::path(
    post,
    path = "/sessions/{id}/kick",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = TeamCommandRequest,
    responses(
        (status = 200, description = "Team removed", body = SuccessResponse),
        (status = 403, description = "Caller is not the host", body = ErrorBody),
        (status = 412, description = "The host cannot be removed", body = ErrorBody)
    )
)]
pub async fn kick_team(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<TeamCommandRequest>>,
) -> Result<Json<SuccessResponse>, AppError> {
    session_service::remove_team(&state, id, payload.host_id, payload.team_id, false).await?;
    Ok(Json(SuccessResponse::ok()))
}

/// Remove a team and block it from joining again.
#[utoipa::path(
    post,
    path = "/sessions/{id}/ban",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = TeamCommandRequest,
    responses(
        (status = 200, description = "Team banned", body = SuccessResponse),
        (status = 403, description = "Caller is not the host", body = ErrorBody),
        (status = 412, description = "The host cannot be removed", body = ErrorBody)
    )
)]
pub async fn ban_team(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<TeamCommandRequest>>,
) -> Result<Json<SuccessResponse>, AppError> {
    session_service::remove_team(&state, id, payload.host_id, payload.team_id, true).await?;
    Ok(Json(SuccessResponse::ok()))
}

/// End the session.
#[utoipa::path(
    post,
    path = "/sessions/{id}/end",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = HostCommandRequest,
    responses(
        (status = 200, description = "Session ended", body = SessionResponse),
        (status = 403, description = "Caller is not the host", body = ErrorBody)
    )
)]
pub async fn end_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<HostCommandRequest>>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = session_service::end_session(&state, id, payload.host_id).await?;
    Ok(Json(SessionResponse { session }))
}
