use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::{
        leaderboard::{LeaderboardQuery, LeaderboardResponse, TeamStandingResponse},
        sessions::SessionSnapshot,
    },
    error::{AppError, ErrorBody},
    services::public_service,
    state::SharedState,
};

/// Read-only projections of a session.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/leaderboard", get(get_leaderboard))
        .route("/sessions/{id}/leaderboard/{team_id}", get(get_team_standing))
}

/// Current state of a session.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    tag = "public",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session snapshot", body = SessionSnapshot),
        (status = 404, description = "Unknown session", body = ErrorBody)
    )
)]
pub async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(public_service::get_session(&state, id).await?))
}

/// Ranked teams.
#[utoipa::path(
    get,
    path = "/sessions/{id}/leaderboard",
    tag = "public",
    params(("id" = Uuid, Path, description = "Session identifier"), LeaderboardQuery),
    responses(
        (status = 200, description = "Leaderboard", body = LeaderboardResponse),
        (status = 404, description = "Unknown session", body = ErrorBody)
    )
)]
pub async fn get_leaderboard(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Query(query)): Valid<Query<LeaderboardQuery>>,
) -> Result<Json<LeaderboardResponse>, AppError> {
    Ok(Json(public_service::leaderboard(&state, id, query.top).await?))
}

/// Standing of one team.
#[utoipa::path(
    get,
    path = "/sessions/{id}/leaderboard/{team_id}",
    tag = "public",
    params(
        ("id" = Uuid, Path, description = "Session identifier"),
        ("team_id" = String, Path, description = "Team identity")
    ),
    responses(
        (status = 200, description = "Team standing", body = TeamStandingResponse),
        (status = 404, description = "Unknown session or team", body = ErrorBody)
    )
)]
pub async fn get_team_standing(
    State(state): State<SharedState>,
    Path((id, team_id)): Path<(Uuid, String)>,
) -> Result<Json<TeamStandingResponse>, AppError> {
    Ok(Json(public_service::team_standing(&state, id, &team_id).await?))
}
