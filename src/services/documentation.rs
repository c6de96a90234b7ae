use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Punchline Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::session_stream,
        crate::routes::sessions::create_session,
        crate::routes::sessions::join_session,
        crate::routes::sessions::start_session,
        crate::routes::sessions::advance_phase,
        crate::routes::sessions::advance_if_expired,
        crate::routes::sessions::select_category,
        crate::routes::sessions::submit_answer,
        crate::routes::sessions::submit_vote,
        crate::routes::sessions::pause_session,
        crate::routes::sessions::kick_team,
        crate::routes::sessions::ban_team,
        crate::routes::sessions::end_session,
        crate::routes::public::get_session,
        crate::routes::public::get_leaderboard,
        crate::routes::public::get_team_standing,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::sessions::CreateSessionRequest,
            crate::dto::sessions::JoinSessionRequest,
            crate::dto::sessions::HostCommandRequest,
            crate::dto::sessions::PauseRequest,
            crate::dto::sessions::SelectCategoryRequest,
            crate::dto::sessions::TeamCommandRequest,
            crate::dto::sessions::SubmitAnswerRequest,
            crate::dto::sessions::SubmitVoteRequest,
            crate::dto::sessions::CreateSessionResponse,
            crate::dto::sessions::JoinSessionResponse,
            crate::dto::sessions::SessionResponse,
            crate::dto::sessions::SuccessResponse,
            crate::dto::sessions::AnswerResponse,
            crate::dto::sessions::SessionSnapshot,
            crate::dto::leaderboard::LeaderboardResponse,
            crate::dto::leaderboard::TeamStandingResponse,
            crate::dto::sse::Handshake,
            crate::dto::sse::PhaseChangedEvent,
            crate::dto::sse::SystemStatus,
            crate::error::ErrorBody,
            crate::state::state_machine::Phase,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "sessions", description = "Host and team commands"),
        (name = "public", description = "Read-only session projections"),
    )
)]
pub struct ApiDoc;
