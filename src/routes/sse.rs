use std::convert::Infallible;

use axum::{
    Router,
    extract::{Query, State},
    response::sse::Sse,
    routing::get,
};
use futures::Stream;
use tracing::info;

use crate::{dto::sse::SessionStreamQuery, services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/sse/sessions",
    tag = "sse",
    params(SessionStreamQuery),
    responses((status = 200, description = "Session change feed", content_type = "text/event-stream", body = String))
)]
/// Stream `session.updated` and `phase.changed` events, optionally for one session.
pub async fn session_stream(
    State(state): State<SharedState>,
    Query(query): Query<SessionStreamQuery>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    let receiver = sse_service::subscribe(&state);
    info!(session_id = ?query.session_id, "New session SSE connection");
    let greeting = sse_service::handshake(&state, query.session_id);
    sse_service::to_sse_stream(receiver, query.session_id, greeting)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/sessions", get(session_stream))
}
