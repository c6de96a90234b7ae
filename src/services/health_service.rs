use tokio::time::timeout;
use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Respond with a static health payload while logging connectivity issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.session_store().await {
        Some(store) => match timeout(state.transaction_timeout(), store.health_check()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(error = %err, "storage health check failed"),
            Err(_) => warn!("storage health check timed out"),
        },
        None => warn!("storage unavailable (degraded mode)"),
    }

    if state.is_degraded() {
        HealthResponse::degraded()
    } else {
        HealthResponse::ok()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{config::AppConfig, dao::session_store::memory::MemorySessionStore, state::AppState};

    #[tokio::test]
    async fn reports_degraded_until_a_store_is_installed() {
        let state = AppState::new(AppConfig::default());
        assert_eq!(health_status(&state).await.status, "degraded");

        state
            .install_session_store(Arc::new(MemorySessionStore::new()))
            .await;
        assert_eq!(health_status(&state).await.status, "ok");
    }
}
