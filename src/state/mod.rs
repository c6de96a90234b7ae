//! Session engine and the shared application state.

pub mod auto_advance;
pub mod commands;
pub mod leaderboard;
pub mod round_manager;
pub mod scoring;
pub mod session;
mod sse;
pub mod state_machine;
pub mod transitions;

use std::{sync::Arc, time::Duration};

use tokio::sync::{RwLock, watch};

use crate::{config::AppConfig, dao::session_store::SessionStore};

pub use self::sse::SseHub;

/// Cheaply clonable handle shared by every handler.
pub type SharedState = Arc<AppState>;
/// Upper bound for a single store call made by the transaction gateway.
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(5);

const SSE_CAPACITY: usize = 64;

/// Central application state: the installed session store, the change feed and the configuration.
pub struct AppState {
    session_store: RwLock<Option<Arc<dyn SessionStore>>>,
    sse: SseHub,
    degraded: watch::Sender<bool>,
    config: Arc<AppConfig>,
    transaction_timeout: Duration,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            session_store: RwLock::new(None),
            sse: SseHub::new(SSE_CAPACITY),
            degraded: degraded_tx,
            config: Arc::new(config),
            transaction_timeout: DEFAULT_TRANSACTION_TIMEOUT,
        })
    }

    /// Build a state with `store` already installed.
    pub async fn with_store(config: AppConfig, store: Arc<dyn SessionStore>) -> SharedState {
        let state = Self::new(config);
        state.install_session_store(store).await;
        state
    }

    /// Obtain a handle to the current session store, if one is installed.
    pub async fn session_store(&self) -> Option<Arc<dyn SessionStore>> {
        let guard = self.session_store.read().await;
        guard.as_ref().cloned()
    }

    /// Install a new session store implementation and leave degraded mode.
    pub async fn install_session_store(&self, store: Arc<dyn SessionStore>) {
        {
            let mut guard = self.session_store.write().await;
            *guard = Some(store);
        }
        self.set_degraded(false);
    }

    /// Remove the current session store and enter degraded mode.
    pub async fn clear_session_store(&self) {
        {
            let mut guard = self.session_store.write().await;
            guard.take();
        }
        self.set_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Broadcast hub feeding the session change stream.
    pub fn sse(&self) -> &SseHub {
        &self.sse
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Timeout applied to every store call.
    pub fn transaction_timeout(&self) -> Duration {
        self.transaction_timeout
    }

    /// Update and broadcast the degraded flag; returns whether it changed.
    pub fn set_degraded(&self, value: bool) -> bool {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::session_store::memory::MemorySessionStore;

    #[tokio::test]
    async fn installing_a_store_leaves_degraded_mode() {
        let state = AppState::new(AppConfig::default());
        let mut watcher = state.degraded_watcher();
        assert!(state.is_degraded());
        assert!(*watcher.borrow_and_update());

        state
            .install_session_store(Arc::new(MemorySessionStore::new()))
            .await;
        assert!(!state.is_degraded());
        assert!(watcher.has_changed().unwrap());
        assert!(!*watcher.borrow_and_update());

        state.clear_session_store().await;
        assert!(state.session_store().await.is_none());
        assert!(*watcher.borrow_and_update());
    }

    #[test]
    fn set_degraded_reports_only_real_changes() {
        let state = AppState::new(AppConfig::default());
        assert!(!state.set_degraded(true));
        assert!(state.set_degraded(false));
        assert!(!state.is_degraded());
        assert!(!state.set_degraded(false));
        assert!(state.set_degraded(true));
        assert!(state.is_degraded());
    }
}
