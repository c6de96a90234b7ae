//! Application-level configuration loading: session defaults, moderation and prompt libraries.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{info, warn};

use crate::{services::gateway::RetryPolicy, state::session::SessionSettings};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "PUNCHLINE_BACK_CONFIG_PATH";

const DEFAULT_ANSWER_MAX_CHARS: usize = 120;
const DEFAULT_TEAM_NAME_MAX_CHARS: usize = 24;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    session: SessionSettings,
    answer_max_chars: usize,
    team_name_max_chars: usize,
    blocked_words: Vec<String>,
    prompt_libraries: IndexMap<String, Vec<String>>,
    default_prompts: Vec<String>,
    retry: RetryPolicy,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        libraries = app_config.prompt_libraries.len(),
                        blocked_words = app_config.blocked_words.len(),
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Settings applied to newly created sessions.
    pub fn session_defaults(&self) -> &SessionSettings {
        &self.session
    }

    /// Maximum answer length, in characters.
    pub fn answer_max_chars(&self) -> usize {
        self.answer_max_chars
    }

    /// Maximum team name length, in characters.
    pub fn team_name_max_chars(&self) -> usize {
        self.team_name_max_chars
    }

    /// Words masked by the moderation step.
    pub fn blocked_words(&self) -> &[String] {
        &self.blocked_words
    }

    /// Prompts of `library_id`, or the default prompts when the library is unknown.
    pub fn prompts_for(&self, library_id: Option<&str>) -> &[String] {
        library_id
            .and_then(|id| self.prompt_libraries.get(id))
            .filter(|prompts| !prompts.is_empty())
            .unwrap_or(&self.default_prompts)
    }

    /// Whether `library_id` names a configured library.
    pub fn has_library(&self, library_id: &str) -> bool {
        self.prompt_libraries.contains_key(library_id)
    }

    /// Retry policy of the transaction gateway.
    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the session defaults.
    pub fn with_session_defaults(mut self, session: SessionSettings) -> Self {
        self.session = session;
        self
    }

    /// Add or replace a prompt library.
    pub fn with_prompt_library(mut self, library_id: impl Into<String>, prompts: Vec<String>) -> Self {
        self.prompt_libraries.insert(library_id.into(), prompts);
        self
    }

    /// Replace the moderation word list.
    pub fn with_blocked_words(mut self, words: Vec<String>) -> Self {
        self.blocked_words = words;
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            session: default_session(),
            answer_max_chars: DEFAULT_ANSWER_MAX_CHARS,
            team_name_max_chars: DEFAULT_TEAM_NAME_MAX_CHARS,
            blocked_words: Vec::new(),
            prompt_libraries: IndexMap::new(),
            default_prompts: default_prompts(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    session: RawSession,
    answer_max_chars: Option<usize>,
    team_name_max_chars: Option<usize>,
    blocked_words: Vec<String>,
    prompt_libraries: IndexMap<String, Vec<String>>,
    default_prompts: Vec<String>,
    retry: RawRetry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// Session defaults; omitted keys keep the built-in value.
struct RawSession {
    answer_duration_ms: Option<u64>,
    vote_duration_ms: Option<u64>,
    results_duration_ms: Option<u64>,
    max_teams: Option<usize>,
    group_size: Option<usize>,
    total_rounds: Option<u32>,
    category_select: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRetry {
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = default_session();
        let session = SessionSettings {
            answer_duration_ms: value
                .session
                .answer_duration_ms
                .unwrap_or(defaults.answer_duration_ms),
            vote_duration_ms: value
                .session
                .vote_duration_ms
                .unwrap_or(defaults.vote_duration_ms),
            results_duration_ms: value
                .session
                .results_duration_ms
                .unwrap_or(defaults.results_duration_ms),
            max_teams: value.session.max_teams.unwrap_or(defaults.max_teams),
            group_size: value
                .session
                .group_size
                .filter(|size| *size > 0)
                .unwrap_or(defaults.group_size),
            total_rounds: value
                .session
                .total_rounds
                .filter(|rounds| *rounds > 0)
                .unwrap_or(defaults.total_rounds),
            category_select: value
                .session
                .category_select
                .unwrap_or(defaults.category_select),
        };

        let retry_defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: value
                .retry
                .max_attempts
                .filter(|attempts| *attempts > 0)
                .unwrap_or(retry_defaults.max_attempts),
            base_delay: value
                .retry
                .base_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(retry_defaults.base_delay),
            ..retry_defaults
        };

        let default_prompts = if value.default_prompts.is_empty() {
            default_prompts()
        } else {
            value.default_prompts
        };

        Self {
            session,
            answer_max_chars: value
                .answer_max_chars
                .unwrap_or(DEFAULT_ANSWER_MAX_CHARS),
            team_name_max_chars: value
                .team_name_max_chars
                .unwrap_or(DEFAULT_TEAM_NAME_MAX_CHARS),
            blocked_words: value
                .blocked_words
                .into_iter()
                .map(|word| word.trim().to_lowercase())
                .filter(|word| !word.is_empty())
                .collect(),
            prompt_libraries: value.prompt_libraries,
            default_prompts,
            retry,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn default_session() -> SessionSettings {
    SessionSettings {
        answer_duration_ms: 90_000,
        vote_duration_ms: 45_000,
        results_duration_ms: 15_000,
        max_teams: 20,
        group_size: 4,
        total_rounds: 3,
        category_select: false,
    }
}

/// Built-in prompts shipped with the binary.
fn default_prompts() -> Vec<String> {
    [
        "The worst thing to hear from your pilot",
        "A terrible name for a pet goldfish",
        "The real reason dinosaurs went extinct",
        "What the office printer is secretly thinking",
        "A rejected flavour of crisps",
        "The last text you want from your landlord",
        "A slogan for a very honest gym",
        "What your houseplant says behind your back",
        "The least inspiring motivational poster",
        "A bad thing to shout at a wedding",
        "The weirdest item on a pub quiz menu",
        "An unexpected use for a traffic cone",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
