/// OpenAPI documentation generation.
pub mod documentation;
/// Serializable session transactions with retry.
pub mod gateway;
/// Health check service.
pub mod health_service;
/// Profanity masking and truncation.
pub mod moderation;
/// Public service for read-only session information.
pub mod public_service;
/// Host and team commands.
pub mod session_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
