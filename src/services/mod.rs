/// Countdown timer arming and callbacks.
pub mod countdown_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Game commands: players, votes, eliminations, resets and status.
pub mod game_service;
/// Health check service.
pub mod health_service;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
