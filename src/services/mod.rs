/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Per-session event loop: reconciliation, clock engine and autosave.
pub mod session_runtime;
/// Session lifecycle operations.
pub mod session_service;
/// Server-Sent Events streaming of session events.
pub mod sse_service;
/// Storage connection supervision and degraded mode.
pub mod storage_supervisor;
