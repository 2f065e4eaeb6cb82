use thiserror::Error;

/// Errors surfaced by host-interface implementations (used by the trait
/// definitions in `stepflow-core`: Recorder, TaskSource, TaskSink).
#[derive(Debug, Error)]
pub enum HostError {
    #[error("host store unavailable")]
    Unavailable,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}
