use thiserror::Error;

/// Typed failures raised by the gesture engine. Everything above the engine
/// (CLI, IPC, config) works with `anyhow`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("degenerate eye geometry: corner points coincide")]
    Geometry,

    #[error("media controller unavailable: {0}")]
    MediaUnavailable(String),

    #[error("frame acquisition failed: {0}")]
    Acquisition(String),

    #[error("input injector failed: {0}")]
    Injector(#[from] anyhow::Error),
}
