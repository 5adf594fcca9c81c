use thiserror::Error;

/// Engine-level failures. Legitimate empty results (no active forecasters at
/// a knot, zero-coverage segment, unresolved question) are NOT errors — they
/// yield explicit zero/empty values so batch callers can tell a skip from a
/// failure.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed payload that should have been rejected upstream — wrong CDF
    /// length, non-monotonic CDF, NaN probability. Never silently repaired.
    #[error("invalid input: {0}")]
    Input(String),

    /// A field required for the requested computation is missing — e.g. a
    /// null open_time on a question being scored. Raised synchronously so a
    /// batch caller can skip just that question.
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
