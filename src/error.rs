//! Error taxonomy for graph construction.
//!
//! Reference errors (relationships or mentions naming an unknown entity)
//! are not represented here: they are filtered before write, never
//! surfaced. Lookups that find nothing return `Ok(None)`.

/// Errors produced by extraction and community detection.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The language model returned output that could not be parsed as
    /// JSON, even after stripping a surrounding code fence. Carries the
    /// raw response for diagnosis.
    #[error("failed to parse extraction output as JSON: {message}")]
    JsonParse {
        message: String,
        /// The unparseable model output, verbatim.
        raw: String,
    },

    /// The completion callback failed. Propagated verbatim; the engine
    /// never retries internally.
    #[error("completion provider error: {0}")]
    Completion(#[from] anyhow::Error),

    /// Community detection aborted for this batch.
    #[error("community detection failed: {0}")]
    Detector(String),
}
