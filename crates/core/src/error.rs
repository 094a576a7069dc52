use thiserror::Error;

/// Outcome of a single upscale capability call.
///
/// `ResourceExhausted` is recoverable (the executor shrinks the tile size and
/// retries); `Fatal` is not.
#[derive(Debug, Error)]
pub enum OperatorError {
    #[error("operator ran out of device memory")]
    ResourceExhausted,
    #[error("operator failed: {0}")]
    Fatal(String),
}

/// Typed failures crossing the pipeline boundary.
///
/// Callers translate these into user-facing messages; none of them carries a
/// partial result.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Caller error, surfaced immediately and never retried.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// The operator violated its sizing contract for one tile.
    #[error(
        "scaled tile {index}: operator returned {actual_width}x{actual_height}, \
         expected {expected_width}x{expected_height}"
    )]
    AssemblyMismatch {
        index: usize,
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },
    /// Shrink-and-retry bottomed out at the configured tile edge floor.
    #[error("operator still out of memory at the minimum tile edge {min_tile_edge}")]
    Exhausted { min_tile_edge: u32 },
    /// Non-resource operator failure; retrying cannot change the outcome.
    #[error("operator failed: {0}")]
    OperatorFatal(String),
}
