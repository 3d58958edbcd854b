/// Convenience result type used across the engine.
pub type GridResult<T> = Result<T, GridError>;

/// Every fault the engine can report.
///
/// Out-of-range reads are not errors: the padding policy turns them into
/// zeros. Errors are reserved for writes and shapes that would corrupt the
/// grid if accepted.
#[derive(thiserror::Error, Debug)]
pub enum GridError {
    /// Rejected construction or resize parameters.
    #[error("invalid grid configuration: {0}")]
    InvalidConfig(String),

    /// A write addressed a cell outside the grid.
    #[error("cell ({row}, {col}) is outside a {rows}x{cols} grid")]
    OutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    /// An initial value matrix did not match the configured dimensions.
    #[error("value matrix is {got_rows}x{got_cols}, expected {rows}x{cols}")]
    ShapeMismatch {
        got_rows: usize,
        got_cols: usize,
        rows: usize,
        cols: usize,
    },

    /// Scalar and vector cells (or vectors of different lengths) were mixed.
    #[error("cell arity mismatch: expected {expected}, found {found}")]
    ArityMismatch { expected: String, found: String },

    /// The animation ticker needs a tokio runtime and none was running.
    #[error("animation runtime unavailable: {0}")]
    Runtime(String),

    /// Image decoding or encoding failed.
    #[error(transparent)]
    Image(#[from] image::ImageError),

    /// Configuration could not be parsed.
    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

impl GridError {
    /// Build a [`GridError::InvalidConfig`] value.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
