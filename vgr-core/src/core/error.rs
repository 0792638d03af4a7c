use thiserror::Error;

/// Universal error type for rendering operations.
///
/// Most rendering steps are best-effort and report failure through a
/// boolean; this type is used where a caller needs to know *why*, such as
/// surface setup, backend status checks and final output.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The backend could not create a surface of the requested size
    #[error("invalid surface size {width}x{height}")]
    InvalidSurface { width: f64, height: f64 },

    /// A vector target was set up without an output stream
    #[error("vector target has no output stream")]
    MissingStream,

    /// The context was used before a surface was bound
    #[error("render context has no surface")]
    NoSurface,

    /// Writing the output failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend reported a failure after a sequence of drawing calls
    #[error("backend error: {0}")]
    Backend(String),

    /// The scene description is malformed
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// A font could not be parsed
    #[error("font error: {0}")]
    Font(String),

    /// Image data does not match its declared dimensions
    #[error("image error: {0}")]
    Image(String),

    /// Encoding the final surface failed
    #[error("encoding error: {0}")]
    Encoding(String),
}

impl From<serde_json::Error> for RenderError {
    fn from(err: serde_json::Error) -> Self {
        RenderError::InvalidDocument(err.to_string())
    }
}

/// Result type alias for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;
