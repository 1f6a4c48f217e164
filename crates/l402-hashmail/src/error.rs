#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum HashmailError {
    #[error("stream already exists")]
    AlreadyExists,
    #[error("stream not found")]
    NotFound,
    #[error("sub-stream is already occupied")]
    AlreadyInUse,
    #[error("stream was canceled")]
    Canceled,
    #[error("pipe closed")]
    Closed,
    #[error("malformed frame: {0}")]
    Malformed(String),
}
