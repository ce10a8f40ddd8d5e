use thiserror::Error;

/// Main error type for gateway operations
#[derive(Error, Debug)]
pub enum KsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timeout")]
    Timeout,

    #[error("frame format error: {0}")]
    FrameFormat(String),

    #[error("checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    Checksum { expected: u8, actual: u8 },

    #[error("protocol header mismatch: {0}")]
    HeaderMismatch(String),

    #[error("parameter error: {0}")]
    Parameter(String),

    #[error("lookup error: {0}")]
    Lookup(String),
}

/// Result type alias for gateway operations
pub type KsResult<T> = Result<T, KsError>;
