//! Error types for neo-lidar

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// neo-lidar error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failure reported by the native library through its error slot.
    ///
    /// Carries the message read from the native error handle. The native
    /// layer offers no finer classification than this.
    #[error("{0}")]
    Native(String),

    /// Bitrate was supplied but is not a positive integer
    #[error("Invalid bitrate: {0} (omit it to auto-negotiate, or pass a positive value)")]
    InvalidBitrate(i32),

    /// Port identifier cannot be passed across the C boundary
    #[error("Invalid port identifier: {0:?}")]
    InvalidPort(String),

    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation not allowed in the device's current scanning state
    #[error("Invalid device state: {0}")]
    InvalidState(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration could not be serialized
    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// Operation not available in this build
    #[error("Operation not supported: {0}")]
    Unsupported(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True if the error originated in the native library
    pub fn is_native(&self) -> bool {
        matches!(self, Error::Native(_))
    }
}
