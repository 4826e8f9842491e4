//! Error types for the windowed PID controller

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Controller error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error (config or trace file)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed TOML configuration
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration values outside their valid range
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// A channel peer hung up
    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    /// The Ctrl-C handler could not be installed
    #[error("Signal handler error: {0}")]
    Signal(#[from] ctrlc::Error),

    /// A worker thread panicked
    #[error("Thread panicked: {0}")]
    ThreadPanicked(&'static str),
}
