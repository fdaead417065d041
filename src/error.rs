//! Error handling for the piflora node.

/// A specialized `Result` type for piflora operations.
pub type Result<T> = std::result::Result<T, NodeError>;

/// The main error type for piflora operations.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// The requested trigger is not configured
    #[error("trigger unknown or missing: {0}")]
    NotFound(String),

    /// A request field was missing or malformed, or sensor math left its domain
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A physical pin write did not succeed
    #[error("hardware write failed: {0}")]
    HardwareWriteFailure(String),

    /// The sensor driver call failed or timed out
    #[error("sensor read failed: {0}")]
    SensorReadFailure(String),

    /// The broker was unreachable or rejected the publish
    #[error("publish failed: {0}")]
    PublishFailure(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// GPIO or I2C peripheral setup failed
    #[error("GPIO error: {0}")]
    Gpio(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Web server error
    #[error("Web server error: {0}")]
    WebServer(String),
}

impl NodeError {
    /// Create a new not-found error for a trigger name
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new hardware write error
    pub fn hardware_write(msg: impl Into<String>) -> Self {
        Self::HardwareWriteFailure(msg.into())
    }

    /// Create a new sensor read error
    pub fn sensor_read(msg: impl Into<String>) -> Self {
        Self::SensorReadFailure(msg.into())
    }

    /// Create a new publish error
    pub fn publish(msg: impl Into<String>) -> Self {
        Self::PublishFailure(msg.into())
    }

    /// Create a new GPIO error
    pub fn gpio_error(msg: impl Into<String>) -> Self {
        Self::Gpio(msg.into())
    }

    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new web server error
    pub fn web_server_error(msg: impl Into<String>) -> Self {
        Self::WebServer(msg.into())
    }

    /// Whether the error was caused by the caller rather than the node.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::InvalidInput(_))
    }
}
