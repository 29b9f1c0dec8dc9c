//! Error types for MockRelay Core

/// Result type alias for MockRelay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for MockRelay
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The remote end refused the connection
    #[error("Connection refused: {message}")]
    ConnectionRefused {
        /// Description of the refused connect attempt
        message: String,
    },

    /// The connection attempt did not complete in time
    #[error("Connection timed out: {message}")]
    ConnectionTimeout {
        /// Description of the timed-out connect attempt
        message: String,
    },

    /// The connection was established but the exchange failed mid-flight
    #[error("Communication failure: {message}")]
    Communication {
        /// Description of the failed exchange
        message: String,
    },

    /// The remote end replied with something that is not valid HTTP
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation
        message: String,
    },

    /// Template rendering failed
    #[error("Template error: {message}")]
    Template {
        /// Description of the render failure
        message: String,
    },

    /// Callback invocation failed or timed out
    #[error("Callback error: {message}")]
    Callback {
        /// Description of the callback failure
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the invalid configuration
        message: String,
    },

    /// Generic error
    #[error("Generic error: {0}")]
    Generic(String),
}

impl From<String> for Error {
    fn from(message: String) -> Self {
        Self::Generic(message)
    }
}

impl Error {
    /// Create a connection-refused error
    pub fn connection_refused<S: Into<String>>(message: S) -> Self {
        Self::ConnectionRefused {
            message: message.into(),
        }
    }

    /// Create a connection-timeout error
    pub fn connection_timeout<S: Into<String>>(message: S) -> Self {
        Self::ConnectionTimeout {
            message: message.into(),
        }
    }

    /// Create a communication error
    pub fn communication<S: Into<String>>(message: S) -> Self {
        Self::Communication {
            message: message.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a template error
    pub fn template<S: Into<String>>(message: S) -> Self {
        Self::Template {
            message: message.into(),
        }
    }

    /// Create a callback error
    pub fn callback<S: Into<String>>(message: S) -> Self {
        Self::Callback {
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    /// Whether this error means the connection never came up at all
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionRefused { .. } | Self::ConnectionTimeout { .. }
        )
    }
}
