/*!
Error types for the BrowserBytes core engine.
*/

use thiserror::Error;

/// Result type used throughout the BrowserBytes core.
pub type Result<T> = std::result::Result<T, BrowserBytesError>;

/// Errors that can occur during export, transfer and restore operations.
#[derive(Error, Debug)]
pub enum BrowserBytesError {
    /// Missing or unusable user input (empty name, blank passphrase, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// The passphrase generator could not produce a passphrase
    #[error("Passphrase generation failed: {0}")]
    Generator(String),

    /// The remote record store rejected or failed a request
    #[error("Record store error: {0}")]
    Store(String),

    /// No remote record matches the supplied passphrase
    #[error("No data found for this passphrase. Please check and try again.")]
    NotFound,

    /// Malformed JSON, Base64 or snapshot shape
    #[error("Invalid snapshot format: {0}")]
    Format(String),

    /// Wrong passphrase, corrupted ciphertext or tag mismatch.
    ///
    /// Carries no detail on purpose.
    #[error("Decryption failed")]
    Decryption,

    /// Failure reported by a browser storage or cookie adapter
    #[error("Browser error: {0}")]
    Browser(String),

    /// An operation exceeded its deadline
    #[error("Operation '{operation}' timed out")]
    Timeout { operation: &'static str },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BrowserBytesError {
    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new passphrase generator error
    pub fn generator<S: Into<String>>(msg: S) -> Self {
        Self::Generator(msg.into())
    }

    /// Create a new record store error
    pub fn store<S: Into<String>>(msg: S) -> Self {
        Self::Store(msg.into())
    }

    /// Create a new format error
    pub fn format<S: Into<String>>(msg: S) -> Self {
        Self::Format(msg.into())
    }

    /// Create a new browser adapter error
    pub fn browser<S: Into<String>>(msg: S) -> Self {
        Self::Browser(msg.into())
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Message suitable for showing to the person who triggered the action.
    ///
    /// Format errors ask the user to check their input; decryption failures
    /// stay generic so nothing is revealed about which check failed.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::Generator(msg) => format!("Failed to generate passphrase: {msg}"),
            Self::Store(msg) => format!("Error talking to the record store: {msg}"),
            Self::NotFound => self.to_string(),
            Self::Format(_) => {
                "Error importing data. Please check the format and try again.".to_string()
            }
            Self::Decryption => "Decryption failed".to_string(),
            Self::Browser(msg) => format!("Browser error: {msg}"),
            Self::Timeout { operation } => {
                format!("The operation '{operation}' took too long. Please try again.")
            }
            Self::Config(msg) => format!("Configuration error: {msg}"),
            Self::Io(err) => format!("File error: {err}"),
        }
    }
}

impl From<serde_json::Error> for BrowserBytesError {
    fn from(err: serde_json::Error) -> Self {
        Self::Format(err.to_string())
    }
}
