//! Error types for GI operations.
//!
//! All fallible operations in this crate return [`GiResult<T>`].  Errors are
//! classified into two axes for caller convenience:
//!
//! - **Transport errors** ([`GiError::is_transport_error`]): the GI program
//!   could not be launched or reached. The call proceeds without GI.
//! - **Recoverable errors** ([`GiError::is_recoverable`]): the operation
//!   failed but the session (or registry) is still usable.

use crate::channel::ChannelError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for GI operations
pub type GiResult<T> = Result<T, GiError>;

/// Comprehensive error types for GI operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GiError {
    /// IO error from pipes, sockets or the reply stream
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A raw OS call (pipe, dup2, kill) failed
    #[error("OS error: {0}")]
    Os(#[from] nix::errno::Errno),

    /// Network gateway did not accept the connection in time
    #[error("Connect timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Network gateway host name did not resolve
    #[error("Could not resolve gateway host '{host}'")]
    Resolve { host: String },

    /// Malformed `gi://` URL
    #[error("Invalid gateway URL: {url}")]
    InvalidUrl { url: String },

    /// Local program does not exist
    #[error("GI program not found: {}", path.display())]
    ProgramNotFound { path: PathBuf },

    /// Local program exists but lacks execute permission
    #[error("GI program is not executable: {}", path.display())]
    NotExecutable { path: PathBuf },

    /// Process creation failed
    #[error("Failed to spawn {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Command line exceeded the configured maximum without a newline
    #[error("Line overflow: {size} bytes without newline exceeds limit {limit}")]
    LineTooLong { size: usize, limit: usize },

    /// Too many consecutive interrupted reads on the command stream
    #[error("Command stream interrupted {attempts} times in a row")]
    Interrupted { attempts: u32 },

    /// A command sharing the same first word is already registered
    #[error("Command '{words}' conflicts with an already registered command")]
    DuplicateCommand { words: String },

    /// Descriptor word count outside 1..=4
    #[error("Command descriptor must have 1 to 4 words, got {count}")]
    InvalidDescriptor { count: usize },

    /// Channel became unavailable or failed
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Key-value store failure
    #[error("Key-value store error: {message}")]
    Store { message: String },

    /// Configuration could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    /// Generic error with custom message
    #[error("GI error: {message}")]
    Generic { message: String },
}

impl GiError {
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// `true` if the GI program could not be launched or reached.
    ///
    /// The call is expected to continue without GI when this is returned
    /// from the launcher.
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            GiError::Os(_)
                | GiError::Timeout { .. }
                | GiError::Resolve { .. }
                | GiError::InvalidUrl { .. }
                | GiError::ProgramNotFound { .. }
                | GiError::NotExecutable { .. }
                | GiError::Spawn { .. }
        )
    }

    /// `true` if the session or registry is still usable after this error.
    ///
    /// Recoverable: `DuplicateCommand`, `InvalidDescriptor`, `Store`,
    /// `LineTooLong` (only the offending line is dropped). Channel failures
    /// and stream errors end the session.
    pub fn is_recoverable(&self) -> bool {
        match self {
            GiError::DuplicateCommand { .. } => true,
            GiError::InvalidDescriptor { .. } => true,
            GiError::Store { .. } => true,
            GiError::Channel(ChannelError::Unsupported { .. }) => true,
            GiError::Channel(ChannelError::NotFound { .. }) => true,
            GiError::Channel(_) => false,
            GiError::Io(_) => false,
            GiError::LineTooLong { .. } => true,
            GiError::Interrupted { .. } => false,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_failures_are_transport_errors() {
        let err = GiError::ProgramNotFound {
            path: PathBuf::from("/nope/script.sh"),
        };
        assert!(err.is_transport_error());
        assert!(err
            .to_string()
            .contains("/nope/script.sh"));

        assert!(GiError::Timeout { timeout_ms: 2000 }.is_transport_error());
        assert!(!GiError::generic("x").is_transport_error());
    }

    #[test]
    fn channel_hangup_is_not_recoverable() {
        let err = GiError::from(ChannelError::Hangup);
        assert!(!err.is_recoverable());

        let err = GiError::from(ChannelError::Unsupported { operation: "tdd" });
        assert!(err.is_recoverable());

        let err = GiError::DuplicateCommand {
            words: "GET DIGITS".to_string(),
        };
        assert!(err.is_recoverable());

        assert!(GiError::LineTooLong { size: 9000, limit: 8192 }.is_recoverable());
    }
}
