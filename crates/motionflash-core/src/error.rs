//! Error types for motionflash-core
//!
//! Every failure in the crate is one of a closed set of kinds. Each kind has
//! a stable snake_case code (used in reports and on stderr) and a distinct
//! process exit code.

use core::fmt;

/// Failure kind, independent of the message attached to a particular error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transport reported a timeout
    Timeout,
    /// A response failed integrity checking
    CrcErrorResponse,
    /// The device never answered within the retry budget
    NoResponse,
    /// The device is not in packet-serial motion mode
    ModeMismatch,
    /// A safety limit stopped a test run
    SafetyAbort,
    /// Caller-supplied data was rejected before touching the device
    InvalidInput,
    /// Read-back configuration differs from what was applied
    VerificationMismatch,
    /// The verification round-trip itself failed
    VerificationError,
    /// Operation attempted on a disconnected session
    NotConnected,
    /// Another operation is in flight on the session
    Busy,
}

impl ErrorKind {
    /// All kinds, in exit-code order
    pub const ALL: [ErrorKind; 10] = [
        ErrorKind::InvalidInput,
        ErrorKind::Timeout,
        ErrorKind::CrcErrorResponse,
        ErrorKind::NoResponse,
        ErrorKind::ModeMismatch,
        ErrorKind::SafetyAbort,
        ErrorKind::VerificationMismatch,
        ErrorKind::VerificationError,
        ErrorKind::NotConnected,
        ErrorKind::Busy,
    ];

    /// Stable machine-readable code
    pub fn code(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::CrcErrorResponse => "crc_error_response",
            Self::NoResponse => "no_response",
            Self::ModeMismatch => "mode_mismatch",
            Self::SafetyAbort => "safety_abort",
            Self::InvalidInput => "invalid_input",
            Self::VerificationMismatch => "verification_mismatch",
            Self::VerificationError => "verification_error",
            Self::NotConnected => "not_connected",
            Self::Busy => "busy",
        }
    }

    /// Process exit code for this kind (never 0)
    pub fn exit_code(self) -> u8 {
        match self {
            Self::InvalidInput => 2,
            Self::Timeout => 10,
            Self::CrcErrorResponse => 11,
            Self::NoResponse => 12,
            Self::ModeMismatch => 13,
            Self::SafetyAbort => 14,
            Self::VerificationMismatch => 15,
            Self::VerificationError => 16,
            Self::NotConnected => 17,
            Self::Busy => 18,
        }
    }

    /// Whether this kind originates in the transport and may be retried
    pub fn is_transport(self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::CrcErrorResponse | Self::NoResponse
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Core error type
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Transport timed out while executing `operation`
    #[error("{operation} timed out")]
    Timeout {
        /// Device command that timed out
        operation: String,
    },

    /// Response to `operation` failed integrity checking
    #[error("CRC error in response to {operation}")]
    CrcErrorResponse {
        /// Device command whose response was corrupt
        operation: String,
    },

    /// Device did not answer
    #[error("no response: {0}")]
    NoResponse(String),

    /// Packet-serial motion is not permitted
    #[error("mode mismatch: {0}")]
    ModeMismatch(String),

    /// A safety limit was breached
    #[error("safety abort: {0}")]
    SafetyAbort(String),

    /// Input rejected before any device interaction
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Parameters whose read-back value differs from the applied one
    #[error("verification mismatch on {}", .0.join(", "))]
    VerificationMismatch(Vec<String>),

    /// Verification round-trip failed
    #[error("verification error: {0}")]
    VerificationError(String),

    /// Session is disconnected
    #[error("session is not connected")]
    NotConnected,

    /// Another operation holds the session
    #[error("session busy: {0}")]
    Busy(String),
}

impl Error {
    /// Kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::CrcErrorResponse { .. } => ErrorKind::CrcErrorResponse,
            Self::NoResponse(_) => ErrorKind::NoResponse,
            Self::ModeMismatch(_) => ErrorKind::ModeMismatch,
            Self::SafetyAbort(_) => ErrorKind::SafetyAbort,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::VerificationMismatch(_) => ErrorKind::VerificationMismatch,
            Self::VerificationError(_) => ErrorKind::VerificationError,
            Self::NotConnected => ErrorKind::NotConnected,
            Self::Busy(_) => ErrorKind::Busy,
        }
    }

    /// Shorthand for [`ErrorKind::code`]
    pub fn code(&self) -> &'static str {
        self.kind().code()
    }

    /// Shorthand for [`ErrorKind::exit_code`]
    pub fn exit_code(&self) -> u8 {
        self.kind().exit_code()
    }

    /// Build a timeout error for a named device command
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Build a CRC error for a named device command
    pub fn crc(operation: impl Into<String>) -> Self {
        Self::CrcErrorResponse {
            operation: operation.into(),
        }
    }

    /// Build an invalid-input error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Structured `{code, message}` record, as embedded in reports
    pub fn record(&self) -> ErrorRecord {
        ErrorRecord {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

/// Serializable summary of an error
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ErrorRecord {
    /// Error code (see [`ErrorKind::code`])
    pub code: String,
    /// Human-readable message
    pub message: String,
}

/// A workflow that failed part-way but still produced a completed report
///
/// The error is surfaced unchanged; the report records everything that was
/// independently known when the failure happened.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{error}")]
pub struct RunFailure<R> {
    /// The error that ended the workflow
    pub error: Error,
    /// Completed report for the failed run
    pub report: R,
}

impl<R> RunFailure<R> {
    /// Kind of the underlying error
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
