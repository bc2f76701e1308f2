//! Common error types and process exit codes for org-data tools

use thiserror::Error;

/// Common result type for org-data operations
pub type Result<T> = std::result::Result<T, Error>;

/// Process exit codes, one per error class, so calling automation can
/// branch on the code instead of parsing messages.
pub mod exit {
    pub const OK: i32 = 0;
    pub const VALIDATION: i32 = 2;
    pub const USAGE: i32 = 3;
    pub const DB: i32 = 4;
    pub const DB_WRITE: i32 = 5;
    pub const SAFETY_NET: i32 = 6;
}

/// Error taxonomy shared by every org-data command
#[derive(Error, Debug)]
pub enum Error {
    /// Bad or missing flags, mutually exclusive flags, disabled features
    #[error("{0}")]
    Usage(String),

    /// Malformed input data, schema mismatch, broken invariants
    #[error("{0}")]
    Validation(String),

    /// Database operation error (wraps sqlx::Error)
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Insert/delete failed inside a transaction, or a remote batch was
    /// rejected; distinguished from read-phase errors for exit codes
    #[error("{0}")]
    DbWrite(String),

    /// Destructive operation refused without explicit confirmation or with
    /// a wider scope than intended
    #[error("{0}")]
    SafetyNet(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport failure against the Org API
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Structured error response from the Org API
    #[error("{message} ({code})")]
    Api { message: String, code: String },
}

impl Error {
    /// Validation error carrying the offending input line number
    pub fn at_line(line: u64, message: impl Into<String>) -> Self {
        Error::Validation(format!("line {}: {}", line, message.into()))
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Error::Usage(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub fn db_write(message: impl Into<String>) -> Self {
        Error::DbWrite(message.into())
    }

    pub fn safety_net(message: impl Into<String>) -> Self {
        Error::SafetyNet(message.into())
    }

    /// Map the error class to its process exit code
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Usage(_) => exit::USAGE,
            Error::Validation(_) => exit::VALIDATION,
            Error::Database(_) | Error::Io(_) | Error::Http(_) | Error::Api { .. } => exit::DB,
            Error::DbWrite(_) => exit::DB_WRITE,
            Error::SafetyNet(_) => exit::SAFETY_NET,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_per_class() {
        assert_eq!(Error::usage("x").exit_code(), exit::USAGE);
        assert_eq!(Error::validation("x").exit_code(), exit::VALIDATION);
        assert_eq!(Error::DbWrite("x".into()).exit_code(), exit::DB_WRITE);
        assert_eq!(Error::SafetyNet("x".into()).exit_code(), exit::SAFETY_NET);
        assert_eq!(
            Error::Api {
                message: "m".into(),
                code: "c".into()
            }
            .exit_code(),
            exit::DB
        );
    }

    #[test]
    fn at_line_prefixes_the_line_number() {
        let err = Error::at_line(7, "code is required");
        assert_eq!(err.to_string(), "line 7: code is required");
    }
}
