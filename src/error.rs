//! Error types for lite-postgres.

use thiserror::Error;

/// Result type for lite-postgres operations.
pub type Result<T> = core::result::Result<T, Error>;

/// PostgreSQL error/notice field types.
#[derive(Debug, Clone, Default)]
pub struct ErrorFields {
    /// Severity: ERROR, FATAL, PANIC, WARNING, NOTICE, DEBUG, INFO, LOG
    pub severity: Option<String>,
    /// Non-localized severity (same as severity but never translated)
    pub severity_non_localized: Option<String>,
    /// SQLSTATE error code (5 characters)
    pub code: Option<String>,
    /// Primary error message
    pub message: Option<String>,
    /// Detailed error explanation
    pub detail: Option<String>,
    /// Suggestion for fixing the error
    pub hint: Option<String>,
    /// Cursor position in query string (1-based)
    pub position: Option<u32>,
    /// Position in internal query
    pub internal_position: Option<u32>,
    /// Failed internal command text
    pub internal_query: Option<String>,
    /// Context/stack trace
    pub where_: Option<String>,
    /// Schema name
    pub schema: Option<String>,
    /// Table name
    pub table: Option<String>,
    /// Column name
    pub column: Option<String>,
    /// Data type name
    pub data_type: Option<String>,
    /// Constraint name
    pub constraint: Option<String>,
    /// Source file name
    pub file: Option<String>,
    /// Source line number
    pub line: Option<u32>,
    /// Source routine name
    pub routine: Option<String>,
}

impl ErrorFields {
    /// Severity, preferring the untranslated form when the server sent it.
    pub fn severity(&self) -> Option<&str> {
        self.severity_non_localized
            .as_deref()
            .or(self.severity.as_deref())
    }
}

impl std::fmt::Display for ErrorFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(severity) = &self.severity {
            write!(f, "{}: ", severity)?;
        }
        if let Some(message) = &self.message {
            write!(f, "{}", message)?;
        }
        if let Some(code) = &self.code {
            write!(f, " (SQLSTATE {})", code)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, "\nDETAIL: {}", detail)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\nHINT: {}", hint)?;
        }
        Ok(())
    }
}

/// Error type for lite-postgres.
#[derive(Debug, Error)]
pub enum Error {
    /// Required connection parameters are missing
    #[error("Missing connection parameters: {}", .missing.join(", "))]
    Config {
        /// Names of the missing fields, in declaration order
        missing: Vec<&'static str>,
    },

    /// A configuration value is present but unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A query's text and arguments do not fit together
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The server asked for an authentication method this client does not speak
    #[error("Unsupported authentication method: {0}")]
    UnsupportedAuthMethod(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Protocol error (malformed message, unexpected response, etc.)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A read ran past the end of a message body
    #[error("Buffer underrun: needed {needed} bytes, {available} available")]
    BufferUnderrun {
        /// Bytes the read required
        needed: usize,
        /// Bytes left in the buffer
        available: usize,
    },

    /// Server error response
    #[error("PostgreSQL error: {0}")]
    Server(ErrorFields),

    /// Connection is closed and cannot be reused
    #[error("Connection is closed")]
    ConnectionClosed,

    /// No pooled connection became available in time
    #[error("Pool unavailable: timed out waiting for a connection")]
    PoolUnavailable,

    /// A column value could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true if the error indicates the connection is broken and cannot be reused.
    pub fn is_connection_broken(&self) -> bool {
        match self {
            Error::Io(_)
            | Error::ConnectionClosed
            | Error::Protocol(_)
            | Error::BufferUnderrun { .. } => true,
            // The server ends the session after FATAL and PANIC
            Error::Server(fields) => matches!(fields.severity(), Some("FATAL" | "PANIC")),
            _ => false,
        }
    }

    /// Get the SQLSTATE code if this is a server error.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Server(fields) => fields.code.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_lists_missing_fields() {
        let err = Error::Config {
            missing: vec!["database", "user"],
        };
        assert_eq!(
            err.to_string(),
            "Missing connection parameters: database, user"
        );
    }

    #[test]
    fn test_fatal_server_error_breaks_connection() {
        let fields = ErrorFields {
            severity: Some("FATAL".into()),
            code: Some("57P01".into()),
            ..Default::default()
        };
        assert!(Error::Server(fields).is_connection_broken());

        let fields = ErrorFields {
            severity: Some("ERROR".into()),
            code: Some("42P01".into()),
            ..Default::default()
        };
        let err = Error::Server(fields);
        assert!(!err.is_connection_broken());
        assert_eq!(err.sqlstate(), Some("42P01"));
    }

    #[test]
    fn test_untranslated_severity_wins() {
        let fields = ErrorFields {
            severity: Some("FATAL-LOCALIZED".into()),
            severity_non_localized: Some("FATAL".into()),
            ..Default::default()
        };
        assert_eq!(fields.severity(), Some("FATAL"));
        assert!(Error::Server(fields).is_connection_broken());
    }

    #[test]
    fn test_fields_display_with_detail_and_hint() {
        let fields = ErrorFields {
            severity: Some("ERROR".into()),
            code: Some("23505".into()),
            message: Some("duplicate key".into()),
            detail: Some("Key (id)=(1) already exists.".into()),
            hint: Some("Pick another id.".into()),
            ..Default::default()
        };
        assert_eq!(
            fields.to_string(),
            "ERROR: duplicate key (SQLSTATE 23505)\nDETAIL: Key (id)=(1) already exists.\nHINT: Pick another id."
        );
    }
}
