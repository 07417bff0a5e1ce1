//! ErrorResponse ('E') and NoticeResponse ('N').
//!
//! Both carry the same body: a run of `code byte + cstring` fields ended by a
//! zero byte.

use tracing::debug;

use crate::error::{Error, ErrorFields, Result};
use crate::protocol::reader::PacketReader;

fn parse_fields(payload: &[u8]) -> Result<ErrorFields> {
    let mut fields = ErrorFields::default();
    let mut reader = PacketReader::new(payload);

    loop {
        let code = reader.read_u8()?;
        if code == 0 {
            return Ok(fields);
        }
        let value = reader.read_cstring()?;
        let text = || Some(value.to_string());

        match code {
            b'S' => fields.severity = text(),
            b'V' => fields.severity_non_localized = text(),
            b'C' => fields.code = text(),
            b'M' => fields.message = text(),
            b'D' => fields.detail = text(),
            b'H' => fields.hint = text(),
            b'P' => fields.position = value.parse().ok(),
            b'p' => fields.internal_position = value.parse().ok(),
            b'q' => fields.internal_query = text(),
            b'W' => fields.where_ = text(),
            b's' => fields.schema = text(),
            b't' => fields.table = text(),
            b'c' => fields.column = text(),
            b'd' => fields.data_type = text(),
            b'n' => fields.constraint = text(),
            b'F' => fields.file = text(),
            b'L' => fields.line = value.parse().ok(),
            b'R' => fields.routine = text(),
            other => debug!(code = %(other as char), "unknown error field"),
        }
    }
}

/// A failed command. Severity ERROR, or FATAL/PANIC when the session is over.
#[derive(Debug, Clone)]
pub struct ErrorResponse {
    pub fields: ErrorFields,
}

impl ErrorResponse {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        parse_fields(payload).map(|fields| Self { fields })
    }

    pub fn into_error(self) -> Error {
        Error::Server(self.fields)
    }

    /// Failure during authentication, keeping the server's wording.
    pub fn into_auth_error(self) -> Error {
        Error::Auth(self.fields.to_string())
    }
}

/// A warning or informational message; never ends a command.
#[derive(Debug, Clone)]
pub struct NoticeResponse {
    pub fields: ErrorFields,
}

impl NoticeResponse {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        parse_fields(payload).map(|fields| Self { fields })
    }
}
