//! Authentication-related backend messages.

use zerocopy::byteorder::big_endian::U32 as U32BE;
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::error::{Error, Result};
use crate::protocol::reader::PacketReader;
use crate::protocol::types::TransactionStatus;

/// Authentication method constants.
pub mod auth_type {
    pub const OK: i32 = 0;
    pub const KERBEROS_V5: i32 = 2;
    pub const CLEARTEXT_PASSWORD: i32 = 3;
    pub const MD5_PASSWORD: i32 = 5;
    pub const GSS: i32 = 7;
    pub const GSS_CONTINUE: i32 = 8;
    pub const SSPI: i32 = 9;
    pub const SASL: i32 = 10;
    pub const SASL_CONTINUE: i32 = 11;
    pub const SASL_FINAL: i32 = 12;
}

/// Authentication message from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticationMessage {
    /// Authentication successful
    Ok,
    /// Cleartext password required
    CleartextPassword,
    /// MD5 password required (with 4-byte salt)
    Md5Password { salt: [u8; 4] },
    /// Any method this client does not implement
    Unsupported { code: i32 },
}

impl AuthenticationMessage {
    /// Parse an Authentication message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut reader = PacketReader::new(payload);
        let auth_type = reader.read_i32()?;

        match auth_type {
            auth_type::OK => Ok(AuthenticationMessage::Ok),
            auth_type::CLEARTEXT_PASSWORD => Ok(AuthenticationMessage::CleartextPassword),
            auth_type::MD5_PASSWORD => {
                let salt = reader.read_array::<4>()?;
                Ok(AuthenticationMessage::Md5Password { salt })
            }
            code => Ok(AuthenticationMessage::Unsupported { code }),
        }
    }
}

/// Human-readable name of an authentication code.
pub fn method_name(code: i32) -> &'static str {
    match code {
        auth_type::KERBEROS_V5 => "KerberosV5",
        auth_type::GSS | auth_type::GSS_CONTINUE => "GSSAPI",
        auth_type::SSPI => "SSPI",
        auth_type::SASL | auth_type::SASL_CONTINUE | auth_type::SASL_FINAL => "SASL",
        _ => "unknown",
    }
}

/// BackendKeyData message - contains process ID and secret key for cancellation.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct BackendKeyData {
    /// Process ID of the backend
    pub pid: U32BE,
    /// Secret key for cancellation
    pub secret_key: U32BE,
}

impl BackendKeyData {
    /// Parse a BackendKeyData message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<&Self> {
        Self::ref_from_bytes(payload).map_err(|e| Error::Protocol(format!("BackendKeyData: {e:?}")))
    }

    /// Get the process ID.
    pub fn process_id(&self) -> u32 {
        self.pid.get()
    }

    /// Get the secret key.
    pub fn secret(&self) -> u32 {
        self.secret_key.get()
    }
}

/// ParameterStatus message - server parameter name and value.
#[derive(Debug, Clone)]
pub struct ParameterStatus<'a> {
    /// Parameter name
    pub name: &'a str,
    /// Parameter value
    pub value: &'a str,
}

impl<'a> ParameterStatus<'a> {
    /// Parse a ParameterStatus message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let mut reader = PacketReader::new(payload);
        let name = reader.read_cstring()?;
        let value = reader.read_cstring()?;
        Ok(Self { name, value })
    }
}

/// ReadyForQuery message - indicates server is ready for a new query.
#[derive(Debug, Clone, Copy)]
pub struct ReadyForQuery {
    /// Transaction status byte
    pub status: u8,
}

impl ReadyForQuery {
    /// Parse a ReadyForQuery message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let status = PacketReader::new(payload).read_u8()?;
        Ok(Self { status })
    }

    /// Get the transaction status.
    pub fn transaction_status(&self) -> Option<TransactionStatus> {
        TransactionStatus::from_byte(self.status)
    }
}

/// NotificationResponse message - asynchronous notification from LISTEN/NOTIFY.
#[derive(Debug, Clone)]
pub struct NotificationResponse<'a> {
    /// PID of the notifying backend
    pub pid: u32,
    /// Channel name
    pub channel: &'a str,
    /// Notification payload
    pub payload: &'a str,
}

impl<'a> NotificationResponse<'a> {
    /// Parse a NotificationResponse message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let mut reader = PacketReader::new(payload);
        let pid = reader.read_u32()?;
        let channel = reader.read_cstring()?;
        let payload_str = reader.read_cstring()?;
        Ok(Self {
            pid,
            channel,
            payload: payload_str,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_md5_request() {
        let payload = [0, 0, 0, 5, 0xde, 0xad, 0xbe, 0xef];
        assert_eq!(
            AuthenticationMessage::parse(&payload).unwrap(),
            AuthenticationMessage::Md5Password {
                salt: [0xde, 0xad, 0xbe, 0xef]
            }
        );
    }

    #[test]
    fn test_md5_request_without_salt_is_underrun() {
        assert!(matches!(
            AuthenticationMessage::parse(&[0, 0, 0, 5, 1]),
            Err(Error::BufferUnderrun { .. })
        ));
    }

    #[test]
    fn test_sasl_is_unsupported() {
        let mut payload = 10_i32.to_be_bytes().to_vec();
        payload.extend_from_slice(b"SCRAM-SHA-256\0\0");
        assert_eq!(
            AuthenticationMessage::parse(&payload).unwrap(),
            AuthenticationMessage::Unsupported { code: 10 }
        );
        assert_eq!(method_name(10), "SASL");
    }

    #[test]
    fn test_backend_key_data() {
        let payload = [0, 0, 0x30, 0x39, 0, 0, 0, 7];
        let key = BackendKeyData::parse(&payload).unwrap();
        assert_eq!(key.process_id(), 12345);
        assert_eq!(key.secret(), 7);
    }
}
