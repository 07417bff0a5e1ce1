//! Scalar types shared by the backend and frontend messages.

/// Type identifier of a column, as carried in RowDescription.
pub type Oid = u32;

/// OIDs the value decoder knows by name (see `pg_type.dat`).
pub mod oid {
    use super::Oid;

    pub const BOOL: Oid = 16;
    pub const BYTEA: Oid = 17;
    pub const CHAR: Oid = 18;
    pub const NAME: Oid = 19;
    pub const INT8: Oid = 20;
    pub const INT2: Oid = 21;
    pub const INT4: Oid = 23;
    pub const TEXT: Oid = 25;
    pub const OID: Oid = 26;
    pub const JSON: Oid = 114;
    pub const FLOAT4: Oid = 700;
    pub const FLOAT8: Oid = 701;
    pub const UNKNOWN: Oid = 705;
    pub const BPCHAR: Oid = 1042;
    pub const VARCHAR: Oid = 1043;
    pub const JSONB: Oid = 3802;
}

/// Column format code. Simple queries always answer in text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatCode {
    #[default]
    Text,
    Binary,
}

impl FormatCode {
    /// Map the int16 from a RowDescription field. Anything but 1 is text.
    pub fn from_i16(value: i16) -> Self {
        if value == 1 {
            FormatCode::Binary
        } else {
            FormatCode::Text
        }
    }
}

/// Session state reported by ReadyForQuery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TransactionStatus {
    /// Not inside a transaction block
    #[default]
    Idle = b'I',
    /// Inside a transaction block
    InTransaction = b'T',
    /// Inside a failed transaction block; statements are rejected until rollback
    Failed = b'E',
}

impl TransactionStatus {
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            b'I' => Some(TransactionStatus::Idle),
            b'T' => Some(TransactionStatus::InTransaction),
            b'E' => Some(TransactionStatus::Failed),
            _ => None,
        }
    }

    /// True inside a block, failed or not.
    pub fn in_transaction(self) -> bool {
        self != TransactionStatus::Idle
    }

    pub fn is_failed(self) -> bool {
        self == TransactionStatus::Failed
    }
}
