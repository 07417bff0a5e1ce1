//! Result-set shape: columns and row descriptions.

use crate::protocol::types::{FormatCode, Oid};
use crate::value::PgType;

/// One result-row field's shape, taken from a RowDescription message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Field name
    pub name: String,
    /// OID of the owning table (0 if not a table column)
    pub table_oid: Oid,
    /// Attribute number within the table (0 if not a table column)
    pub index: i16,
    /// Data type OID
    pub type_oid: Oid,
    /// Declared type length (-1 for variable, -2 for null-terminated)
    pub type_len: i16,
    /// Type modifier (type-specific)
    pub type_modifier: i32,
    /// Format code
    pub format: FormatCode,
}

impl Column {
    /// Decode strategy selected by this column's type OID.
    pub fn pg_type(&self) -> PgType {
        PgType::from_oid(self.type_oid)
    }
}

/// Shape of every column in a result set, in server order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowDescription {
    columns: Vec<Column>,
}

impl RowDescription {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Position of the first column called `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}
