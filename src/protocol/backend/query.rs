//! Query-related backend messages.

use std::mem::size_of;

use zerocopy::byteorder::big_endian::{I16 as I16BE, I32 as I32BE, U32 as U32BE};
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::error::{Error, Result};
use crate::protocol::reader::PacketReader;
use crate::protocol::types::FormatCode;
use crate::row::{Column, RowDescription};

/// Fixed-size tail of a field description (18 bytes).
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct FieldDescriptionTail {
    /// Table OID (0 if not a table column)
    pub table_oid: U32BE,
    /// Column attribute number (0 if not a table column)
    pub column_id: I16BE,
    /// Data type OID
    pub type_oid: U32BE,
    /// Type size (-1 for variable, -2 for null-terminated)
    pub type_size: I16BE,
    /// Type modifier (type-specific)
    pub type_modifier: I32BE,
    /// Format code (0=text, 1=binary)
    pub format: I16BE,
}

/// Parse a RowDescription message into an owned [`RowDescription`].
pub fn parse_row_description(payload: &[u8]) -> Result<RowDescription> {
    const TAIL_SIZE: usize = size_of::<FieldDescriptionTail>();

    let mut reader = PacketReader::new(payload);
    let num_fields = reader.read_i16()?;
    if num_fields < 0 {
        return Err(Error::Protocol(format!(
            "RowDescription: negative field count {}",
            num_fields
        )));
    }

    let mut columns = Vec::with_capacity(num_fields as usize);
    for _ in 0..num_fields {
        let name = reader.read_cstring()?;
        let tail = FieldDescriptionTail::read_from_bytes(reader.read_bytes(TAIL_SIZE)?)
            .map_err(|e| Error::Protocol(format!("FieldDescription tail: {e:?}")))?;

        columns.push(Column {
            name: name.to_string(),
            table_oid: tail.table_oid.get(),
            index: tail.column_id.get(),
            type_oid: tail.type_oid.get(),
            type_len: tail.type_size.get(),
            type_modifier: tail.type_modifier.get(),
            format: FormatCode::from_i16(tail.format.get()),
        });
    }

    Ok(RowDescription::new(columns))
}

/// DataRow message - contains a single row of data.
///
/// Each item is `Option<&[u8]>` where `None` represents NULL.
#[derive(Debug, Clone)]
pub struct DataRow<'a> {
    fields: Vec<Option<&'a [u8]>>,
}

impl<'a> DataRow<'a> {
    /// Parse a DataRow message from payload bytes.
    ///
    /// Every field length is checked against the payload; a truncated row is
    /// reported as a buffer underrun.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let mut reader = PacketReader::new(payload);
        let num_columns = reader.read_i16()?;
        if num_columns < 0 {
            return Err(Error::Protocol(format!(
                "DataRow: negative column count {}",
                num_columns
            )));
        }

        let mut fields = Vec::with_capacity(num_columns as usize);
        for _ in 0..num_columns {
            let len = reader.read_i32()?;
            if len == -1 {
                fields.push(None);
            } else if len < 0 {
                return Err(Error::Protocol(format!("DataRow: invalid field length {}", len)));
            } else {
                fields.push(Some(reader.read_bytes(len as usize)?));
            }
        }

        Ok(Self { fields })
    }

    /// Get the number of columns.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if there are no columns.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over column values.
    pub fn iter(&self) -> impl Iterator<Item = Option<&'a [u8]>> + '_ {
        self.fields.iter().copied()
    }

    /// Get a column value by index.
    ///
    /// Returns `None` if out of range, `Some(None)` if the column is NULL.
    pub fn get(&self, index: usize) -> Option<Option<&'a [u8]>> {
        self.fields.get(index).copied()
    }
}

/// CommandComplete message - indicates successful completion of a command.
#[derive(Debug, Clone, Copy)]
pub struct CommandComplete<'a> {
    /// Command tag (e.g., "SELECT 5", "INSERT 0 1", "UPDATE 10")
    pub tag: &'a str,
}

impl<'a> CommandComplete<'a> {
    /// Parse a CommandComplete message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let tag = PacketReader::new(payload).read_cstring()?;
        Ok(Self { tag })
    }

    /// Parse the number of rows affected from the command tag.
    ///
    /// Returns `Some(count)` for commands like SELECT, INSERT, UPDATE, DELETE.
    /// Returns `None` for other commands or parse failures.
    pub fn rows_affected(&self) -> Option<u64> {
        let parts: Vec<&str> = self.tag.split_whitespace().collect();

        match parts.as_slice() {
            ["SELECT", count] => count.parse().ok(),
            ["INSERT", _oid, count] => count.parse().ok(),
            ["UPDATE", count] => count.parse().ok(),
            ["DELETE", count] => count.parse().ok(),
            ["COPY", count] => count.parse().ok(),
            ["MOVE", count] => count.parse().ok(),
            ["FETCH", count] => count.parse().ok(),
            ["MERGE", count] => count.parse().ok(),
            _ => None,
        }
    }

    /// Get the command name from the tag.
    pub fn command(&self) -> Option<&str> {
        self.tag.split_whitespace().next()
    }
}

/// EmptyQueryResponse message - response to an empty query string.
#[derive(Debug, Clone, Copy)]
pub struct EmptyQueryResponse;

impl EmptyQueryResponse {
    /// Parse an EmptyQueryResponse message from payload bytes.
    pub fn parse(_payload: &[u8]) -> Result<Self> {
        Ok(Self)
    }
}
