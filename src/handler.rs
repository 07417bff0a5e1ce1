//! Result handlers driven by the simple query state machine.

use crate::error::Result;
use crate::protocol::backend::{CommandComplete, DataRow};
use crate::row::RowDescription;

/// Handler for simple query results.
///
/// Callback patterns by statement type:
/// - SELECT with rows: `result_start` → `row*` → `result_end`
/// - SELECT with 0 rows: `result_start` → `result_end`
/// - INSERT/UPDATE/DELETE: `result_end` only (with affected row count)
/// - empty query string: `empty_query` only
///
/// An error returned from any callback does not abort the exchange. The
/// state machine keeps draining until ReadyForQuery and then reports the
/// first error, so the connection stays usable.
pub trait TextHandler {
    /// Called when a result set begins.
    fn result_start(&mut self, cols: &RowDescription) -> Result<()> {
        let _ = cols;
        Ok(())
    }

    /// Called for each data row.
    fn row(&mut self, cols: &RowDescription, row: DataRow<'_>) -> Result<()>;

    /// Called when a result set ends.
    fn result_end(&mut self, complete: CommandComplete<'_>) -> Result<()> {
        let _ = complete;
        Ok(())
    }

    /// Called when the server answers an empty query string.
    fn empty_query(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A handler that discards all results.
#[derive(Debug, Default)]
pub struct DropHandler {
    rows_affected: Option<u64>,
}

impl DropHandler {
    /// Create a new drop handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of rows affected (if applicable).
    pub fn rows_affected(&self) -> Option<u64> {
        self.rows_affected
    }
}

impl TextHandler for DropHandler {
    fn row(&mut self, _cols: &RowDescription, _row: DataRow<'_>) -> Result<()> {
        Ok(())
    }

    fn result_end(&mut self, complete: CommandComplete<'_>) -> Result<()> {
        self.rows_affected = complete.rows_affected();
        Ok(())
    }
}
