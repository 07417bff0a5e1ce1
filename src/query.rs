//! Queries and their accumulated results.

use std::borrow::Cow;
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::handler::TextHandler;
use crate::protocol::backend::{CommandComplete, DataRow};
use crate::row::RowDescription;
use crate::types::{EncodedArg, ToParams};
use crate::value::{Value, decode};

/// A pending request: SQL text plus encoded arguments.
///
/// The simple query protocol has no parameter binding, so `$1`, `$2`, ...
/// placeholders are replaced by the arguments rendered as SQL literals when
/// the query is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    text: String,
    args: Vec<EncodedArg>,
}

impl Query {
    /// A query without arguments. The text is sent verbatim.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            args: Vec::new(),
        }
    }

    /// A query with arguments encoded from `params`.
    pub fn with_params<P: ToParams>(text: impl Into<String>, params: P) -> Self {
        Self {
            text: text.into(),
            args: params.encode_all(),
        }
    }

    /// A query with arguments already encoded by a custom encoder.
    pub fn from_encoded(text: impl Into<String>, args: Vec<EncodedArg>) -> Self {
        Self {
            text: text.into(),
            args,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn args(&self) -> &[EncodedArg] {
        &self.args
    }

    /// The SQL text actually sent to the server.
    ///
    /// Placeholders inside string literals, quoted identifiers, dollar-quoted
    /// bodies and comments are left alone. A placeholder with no matching
    /// argument is an [`Error::InvalidQuery`].
    pub fn sql(&self) -> Result<Cow<'_, str>> {
        if self.args.is_empty() {
            return Ok(Cow::Borrowed(&self.text));
        }
        render(&self.text, &self.args).map(Cow::Owned)
    }
}

impl From<&str> for Query {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Query {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

fn render(text: &str, args: &[EncodedArg]) -> Result<String> {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len() + args.len() * 8);
    // Start of the not-yet-copied span of `text`.
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' => {
                let escapes = i > 0 && matches!(bytes[i - 1], b'E' | b'e');
                i = skip_quoted(bytes, i + 1, b'\'', escapes);
            }
            b'"' => i = skip_quoted(bytes, i + 1, b'"', false),
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = memchr::memchr(b'\n', &bytes[i..]).map_or(bytes.len(), |p| i + p + 1);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = memchr::memmem::find(&bytes[i + 2..], b"*/").map_or(bytes.len(), |p| i + p + 4);
            }
            b'$' if i == 0 || !is_ident_byte(bytes[i - 1]) => {
                let digits = bytes[i + 1..]
                    .iter()
                    .take_while(|b| b.is_ascii_digit())
                    .count();
                if digits > 0 {
                    let end = i + 1 + digits;
                    let n: usize = text[i + 1..end].parse().unwrap_or(0);
                    let arg = n
                        .checked_sub(1)
                        .and_then(|idx| args.get(idx))
                        .ok_or_else(|| {
                            Error::InvalidQuery(format!(
                                "placeholder ${} has no argument ({} given)",
                                &text[i + 1..end],
                                args.len()
                            ))
                        })?;
                    out.push_str(&text[copied..i]);
                    out.push_str(&arg.to_literal()?);
                    copied = end;
                    i = end;
                } else {
                    i = skip_dollar_quoted(bytes, i);
                }
            }
            _ => i += 1,
        }
    }

    out.push_str(&text[copied..]);
    Ok(out)
}

/// Index just past the closing `quote`, starting inside the quoted run.
fn skip_quoted(bytes: &[u8], mut i: usize, quote: u8, backslash_escapes: bool) -> usize {
    while i < bytes.len() {
        let b = bytes[i];
        if backslash_escapes && b == b'\\' {
            i += 2;
        } else if b == quote {
            return i + 1;
        } else {
            i += 1;
        }
    }
    bytes.len()
}

/// Skip a `$tag$ ... $tag$` body starting at the opening `$`.
///
/// Returns `start + 1` when the `$` does not open a dollar quote.
fn skip_dollar_quoted(bytes: &[u8], start: usize) -> usize {
    let tag_len = bytes[start + 1..]
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
        .count();
    let tag_end = start + 1 + tag_len;
    if bytes.get(tag_end) != Some(&b'$') {
        return start + 1;
    }
    let tag = &bytes[start..=tag_end];
    match memchr::memmem::find(&bytes[tag_end + 1..], tag) {
        Some(p) => tag_end + 1 + p + tag.len(),
        None => bytes.len(),
    }
}

/// Accumulated output of one query.
///
/// Filled in by the connection while the query runs. Once marked done it
/// rejects further rows.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    description: Option<RowDescription>,
    rows: Vec<Vec<Value>>,
    done: bool,
    command_tag: Option<String>,
    rows_affected: Option<u64>,
}

impl QueryResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the result's row description.
    ///
    /// A query may produce at most one result set.
    pub fn handle_row_description(&mut self, description: RowDescription) -> Result<()> {
        if self.description.is_some() || self.done {
            return Err(Error::InvalidQuery(
                "query produced more than one result set".into(),
            ));
        }
        self.description = Some(description);
        Ok(())
    }

    /// Decode a data row against the row description and append it.
    pub fn handle_data_row(&mut self, row: DataRow<'_>) -> Result<()> {
        if self.done {
            return Err(Error::Protocol(
                "DataRow received after the result was complete".into(),
            ));
        }
        let Some(description) = &self.description else {
            return Err(Error::Protocol(
                "DataRow received before RowDescription".into(),
            ));
        };
        if row.len() != description.len() {
            return Err(Error::Protocol(format!(
                "DataRow has {} fields but RowDescription declares {} columns",
                row.len(),
                description.len()
            )));
        }

        let values = row
            .iter()
            .zip(description.columns())
            .map(|(raw, column)| decode(raw, column))
            .collect::<Result<Vec<_>>>()?;
        self.rows.push(values);
        Ok(())
    }

    /// Record the command tag and mark the result done.
    pub fn handle_command_complete(&mut self, complete: CommandComplete<'_>) {
        self.command_tag = Some(complete.tag.to_string());
        self.rows_affected = complete.rows_affected();
        self.done();
    }

    /// Mark the result done. Later rows are rejected.
    pub fn done(&mut self) {
        self.done = true;
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn description(&self) -> Option<&RowDescription> {
        self.description.as_ref()
    }

    /// Decoded rows, each in column order.
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Vec<Value>> {
        self.rows
    }

    /// Command tag from CommandComplete (e.g. `"INSERT 0 1"`).
    pub fn command_tag(&self) -> Option<&str> {
        self.command_tag.as_deref()
    }

    pub fn rows_affected(&self) -> Option<u64> {
        self.rows_affected
    }

    /// Every row as a map from column name to value.
    ///
    /// When two columns share a name, the later one wins.
    pub fn rows_of_objects(&self) -> Vec<HashMap<String, Value>> {
        let Some(description) = &self.description else {
            return Vec::new();
        };
        self.rows
            .iter()
            .map(|row| {
                description
                    .columns()
                    .iter()
                    .zip(row)
                    .map(|(column, value)| (column.name.clone(), value.clone()))
                    .collect()
            })
            .collect()
    }
}

impl TextHandler for QueryResult {
    fn result_start(&mut self, cols: &RowDescription) -> Result<()> {
        self.handle_row_description(cols.clone())
    }

    fn row(&mut self, _cols: &RowDescription, row: DataRow<'_>) -> Result<()> {
        self.handle_data_row(row)
    }

    fn result_end(&mut self, complete: CommandComplete<'_>) -> Result<()> {
        self.handle_command_complete(complete);
        Ok(())
    }

    fn empty_query(&mut self) -> Result<()> {
        self.done();
        Ok(())
    }
}
