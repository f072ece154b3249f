//! Validated SQL identifier for the destination price table.
//!
//! The table name is the one piece of SQL that cannot be a bound parameter, so it
//! is checked once here and only ever spliced in quoted form.

use std::fmt;

use serde::Deserialize;
use thiserror::Error;

pub const MAX_TABLE_NAME_LEN: usize = 63;
pub const DEFAULT_TABLE: &str = "stock_prices";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableNameError {
    #[error("table name is empty")]
    Empty,
    #[error("table name '{0}' is longer than {MAX_TABLE_NAME_LEN} characters")]
    TooLong(String),
    #[error("table name '{0}' must start with a letter or '_'")]
    LeadingDigit(String),
    #[error("table name '{0}' may only contain ASCII letters, digits and '_'")]
    InvalidChar(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct TableName(String);

impl TableName {
    pub fn new(raw: &str) -> Result<Self, TableNameError> {
        if raw.is_empty() {
            return Err(TableNameError::Empty);
        }
        if raw.len() > MAX_TABLE_NAME_LEN {
            return Err(TableNameError::TooLong(raw.to_string()));
        }
        if !raw.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
            return Err(TableNameError::InvalidChar(raw.to_string()));
        }
        if raw.as_bytes()[0].is_ascii_digit() {
            return Err(TableNameError::LeadingDigit(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted identifier, safe to splice into SQL text.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl Default for TableName {
    fn default() -> Self {
        Self(DEFAULT_TABLE.to_string())
    }
}

impl TryFrom<String> for TableName {
    type Error = TableNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
