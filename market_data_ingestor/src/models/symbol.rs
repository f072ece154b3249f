//! Ticker symbol newtype.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest symbol we accept; matches the `VARCHAR(10)` column downstream.
pub const MAX_SYMBOL_LEN: usize = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SymbolError {
    #[error("symbol is empty")]
    Empty,
    #[error("symbol '{0}' is longer than {MAX_SYMBOL_LEN} characters")]
    TooLong(String),
    #[error("symbol '{0}' contains whitespace or control characters")]
    InvalidChars(String),
}

/// An exchange-listed ticker (e.g. "AAPL", "BRK-B").
///
/// Opaque to the pipeline: the value is passed to providers and written to
/// storage as-is after trimming.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    pub fn new(raw: &str) -> Result<Self, SymbolError> {
        let s = raw.trim();
        if s.is_empty() {
            return Err(SymbolError::Empty);
        }
        if s.chars().count() > MAX_SYMBOL_LEN {
            return Err(SymbolError::TooLong(s.to_string()));
        }
        if s.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(SymbolError::InvalidChars(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Symbol {
    type Error = SymbolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}
