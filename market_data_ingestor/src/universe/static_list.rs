use async_trait::async_trait;

use crate::{
    models::symbol::{Symbol, SymbolError},
    universe::{DirectoryError, SymbolDirectory},
};

/// A fixed universe, typically taken from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    symbols: Vec<Symbol>,
}

impl StaticDirectory {
    pub fn new(symbols: Vec<Symbol>) -> Self {
        let mut out: Vec<Symbol> = Vec::with_capacity(symbols.len());
        for s in symbols {
            if !out.contains(&s) {
                out.push(s);
            }
        }
        Self { symbols: out }
    }

    pub fn parse<I, S>(raw: I) -> Result<Self, SymbolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let symbols = raw
            .into_iter()
            .map(|s| Symbol::new(s.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(symbols))
    }
}

#[async_trait]
impl SymbolDirectory for StaticDirectory {
    async fn list_symbols(&self) -> Result<Vec<Symbol>, DirectoryError> {
        Ok(self.symbols.clone())
    }
}
