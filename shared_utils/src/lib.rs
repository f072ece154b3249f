//! Small helpers shared by the ingestion crates.

pub mod env;
