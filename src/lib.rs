//! Analysis engine for periodic mismatch reports. Dated report files are
//! ingested into one table, and every review table is derived from it.
pub mod analysis;
pub mod cache;
pub mod calendar;
pub mod columns;
pub mod config;
pub mod error;
pub mod identity;
pub mod loader;
pub mod logging;
pub mod output;
pub mod reports;
pub mod types;
pub mod util;

#[cfg(test)]
mod test_support;

pub use error::{AnalyzerError, Result};
