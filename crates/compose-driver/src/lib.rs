//! # Compose Driver
//!
//! Runs the resolve → fetch → merge loop the kernel leaves to its callers.
//! The data source plugs in through [`Fetcher`]; limits and entity options
//! come from an [`EngineConfig`] that can be loaded from TOML.

pub mod config;
pub mod drive;
pub mod error;
pub mod fetch;

pub use config::{DEFAULT_ITERATION_BUDGET, EngineConfig};
pub use drive::{DriveReport, compose_fields, drive};
pub use error::DriveError;
pub use fetch::{FetchBatch, Fetcher, MemoryFetcher, SourceGroup, group_by_source};
