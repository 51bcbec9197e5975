//! Aviary Reallocation - field extension territory planning over aviary exports.
//!
//! Wraps the reallocation kernel with the file formats used in the field:
//!
//! - `;`-delimited aviary exports with Portuguese headers and decimal commas
//! - CSV rosters of producers and extensionists whose allocation is frozen
//! - Optimized allocation and per-extensionist summary CSVs
//! - A JSON run report

pub mod config;
pub mod export;
pub mod loader;
pub mod pipeline;
pub mod report;
pub mod summary;

pub use config::{HeaderAliases, RosterSource, RunConfig};
pub use pipeline::Pipeline;
pub use report::{RunReport, SearchSummary};
pub use summary::{AgentSummary, summarize};
