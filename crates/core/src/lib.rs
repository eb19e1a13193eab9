//! ct Core Library
//!
//! This is the core library for the ct security toolkit. It runs independently
//! authored analysis scripts (scanning, DNS lookup, OSINT enrichment) as managed
//! subprocesses and captures each run into a uniform result record.
//!
//! ## Architecture
//!
//! - [`execution`] - Process executor, dependency resolver, worker pool and task runner
//! - [`tasks`] - Built-in task and dependency catalog
//! - [`configs`] - Settings file and task definitions
//! - [`platform`] - Platform detection and `PATH` lookup
//! - [`results`] - The [`RunResult`](results::RunResult) record
//! - [`types`] - Common error types and type aliases
//!
//! ## Usage
//!
//! ```rust,no_run
//! use ct_core::configs::settings::Config;
//! use ct_core::execution::TaskRunner;
//!
//! # async fn example() -> ct_core::types::CtResult<()> {
//! let runner = TaskRunner::new(Config::load(None)?);
//! let result = runner
//!     .dispatch("dns", &["example.com".to_string()], true, None)
//!     .await?;
//! println!("{}", result.to_pretty_json()?);
//! # Ok(())
//! # }
//! ```

pub mod configs;
pub mod execution;
pub mod platform;
pub mod results;
pub mod tasks;
pub mod types;

// Re-export the main types for easier usage
pub use results::{RunResult, Status};
pub use types::{CtError, CtResult};
