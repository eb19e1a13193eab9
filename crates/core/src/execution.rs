//! Task execution module
//!
//! This module handles running task scripts as managed subprocesses, gating
//! them on host dependencies, and fanning work out over a bounded worker pool.

pub mod command;
pub mod dependencies;
pub mod queue;
pub mod runner;

pub use command::{CommandExecutor, RunOptions};
pub use dependencies::{Dependency, DependencyResolver, Host, Installer, SystemHost};
pub use queue::{Job, JobQueue};
pub use runner::TaskRunner;
