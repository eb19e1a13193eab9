//! Configuration parsing for the toolkit settings file and task definitions

pub mod settings;
pub mod tasks;
