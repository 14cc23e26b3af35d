//! CLI commands for NeuroShift
//!
//! Every command works on the saved analytics directory named by the
//! config file; none of them starts the worker pool.

pub mod analytics;
pub mod config;
pub mod error;
pub mod output;
