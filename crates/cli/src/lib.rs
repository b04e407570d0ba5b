//! cadence CLI
//!
//! Command-line front end for running, listing and validating suites.

pub mod commands;
pub mod output;
