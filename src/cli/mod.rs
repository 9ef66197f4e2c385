//! Command-line interface for `bowtie-sync`.
//!
//! This module provides argument parsing and output formatting for the
//! commands that plan, apply and inspect controller state.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat, StateCommands};
pub use output::{MessageLevel, OutputFormatter};
