//! CLI module for lbstack.
//!
//! This module provides the command-line interface for validating,
//! planning, applying and tearing down HAProxy stacks.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat, StateCommands};
pub use output::OutputFormatter;
