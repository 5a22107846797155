//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// lbstack - Declarative HAProxy stack reconciler.
#[derive(Parser, Debug)]
#[command(name = "lbstack")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the stack file.
    #[arg(short, long, global = true, env = "LBSTACK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter stack file.
    Init {
        /// Directory to initialize (defaults to current directory).
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Force overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the stack file.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Show what an apply would change.
    Plan,

    /// Create or update the stack.
    Apply {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Show the deployed stack.
    Show,

    /// Check for drift between the stack file and the deployed stack.
    Drift,

    /// Delete every parent and entry of the stack.
    Destroy {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Manage recorded state.
    State {
        /// State subcommand.
        #[command(subcommand)]
        command: StateCommands,
    },
}

/// State management subcommands.
#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// Show recorded state.
    Show,

    /// Show the current lock holder.
    Lock,

    /// Release the stack lock.
    Unlock {
        /// Lock ID to release.
        #[arg(long)]
        lock_id: Option<String>,

        /// Remove the lock whoever holds it.
        #[arg(long)]
        force: bool,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_apply() {
        let cli = Cli::try_parse_from(["lbstack", "apply", "--yes", "-c", "web.yaml"]).unwrap();
        assert!(matches!(cli.command, Commands::Apply { yes: true }));
        assert_eq!(cli.config, Some(PathBuf::from("web.yaml")));
        assert_eq!(cli.output, OutputFormat::Text);
    }

    #[test]
    fn test_parse_global_flags() {
        let cli =
            Cli::try_parse_from(["lbstack", "--output", "json", "--log-json", "-v", "drift"])
                .unwrap();
        assert!(matches!(cli.command, Commands::Drift));
        assert_eq!(cli.output, OutputFormat::Json);
        assert!(cli.log_json);
        assert!(cli.verbose);
    }

    #[test]
    fn test_parse_state_unlock() {
        let cli =
            Cli::try_parse_from(["lbstack", "state", "unlock", "--lock-id", "abc"]).unwrap();
        match cli.command {
            Commands::State {
                command: StateCommands::Unlock { lock_id, force },
            } => {
                assert_eq!(lock_id.as_deref(), Some("abc"));
                assert!(!force);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_command_rejected() {
        assert!(Cli::try_parse_from(["lbstack", "reconcile"]).is_err());
    }
}
