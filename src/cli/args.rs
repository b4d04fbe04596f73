//! Command-line argument parsing for goalrunner
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// goalrunner - drive a game character toward its goals
#[derive(Parser, Debug)]
#[command(name = "goalrunner")]
#[command(author = "Jerome (Kubashen) Naidoo")]
#[command(version)]
#[command(about = "Goal-oriented controller for a cooldown-limited game character", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Character to control (overrides actor.name)
    #[arg(long, global = true)]
    pub character: Option<String>,

    /// Verbosity level: -v (debug), -vv (trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (warnings and errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the plan-execute loop until interrupted
    Run {
        /// Stop after this many cycles
        #[arg(long)]
        cycles: Option<usize>,

        /// Execute plans without recursive sub-goal expansion
        #[arg(long)]
        no_subgoals: bool,
    },

    /// Print live state, emergency level and the next goal as JSON
    Status,

    /// Validate configuration and API connectivity
    Check,

    /// Display the effective configuration
    Config,
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Verbosity {
    /// Default tracing filter when RUST_LOG is unset
    pub fn filter_directive(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "goalrunner=warn",
            Verbosity::Normal => "goalrunner=info",
            Verbosity::Verbose => "goalrunner=debug",
            Verbosity::VeryVerbose => "goalrunner=trace",
        }
    }
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }

    /// Reject flag combinations clap cannot express
    pub fn validate(&self) -> Result<(), String> {
        if self.quiet && self.verbose > 0 {
            return Err("Cannot use both --quiet and --verbose flags".to_string());
        }
        if let Commands::Run { cycles: Some(0), .. } = self.command {
            return Err("--cycles must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        let args = Args::parse_from(["goalrunner", "status"]);
        assert_eq!(args.verbosity(), Verbosity::Normal);

        let args = Args::parse_from(["goalrunner", "-v", "status"]);
        assert_eq!(args.verbosity(), Verbosity::Verbose);

        let args = Args::parse_from(["goalrunner", "-vv", "status"]);
        assert_eq!(args.verbosity(), Verbosity::VeryVerbose);

        let args = Args::parse_from(["goalrunner", "status", "-q"]);
        assert_eq!(args.verbosity(), Verbosity::Quiet);
    }

    #[test]
    fn test_run_command() {
        let args = Args::parse_from([
            "goalrunner",
            "run",
            "--cycles",
            "5",
            "--no-subgoals",
            "--character",
            "ada",
        ]);
        assert_eq!(
            args.command,
            Commands::Run { cycles: Some(5), no_subgoals: true }
        );
        assert_eq!(args.character.as_deref(), Some("ada"));
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let args = Args::parse_from(["goalrunner", "-q", "-v", "check"]);
        assert!(args.validate().is_err());

        let args = Args::parse_from(["goalrunner", "run", "--cycles", "0"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_config_path() {
        let args = Args::parse_from(["goalrunner", "--config", "/tmp/goalrunner.toml", "config"]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/goalrunner.toml")));
        assert_eq!(args.command, Commands::Config);
    }
}
