use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum VerbosityLevel {
    /// Only show critical errors
    Quiet,
    /// Show standard information
    #[default]
    Normal,
    /// Show detailed information
    Verbose,
    /// Show all available debugging information
    Debug,
}

/// Canonical XML reformatter for Kodi add-on directories
#[derive(Parser, Debug, Clone)]
#[command(name = "format-xml")]
#[command(about = "Reformat XML files in place with canonical indentation, preserving CDATA")]
#[command(version)]
pub struct Cli {
    /// Directory (or single file) to scan for XML files
    #[arg(help = "Add-on directory or file to format")]
    pub path: PathBuf,

    /// Show what would be formatted without making changes
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Create .bak files before formatting
    #[arg(long = "backup")]
    pub backup: bool,

    /// Exclude file patterns (glob syntax)
    #[arg(long = "exclude", action = clap::ArgAction::Append)]
    pub exclude_patterns: Vec<String>,

    /// Include file patterns (glob syntax)
    #[arg(long = "include", action = clap::ArgAction::Append)]
    pub include_patterns: Vec<String>,

    /// String to use for one indentation level (default: four spaces)
    #[arg(long = "indent")]
    pub indent: Option<String>,

    /// Character encoding for reading and writing files (default: UTF-8)
    #[arg(long = "encoding")]
    pub encoding: Option<String>,

    /// File extensions to process (comma-separated)
    #[arg(
        short = 'e',
        long = "extensions",
        help = "File extensions to process (e.g., 'xml,xsd')"
    )]
    pub extensions: Option<String>,

    /// Skip structural validation checks
    #[arg(long = "no-validate")]
    pub no_validate: bool,

    /// Do not rewrite files that have validation issues
    #[arg(long = "strict", conflicts_with = "no_validate")]
    pub strict: bool,

    /// Number of files formatted concurrently
    #[arg(short = 't', long = "threads")]
    pub threads: Option<usize>,

    /// Stop after the first file that fails
    #[arg(long = "fail-fast")]
    pub fail_fast: bool,

    /// Configuration file (TOML or JSON)
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(
        short = 'q',
        long = "quiet",
        help = "Quiet mode",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The `--extensions` value split into a list, None when not given.
    pub fn extension_list(&self) -> Option<Vec<String>> {
        self.extensions.as_ref().map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.path.exists() {
            return Err(format!("Path does not exist: {}", self.path.display()));
        }
        if let Some(threads) = self.threads
            && threads == 0
        {
            return Err("Number of threads must be greater than 0".to_string());
        }
        Ok(())
    }
}
