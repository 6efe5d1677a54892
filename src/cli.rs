//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;

/// labdaily - daily research intelligence pipeline
///
/// Aggregates entry collections dropped by source collectors, mines
/// cross-entry patterns, optionally enhances the analysis with an LLM
/// persona, writes two report renderings, and fans the result out to
/// Nostr relays.
///
/// Examples:
///   labdaily
///   labdaily --date 2025-06-01 --persona scholar
///   labdaily --no-publish --verbose
///   labdaily --dry-run
///   labdaily --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for labdaily.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Run date (YYYY-MM-DD)
    ///
    /// Selects which daily source collections are loaded and how output
    /// files are stamped. Defaults to today.
    #[arg(short, long, value_name = "DATE")]
    pub date: Option<String>,

    /// Directory holding per-source collection drops
    ///
    /// Overrides the [sources] data_dir config setting.
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Persona to use for LLM enhancement
    ///
    /// One of the profiles in the personas file; prefix an ad-hoc profile
    /// name with "custom:". Defaults to the file's default persona.
    #[arg(short, long, value_name = "NAME", env = "LABDAILY_PERSONA")]
    pub persona: Option<String>,

    /// Relevance threshold override (0.0 - 1.0)
    #[arg(long, value_name = "SCORE")]
    pub threshold: Option<f64>,

    /// LLM request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Skip LLM enhancement (report uses the base analysis)
    #[arg(long)]
    pub no_enhance: bool,

    /// Skip relay publishing (local report files only)
    #[arg(long)]
    pub no_publish: bool,

    /// Dry run: aggregate and mine insights, print what would be
    /// reported, write nothing
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default labdaily.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if let Some(ref date) = self.date {
            if NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
                return Err(format!("Invalid date '{}': expected YYYY-MM-DD", date));
            }
        }

        if let Some(threshold) = self.threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err("Threshold must be between 0.0 and 1.0".to_string());
            }
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if let Some(ref data_dir) = self.data_dir {
            if !data_dir.is_dir() {
                return Err(format!(
                    "Data directory does not exist: {}",
                    data_dir.display()
                ));
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// The run date: the --date override, or today.
    pub fn run_date(&self) -> NaiveDate {
        self.date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .unwrap_or_else(|| chrono::Utc::now().date_naive())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            config: None,
            date: None,
            data_dir: None,
            persona: None,
            threshold: None,
            timeout: None,
            no_enhance: false,
            no_publish: false,
            dry_run: false,
            init_config: false,
            verbose: false,
            quiet: false,
        }
    }

    #[test]
    fn test_validation_invalid_date() {
        let mut args = make_args();
        args.date = Some("06-01-2025".to_string());
        assert!(args.validate().is_err());

        args.date = Some("2025-06-01".to_string());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_threshold_range() {
        let mut args = make_args();
        args.threshold = Some(1.5);
        assert!(args.validate().is_err());

        args.threshold = Some(0.4);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_run_date_override() {
        let mut args = make_args();
        args.date = Some("2025-06-01".to_string());
        assert_eq!(
            args.run_date(),
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
        );
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
