//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use wishlist_core::Config;

/// Resolve captured links through a rate-limited API and download them.
///
/// Wishlist folds `captured_urls_*` files into a pending store, resolves each
/// identifier into a resource URL, downloads the resources with bounded
/// concurrency and reconciles the results so the next run only retries what
/// failed.
#[derive(Parser, Debug)]
#[command(name = "wishlist")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: wishlist.toml in the work directory, if present)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding capture files, the pending store and run logs
    #[arg(short = 'w', long, global = true, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// Metadata API base URL
    #[arg(long, global = true, value_name = "URL")]
    pub api_base: Option<String>,

    /// Destination directory for downloaded resources
    #[arg(short = 'o', long, global = true, value_name = "DIR")]
    pub download_dir: Option<PathBuf>,

    /// Maximum concurrent downloads (1-100)
    #[arg(short = 'c', long, global = true, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Resolution requests allowed per rate limit window
    #[arg(long, global = true, value_parser = clap::value_parser!(u32).range(1..))]
    pub rate_limit_permits: Option<u32>,

    /// Rate limit window length in seconds
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub rate_limit_window: Option<u64>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Pipeline phases. Without a subcommand the full run is performed.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Ingest, resolve, download and reconcile in one go
    Run,
    /// Merge capture files into the pending store
    Ingest {
        /// Also move the failure log back into the pending store
        #[arg(long)]
        retry_failures: bool,
    },
    /// Resolve pending identifiers into a fresh resolution log
    Resolve,
    /// Download resolved resources into a fresh download log
    Download,
    /// Fold run logs into the pending store and failure log
    Reconcile,
}

impl Args {
    /// The selected phase, defaulting to a full run.
    #[must_use]
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }

    /// Directory searched for the default config file.
    #[must_use]
    pub fn config_dir(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Applies command-line overrides on top of a loaded config.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(work_dir) = &self.work_dir {
            config.work_dir.clone_from(work_dir);
        }
        if let Some(api_base) = &self.api_base {
            config.api_base.clone_from(api_base);
        }
        if let Some(download_dir) = &self.download_dir {
            config.download_dir.clone_from(download_dir);
        }
        if let Some(concurrency) = self.concurrency {
            config.download_concurrency = usize::from(concurrency);
        }
        if let Some(permits) = self.rate_limit_permits {
            config.rate_limit_permits = permits as usize;
        }
        if let Some(window) = self.rate_limit_window {
            config.rate_limit_window_secs = window;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_args_parses_successfully() {
        let args = Args::try_parse_from(["wishlist"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert_eq!(args.concurrency, None);
        assert_eq!(args.command(), Command::Run);
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["wishlist", "-v"]).unwrap();
        assert_eq!(args.verbose, 1);

        let args = Args::try_parse_from(["wishlist", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);

        let args = Args::try_parse_from(["wishlist", "--verbose", "--verbose"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_quiet_flag_sets_quiet() {
        let args = Args::try_parse_from(["wishlist", "-q"]).unwrap();
        assert!(args.quiet);

        let args = Args::try_parse_from(["wishlist", "resolve", "--quiet"]).unwrap();
        assert!(args.quiet);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let result = Args::try_parse_from(["wishlist", "--help"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_version_flag_shows_version() {
        let result = Args::try_parse_from(["wishlist", "--version"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_cli_invalid_flag_returns_error() {
        let result = Args::try_parse_from(["wishlist", "--invalid-flag"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }

    #[test]
    fn test_cli_subcommands_parse() {
        let cases = [
            ("run", Command::Run),
            ("resolve", Command::Resolve),
            ("download", Command::Download),
            ("reconcile", Command::Reconcile),
            (
                "ingest",
                Command::Ingest {
                    retry_failures: false,
                },
            ),
        ];
        for (name, expected) in cases {
            let args = Args::try_parse_from(["wishlist", name]).unwrap();
            assert_eq!(args.command(), expected, "subcommand {name}");
        }
    }

    #[test]
    fn test_cli_ingest_retry_failures() {
        let args = Args::try_parse_from(["wishlist", "ingest", "--retry-failures"]).unwrap();
        assert_eq!(
            args.command(),
            Command::Ingest {
                retry_failures: true
            }
        );
    }

    #[test]
    fn test_cli_unknown_subcommand_rejected() {
        let result = Args::try_parse_from(["wishlist", "fetch"]);
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::InvalidSubcommand
        );
    }

    #[test]
    fn test_cli_concurrency_bounds() {
        let args = Args::try_parse_from(["wishlist", "-c", "1"]).unwrap();
        assert_eq!(args.concurrency, Some(1));

        let args = Args::try_parse_from(["wishlist", "download", "--concurrency", "100"]).unwrap();
        assert_eq!(args.concurrency, Some(100));
    }

    #[test]
    fn test_cli_concurrency_zero_rejected() {
        let result = Args::try_parse_from(["wishlist", "-c", "0"]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_concurrency_over_max_rejected() {
        let result = Args::try_parse_from(["wishlist", "-c", "101"]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_rate_limit_permits_zero_rejected() {
        let result = Args::try_parse_from(["wishlist", "--rate-limit-permits", "0"]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_rate_limit_window_zero_rejected() {
        let result = Args::try_parse_from(["wishlist", "--rate-limit-window", "0"]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_overrides_apply_to_config() {
        let args = Args::try_parse_from([
            "wishlist",
            "--work-dir",
            "/data/wall",
            "--api-base",
            "http://127.0.0.1:8080/api",
            "--download-dir",
            "out",
            "-c",
            "8",
            "--rate-limit-permits",
            "10",
            "--rate-limit-window",
            "5",
            "resolve",
        ])
        .unwrap();

        let mut config = Config::default();
        args.apply_overrides(&mut config);

        assert_eq!(config.work_dir, PathBuf::from("/data/wall"));
        assert_eq!(config.api_base, "http://127.0.0.1:8080/api");
        assert_eq!(config.download_dir, PathBuf::from("out"));
        assert_eq!(config.download_concurrency, 8);
        assert_eq!(config.rate_limit_permits, 10);
        assert_eq!(config.rate_limit_window_secs, 5);
        assert_eq!(args.config_dir(), PathBuf::from("/data/wall"));
    }

    #[test]
    fn test_cli_no_overrides_keep_config() {
        let args = Args::try_parse_from(["wishlist"]).unwrap();
        let mut config = Config::default();
        args.apply_overrides(&mut config);
        assert_eq!(config, Config::default());
        assert_eq!(args.config_dir(), PathBuf::from("."));
    }
}
