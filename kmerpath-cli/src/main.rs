use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod config;
mod error;

use config::Config;
use error::format_error_with_suggestions;

#[derive(Parser)]
#[command(name = "kmerpath")]
#[command(about = "kmerpath - streaming positional k-mer path compaction")]
#[command(version)]
#[command(long_about = "
kmerpath compacts a position sorted stream of k-mer observations into the
unbranched paths of a positional de Bruijn graph.

Input is tab separated: bases, start, end, reference flag (0/1), weight.
Output is one JSON object per compacted node.

Examples:
  kmerpath compact --input kmers.tsv --output nodes.jsonl -k 25
  kmerpath compact --input kmers.tsv --max-width 8 --check
  kmerpath config > kmerpath.toml
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compact k-mer observations into path nodes
    Compact {
        /// Observation file (TSV, sorted by start)
        #[arg(short, long, required = true)]
        input: PathBuf,

        /// Output file (JSON lines, stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// K-mer length
        #[arg(short, long)]
        k: Option<u32>,

        /// Maximum observation interval width
        #[arg(long)]
        max_width: Option<u32>,

        /// Maximum number of k-mers per node
        #[arg(long)]
        max_run_length: Option<u32>,

        /// Verify the compacted graph
        #[arg(long)]
        check: bool,
    },

    /// Print the default configuration as TOML
    Config {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Use the loaded configuration instead of the defaults
        #[arg(long)]
        effective: bool,
    },
}

fn setup_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Compact {
            input,
            output,
            k,
            max_width,
            max_run_length,
            check,
        } => {
            let overrides = commands::compact::Overrides {
                key_length: k,
                max_width,
                max_run_length,
                check,
            };
            commands::compact::execute(&config, input, output, overrides)?;
        }

        Commands::Config { output, effective } => {
            commands::config::execute(&config, output, effective)?;
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    if let Err(err) = run(cli) {
        eprintln!("Error: {}", format_error_with_suggestions(&err));
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_compact_arguments() {
        let cli = Cli::try_parse_from([
            "kmerpath", "-vv", "compact", "--input", "obs.tsv", "-k", "21", "--max-width", "4", "--check",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Compact { input, k, max_width, max_run_length, check, .. } => {
                assert_eq!(input, PathBuf::from("obs.tsv"));
                assert_eq!(k, Some(21));
                assert_eq!(max_width, Some(4));
                assert_eq!(max_run_length, None);
                assert!(check);
            }
            _ => panic!("expected compact"),
        }
    }
}
