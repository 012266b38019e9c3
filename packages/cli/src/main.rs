#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line orchestrator for the greenspace exports.
//!
//! ```text
//! greenspace run    [--hemisphere north|south] [--cities A,B] [--run-tag 20230321]
//! greenspace plan   [--hemisphere ...] [--cities ...] [--output plan.json]
//! greenspace cities [--hemisphere ...]
//! greenspace status [--limit 50]
//! ```
//!
//! Running `greenspace` with no subcommand enters interactive mode.
//!
//! `run` and `status` need `EARTHENGINE_PROJECT` and `EARTHENGINE_TOKEN`;
//! `plan` and `cities` never contact the engine.

mod commands;
mod interactive;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use greenspace_city_models::Hemisphere;
use greenspace_pipeline::batch::DEFAULT_CONCURRENCY;

#[derive(Parser)]
#[command(
    name = "greenspace",
    about = "Submit per-city urban greenspace exports to Earth Engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Which cities to process and with which parameters.
#[derive(Args, Clone)]
pub struct Selection {
    /// Hemisphere whose summer window and cities are used
    #[arg(long, default_value = "north")]
    pub hemisphere: Hemisphere,

    /// Comma-separated city names (default: every city of the hemisphere)
    #[arg(long, env = "GREENSPACE_CITIES", value_delimiter = ',')]
    pub cities: Vec<String>,

    /// Analysis parameters TOML replacing the embedded defaults
    #[arg(long)]
    pub params: Option<PathBuf>,

    /// Per-city overrides and hand-drawn boundaries TOML
    #[arg(long)]
    pub overrides: Option<PathBuf>,
}

/// Settings for submitting a batch.
#[derive(Args, Clone)]
pub struct Submit {
    /// Suffix of every output name (default: today's date, YYYYMMDD)
    #[arg(long)]
    pub run_tag: Option<String>,

    /// Cities processed at once
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and submit every export
    Run {
        #[command(flatten)]
        selection: Selection,
        #[command(flatten)]
        submit: Submit,
        /// Skip the imagery and geometry probes
        #[arg(long)]
        no_preflight: bool,
        /// Directory for the submission ledger (default: data/submissions)
        #[arg(long)]
        ledger_dir: Option<PathBuf>,
    },
    /// Build every request without contacting the engine
    Plan {
        #[command(flatten)]
        selection: Selection,
        #[command(flatten)]
        submit: Submit,
        /// Write the requests here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List the cities a selection resolves to
    Cities {
        #[command(flatten)]
        selection: Selection,
    },
    /// List export operations of the project
    Status {
        /// Maximum number of operations to show
        #[arg(long, default_value = "50")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = greenspace_cli_utils::init_logger();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        return interactive::run(&multi).await;
    };

    match command {
        Commands::Run {
            selection,
            submit,
            no_preflight,
            ledger_dir,
        } => {
            let report =
                commands::run(&multi, &selection, &submit, !no_preflight, ledger_dir.as_deref())
                    .await?;
            if report.failed() > 0 {
                std::process::exit(1);
            }
        }
        Commands::Plan {
            selection,
            submit,
            output,
        } => commands::plan(&multi, &selection, &submit, output.as_deref()).await?,
        Commands::Cities { selection } => commands::cities(&selection)?,
        Commands::Status { limit } => commands::status(limit).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_hemisphere_and_cities() {
        let cli = Cli::try_parse_from([
            "greenspace",
            "cities",
            "--hemisphere",
            "south",
            "--cities",
            "Lagos,Santiago",
        ])
        .unwrap();

        let Some(Commands::Cities { selection }) = cli.command else {
            panic!("expected the cities subcommand");
        };
        assert_eq!(selection.hemisphere, Hemisphere::South);
        assert_eq!(selection.cities, vec!["Lagos", "Santiago"]);
    }

    #[test]
    fn hemisphere_defaults_to_north() {
        let cli = Cli::try_parse_from(["greenspace", "plan", "--run-tag", "20230321"]).unwrap();

        let Some(Commands::Plan { selection, submit, output }) = cli.command else {
            panic!("expected the plan subcommand");
        };
        assert_eq!(selection.hemisphere, Hemisphere::North);
        assert_eq!(submit.run_tag.as_deref(), Some("20230321"));
        assert_eq!(submit.concurrency, DEFAULT_CONCURRENCY);
        assert!(output.is_none());
    }

    #[test]
    fn unknown_hemisphere_is_rejected() {
        assert!(Cli::try_parse_from(["greenspace", "cities", "--hemisphere", "east"]).is_err());
    }

    #[test]
    fn no_subcommand_means_interactive() {
        let cli = Cli::try_parse_from(["greenspace"]).unwrap();
        assert!(cli.command.is_none());
    }
}
