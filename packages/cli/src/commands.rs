//! Subcommand implementations shared by the clap entry point and the
//! interactive menu.

use std::path::Path;
use std::time::Instant;

use greenspace_city::{overrides, registry, resolve};
use greenspace_city_models::{CenterSource, OverrideFile, ResolvedCity};
use greenspace_cli_utils::{IndicatifProgress, MultiProgress};
use greenspace_engine::client::RestEngine;
use greenspace_engine::recording::RecordingEngine;
use greenspace_engine::{EngineApi, list_all_operations};
use greenspace_pipeline::batch::{BatchOptions, BatchReport, run_batch};
use greenspace_pipeline::city::RunOptions;
use greenspace_pipeline::ledger;
use greenspace_pipeline::params::AnalysisParams;

use crate::{Selection, Submit};

/// Parameters and cities of a selection, validated.
pub struct Prepared {
    pub params: AnalysisParams,
    pub cities: Vec<ResolvedCity>,
}

/// Loads parameters and overrides and resolves the city list. Every
/// configuration error surfaces here, before any request is built.
///
/// # Errors
///
/// Returns an error if a file cannot be loaded or the selection is
/// invalid.
pub fn prepare(selection: &Selection) -> Result<Prepared, Box<dyn std::error::Error>> {
    let params = AnalysisParams::load(selection.params.as_deref())?;
    let overrides = match &selection.overrides {
        Some(path) => overrides::load(path)?,
        None => OverrideFile::default(),
    };

    let catalog = registry::catalog();
    let cities = resolve::select(&catalog, &overrides, selection.hemisphere, &selection.cities)?;
    log::info!(
        "{} {} cities selected ({} hand-drawn)",
        cities.len(),
        selection.hemisphere,
        cities.iter().filter(|c| c.is_hand_drawn()).count()
    );

    Ok(Prepared { params, cities })
}

/// The run tag to use: the explicit one, or today's date.
#[must_use]
pub fn run_tag(submit: &Submit) -> String {
    submit
        .run_tag
        .clone()
        .unwrap_or_else(|| chrono::Local::now().format("%Y%m%d").to_string())
}

async fn batch(
    multi: &MultiProgress,
    engine: &dyn EngineApi,
    prepared: &Prepared,
    submit: &Submit,
    preflight: bool,
) -> BatchReport {
    let options = BatchOptions {
        run: RunOptions {
            run_tag: run_tag(submit),
            preflight,
        },
        concurrency: submit.concurrency,
    };
    let progress = IndicatifProgress::cities_bar(multi, "Submitting cities");
    run_batch(engine, &prepared.params, &prepared.cities, &options, progress).await
}

/// Submits every export of the selection and records the ledger.
///
/// # Errors
///
/// Returns an error if configuration fails, the engine credentials are
/// missing, or the ledger cannot be written. Per-city failures are part
/// of the returned report.
pub async fn run(
    multi: &MultiProgress,
    selection: &Selection,
    submit: &Submit,
    preflight: bool,
    ledger_dir: Option<&Path>,
) -> Result<BatchReport, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let prepared = prepare(selection)?;
    let engine = RestEngine::from_env()?;
    log::info!("Submitting to project {}", engine.project());

    let report = batch(multi, &engine, &prepared, submit, preflight).await;
    let path = ledger::record(ledger_dir, &report)?;

    print_report(&report);
    println!("Ledger: {}", path.display());
    println!("Finished in {:.1}s", start.elapsed().as_secs_f64());
    Ok(report)
}

/// Builds every request against a [`RecordingEngine`] and prints or
/// writes them as JSON.
///
/// # Errors
///
/// Returns an error if configuration fails or the output cannot be
/// written.
pub async fn plan(
    multi: &MultiProgress,
    selection: &Selection,
    submit: &Submit,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let prepared = prepare(selection)?;
    let window = prepared.params.season.window(selection.hemisphere);
    log::info!(
        "{} summer window: days {:?}",
        selection.hemisphere,
        window.ranges()
    );

    let engine = RecordingEngine::new();
    let report = batch(multi, &engine, &prepared, submit, false).await;

    let mut requests = engine.exports();
    requests.sort_by(|a, b| a.description().cmp(&b.description()));

    let json = serde_json::to_string_pretty(&serde_json::json!({
        "run_tag": report.run_tag,
        "requests": requests,
    }))?;

    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            println!("Wrote {} requests to {}", requests.len(), path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

/// Prints the cities a selection resolves to.
///
/// # Errors
///
/// Returns an error if configuration fails.
pub fn cities(selection: &Selection) -> Result<(), Box<dyn std::error::Error>> {
    let prepared = prepare(selection)?;

    println!("{:<28} {:<10} {:<14} CENTER", "CITY", "HEMI", "RADIUS");
    println!("{}", "-".repeat(66));
    for city in &prepared.cities {
        let policy = if city.is_hand_drawn() {
            "perimeter/5"
        } else {
            "cost-distance"
        };
        let center = match city.center {
            CenterSource::Dataset => "dataset".to_string(),
            CenterSource::Literal { lon, lat } => {
                format!("{lon:.4}, {lat:.4}")
            }
        };
        println!(
            "{:<28} {:<10} {:<14} {center}",
            city.name, city.hemisphere, policy
        );
    }
    println!("\n{} city(ies)", prepared.cities.len());
    Ok(())
}

/// Lists the project's export operations.
///
/// # Errors
///
/// Returns an error if the engine credentials are missing or the listing
/// fails.
pub async fn status(limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    let engine = RestEngine::from_env()?;
    let operations = list_all_operations(&engine).await?;

    if operations.is_empty() {
        println!("No operations found.");
        return Ok(());
    }

    println!("{:<26} {:<12} {:<6} DESCRIPTION", "OPERATION", "STATE", "DONE");
    println!("{}", "-".repeat(100));
    for op in operations.iter().take(limit) {
        let id = op.name.rsplit('/').next().unwrap_or(&op.name);
        let (state, description) = op.metadata.as_ref().map_or(("?".to_string(), ""), |m| {
            (m.state.to_string(), m.description.as_deref().unwrap_or(""))
        });
        println!("{id:<26} {state:<12} {:<6} {description}", op.done);
        if let Some(error) = &op.error {
            println!("    error: {}", error.message);
        }
    }
    println!("\n{} of {} operation(s)", operations.len().min(limit), operations.len());
    Ok(())
}

/// Prints one line per city and the totals.
pub fn print_report(report: &BatchReport) {
    for city in &report.cities {
        match &city.failure {
            None => println!("  ok      {}", city.city),
            Some(failure) => println!("  FAILED  {}: {failure}", city.city),
        }
    }
    println!(
        "\n{} succeeded, {} failed (run tag {})",
        report.succeeded(),
        report.failed(),
        report.run_tag
    );
}
