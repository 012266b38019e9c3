//! Menu-driven mode, entered when no subcommand is given.

use dialoguer::{Confirm, Input, Select};
use greenspace_city::registry;
use greenspace_city_models::Hemisphere;
use greenspace_cli_utils::{MultiProgress, pick_cities};
use greenspace_pipeline::batch::DEFAULT_CONCURRENCY;

use crate::{Selection, Submit, commands};

enum Action {
    Run,
    Plan,
    Cities,
    Status,
}

impl Action {
    const ALL: &[Self] = &[Self::Run, Self::Plan, Self::Cities, Self::Status];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::Run => "Submit exports",
            Self::Plan => "Preview requests (dry run)",
            Self::Cities => "List cities",
            Self::Status => "Check export status",
        }
    }
}

fn prompt_selection() -> Result<Selection, Box<dyn std::error::Error>> {
    const HEMISPHERES: [Hemisphere; 2] = [Hemisphere::North, Hemisphere::South];
    let labels: Vec<String> = HEMISPHERES.iter().map(ToString::to_string).collect();
    let idx = Select::new()
        .with_prompt("Hemisphere")
        .items(&labels)
        .default(0)
        .interact()?;
    let hemisphere = HEMISPHERES[idx];

    let all = Confirm::new()
        .with_prompt(format!("Process every {hemisphere} city?"))
        .default(true)
        .interact()?;

    let cities = if all {
        Vec::new()
    } else {
        let names: Vec<String> = registry::catalog()
            .into_iter()
            .filter(|c| c.hemisphere == hemisphere)
            .map(|c| c.name)
            .collect();
        let picked = pick_cities("Cities", &names)?;
        if picked.is_empty() {
            return Err("No cities selected".into());
        }
        picked
    };

    let overrides: String = Input::new()
        .with_prompt("Overrides file (blank for none)")
        .allow_empty(true)
        .interact_text()?;

    Ok(Selection {
        hemisphere,
        cities,
        params: None,
        overrides: (!overrides.trim().is_empty()).then(|| overrides.trim().into()),
    })
}

fn prompt_submit() -> Result<Submit, Box<dyn std::error::Error>> {
    let run_tag: String = Input::new()
        .with_prompt("Run tag")
        .default(chrono::Local::now().format("%Y%m%d").to_string())
        .interact_text()?;

    let concurrency: usize = Input::new()
        .with_prompt("Cities in flight")
        .default(DEFAULT_CONCURRENCY)
        .interact_text()?;

    Ok(Submit {
        run_tag: Some(run_tag),
        concurrency,
    })
}

/// Runs the interactive menu.
///
/// # Errors
///
/// Returns an error if a prompt fails or the chosen action fails.
#[allow(clippy::future_not_send)]
pub async fn run(multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    println!("Urban Greenspace Exports");
    println!();

    let labels: Vec<&str> = Action::ALL.iter().map(Action::label).collect();
    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    match Action::ALL[idx] {
        Action::Run => {
            let selection = prompt_selection()?;
            let submit = prompt_submit()?;
            let preflight = Confirm::new()
                .with_prompt("Run preflight probes?")
                .default(true)
                .interact()?;
            commands::run(multi, &selection, &submit, preflight, None).await?;
        }
        Action::Plan => {
            let selection = prompt_selection()?;
            let submit = prompt_submit()?;
            commands::plan(multi, &selection, &submit, None).await?;
        }
        Action::Cities => commands::cities(&prompt_selection()?)?,
        Action::Status => commands::status(50).await?,
    }

    Ok(())
}
