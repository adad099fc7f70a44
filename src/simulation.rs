//! Functionality for running the simulation.
//!
//! Milestone years are simulated in order. Within a year, each time slice is coordinated
//! separately and the resulting decisions are merged into results which carry over to the next
//! year.
use crate::model::Model;
use crate::output::DataWriter;
use crate::settings::Settings;
use crate::solver::create_solver;
use anyhow::{Context, Result};
use log::info;
use std::path::Path;

pub mod aggregate;
use aggregate::{CumulativeResults, YearResults};
pub mod builder;
pub mod convergence;
use convergence::Coordinator;
pub mod invoker;
use invoker::{Invoker, WorkArea};
pub mod marginal_cost;
pub mod transmission;

/// Run the simulation.
///
/// # Arguments:
///
/// * `model` - The model to run
/// * `output_path` - The folder to which output files will be written
/// * `settings` - Program settings
pub fn run(model: &Model, output_path: &Path, settings: &Settings) -> Result<CumulativeResults> {
    let solver = create_solver(&settings.solver);
    let invoker = Invoker::new(solver.as_ref(), settings.num_threads)?;
    let work_area = if settings.debug_model {
        WorkArea::persistent(output_path)?
    } else {
        WorkArea::temporary()?
    };
    info!("Writing subproblems to {}", work_area.path().display());

    let mut writer = DataWriter::create(output_path)?;
    let mut results = CumulativeResults::default();
    for year in model.iter_years() {
        info!("Milestone year: {year}");

        let mut year_results = YearResults::default();
        for (time_slice, weight) in model.time_slice_info.iter() {
            let coordinator = Coordinator::new(
                model,
                &invoker,
                &work_area,
                year,
                time_slice,
                weight,
                &results,
            )?;
            let state = coordinator
                .run(|state| writer.write_marginal_costs(year, time_slice, state))
                .with_context(|| {
                    format!("Failed to coordinate year {year}, time slice {time_slice}")
                })?;
            coordinator.record(&state, &mut year_results)?;
            writer.write_time_slice(year, time_slice, &state)?;
        }

        results.merge(year, year_results);
        writer.write_year(year, model, &results)?;
        writer.flush()?;
    }

    Ok(results)
}
