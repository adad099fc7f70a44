//! The module responsible for writing output data to disk.
use crate::model::Model;
use crate::region::RegionID;
use crate::simulation::aggregate::CumulativeResults;
use crate::simulation::convergence::ConvergenceState;
use crate::technology::TechnologyID;
use crate::time_slice::TimeSliceID;
use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};

pub mod metadata;

/// The root folder in which model-specific output folders will be created
const OUTPUT_DIRECTORY_ROOT: &str = "shadowgrid_results";

/// The output file name for installed capacities
const CAPACITIES_FILE_NAME: &str = "capacities.csv";

/// The output file name for technology activity
const DISPATCH_FILE_NAME: &str = "dispatch.csv";

/// The output file name for marginal costs
const MARGINAL_COSTS_FILE_NAME: &str = "marginal_costs.csv";

/// The output file name for transmission flows
const TRANSMISSION_FLOWS_FILE_NAME: &str = "transmission_flows.csv";

/// The output file name for the outcome of each time slice's round loop
const CONVERGENCE_FILE_NAME: &str = "convergence.csv";

/// Get the model name from the specified directory path
pub fn get_output_dir(model_dir: &Path) -> Result<PathBuf> {
    // Canonicalise in case the user has specified "."
    let model_dir = model_dir
        .canonicalize()
        .context("Could not resolve path to model")?;

    let model_name = model_dir
        .file_name()
        .context("Model cannot be in root folder")?
        .to_str()
        .context("Invalid chars in model dir name")?;

    Ok([OUTPUT_DIRECTORY_ROOT, model_name].iter().collect())
}

/// Create a new output directory for the model.
///
/// An existing directory which isn't empty is only reused if `allow_overwrite` is true.
///
/// # Returns
///
/// Whether existing files will be overwritten
pub fn create_output_directory(output_dir: &Path, allow_overwrite: bool) -> Result<bool> {
    if output_dir.is_dir() {
        let is_empty = fs::read_dir(output_dir)?.next().is_none();
        if is_empty {
            return Ok(false);
        }

        ensure!(
            allow_overwrite,
            "Output folder already exists and is not empty. Use --overwrite to overwrite it."
        );
        fs::remove_dir_all(output_dir)?;
        fs::create_dir_all(output_dir)?;
        return Ok(true);
    }

    fs::create_dir_all(output_dir)?;

    Ok(false)
}

/// Represents a row in the capacities CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct CapacityRow {
    milestone_year: u32,
    region_id: RegionID,
    technology_id: TechnologyID,
    capacity: f64,
}

/// Represents a row in the dispatch CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct DispatchRow {
    milestone_year: u32,
    region_id: RegionID,
    technology_id: TechnologyID,
    time_slice: TimeSliceID,
    activity: f64,
}

/// Represents a row in the marginal costs CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct MarginalCostRow {
    milestone_year: u32,
    time_slice: TimeSliceID,
    iteration: u32,
    region_id: RegionID,
    import_cost: f64,
    export_cost: f64,
}

/// Represents a row in the transmission flows CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct TransmissionFlowRow {
    milestone_year: u32,
    time_slice: TimeSliceID,
    origin: RegionID,
    destination: RegionID,
    flow: i64,
}

/// Represents a row in the convergence CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct ConvergenceRow {
    milestone_year: u32,
    time_slice: TimeSliceID,
    status: String,
    iterations: u32,
    max_price_change: Option<f64>,
}

/// An object for writing simulation results to file
pub struct DataWriter {
    capacities_writer: csv::Writer<File>,
    dispatch_writer: csv::Writer<File>,
    marginal_costs_writer: csv::Writer<File>,
    flows_writer: csv::Writer<File>,
    convergence_writer: csv::Writer<File>,
}

impl DataWriter {
    /// Open CSV files to write output data to
    ///
    /// # Arguments
    ///
    /// * `output_path` - Folder where files will be saved
    pub fn create(output_path: &Path) -> Result<Self> {
        let new_writer = |file_name| {
            let file_path = output_path.join(file_name);
            csv::Writer::from_path(file_path)
        };

        Ok(Self {
            capacities_writer: new_writer(CAPACITIES_FILE_NAME)?,
            dispatch_writer: new_writer(DISPATCH_FILE_NAME)?,
            marginal_costs_writer: new_writer(MARGINAL_COSTS_FILE_NAME)?,
            flows_writer: new_writer(TRANSMISSION_FLOWS_FILE_NAME)?,
            convergence_writer: new_writer(CONVERGENCE_FILE_NAME)?,
        })
    }

    /// Write the marginal costs estimated in the latest round
    pub fn write_marginal_costs(
        &mut self,
        milestone_year: u32,
        time_slice: &TimeSliceID,
        state: &ConvergenceState,
    ) -> Result<()> {
        for (region_id, costs) in state.costs.iter().flatten() {
            self.marginal_costs_writer.serialize(MarginalCostRow {
                milestone_year,
                time_slice: time_slice.clone(),
                iteration: state.iteration,
                region_id: region_id.clone(),
                import_cost: costs.import.value(),
                export_cost: costs.export.value(),
            })?;
        }

        Ok(())
    }

    /// Write the outcome of the round loop for one time slice.
    ///
    /// The flows written are those the final dispatch was solved against.
    pub fn write_time_slice(
        &mut self,
        milestone_year: u32,
        time_slice: &TimeSliceID,
        state: &ConvergenceState,
    ) -> Result<()> {
        for (origin, destination, flow) in state.solved_flows.iter() {
            self.flows_writer.serialize(TransmissionFlowRow {
                milestone_year,
                time_slice: time_slice.clone(),
                origin: origin.clone(),
                destination: destination.clone(),
                flow,
            })?;
        }

        self.convergence_writer.serialize(ConvergenceRow {
            milestone_year,
            time_slice: time_slice.clone(),
            status: state.phase.to_string(),
            iterations: state.iteration,
            max_price_change: state.max_price_change.map(|change| change.value()),
        })?;

        Ok(())
    }

    /// Write capacities and dispatch for a milestone year
    pub fn write_year(
        &mut self,
        milestone_year: u32,
        model: &Model,
        results: &CumulativeResults,
    ) -> Result<()> {
        let region_of = |technology_id: &TechnologyID| {
            model
                .technologies
                .get(technology_id)
                .map(|technology| technology.region_id.clone())
                .with_context(|| format!("Unknown technology {technology_id}"))
        };

        for (technology_id, year, capacity) in results.iter_capacity() {
            if year != milestone_year {
                continue;
            }
            self.capacities_writer.serialize(CapacityRow {
                milestone_year,
                region_id: region_of(technology_id)?,
                technology_id: technology_id.clone(),
                capacity: capacity.value(),
            })?;
        }

        for (technology_id, year, time_slice, activity) in results.iter_dispatch() {
            if year != milestone_year {
                continue;
            }
            self.dispatch_writer.serialize(DispatchRow {
                milestone_year,
                region_id: region_of(technology_id)?,
                technology_id: technology_id.clone(),
                time_slice: time_slice.clone(),
                activity: activity.value(),
            })?;
        }

        Ok(())
    }

    /// Flush the underlying streams
    pub fn flush(&mut self) -> Result<()> {
        self.capacities_writer.flush()?;
        self.dispatch_writer.flush()?;
        self.marginal_costs_writer.flush()?;
        self.flows_writer.flush()?;
        self.convergence_writer.flush()?;

        Ok(())
    }
}
