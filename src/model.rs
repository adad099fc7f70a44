//! The model represents the static input data provided by the user.
use crate::agent::AgentMap;
use crate::region::RegionMap;
use crate::technology::TechnologyMap;
use crate::time_slice::TimeSliceInfo;
use crate::topology::Topology;
use std::path::PathBuf;

pub mod parameters;
pub use parameters::ModelParameters;

/// Model definition
pub struct Model {
    /// Path to model folder
    pub model_path: PathBuf,
    /// Parameters from the model TOML file
    pub parameters: ModelParameters,
    /// Information about time slices
    pub time_slice_info: TimeSliceInfo,
    /// Regions for the simulation
    pub regions: RegionMap,
    /// All technologies, across regions
    pub technologies: TechnologyMap,
    /// Agents for the simulation, one per region
    pub agents: AgentMap,
    /// Transmission links between regions
    pub topology: Topology,
}

impl Model {
    /// Iterate over the model's milestone years.
    pub fn iter_years(&self) -> impl Iterator<Item = u32> + '_ {
        self.parameters.milestone_years.iter().copied()
    }
}
