//! Agents are the independent decision makers in the simulation, one per region.
use crate::region::RegionID;
use crate::technology::Technology;
use crate::time_slice::TimeSliceID;
use crate::units::{Activity, Dimensionless};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::rc::Rc;

/// A map of [`Agent`]s, keyed by the ID of the region they plan
pub type AgentMap = IndexMap<RegionID, Agent>;

/// The planner for a single region
#[derive(Debug, PartialEq)]
pub struct Agent {
    /// The region this agent plans for
    pub id: RegionID,
    /// The technologies available to the agent, in input order
    pub technologies: Vec<Rc<Technology>>,
    /// Annual demand for each milestone year
    pub annual_demand: HashMap<u32, Activity>,
    /// The fraction of annual demand falling in each time slice
    pub demand_profile: IndexMap<TimeSliceID, Dimensionless>,
}

impl Agent {
    /// The demand the agent must meet in the given year and time slice
    pub fn demand(&self, year: u32, time_slice: &TimeSliceID) -> Result<Activity> {
        let annual = self
            .annual_demand
            .get(&year)
            .with_context(|| format!("No demand for region {} in year {year}", self.id))?;
        let fraction = self.demand_profile.get(time_slice).with_context(|| {
            format!(
                "No demand profile for region {} in time slice {time_slice}",
                self.id
            )
        })?;

        Ok(*annual * *fraction)
    }
}
