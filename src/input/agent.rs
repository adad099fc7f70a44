//! Code for assembling agents from regions, technologies and demand.
use super::demand::DemandData;
use crate::agent::{Agent, AgentMap};
use crate::region::RegionMap;
use crate::technology::TechnologyMap;
use log::warn;
use std::rc::Rc;

/// Create one agent per region, owning that region's technologies and demand
pub fn build_agents(
    regions: &RegionMap,
    technologies: &TechnologyMap,
    mut demand: DemandData,
) -> AgentMap {
    regions
        .keys()
        .map(|region_id| {
            let region_technologies: Vec<_> = technologies
                .values()
                .filter(|technology| &technology.region_id == region_id)
                .map(Rc::clone)
                .collect();
            if region_technologies.is_empty() {
                warn!("Region {region_id} has no technologies");
            }

            let agent = Agent {
                id: region_id.clone(),
                technologies: region_technologies,
                annual_demand: demand.annual.remove(region_id).unwrap_or_default(),
                demand_profile: demand.profiles.remove(region_id).unwrap_or_default(),
            };
            (region_id.clone(), agent)
        })
        .collect()
}
