//! Code for reading technology-related information from CSV files.
use super::{input_err_msg, read_csv};
use crate::id::{IDCollection, check_id_format};
use crate::region::{RegionID, RegionMap};
use crate::technology::{Technology, TechnologyID, TechnologyMap};
use crate::time_slice::TimeSliceInfo;
use crate::units::ActivityPerCapacity;
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

mod capacity_factor;
use capacity_factor::read_capacity_factors;
mod parameter;
use parameter::read_technology_parameters;

const TECHNOLOGIES_FILE_NAME: &str = "technologies.csv";

#[derive(PartialEq, Debug, Deserialize)]
struct TechnologyRaw {
    id: TechnologyID,
    region_id: String,
    description: String,
    operational_life: Option<u32>,
    capacity_to_activity: Option<f64>,
}

/// Basic technology data, before the per-year and per-time slice data have been attached
#[derive(Debug)]
struct TechnologyBase {
    region_id: RegionID,
    description: String,
    operational_life: Option<u32>,
    capacity_to_activity: Option<ActivityPerCapacity>,
}

/// Read technology information from the specified model directory.
///
/// Technologies are read from three files: one with the basic technology definitions, one with
/// per-year cost and capacity parameters and one with per-time slice capacity factors. Fields
/// which a technology needs in order to be used in a subproblem may be empty; such technologies
/// are left out of the subproblems they cannot be encoded in.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
/// * `regions` - All known regions
/// * `time_slice_info` - Information about time slices
/// * `milestone_years` - All milestone years
pub fn read_technologies(
    model_dir: &Path,
    regions: &RegionMap,
    time_slice_info: &TimeSliceInfo,
    milestone_years: &[u32],
) -> Result<TechnologyMap> {
    let file_path = model_dir.join(TECHNOLOGIES_FILE_NAME);
    let bases = read_technologies_file(&file_path, regions)?;
    let technology_ids = bases.keys().cloned().collect();
    let mut parameters =
        read_technology_parameters(model_dir, &technology_ids, milestone_years)?;
    let mut capacity_factors = read_capacity_factors(model_dir, &technology_ids, time_slice_info)?;

    let technologies = bases
        .into_iter()
        .map(|(id, base)| {
            let technology = Technology {
                region_id: base.region_id,
                description: base.description,
                operational_life: base.operational_life,
                capacity_to_activity: base.capacity_to_activity,
                parameters: parameters.remove(&id).unwrap_or_default(),
                capacity_factors: capacity_factors.remove(&id).unwrap_or_default(),
                id: id.clone(),
            };
            (id, Rc::new(technology))
        })
        .collect();

    Ok(technologies)
}

fn read_technologies_file(
    file_path: &Path,
    regions: &RegionMap,
) -> Result<IndexMap<TechnologyID, TechnologyBase>> {
    let iter = read_csv::<TechnologyRaw>(file_path)?;
    read_technologies_from_iter(iter, regions).with_context(|| input_err_msg(file_path))
}

fn read_technologies_from_iter<I>(
    iter: I,
    regions: &RegionMap,
) -> Result<IndexMap<TechnologyID, TechnologyBase>>
where
    I: Iterator<Item = TechnologyRaw>,
{
    let mut technologies = IndexMap::new();
    for raw in iter {
        check_id_format(raw.id.as_str())?;
        let region_id = regions.get_id_by_str(&raw.region_id)?;

        if let Some(life) = raw.operational_life {
            ensure!(
                life > 0,
                "Operational life for technology {} must be greater than zero",
                raw.id
            );
        }
        if let Some(c2a) = raw.capacity_to_activity {
            ensure!(
                c2a.is_nan() || c2a >= 0.0,
                "capacity_to_activity for technology {} cannot be negative",
                raw.id
            );
        }

        let base = TechnologyBase {
            region_id,
            description: raw.description,
            operational_life: raw.operational_life,
            capacity_to_activity: raw.capacity_to_activity.map(ActivityPerCapacity),
        };
        ensure!(
            technologies.insert(raw.id.clone(), base).is_none(),
            "Duplicate technology ID found: {}",
            raw.id
        );
    }

    Ok(technologies)
}

/// Group per-technology data by technology ID
fn group_by_technology<T>(
    entries: impl Iterator<Item = (TechnologyID, T)>,
) -> HashMap<TechnologyID, Vec<T>> {
    let mut map: HashMap<TechnologyID, Vec<T>> = HashMap::new();
    for (id, entry) in entries {
        map.entry(id).or_default().push(entry);
    }
    map
}
