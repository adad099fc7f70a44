//! Code for reading per-time slice capacity factors for technologies
use super::group_by_technology;
use crate::id::IDCollection;
use crate::input::{input_err_msg, read_csv};
use crate::technology::TechnologyID;
use crate::time_slice::{TimeSliceID, TimeSliceInfo};
use crate::units::Dimensionless;
use anyhow::{Context, Result, ensure};
use indexmap::IndexSet;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

const CAPACITY_FACTORS_FILE_NAME: &str = "capacity_factors.csv";

#[derive(PartialEq, Debug, Deserialize)]
struct CapacityFactorRaw {
    technology_id: String,
    time_slice: String,
    capacity_factor: f64,
}

/// Read capacity factors from the specified model directory.
///
/// Time slices without an entry are left out of the map for that technology.
pub fn read_capacity_factors(
    model_dir: &Path,
    technology_ids: &IndexSet<TechnologyID>,
    time_slice_info: &TimeSliceInfo,
) -> Result<HashMap<TechnologyID, HashMap<TimeSliceID, Dimensionless>>> {
    let file_path = model_dir.join(CAPACITY_FACTORS_FILE_NAME);
    let iter = read_csv::<CapacityFactorRaw>(&file_path)?;
    read_capacity_factors_from_iter(iter, technology_ids, time_slice_info)
        .with_context(|| input_err_msg(&file_path))
}

fn read_capacity_factors_from_iter<I>(
    iter: I,
    technology_ids: &IndexSet<TechnologyID>,
    time_slice_info: &TimeSliceInfo,
) -> Result<HashMap<TechnologyID, HashMap<TimeSliceID, Dimensionless>>>
where
    I: Iterator<Item = CapacityFactorRaw>,
{
    let mut entries = Vec::new();
    for raw in iter {
        let id = technology_ids.get_id_by_str(&raw.technology_id)?;
        let time_slice = time_slice_info.get_time_slice_id_from_str(&raw.time_slice)?;
        ensure!(
            raw.capacity_factor.is_nan() || (0.0..=1.0).contains(&raw.capacity_factor),
            "Capacity factor for technology {id} in time slice {time_slice} must be between 0 \
            and 1"
        );
        entries.push((id, (time_slice, Dimensionless(raw.capacity_factor))));
    }

    let mut map = HashMap::new();
    for (id, factors) in group_by_technology(entries.into_iter()) {
        let mut by_time_slice = HashMap::new();
        for (time_slice, factor) in factors {
            ensure!(
                by_time_slice.insert(time_slice.clone(), factor).is_none(),
                "Duplicate capacity factor for technology {id} in time slice {time_slice}"
            );
        }
        map.insert(id, by_time_slice);
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::time_slice_info;
    use rstest::rstest;

    fn raw(time_slice: &str, capacity_factor: f64) -> CapacityFactorRaw {
        CapacityFactorRaw {
            technology_id: "wind".into(),
            time_slice: time_slice.into(),
            capacity_factor,
        }
    }

    fn technology_ids() -> IndexSet<TechnologyID> {
        ["wind".into()].into_iter().collect()
    }

    #[rstest]
    fn test_read_capacity_factors_from_iter(time_slice_info: TimeSliceInfo) {
        let map = read_capacity_factors_from_iter(
            [raw("day", 0.8), raw("night", 0.2)].into_iter(),
            &technology_ids(),
            &time_slice_info,
        )
        .unwrap();
        assert_eq!(map["wind"][&TimeSliceID::new("day")], Dimensionless(0.8));
        assert_eq!(map["wind"].len(), 2);
    }

    #[rstest]
    #[case(raw("dusk", 0.5))] // Unknown time slice
    #[case(raw("day", 1.5))] // Out of range
    fn test_read_capacity_factors_from_iter_invalid(
        time_slice_info: TimeSliceInfo,
        #[case] entry: CapacityFactorRaw,
    ) {
        assert!(
            read_capacity_factors_from_iter(
                [entry].into_iter(),
                &technology_ids(),
                &time_slice_info
            )
            .is_err()
        );
    }

    #[rstest]
    fn test_read_capacity_factors_from_iter_duplicate(time_slice_info: TimeSliceInfo) {
        assert!(
            read_capacity_factors_from_iter(
                [raw("day", 0.8), raw("day", 0.7)].into_iter(),
                &technology_ids(),
                &time_slice_info
            )
            .is_err()
        );
    }
}
