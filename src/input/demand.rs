//! Code for reading annual demand and its split across time slices.
use super::{check_values_sum_to_one_approx, input_err_msg, read_csv, read_csv_optional};
use crate::id::IDCollection;
use crate::region::{RegionID, RegionMap};
use crate::time_slice::{TimeSliceID, TimeSliceInfo};
use crate::units::{Activity, Dimensionless};
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

const DEMAND_FILE_NAME: &str = "demand.csv";
const DEMAND_SLICING_FILE_NAME: &str = "demand_slicing.csv";

#[derive(PartialEq, Debug, Deserialize)]
struct DemandRaw {
    region_id: String,
    year: u32,
    demand: f64,
}

#[derive(PartialEq, Debug, Deserialize)]
struct DemandSliceRaw {
    region_id: String,
    time_slice: String,
    fraction: f64,
}

/// Annual demand for each region and year
pub type AnnualDemandMap = HashMap<RegionID, HashMap<u32, Activity>>;

/// The fraction of annual demand in each time slice, per region
pub type DemandProfileMap = HashMap<RegionID, IndexMap<TimeSliceID, Dimensionless>>;

/// Demand data for all regions
pub struct DemandData {
    /// Annual demand
    pub annual: AnnualDemandMap,
    /// Time slice profiles
    pub profiles: DemandProfileMap,
}

/// Read demand data from the specified model directory.
///
/// Every region must have a demand for every milestone year. The demand profile file is optional:
/// regions with no entries take the time slice fractions as their profile.
pub fn read_demand(
    model_dir: &Path,
    regions: &RegionMap,
    time_slice_info: &TimeSliceInfo,
    milestone_years: &[u32],
) -> Result<DemandData> {
    let file_path = model_dir.join(DEMAND_FILE_NAME);
    let iter = read_csv::<DemandRaw>(&file_path)?;
    let annual = read_demand_from_iter(iter, regions, milestone_years)
        .with_context(|| input_err_msg(&file_path))?;

    let file_path = model_dir.join(DEMAND_SLICING_FILE_NAME);
    let iter = read_csv_optional::<DemandSliceRaw>(&file_path)?;
    let profiles = read_demand_slicing_from_iter(iter, regions, time_slice_info)
        .with_context(|| input_err_msg(&file_path))?;

    Ok(DemandData { annual, profiles })
}

fn read_demand_from_iter<I>(
    iter: I,
    regions: &RegionMap,
    milestone_years: &[u32],
) -> Result<AnnualDemandMap>
where
    I: Iterator<Item = DemandRaw>,
{
    let mut map: AnnualDemandMap = HashMap::new();
    for raw in iter {
        let region_id = regions.get_id_by_str(&raw.region_id)?;
        ensure!(
            raw.demand.is_finite() && raw.demand >= 0.0,
            "Demand for region {region_id} in year {} must be a finite, non-negative number",
            raw.year
        );

        let by_year = map.entry(region_id.clone()).or_default();
        ensure!(
            by_year.insert(raw.year, Activity(raw.demand)).is_none(),
            "Duplicate demand entry for region {region_id} in year {}",
            raw.year
        );
    }

    for region_id in regions.keys() {
        for year in milestone_years {
            ensure!(
                map.get(region_id).is_some_and(|m| m.contains_key(year)),
                "Missing demand for region {region_id} in milestone year {year}"
            );
        }
    }

    Ok(map)
}

fn read_demand_slicing_from_iter<I>(
    iter: I,
    regions: &RegionMap,
    time_slice_info: &TimeSliceInfo,
) -> Result<DemandProfileMap>
where
    I: Iterator<Item = DemandSliceRaw>,
{
    let mut given: HashMap<RegionID, IndexMap<TimeSliceID, Dimensionless>> = HashMap::new();
    for raw in iter {
        let region_id = regions.get_id_by_str(&raw.region_id)?;
        let time_slice = time_slice_info.get_time_slice_id_from_str(&raw.time_slice)?;
        ensure!(
            (0.0..=1.0).contains(&raw.fraction),
            "Demand fraction for region {region_id} in time slice {time_slice} must be \
            between 0 and 1"
        );

        let profile = given.entry(region_id.clone()).or_default();
        ensure!(
            profile
                .insert(time_slice.clone(), Dimensionless(raw.fraction))
                .is_none(),
            "Duplicate demand fraction for region {region_id} in time slice {time_slice}"
        );
    }

    let mut profiles = HashMap::new();
    for region_id in regions.keys() {
        let profile = match given.remove(region_id) {
            None => time_slice_info.fractions.clone(),
            Some(profile) => {
                for time_slice in time_slice_info.iter_ids() {
                    ensure!(
                        profile.contains_key(time_slice),
                        "Missing demand fraction for region {region_id} in time slice \
                        {time_slice}"
                    );
                }
                check_values_sum_to_one_approx(profile.values().copied()).with_context(|| {
                    format!("Invalid demand fractions for region {region_id}")
                })?;

                // Keep time slice order
                time_slice_info
                    .iter_ids()
                    .map(|ts| (ts.clone(), profile[ts]))
                    .collect()
            }
        };
        profiles.insert(region_id.clone(), profile);
    }

    Ok(profiles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, regions, time_slice_info};
    use rstest::rstest;

    fn demand(region_id: &str, year: u32, demand: f64) -> DemandRaw {
        DemandRaw {
            region_id: region_id.into(),
            year,
            demand,
        }
    }

    fn slice(region_id: &str, time_slice: &str, fraction: f64) -> DemandSliceRaw {
        DemandSliceRaw {
            region_id: region_id.into(),
            time_slice: time_slice.into(),
            fraction,
        }
    }

    #[rstest]
    fn test_read_demand_from_iter(regions: RegionMap) {
        let map = read_demand_from_iter(
            [demand("GBR", 2020, 100.0), demand("FRA", 2020, 80.0)].into_iter(),
            &regions,
            &[2020],
        )
        .unwrap();
        assert_eq!(map[&RegionID::new("GBR")][&2020], Activity(100.0));
    }

    #[rstest]
    fn test_read_demand_from_iter_missing_year(regions: RegionMap) {
        assert_error!(
            read_demand_from_iter(
                [demand("GBR", 2020, 100.0), demand("FRA", 2020, 80.0)].into_iter(),
                &regions,
                &[2020, 2030],
            ),
            "Missing demand for region GBR in milestone year 2030"
        );
    }

    #[rstest]
    fn test_read_demand_from_iter_negative(regions: RegionMap) {
        assert!(
            read_demand_from_iter(
                [demand("GBR", 2020, -1.0), demand("FRA", 2020, 80.0)].into_iter(),
                &regions,
                &[2020],
            )
            .is_err()
        );
    }

    #[rstest]
    fn test_read_demand_slicing_default(regions: RegionMap, time_slice_info: TimeSliceInfo) {
        let profiles =
            read_demand_slicing_from_iter(std::iter::empty(), &regions, &time_slice_info).unwrap();
        assert_eq!(profiles[&RegionID::new("GBR")], time_slice_info.fractions);
    }

    #[rstest]
    fn test_read_demand_slicing_given(regions: RegionMap, time_slice_info: TimeSliceInfo) {
        let profiles = read_demand_slicing_from_iter(
            [slice("GBR", "night", 0.3), slice("GBR", "day", 0.7)].into_iter(),
            &regions,
            &time_slice_info,
        )
        .unwrap();

        let profile = &profiles[&RegionID::new("GBR")];
        assert_eq!(profile.get_index(0).unwrap().0, &TimeSliceID::new("day"));
        assert_eq!(profile[&TimeSliceID::new("day")], Dimensionless(0.7));
        assert_eq!(profiles[&RegionID::new("FRA")], time_slice_info.fractions);
    }

    #[rstest]
    fn test_read_demand_slicing_bad_sum(regions: RegionMap, time_slice_info: TimeSliceInfo) {
        assert!(
            read_demand_slicing_from_iter(
                [slice("GBR", "night", 0.3), slice("GBR", "day", 0.3)].into_iter(),
                &regions,
                &time_slice_info,
            )
            .is_err()
        );
    }

    #[rstest]
    fn test_read_demand_slicing_missing_slice(
        regions: RegionMap,
        time_slice_info: TimeSliceInfo,
    ) {
        assert_error!(
            read_demand_slicing_from_iter(
                [slice("GBR", "day", 1.0)].into_iter(),
                &regions,
                &time_slice_info,
            ),
            "Missing demand fraction for region GBR in time slice night"
        );
    }
}
