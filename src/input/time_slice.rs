//! Code for reading in time slice info from a CSV file.
use super::{
    check_values_sum_to_one_approx, deserialise_proportion_nonzero, input_err_msg, read_csv,
};
use crate::id::check_id_format;
use crate::time_slice::{TimeSliceID, TimeSliceInfo};
use crate::units::Dimensionless;
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;

const TIME_SLICES_FILE_NAME: &str = "time_slices.csv";

/// A time slice record retrieved from a CSV file
#[derive(PartialEq, Debug, Deserialize)]
struct TimeSliceRaw {
    id: String,
    #[serde(deserialize_with = "deserialise_proportion_nonzero")]
    fraction: Dimensionless,
}

/// Read time slice information from an iterator of raw time slice records
fn read_time_slice_info_from_iter<I>(iter: I) -> Result<TimeSliceInfo>
where
    I: Iterator<Item = TimeSliceRaw>,
{
    let mut fractions = IndexMap::new();
    for time_slice in iter {
        check_id_format(&time_slice.id)?;
        let id = TimeSliceID::from(time_slice.id);
        ensure!(
            fractions.insert(id.clone(), time_slice.fraction).is_none(),
            "Duplicate time slice entry for {id}",
        );
    }

    check_values_sum_to_one_approx(fractions.values().copied())
        .context("Invalid time slice fractions")?;

    Ok(TimeSliceInfo { fractions })
}

/// Read time slices from a CSV file.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
///
/// # Returns
///
/// This function returns a `TimeSliceInfo` struct or, if the file doesn't exist, a single time
/// slice covering the whole year (see `TimeSliceInfo::default()`).
pub fn read_time_slice_info(model_dir: &Path) -> Result<TimeSliceInfo> {
    let file_path = model_dir.join(TIME_SLICES_FILE_NAME);
    if !file_path.exists() {
        return Ok(TimeSliceInfo::default());
    }

    let time_slices_csv = read_csv(&file_path)?;
    read_time_slice_info_from_iter(time_slices_csv).with_context(|| input_err_msg(&file_path))
}
