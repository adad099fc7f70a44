//! Code for reading region-related information from CSV files.
use super::read_csv_id_file;
use crate::region::RegionMap;
use anyhow::Result;
use std::path::Path;

const REGIONS_FILE_NAME: &str = "regions.csv";

/// Reads regions from a CSV file.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
///
/// # Returns
///
/// A map of regions, in file order, or an error
pub fn read_regions(model_dir: &Path) -> Result<RegionMap> {
    read_csv_id_file(&model_dir.join(REGIONS_FILE_NAME))
}
