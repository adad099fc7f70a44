//! Code for reading the technology parameters CSV file
use super::group_by_technology;
use crate::id::IDCollection;
use crate::input::{input_err_msg, read_csv};
use crate::technology::{TechnologyID, TechnologyParameter};
use crate::units::{Capacity, Dimensionless, MoneyPerActivity, MoneyPerCapacity};
use anyhow::{Context, Result, ensure};
use indexmap::IndexSet;
use log::warn;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

const TECHNOLOGY_PARAMETERS_FILE_NAME: &str = "technology_parameters.csv";

#[derive(PartialEq, Debug, Deserialize)]
struct TechnologyParameterRaw {
    technology_id: String,
    year: u32,
    capital_cost: Option<f64>,
    fixed_cost: Option<f64>,
    variable_cost: Option<f64>,
    residual_capacity: Option<f64>,
    max_capacity: Option<f64>,
    availability_factor: Option<f64>,
}

impl TechnologyParameterRaw {
    /// Validate the fields which cannot be left for the subproblem builder to deal with
    fn validate(&self) -> Result<()> {
        if let Some(residual) = self.residual_capacity {
            ensure!(
                residual.is_finite() && residual >= 0.0,
                "Residual capacity for technology {} must be a finite, non-negative number",
                self.technology_id
            );
        }

        if let Some(max) = self.max_capacity {
            ensure!(
                max.is_nan() || max >= 0.0,
                "Maximum capacity for technology {} cannot be negative",
                self.technology_id
            );
        }

        if let Some(factor) = self.availability_factor {
            ensure!(
                factor.is_nan() || (0.0..=1.0).contains(&factor),
                "Availability factor for technology {} must be between 0 and 1",
                self.technology_id
            );
        }

        Ok(())
    }

    fn into_parameter(self) -> TechnologyParameter {
        TechnologyParameter {
            capital_cost: self.capital_cost.map(MoneyPerCapacity),
            fixed_cost: self.fixed_cost.map(MoneyPerCapacity),
            variable_cost: self.variable_cost.map(MoneyPerActivity),
            residual_capacity: Capacity(self.residual_capacity.unwrap_or(0.0)),
            max_capacity: self.max_capacity.filter(|max| !max.is_nan()).map(Capacity),
            availability_factor: self.availability_factor.map(Dimensionless),
        }
    }
}

/// Read technology parameters from the specified model directory.
///
/// # Returns
///
/// A map of technology ID to parameters keyed by year
pub fn read_technology_parameters(
    model_dir: &Path,
    technology_ids: &IndexSet<TechnologyID>,
    milestone_years: &[u32],
) -> Result<HashMap<TechnologyID, HashMap<u32, TechnologyParameter>>> {
    let file_path = model_dir.join(TECHNOLOGY_PARAMETERS_FILE_NAME);
    let iter = read_csv::<TechnologyParameterRaw>(&file_path)?;
    read_technology_parameters_from_iter(iter, technology_ids, milestone_years)
        .with_context(|| input_err_msg(&file_path))
}

fn read_technology_parameters_from_iter<I>(
    iter: I,
    technology_ids: &IndexSet<TechnologyID>,
    milestone_years: &[u32],
) -> Result<HashMap<TechnologyID, HashMap<u32, TechnologyParameter>>>
where
    I: Iterator<Item = TechnologyParameterRaw>,
{
    let mut entries = Vec::new();
    for raw in iter {
        raw.validate()?;
        let id = technology_ids.get_id_by_str(&raw.technology_id)?;
        entries.push((id, (raw.year, raw.into_parameter())));
    }

    let mut map = HashMap::new();
    for (id, years) in group_by_technology(entries.into_iter()) {
        let mut by_year = HashMap::new();
        for (year, parameter) in years {
            ensure!(
                by_year.insert(year, parameter).is_none(),
                "More than one parameter provided for technology {id} in year {year}"
            );
        }

        for year in milestone_years {
            if !by_year.contains_key(year) {
                warn!("No parameters for technology {id} in milestone year {year}");
            }
        }

        map.insert(id, by_year);
    }

    Ok(map)
}
