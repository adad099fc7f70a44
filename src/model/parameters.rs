//! Defines the `ModelParameters` struct, which represents the contents of `model.toml`.
use crate::input::{input_err_msg, is_sorted_and_unique, read_toml};
use crate::units::{Dimensionless, MoneyPerActivity};
use anyhow::{Context, Result, ensure};
use serde::Deserialize;
use std::path::Path;

const MODEL_PARAMETERS_FILE_NAME: &str = "model.toml";

macro_rules! define_unit_param_default {
    ($name:ident, $type: ty, $value: expr) => {
        fn $name() -> $type {
            <$type>::new($value)
        }
    };
}

macro_rules! define_param_default {
    ($name:ident, $type: ty, $value: expr) => {
        fn $name() -> $type {
            $value
        }
    };
}

define_unit_param_default!(default_demand_perturbation, Dimensionless, 0.05);
define_unit_param_default!(default_price_tolerance, MoneyPerActivity, 1e-3);
define_unit_param_default!(default_discount_rate, Dimensionless, 0.05);
define_unit_param_default!(default_transmission_cost, MoneyPerActivity, 0.0);
define_unit_param_default!(default_link_capacity_to_activity, Dimensionless, 1.0);
define_unit_param_default!(default_price_relaxation, Dimensionless, 1.0);
define_param_default!(default_max_iterations, u32, 10);
define_param_default!(default_factor_precision, u32, 1000);
define_param_default!(default_cost_precision, f64, 1.0);

/// Represents the contents of the entire model file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ModelParameters {
    /// Milestone years
    pub milestone_years: Vec<u32>,
    /// The demand perturbation used for estimating marginal costs, as a fraction of demand
    #[serde(default = "default_demand_perturbation")]
    pub demand_perturbation: Dimensionless,
    /// Largest round-over-round change in marginal costs at which prices are considered converged
    #[serde(default = "default_price_tolerance")]
    pub price_tolerance: MoneyPerActivity,
    /// The maximum number of coordination rounds per time slice
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Discount rate used for annualising capital costs
    #[serde(default = "default_discount_rate")]
    pub discount_rate: Dimensionless,
    /// Cost of moving one unit of activity along a transmission link
    #[serde(default = "default_transmission_cost")]
    pub transmission_cost: MoneyPerActivity,
    /// Factor for converting nominal link capacity into annual activity
    #[serde(default = "default_link_capacity_to_activity")]
    pub link_capacity_to_activity: Dimensionless,
    /// Fixed-point scale for productivity factors in subproblems.
    ///
    /// Don't change unless you know what you're doing.
    #[serde(default = "default_factor_precision")]
    pub factor_precision: u32,
    /// Scale applied to costs before rounding them to integers in subproblems
    #[serde(default = "default_cost_precision")]
    pub cost_precision: f64,
    /// Weight given to newly estimated marginal costs when blending with the previous round's.
    ///
    /// A value of one means no damping.
    #[serde(default = "default_price_relaxation")]
    pub price_relaxation: Dimensionless,
}

/// Check that the `milestone_years` parameter is valid
fn check_milestone_years(years: &[u32]) -> Result<()> {
    ensure!(!years.is_empty(), "`milestone_years` is empty");

    ensure!(
        is_sorted_and_unique(years),
        "`milestone_years` must be composed of unique values in order"
    );

    Ok(())
}

/// Check that the `demand_perturbation` parameter is valid
fn check_demand_perturbation(value: Dimensionless) -> Result<()> {
    ensure!(
        value > Dimensionless(0.0) && value < Dimensionless(1.0),
        "demand_perturbation must be greater than zero and less than one"
    );

    Ok(())
}

/// Check the `price_tolerance` parameter is valid
fn check_price_tolerance(value: MoneyPerActivity) -> Result<()> {
    ensure!(
        value.is_finite() && value >= MoneyPerActivity(0.0),
        "price_tolerance must be a finite number greater than or equal to zero"
    );

    Ok(())
}

/// Check that the `max_iterations` parameter is valid
fn check_max_iterations(value: u32) -> Result<()> {
    ensure!(value > 0, "max_iterations cannot be zero");

    Ok(())
}

/// Check the `discount_rate` parameter is valid
fn check_discount_rate(value: Dimensionless) -> Result<()> {
    ensure!(
        value.is_finite() && value >= Dimensionless(0.0),
        "discount_rate must be a finite number greater than or equal to zero"
    );

    Ok(())
}

/// Check the `transmission_cost` parameter is valid
fn check_transmission_cost(value: MoneyPerActivity) -> Result<()> {
    ensure!(
        value.is_finite() && value >= MoneyPerActivity(0.0),
        "transmission_cost must be a finite number greater than or equal to zero"
    );

    Ok(())
}

/// Check a parameter which must be a finite number greater than zero
fn check_positive(name: &str, value: f64) -> Result<()> {
    ensure!(
        value.is_finite() && value > 0.0,
        "{name} must be a finite number greater than zero"
    );

    Ok(())
}

/// Check that the `price_relaxation` parameter is valid
fn check_price_relaxation(value: Dimensionless) -> Result<()> {
    ensure!(
        value > Dimensionless(0.0) && value <= Dimensionless(1.0),
        "price_relaxation must be greater than zero and at most one"
    );

    Ok(())
}

impl ModelParameters {
    /// Read a model file from the specified directory.
    ///
    /// # Arguments
    ///
    /// * `model_dir` - Folder containing model configuration files
    ///
    /// # Returns
    ///
    /// The model file contents as a [`ModelParameters`] struct or an error if the file is invalid
    pub fn from_path<P: AsRef<Path>>(model_dir: P) -> Result<ModelParameters> {
        let file_path = model_dir.as_ref().join(MODEL_PARAMETERS_FILE_NAME);
        let model_params: ModelParameters = read_toml(&file_path)?;

        model_params
            .validate()
            .with_context(|| input_err_msg(file_path))?;

        Ok(model_params)
    }

    /// Validate parameters after reading in file
    fn validate(&self) -> Result<()> {
        check_milestone_years(&self.milestone_years)?;
        check_demand_perturbation(self.demand_perturbation)?;
        check_price_tolerance(self.price_tolerance)?;
        check_max_iterations(self.max_iterations)?;
        check_discount_rate(self.discount_rate)?;
        check_transmission_cost(self.transmission_cost)?;
        check_positive(
            "link_capacity_to_activity",
            self.link_capacity_to_activity.value(),
        )?;
        check_positive("factor_precision", self.factor_precision as f64)?;
        check_positive("cost_precision", self.cost_precision)?;
        check_price_relaxation(self.price_relaxation)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::fmt::Display;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    /// Helper function to assert validation result based on expected validity
    fn assert_validation_result<T, U: Display>(
        result: Result<T>,
        expected_valid: bool,
        value: U,
        expected_error_fragment: &str,
    ) {
        if expected_valid {
            assert!(
                result.is_ok(),
                "Expected value {} to be valid, but got error: {:?}",
                value,
                result.err()
            );
        } else {
            assert!(
                result.is_err(),
                "Expected value {value} to be invalid, but it was accepted",
            );
            let error_message = result.err().unwrap().to_string();
            assert!(
                error_message.contains(expected_error_fragment),
                "Error message should mention the validation constraint, got: {error_message}",
            );
        }
    }

    #[test]
    fn test_check_milestone_years() {
        // Valid
        assert!(check_milestone_years(&[1]).is_ok());
        assert!(check_milestone_years(&[1, 2]).is_ok());

        // Invalid
        assert!(check_milestone_years(&[]).is_err());
        assert!(check_milestone_years(&[1, 1]).is_err());
        assert!(check_milestone_years(&[2, 1]).is_err());
    }

    #[test]
    fn test_model_params_from_path_defaults() {
        let dir = tempdir().unwrap();
        {
            let mut file = File::create(dir.path().join(MODEL_PARAMETERS_FILE_NAME)).unwrap();
            writeln!(file, "milestone_years = [2020, 2030]").unwrap();
        }

        let model_params = ModelParameters::from_path(dir.path()).unwrap();
        assert_eq!(model_params.milestone_years, [2020, 2030]);
        assert_eq!(model_params.demand_perturbation, Dimensionless(0.05));
        assert_eq!(model_params.max_iterations, 10);
        assert_eq!(model_params.factor_precision, 1000);
        assert_eq!(model_params.price_relaxation, Dimensionless(1.0));
    }

    #[test]
    fn test_model_params_from_path_invalid() {
        let dir = tempdir().unwrap();
        {
            let mut file = File::create(dir.path().join(MODEL_PARAMETERS_FILE_NAME)).unwrap();
            writeln!(file, "milestone_years = [2020]\nmax_iterations = 0").unwrap();
        }

        assert!(ModelParameters::from_path(dir.path()).is_err());
    }

    #[rstest]
    #[case(0.01, true)]
    #[case(0.05, true)]
    #[case(0.999, true)]
    #[case(0.0, false)]
    #[case(1.0, false)]
    #[case(-0.1, false)]
    #[case(f64::NAN, false)]
    fn test_check_demand_perturbation(#[case] value: f64, #[case] expected_valid: bool) {
        assert_validation_result(
            check_demand_perturbation(Dimensionless(value)),
            expected_valid,
            value,
            "demand_perturbation must be greater than zero and less than one",
        );
    }

    #[rstest]
    #[case(0.0, true)] // Valid minimum value (exactly zero)
    #[case(1e-3, true)] // Valid default value
    #[case(f64::MAX, true)] // Valid maximum finite value
    #[case(-1e-10, false)] // Invalid: negative value
    #[case(f64::INFINITY, false)] // Invalid: infinite value
    #[case(f64::NAN, false)] // Invalid: NaN value
    fn test_check_price_tolerance(#[case] value: f64, #[case] expected_valid: bool) {
        assert_validation_result(
            check_price_tolerance(MoneyPerActivity(value)),
            expected_valid,
            value,
            "price_tolerance must be a finite number greater than or equal to zero",
        );
    }

    #[rstest]
    #[case(1, true)]
    #[case(u32::MAX, true)]
    #[case(0, false)]
    fn test_check_max_iterations(#[case] value: u32, #[case] expected_valid: bool) {
        assert_validation_result(
            check_max_iterations(value),
            expected_valid,
            value,
            "max_iterations cannot be zero",
        );
    }

    #[rstest]
    #[case(1.0, true)]
    #[case(1e-9, true)]
    #[case(0.0, false)]
    #[case(-2.0, false)]
    #[case(f64::INFINITY, false)]
    fn test_check_positive(#[case] value: f64, #[case] expected_valid: bool) {
        assert_validation_result(
            check_positive("cost_precision", value),
            expected_valid,
            value,
            "cost_precision must be a finite number greater than zero",
        );
    }

    #[rstest]
    #[case(1.0, true)] // No damping
    #[case(0.5, true)]
    #[case(0.0, false)]
    #[case(1.5, false)]
    fn test_check_price_relaxation(#[case] value: f64, #[case] expected_valid: bool) {
        assert_validation_result(
            check_price_relaxation(Dimensionless(value)),
            expected_valid,
            value,
            "price_relaxation must be greater than zero and at most one",
        );
    }
}
