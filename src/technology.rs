//! Technologies are the means by which an agent meets its demand.
//!
//! Each technology belongs to exactly one region. Its cost and availability data can vary by year
//! and time slice and may be incomplete: a technology without all the data needed for a given year
//! and time slice is excluded from that subproblem rather than causing an error.
use crate::finance::annual_capital_cost;
use crate::id::{define_id_getter, define_id_type};
use crate::region::RegionID;
use crate::time_slice::TimeSliceID;
use crate::units::{
    ActivityPerCapacity, Capacity, Dimensionless, MoneyPerActivity, MoneyPerCapacity,
};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;

define_id_type! {TechnologyID}

/// A map of [`Technology`]s, keyed by technology ID
pub type TechnologyMap = IndexMap<TechnologyID, Rc<Technology>>;

/// A technology which can provide activity to meet demand
#[derive(PartialEq, Debug, Clone)]
pub struct Technology {
    /// A unique identifier for the technology (e.g. "gas_ccgt")
    pub id: TechnologyID,
    /// The region in which the technology can be built
    pub region_id: RegionID,
    /// A human-readable description
    pub description: String,
    /// Operational lifetime in years, used to annualise capital costs
    pub operational_life: Option<u32>,
    /// Factor for converting from capacity to annual activity
    pub capacity_to_activity: Option<ActivityPerCapacity>,
    /// Cost and capacity parameters, keyed by year
    pub parameters: HashMap<u32, TechnologyParameter>,
    /// The fraction of capacity available in each time slice
    pub capacity_factors: HashMap<TimeSliceID, Dimensionless>,
}
define_id_getter! {Technology, TechnologyID}

/// Year-specific parameters for a technology
#[derive(PartialEq, Debug, Clone)]
pub struct TechnologyParameter {
    /// Overnight capital cost per unit of capacity
    pub capital_cost: Option<MoneyPerCapacity>,
    /// Annual fixed cost per unit of capacity
    pub fixed_cost: Option<MoneyPerCapacity>,
    /// Cost per unit of activity
    pub variable_cost: Option<MoneyPerActivity>,
    /// Capacity installed before the start of the simulation
    pub residual_capacity: Capacity,
    /// The maximum total capacity which may be installed (`None` if uncapped)
    pub max_capacity: Option<Capacity>,
    /// The fraction of the year during which the technology is available
    pub availability_factor: Option<Dimensionless>,
}

/// The reason for leaving a technology out of a subproblem
#[derive(Error, Debug, PartialEq)]
pub enum Exclusion {
    /// There is no parameter entry for the year
    #[error("no parameters given for this year")]
    NoParameters,
    /// A required field is absent or NaN
    #[error("required field `{0}` is missing")]
    MissingField(&'static str),
    /// A cost field is negative
    #[error("`{0}` cannot be negative")]
    NegativeCost(&'static str),
    /// Capacity, availability and conversion factors multiply to zero or less
    #[error("productivity factor {0} is not positive")]
    NonPositiveProductivity(f64),
    /// The capacity floor lies above the ceiling
    #[error("capacity floor {floor} exceeds capacity ceiling {ceiling}")]
    InvalidBounds {
        /// Lower bound for capacity
        floor: i64,
        /// Upper bound for capacity
        ceiling: i64,
    },
}

/// Everything needed to encode a technology in one time slice of one year
#[derive(PartialEq, Debug, Clone)]
pub struct OperatingData {
    /// Activity available in the time slice per unit of capacity
    pub productivity: ActivityPerCapacity,
    /// Capital cost annualised over the operational lifetime
    pub annual_capital_cost: MoneyPerCapacity,
    /// Fixed cost attributable to the time slice
    pub fixed_cost: MoneyPerCapacity,
    /// Cost per unit of activity
    pub variable_cost: MoneyPerActivity,
    /// Capacity installed before the start of the simulation
    pub residual_capacity: Capacity,
    /// Maximum total capacity, if any
    pub max_capacity: Option<Capacity>,
}

/// Take a value which must be present and not NaN
fn require<T: Copy>(
    value: Option<T>,
    field: &'static str,
    raw: fn(T) -> f64,
) -> Result<T, Exclusion> {
    value
        .filter(|value| !raw(*value).is_nan())
        .ok_or(Exclusion::MissingField(field))
}

/// Take a cost which must be present and non-negative
fn require_cost<T: Copy>(
    value: Option<T>,
    field: &'static str,
    raw: fn(T) -> f64,
) -> Result<T, Exclusion> {
    let value = require(value, field, raw)?;
    if raw(value) < 0.0 {
        return Err(Exclusion::NegativeCost(field));
    }

    Ok(value)
}

impl Technology {
    /// Get the operating data for the given year and time slice.
    ///
    /// # Arguments
    ///
    /// * `year` - Milestone year
    /// * `time_slice` - The time slice
    /// * `weight` - The fraction of the year covered by `time_slice`
    /// * `discount_rate` - Discount rate for annualising capital costs
    pub fn operating_data(
        &self,
        year: u32,
        time_slice: &TimeSliceID,
        weight: Dimensionless,
        discount_rate: Dimensionless,
    ) -> Result<OperatingData, Exclusion> {
        let param = self.parameters.get(&year).ok_or(Exclusion::NoParameters)?;

        let capacity_factor = require(
            self.capacity_factors.get(time_slice).copied(),
            "capacity_factor",
            |x: Dimensionless| x.0,
        )?;
        let availability_factor = require(
            param.availability_factor,
            "availability_factor",
            |x: Dimensionless| x.0,
        )?;
        let capacity_to_activity = require(
            self.capacity_to_activity,
            "capacity_to_activity",
            |x: ActivityPerCapacity| x.0,
        )?;
        let operational_life = self
            .operational_life
            .ok_or(Exclusion::MissingField("operational_life"))?;
        let capital_cost =
            require_cost(param.capital_cost, "capital_cost", |x: MoneyPerCapacity| x.0)?;
        let fixed_cost =
            require_cost(param.fixed_cost, "fixed_cost", |x: MoneyPerCapacity| x.0)?;
        let variable_cost =
            require_cost(param.variable_cost, "variable_cost", |x: MoneyPerActivity| x.0)?;

        let productivity = capacity_factor * availability_factor * weight * capacity_to_activity;
        if productivity.value() <= 0.0 || !productivity.is_finite() {
            return Err(Exclusion::NonPositiveProductivity(productivity.value()));
        }

        Ok(OperatingData {
            productivity,
            annual_capital_cost: annual_capital_cost(capital_cost, operational_life, discount_rate),
            fixed_cost: fixed_cost * weight,
            variable_cost,
            residual_capacity: param.residual_capacity,
            max_capacity: param.max_capacity,
        })
    }
}
