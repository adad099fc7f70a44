//! Builds the subproblem each agent solves in a round.
//!
//! An agent's subproblem chooses capacity and activity for each of its technologies so as to meet
//! demand at least cost. Quantities are integers: activities and capacities are in their natural
//! units, productivity factors are fixed-point numbers scaled by `factor_precision` and costs are
//! scaled by `cost_precision`.
use super::aggregate::CumulativeResults;
use crate::agent::Agent;
use crate::model::ModelParameters;
use crate::problem::expression::{add, ge, le, mul, param, sub, sum};
use crate::problem::{Argument, Domain, Problem, Template, TemplateKind};
use crate::region::RegionID;
use crate::technology::{Exclusion, Technology, TechnologyID};
use crate::time_slice::TimeSliceID;
use crate::units::Dimensionless;
use anyhow::{Result, ensure};
use itertools::Itertools;
use log::warn;
use strum::{Display, EnumIter};

/// The demand used for one of the three subproblems solved for each agent in a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Variant {
    /// Unperturbed demand
    Baseline,
    /// Demand increased by the marginal demand
    Increase,
    /// Demand decreased by the marginal demand
    Decrease,
}

impl Variant {
    /// The multiple of the marginal demand added to demand
    pub fn sign(self) -> i64 {
        match self {
            Self::Baseline => 0,
            Self::Increase => 1,
            Self::Decrease => -1,
        }
    }

    /// The demand for this variant, which is never negative
    pub fn perturbed_demand(self, demand: i64, marginal_demand: i64) -> i64 {
        (demand + self.sign() * marginal_demand).max(0)
    }
}

/// The marginal demand for an agent: the demand perturbation as a whole number of units.
///
/// If the demand is too small for the perturbation to amount to a single unit, one unit is used.
pub fn marginal_demand(demand: i64, perturbation: Dimensionless, region_id: &RegionID) -> i64 {
    let marginal = (demand as f64 * perturbation.value()).round() as i64;
    if marginal < 1 {
        warn!(
            "Marginal demand for region {region_id} is less than one unit \
            (demand: {demand}); using one unit instead"
        );
        return 1;
    }

    marginal
}

/// Scale a cost and round it to an integer
fn scale_cost(value: f64, cost_precision: f64) -> i64 {
    (value * cost_precision).round() as i64
}

/// The integer terms with which a technology is encoded
#[derive(Debug, Clone, PartialEq)]
pub struct TechnologyTerms {
    /// The technology
    pub id: TechnologyID,
    /// Activity per unit of capacity, scaled by `factor_precision`
    pub productivity: i64,
    /// Annualised capital cost per unit of new capacity
    pub capital_cost: i64,
    /// Fixed cost per unit of capacity for the time slice
    pub fixed_cost: i64,
    /// Cost per unit of activity
    pub variable_cost: i64,
    /// Capacity which is already installed
    pub floor: i64,
    /// The most capacity that may be installed, if capped
    pub max_capacity: Option<i64>,
}

impl TechnologyTerms {
    fn new(
        technology: &Technology,
        year: u32,
        time_slice: &TimeSliceID,
        weight: Dimensionless,
        parameters: &ModelParameters,
        installed: &CumulativeResults,
    ) -> Result<Self, Exclusion> {
        let data =
            technology.operating_data(year, time_slice, weight, parameters.discount_rate)?;

        let productivity = (data.productivity.value() * f64::from(parameters.factor_precision))
            .round() as i64;
        if productivity <= 0 {
            return Err(Exclusion::NonPositiveProductivity(data.productivity.value()));
        }

        let installed = installed
            .installed_capacity(&technology.id, year)
            .unwrap_or_default();
        let floor = data.residual_capacity.max(installed).value().ceil() as i64;
        let max_capacity = data.max_capacity.map(|max| max.value().floor() as i64);
        if let Some(ceiling) = max_capacity {
            if floor > ceiling {
                return Err(Exclusion::InvalidBounds { floor, ceiling });
            }
        }

        Ok(Self {
            id: technology.id.clone(),
            productivity,
            capital_cost: scale_cost(data.annual_capital_cost.value(), parameters.cost_precision),
            fixed_cost: scale_cost(data.fixed_cost.value(), parameters.cost_precision),
            variable_cost: scale_cost(data.variable_cost.value(), parameters.cost_precision),
            floor,
            max_capacity,
        })
    }

    /// Name of the capacity variable
    pub fn capacity_var(&self) -> String {
        format!("{}_capacity", self.id)
    }

    /// Name of the activity variable
    pub fn activity_var(&self) -> String {
        format!("{}_rateActivity", self.id)
    }

    /// The upper bound for capacity.
    ///
    /// For uncapped technologies, this is the smallest capacity able to meet `demand` alone.
    pub fn ceiling(&self, demand: i64, factor_precision: i64) -> i64 {
        let ceiling = self.max_capacity.unwrap_or_else(|| {
            let scaled = demand * factor_precision;
            (scaled + self.productivity - 1) / self.productivity
        });
        ceiling.max(self.floor)
    }
}

/// Everything needed to build an agent's subproblems for one time slice of one year
#[derive(Debug, Clone, PartialEq)]
pub struct AgentFormulation {
    /// The agent's region
    pub region_id: RegionID,
    /// The technologies included in the subproblem
    pub technologies: Vec<TechnologyTerms>,
    factor_precision: i64,
}

impl AgentFormulation {
    /// Prepare the formulation for an agent.
    ///
    /// Technologies lacking data, or whose data are invalid, are left out with a warning. It is an
    /// error for no technologies to remain.
    pub fn new(
        agent: &Agent,
        year: u32,
        time_slice: &TimeSliceID,
        weight: Dimensionless,
        parameters: &ModelParameters,
        installed: &CumulativeResults,
    ) -> Result<Self> {
        let mut technologies = Vec::new();
        for technology in &agent.technologies {
            match TechnologyTerms::new(technology, year, time_slice, weight, parameters, installed)
            {
                Ok(terms) => technologies.push(terms),
                Err(reason) => warn!(
                    "Excluding technology {} from agent {} in year {year}, time slice \
                    {time_slice}: {reason}",
                    technology.id, agent.id
                ),
            }
        }

        ensure!(
            !technologies.is_empty(),
            "Agent {} has no usable technologies in year {year}, time slice {time_slice}",
            agent.id
        );

        Ok(Self {
            region_id: agent.id.clone(),
            technologies,
            factor_precision: i64::from(parameters.factor_precision),
        })
    }

    /// Build the subproblem for one demand variant.
    ///
    /// # Arguments
    ///
    /// * `variant` - Which perturbation of demand to use
    /// * `demand` - The agent's current demand
    /// * `marginal_demand` - The size of the perturbation
    pub fn build(&self, variant: Variant, demand: i64, marginal_demand: i64) -> Result<Problem> {
        let agent = self.region_id.as_str();
        let mut problem = Problem::new(&format!("{agent}_{variant}"), false);
        problem.add_agent(agent);

        let max_activity = problem.add_template(Template::new(
            "maxActivity",
            TemplateKind::Predicate,
            &["activity", "capacity", "precision", "factor"],
            le(
                mul(param("activity"), param("precision")),
                mul(param("capacity"), param("factor")),
            ),
        )?);
        let cost = problem.add_template(Template::new(
            "technologyCost",
            TemplateKind::Function,
            &["capacity", "activity", "floor", "capital", "fixed", "variable"],
            add(
                add(
                    mul(sub(param("capacity"), param("floor")), param("capital")),
                    mul(param("capacity"), param("fixed")),
                ),
                mul(param("activity"), param("variable")),
            ),
        )?);

        // All variants share bounds, so that they differ only in demand
        let ceiling_demand = Variant::Increase.perturbed_demand(demand, marginal_demand);
        for tech in &self.technologies {
            let capacity = tech.capacity_var();
            let activity = tech.activity_var();
            let ceiling = tech.ceiling(ceiling_demand, self.factor_precision);
            let max_activity_value = ceiling * tech.productivity / self.factor_precision;

            problem.add_variable(&capacity, Domain::new(tech.floor, ceiling)?, agent)?;
            problem.add_variable(&activity, Domain::new(0, max_activity_value)?, agent)?;
            problem.add_constraint(
                &format!("{}_maxActivity", tech.id),
                &max_activity,
                vec![
                    Argument::var(&activity),
                    Argument::var(&capacity),
                    Argument::Literal(self.factor_precision),
                    Argument::Literal(tech.productivity),
                ],
            )?;
            problem.add_constraint(
                &format!("{}_cost", tech.id),
                &cost,
                vec![
                    Argument::var(&capacity),
                    Argument::var(&activity),
                    Argument::Literal(tech.floor),
                    Argument::Literal(tech.capital_cost),
                    Argument::Literal(tech.fixed_cost),
                    Argument::Literal(tech.variable_cost),
                ],
            )?;
        }

        let activities = self
            .technologies
            .iter()
            .map(|tech| format!("a{}", tech.id))
            .collect_vec();
        let mut parameters = activities.iter().map(String::as_str).collect_vec();
        parameters.push("demand");
        let meet_demand = problem.add_template(Template::new(
            &format!("meetDemand{}", self.technologies.len()),
            TemplateKind::Predicate,
            &parameters,
            ge(sum(activities.iter().map(|name| param(name))), param("demand")),
        )?);

        let mut arguments = self
            .technologies
            .iter()
            .map(|tech| Argument::Variable(tech.activity_var()))
            .collect_vec();
        arguments.push(Argument::Literal(
            variant.perturbed_demand(demand, marginal_demand),
        ));
        problem.add_constraint("meetDemand", &meet_demand, arguments)?;

        Ok(problem)
    }
}
