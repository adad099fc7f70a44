//! Estimates marginal costs from the valuations of perturbed subproblems.
//!
//! The import cost of an agent is what it saves per unit by meeting less demand, the export cost
//! what it pays per unit to meet more. Both are one-sided finite differences over the agent's
//! marginal demand.
use crate::region::RegionID;
use crate::units::{Dimensionless, MoneyPerActivity};
use anyhow::{Result, ensure};
use indexmap::IndexMap;

/// An agent's marginal costs for importing and exporting one unit of activity
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MarginalCosts {
    /// The saving from one unit less demand
    pub import: MoneyPerActivity,
    /// The cost of one unit more demand
    pub export: MoneyPerActivity,
}

/// Marginal costs for every agent
pub type MarginalCostTable = IndexMap<RegionID, MarginalCosts>;

/// The valuations of an agent's three subproblems
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Valuations {
    /// Valuation at baseline demand
    pub baseline: u64,
    /// Valuation with demand increased by the marginal demand
    pub increase: u64,
    /// Valuation with demand decreased by the marginal demand
    pub decrease: u64,
}

/// Estimate an agent's marginal costs.
///
/// # Arguments
///
/// * `valuations` - Valuations of the three subproblems, scaled by `cost_precision`
/// * `demand` - The baseline demand
/// * `marginal_demand` - The perturbation applied to demand
/// * `cost_precision` - Scale used for costs in subproblems
pub fn estimate(
    valuations: &Valuations,
    demand: i64,
    marginal_demand: i64,
    cost_precision: f64,
) -> Result<MarginalCosts> {
    ensure!(marginal_demand > 0, "Marginal demand must be positive");

    let per_unit = |high: u64, low: u64, units: i64| {
        MoneyPerActivity((high as f64 - low as f64) / cost_precision / units as f64)
    };

    let export = per_unit(valuations.increase, valuations.baseline, marginal_demand);

    // Demand can only be decreased as far as zero
    let decrease = demand.min(marginal_demand);
    let import = if decrease > 0 {
        per_unit(valuations.baseline, valuations.decrease, decrease)
    } else {
        export
    };

    Ok(MarginalCosts { import, export })
}

/// The largest absolute change in any agent's import or export cost
pub fn max_price_change(
    previous: &MarginalCostTable,
    current: &MarginalCostTable,
) -> MoneyPerActivity {
    current
        .iter()
        .map(|(region_id, costs)| {
            let old = previous.get(region_id).copied().unwrap_or_default();
            (costs.import - old.import)
                .abs()
                .max((costs.export - old.export).abs())
        })
        .fold(MoneyPerActivity(0.0), MoneyPerActivity::max)
}

/// Blend new marginal costs with the previous round's.
///
/// `relaxation` is the weight given to the new costs, so a value of one returns `current`.
pub fn relax(
    previous: &MarginalCostTable,
    current: MarginalCostTable,
    relaxation: Dimensionless,
) -> MarginalCostTable {
    let blend = |new: MoneyPerActivity, old: MoneyPerActivity| {
        relaxation * new + (Dimensionless(1.0) - relaxation) * old
    };

    current
        .into_iter()
        .map(|(region_id, costs)| {
            let costs = match previous.get(&region_id) {
                Some(old) => MarginalCosts {
                    import: blend(costs.import, old.import),
                    export: blend(costs.export, old.export),
                },
                None => costs,
            };
            (region_id, costs)
        })
        .collect()
}
