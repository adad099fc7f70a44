//! The round loop coordinating agents for a single time slice of a milestone year.
//!
//! Every round, each agent's three subproblems are solved, marginal costs are estimated from their
//! valuations and the transmission subproblem moves demand between agents. The loop stops once
//! marginal costs stop changing or the iteration limit is reached.
use super::aggregate::{CumulativeResults, YearResults};
use super::builder::{AgentFormulation, Variant, marginal_demand};
use super::invoker::{Invoker, SolveTask, WorkArea};
use super::marginal_cost::{MarginalCostTable, Valuations, estimate, max_price_change, relax};
use super::transmission::{self, FlowState};
use crate::model::Model;
use crate::region::RegionID;
use crate::time_slice::TimeSliceID;
use crate::units::{Activity, Capacity, Dimensionless, MoneyPerActivity};
use crate::xcsp::Solution;
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use itertools::Itertools;
use log::{debug, info, warn};
use strum::{Display, IntoEnumIterator};

/// The stages of the round loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Ready to start a round
    RoundStart,
    /// Solving agents' subproblems
    SolveAgents,
    /// Solving the transmission subproblem
    SolveTransmission,
    /// Comparing marginal costs with the previous round's
    CheckConvergence,
    /// Marginal costs have settled
    Converged,
    /// The iteration limit was reached before marginal costs settled
    MaxIterExceeded,
}

impl Phase {
    /// Whether the loop has finished
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Converged | Self::MaxIterExceeded)
    }
}

/// An agent's demand in the current round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentDemand {
    /// Demand before any transmission
    pub base: i64,
    /// Demand after accounting for net imports
    pub effective: i64,
    /// The perturbation used for estimating marginal costs
    pub marginal: i64,
}

/// Everything carried from one round to the next
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceState {
    /// The number of rounds completed
    pub iteration: u32,
    /// Where the loop is
    pub phase: Phase,
    /// Marginal costs from the last round
    pub costs: Option<MarginalCostTable>,
    /// The largest change in marginal costs in the last round
    pub max_price_change: Option<MoneyPerActivity>,
    /// Cumulative transmission flows, including the last round's increment
    pub flows: FlowState,
    /// The flows in place when `solutions` were solved
    pub solved_flows: FlowState,
    /// Each agent's demand
    pub demands: IndexMap<RegionID, AgentDemand>,
    /// Each agent's baseline solution from the last round
    pub solutions: IndexMap<RegionID, Solution>,
}

impl ConvergenceState {
    fn set_phase(&mut self, phase: Phase, context: &str) {
        debug!("{context}: {} -> {phase}", self.phase);
        self.phase = phase;
    }
}

/// Runs the round loop for one time slice of one year
pub struct Coordinator<'a> {
    model: &'a Model,
    invoker: &'a Invoker<'a>,
    work_area: &'a WorkArea,
    year: u32,
    time_slice: &'a TimeSliceID,
    weight: Dimensionless,
    formulations: Vec<AgentFormulation>,
}

impl<'a> Coordinator<'a> {
    /// Prepare the agents' formulations.
    ///
    /// Fails if any agent has no usable technologies.
    pub fn new(
        model: &'a Model,
        invoker: &'a Invoker<'a>,
        work_area: &'a WorkArea,
        year: u32,
        time_slice: &'a TimeSliceID,
        weight: Dimensionless,
        results: &CumulativeResults,
    ) -> Result<Self> {
        let formulations = model
            .agents
            .values()
            .map(|agent| {
                AgentFormulation::new(agent, year, time_slice, weight, &model.parameters, results)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            model,
            invoker,
            work_area,
            year,
            time_slice,
            weight,
            formulations,
        })
    }

    fn context(&self) -> String {
        format!("Year {}, time slice {}", self.year, self.time_slice)
    }

    /// The state before the first round
    pub fn initial_state(&self) -> Result<ConvergenceState> {
        let mut demands = IndexMap::new();
        for agent in self.model.agents.values() {
            let demand = agent.demand(self.year, self.time_slice)?;
            ensure!(
                demand.is_finite() && demand >= Activity(0.0),
                "Demand for region {} must be a finite, non-negative number",
                agent.id
            );
            let demand = demand.value().round() as i64;
            demands.insert(
                agent.id.clone(),
                AgentDemand {
                    base: demand,
                    effective: demand,
                    marginal: marginal_demand(
                        demand,
                        self.model.parameters.demand_perturbation,
                        &agent.id,
                    ),
                },
            );
        }

        Ok(ConvergenceState {
            iteration: 0,
            phase: Phase::RoundStart,
            costs: None,
            max_price_change: None,
            flows: FlowState::default(),
            solved_flows: FlowState::default(),
            demands,
            solutions: IndexMap::new(),
        })
    }

    /// Run one round, returning the state after it.
    ///
    /// If any subproblem cannot be solved, an error is returned and `state` is left as it was.
    pub fn run_round(&self, state: &ConvergenceState) -> Result<ConvergenceState> {
        let parameters = &self.model.parameters;
        let context = self.context();
        let round = state.iteration + 1;
        let dir = self
            .work_area
            .round_dir(self.year, self.time_slice.as_str(), round)?;
        let mut next = state.clone();

        next.set_phase(Phase::SolveAgents, &context);
        let mut tasks = Vec::new();
        for formulation in &self.formulations {
            let demand = agent_demand(state, &formulation.region_id)?;
            for variant in Variant::iter() {
                tasks.push(SolveTask::new(
                    format!(
                        "agent {} ({variant}), year {}, time slice {}, round {round}",
                        formulation.region_id, self.year, self.time_slice
                    ),
                    formulation.build(variant, demand.effective, demand.marginal)?,
                    &dir,
                ));
            }
        }
        let solutions = self.invoker.solve_all(&tasks)?;

        let mut costs = MarginalCostTable::new();
        next.solutions.clear();
        next.solved_flows = state.flows.clone();
        for (formulation, (baseline, increase, decrease)) in
            self.formulations.iter().zip(solutions.into_iter().tuples())
        {
            let demand = agent_demand(state, &formulation.region_id)?;
            let valuations = Valuations {
                baseline: baseline.valuation,
                increase: increase.valuation,
                decrease: decrease.valuation,
            };
            let agent_costs = estimate(
                &valuations,
                demand.effective,
                demand.marginal,
                parameters.cost_precision,
            )
            .with_context(|| {
                format!(
                    "Invalid marginal demand for region {}",
                    formulation.region_id
                )
            })?;
            costs.insert(formulation.region_id.clone(), agent_costs);
            next.solutions.insert(formulation.region_id.clone(), baseline);
        }

        let (costs, max_change) = match &state.costs {
            Some(previous) => {
                let costs = relax(previous, costs, parameters.price_relaxation);
                let change = max_price_change(previous, &costs);
                (costs, Some(change))
            }
            None => (costs, None),
        };

        next.set_phase(Phase::SolveTransmission, &context);
        let topology = &self.model.topology;
        if transmission::is_active(topology, self.formulations.len()) {
            let bands = state
                .demands
                .iter()
                .map(|(region_id, demand)| (region_id.clone(), demand.marginal))
                .collect();
            let problem = transmission::build_problem(
                topology,
                &bands,
                &costs,
                &state.flows,
                self.weight,
                parameters,
            )?;
            let task = SolveTask::new(
                format!(
                    "transmission, year {}, time slice {}, round {round}",
                    self.year, self.time_slice
                ),
                problem,
                &dir,
            );
            let solution = self.invoker.solve(&task)?;
            next.flows.apply(topology, &solution)?;

            for (region_id, demand) in &mut next.demands {
                let inflow = next.flows.net_inflow(topology, region_id);
                demand.effective = (demand.base - inflow).max(0);
                demand.marginal =
                    marginal_demand(demand.effective, parameters.demand_perturbation, region_id);
            }
        } else {
            debug!("{context}: no transmission links between agents");
        }

        next.set_phase(Phase::CheckConvergence, &context);
        next.iteration = round;
        next.costs = Some(costs);
        next.max_price_change = max_change;
        let phase = match max_change {
            Some(change) if change <= parameters.price_tolerance => Phase::Converged,
            _ if round >= parameters.max_iterations => Phase::MaxIterExceeded,
            _ => Phase::RoundStart,
        };
        next.set_phase(phase, &context);

        Ok(next)
    }

    /// Run rounds until marginal costs converge or the iteration limit is reached.
    ///
    /// `on_round` is called with the state after each round.
    pub fn run<F>(&self, mut on_round: F) -> Result<ConvergenceState>
    where
        F: FnMut(&ConvergenceState) -> Result<()>,
    {
        let context = self.context();
        let mut state = self.initial_state()?;
        loop {
            state = self.run_round(&state)?;
            on_round(&state)?;
            match state.max_price_change {
                Some(change) => info!(
                    "{context}, round {}: maximum change in marginal costs {change}",
                    state.iteration
                ),
                None => info!("{context}, round {}: estimated marginal costs", state.iteration),
            }

            match state.phase {
                Phase::Converged => {
                    info!("{context}: converged after {} rounds", state.iteration);
                    break;
                }
                Phase::MaxIterExceeded => {
                    warn!(
                        "{context}: marginal costs did not converge within {} rounds; \
                        using the last round's results",
                        state.iteration
                    );
                    break;
                }
                _ => {}
            }
        }

        Ok(state)
    }

    /// Record each technology's capacity and activity from the baseline solutions
    pub fn record(&self, state: &ConvergenceState, results: &mut YearResults) -> Result<()> {
        for formulation in &self.formulations {
            let solution = state
                .solutions
                .get(&formulation.region_id)
                .with_context(|| format!("No solution for region {}", formulation.region_id))?;
            for technology in &formulation.technologies {
                let value = |name: String| {
                    solution
                        .value(&name)
                        .with_context(|| format!("Solution has no value for {name}"))
                };
                let capacity = value(technology.capacity_var())?;
                let activity = value(technology.activity_var())?;
                results.record(
                    &technology.id,
                    self.time_slice,
                    Capacity(capacity as f64),
                    Activity(activity as f64),
                );
            }
        }

        Ok(())
    }
}

fn agent_demand<'s>(state: &'s ConvergenceState, region_id: &RegionID) -> Result<&'s AgentDemand> {
    state
        .demands
        .get(region_id)
        .with_context(|| format!("No demand for region {region_id}"))
}
