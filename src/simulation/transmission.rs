//! Coordinates flows of activity between agents along transmission links.
//!
//! Each round, the coordinator solves for an increment to the flow on every link which maximises
//! the profit of trade at the agents' current marginal costs. Flows are cumulative over the rounds
//! for a time slice and move demand from importing agents to exporting ones.
use super::marginal_cost::MarginalCostTable;
use crate::model::ModelParameters;
use crate::problem::expression::{abs, add, and, div, eq, ge, int, le, mul, neg, param, sum};
use crate::problem::{Argument, Domain, Problem, Template, TemplateKind};
use crate::region::RegionID;
use crate::topology::{Topology, TransmissionLink};
use crate::units::Dimensionless;
use crate::xcsp::Solution;
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use itertools::Itertools;

/// Name of the transmission subproblem
pub const TRANSMISSION_PROBLEM_NAME: &str = "transmission";

/// Name of the flow variable for a link
pub fn flow_var(link: &TransmissionLink) -> String {
    format!("flow_{}_{}", link.origin, link.destination)
}

/// Whether there is anything for the transmission step to do
pub fn is_active(topology: &Topology, num_agents: usize) -> bool {
    !topology.is_empty() && num_agents >= 2
}

/// The capacity of a link in units of activity for a time slice
pub fn link_capacity(
    link: &TransmissionLink,
    capacity_to_activity: Dimensionless,
    weight: Dimensionless,
) -> i64 {
    (link.capacity.value() * capacity_to_activity.value() * weight.value()).floor() as i64
}

/// The cumulative flow along each directed link
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FlowState {
    flows: IndexMap<(RegionID, RegionID), i64>,
}

impl FlowState {
    /// The cumulative flow from `origin` to `destination`
    pub fn flow(&self, origin: &RegionID, destination: &RegionID) -> i64 {
        self.flows
            .get(&(origin.clone(), destination.clone()))
            .copied()
            .unwrap_or_default()
    }

    /// The total flow into a region
    pub fn net_inflow(&self, topology: &Topology, region_id: &RegionID) -> i64 {
        topology
            .iter_incoming(region_id)
            .map(|link| self.flow(&link.origin, &link.destination))
            .sum()
    }

    /// Add the increments from a solved transmission subproblem
    pub fn apply(&mut self, topology: &Topology, solution: &Solution) -> Result<()> {
        for link in topology.iter_links() {
            let name = flow_var(&link);
            let increment = solution
                .value(&name)
                .with_context(|| format!("Transmission solution has no value for {name}"))?;
            *self
                .flows
                .entry((link.origin, link.destination))
                .or_default() += increment;
        }

        for (forward, backward) in topology.iter_link_pairs() {
            let flow = self.flow(&forward.origin, &forward.destination);
            let reverse = self.flow(&backward.origin, &backward.destination);
            ensure!(
                flow == -reverse,
                "Flows between {} and {} are not symmetric ({flow} and {reverse})",
                forward.origin,
                forward.destination
            );
        }

        Ok(())
    }

    /// Iterate over the cumulative flows
    pub fn iter(&self) -> impl Iterator<Item = (&RegionID, &RegionID, i64)> {
        self.flows
            .iter()
            .map(|((origin, destination), flow)| (origin, destination, *flow))
    }
}

/// Build the transmission subproblem for a round.
///
/// # Arguments
///
/// * `topology` - The links between regions
/// * `bands` - Each agent's marginal demand, which bounds the change in its net inflow
/// * `costs` - The agents' current marginal costs
/// * `flows` - Cumulative flows from earlier rounds
/// * `weight` - The fraction of the year covered by the time slice
/// * `parameters` - Model parameters
pub fn build_problem(
    topology: &Topology,
    bands: &IndexMap<RegionID, i64>,
    costs: &MarginalCostTable,
    flows: &FlowState,
    weight: Dimensionless,
    parameters: &ModelParameters,
) -> Result<Problem> {
    let mut problem = Problem::new(TRANSMISSION_PROBLEM_NAME, true);
    for region_id in topology.iter_regions() {
        problem.add_agent(region_id.as_str());
    }

    for link in topology.iter_links() {
        let capacity = link_capacity(&link, parameters.link_capacity_to_activity, weight);
        let flow = flows.flow(&link.origin, &link.destination);
        problem.add_variable(
            &flow_var(&link),
            Domain::new(-capacity - flow, capacity - flow)?,
            link.origin.as_str(),
        )?;
    }

    let symmetric = problem.add_template(Template::new(
        "symmetricFlow",
        TemplateKind::Predicate,
        &["forward", "backward"],
        eq(param("forward"), neg(param("backward"))),
    )?);
    for (forward, backward) in topology.iter_link_pairs() {
        problem.add_constraint(
            &format!("symmetric_{}_{}", forward.origin, forward.destination),
            &symmetric,
            vec![
                Argument::Variable(flow_var(&forward)),
                Argument::Variable(flow_var(&backward)),
            ],
        )?;
    }

    for region_id in topology.iter_regions() {
        let band = *bands
            .get(region_id)
            .with_context(|| format!("No marginal demand for region {region_id}"))?;
        let incoming = topology.iter_incoming(region_id).collect_vec();
        let flow_params = (0..incoming.len()).map(|i| format!("f{i}")).collect_vec();
        let mut parameters = flow_params.iter().map(String::as_str).collect_vec();
        parameters.push("band");
        let inflow = || sum(flow_params.iter().map(|name| param(name)));
        let template = problem.add_template(Template::new(
            &format!("balanceBand{}", incoming.len()),
            TemplateKind::Predicate,
            &parameters,
            and(
                ge(inflow(), neg(param("band"))),
                le(inflow(), param("band")),
            ),
        )?);

        let mut arguments = incoming
            .iter()
            .map(|link| Argument::Variable(flow_var(link)))
            .collect_vec();
        arguments.push(Argument::Literal(band));
        problem.add_constraint(&format!("balance_{region_id}"), &template, arguments)?;
    }

    let profit = problem.add_template(Template::new(
        "linkProfit",
        TemplateKind::Function,
        &["flow", "margin"],
        mul(
            div(add(param("flow"), abs(param("flow"))), int(2)),
            param("margin"),
        ),
    )?);
    for link in topology.iter_links() {
        let cost = |region_id: &RegionID| {
            costs
                .get(region_id)
                .with_context(|| format!("No marginal costs for region {region_id}"))
        };
        let margin = cost(&link.destination)?.import
            - cost(&link.origin)?.export
            - parameters.transmission_cost;
        problem.add_constraint(
            &format!("profit_{}_{}", link.origin, link.destination),
            &profit,
            vec![
                Argument::Variable(flow_var(&link)),
                Argument::Literal((margin.value() * parameters.cost_precision).round() as i64),
            ],
        )?;
    }

    Ok(problem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::model_parameters;
    use crate::simulation::marginal_cost::MarginalCosts;
    use crate::solver::solve_problem;
    use crate::units::{Capacity, MoneyPerActivity};
    use rstest::rstest;

    fn topology(capacity: f64) -> Topology {
        Topology::from_links([TransmissionLink {
            origin: "A".into(),
            destination: "B".into(),
            capacity: Capacity(capacity),
        }])
        .unwrap()
    }

    fn costs(a_export: f64, b_import: f64) -> MarginalCostTable {
        let mut costs = MarginalCostTable::new();
        costs.insert(
            "A".into(),
            MarginalCosts {
                import: MoneyPerActivity(a_export),
                export: MoneyPerActivity(a_export),
            },
        );
        costs.insert(
            "B".into(),
            MarginalCosts {
                import: MoneyPerActivity(b_import),
                export: MoneyPerActivity(b_import),
            },
        );
        costs
    }

    fn bands(band: i64) -> IndexMap<RegionID, i64> {
        [("A".into(), band), ("B".into(), band)].into_iter().collect()
    }

    #[test]
    fn test_is_active() {
        assert!(is_active(&topology(20.0), 2));
        assert!(!is_active(&topology(20.0), 1));
        assert!(!is_active(&Topology::default(), 2));
    }

    #[rstest]
    fn test_build_problem(mut model_parameters: ModelParameters) {
        model_parameters.transmission_cost = MoneyPerActivity(2.0);
        let mut flows = FlowState::default();
        flows.flows.insert(("A".into(), "B".into()), 5);
        flows.flows.insert(("B".into(), "A".into()), -5);

        let problem = build_problem(
            &topology(40.0),
            &bands(100),
            &costs(10.0, 15.0),
            &flows,
            Dimensionless(0.5),
            &model_parameters,
        )
        .unwrap();

        assert!(problem.maximise);
        assert_eq!(problem.agents().count(), 2);
        let forward = problem.variable("flow_A_B").unwrap();
        assert_eq!(forward.domain, Domain::new(-25, 15).unwrap());
        assert_eq!(forward.agent, "A");
        assert_eq!(
            problem.variable("flow_B_A").unwrap().domain,
            Domain::new(-15, 25).unwrap()
        );

        // One symmetry constraint, two balance bands and two profit terms
        assert_eq!(problem.constraints().len(), 5);
        let margins = problem
            .constraints()
            .iter()
            .filter(|c| c.name.starts_with("profit_"))
            .map(|c| c.arguments[1].clone())
            .collect_vec();
        assert_eq!(margins, [Argument::Literal(3), Argument::Literal(-7)]);
    }

    #[rstest]
    fn test_build_problem_missing_costs(model_parameters: ModelParameters) {
        let mut costs = costs(10.0, 15.0);
        costs.shift_remove("B");
        assert!(
            build_problem(
                &topology(20.0),
                &bands(100),
                &costs,
                &FlowState::default(),
                Dimensionless(1.0),
                &model_parameters,
            )
            .is_err()
        );
    }

    /// Flow fills the link when trade is profitable
    #[rstest]
    #[case(100, 20)]
    #[case(8, 8)] // Limited by balance band
    fn test_solve_profitable(
        mut model_parameters: ModelParameters,
        #[case] band: i64,
        #[case] expected: i64,
    ) {
        model_parameters.transmission_cost = MoneyPerActivity(2.0);
        let topology = topology(20.0);
        let problem = build_problem(
            &topology,
            &bands(band),
            &costs(10.0, 15.0),
            &FlowState::default(),
            Dimensionless(1.0),
            &model_parameters,
        )
        .unwrap();
        let solution = solve_problem(&problem).unwrap();
        assert_eq!(solution.value("flow_A_B"), Some(expected));
        assert_eq!(solution.value("flow_B_A"), Some(-expected));
        assert_eq!(solution.valuation, 3 * expected as u64);

        let mut flows = FlowState::default();
        flows.apply(&topology, &solution).unwrap();
        assert_eq!(flows.flow(&"A".into(), &"B".into()), expected);
        assert_eq!(flows.net_inflow(&topology, &"B".into()), expected);
        assert_eq!(flows.net_inflow(&topology, &"A".into()), -expected);
    }

    #[rstest]
    fn test_solve_unprofitable(mut model_parameters: ModelParameters) {
        model_parameters.transmission_cost = MoneyPerActivity(6.0);
        let problem = build_problem(
            &topology(20.0),
            &bands(100),
            &costs(10.0, 15.0),
            &FlowState::default(),
            Dimensionless(1.0),
            &model_parameters,
        )
        .unwrap();
        let solution = solve_problem(&problem).unwrap();
        assert_eq!(solution.value("flow_A_B"), Some(0));
        assert_eq!(solution.valuation, 0);
    }

    #[test]
    fn test_apply_missing_value() {
        let solution = Solution {
            valuation: 0,
            assignments: IndexMap::new(),
        };
        assert!(
            FlowState::default()
                .apply(&topology(20.0), &solution)
                .is_err()
        );
    }

    #[test]
    fn test_apply_asymmetric() {
        let solution = Solution {
            valuation: 0,
            assignments: [("flow_A_B".to_string(), 3), ("flow_B_A".to_string(), 2)]
                .into_iter()
                .collect(),
        };
        assert!(
            FlowState::default()
                .apply(&topology(20.0), &solution)
                .is_err()
        );
    }
}
