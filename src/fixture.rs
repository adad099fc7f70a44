//! Fixtures for tests

use crate::agent::{Agent, AgentMap};
use crate::model::{Model, ModelParameters};
use crate::region::{Region, RegionMap};
use crate::technology::{Technology, TechnologyMap, TechnologyParameter};
use crate::time_slice::TimeSliceInfo;
use crate::topology::{Topology, TransmissionLink};
use crate::units::{
    Activity, ActivityPerCapacity, Capacity, Dimensionless, MoneyPerActivity, MoneyPerCapacity,
};
use indexmap::indexmap;
use map_macro::hash_map;
use rstest::fixture;
use std::path::PathBuf;
use std::rc::Rc;

/// Assert that an error with the given message occurs
macro_rules! assert_error {
    ($result:expr, $msg:expr) => {
        assert_eq!(
            $result.unwrap_err().chain().next().unwrap().to_string(),
            $msg
        );
    };
}
pub(crate) use assert_error;

#[fixture]
pub fn regions() -> RegionMap {
    ["GBR", "FRA"]
        .into_iter()
        .map(|id| {
            let region = Region {
                id: id.into(),
                description: format!("Region {id}"),
            };
            (region.id.clone(), region)
        })
        .collect()
}

#[fixture]
pub fn time_slice_info() -> TimeSliceInfo {
    TimeSliceInfo {
        fractions: indexmap! {
            "day".into() => Dimensionless(0.5),
            "night".into() => Dimensionless(0.5),
        },
    }
}

#[fixture]
pub fn technology_parameter() -> TechnologyParameter {
    TechnologyParameter {
        capital_cost: Some(MoneyPerCapacity(100.0)),
        fixed_cost: Some(MoneyPerCapacity(2.0)),
        variable_cost: Some(MoneyPerActivity(3.0)),
        residual_capacity: Capacity(0.0),
        max_capacity: Some(Capacity(100.0)),
        availability_factor: Some(Dimensionless(1.0)),
    }
}

#[fixture]
pub fn technology(technology_parameter: TechnologyParameter) -> Technology {
    Technology {
        id: "wind".into(),
        region_id: "GBR".into(),
        description: "Onshore wind".into(),
        operational_life: Some(10),
        capacity_to_activity: Some(ActivityPerCapacity(1.0)),
        parameters: hash_map! {2020 => technology_parameter},
        capacity_factors: hash_map! {"day".into() => Dimensionless(0.8)},
    }
}

#[fixture]
pub fn agent(technology: Technology) -> Agent {
    Agent {
        id: "GBR".into(),
        technologies: vec![Rc::new(technology)],
        annual_demand: hash_map! {2020 => Activity(100.0)},
        demand_profile: indexmap! {
            "day".into() => Dimensionless(0.5),
            "night".into() => Dimensionless(0.5),
        },
    }
}

#[fixture]
pub fn model_parameters() -> ModelParameters {
    ModelParameters {
        milestone_years: vec![2020],
        demand_perturbation: Dimensionless(0.1),
        price_tolerance: MoneyPerActivity(1e-3),
        max_iterations: 10,
        discount_rate: Dimensionless(0.0),
        transmission_cost: MoneyPerActivity(0.0),
        link_capacity_to_activity: Dimensionless(1.0),
        factor_precision: 1000,
        cost_precision: 1.0,
        price_relaxation: Dimensionless(1.0),
    }
}

/// A technology with only a variable cost, available all year
pub fn simple_technology(
    id: &str,
    region_id: &str,
    variable_cost: f64,
    max_capacity: Option<f64>,
) -> Technology {
    Technology {
        id: id.into(),
        region_id: region_id.into(),
        description: String::new(),
        operational_life: Some(1),
        capacity_to_activity: Some(ActivityPerCapacity(1.0)),
        parameters: hash_map! {
            2020 => TechnologyParameter {
                capital_cost: Some(MoneyPerCapacity(0.0)),
                fixed_cost: Some(MoneyPerCapacity(0.0)),
                variable_cost: Some(MoneyPerActivity(variable_cost)),
                residual_capacity: Capacity(0.0),
                max_capacity: max_capacity.map(Capacity),
                availability_factor: Some(Dimensionless(1.0)),
            },
        },
        capacity_factors: hash_map! {"annual".into() => Dimensionless(1.0)},
    }
}

/// A model with a single annual time slice in which each region's agent has the given demand
pub fn single_slice_model(
    technologies: Vec<Technology>,
    demands: &[(&str, f64)],
    links: Vec<TransmissionLink>,
    parameters: ModelParameters,
) -> Model {
    let regions: RegionMap = demands
        .iter()
        .map(|(id, _)| {
            let region = Region {
                id: (*id).into(),
                description: String::new(),
            };
            (region.id.clone(), region)
        })
        .collect();
    let technologies: TechnologyMap = technologies
        .into_iter()
        .map(|technology| (technology.id.clone(), Rc::new(technology)))
        .collect();
    let agents: AgentMap = demands
        .iter()
        .map(|(id, demand)| {
            let agent = Agent {
                id: (*id).into(),
                technologies: technologies
                    .values()
                    .filter(|technology| technology.region_id.as_str() == *id)
                    .cloned()
                    .collect(),
                annual_demand: hash_map! {2020 => Activity(*demand)},
                demand_profile: indexmap! {"annual".into() => Dimensionless(1.0)},
            };
            (agent.id.clone(), agent)
        })
        .collect();

    Model {
        model_path: PathBuf::from("test"),
        parameters,
        time_slice_info: TimeSliceInfo::default(),
        regions,
        technologies,
        agents,
        topology: Topology::from_links(links).unwrap(),
    }
}
