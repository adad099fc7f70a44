//! The in-memory representation of a subproblem.
//!
//! A [`Problem`] lists agents, integer variables owned by those agents, reusable templates and the
//! constraints binding templates to variables. It knows nothing about how it is written to disk:
//! see the `xcsp` module for that.
use anyhow::{Context, Result, ensure};
use indexmap::{IndexMap, IndexSet};
use std::collections::HashMap;
use std::fmt;

pub mod expression;
pub mod template;
pub use template::{Template, TemplateKind, TemplateRegistry};

/// An inclusive range of integer values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Domain {
    /// Smallest permitted value
    pub min: i64,
    /// Largest permitted value
    pub max: i64,
}

impl Domain {
    /// Create a domain, checking that it is non-empty
    pub fn new(min: i64, max: i64) -> Result<Self> {
        ensure!(min <= max, "Invalid domain {min}..{max}");
        Ok(Self { min, max })
    }

    /// Whether the value lies within the domain
    pub fn contains(&self, value: i64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.min, self.max)
    }
}

/// An integer decision variable
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// The permitted values
    pub domain: Domain,
    /// The agent which controls the variable
    pub agent: String,
}

/// A constraint argument, binding to one template parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Argument {
    /// The value of a variable
    Variable(String),
    /// A constant
    Literal(i64),
}

impl Argument {
    /// Create a variable argument
    pub fn var(name: &str) -> Self {
        Self::Variable(name.to_string())
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Variable(name) => write!(f, "{name}"),
            Self::Literal(value) => write!(f, "{value}"),
        }
    }
}

/// A template applied to concrete arguments
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    /// A name unique within the problem
    pub name: String,
    /// The name of the template
    pub reference: String,
    /// The distinct variables the constraint depends on, in order of first appearance
    pub scope: Vec<String>,
    /// One argument per template parameter
    pub arguments: Vec<Argument>,
}

/// The result of evaluating a problem for a complete assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    /// Whether every domain and predicate is satisfied
    pub feasible: bool,
    /// The sum of all function constraints
    pub valuation: i64,
}

/// An optimisation problem over integer variables
#[derive(Debug, Clone, PartialEq)]
pub struct Problem {
    /// Name of the problem
    pub name: String,
    /// Whether the objective is maximised (otherwise it is minimised)
    pub maximise: bool,
    agents: IndexSet<String>,
    variables: IndexMap<String, Variable>,
    templates: TemplateRegistry,
    constraints: Vec<Constraint>,
    constraint_names: IndexSet<String>,
}

impl Problem {
    /// Create an empty problem
    pub fn new(name: &str, maximise: bool) -> Self {
        Self {
            name: name.to_string(),
            maximise,
            agents: IndexSet::new(),
            variables: IndexMap::new(),
            templates: TemplateRegistry::default(),
            constraints: Vec::new(),
            constraint_names: IndexSet::new(),
        }
    }

    /// Add an agent if not already present
    pub fn add_agent(&mut self, name: &str) {
        self.agents.insert(name.to_string());
    }

    /// Add a variable owned by a previously added agent
    pub fn add_variable(&mut self, name: &str, domain: Domain, agent: &str) -> Result<()> {
        ensure!(self.agents.contains(agent), "Unknown agent {agent}");
        ensure!(
            !self.variables.contains_key(name),
            "Duplicate variable {name}"
        );

        self.variables.insert(
            name.to_string(),
            Variable {
                domain,
                agent: agent.to_string(),
            },
        );
        Ok(())
    }

    /// Add a template, returning the name constraints should use to refer to it
    pub fn add_template(&mut self, template: Template) -> String {
        self.templates.add(template)
    }

    /// Add a template under its own name (used when reading problems from disk)
    pub fn insert_template(&mut self, template: Template) -> Result<()> {
        self.templates.insert(template)
    }

    /// Bind a template to arguments.
    ///
    /// The number of arguments must match the template's parameters and every variable argument
    /// must already exist.
    pub fn add_constraint(
        &mut self,
        name: &str,
        reference: &str,
        arguments: Vec<Argument>,
    ) -> Result<()> {
        let template = self
            .templates
            .get(reference)
            .with_context(|| format!("Constraint {name} refers to unknown template {reference}"))?;
        ensure!(
            arguments.len() == template.parameters.len(),
            "Constraint {name} has {} arguments but template {reference} takes {}",
            arguments.len(),
            template.parameters.len()
        );
        ensure!(
            !self.constraint_names.contains(name),
            "Duplicate constraint {name}"
        );

        let mut scope: IndexSet<String> = IndexSet::new();
        for arg in &arguments {
            if let Argument::Variable(var) = arg {
                ensure!(
                    self.variables.contains_key(var),
                    "Constraint {name} refers to unknown variable {var}"
                );
                scope.insert(var.clone());
            }
        }

        self.constraint_names.insert(name.to_string());
        self.constraints.push(Constraint {
            name: name.to_string(),
            reference: reference.to_string(),
            scope: scope.into_iter().collect(),
            arguments,
        });
        Ok(())
    }

    /// The agents, in insertion order
    pub fn agents(&self) -> impl Iterator<Item = &str> {
        self.agents.iter().map(String::as_str)
    }

    /// Iterate over the variables with their names, in insertion order
    pub fn variables(&self) -> impl Iterator<Item = (&str, &Variable)> {
        self.variables.iter().map(|(name, var)| (name.as_str(), var))
    }

    /// Look up a variable by name
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    /// The registered templates
    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    /// Look up a template by name
    pub fn template(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    /// The constraints, in insertion order
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// The largest number of variables any constraint depends on
    pub fn max_constraint_arity(&self) -> usize {
        self.constraints
            .iter()
            .map(|c| c.scope.len())
            .max()
            .unwrap_or(0)
    }

    /// Evaluate the problem for an assignment of every variable.
    ///
    /// An assignment outside a variable's domain or violating a predicate is infeasible. The
    /// valuation is computed regardless.
    pub fn evaluate(&self, assignment: &IndexMap<String, i64>) -> Result<Evaluation> {
        let mut feasible = true;
        for (name, var) in &self.variables {
            let value = assignment
                .get(name)
                .with_context(|| format!("No value assigned to variable {name}"))?;
            feasible &= var.domain.contains(*value);
        }

        let mut valuation: i64 = 0;
        for constraint in &self.constraints {
            let template = self
                .templates
                .get(&constraint.reference)
                .with_context(|| format!("Unknown template {}", constraint.reference))?;
            let values = template
                .parameters
                .iter()
                .zip(&constraint.arguments)
                .map(|(param, arg)| {
                    let value = match arg {
                        Argument::Literal(value) => *value,
                        Argument::Variable(var) => assignment[var],
                    };
                    (param.as_str(), value)
                })
                .collect::<HashMap<_, _>>();
            let value = template
                .expression
                .evaluate(&values)
                .with_context(|| format!("Failed to evaluate constraint {}", constraint.name))?;

            match template.kind {
                TemplateKind::Predicate => feasible &= value != 0,
                TemplateKind::Function => {
                    valuation = valuation
                        .checked_add(value)
                        .context("Integer overflow computing valuation")?;
                }
            }
        }

        Ok(Evaluation {
            feasible,
            valuation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expression::{add, ge, int, mul, param};
    use rstest::{fixture, rstest};

    /// x + y >= 5, minimising 2x + 3y
    #[fixture]
    fn problem() -> Problem {
        let mut problem = Problem::new("test", false);
        problem.add_agent("A");
        problem
            .add_variable("x", Domain::new(0, 10).unwrap(), "A")
            .unwrap();
        problem
            .add_variable("y", Domain::new(0, 10).unwrap(), "A")
            .unwrap();

        let demand = Template::new(
            "demand",
            TemplateKind::Predicate,
            &["a", "b", "d"],
            ge(add(param("a"), param("b")), param("d")),
        )
        .unwrap();
        let demand = problem.add_template(demand);
        problem
            .add_constraint(
                "meet",
                &demand,
                vec![Argument::var("x"), Argument::var("y"), Argument::Literal(5)],
            )
            .unwrap();

        let cost = Template::new(
            "cost",
            TemplateKind::Function,
            &["v", "c"],
            mul(param("v"), param("c")),
        )
        .unwrap();
        let cost = problem.add_template(cost);
        problem
            .add_constraint("cost_x", &cost, vec![Argument::var("x"), Argument::Literal(2)])
            .unwrap();
        problem
            .add_constraint("cost_y", &cost, vec![Argument::var("y"), Argument::Literal(3)])
            .unwrap();

        problem
    }

    fn assignment(x: i64, y: i64) -> IndexMap<String, i64> {
        [("x".to_string(), x), ("y".to_string(), y)]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_domain() {
        assert!(Domain::new(1, 0).is_err());
        let domain = Domain::new(-2, 3).unwrap();
        assert!(domain.contains(-2));
        assert!(domain.contains(3));
        assert!(!domain.contains(4));
        assert_eq!(domain.to_string(), "-2..3");
    }

    #[rstest]
    fn test_structure(problem: Problem) {
        assert_eq!(problem.templates().len(), 2);
        assert_eq!(problem.constraints().len(), 3);
        assert_eq!(problem.max_constraint_arity(), 2);
        assert_eq!(problem.constraints()[0].scope, ["x", "y"]);
    }

    #[rstest]
    #[case(5, 0, true, 10)]
    #[case(2, 3, true, 13)]
    #[case(2, 2, false, 10)]
    #[case(11, 0, false, 22)]
    fn test_evaluate(
        problem: Problem,
        #[case] x: i64,
        #[case] y: i64,
        #[case] feasible: bool,
        #[case] valuation: i64,
    ) {
        assert_eq!(
            problem.evaluate(&assignment(x, y)).unwrap(),
            Evaluation {
                feasible,
                valuation
            }
        );
    }

    #[rstest]
    fn test_evaluate_missing_variable(problem: Problem) {
        let assignment = [("x".to_string(), 5)].into_iter().collect();
        assert!(problem.evaluate(&assignment).is_err());
    }

    #[rstest]
    fn test_add_variable_invalid(mut problem: Problem) {
        assert!(
            problem
                .add_variable("x", Domain::new(0, 1).unwrap(), "A")
                .is_err()
        );
        assert!(
            problem
                .add_variable("z", Domain::new(0, 1).unwrap(), "B")
                .is_err()
        );
    }

    #[rstest]
    fn test_add_constraint_invalid(mut problem: Problem) {
        // Wrong number of arguments
        assert!(
            problem
                .add_constraint("c1", "cost", vec![Argument::var("x")])
                .is_err()
        );
        // Unknown variable
        assert!(
            problem
                .add_constraint("c2", "cost", vec![Argument::var("z"), Argument::Literal(1)])
                .is_err()
        );
        // Unknown template
        assert!(problem.add_constraint("c3", "nope", vec![]).is_err());
        // Duplicate name
        assert!(
            problem
                .add_constraint("meet", "cost", vec![Argument::var("x"), Argument::Literal(1)])
                .is_err()
        );
    }

    #[rstest]
    fn test_rejected_constraint_name_is_reusable(mut problem: Problem) {
        assert!(
            problem
                .add_constraint("c2", "cost", vec![Argument::var("z"), Argument::Literal(1)])
                .is_err()
        );
        problem
            .add_constraint("c2", "cost", vec![Argument::var("y"), Argument::Literal(1)])
            .unwrap();
        assert_eq!(problem.constraints().len(), 4);
    }

    #[test]
    fn test_constant_constraint_has_empty_scope() {
        let mut problem = Problem::new("p", false);
        let always = Template::new(
            "always",
            TemplateKind::Predicate,
            &["a"],
            ge(param("a"), int(0)),
        )
        .unwrap();
        let always = problem.add_template(always);
        problem
            .add_constraint("c", &always, vec![Argument::Literal(1)])
            .unwrap();
        assert_eq!(problem.max_constraint_arity(), 0);
    }
}
