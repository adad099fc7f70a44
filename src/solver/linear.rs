//! Linearisation of subproblems into mixed-integer linear programs.
//!
//! Only expressions which are linear in the variables can be converted: `mul` and `div` need a
//! constant on one side. `abs` is modelled with an auxiliary indicator variable, using bounds
//! derived from the variable domains. Predicates must be comparisons, optionally combined with
//! `and`.
use super::SolveError;
use crate::problem::expression::{Expr, Operator};
use crate::problem::{Argument, Problem, TemplateKind};
use highs::{HighsModelStatus, RowProblem, Sense};
use indexmap::IndexMap;
use std::collections::HashMap;

/// A linear combination of columns plus a constant
#[derive(Debug, Clone, Default, PartialEq)]
struct LinearExpr {
    terms: IndexMap<usize, f64>,
    constant: f64,
}

impl LinearExpr {
    fn constant(value: f64) -> Self {
        Self {
            terms: IndexMap::new(),
            constant: value,
        }
    }

    fn column(index: usize) -> Self {
        Self {
            terms: [(index, 1.0)].into_iter().collect(),
            constant: 0.0,
        }
    }

    fn as_constant(&self) -> Option<f64> {
        self.terms.is_empty().then_some(self.constant)
    }

    fn scale(mut self, factor: f64) -> Self {
        for coeff in self.terms.values_mut() {
            *coeff *= factor;
        }
        self.constant *= factor;
        self
    }

    /// Add `factor * other` to this expression
    fn add_scaled(mut self, other: &Self, factor: f64) -> Self {
        for (index, coeff) in &other.terms {
            *self.terms.entry(*index).or_default() += coeff * factor;
        }
        self.constant += other.constant * factor;
        self
    }
}

/// A column of the linear program
#[derive(Debug, Clone, PartialEq)]
struct Column {
    lower: f64,
    upper: f64,
}

/// A row constraining `lower <= terms <= upper`
#[derive(Debug, Clone, PartialEq)]
struct Row {
    lower: f64,
    upper: f64,
    terms: Vec<(usize, f64)>,
}

/// A mixed-integer program equivalent to a [`Problem`]
#[derive(Debug, Default)]
pub struct LinearProgram {
    columns: Vec<Column>,
    rows: Vec<Row>,
    objective: LinearExpr,
    maximise: bool,
    /// Columns for the problem's variables, which come first
    variables: IndexMap<String, usize>,
}

fn unsupported(expr: &Expr, reason: &str) -> SolveError {
    SolveError::Unsupported(format!("{expr}: {reason}"))
}

impl LinearProgram {
    /// Convert a problem into a linear program
    pub fn from_problem(problem: &Problem) -> Result<Self, SolveError> {
        let mut program = Self {
            maximise: problem.maximise,
            ..Self::default()
        };

        for (name, var) in problem.variables() {
            let index = program.add_column(var.domain.min as f64, var.domain.max as f64);
            program.variables.insert(name.to_string(), index);
        }

        for constraint in problem.constraints() {
            let template = problem.template(&constraint.reference).ok_or_else(|| {
                SolveError::InvalidProblem(format!("Unknown template {}", constraint.reference))
            })?;

            let bindings = template
                .parameters
                .iter()
                .zip(&constraint.arguments)
                .map(|(param, arg)| {
                    let value = match arg {
                        Argument::Literal(value) => LinearExpr::constant(*value as f64),
                        Argument::Variable(var) => LinearExpr::column(program.variables[var]),
                    };
                    (param.as_str(), value)
                })
                .collect::<HashMap<_, _>>();

            match template.kind {
                TemplateKind::Predicate => {
                    program.add_predicate(&template.expression, &bindings)?;
                }
                TemplateKind::Function => {
                    let value = program.linearise(&template.expression, &bindings)?;
                    program.objective = program.objective.clone().add_scaled(&value, 1.0);
                }
            }
        }

        Ok(program)
    }

    fn add_column(&mut self, lower: f64, upper: f64) -> usize {
        self.columns.push(Column { lower, upper });
        self.columns.len() - 1
    }

    /// Constrain `lower <= expr <= upper`
    fn add_row(&mut self, expr: &LinearExpr, lower: f64, upper: f64) {
        self.rows.push(Row {
            lower: lower - expr.constant,
            upper: upper - expr.constant,
            terms: expr.terms.iter().map(|(index, coeff)| (*index, *coeff)).collect(),
        });
    }

    /// The smallest and largest values the expression can take within the column bounds
    fn bounds(&self, expr: &LinearExpr) -> (f64, f64) {
        expr.terms.iter().fold(
            (expr.constant, expr.constant),
            |(lower, upper), (index, coeff)| {
                let column = &self.columns[*index];
                let (a, b) = (coeff * column.lower, coeff * column.upper);
                (lower + a.min(b), upper + a.max(b))
            },
        )
    }

    /// Add the rows enforcing a predicate
    fn add_predicate(
        &mut self,
        expr: &Expr,
        bindings: &HashMap<&str, LinearExpr>,
    ) -> Result<(), SolveError> {
        let Expr::Apply(op, operands) = expr else {
            return Err(unsupported(expr, "predicates must be comparisons"));
        };

        if *op == Operator::And {
            for operand in operands {
                self.add_predicate(operand, bindings)?;
            }
            return Ok(());
        }

        let [lhs, rhs] = operands.as_slice() else {
            return Err(unsupported(expr, "predicates must be comparisons"));
        };
        let lhs = self.linearise(lhs, bindings)?;
        let rhs = self.linearise(rhs, bindings)?;
        let difference = lhs.add_scaled(&rhs, -1.0);

        // Variables are integers, so strict inequalities can be tightened by one
        let (lower, upper) = match op {
            Operator::Eq => (0.0, 0.0),
            Operator::Le => (f64::NEG_INFINITY, 0.0),
            Operator::Lt => (f64::NEG_INFINITY, -1.0),
            Operator::Ge => (0.0, f64::INFINITY),
            Operator::Gt => (1.0, f64::INFINITY),
            _ => return Err(unsupported(expr, "operator cannot be linearised")),
        };
        self.add_row(&difference, lower, upper);

        Ok(())
    }

    /// Convert an arithmetic expression into a linear expression
    fn linearise(
        &mut self,
        expr: &Expr,
        bindings: &HashMap<&str, LinearExpr>,
    ) -> Result<LinearExpr, SolveError> {
        let (op, operands) = match expr {
            Expr::Int(value) => return Ok(LinearExpr::constant(*value as f64)),
            Expr::Param(name) => {
                return bindings
                    .get(name.as_str())
                    .cloned()
                    .ok_or_else(|| unsupported(expr, "unbound parameter"));
            }
            Expr::Apply(op, operands) => (*op, operands),
        };

        let args = operands
            .iter()
            .map(|operand| self.linearise(operand, bindings))
            .collect::<Result<Vec<_>, _>>()?;

        let value = match (op, args.as_slice()) {
            (Operator::Add, [a, b]) => a.clone().add_scaled(b, 1.0),
            (Operator::Sub, [a, b]) => a.clone().add_scaled(b, -1.0),
            (Operator::Neg, [a]) => a.clone().scale(-1.0),
            (Operator::Mul, [a, b]) => match (a.as_constant(), b.as_constant()) {
                (Some(factor), _) => b.clone().scale(factor),
                (_, Some(factor)) => a.clone().scale(factor),
                _ => return Err(unsupported(expr, "product of two variables")),
            },
            (Operator::Div, [a, b]) => match b.as_constant() {
                Some(divisor) if divisor != 0.0 => a.clone().scale(1.0 / divisor),
                Some(_) => return Err(unsupported(expr, "division by zero")),
                None => return Err(unsupported(expr, "division by a variable")),
            },
            (Operator::Abs, [a]) => self.linearise_abs(a),
            _ => return Err(unsupported(expr, "operator cannot be linearised")),
        };

        Ok(value)
    }

    /// Introduce a column equal to `|expr|`
    fn linearise_abs(&mut self, expr: &LinearExpr) -> LinearExpr {
        let (lower, upper) = self.bounds(expr);
        if lower >= 0.0 {
            return expr.clone();
        }
        if upper <= 0.0 {
            return expr.clone().scale(-1.0);
        }

        // t = |e| via t >= e, t >= -e, t <= e + M(1 - b), t <= -e + Mb with b binary
        let big_m = 2.0 * lower.abs().max(upper.abs());
        let t = LinearExpr::column(self.add_column(0.0, lower.abs().max(upper.abs())));
        let b = LinearExpr::column(self.add_column(0.0, 1.0));

        self.add_row(&t.clone().add_scaled(expr, -1.0), 0.0, f64::INFINITY);
        self.add_row(&t.clone().add_scaled(expr, 1.0), 0.0, f64::INFINITY);
        self.add_row(
            &t.clone().add_scaled(expr, -1.0).add_scaled(&b, big_m),
            f64::NEG_INFINITY,
            big_m,
        );
        self.add_row(
            &t.clone().add_scaled(expr, 1.0).add_scaled(&b, -big_m),
            f64::NEG_INFINITY,
            0.0,
        );

        t
    }

    /// Solve the program with HiGHS, returning the values of the problem's variables
    pub fn solve(&self) -> Result<IndexMap<String, i64>, SolveError> {
        let mut problem = RowProblem::default();
        let columns: Vec<_> = self
            .columns
            .iter()
            .enumerate()
            .map(|(index, column)| {
                let cost = self.objective.terms.get(&index).copied().unwrap_or(0.0);
                problem.add_integer_column(cost, column.lower..=column.upper)
            })
            .collect();
        for row in &self.rows {
            problem.add_row(
                row.lower..=row.upper,
                row.terms
                    .iter()
                    .map(|(index, coeff)| (columns[*index], *coeff)),
            );
        }

        let sense = if self.maximise {
            Sense::Maximise
        } else {
            Sense::Minimise
        };
        let mut model = problem.optimise(sense);
        model.set_option("output_flag", false);
        let solved = model.solve();

        match solved.status() {
            HighsModelStatus::Optimal => {
                let values = solved.get_solution();
                let values = values.columns();
                Ok(self
                    .variables
                    .iter()
                    .map(|(name, index)| (name.clone(), values[*index].round() as i64))
                    .collect())
            }
            HighsModelStatus::Infeasible => Err(SolveError::Infeasible),
            status => Err(SolveError::Unsupported(format!(
                "Solver finished with status {status:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::expression::{abs, add, div, ge, le, mul, param};
    use crate::problem::{Domain, Template};

    /// A single variable `x` in `[lo, hi]` with one function `f(x)`
    fn single_variable(lo: i64, hi: i64, function: Expr, maximise: bool) -> Problem {
        let mut problem = Problem::new("p", maximise);
        problem.add_agent("A");
        problem
            .add_variable("x", Domain::new(lo, hi).unwrap(), "A")
            .unwrap();
        let name = problem
            .add_template(Template::new("f", TemplateKind::Function, &["x"], function).unwrap());
        problem
            .add_constraint("c", &name, vec![Argument::var("x")])
            .unwrap();
        problem
    }

    #[test]
    fn test_solve_minimise_with_predicate() {
        let mut problem = single_variable(0, 10, mul(param("x"), Expr::Int(3)), false);
        let name = problem.add_template(
            Template::new(
                "atLeast",
                TemplateKind::Predicate,
                &["x", "d"],
                ge(param("x"), param("d")),
            )
            .unwrap(),
        );
        problem
            .add_constraint("d", &name, vec![Argument::var("x"), Argument::Literal(4)])
            .unwrap();

        let values = LinearProgram::from_problem(&problem)
            .unwrap()
            .solve()
            .unwrap();
        assert_eq!(values["x"], 4);
    }

    #[test]
    fn test_solve_positive_part() {
        // Only positive values of x earn anything, so the optimum is the upper bound
        let function = mul(div(add(param("x"), abs(param("x"))), Expr::Int(2)), Expr::Int(5));
        let problem = single_variable(-7, 6, function, true);
        let values = LinearProgram::from_problem(&problem)
            .unwrap()
            .solve()
            .unwrap();
        assert_eq!(values["x"], 6);
    }

    #[test]
    fn test_solve_abs_minimum() {
        let problem = single_variable(-7, 6, abs(param("x")), false);
        let values = LinearProgram::from_problem(&problem)
            .unwrap()
            .solve()
            .unwrap();
        assert_eq!(values["x"], 0);
    }

    #[test]
    fn test_infeasible() {
        let mut problem = single_variable(0, 10, param("x"), false);
        let name = problem.add_template(
            Template::new(
                "atMost",
                TemplateKind::Predicate,
                &["x", "d"],
                le(param("x"), param("d")),
            )
            .unwrap(),
        );
        problem
            .add_constraint("d", &name, vec![Argument::var("x"), Argument::Literal(-1)])
            .unwrap();

        assert!(matches!(
            LinearProgram::from_problem(&problem).unwrap().solve(),
            Err(SolveError::Infeasible)
        ));
    }

    #[test]
    fn test_unsupported() {
        let problem = single_variable(0, 10, mul(param("x"), param("x")), false);
        assert!(matches!(
            LinearProgram::from_problem(&problem),
            Err(SolveError::Unsupported(_))
        ));
    }
}
