//! An in-process solver backed by HiGHS.
use super::linear::LinearProgram;
use super::{SolveError, SubproblemSolver};
use crate::problem::Problem;
use crate::xcsp::{Solution, read_problem_file, write_solution_file};
use std::io;
use std::path::Path;

/// Solves problems exactly by converting them into mixed-integer linear programs
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceSolver;

/// Find an optimal assignment for the problem.
///
/// The valuation reported is computed from the problem's own expressions for the chosen
/// assignment, so it is exact even where the linearisation involves fractional coefficients.
pub fn solve_problem(problem: &Problem) -> Result<Solution, SolveError> {
    let assignments = LinearProgram::from_problem(problem)?.solve()?;
    let evaluation = problem
        .evaluate(&assignments)
        .map_err(|err| SolveError::InvalidProblem(format!("{err:#}")))?;
    if !evaluation.feasible {
        return Err(SolveError::Infeasible);
    }

    let valuation = u64::try_from(evaluation.valuation)
        .map_err(|_| SolveError::InvalidValuation(evaluation.valuation.to_string()))?;

    Ok(Solution {
        valuation,
        assignments,
    })
}

impl SubproblemSolver for ReferenceSolver {
    fn solve(&self, problem_path: &Path, solution_path: &Path) -> Result<Solution, SolveError> {
        let problem = read_problem_file(problem_path)
            .map_err(|err| SolveError::InvalidProblem(format!("{err:#}")))?;
        let solution = solve_problem(&problem)?;
        write_solution_file(&solution, solution_path)
            .map_err(|err| io::Error::other(format!("{err:#}")))?;

        Ok(solution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::expression::{ge, mul, param};
    use crate::problem::{Argument, Domain, Template, TemplateKind};
    use crate::xcsp::{read_solution_file, write_problem_file};
    use tempfile::tempdir;

    /// Minimise 2x subject to x >= 3
    fn problem() -> Problem {
        let mut problem = Problem::new("p", false);
        problem.add_agent("A");
        problem
            .add_variable("x", Domain::new(0, 10).unwrap(), "A")
            .unwrap();
        let demand = problem.add_template(
            Template::new(
                "demand",
                TemplateKind::Predicate,
                &["x", "d"],
                ge(param("x"), param("d")),
            )
            .unwrap(),
        );
        problem
            .add_constraint("meet", &demand, vec![Argument::var("x"), Argument::Literal(3)])
            .unwrap();
        let cost = problem.add_template(
            Template::new(
                "cost",
                TemplateKind::Function,
                &["x", "c"],
                mul(param("x"), param("c")),
            )
            .unwrap(),
        );
        problem
            .add_constraint("cost", &cost, vec![Argument::var("x"), Argument::Literal(2)])
            .unwrap();
        problem
    }

    #[test]
    fn test_solve_problem() {
        let solution = solve_problem(&problem()).unwrap();
        assert_eq!(solution.valuation, 6);
        assert_eq!(solution.value("x"), Some(3));
    }

    #[test]
    fn test_solve_files() {
        let dir = tempdir().unwrap();
        let problem_path = dir.path().join("p.xml");
        let solution_path = dir.path().join("s.xml");
        write_problem_file(&problem(), &problem_path).unwrap();

        let solution = ReferenceSolver.solve(&problem_path, &solution_path).unwrap();
        assert_eq!(read_solution_file(&solution_path).unwrap(), solution);
    }

    #[test]
    fn test_solve_invalid_problem() {
        let dir = tempdir().unwrap();
        let problem_path = dir.path().join("p.xml");
        std::fs::write(&problem_path, "<instance></instance>").unwrap();
        assert!(matches!(
            ReferenceSolver.solve(&problem_path, &dir.path().join("s.xml")),
            Err(SolveError::InvalidProblem(_))
        ));
    }
}
