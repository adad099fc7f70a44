//! Solvers for subproblems written to disk.
//!
//! A solver reads a problem file, writes a solution file and returns the parsed solution. Solvers
//! must be usable from several worker threads at once, as the subproblems in a round are solved
//! in parallel.
use crate::settings::{SolverKind, SolverSettings};
use crate::xcsp::Solution;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

mod external;
mod linear;
mod reference;
pub use external::ExternalSolver;
pub use reference::{ReferenceSolver, solve_problem};

/// The ways in which solving a single subproblem can fail
#[derive(Debug, Error)]
pub enum SolveError {
    /// The solver process could not be started
    #[error("Failed to start solver process {program}")]
    Spawn {
        /// The program which was run
        program: String,
        /// The underlying error
        #[source]
        source: io::Error,
    },
    /// The solver did not finish in time
    #[error("Solver timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),
    /// The solver exited unsuccessfully
    #[error("Solver exited with {status}: {stderr}")]
    ExitStatus {
        /// The exit status of the process
        status: ExitStatus,
        /// What the solver wrote to stderr
        stderr: String,
    },
    /// The solver finished without writing a solution
    #[error("Solver did not write a solution to {}", .0.display())]
    MissingOutput(PathBuf),
    /// The solution could not be parsed
    #[error("Malformed solution: {0}")]
    MalformedOutput(String),
    /// The solution does not state the achieved valuation
    #[error("Solution is missing a valuation")]
    MissingValuation,
    /// The valuation is not a non-negative integer
    #[error("Invalid valuation {0:?}: must be a non-negative integer")]
    InvalidValuation(String),
    /// The problem file could not be read
    #[error("Invalid problem: {0}")]
    InvalidProblem(String),
    /// The problem uses an expression the solver cannot handle
    #[error("Unsupported expression: {0}")]
    Unsupported(String),
    /// No assignment satisfies all the constraints
    #[error("Problem is infeasible")]
    Infeasible,
    /// Any other I/O error
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A failure to solve a subproblem, identifying which one
#[derive(Debug, Error)]
#[error("Failed to solve subproblem {label} ({})", .problem_path.display())]
pub struct SolveFailure {
    /// Human-readable description of the subproblem
    pub label: String,
    /// Where the problem was written
    pub problem_path: PathBuf,
    /// Why solving failed
    #[source]
    pub error: SolveError,
}

/// Something that can solve subproblems
pub trait SubproblemSolver: Sync {
    /// Solve the problem at `problem_path`, writing the solution to `solution_path`
    fn solve(&self, problem_path: &Path, solution_path: &Path) -> Result<Solution, SolveError>;
}

/// Create the solver described by the program settings
pub fn create_solver(settings: &SolverSettings) -> Box<dyn SubproblemSolver> {
    match settings.kind {
        SolverKind::Reference => Box::new(ReferenceSolver),
        SolverKind::External => Box::new(ExternalSolver::new(
            &settings.program,
            &settings.args,
            settings.timeout(),
        )),
    }
}
