//! Runs the subproblems of a round through a solver in parallel.
use crate::problem::Problem;
use crate::solver::{SolveError, SolveFailure, SubproblemSolver};
use crate::xcsp::{Solution, write_problem_file};
use anyhow::{Context, Result};
use log::debug;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// The name of the folder in the output directory where subproblems are kept for debugging
const ARTIFACTS_DIRECTORY_NAME: &str = "artifacts";

/// Where subproblems and their solutions are written
#[derive(Debug)]
pub enum WorkArea {
    /// A temporary directory, deleted when dropped
    Temporary(TempDir),
    /// A directory which is kept after the run
    Persistent(PathBuf),
}

impl WorkArea {
    /// Create a temporary work area
    pub fn temporary() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("shadowgrid")
            .tempdir()
            .context("Failed to create temporary directory for subproblems")?;
        Ok(Self::Temporary(dir))
    }

    /// Create a work area inside the output directory
    pub fn persistent(output_path: &Path) -> Result<Self> {
        let path = output_path.join(ARTIFACTS_DIRECTORY_NAME);
        fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create directory {}", path.display()))?;
        Ok(Self::Persistent(path))
    }

    /// The root of the work area
    pub fn path(&self) -> &Path {
        match self {
            Self::Temporary(dir) => dir.path(),
            Self::Persistent(path) => path,
        }
    }

    /// Get the directory for one round of a time slice, creating it if needed
    pub fn round_dir(&self, year: u32, time_slice: &str, round: u32) -> Result<PathBuf> {
        let path = self
            .path()
            .join(year.to_string())
            .join(time_slice)
            .join(format!("round_{round}"));
        fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create directory {}", path.display()))?;
        Ok(path)
    }
}

/// A subproblem waiting to be solved
#[derive(Debug, Clone)]
pub struct SolveTask {
    /// Description of the subproblem used in error messages
    pub label: String,
    /// The subproblem
    pub problem: Problem,
    /// Where the subproblem is written
    pub problem_path: PathBuf,
    /// Where the solver writes its solution
    pub solution_path: PathBuf,
}

impl SolveTask {
    /// Create a task whose files are named after the problem and placed in `dir`
    pub fn new(label: String, problem: Problem, dir: &Path) -> Self {
        let problem_path = dir.join(format!("{}.xml", problem.name));
        let solution_path = dir.join(format!("{}_solution.xml", problem.name));
        Self {
            label,
            problem,
            problem_path,
            solution_path,
        }
    }

    fn run(&self, solver: &dyn SubproblemSolver) -> Result<Solution, SolveFailure> {
        let fail = |error| SolveFailure {
            label: self.label.clone(),
            problem_path: self.problem_path.clone(),
            error,
        };

        write_problem_file(&self.problem, &self.problem_path)
            .map_err(|err| fail(SolveError::Io(io::Error::other(format!("{err:#}")))))?;
        debug!("Solving {}", self.label);
        solver
            .solve(&self.problem_path, &self.solution_path)
            .map_err(fail)
    }
}

/// Solves batches of subproblems in a bounded pool of worker threads
pub struct Invoker<'a> {
    solver: &'a dyn SubproblemSolver,
    pool: ThreadPool,
}

impl<'a> Invoker<'a> {
    /// Create an invoker.
    ///
    /// # Arguments
    ///
    /// * `solver` - The solver to use for every subproblem
    /// * `num_threads` - The number of worker threads, or zero to use one per CPU
    pub fn new(solver: &'a dyn SubproblemSolver, num_threads: usize) -> Result<Self> {
        let num_threads = if num_threads == 0 {
            num_cpus::get()
        } else {
            num_threads
        };
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("shadowgrid-solver-{i}"))
            .build()
            .context("Failed to create thread pool")?;

        Ok(Self { solver, pool })
    }

    /// Solve a single subproblem on the calling thread
    pub fn solve(&self, task: &SolveTask) -> Result<Solution, SolveFailure> {
        task.run(self.solver)
    }

    /// Solve every task, returning solutions in the same order as the tasks.
    ///
    /// All tasks are run to completion before returning. If any fail, the failure of the first
    /// such task is returned.
    pub fn solve_all(&self, tasks: &[SolveTask]) -> Result<Vec<Solution>, SolveFailure> {
        let solver = self.solver;
        let results: Vec<_> = self
            .pool
            .install(|| tasks.par_iter().map(|task| task.run(solver)).collect());

        results.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns the number of the problem as the valuation and fails for names containing "bad"
    struct StubSolver {
        calls: AtomicUsize,
    }

    impl SubproblemSolver for StubSolver {
        fn solve(&self, problem_path: &Path, _: &Path) -> Result<Solution, SolveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let stem = problem_path.file_stem().unwrap().to_str().unwrap();
            if stem.contains("bad") {
                return Err(SolveError::MissingValuation);
            }

            Ok(Solution {
                valuation: stem.trim_start_matches('p').parse().unwrap(),
                assignments: IndexMap::new(),
            })
        }
    }

    fn tasks(dir: &Path, names: &[&str]) -> Vec<SolveTask> {
        names
            .iter()
            .map(|name| SolveTask::new(format!("task {name}"), Problem::new(name, false), dir))
            .collect()
    }

    #[test]
    fn test_solve_all_in_order() {
        let work_area = WorkArea::temporary().unwrap();
        let dir = work_area.round_dir(2020, "day", 1).unwrap();
        let solver = StubSolver {
            calls: AtomicUsize::new(0),
        };
        let invoker = Invoker::new(&solver, 2).unwrap();

        let names = ["p1", "p2", "p3", "p4", "p5"];
        let solutions = invoker.solve_all(&tasks(&dir, &names)).unwrap();
        let valuations: Vec<_> = solutions.iter().map(|s| s.valuation).collect();
        assert_eq!(valuations, [1, 2, 3, 4, 5]);

        // Every problem was written to the work area
        for name in names {
            assert!(dir.join(format!("{name}.xml")).is_file());
        }
    }

    #[test]
    fn test_solve_all_first_failure_wins() {
        let work_area = WorkArea::temporary().unwrap();
        let dir = work_area.path();
        let solver = StubSolver {
            calls: AtomicUsize::new(0),
        };
        let invoker = Invoker::new(&solver, 0).unwrap();

        let failure = invoker
            .solve_all(&tasks(dir, &["p1", "bad1", "p3", "bad2"]))
            .unwrap_err();
        assert_eq!(failure.label, "task bad1");
        assert_eq!(failure.problem_path, dir.join("bad1.xml"));
        assert!(matches!(failure.error, SolveError::MissingValuation));

        // Tasks are not abandoned after a failure
        assert_eq!(solver.calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_work_area_persistent() {
        let dir = tempfile::tempdir().unwrap();
        let work_area = WorkArea::persistent(dir.path()).unwrap();
        let round_dir = work_area.round_dir(2030, "night", 2).unwrap();
        assert_eq!(
            round_dir,
            dir.path().join("artifacts").join("2030").join("night").join("round_2")
        );
        assert!(round_dir.is_dir());
    }
}
