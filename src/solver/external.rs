//! Run an external program as the solver.
use super::{SolveError, SubproblemSolver};
use crate::xcsp::{Solution, read_solution_file};
use log::debug;
use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::runtime;
use tokio::time::timeout;

/// Placeholder in the argument list substituted with the problem path
pub const PROBLEM_PLACEHOLDER: &str = "{problem}";
/// Placeholder in the argument list substituted with the solution path
pub const SOLUTION_PLACEHOLDER: &str = "{solution}";

/// Solves problems by running a program which reads a problem file and writes a solution file
#[derive(Debug, Clone)]
pub struct ExternalSolver {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl ExternalSolver {
    /// Create a new external solver.
    ///
    /// # Arguments
    ///
    /// * `program` - The program to run
    /// * `args` - Arguments, in which `{problem}` and `{solution}` are replaced by file paths
    /// * `timeout` - How long to wait for the program before killing it (`None` waits forever)
    pub fn new(program: &str, args: &[String], timeout: Option<Duration>) -> Self {
        Self {
            program: program.to_string(),
            args: args.to_vec(),
            timeout,
        }
    }

    fn substitute_args(&self, problem_path: &Path, solution_path: &Path) -> Vec<String> {
        let problem = problem_path.to_string_lossy();
        let solution = solution_path.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace(PROBLEM_PLACEHOLDER, &problem)
                    .replace(SOLUTION_PLACEHOLDER, &solution)
            })
            .collect()
    }

    /// Run the program to completion or until the timeout, whichever comes first
    async fn run(
        &self,
        args: &[String],
        stdout: File,
        stderr: File,
    ) -> Result<ExitStatus, SolveError> {
        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true);

        // A timeout kills the whole group, including anything started by a wrapper script
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| SolveError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let Some(limit) = self.timeout else {
            return Ok(child.wait().await?);
        };

        match timeout(limit, child.wait()).await {
            Ok(status) => Ok(status?),
            Err(_) => {
                kill_process_group(&child);
                child.kill().await?;
                Err(SolveError::Timeout(limit))
            }
        }
    }
}

/// Kill every process in the child's process group
#[cfg(unix)]
fn kill_process_group(child: &Child) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    // The group ID is the same as the ID of its leader
    let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    if let Err(err) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        debug!("Failed to kill process group {pid}: {err}");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) {}

/// Remove a file left behind by an earlier run, if there is one
fn remove_stale(file_path: &Path) -> io::Result<()> {
    match fs::remove_file(file_path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

impl SubproblemSolver for ExternalSolver {
    fn solve(&self, problem_path: &Path, solution_path: &Path) -> Result<Solution, SolveError> {
        remove_stale(solution_path)?;
        let stdout_path = solution_path.with_extension("stdout");
        let stderr_path = solution_path.with_extension("stderr");

        let args = self.substitute_args(problem_path, solution_path);
        debug!("Running solver: {} {}", self.program, args.join(" "));

        // Driven by the calling worker thread
        let runtime = runtime::Builder::new_current_thread().enable_all().build()?;
        let status = runtime.block_on(self.run(
            &args,
            File::create(&stdout_path)?,
            File::create(&stderr_path)?,
        ))?;

        if !status.success() {
            let stderr = fs::read_to_string(&stderr_path).unwrap_or_default();
            return Err(SolveError::ExitStatus {
                status,
                stderr: stderr.trim().to_string(),
            });
        }

        read_solution_file(solution_path)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn shell(script: &str, timeout: Option<Duration>) -> ExternalSolver {
        ExternalSolver::new(
            "sh",
            &[
                "-c".to_string(),
                script.to_string(),
                "sh".to_string(),
                PROBLEM_PLACEHOLDER.to_string(),
                SOLUTION_PLACEHOLDER.to_string(),
            ],
            timeout,
        )
    }

    #[test]
    fn test_solve_success() {
        let dir = tempdir().unwrap();
        let problem = dir.path().join("problem.xml");
        let solution = dir.path().join("solution.xml");
        fs::write(&problem, "<instance/>").unwrap();

        let solver = shell(
            r#"test -f "$1" && echo '<solution valuation="7"/>' > "$2""#,
            None,
        );
        assert_eq!(solver.solve(&problem, &solution).unwrap().valuation, 7);
    }

    #[test]
    fn test_solve_exit_status() {
        let dir = tempdir().unwrap();
        let solver = shell("echo broken >&2; exit 3", None);
        let err = solver
            .solve(&dir.path().join("p.xml"), &dir.path().join("s.xml"))
            .unwrap_err();
        match err {
            SolveError::ExitStatus { stderr, .. } => assert_eq!(stderr, "broken"),
            other => panic!("Unexpected error: {other}"),
        }
    }

    #[test]
    fn test_solve_missing_output() {
        let dir = tempdir().unwrap();
        let solver = shell("true", None);
        assert!(matches!(
            solver.solve(&dir.path().join("p.xml"), &dir.path().join("s.xml")),
            Err(SolveError::MissingOutput(_))
        ));
    }

    #[test]
    fn test_solve_timeout() {
        let dir = tempdir().unwrap();
        let solver = shell("sleep 5", Some(Duration::from_millis(50)));
        assert!(matches!(
            solver.solve(&dir.path().join("p.xml"), &dir.path().join("s.xml")),
            Err(SolveError::Timeout(_))
        ));
    }

    #[test]
    fn test_solve_timeout_kills_descendants() {
        let dir = tempdir().unwrap();
        let solution = dir.path().join("s.xml");
        let late = dir.path().join("s.xml.late");

        // The shell starts a background job and waits for it, as solver wrapper scripts do
        let solver = shell(
            r#"(sleep 1; echo late > "$2.late") & wait"#,
            Some(Duration::from_millis(100)),
        );
        assert!(matches!(
            solver.solve(&dir.path().join("p.xml"), &solution),
            Err(SolveError::Timeout(_))
        ));

        std::thread::sleep(Duration::from_millis(1500));
        assert!(!late.exists());
    }

    #[test]
    fn test_solve_spawn_failure() {
        let dir = tempdir().unwrap();
        let solver = ExternalSolver::new("/nonexistent/solver", &[], None);
        assert!(matches!(
            solver.solve(&dir.path().join("p.xml"), &dir.path().join("s.xml")),
            Err(SolveError::Spawn { .. })
        ));
    }
}
