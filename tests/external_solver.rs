//! Runs a model with subproblems solved by a separate process.
//!
//! The program's own `solve` command stands in for a third-party solver.
use shadowgrid::cli::{RunOpts, handle_run_command};
use shadowgrid::settings::{Settings, SolverKind, SolverSettings};
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

#[test]
fn test_run_with_external_solver() {
    unsafe { std::env::set_var("SHADOWGRID_LOG_LEVEL", "off") };

    let settings = Settings {
        debug_model: true,
        solver: SolverSettings {
            kind: SolverKind::External,
            program: env!("CARGO_BIN_EXE_shadowgrid").to_string(),
            args: vec!["solve".into(), "{problem}".into(), "{solution}".into()],
            ..SolverSettings::default()
        },
        ..Settings::default()
    };

    let dir = tempdir().unwrap();
    let output_dir = dir.path().join("results");
    let opts = RunOpts {
        output_dir: Some(output_dir.clone()),
        ..RunOpts::default()
    };
    handle_run_command(
        &PathBuf::from("demos/two_regions"),
        &opts,
        Some(settings),
    )
    .unwrap();

    let round_dir = output_dir.join("artifacts/2020/day/round_1");
    assert!(round_dir.join("GBR_baseline_solution.xml").is_file());
    assert!(round_dir.join("FRA_decrease_solution.xml").is_file());

    let metadata = fs::read_to_string(output_dir.join("metadata.toml")).unwrap();
    assert!(metadata.contains("external ("));
}
