//! Integration tests for the `example run` command.
use shadowgrid::cli::RunOpts;
use shadowgrid::cli::example::handle_example_run_command;
use shadowgrid::settings::Settings;
use tempfile::tempdir;

/// An integration test for the `example run` command.
#[test]
fn test_handle_example_run_command() {
    unsafe { std::env::set_var("SHADOWGRID_LOG_LEVEL", "off") };

    let dir = tempdir().unwrap();
    let opts = RunOpts {
        output_dir: Some(dir.path().join("results")),
        ..RunOpts::default()
    };
    handle_example_run_command("two_regions", &opts, Some(Settings::default())).unwrap();
    assert!(dir.path().join("results").join("convergence.csv").is_file());
}
