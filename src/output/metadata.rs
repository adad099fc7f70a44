//! Code for writing run metadata to file
use crate::settings::Settings;
use anyhow::{Result, anyhow};
use chrono::prelude::*;
use platform_info::{PlatformInfo, PlatformInfoAPI, UNameAPI};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// The output file name for metadata
const METADATA_FILE_NAME: &str = "metadata.toml";

/// Information about the program build via `built` crate
mod built_info {
    // The file has been placed there by the build script.
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

/// Get information about program version from git
fn get_git_hash() -> String {
    let Some(hash) = built_info::GIT_COMMIT_HASH_SHORT else {
        return "unknown".into();
    };

    if built_info::GIT_DIRTY == Some(true) {
        format!("{hash}-dirty")
    } else {
        hash.into()
    }
}

#[derive(Serialize)]
struct Metadata<'a> {
    run: RunMetadata<'a>,
    program: ProgramMetadata,
    platform: PlatformMetadata,
}

/// Information about the model run
#[derive(Serialize)]
struct RunMetadata<'a> {
    /// Path to the model which was run
    model_path: &'a Path,
    /// The date and time on which the run started
    datetime: String,
    /// The subproblem solver used
    solver: String,
    /// Number of worker threads requested (0 for one per CPU)
    num_threads: usize,
}

#[derive(Serialize)]
struct ProgramMetadata {
    name: &'static str,
    version: &'static str,
    /// The target triple for the build (e.g. x86_64-unknown-linux-gnu)
    target: &'static str,
    is_debug: bool,
    rustc_version: &'static str,
    build_time_utc: &'static str,
    /// The git commit hash of the build, if known
    git_commit_hash: String,
}

impl ProgramMetadata {
    fn new() -> Self {
        Self {
            name: built_info::PKG_NAME,
            version: built_info::PKG_VERSION,
            target: built_info::TARGET,
            is_debug: built_info::DEBUG,
            rustc_version: built_info::RUSTC_VERSION,
            build_time_utc: built_info::BUILT_TIME_UTC,
            git_commit_hash: get_git_hash(),
        }
    }
}

/// Information about the platform, as reported by [`PlatformInfo`]
#[derive(Serialize)]
struct PlatformMetadata {
    sysname: String,
    nodename: String,
    release: String,
    version: String,
    machine: String,
    osname: String,
}

impl PlatformMetadata {
    fn new() -> Result<Self> {
        let info = PlatformInfo::new()
            .map_err(|err| anyhow!("Unable to determine platform info: {err}"))?;
        Ok(Self {
            sysname: info.sysname().to_string_lossy().into(),
            nodename: info.nodename().to_string_lossy().into(),
            release: info.release().to_string_lossy().into(),
            version: info.version().to_string_lossy().into(),
            machine: info.machine().to_string_lossy().into(),
            osname: info.osname().to_string_lossy().into(),
        })
    }
}

/// Write metadata to the specified output path in TOML format
pub fn write_metadata(output_path: &Path, model_path: &Path, settings: &Settings) -> Result<()> {
    let solver = match settings.solver.kind {
        crate::settings::SolverKind::Reference => "reference".to_string(),
        crate::settings::SolverKind::External => {
            format!("external ({})", settings.solver.program)
        }
    };
    let metadata = Metadata {
        run: RunMetadata {
            model_path,
            datetime: Local::now().to_rfc2822(),
            solver,
            num_threads: settings.num_threads,
        },
        program: ProgramMetadata::new(),
        platform: PlatformMetadata::new()?,
    };
    let file_path = output_path.join(METADATA_FILE_NAME);
    fs::write(&file_path, toml::to_string(&metadata)?)?;

    Ok(())
}
