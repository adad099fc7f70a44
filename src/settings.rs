//! Code for loading program settings.
use crate::get_shadowgrid_config_dir;
use crate::input::read_toml;
use crate::log::DEFAULT_LOG_LEVEL;
use anyhow::{Context, Result};
use documented::DocumentedFields;
use serde::{Deserialize, Serialize};
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};
use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SETTINGS_FILE_NAME: &str = "settings.toml";

const DEFAULT_SETTINGS_FILE_HEADER: &str = "# This file contains the program settings for shadowgrid
# Uncomment a setting to change it from its default value
";

/// Default log level for program
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_solver_args() -> Vec<String> {
    vec!["{problem}".to_string(), "{solution}".to_string()]
}

fn default_timeout_secs() -> u64 {
    600
}

/// Get the path to where the settings file will be read from
pub fn get_settings_file_path() -> Result<PathBuf> {
    let mut path = get_shadowgrid_config_dir()?;
    path.push(SETTINGS_FILE_NAME);

    Ok(path)
}

/// Which solver to use for subproblems
#[derive(
    PartialEq, Default, Debug, Clone, Copy, DeserializeLabeledStringEnum, SerializeLabeledStringEnum,
)]
pub enum SolverKind {
    /// The built-in solver
    #[default]
    #[string = "reference"]
    Reference,
    /// An external program
    #[string = "external"]
    External,
}

/// Settings for the subproblem solver
#[derive(Debug, DocumentedFields, Serialize, Deserialize, PartialEq, Clone)]
pub struct SolverSettings {
    /// Which solver to use ("reference" for the built-in solver or "external")
    #[serde(default)]
    pub kind: SolverKind,
    /// The program to run for an external solver
    #[serde(default)]
    pub program: String,
    /// Arguments for an external solver. "{problem}" and "{solution}" are replaced by file paths.
    #[serde(default = "default_solver_args")]
    pub args: Vec<String>,
    /// Seconds to wait for an external solver before giving up (0 for no limit)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            kind: SolverKind::default(),
            program: String::new(),
            args: default_solver_args(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl SolverSettings {
    /// The time limit for a single solve, if any
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Program settings from config file
#[derive(Debug, DocumentedFields, Serialize, Deserialize, PartialEq, Clone)]
pub struct Settings {
    /// The default program log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Whether to overwrite output files by default
    #[serde(default)]
    pub overwrite: bool,
    /// Whether to keep the subproblem files passed to the solver
    #[serde(default)]
    pub debug_model: bool,
    /// Number of subproblems to solve in parallel (0 to use all CPUs)
    #[serde(default)]
    pub num_threads: usize,
    /// Settings for the subproblem solver
    #[serde(default)]
    pub solver: SolverSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            overwrite: false,
            debug_model: false,
            num_threads: 0,
            solver: SolverSettings::default(),
        }
    }
}

impl Settings {
    /// Read the contents of the user's settings file.
    ///
    /// If the file is not present, default values for settings will be used.
    ///
    /// # Returns
    ///
    /// The program settings as a `Settings` struct or an error if the file is invalid
    pub fn load() -> Result<Settings> {
        Self::load_from_path(&get_settings_file_path()?)
    }

    /// Read from the specified path, using defaults if the file doesn't exist
    fn load_from_path(file_path: &Path) -> Result<Settings> {
        if !file_path.is_file() {
            return Ok(Settings::default());
        }

        read_toml(file_path)
    }

    /// The contents of the default settings file, with every setting commented out
    pub fn default_file_contents() -> Result<String> {
        let settings_raw = toml::to_string(&Settings::default())?;

        // Iterate through the generated TOML, commenting out lines and adding docs
        let mut out = DEFAULT_SETTINGS_FILE_HEADER.to_string();
        let mut in_solver_table = false;
        for line in settings_raw.lines() {
            let line = line.trim();
            if line.starts_with('[') {
                in_solver_table = line == "[solver]";
                write!(&mut out, "\n# {line}\n")?;
                continue;
            }

            if let Some(last) = line.find('=') {
                let field = line[..last].trim();
                let docs = if in_solver_table {
                    SolverSettings::get_field_docs(field)
                } else {
                    Settings::get_field_docs(field)
                }
                .ok()
                .with_context(|| format!("Missing doc comment for field {field}"))?;

                for doc_line in docs.split('\n') {
                    write!(&mut out, "\n# # {}\n", doc_line.trim())?;
                }
                writeln!(&mut out, "# {line}")?;
            }
        }

        Ok(out)
    }
}
