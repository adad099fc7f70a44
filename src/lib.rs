//! Common functionality for shadowgrid.
#![warn(missing_docs)]
use anyhow::{Context, Result};
use std::path::PathBuf;

pub mod agent;
pub mod cli;
pub mod finance;
pub mod id;
pub mod input;
pub mod log;
pub mod model;
pub mod output;
pub mod problem;
pub mod region;
pub mod settings;
pub mod simulation;
pub mod solver;
pub mod technology;
pub mod time_slice;
pub mod topology;
pub mod units;
pub mod xcsp;

#[cfg(test)]
mod fixture;

/// Get the directory in which the program's configuration files are stored
pub fn get_shadowgrid_config_dir() -> Result<PathBuf> {
    let mut path = dirs::config_dir().context("Could not determine the configuration directory")?;
    path.push("shadowgrid");

    Ok(path)
}
