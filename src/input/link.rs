//! Code for reading the transmission topology.
use super::{input_err_msg, read_csv_optional};
use crate::id::IDCollection;
use crate::region::RegionMap;
use crate::topology::{Topology, TransmissionLink};
use crate::units::Capacity;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

const LINKS_FILE_NAME: &str = "links.csv";

#[derive(PartialEq, Debug, Deserialize)]
struct LinkRaw {
    origin: String,
    destination: String,
    capacity: f64,
}

/// Read transmission links from the specified model directory.
///
/// The file is optional. Without it, regions are planned in isolation.
pub fn read_topology(model_dir: &Path, regions: &RegionMap) -> Result<Topology> {
    let file_path = model_dir.join(LINKS_FILE_NAME);
    let iter = read_csv_optional::<LinkRaw>(&file_path)?;
    read_topology_from_iter(iter, regions).with_context(|| input_err_msg(&file_path))
}

fn read_topology_from_iter<I>(iter: I, regions: &RegionMap) -> Result<Topology>
where
    I: Iterator<Item = LinkRaw>,
{
    let links: Vec<_> = iter
        .map(|raw| {
            Ok(TransmissionLink {
                origin: regions.get_id_by_str(&raw.origin)?,
                destination: regions.get_id_by_str(&raw.destination)?,
                capacity: Capacity(raw.capacity),
            })
        })
        .collect::<Result<_>>()?;

    Topology::from_links(links)
}
