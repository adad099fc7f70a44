//! Code for working with time slices.
//!
//! A time slice is a named sub-annual bucket with a weight, its fraction of the year. Demand and
//! availability are given per time slice, and each time slice is coordinated separately.
use crate::id::{IDCollection, define_id_type};
use crate::units::Dimensionless;
use anyhow::{Context, Result};
use indexmap::IndexMap;

define_id_type! {TimeSliceID}

/// Information about the time slices in the simulation
#[derive(PartialEq, Debug)]
pub struct TimeSliceInfo {
    /// The fraction of the year that each time slice covers, in input order
    pub fractions: IndexMap<TimeSliceID, Dimensionless>,
}

impl Default for TimeSliceInfo {
    /// The default `TimeSliceInfo` is a single time slice covering the whole year
    fn default() -> Self {
        let id = TimeSliceID::new("annual");
        Self {
            fractions: [(id, Dimensionless(1.0))].into_iter().collect(),
        }
    }
}

impl TimeSliceInfo {
    /// Get a `TimeSliceID` from the specified `&str`
    pub fn get_time_slice_id_from_str(&self, time_slice: &str) -> Result<TimeSliceID> {
        self.fractions
            .get_id_by_str(time_slice)
            .with_context(|| format!("'{time_slice}' is not a known time slice"))
    }

    /// Iterate over all time slices along with their year fractions
    pub fn iter(&self) -> impl Iterator<Item = (&TimeSliceID, Dimensionless)> {
        self.fractions.iter().map(|(id, fraction)| (id, *fraction))
    }

    /// Iterate over all time slice IDs
    pub fn iter_ids(&self) -> indexmap::map::Keys<'_, TimeSliceID, Dimensionless> {
        self.fractions.keys()
    }

    /// The year fraction for the given time slice
    pub fn fraction(&self, time_slice: &TimeSliceID) -> Option<Dimensionless> {
        self.fractions.get(time_slice).copied()
    }

    /// The number of time slices
    pub fn len(&self) -> usize {
        self.fractions.len()
    }

    /// Whether there are no time slices
    pub fn is_empty(&self) -> bool {
        self.fractions.is_empty()
    }
}
