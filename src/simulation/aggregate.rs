//! Collects agents' decisions into capacity and dispatch results across years.
use crate::technology::TechnologyID;
use crate::time_slice::TimeSliceID;
use crate::units::{Activity, Capacity};
use indexmap::IndexMap;
use itertools::Itertools;
use log::debug;

/// The decisions taken for a single milestone year
#[derive(Debug, Default, Clone, PartialEq)]
pub struct YearResults {
    /// Capacity for each technology: the most chosen in any time slice
    pub capacity: IndexMap<TechnologyID, Capacity>,
    /// Activity for each technology in each time slice
    pub dispatch: IndexMap<(TechnologyID, TimeSliceID), Activity>,
}

impl YearResults {
    /// Record a technology's capacity and activity for a time slice
    pub fn record(
        &mut self,
        technology_id: &TechnologyID,
        time_slice: &TimeSliceID,
        capacity: Capacity,
        activity: Activity,
    ) {
        self.capacity
            .entry(technology_id.clone())
            .and_modify(|existing| *existing = existing.max(capacity))
            .or_insert(capacity);
        self.dispatch
            .insert((technology_id.clone(), time_slice.clone()), activity);
    }
}

/// Results accumulated over every milestone year simulated so far
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CumulativeResults {
    capacity: IndexMap<(TechnologyID, u32), Capacity>,
    dispatch: IndexMap<(TechnologyID, u32, TimeSliceID), Activity>,
}

impl CumulativeResults {
    /// Merge one year's results.
    ///
    /// Capacity is carried forward: a technology's capacity in `year` is never less than the
    /// capacity installed in earlier years.
    pub fn merge(&mut self, year: u32, results: YearResults) {
        for (technology_id, capacity) in results.capacity {
            let capacity = match self.installed_capacity(&technology_id, year) {
                Some(installed) if installed > capacity => {
                    debug!(
                        "Keeping installed capacity {installed} for technology {technology_id} \
                        in year {year}"
                    );
                    installed
                }
                _ => capacity,
            };
            self.capacity.insert((technology_id, year), capacity);
        }

        // Technologies left out of this year's subproblems keep their installed capacity
        let missing: Vec<_> = self
            .capacity
            .keys()
            .filter(|(_, y)| *y < year)
            .map(|(id, _)| id.clone())
            .unique()
            .filter(|id| !self.capacity.contains_key(&(id.clone(), year)))
            .collect();
        for technology_id in missing {
            if let Some(installed) = self.installed_capacity(&technology_id, year) {
                self.capacity.insert((technology_id, year), installed);
            }
        }

        for ((technology_id, time_slice), activity) in results.dispatch {
            self.dispatch
                .insert((technology_id, year, time_slice), activity);
        }
    }

    /// The capacity installed for a technology before `year`, if any
    pub fn installed_capacity(&self, technology_id: &TechnologyID, year: u32) -> Option<Capacity> {
        self.capacity
            .iter()
            .filter(|((id, y), _)| id == technology_id && *y < year)
            .max_by_key(|((_, y), _)| *y)
            .map(|(_, capacity)| *capacity)
    }

    /// Iterate over capacities by technology and year
    pub fn iter_capacity(&self) -> impl Iterator<Item = (&TechnologyID, u32, Capacity)> {
        self.capacity
            .iter()
            .map(|((id, year), capacity)| (id, *year, *capacity))
    }

    /// Iterate over activities by technology, year and time slice
    pub fn iter_dispatch(
        &self,
    ) -> impl Iterator<Item = (&TechnologyID, u32, &TimeSliceID, Activity)> {
        self.dispatch
            .iter()
            .map(|((id, year, time_slice), activity)| (id, *year, time_slice, *activity))
    }
}
