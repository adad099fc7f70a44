//! The transmission topology connecting regions.
//!
//! Links are directed. Every link has a reverse counterpart with the same nominal capacity, so the
//! flow on one direction can always be expressed as the negated flow on the other.
use crate::region::RegionID;
use crate::units::Capacity;
use anyhow::{Result, ensure};
use petgraph::Directed;
use petgraph::graph::{Graph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::HashMap;

/// A directed, capacity-bounded connection between two regions
#[derive(PartialEq, Debug, Clone)]
pub struct TransmissionLink {
    /// Region exporting along the link
    pub origin: RegionID,
    /// Region importing along the link
    pub destination: RegionID,
    /// Nominal thermal capacity
    pub capacity: Capacity,
}

/// Graph of transmission links between regions
#[derive(Default, Debug)]
pub struct Topology {
    graph: Graph<RegionID, Capacity, Directed>,
    nodes: HashMap<RegionID, NodeIndex>,
}

impl Topology {
    /// Create a topology from a set of links.
    ///
    /// If only one direction of a link is given, the reverse link is added with the same capacity.
    /// A link given in both directions must have the same capacity each way.
    pub fn from_links<I>(links: I) -> Result<Self>
    where
        I: IntoIterator<Item = TransmissionLink>,
    {
        let mut topology = Self::default();
        let mut capacities: HashMap<(RegionID, RegionID), Capacity> = HashMap::new();
        for link in links {
            ensure!(
                link.origin != link.destination,
                "Link from {} to itself is not allowed",
                link.origin
            );
            ensure!(
                link.capacity.is_finite() && link.capacity >= Capacity(0.0),
                "Capacity for link {} -> {} must be a finite, non-negative number",
                link.origin,
                link.destination
            );

            let key = (link.origin.clone(), link.destination.clone());
            ensure!(
                capacities.insert(key, link.capacity).is_none(),
                "Duplicate link {} -> {}",
                link.origin,
                link.destination
            );
        }

        for ((origin, destination), capacity) in &capacities {
            if let Some(reverse) = capacities.get(&(destination.clone(), origin.clone())) {
                ensure!(
                    reverse == capacity,
                    "Links {origin} -> {destination} and {destination} -> {origin} have \
                    different capacities"
                );
            }
        }

        // Sort so that the graph doesn't depend on hash map ordering
        let mut pairs: Vec<_> = capacities.into_iter().collect();
        pairs.sort_by(|(a, _), (b, _)| a.cmp(b));
        for ((origin, destination), capacity) in pairs {
            topology.add_edge_if_missing(&origin, &destination, capacity);
            topology.add_edge_if_missing(&destination, &origin, capacity);
        }

        Ok(topology)
    }

    /// Get the node for a region, adding it if needed
    fn node(&mut self, region_id: &RegionID) -> NodeIndex {
        if let Some(node) = self.nodes.get(region_id) {
            return *node;
        }

        let node = self.graph.add_node(region_id.clone());
        self.nodes.insert(region_id.clone(), node);
        node
    }

    fn add_edge_if_missing(
        &mut self,
        origin: &RegionID,
        destination: &RegionID,
        capacity: Capacity,
    ) {
        let a = self.node(origin);
        let b = self.node(destination);
        if self.graph.find_edge(a, b).is_none() {
            self.graph.add_edge(a, b, capacity);
        }
    }

    /// Whether there are no links
    pub fn is_empty(&self) -> bool {
        self.graph.edge_count() == 0
    }

    /// Iterate over the regions connected by at least one link
    pub fn iter_regions(&self) -> impl Iterator<Item = &RegionID> {
        self.graph.node_weights()
    }

    /// Iterate over all directed links
    pub fn iter_links(&self) -> impl Iterator<Item = TransmissionLink> + '_ {
        self.graph.edge_references().map(|edge| TransmissionLink {
            origin: self.graph[edge.source()].clone(),
            destination: self.graph[edge.target()].clone(),
            capacity: *edge.weight(),
        })
    }

    /// Iterate over each pair of opposing links once, as (forward, backward)
    pub fn iter_link_pairs(
        &self,
    ) -> impl Iterator<Item = (TransmissionLink, TransmissionLink)> + '_ {
        self.iter_links()
            .filter(|link| link.origin < link.destination)
            .map(|forward| {
                let backward = TransmissionLink {
                    origin: forward.destination.clone(),
                    destination: forward.origin.clone(),
                    capacity: forward.capacity,
                };
                (forward, backward)
            })
    }

    /// Iterate over the links with the given region as the destination
    pub fn iter_incoming<'a>(
        &'a self,
        region_id: &RegionID,
    ) -> Box<dyn Iterator<Item = TransmissionLink> + 'a> {
        let Some(node) = self.nodes.get(region_id) else {
            return Box::new(std::iter::empty());
        };

        Box::new(
            self.graph
                .edges_directed(*node, petgraph::Direction::Incoming)
                .map(|edge| TransmissionLink {
                    origin: self.graph[edge.source()].clone(),
                    destination: self.graph[edge.target()].clone(),
                    capacity: *edge.weight(),
                }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::assert_error;
    use itertools::Itertools;

    fn link(origin: &str, destination: &str, capacity: f64) -> TransmissionLink {
        TransmissionLink {
            origin: origin.into(),
            destination: destination.into(),
            capacity: Capacity(capacity),
        }
    }

    #[test]
    fn test_from_links_adds_reverse() {
        let topology = Topology::from_links([link("A", "B", 20.0)]).unwrap();
        let links = topology
            .iter_links()
            .sorted_by(|a, b| a.origin.cmp(&b.origin))
            .collect_vec();
        assert_eq!(links, [link("A", "B", 20.0), link("B", "A", 20.0)]);

        let pairs = topology.iter_link_pairs().collect_vec();
        assert_eq!(pairs, [(link("A", "B", 20.0), link("B", "A", 20.0))]);

        let incoming = topology.iter_incoming(&"A".into()).collect_vec();
        assert_eq!(incoming, [link("B", "A", 20.0)]);
        assert_eq!(topology.iter_incoming(&"C".into()).count(), 0);
    }

    #[test]
    fn test_from_links_both_directions() {
        let topology =
            Topology::from_links([link("A", "B", 20.0), link("B", "A", 20.0)]).unwrap();
        assert_eq!(topology.iter_links().count(), 2);
    }

    #[test]
    fn test_from_links_mismatched_capacities() {
        assert!(Topology::from_links([link("A", "B", 20.0), link("B", "A", 10.0)]).is_err());
    }

    #[test]
    fn test_from_links_self_link() {
        assert_error!(
            Topology::from_links([link("A", "A", 20.0)]),
            "Link from A to itself is not allowed"
        );
    }

    #[test]
    fn test_empty() {
        assert!(Topology::from_links([]).unwrap().is_empty());
    }
}
