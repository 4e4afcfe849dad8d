//! Arena-backed quad-tree.
//!
//! Nothing in here locks. `SpatialIndex` owns the tree behind a single
//! `RwLock` and every method assumes the caller already holds the right
//! guard. Child slots are filled with a plain conditional create because the
//! writer has the whole tree to itself; if that lock is ever split per node,
//! child creation needs its own synchronisation.

use crate::geometry::Geometry;
use quadcache_types::envelope::{Envelope, Quadrant};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::{SmallVec, smallvec};
use std::hash::Hash;

/// Position of a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

const ROOT: NodeId = NodeId(0);

/// Stored geometry plus its envelope, cached for the cheap pre-check.
#[derive(Debug, Clone)]
struct Item<G> {
    envelope: Envelope,
    geometry: G,
}

#[derive(Debug)]
struct QuadNode<K, G> {
    envelope: Envelope,
    /// Levels this node may still grow below itself.
    depth_budget: u8,
    children: [Option<NodeId>; 4],
    items: FxHashMap<K, Item<G>>,
}

impl<K, G> QuadNode<K, G> {
    fn new(envelope: Envelope, depth_budget: u8) -> Self {
        Self {
            envelope,
            depth_budget,
            children: [None; 4],
            items: FxHashMap::default(),
        }
    }
}

/// Shape statistics of the tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Indexed keys.
    pub entries: usize,
    /// Allocated nodes, root included.
    pub nodes: usize,
    /// Nodes holding at least one item.
    pub occupied_nodes: usize,
    /// Deepest level that holds an item (root is level 0).
    pub max_depth_reached: u8,
}

#[derive(Debug)]
pub(crate) struct QuadTree<K, G> {
    nodes: Vec<QuadNode<K, G>>,
    /// Owning node of every key, for removal without a descent.
    reverse: FxHashMap<K, NodeId>,
    max_depth: u8,
}

impl<K, G> QuadTree<K, G>
where
    K: Eq + Hash + Clone,
    G: Geometry,
{
    pub(crate) fn new(bounds: Envelope, max_depth: u8) -> Self {
        Self {
            nodes: vec![QuadNode::new(bounds, max_depth)],
            reverse: FxHashMap::default(),
            max_depth,
        }
    }

    pub(crate) fn bounds(&self) -> Envelope {
        self.nodes[ROOT.0].envelope
    }

    pub(crate) fn len(&self) -> usize {
        self.reverse.len()
    }

    pub(crate) fn contains_key(&self, key: &K) -> bool {
        self.reverse.contains_key(key)
    }

    pub(crate) fn keys(&self) -> FxHashSet<K> {
        self.reverse.keys().cloned().collect()
    }

    pub(crate) fn get(&self, key: &K) -> Option<&G> {
        let node = self.reverse.get(key)?;
        self.nodes[node.0].items.get(key).map(|item| &item.geometry)
    }

    /// Store `geometry` under `key` in the deepest node whose envelope fully
    /// contains it. The key must not be present and the geometry envelope
    /// must be finite and inside the root bounds.
    pub(crate) fn insert(&mut self, key: K, geometry: G) -> NodeId {
        let envelope = geometry.envelope();
        debug_assert!(!self.reverse.contains_key(&key));
        debug_assert!(self.bounds().contains(&envelope));

        let mut current = ROOT;
        'descend: while self.nodes[current.0].depth_budget > 0 {
            let parent_envelope = self.nodes[current.0].envelope;
            for quadrant in Quadrant::DESCENT_ORDER {
                if parent_envelope.quadrant(quadrant).contains(&envelope) {
                    current = self.child_or_create(current, quadrant);
                    continue 'descend;
                }
            }
            break;
        }

        self.nodes[current.0]
            .items
            .insert(key.clone(), Item { envelope, geometry });
        self.reverse.insert(key, current);
        current
    }

    fn child_or_create(&mut self, parent: NodeId, quadrant: Quadrant) -> NodeId {
        if let Some(child) = self.nodes[parent.0].children[quadrant.index()] {
            return child;
        }

        let node = &self.nodes[parent.0];
        let child_node = QuadNode::new(node.envelope.quadrant(quadrant), node.depth_budget - 1);
        let child = NodeId(self.nodes.len());
        self.nodes.push(child_node);
        self.nodes[parent.0].children[quadrant.index()] = Some(child);
        child
    }

    /// Drop `key` from its owning node and from the reverse map together.
    pub(crate) fn remove(&mut self, key: &K) -> Option<G> {
        let node = self.reverse.remove(key)?;
        self.nodes[node.0]
            .items
            .remove(key)
            .map(|item| item.geometry)
    }

    /// Keys whose geometry truly intersects `region`.
    pub(crate) fn query(&self, region: &G) -> FxHashSet<K> {
        let query_envelope = region.envelope();
        let mut results = FxHashSet::default();
        let mut stack: SmallVec<[NodeId; 64]> = smallvec![ROOT];

        while let Some(id) = stack.pop() {
            let node = &self.nodes[id.0];
            if !node.envelope.intersects(&query_envelope) {
                continue;
            }

            for (key, item) in &node.items {
                if item.envelope.intersects(&query_envelope) && item.geometry.intersects(region) {
                    results.insert(key.clone());
                }
            }

            stack.extend(node.children.iter().flatten().copied());
        }

        results
    }

    /// Discard every node and rebuild an empty root over the same bounds.
    pub(crate) fn clear(&mut self) {
        let bounds = self.bounds();
        self.nodes.clear();
        self.nodes.push(QuadNode::new(bounds, self.max_depth));
        self.reverse.clear();
    }

    pub(crate) fn stats(&self) -> IndexStats {
        let occupied = self.nodes.iter().filter(|node| !node.items.is_empty());
        let (occupied_nodes, max_depth_reached) = occupied.fold((0, 0), |(count, deepest), node| {
            (count + 1, deepest.max(self.max_depth - node.depth_budget))
        });

        IndexStats {
            entries: self.reverse.len(),
            nodes: self.nodes.len(),
            occupied_nodes,
            max_depth_reached,
        }
    }

    /// Reverse map and item maps agree: every key lives in exactly the node
    /// the reverse map names, and nowhere else.
    #[cfg(test)]
    pub(crate) fn is_consistent(&self) -> bool {
        let stored: usize = self.nodes.iter().map(|node| node.items.len()).sum();
        stored == self.reverse.len()
            && self
                .reverse
                .iter()
                .all(|(key, node)| self.nodes[node.0].items.contains_key(key))
    }

    #[cfg(test)]
    pub(crate) fn node_of(&self, key: &K) -> Option<(Envelope, u8)> {
        let node = &self.nodes[self.reverse.get(key)?.0];
        Some((node.envelope, node.depth_budget))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: f64, y: f64) -> Envelope {
        Envelope::from_point(x, y)
    }

    #[test]
    fn test_point_descends_to_leaf() {
        let mut tree: QuadTree<&str, Envelope> = QuadTree::new(Envelope::world(), 4);
        tree.insert("a", point(10.0, 10.0));

        let (envelope, budget) = tree.node_of(&"a").unwrap();
        assert_eq!(budget, 0);
        assert!(envelope.contains_point(10.0, 10.0));
        assert_eq!(envelope.width(), 360.0 / 16.0);
        assert_eq!(tree.stats().max_depth_reached, 4);
        assert!(tree.is_consistent());
    }

    #[test]
    fn test_straddling_shape_stays_high() {
        let mut tree: QuadTree<&str, Envelope> = QuadTree::new(Envelope::world(), 8);
        // Crosses the prime meridian, so no root child contains it.
        tree.insert("wide", Envelope::new(-1.0, 1.0, 10.0, 11.0));

        let (envelope, _) = tree.node_of(&"wide").unwrap();
        assert_eq!(envelope, Envelope::world());
        assert_eq!(tree.stats().nodes, 1);
    }

    #[test]
    fn test_split_line_tie_break_is_stable() {
        let mut tree: QuadTree<u32, Envelope> = QuadTree::new(Envelope::world(), 3);
        tree.insert(1, point(0.0, 0.0));
        tree.insert(2, point(0.0, 0.0));

        // The origin touches all four root quadrants; south-east is tried first.
        let first = tree.node_of(&1).unwrap();
        assert_eq!(first, tree.node_of(&2).unwrap());
        assert!(Envelope::world().quadrant(Quadrant::SouthEast).contains(&first.0));
    }

    #[test]
    fn test_only_needed_children_are_created() {
        let mut tree: QuadTree<u32, Envelope> = QuadTree::new(Envelope::world(), 2);
        tree.insert(1, point(100.0, -45.0));
        // Root plus one node per level on the way down.
        assert_eq!(tree.stats().nodes, 3);
    }

    #[test]
    fn test_remove_keeps_maps_in_step() {
        let mut tree: QuadTree<u32, Envelope> = QuadTree::new(Envelope::world(), 6);
        for i in 0..20 {
            tree.insert(i, point(i as f64, i as f64 / 2.0));
        }
        assert_eq!(tree.remove(&7), Some(point(7.0, 3.5)));
        assert_eq!(tree.remove(&7), None);
        assert!(!tree.contains_key(&7));
        assert_eq!(tree.len(), 19);
        assert!(tree.is_consistent());
    }

    #[test]
    fn test_query_prunes_and_filters() {
        let mut tree: QuadTree<u32, Envelope> = QuadTree::new(Envelope::world(), 10);
        tree.insert(1, point(10.0, 10.0));
        tree.insert(2, point(-120.0, 45.0));
        tree.insert(3, Envelope::new(-5.0, 5.0, -5.0, 5.0));

        let hits = tree.query(&Envelope::new(0.0, 20.0, 0.0, 20.0));
        assert_eq!(hits, [1, 3].into_iter().collect());

        assert!(tree.query(&Envelope::new(30.0, 40.0, 30.0, 40.0)).is_empty());
    }

    #[test]
    fn test_clear_resets_arena() {
        let mut tree: QuadTree<u32, Envelope> = QuadTree::new(Envelope::world(), 5);
        for i in 0..10 {
            tree.insert(i, point(i as f64 * 10.0, 0.5));
        }
        tree.clear();

        assert_eq!(tree.len(), 0);
        assert_eq!(tree.stats(), IndexStats { nodes: 1, ..Default::default() });
        assert!(tree.query(&Envelope::world()).is_empty());
        assert_eq!(tree.bounds(), Envelope::world());
    }
}
