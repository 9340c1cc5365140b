// octree.rs -- spatial index over the solved brushes and point entities
//
// The tree is built to full depth up front: every node is split into eight
// octants until a child's half-extent drops to OCTREE_MIN_HALF_EXTENT or
// below on any axis. Objects are then pushed down into every leaf they
// touch, so an object spanning several leaves is listed in each of them.
// Memory grows as 8^depth: a 65536 unit cube is about 16M leaves.

use tracing::{debug, warn};

use jdlevel_common::q_shared::{Aabb, Vec3};

use crate::brush::{Brush, BrushId};
use crate::map::{Entity, Map};

/// A node becomes a leaf once any half-extent is at or below this.
pub const OCTREE_MIN_HALF_EXTENT: f32 = 128.0;

/// Full trees with more leaves than this are logged before they are built.
pub const OCTREE_WARN_LEAVES: usize = 1 << 21;

/// Depth of the full tree over `bounds`, known before any node is allocated.
/// Only the smallest axis matters, as it is the first to reach the minimum.
pub fn planned_depth(bounds: &Aabb) -> u32 {
    let extents = bounds.half_extents();
    if extents.iter().any(|e| !e.is_finite()) {
        return 1;
    }
    let smallest = extents.iter().fold(f32::INFINITY, |m, &e| m.min(e));
    let mut extent = smallest * 0.5;
    let mut depth = 1;
    while extent > OCTREE_MIN_HALF_EXTENT {
        extent *= 0.5;
        depth += 1;
    }
    depth
}

/// Leaf count of the full tree over `bounds`.
pub fn planned_leaves(bounds: &Aabb) -> usize {
    8usize.saturating_pow(planned_depth(bounds))
}

/// What a leaf refers to. Objects are owned by the map, not the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectId {
    Brush(BrushId),
    Entity(usize),
}

/// Shape used for overlap tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Box(Aabb),
    Point(Vec3),
}

impl Shape {
    fn touches(&self, bounds: &Aabb) -> bool {
        match self {
            Shape::Box(b) => bounds.overlaps(b),
            Shape::Point(p) => bounds.contains_point(p),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Leaf {
        bounds: Aabb,
        objects: Vec<ObjectId>,
    },
    Internal {
        bounds: Aabb,
        children: Box<[Node; 8]>,
    },
}

/// Octant `i` of `bounds`: bit 0 picks the upper X half, bit 1 Y, bit 2 Z.
fn octant(bounds: &Aabb, i: usize) -> Aabb {
    let c = bounds.center();
    let mut mins = bounds.mins;
    let mut maxs = c;
    for axis in 0..3 {
        if i & (1 << axis) != 0 {
            mins[axis] = c[axis];
            maxs[axis] = bounds.maxs[axis];
        }
    }
    Aabb::new(mins, maxs)
}

impl Node {
    fn subdivide(bounds: Aabb) -> Node {
        let children = std::array::from_fn(|i| Node::build(octant(&bounds, i)));
        Node::Internal {
            bounds,
            children: Box::new(children),
        }
    }

    fn build(bounds: Aabb) -> Node {
        let small = bounds
            .half_extents()
            .iter()
            .any(|&e| e.is_nan() || e <= OCTREE_MIN_HALF_EXTENT);
        if small {
            Node::Leaf {
                bounds,
                objects: Vec::new(),
            }
        } else {
            Node::subdivide(bounds)
        }
    }

    pub fn bounds(&self) -> &Aabb {
        match self {
            Node::Leaf { bounds, .. } | Node::Internal { bounds, .. } => bounds,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    /// Add `id` to every leaf `shape` touches. Returns how many leaves took it.
    pub fn insert(&mut self, id: ObjectId, shape: &Shape) -> usize {
        if !shape.touches(self.bounds()) {
            return 0;
        }
        match self {
            Node::Leaf { objects, .. } => {
                if !objects.contains(&id) {
                    objects.push(id);
                }
                1
            }
            Node::Internal { children, .. } => {
                children.iter_mut().map(|c| c.insert(id, shape)).sum()
            }
        }
    }

    fn collect_leaves<'a>(&'a self, shape: Option<&Shape>, out: &mut Vec<&'a Node>) {
        if let Some(s) = shape {
            if !s.touches(self.bounds()) {
                return;
            }
        }
        match self {
            Node::Leaf { .. } => out.push(self),
            Node::Internal { children, .. } => {
                for c in children.iter() {
                    c.collect_leaves(shape, out);
                }
            }
        }
    }

    fn depth(&self) -> usize {
        match self {
            Node::Leaf { .. } => 0,
            Node::Internal { children, .. } => {
                1 + children.iter().map(Node::depth).max().unwrap_or(0)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Octree {
    pub root: Node,
}

impl Octree {
    /// Empty tree over `bounds`. The root is always split once, however
    /// small the bounds are.
    pub fn new(bounds: Aabb) -> Self {
        let leaves = planned_leaves(&bounds);
        if leaves > OCTREE_WARN_LEAVES {
            warn!(
                "octree over {:?}..{:?} needs {} leaves",
                bounds.mins, bounds.maxs, leaves
            );
        }
        Octree {
            root: Node::subdivide(bounds),
        }
    }

    /// Tree over the union of the solved brush bounds, with every solved
    /// brush and every point entity inserted. `None` if the map has no
    /// solved geometry.
    pub fn from_map(map: &Map) -> Option<Self> {
        let bounds = map
            .brushes()
            .filter_map(Brush::bounding_box)
            .reduce(|a, b| a.union(&b))?;

        let mut tree = Octree::new(bounds);
        let mut placed = 0;
        for entity in &map.entities {
            for brush in entity.brushes() {
                if tree.insert_brush(brush) > 0 {
                    placed += 1;
                }
            }
            if tree.insert_entity(entity) > 0 {
                placed += 1;
            }
        }
        debug!(
            leaves = tree.leaf_count(),
            depth = tree.depth(),
            objects = placed,
            "octree built"
        );
        Some(tree)
    }

    /// Insert a solved brush by its bounds. Unsolved brushes are skipped.
    pub fn insert_brush(&mut self, brush: &Brush) -> usize {
        match brush.bounding_box() {
            Some(bounds) => self.root.insert(ObjectId::Brush(brush.id), &Shape::Box(bounds)),
            None => 0,
        }
    }

    /// Insert a point entity: by its explicit bounds when it has them,
    /// otherwise by its origin. Entities with geometry, or without either,
    /// are skipped.
    pub fn insert_entity(&mut self, entity: &Entity) -> usize {
        if !entity.geo.is_empty() {
            return 0;
        }
        let shape = match (entity.bounding_box, entity.origin()) {
            (Some(b), _) => Shape::Box(b),
            (None, Some(o)) => Shape::Point(o),
            (None, None) => return 0,
        };
        self.root.insert(ObjectId::Entity(entity.id), &shape)
    }

    pub fn leaves(&self) -> Vec<&Node> {
        let mut out = Vec::new();
        self.root.collect_leaves(None, &mut out);
        out
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves().len()
    }

    /// Edges from the root to the deepest leaf.
    pub fn depth(&self) -> usize {
        self.root.depth()
    }

    fn query(&self, shape: &Shape) -> Vec<ObjectId> {
        let mut leaves = Vec::new();
        self.root.collect_leaves(Some(shape), &mut leaves);
        let mut ids: Vec<ObjectId> = leaves
            .into_iter()
            .flat_map(|leaf| match leaf {
                Node::Leaf { objects, .. } => objects.as_slice(),
                Node::Internal { .. } => &[],
            })
            .copied()
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Objects stored in any leaf that overlaps `bounds`.
    pub fn query_box(&self, bounds: &Aabb) -> Vec<ObjectId> {
        self.query(&Shape::Box(*bounds))
    }

    /// Objects stored in any leaf that contains `point`.
    pub fn query_point(&self, point: &Vec3) -> Vec<ObjectId> {
        self.query(&Shape::Point(*point))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn cube(half: f32) -> Aabb {
        Aabb::new([-half; 3], [half; 3])
    }

    #[test]
    fn octants_tile_parent() {
        let b = Aabb::new([0.0, 0.0, 0.0], [2.0, 4.0, 8.0]);
        assert_eq!(octant(&b, 0), Aabb::new([0.0; 3], [1.0, 2.0, 4.0]));
        assert_eq!(octant(&b, 7), Aabb::new([1.0, 2.0, 4.0], [2.0, 4.0, 8.0]));
        assert_eq!(octant(&b, 2), Aabb::new([0.0, 2.0, 0.0], [1.0, 4.0, 4.0]));
    }

    #[test]
    fn small_bounds_still_split_once() {
        let tree = Octree::new(cube(8.0));
        assert!(!tree.root.is_leaf());
        assert_eq!(tree.leaf_count(), 8);
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn depth_follows_half_extent() {
        // 1024 -> 512 -> 256 -> 128: leaves at the third level
        let tree = Octree::new(cube(1024.0));
        assert_eq!(tree.depth(), 3);
        assert_eq!(tree.leaf_count(), 512);
        for leaf in tree.leaves() {
            assert_eq!(leaf.bounds().half_extents(), [128.0; 3]);
        }
    }

    #[test]
    fn thin_axis_stops_splitting() {
        let tree = Octree::new(Aabb::new([-2048.0, -2048.0, -64.0], [2048.0, 2048.0, 64.0]));
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn planned_size_matches_built_tree() {
        for bounds in [
            cube(8.0),
            cube(1024.0),
            cube(1500.0),
            Aabb::new([-2048.0, -2048.0, -64.0], [2048.0, 2048.0, 64.0]),
            Aabb::new([0.0; 3], [4096.0, 2048.0, 1024.0]),
        ] {
            let tree = Octree::new(bounds);
            assert_eq!(planned_depth(&bounds) as usize, tree.depth());
            assert_eq!(planned_leaves(&bounds), tree.leaf_count());
        }
        // a 65536 unit cube is planned without being built
        assert_eq!(planned_leaves(&cube(32768.0)), 1 << 24);
        assert!(planned_leaves(&cube(32768.0)) > OCTREE_WARN_LEAVES);
    }

    #[test]
    fn box_lands_in_every_touched_leaf() {
        let mut tree = Octree::new(cube(512.0));
        let id = ObjectId::Entity(3);
        // straddles the centre: one leaf in each octant
        let n = tree.root.insert(id, &Shape::Box(cube(10.0)));
        assert_eq!(n, 8);
        // inserting again does not duplicate
        tree.root.insert(id, &Shape::Box(cube(10.0)));
        for leaf in tree.leaves() {
            if let Node::Leaf { objects, .. } = leaf {
                assert!(objects.len() <= 1);
            }
        }
    }

    #[test]
    fn point_query() {
        let mut tree = Octree::new(cube(1024.0));
        tree.root.insert(ObjectId::Entity(1), &Shape::Point([700.0, 700.0, 700.0]));
        assert_eq!(tree.query_point(&[700.0, 700.0, 700.0]), vec![ObjectId::Entity(1)]);
        assert!(tree.query_point(&[-700.0, 0.0, 0.0]).is_empty());
        assert!(tree.query_box(&cube(100.0)).is_empty());
    }

    #[test]
    fn outside_objects_are_dropped() {
        let mut tree = Octree::new(cube(256.0));
        assert_eq!(tree.root.insert(ObjectId::Entity(0), &Shape::Point([999.0; 3])), 0);
    }
}
