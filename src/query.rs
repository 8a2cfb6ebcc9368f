//! Geometric queries.
//!
//! Every query prunes whole subtrees by testing node cubes first, then, for
//! the query forms that have one, runs a per-object test on the surviving
//! leaves' contents. Results are deduplicated sets. Queries never fail: an
//! empty tree or a shape outside the root yields an empty set.

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashSet},
};

use glam::DVec3;

use crate::{
    bounding::{next_down, next_up, Aabb, Cube, Plane, Ray},
    intersect_with::visit_leaves,
    node::Node,
    pick::{PickArea, Projection, Rect},
    tree::Octree,
    ElementId, Insertable,
};

/// Intersection result.
///
/// Contains `Some(`[ElementId]`)` in case of intersection,
/// [None] otherwise.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct HitResult {
    pub element: Option<ElementId>,
    /// Ray parameter of the hit, in units of the ray's direction length.
    pub distance: f64,
}

/// One of the 6 faces of a cube.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    NegX,
    PosX,
    NegY,
    PosY,
    NegZ,
    PosZ,
}

impl Side {
    /// All sides, in the order [`Octree::neighbours`] reports them.
    pub const ALL: [Side; 6] = [
        Side::NegX,
        Side::PosX,
        Side::NegY,
        Side::PosY,
        Side::NegZ,
        Side::PosZ,
    ];

    pub fn axis(self) -> usize {
        match self {
            Side::NegX | Side::PosX => 0,
            Side::NegY | Side::PosY => 1,
            Side::NegZ | Side::PosZ => 2,
        }
    }

    pub fn is_positive(self) -> bool {
        matches!(self, Side::PosX | Side::PosY | Side::PosZ)
    }

    /// Thin box just outside `cube`'s face, `precision` thick and at least
    /// one ulp, spanning the face without touching edge or corner neighbours.
    pub fn probe(self, cube: &Cube, precision: f64) -> Aabb {
        let axis = self.axis();
        let mut min = cube.min();
        let mut max = cube.max();
        for lateral in (0..3).filter(|a| *a != axis) {
            min[lateral] = next_up(min[lateral]);
            max[lateral] = next_down(max[lateral]);
        }

        if self.is_positive() {
            min[axis] = next_up(cube.max()[axis]);
            max[axis] = (min[axis] + precision).max(next_up(min[axis]));
        } else {
            max[axis] = next_down(cube.min()[axis]);
            min[axis] = (max[axis] - precision).min(next_down(max[axis]));
        }
        Aabb::new(min, max)
    }
}

/// Node waiting in the nearest neighbour frontier, closest first.
struct Candidate<'a> {
    distance: f64,
    node: &'a Node,
}

impl PartialEq for Candidate<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate<'_> {}

impl PartialOrd for Candidate<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        other.distance.total_cmp(&self.distance)
    }
}

impl<T: Insertable> Octree<T> {
    /// Objects referenced from leaves the ray passes through.
    ///
    /// Conservative: objects the ray misses may be returned, objects it
    /// hits within `max_distance` never are missed.
    pub fn line(&self, ray: &Ray) -> HashSet<ElementId> {
        let precision = self.precision;
        self.intersect_with(|cube| ray.interval(&cube.aabb(), precision).is_some())
    }

    /// Objects whose projection meets `rect`, or lies fully inside it when
    /// `only_inside` is set.
    pub fn rect(&self, projection: &Projection, rect: &Rect, only_inside: bool) -> HashSet<ElementId> {
        self.intersect_with_filter(
            |cube| {
                projection
                    .project_aabb(&cube.aabb())
                    .map_or(true, |footprint| footprint.overlaps(rect))
            },
            |_, value| value.hit_test_rect(projection, rect, only_inside),
        )
    }

    /// Objects meeting the pick volume, or lying fully inside it when
    /// `only_inside` is set.
    pub fn pick(&self, area: &PickArea, only_inside: bool) -> HashSet<ElementId> {
        self.intersect_with_filter(
            |cube| area.interferes(&cube.aabb()),
            |_, value| value.hit_test_pick(area, only_inside),
        )
    }

    /// Objects referenced from leaves overlapping `aabb`.
    ///
    /// No per-object test: objects near the box may be returned too.
    pub fn query_box(&self, aabb: &Aabb) -> HashSet<ElementId> {
        self.intersect_with(|cube| !aabb.disjoint(&cube.aabb()))
    }

    /// [`query_box`](Octree::query_box) keeping only the objects accepted
    /// by `filter`.
    pub fn query_box_filtered<P>(&self, aabb: &Aabb, filter: P) -> HashSet<ElementId>
    where
        P: FnMut(ElementId, &T) -> bool,
    {
        self.intersect_with_filter(|cube| !aabb.disjoint(&cube.aabb()), filter)
    }

    /// Objects referenced from the leaf containing `point`.
    pub fn query_point(&self, point: DVec3) -> HashSet<ElementId> {
        self.intersect_with(|cube| cube.contains_point(point))
    }

    /// Objects referenced from leaves the plane passes through.
    pub fn query_plane(&self, plane: &Plane) -> HashSet<ElementId> {
        let precision = self.precision;
        self.intersect_with(|cube| plane.interferes(&cube.aabb(), precision))
    }

    /// Objects referenced from leaves `probe` touches, according to the
    /// probe's own [`hit_test_cube`](Insertable::hit_test_cube).
    pub fn query_near<Q: Insertable + ?Sized>(&self, probe: &Q) -> HashSet<ElementId> {
        let precision = self.precision;
        self.intersect_with(|cube| probe.hit_test_cube(cube, precision))
    }

    /// Nearest object along the ray.
    ///
    /// Candidates come from [`line`](Octree::line). Hits behind the origin,
    /// including objects the origin lies in, and hits past `max_distance`
    /// are ignored. Ties go to the smallest [`ElementId`].
    ///
    /// ```rust
    /// use glam::DVec3;
    /// use spindex::prelude::*;
    ///
    /// let mut tree = Octree::new(0.0);
    /// tree.insert(Aabb::new(DVec3::new(5.0, 0.0, 0.0), DVec3::new(6.0, 1.0, 1.0))).unwrap();
    /// let near = tree
    ///     .insert(Aabb::new(DVec3::new(2.0, 0.0, 0.0), DVec3::new(3.0, 1.0, 1.0)))
    ///     .unwrap();
    ///
    /// let ray = Ray::new(DVec3::new(0.0, 0.5, 0.5), DVec3::X, 10.0);
    /// assert_eq!(tree.ray_cast(&ray), HitResult { element: near, distance: 2.0 });
    /// ```
    pub fn ray_cast(&self, ray: &Ray) -> HitResult {
        let mut hit = HitResult::default();
        for element in self.line(ray) {
            let value = &self.elements[element].value;
            let Some(t) = value.ray_parameter(ray.origin, ray.direction, self.precision) else {
                continue;
            };
            if !(0.0..=ray.max_distance).contains(&t) {
                continue;
            }

            let closer = match hit.element {
                None => true,
                Some(best) => t < hit.distance || (t == hit.distance && element < best),
            };
            if closer {
                hit = HitResult {
                    element: Some(element),
                    distance: t,
                };
            }
        }
        hit
    }

    /// Object whose extent is closest to `point`, within `max_distance`.
    ///
    /// Best-first search: nodes are expanded in order of their cube's
    /// distance to `point` and the search stops once no cube can beat the
    /// best object found. Distance is `0.0` for points inside an extent.
    pub fn nearest(&self, point: DVec3, max_distance: f64) -> Option<(ElementId, f64)> {
        let root = self.root.get()?;
        let mut frontier = BinaryHeap::new();
        frontier.push(Candidate {
            distance: root.cube.aabb().distance_to_point(point),
            node: root,
        });

        let mut best: Option<(ElementId, f64)> = None;
        let mut seen = HashSet::new();
        while let Some(Candidate { distance, node }) = frontier.pop() {
            let bound = best.map_or(max_distance, |(_, d)| d.min(max_distance));
            if distance > bound {
                break;
            }

            match node.children.get() {
                Some(children) => {
                    for child in children.iter() {
                        let distance = child.cube.aabb().distance_to_point(point);
                        if distance <= bound {
                            frontier.push(Candidate {
                                distance,
                                node: child,
                            });
                        }
                    }
                }

                None => {
                    for &element in node.list.read_recursive().iter() {
                        if !seen.insert(element) {
                            continue;
                        }
                        let d = self.elements[element].extent.distance_to_point(point);
                        if d > max_distance {
                            continue;
                        }
                        let closer = match best {
                            None => true,
                            Some((id, b)) => d < b || (d == b && element < id),
                        };
                        if closer {
                            best = Some((element, d));
                        }
                    }
                }
            }
        }
        best
    }

    /// Objects next to each face of `node`.
    ///
    /// Runs a [`query_box`](Octree::query_box) with each [`Side::probe`],
    /// in [`Side::ALL`] order.
    pub fn neighbours(&self, node: &Node) -> [HashSet<ElementId>; 6] {
        Side::ALL.map(|side| self.query_box(&side.probe(&node.cube, self.precision)))
    }
}

impl<T> Octree<T> {
    /// Every object referenced from any leaf.
    pub fn all_objects(&self) -> HashSet<ElementId> {
        self.intersect_with(|_| true)
    }

    /// Number of nodes, internal ones included. `0` while unborn.
    pub fn node_count(&self) -> usize {
        self.nodes().count()
    }

    /// Depth of the deepest node.
    pub fn max_depth(&self) -> u32 {
        self.nodes().map(Node::depth).max().unwrap_or(0)
    }

    /// The leaf containing `point`, [`None`] outside the root.
    pub fn find_node(&self, point: DVec3) -> Option<&Node> {
        let mut node = self.root.get()?;
        if !node.cube.contains_point(point) {
            return None;
        }
        while let Some(children) = node.children.get() {
            node = &children[node.cube.octant_of(point)];
        }
        Some(node)
    }

    /// The node covering exactly `cube`, if the tree has one.
    pub fn find_exact_node(&self, cube: &Cube) -> Option<&Node> {
        let mut node = self.root.get()?;
        loop {
            if node.cube == *cube {
                return Some(node);
            }
            node = node
                .children
                .get()?
                .iter()
                .find(|child| child.cube.contains_cube(cube))?;
        }
    }

    /// Resolves `node`'s parent back-reference.
    pub fn parent(&self, node: &Node) -> Option<&Node> {
        self.find_exact_node(node.parent.as_ref()?)
    }

    /// Leaves touching each face probe of `node`, in [`Side::ALL`] order.
    pub fn neighbour_leaves(&self, node: &Node) -> [Vec<&Node>; 6] {
        Side::ALL.map(|side| {
            let probe = side.probe(&node.cube, self.precision);
            let mut leaves = Vec::new();
            if let Some(root) = self.root.get() {
                visit_leaves(
                    root,
                    &|cube: &Cube| !probe.disjoint(&cube.aabb()),
                    &mut |leaf| leaves.push(leaf),
                );
            }
            leaves
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bounding::sphere_ray_parameter,
        tests::{random_balls, Ball, PRECISION},
    };
    use glam::{DMat4, DVec2};
    use rand::Rng;

    fn populated(count: usize) -> Octree<Ball> {
        let mut tree = Octree::new(PRECISION);
        tree.insert_many(random_balls(count, 100.0, 1.0)).unwrap();
        tree
    }

    #[test]
    fn test_query_box_and_point_completeness() {
        let tree = populated(2000);
        let mut rnd = rand::thread_rng();
        for _ in 0..20 {
            let min = DVec3::new(
                rnd.gen_range(0.0..90.0),
                rnd.gen_range(0.0..90.0),
                rnd.gen_range(0.0..90.0),
            );
            let aabb = Aabb::new(min, min + DVec3::splat(rnd.gen_range(0.0..10.0)));
            let found = tree.query_box(&aabb);
            for (id, ball) in tree.iter() {
                if ball.extent(PRECISION).overlaps(&aabb) {
                    assert!(found.contains(&id));
                }
            }

            let point = aabb.center();
            let found = tree.query_point(point);
            for (id, ball) in tree.iter() {
                if ball.center.distance(point) <= ball.radius {
                    assert!(found.contains(&id));
                }
            }
        }
    }

    #[test]
    fn test_query_point_on_octant_boundary() {
        let tree = populated(1000);
        let root = tree.root().unwrap();
        let center = root.cube().center();
        let found = tree.query_point(center);
        for (id, ball) in tree.iter() {
            if ball.center.distance(center) <= ball.radius {
                assert!(found.contains(&id));
            }
        }
    }

    #[test]
    fn test_query_plane() {
        let tree = populated(2000);
        let plane = Plane::from_point_normal(DVec3::splat(50.0), DVec3::new(1.0, 1.0, 0.0).normalize());
        let found = tree.query_plane(&plane);
        for (id, ball) in tree.iter() {
            if plane.signed_distance(ball.center).abs() <= ball.radius {
                assert!(found.contains(&id));
            }
        }
        assert!(found.len() < 2000);
    }

    #[test]
    fn test_query_near() {
        let tree = populated(2000);
        let probe = Ball::new(DVec3::splat(40.0), 5.0);
        let found = tree.query_near(&probe);
        for (id, ball) in tree.iter() {
            if ball.center.distance(probe.center) <= ball.radius + probe.radius {
                assert!(found.contains(&id));
            }
        }

        let dynamic: &dyn Insertable = &probe;
        assert_eq!(tree.query_near(dynamic), found);
    }

    #[test]
    fn test_rect_orthographic() {
        let tree = populated(2000);
        let rect = Rect::new(DVec2::new(10.0, 10.0), DVec2::new(30.0, 20.0));
        let projection = Projection::IDENTITY;

        let touching = tree.rect(&projection, &rect, false);
        let inside = tree.rect(&projection, &rect, true);
        assert!(inside.is_subset(&touching));

        for (id, ball) in tree.iter() {
            let footprint = Rect::new(
                ball.center.truncate() - DVec2::splat(ball.radius),
                ball.center.truncate() + DVec2::splat(ball.radius),
            );
            assert_eq!(touching.contains(&id), rect.overlaps(&footprint), "{ball:?}");
            assert_eq!(inside.contains(&id), rect.contains_rect(&footprint), "{ball:?}");
        }
    }

    #[test]
    fn test_rect_perspective() {
        let tree = populated(500);
        let eye = DVec3::new(50.0, 50.0, -100.0);
        let view = DMat4::look_at_rh(eye, DVec3::splat(50.0), DVec3::Y);
        let projection = Projection::new(DMat4::perspective_rh(1.0, 1.0, 0.1, 1000.0) * view);
        let rect = Rect::new(DVec2::splat(-0.1), DVec2::splat(0.1));

        let found = tree.rect(&projection, &rect, false);
        for (id, ball) in tree.iter() {
            let center = projection.project(ball.center).unwrap();
            if rect.contains_point(center) {
                assert!(found.contains(&id), "{ball:?}");
            }
        }
        for id in &found {
            let ball = tree.get(*id).unwrap();
            assert!(ball.hit_test_rect(&projection, &rect, false));
        }
        assert!(!found.is_empty());
    }

    #[test]
    fn test_pick() {
        let tree = populated(2000);
        let area = PickArea::from_aabb(&Aabb::new(DVec3::splat(20.0), DVec3::splat(45.0)));
        let touching = tree.pick(&area, false);
        let inside = tree.pick(&area, true);
        assert!(inside.is_subset(&touching));
        for (id, ball) in tree.iter() {
            assert_eq!(touching.contains(&id), ball.hit_test_pick(&area, false));
            assert_eq!(inside.contains(&id), ball.hit_test_pick(&area, true));
        }

        let prism = PickArea::prism(
            [
                DVec3::new(40.0, 40.0, 0.0),
                DVec3::new(60.0, 40.0, 0.0),
                DVec3::new(60.0, 60.0, 0.0),
                DVec3::new(40.0, 60.0, 0.0),
            ],
            DVec3::Z,
        );
        let found = tree.pick(&prism, false);
        for (id, ball) in tree.iter() {
            if ball.hit_test_pick(&prism, false) {
                assert!(found.contains(&id));
            }
        }
    }

    #[test]
    fn test_ray_cast_nearest_hit() {
        let tree = populated(2000);
        let mut rnd = rand::thread_rng();
        for _ in 0..20 {
            let origin = DVec3::new(-10.0, rnd.gen_range(0.0..100.0), rnd.gen_range(0.0..100.0));
            let ray = Ray::new(origin, DVec3::X, 200.0);
            let hit = tree.ray_cast(&ray);

            let expected = tree
                .iter()
                .filter_map(|(id, ball)| {
                    sphere_ray_parameter(ball.center, ball.radius + PRECISION, ray.origin, ray.direction)
                        .filter(|t| (0.0..=ray.max_distance).contains(t))
                        .map(|t| (id, t))
                })
                .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

            match expected {
                Some((id, t)) => {
                    assert_eq!(hit.element, Some(id));
                    assert_eq!(hit.distance, t);
                }
                None => assert_eq!(hit, HitResult::default()),
            }
        }
    }

    #[test]
    fn test_ray_cast_ignores_hits_behind_and_past_max() {
        let mut tree = Octree::new(0.0);
        let behind = tree.insert(Ball::new(DVec3::new(-5.0, 0.0, 0.0), 1.0)).unwrap();
        let ahead = tree.insert(Ball::new(DVec3::new(5.0, 0.0, 0.0), 1.0)).unwrap();

        let ray = Ray::new(DVec3::ZERO, DVec3::X, 100.0);
        assert_eq!(tree.ray_cast(&ray).element, ahead);

        let short = Ray::new(DVec3::ZERO, DVec3::X, 3.0);
        assert_eq!(tree.ray_cast(&short).element, None);

        let back = Ray::new(DVec3::ZERO, DVec3::NEG_X, 100.0);
        assert_eq!(tree.ray_cast(&back).element, behind);
    }

    #[test]
    fn test_nearest() {
        let tree = populated(2000);
        let mut rnd = rand::thread_rng();
        for _ in 0..20 {
            let point = DVec3::new(
                rnd.gen_range(-20.0..120.0),
                rnd.gen_range(-20.0..120.0),
                rnd.gen_range(-20.0..120.0),
            );
            let expected = tree
                .iter()
                .map(|(id, ball)| (id, ball.extent(PRECISION).distance_to_point(point)))
                .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
            assert_eq!(tree.nearest(point, f64::INFINITY), expected);
        }

        assert_eq!(tree.nearest(DVec3::splat(1.0e4), 1.0), None);
    }

    #[test]
    fn test_find_node() {
        let tree = populated(2000);
        let mut rnd = rand::thread_rng();
        let extent = tree.extent().unwrap();
        for _ in 0..100 {
            let point = DVec3::new(
                rnd.gen_range(0.0..100.0),
                rnd.gen_range(0.0..100.0),
                rnd.gen_range(0.0..100.0),
            );
            let leaf = tree.find_node(point).unwrap();
            assert!(leaf.is_leaf());
            assert!(leaf.cube().contains_point(point));

            let owners = tree.leaves().filter(|l| l.cube().contains_point(point)).count();
            assert_eq!(owners, 1);
        }
        assert!(tree.find_node(extent.max()).is_none());
        assert!(tree.find_node(extent.min() - DVec3::ONE).is_none());
    }

    #[test]
    fn test_find_exact_node_and_parent() {
        let tree = populated(2000);
        for node in tree.nodes() {
            let found = tree.find_exact_node(node.cube()).unwrap();
            assert!(std::ptr::eq(found, node));

            match tree.parent(node) {
                Some(parent) => {
                    assert_eq!(parent.depth() + 1, node.depth());
                    let children = parent.children().unwrap();
                    assert!(children.iter().any(|c| std::ptr::eq(c, node)));
                }
                None => assert_eq!(node.depth(), 0),
            }
        }

        let nowhere = Cube::new(DVec3::splat(1.0e6), 1.0);
        assert!(tree.find_exact_node(&nowhere).is_none());
        let misaligned = Cube::new(DVec3::splat(50.123), 3.0);
        assert!(tree.find_exact_node(&misaligned).is_none());
    }

    #[test]
    fn test_neighbours() {
        let cube = Cube::new(DVec3::ZERO, 8.0);
        let mut tree = Octree::from_cube(cube, 0.0);
        // One box per octant forces a split of the root.
        let boxes: Vec<ElementId> = cube
            .octants()
            .iter()
            .map(|octant| {
                let aabb = Aabb::from_center_half_size(octant.center(), DVec3::splat(0.5));
                tree.insert(aabb).unwrap().unwrap()
            })
            .collect();
        assert!(!tree.root().unwrap().is_leaf());

        let children = tree.root().unwrap().children().unwrap();
        let low = &children[0];
        let [neg_x, pos_x, neg_y, pos_y, neg_z, pos_z] = tree.neighbours(low);
        assert!(neg_x.is_empty());
        assert!(neg_y.is_empty());
        assert!(neg_z.is_empty());
        assert_eq!(pos_x, HashSet::from([boxes[0b001]]));
        assert_eq!(pos_y, HashSet::from([boxes[0b010]]));
        assert_eq!(pos_z, HashSet::from([boxes[0b100]]));

        let leaves = tree.neighbour_leaves(low);
        assert!(leaves[0].is_empty());
        assert_eq!(leaves[1].len(), 1);
        assert!(std::ptr::eq(leaves[1][0], &children[1]));
        assert!(std::ptr::eq(leaves[3][0], &children[2]));
        assert!(std::ptr::eq(leaves[5][0], &children[4]));
    }

    #[test]
    fn test_probe_stays_off_the_cube() {
        let cube = Cube::new(DVec3::new(1.0, -2.0, 3.0), 0.75);
        for side in Side::ALL {
            let probe = side.probe(&cube, 0.0);
            assert!(!probe.is_empty());
            assert!(probe.disjoint(&cube.aabb()), "{side:?}");
            let thick = side.probe(&cube, 0.5);
            assert!((thick.size()[side.axis()] - 0.5).abs() < 1e-9);
        }
    }
}
