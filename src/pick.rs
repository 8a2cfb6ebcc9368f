//! Selection volumes: projected rectangles and 3D pick areas.

use glam::{DMat4, DVec2, DVec3};
use smallvec::SmallVec;

use crate::bounding::{Aabb, Plane};

/// World to clip space transform used by rectangle picks.
///
/// Projected 2D coordinates are `clip.xy / clip.w`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection(pub DMat4);

impl Default for Projection {
    fn default() -> Self {
        Projection::IDENTITY
    }
}

impl Projection {
    /// Orthographic projection onto the XY plane.
    pub const IDENTITY: Projection = Projection(DMat4::IDENTITY);

    pub fn new(matrix: DMat4) -> Self {
        Projection(matrix)
    }

    /// Returns [`None`] for points on or behind the eye plane.
    pub fn project(&self, point: DVec3) -> Option<DVec2> {
        let clip = self.0 * point.extend(1.0);
        if clip.w <= f64::EPSILON {
            return None;
        }
        Some(DVec2::new(clip.x / clip.w, clip.y / clip.w))
    }

    /// 2D bounds of the projected box.
    ///
    /// [`None`] when any corner is behind the eye, in which case the footprint
    /// is unbounded and callers must assume interference.
    pub fn project_aabb(&self, aabb: &Aabb) -> Option<Rect> {
        if aabb.is_empty() {
            return Some(Rect::EMPTY);
        }
        let mut rect = Rect::EMPTY;
        for corner in aabb.corners() {
            let p = self.project(corner)?;
            rect.min = rect.min.min(p);
            rect.max = rect.max.max(p);
        }
        Some(rect)
    }
}

/// Closed rectangle in projected 2D space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min: DVec2,
    pub max: DVec2,
}

impl Rect {
    pub const EMPTY: Rect = Rect {
        min: DVec2::splat(f64::INFINITY),
        max: DVec2::splat(f64::NEG_INFINITY),
    };

    /// Rectangle spanned by two opposite corners, in any order.
    pub fn new(a: DVec2, b: DVec2) -> Self {
        Rect {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    pub fn overlaps(&self, other: &Rect) -> bool {
        !(self.min.cmpgt(other.max).any() || self.max.cmplt(other.min).any())
    }

    pub fn contains_point(&self, point: DVec2) -> bool {
        self.min.cmple(point).all() && point.cmple(self.max).all()
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        !other.is_empty() && self.min.cmple(other.min).all() && other.max.cmple(self.max).all()
    }
}

/// Convex pick volume bounded by inward facing planes.
///
/// A perspective pick is a [`frustum`](PickArea::frustum), a parallel pick an
/// infinite [`prism`](PickArea::prism).
#[derive(Debug, Clone, PartialEq)]
pub struct PickArea {
    planes: SmallVec<[Plane; 6]>,
}

impl PickArea {
    /// Points with a non-negative signed distance to every plane are inside.
    pub fn from_planes(planes: impl IntoIterator<Item = Plane>) -> Self {
        PickArea {
            planes: planes.into_iter().collect(),
        }
    }

    pub fn from_aabb(aabb: &Aabb) -> Self {
        let mut planes = SmallVec::new();
        for axis in [DVec3::X, DVec3::Y, DVec3::Z] {
            planes.push(Plane::from_point_normal(aabb.min, axis));
            planes.push(Plane::from_point_normal(aabb.max, -axis));
        }
        PickArea { planes }
    }

    /// Perspective pick from `eye` through four corner directions given in
    /// winding order. Unbounded in depth, nothing behind the eye.
    pub fn frustum(eye: DVec3, corners: [DVec3; 4]) -> Self {
        let axis = corners.iter().copied().sum::<DVec3>();
        let mut planes = SmallVec::new();
        for i in 0..4 {
            let normal = oriented(corners[i].cross(corners[(i + 1) % 4]), axis);
            planes.push(Plane::from_point_normal(eye, normal));
        }
        planes.push(Plane::from_point_normal(eye, axis.normalize_or_zero()));
        PickArea { planes }
    }

    /// Parallel pick: the infinite prism swept by a quad along `direction`.
    pub fn prism(corners: [DVec3; 4], direction: DVec3) -> Self {
        let centroid = corners.iter().copied().sum::<DVec3>() * 0.25;
        let mut planes = SmallVec::new();
        for i in 0..4 {
            let edge = corners[(i + 1) % 4] - corners[i];
            let normal = oriented(edge.cross(direction), centroid - corners[i]);
            planes.push(Plane::from_point_normal(corners[i], normal));
        }
        PickArea { planes }
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    pub fn contains_point(&self, point: DVec3) -> bool {
        self.planes.iter().all(|p| p.signed_distance(point) >= 0.0)
    }

    /// Conservative test: `false` only when the box is fully outside a plane.
    pub fn interferes(&self, aabb: &Aabb) -> bool {
        if aabb.is_empty() {
            return false;
        }
        self.planes.iter().all(|p| p.distance_range(aabb).1 >= 0.0)
    }

    pub fn contains_aabb(&self, aabb: &Aabb) -> bool {
        if aabb.is_empty() {
            return false;
        }
        self.planes.iter().all(|p| p.distance_range(aabb).0 >= 0.0)
    }
}

/// Unit `normal` flipped to face `toward`.
fn oriented(normal: DVec3, toward: DVec3) -> DVec3 {
    let normal = normal.normalize_or_zero();
    if normal.dot(toward) < 0.0 {
        -normal
    } else {
        normal
    }
}
