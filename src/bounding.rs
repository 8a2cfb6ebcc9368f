//! Bounding primitives.
//!
//! [`Aabb`], [`Cube`], [`Ray`], [`Plane`]

use std::fmt::{self, Display};

use glam::DVec3;

use crate::Insertable;

/// Smallest representable `f64` strictly greater than `x`.
///
/// `NaN` and `+inf` are returned unchanged.
pub fn next_up(x: f64) -> f64 {
    if x.is_nan() || x == f64::INFINITY {
        return x;
    }
    if x == 0.0 {
        return f64::from_bits(1);
    }
    let bits = x.to_bits();
    if x > 0.0 {
        f64::from_bits(bits + 1)
    } else {
        f64::from_bits(bits - 1)
    }
}

/// Largest representable `f64` strictly less than `x`.
pub fn next_down(x: f64) -> f64 {
    -next_up(-x)
}

fn next_up_vec(v: DVec3) -> DVec3 {
    DVec3::new(next_up(v.x), next_up(v.y), next_up(v.z))
}

/// Axis Aligned Bounding Box
///
/// Closed box used for object extents and box queries.
/// A box with `min > max` on any axis is empty, see [`Aabb::EMPTY`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Aabb::EMPTY
    }
}

impl Display for Aabb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Aabb(min: {}, max: {})", self.min, self.max)
    }
}

impl Aabb {
    /// The empty box. Neutral element of [`Aabb::union`].
    pub const EMPTY: Aabb = Aabb {
        min: DVec3::splat(f64::INFINITY),
        max: DVec3::splat(f64::NEG_INFINITY),
    };

    /// Creates a new [`Aabb`] object from a min and max
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Aabb { min, max }
    }

    pub fn from_center_half_size(center: DVec3, half_size: DVec3) -> Self {
        Aabb {
            min: center - half_size,
            max: center + half_size,
        }
    }

    /// Smallest box holding every point.
    pub fn from_points(points: impl IntoIterator<Item = DVec3>) -> Self {
        points.into_iter().fold(Aabb::EMPTY, |aabb, p| Aabb {
            min: aabb.min.min(p),
            max: aabb.max.max(p),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    /// Largest coordinate magnitude a stored extent may reach. Roots sized
    /// and doubled around such extents stay finite.
    pub const MAX_COORDINATE: f64 = 1e300;

    /// Checks that every coordinate is finite and within
    /// [`MAX_COORDINATE`](Aabb::MAX_COORDINATE).
    pub fn is_indexable(&self) -> bool {
        self.is_finite()
            && self.min.abs().max(self.max.abs()).max_element() <= Aabb::MAX_COORDINATE
    }

    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Grows the box by `by` on every side. Empty boxes stay empty.
    pub fn inflate(&self, by: f64) -> Aabb {
        if self.is_empty() {
            return *self;
        }
        Aabb {
            min: self.min - DVec3::splat(by),
            max: self.max + DVec3::splat(by),
        }
    }

    /// Bounding volume overlap test.
    ///
    /// Boxes that only touch are not disjoint. An empty box is disjoint
    /// from everything.
    pub fn disjoint(&self, other: &Aabb) -> bool {
        self.min.cmpgt(other.max).any() || self.max.cmplt(other.min).any()
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        !self.disjoint(other)
    }

    pub fn contains_point(&self, point: DVec3) -> bool {
        self.min.cmple(point).all() && point.cmple(self.max).all()
    }

    pub fn contains(&self, other: &Aabb) -> bool {
        self.min.cmple(other.min).all() && other.max.cmple(self.max).all()
    }

    /// Euclidean distance from `point` to the box, `0.0` inside.
    pub fn distance_to_point(&self, point: DVec3) -> f64 {
        (self.min - point)
            .max(point - self.max)
            .max(DVec3::ZERO)
            .length()
    }

    pub fn corners(&self) -> [DVec3; 8] {
        std::array::from_fn(|i| {
            DVec3::new(
                if i & 0b1 != 0 { self.max.x } else { self.min.x },
                if i & 0b10 != 0 { self.max.y } else { self.min.y },
                if i & 0b100 != 0 { self.max.z } else { self.min.z },
            )
        })
    }

    /// Slab test. Returns the parameter interval `[t0, t1]` of
    /// `origin + t * direction` inside the box, clipped to `[t_min, t_max]`.
    pub fn ray_interval(
        &self,
        origin: DVec3,
        direction: DVec3,
        t_min: f64,
        t_max: f64,
    ) -> Option<(f64, f64)> {
        if self.is_empty() {
            return None;
        }
        let (mut t0, mut t1) = (t_min, t_max);
        for axis in 0..3 {
            let (o, d) = (origin[axis], direction[axis]);
            let (lo, hi) = (self.min[axis], self.max[axis]);
            if d == 0.0 {
                if o < lo || o > hi {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / d;
            let (mut a, mut b) = ((lo - o) * inv, (hi - o) * inv);
            if a > b {
                std::mem::swap(&mut a, &mut b);
            }
            t0 = t0.max(a);
            t1 = t1.min(b);
            if t0 > t1 {
                return None;
            }
        }
        Some((t0, t1))
    }
}

/// Any plain box can be indexed directly.
impl Insertable for Aabb {
    fn extent(&self, precision: f64) -> Aabb {
        self.inflate(precision)
    }

    fn hit_test_cube(&self, cube: &Cube, precision: f64) -> bool {
        self.inflate(precision).overlaps(&cube.aabb())
    }
}

/// Cube-shaped region covered by a [`Node`](crate::node::Node).
///
/// Point membership is half-open: `min <= p < max`. [`Cube::new`] rounds the
/// maximum bound up to the next representable value, and [`Cube::octant`]
/// splits at the stored center so that abutting siblings share the exact
/// same boundary value.
#[derive(Debug, Clone, Copy)]
pub struct Cube {
    min: DVec3,
    center: DVec3,
    max: DVec3,
    radius: f64,
}

/// Cubes are equal when their bounds are.
impl PartialEq for Cube {
    fn eq(&self, other: &Self) -> bool {
        self.min == other.min && self.max == other.max
    }
}

impl Display for Cube {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cube(center: {}, radius: {}, min: {}, max: {})",
            self.center, self.radius, self.min, self.max
        )
    }
}

/// Relative offset applied to the center of a freshly sized root.
const ROOT_JITTER: f64 = 1.0e-4;

/// Root margin over the first object's extent.
const ROOT_MARGIN: f64 = 1.1;

impl Cube {
    /// Creates a cube from its center and half-size.
    pub fn new(center: DVec3, radius: f64) -> Self {
        Cube {
            min: center - DVec3::splat(radius),
            center,
            max: next_up_vec(center + DVec3::splat(radius)),
            radius,
        }
    }

    /// Root cube for a first object: 110% of `extent`, center nudged off the
    /// object's own symmetry planes.
    pub fn around(extent: &Aabb, precision: f64) -> Self {
        let mut radius = extent.size().max_element() * 0.5 * ROOT_MARGIN;
        if radius <= 0.0 {
            radius = if precision > 0.0 { precision } else { 1.0 };
        }
        let center = extent.center() + DVec3::new(1.0, 0.7, 0.3) * (radius * ROOT_JITTER);
        Cube::new(center, radius)
    }

    pub fn min(&self) -> DVec3 {
        self.min
    }

    pub fn max(&self) -> DVec3 {
        self.max
    }

    pub fn center(&self) -> DVec3 {
        self.center
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Closed bounding box of the cube.
    pub fn aabb(&self) -> Aabb {
        Aabb::new(self.min, self.max)
    }

    /// Half-open point membership.
    pub fn contains_point(&self, point: DVec3) -> bool {
        self.min.cmple(point).all() && point.cmplt(self.max).all()
    }

    /// Checks if an extent fits strictly inside the cube.
    pub fn contains(&self, extent: &Aabb) -> bool {
        self.min.cmplt(extent.min).all() && extent.max.cmplt(self.max).all()
    }

    /// Checks if `other` lies within the closed bounds of this cube.
    pub fn contains_cube(&self, other: &Cube) -> bool {
        self.min.cmple(other.min).all() && other.max.cmple(self.max).all()
    }

    /// Index of the octant holding `point`.
    ///
    /// Bit 0 selects the +x half, bit 1 the +y half, bit 2 the +z half.
    pub fn octant_of(&self, point: DVec3) -> usize {
        let x = usize::from(point.x >= self.center.x);
        let y = usize::from(point.y >= self.center.y);
        let z = usize::from(point.z >= self.center.z);

        x | y << 1 | z << 2
    }

    /// The `i`-th of the 8 child cubes.
    pub fn octant(&self, i: usize) -> Cube {
        let x_mask = (i & 0b1) != 0;
        let y_mask = (i & 0b10) != 0;
        let z_mask = (i & 0b100) != 0;

        let min = DVec3::new(
            if x_mask { self.center.x } else { self.min.x },
            if y_mask { self.center.y } else { self.min.y },
            if z_mask { self.center.z } else { self.min.z },
        );
        let max = DVec3::new(
            if x_mask { self.max.x } else { self.center.x },
            if y_mask { self.max.y } else { self.center.y },
            if z_mask { self.max.z } else { self.center.z },
        );

        Cube {
            min,
            center: (min + max) * 0.5,
            max,
            radius: self.radius * 0.5,
        }
    }

    #[inline]
    pub fn octants(&self) -> [Cube; 8] {
        std::array::from_fn(|i| self.octant(i))
    }

    /// Whether bisecting still yields 8 non-degenerate children.
    pub fn can_split(&self) -> bool {
        (0..3).all(|axis| {
            let (lo, mid, hi) = (self.min[axis], self.center[axis], self.max[axis]);
            let (a, b) = ((lo + mid) * 0.5, (mid + hi) * 0.5);
            lo < a && a < mid && mid < b && b < hi
        })
    }

    /// Cube of twice the size in which `self` is the octant `octant`.
    pub fn grown(&self, octant: usize) -> Cube {
        let mut min = self.min;
        let mut center = self.center;
        let mut max = self.max;
        for axis in 0..3 {
            let size = self.max[axis] - self.min[axis];
            if octant & (1 << axis) != 0 {
                min[axis] = self.min[axis] - size;
                center[axis] = self.min[axis];
            } else {
                center[axis] = self.max[axis];
                max[axis] = next_up(self.max[axis] + size);
            }
        }
        Cube {
            min,
            center,
            max,
            radius: self.radius * 2.0,
        }
    }

    /// Octant `self` should occupy when growing toward `extent`.
    pub fn growth_octant(&self, extent: &Aabb) -> usize {
        let target = extent.center();
        let x = usize::from(target.x < self.center.x);
        let y = usize::from(target.y < self.center.y);
        let z = usize::from(target.z < self.center.z);

        x | y << 1 | z << 2
    }
}

/// Half line `origin + t * direction` for `t` in `[0, max_distance]`.
///
/// `max_distance` is measured in units of `direction`'s length and may be
/// [`f64::INFINITY`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: DVec3,
    pub direction: DVec3,
    pub max_distance: f64,
}

impl Ray {
    pub fn new(origin: DVec3, direction: DVec3, max_distance: f64) -> Self {
        Ray {
            origin,
            direction,
            max_distance,
        }
    }

    pub fn at(&self, t: f64) -> DVec3 {
        self.origin + self.direction * t
    }

    /// Parameter interval of the ray inside `aabb` grown by `precision`.
    pub fn interval(&self, aabb: &Aabb, precision: f64) -> Option<(f64, f64)> {
        aabb.inflate(precision)
            .ray_interval(self.origin, self.direction, 0.0, self.max_distance)
    }
}

/// Smallest `t` where the line `origin + t * direction` meets the sphere.
pub fn sphere_ray_parameter(
    center: DVec3,
    radius: f64,
    origin: DVec3,
    direction: DVec3,
) -> Option<f64> {
    let a = direction.length_squared();
    if a == 0.0 {
        return None;
    }
    let oc = origin - center;
    let b = oc.dot(direction);
    let c = oc.length_squared() - radius * radius;
    let discriminant = b * b - a * c;
    if discriminant < 0.0 {
        return None;
    }
    Some((-b - discriminant.sqrt()) / a)
}

/// Plane `normal · p + d = 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: DVec3,
    pub d: f64,
}

impl Plane {
    pub fn new(normal: DVec3, d: f64) -> Self {
        Plane { normal, d }
    }

    pub fn from_point_normal(point: DVec3, normal: DVec3) -> Self {
        Plane {
            normal,
            d: -normal.dot(point),
        }
    }

    pub fn signed_distance(&self, point: DVec3) -> f64 {
        self.normal.dot(point) + self.d
    }

    /// Range of signed distances taken over the box.
    pub fn distance_range(&self, aabb: &Aabb) -> (f64, f64) {
        let center = self.signed_distance(aabb.center());
        let reach = (aabb.size() * 0.5).dot(self.normal.abs());
        (center - reach, center + reach)
    }

    /// Checks if the plane passes through the box, up to `precision`.
    pub fn interferes(&self, aabb: &Aabb, precision: f64) -> bool {
        if aabb.is_empty() {
            return false;
        }
        let (lo, hi) = self.distance_range(aabb);
        lo <= precision && hi >= -precision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_up() {
        assert!(next_up(1.0) > 1.0);
        assert!(next_up(-1.0) > -1.0);
        assert!(next_up(0.0) > 0.0);
        assert!(next_up(-0.0) > 0.0);
        assert!(next_down(1.0) < 1.0);
        assert_eq!(next_up(f64::INFINITY), f64::INFINITY);
        assert_eq!(next_down(next_up(3.5)), 3.5);
    }

    #[test]
    fn test_cube_max_rounded_up() {
        let cube = Cube::new(DVec3::splat(0.1), 0.2);
        assert!(cube.max().x > 0.1 + 0.2);
        assert!(cube.contains_point(DVec3::splat(0.1 + 0.2)));
        assert!(!cube.contains_point(cube.max()));
    }

    #[test]
    fn test_octants_tile_parent() {
        let cube = Cube::new(DVec3::new(0.3, -7.1, 1e-3), 0.7);
        let children = cube.octants();

        for (i, child) in children.iter().enumerate() {
            assert_eq!(child.radius(), cube.radius() * 0.5);
            for axis in 0..3 {
                let bit = 1 << axis;
                if i & bit == 0 {
                    assert_eq!(child.min()[axis], cube.min()[axis]);
                    assert_eq!(child.max()[axis], children[i | bit].min()[axis]);
                } else {
                    assert_eq!(child.max()[axis], cube.max()[axis]);
                }
            }
        }

        // Every probe lands in exactly one child.
        for p in [
            cube.center(),
            cube.min(),
            DVec3::new(0.3, -7.1, 0.5),
            DVec3::new(next_down(cube.max().x), cube.center().y, cube.min().z),
        ] {
            let owners = children.iter().filter(|c| c.contains_point(p)).count();
            assert_eq!(owners, 1, "{p}");
            assert!(children[cube.octant_of(p)].contains_point(p));
        }
    }

    #[test]
    fn test_grown_keeps_old_cube_as_octant() {
        let cube = Cube::new(DVec3::new(1.0, 2.0, 3.0), 0.5);
        for octant in 0..8 {
            let parent = cube.grown(octant);
            assert_eq!(parent.octant(octant), cube);
            assert_eq!(parent.radius(), 1.0);
            assert!(parent.contains_cube(&cube));
        }
    }

    #[test]
    fn test_growth_octant_points_toward_extent() {
        let cube = Cube::new(DVec3::ZERO, 1.0);
        let far = Aabb::from_center_half_size(DVec3::new(-10.0, 10.0, -10.0), DVec3::ONE);
        let octant = cube.growth_octant(&far);
        assert_eq!(octant, 0b101);
        let parent = cube.grown(octant);
        assert!(parent.min().x < cube.min().x);
        assert!(parent.max().y > cube.max().y);
        assert!(parent.min().z < cube.min().z);
    }

    #[test]
    fn test_around() {
        let extent = Aabb::from_center_half_size(DVec3::splat(5.0), DVec3::new(1.0, 2.0, 0.5));
        let cube = Cube::around(&extent, 0.01);
        assert!(cube.contains(&extent));
        assert!((cube.radius() - 2.2).abs() < 1e-12);
        assert_ne!(cube.center(), extent.center());

        let point = Aabb::new(DVec3::ONE, DVec3::ONE);
        let cube = Cube::around(&point, 0.0);
        assert!(cube.contains(&point));
        assert!(cube.radius() > 0.0);
    }

    #[test]
    fn test_indexable_range() {
        let huge = Aabb::new(DVec3::splat(-1e308), DVec3::splat(1e308));
        assert!(huge.is_finite());
        assert!(!huge.size().is_finite());
        assert!(!huge.is_indexable());

        let nan = Aabb::new(DVec3::new(f64::NAN, 0.0, 0.0), DVec3::ONE);
        assert!(!nan.is_indexable());

        let wide = Aabb::new(
            DVec3::splat(-Aabb::MAX_COORDINATE),
            DVec3::splat(Aabb::MAX_COORDINATE),
        );
        assert!(wide.is_indexable());
        let cube = Cube::around(&wide, 0.0);
        assert!(cube.min().is_finite() && cube.max().is_finite());
        assert!(cube.octant(0).center().is_finite());
    }

    #[test]
    fn test_aabb_disjoint() {
        let a = Aabb::new(DVec3::ZERO, DVec3::ONE);
        let touching = Aabb::new(DVec3::new(1.0, 0.0, 0.0), DVec3::new(2.0, 1.0, 1.0));
        let apart = Aabb::new(DVec3::new(1.5, 0.0, 0.0), DVec3::new(2.0, 1.0, 1.0));
        assert!(!a.disjoint(&touching));
        assert!(a.disjoint(&apart));
        assert!(a.disjoint(&Aabb::EMPTY));
        assert!(Aabb::EMPTY.is_empty());
        assert!(!a.is_empty());
    }

    #[test]
    fn test_ray_interval() {
        let aabb = Aabb::new(DVec3::splat(1.0), DVec3::splat(2.0));
        let ray = Ray::new(DVec3::new(0.0, 1.5, 1.5), DVec3::X, 10.0);
        assert_eq!(ray.interval(&aabb, 0.0), Some((1.0, 2.0)));

        let short = Ray::new(DVec3::new(0.0, 1.5, 1.5), DVec3::X, 0.5);
        assert_eq!(short.interval(&aabb, 0.0), None);

        let parallel = Ray::new(DVec3::new(0.0, 3.0, 1.5), DVec3::X, 10.0);
        assert_eq!(parallel.interval(&aabb, 0.0), None);
        assert!(parallel.interval(&aabb, 1.0).is_some());
    }

    #[test]
    fn test_plane_interferes() {
        let aabb = Aabb::new(DVec3::ZERO, DVec3::ONE);
        let through = Plane::from_point_normal(DVec3::splat(0.5), DVec3::Z);
        let above = Plane::from_point_normal(DVec3::new(0.0, 0.0, 1.5), DVec3::Z);
        assert!(through.interferes(&aabb, 0.0));
        assert!(!above.interferes(&aabb, 0.0));
        assert!(above.interferes(&aabb, 0.5));
    }

    #[test]
    fn test_distance_to_point() {
        let aabb = Aabb::new(DVec3::ZERO, DVec3::ONE);
        assert_eq!(aabb.distance_to_point(DVec3::splat(0.5)), 0.0);
        assert_eq!(aabb.distance_to_point(DVec3::new(3.0, 0.5, 0.5)), 2.0);
    }

    #[test]
    fn test_sphere_ray_parameter() {
        let t = sphere_ray_parameter(DVec3::new(5.0, 0.0, 0.0), 1.0, DVec3::ZERO, DVec3::X);
        assert_eq!(t, Some(4.0));
        let miss = sphere_ray_parameter(DVec3::new(5.0, 3.0, 0.0), 1.0, DVec3::ZERO, DVec3::X);
        assert_eq!(miss, None);
    }
}
