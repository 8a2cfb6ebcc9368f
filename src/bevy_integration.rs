//! [Bevy](https://docs.rs/bevy/) game engine integrations.
//!
//! Adds the [Bevy](https://docs.rs/bevy/) game engine as a dependency.
//!
//! - [`Aabb3d`] and [`BoundingSphere`] are [`Insertable`].
//! - [`RayCast3d`] converts to a [`Ray`] for [`line`](Octree::line) and
//!   [`ray casting`](Octree::ray_cast).
//! - [`Aabb3d`] converts to and from [`Aabb`] for box queries.
//!
//! ```rust
//! use bevy::math::{bounding::{Aabb3d, RayCast3d}, Dir3A, Vec3A};
//! use spindex::prelude::*;
//!
//! let mut tree = Octree::new(0.0);
//! let id = tree.insert(Aabb3d { min: Vec3A::ZERO, max: Vec3A::ONE }).unwrap();
//!
//! let ray = RayCast3d::new(Vec3A::new(-5.0, 0.5, 0.5), Dir3A::X, 10.0);
//! assert_eq!(tree.ray_cast(&Ray::from(&ray)).element, id);
//! ```
//!
//! Bevy works in `f32`, the tree in `f64`: conversions widen, and
//! narrowing back to [`Aabb3d`] rounds outward.

use bevy::math::{
    bounding::{Aabb3d, BoundingSphere, IntersectsVolume, RayCast3d},
    Vec3A,
};
use glam::DVec3;

use crate::{
    bounding::{sphere_ray_parameter, Aabb, Cube, Ray},
    tree::Octree,
    Insertable,
};

fn widen(v: Vec3A) -> DVec3 {
    DVec3::new(f64::from(v.x), f64::from(v.y), f64::from(v.z))
}

/// Nearest `f32` not above `x`.
fn narrow_down(x: f64) -> f32 {
    let y = x as f32;
    if f64::from(y) <= x {
        return y;
    }
    let bits = if y > 0.0 {
        y.to_bits() - 1
    } else if y < 0.0 {
        y.to_bits() + 1
    } else {
        // Smallest negative subnormal.
        0x8000_0001
    };
    f32::from_bits(bits)
}

/// Nearest `f32` not below `x`.
fn narrow_up(x: f64) -> f32 {
    -narrow_down(-x)
}

impl From<Aabb3d> for Aabb {
    fn from(value: Aabb3d) -> Self {
        Aabb::new(widen(value.min), widen(value.max))
    }
}

impl From<Aabb> for Aabb3d {
    fn from(value: Aabb) -> Self {
        Aabb3d {
            min: Vec3A::new(
                narrow_down(value.min.x),
                narrow_down(value.min.y),
                narrow_down(value.min.z),
            ),
            max: Vec3A::new(
                narrow_up(value.max.x),
                narrow_up(value.max.y),
                narrow_up(value.max.z),
            ),
        }
    }
}

impl From<&RayCast3d> for Ray {
    fn from(value: &RayCast3d) -> Self {
        Ray::new(
            widen(value.origin),
            widen(*value.direction),
            f64::from(value.max),
        )
    }
}

impl Insertable for Aabb3d {
    fn extent(&self, precision: f64) -> Aabb {
        Aabb::from(*self).inflate(precision)
    }

    fn hit_test_cube(&self, cube: &Cube, precision: f64) -> bool {
        self.extent(precision).overlaps(&cube.aabb())
    }
}

impl Insertable for BoundingSphere {
    fn extent(&self, precision: f64) -> Aabb {
        let radius = f64::from(self.radius()) + precision;
        Aabb::from_center_half_size(widen(self.center), DVec3::splat(radius))
    }

    fn hit_test_cube(&self, cube: &Cube, precision: f64) -> bool {
        cube.aabb().distance_to_point(widen(self.center)) <= f64::from(self.radius()) + precision
    }

    fn ray_parameter(&self, origin: DVec3, direction: DVec3, precision: f64) -> Option<f64> {
        sphere_ray_parameter(
            widen(self.center),
            f64::from(self.radius()) + precision,
            origin,
            direction,
        )
    }
}

impl<T> IntersectsVolume<Aabb3d> for Octree<T> {
    /// Check if a [Aabb3d] volume intersects with the [Octree] root node.
    fn intersects(&self, volume: &Aabb3d) -> bool {
        self.extent()
            .is_some_and(|cube| Aabb::from(*volume).overlaps(&cube.aabb()))
    }
}

impl<T> IntersectsVolume<BoundingSphere> for Octree<T> {
    /// Check if a [BoundingSphere] volume intersects with the [Octree] root node.
    fn intersects(&self, volume: &BoundingSphere) -> bool {
        self.extent().is_some_and(|cube| {
            cube.aabb().distance_to_point(widen(volume.center)) <= f64::from(volume.radius())
        })
    }
}

#[cfg(test)]
mod tests {

    use bevy::math::Dir3A;

    use super::*;
    use crate::{query::HitResult, ElementId};

    fn cell(x: f32, y: f32, z: f32) -> Aabb3d {
        Aabb3d {
            min: Vec3A::new(x, y, z),
            max: Vec3A::new(x + 1.0, y + 1.0, z + 1.0),
        }
    }

    #[test]
    fn test_ray_intersection() {
        let mut tree = Octree::new(0.0);
        assert_eq!(tree.insert(cell(3.0, 1.0, 1.0)), Ok(Some(ElementId(0))));
        assert_eq!(tree.insert(cell(1.0, 5.0, 1.0)), Ok(Some(ElementId(1))));

        // hit 2nd
        let ray = RayCast3d::new(Vec3A::new(1.5, 1.5, 1.5), Dir3A::Y, 10.0);
        assert_eq!(
            tree.ray_cast(&Ray::from(&ray)),
            HitResult {
                element: Some(ElementId(1)),
                distance: 3.5
            }
        );

        // miss
        let ray = RayCast3d::new(Vec3A::ZERO, Dir3A::Y, 10.0);
        assert_eq!(tree.ray_cast(&Ray::from(&ray)), HitResult::default());

        // hit 1st
        let ray = RayCast3d::new(Vec3A::new(0.0, 1.5, 1.5), Dir3A::X, 10.0);
        assert_eq!(
            tree.ray_cast(&Ray::from(&ray)),
            HitResult {
                element: Some(ElementId(0)),
                distance: 3.0
            }
        );

        // too short
        let ray = RayCast3d::new(Vec3A::new(40.0, 1.5, 1.5), Dir3A::NEG_X, 10.0);
        assert_eq!(tree.ray_cast(&Ray::from(&ray)), HitResult::default());

        // hit 1st from above
        let ray = RayCast3d::new(Vec3A::new(3.5, 10.0, 1.5), Dir3A::NEG_Y, 10.0);
        assert_eq!(
            tree.ray_cast(&Ray::from(&ray)),
            HitResult {
                element: Some(ElementId(0)),
                distance: 8.0
            }
        );
    }

    #[test]
    fn test_bounding_spheres() {
        let mut tree = Octree::new(0.0);
        let a = tree
            .insert(BoundingSphere::new(Vec3A::ZERO, 1.0))
            .unwrap()
            .unwrap();
        let b = tree
            .insert(BoundingSphere::new(Vec3A::new(10.0, 0.0, 0.0), 2.0))
            .unwrap()
            .unwrap();

        let ray = RayCast3d::new(Vec3A::new(-5.0, 0.0, 0.0), Dir3A::X, 100.0);
        assert_eq!(
            tree.ray_cast(&Ray::from(&ray)),
            HitResult {
                element: Some(a),
                distance: 4.0
            }
        );

        let near = tree.query_near(&BoundingSphere::new(Vec3A::new(10.0, 3.0, 0.0), 1.5));
        assert!(near.contains(&b));
        assert!(!near.contains(&a));

        assert!(tree.intersects(&BoundingSphere::new(Vec3A::new(5.0, 0.0, 0.0), 1.0)));
        assert!(!tree.intersects(&cell(100.0, 100.0, 100.0)));
    }

    #[test]
    fn test_aabb_conversion_rounds_outward() {
        let aabb = Aabb::new(DVec3::splat(0.1), DVec3::splat(0.3));
        let narrowed = Aabb3d::from(aabb);
        assert!(Aabb::from(narrowed).contains(&aabb));
        assert!(narrow_down(-0.1) as f64 <= -0.1);
        assert_eq!(narrow_down(2.0), 2.0);
    }
}
