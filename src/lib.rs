//! Adaptive, self-growing [`octree`](tree::Octree) index over bounded geometry.
//!
//! Accelerates ray casts, rectangle and frustum picks, box, point, plane and
//! proximity queries, and nearest-neighbour search over an unbounded,
//! dynamically growing set of objects.
//!
//! Any type implementing [`Insertable`] can be indexed. Objects are never
//! clipped: an object whose extent straddles several octants is referenced
//! from every leaf it touches, and every query deduplicates its results.
//!
//! ## Available methods:
//!
//! - ### Mutation
//!
//!   - [`Insertion`](tree::Octree::insert)
//!   - [`Bulk insertion`](tree::Octree::insert_many)
//!   - [`Concurrent insertion`](tree::Octree::insert_async) through `&self`,
//!     also [`one at a time`](tree::Octree::insert_shared)
//!   - [`Removing`](tree::Octree::remove)
//!
//! - ### Queries
//!
//!   - [`Line`](tree::Octree::line), [`ray casting`](tree::Octree::ray_cast)
//!   - [`Rectangle`](tree::Octree::rect) and [`pick area`](tree::Octree::pick) selection
//!   - [`Box`](tree::Octree::query_box), [`point`](tree::Octree::query_point),
//!     [`plane`](tree::Octree::query_plane), [`proximity`](tree::Octree::query_near)
//!   - [`Nearest neighbour`](tree::Octree::nearest)
//!   - [`Custom pruning closure`](tree::Octree::intersect_with)
//!
//! ## Growth
//!
//! The root is sized from the first object (110% of its extent) and doubles
//! outward whenever an object falls outside it. Leaves split into 8 octants
//! according to a pluggable [`SplitPolicy`](split::SplitPolicy), by default
//! once a leaf at depth `d` holds more than `2^d` objects.
//!
//! ## Example
//!
//! ```rust
//! use glam::DVec3;
//! use spindex::prelude::*;
//!
//! fn main() -> Result<(), TreeError> {
//!     let mut tree = Octree::new(0.01);
//!
//!     let a = tree.insert(Aabb::new(DVec3::ZERO, DVec3::ONE))?.unwrap();
//!     let b = tree.insert(Aabb::new(DVec3::splat(10.0), DVec3::splat(11.0)))?.unwrap();
//!
//!     let ray = Ray::new(DVec3::new(-5.0, 0.5, 0.5), DVec3::X, 100.0);
//!     assert_eq!(tree.ray_cast(&ray).element, Some(a));
//!
//!     assert!(tree.query_point(DVec3::splat(10.5)).contains(&b));
//!     assert!(tree.query_point(DVec3::splat(1000.0)).is_empty());
//!
//!     tree.remove(a)?;
//!     assert_eq!(tree.ray_cast(&ray).element, None);
//!     Ok(())
//! }
//! ```
//!
//! ## Check yourself list:
//!
//! - tests
//!
//!   ```sh
//!   cargo test --all-targets --all-features --release
//!   ```
//!
//! - clippy
//!
//!   ```sh
//!   cargo clippy --all-targets --all-features
//!   ```
//!
//! - benchmark
//!
//!   ```sh
//!   cargo bench
//!   ```

#[cfg(feature = "bevy")]
pub mod bevy_integration;
pub mod bounding;
mod concurrent;
pub mod intersect_with;
pub mod iter;
pub mod node;
pub mod pick;
mod pool;
pub mod prelude;
pub mod query;
pub mod split;
pub mod tree;
mod validate;

use bounding::{Aabb, Cube};
use glam::DVec3;
use pick::{PickArea, Projection, Rect};
use std::{fmt, ops::Deref, sync::Arc};
use thiserror::Error;

/// Implement to make an object indexable by a [`tree`](tree::Octree).
///
/// Every test receives the tree's `precision`, a fuzz tolerance absorbing
/// floating-point error. Only [`extent`](Insertable::extent) and
/// [`hit_test_cube`](Insertable::hit_test_cube) are mandatory, the remaining
/// tests fall back on the extent.
pub trait Insertable {
    /// Axis aligned bounds of the object. [`Aabb::EMPTY`] excludes the object
    /// from insertion.
    fn extent(&self, precision: f64) -> Aabb;

    /// Whether the object touches `cube`. May be conservative.
    fn hit_test_cube(&self, cube: &Cube, precision: f64) -> bool;

    /// Whether the projected object meets `rect`, or lies fully inside it
    /// when `only_inside` is set.
    fn hit_test_rect(&self, projection: &Projection, rect: &Rect, only_inside: bool) -> bool {
        let extent = self.extent(0.0);
        if extent.is_empty() {
            return false;
        }
        match projection.project_aabb(&extent) {
            Some(footprint) if only_inside => rect.contains_rect(&footprint),
            Some(footprint) => rect.overlaps(&footprint),
            None => !only_inside,
        }
    }

    /// Whether the object meets the pick volume, or lies fully inside it
    /// when `only_inside` is set.
    fn hit_test_pick(&self, area: &PickArea, only_inside: bool) -> bool {
        let extent = self.extent(0.0);
        if only_inside {
            area.contains_aabb(&extent)
        } else {
            area.interferes(&extent)
        }
    }

    /// Smallest, possibly negative, `t` such that `origin + t * direction`
    /// lies on or near the object. [`None`] means no hit.
    fn ray_parameter(&self, origin: DVec3, direction: DVec3, precision: f64) -> Option<f64> {
        self.extent(precision)
            .ray_interval(origin, direction, f64::NEG_INFINITY, f64::INFINITY)
            .map(|(t0, _)| t0)
    }
}

macro_rules! forward_insertable {
    ($($ty:ty),*) => {$(
        impl<T: Insertable + ?Sized> Insertable for $ty {
            fn extent(&self, precision: f64) -> Aabb {
                self.deref().extent(precision)
            }

            fn hit_test_cube(&self, cube: &Cube, precision: f64) -> bool {
                self.deref().hit_test_cube(cube, precision)
            }

            fn hit_test_rect(&self, projection: &Projection, rect: &Rect, only_inside: bool) -> bool {
                self.deref().hit_test_rect(projection, rect, only_inside)
            }

            fn hit_test_pick(&self, area: &PickArea, only_inside: bool) -> bool {
                self.deref().hit_test_pick(area, only_inside)
            }

            fn ray_parameter(&self, origin: DVec3, direction: DVec3, precision: f64) -> Option<f64> {
                self.deref().ray_parameter(origin, direction, precision)
            }
        }
    )*};
}

forward_insertable!(Box<T>, Arc<T>, &T);

/// Handle of an object stored in an [`Octree`](tree::Octree).
///
/// Ids are dense and reused after [`remove`](tree::Octree::remove). At most
/// `u32::MAX` objects can be stored at once.
///
/// ```rust
/// use glam::DVec3;
/// use spindex::prelude::*;
///
/// let mut tree = Octree::new(0.0);
/// let id = tree.insert(Aabb::new(DVec3::ZERO, DVec3::ONE)).unwrap().unwrap();
/// let element: &Aabb = tree.get(id).unwrap();
/// ```
#[derive(Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ElementId(pub u32);

impl From<ElementId> for usize {
    fn from(value: ElementId) -> Self {
        value.0 as usize
    }
}

impl TryFrom<usize> for ElementId {
    type Error = TreeError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        u32::try_from(value)
            .map(ElementId)
            .map_err(|_| TreeError::CapacityExceeded(format!("{value} does not fit an ElementId")))
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElementId: {}", self.0)
    }
}

/// Enum of all possible errors of the octree's operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    /// Object's extent has non-finite coordinates or reaches past
    /// [`Aabb::MAX_COORDINATE`](bounding::Aabb::MAX_COORDINATE).
    #[error("Invalid extent. {0}")]
    InvalidExtent(String),

    /// Object does not fit the root [`Cube`] and the root can't grow.
    #[error("Out of tree bounds. {0}")]
    OutOfTreeBounds(String),

    /// [`ElementId`] is not found in a [`tree`](tree::Octree).
    #[error("Element not found. {0}")]
    ElementNotFound(String),

    /// Every [`ElementId`] is taken.
    #[error("Capacity exceeded. {0}")]
    CapacityExceeded(String),

    /// A structural invariant of the [`tree`](tree::Octree) is broken.
    #[error("Tree invariant violated. {0}")]
    Invariant(String),
}
