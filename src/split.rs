//! Leaf split policies.
//!
//! A [`SplitPolicy`] decides, right after an object has been appended to a
//! leaf, whether that leaf turns into 8 children. The tree never splits past
//! [`MAX_DEPTH`] or a cube too small to bisect, whatever the policy answers.

use crate::bounding::Cube;

/// Hard limit on node depth.
pub const MAX_DEPTH: u32 = 64;

/// State of a leaf that just received an object.
#[derive(Debug, Clone, Copy)]
pub struct SplitContext<'a> {
    pub cube: &'a Cube,
    pub depth: u32,
    /// Number of objects in the leaf, the new one included.
    pub len: usize,
}

/// Injectable split decision.
///
/// Implemented for any `Fn(&SplitContext, &T) -> bool + Send + Sync` closure.
///
/// ```rust
/// use spindex::prelude::*;
///
/// let tree: Octree<Aabb> = Octree::new(0.0)
///     .with_split_policy(|leaf: &SplitContext, _: &Aabb| leaf.len > 16);
/// ```
pub trait SplitPolicy<T: ?Sized>: Send + Sync {
    fn should_split(&self, leaf: &SplitContext<'_>, object: &T) -> bool;
}

/// Default policy: a leaf at depth `d` splits once it holds more than `2^d`
/// objects.
///
/// Shallow, sparse regions stay coarse while dense regions subdivide quickly.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DepthThreshold;

impl<T: ?Sized> SplitPolicy<T> for DepthThreshold {
    fn should_split(&self, leaf: &SplitContext<'_>, _object: &T) -> bool {
        1usize
            .checked_shl(leaf.depth)
            .is_some_and(|threshold| leaf.len > threshold)
    }
}

/// Splits once a leaf holds more than a fixed number of objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxObjects(pub usize);

impl<T: ?Sized> SplitPolicy<T> for MaxObjects {
    fn should_split(&self, leaf: &SplitContext<'_>, _object: &T) -> bool {
        leaf.len > self.0
    }
}

impl<T: ?Sized, F> SplitPolicy<T> for F
where
    F: Fn(&SplitContext<'_>, &T) -> bool + Send + Sync,
{
    fn should_split(&self, leaf: &SplitContext<'_>, object: &T) -> bool {
        self(leaf, object)
    }
}
