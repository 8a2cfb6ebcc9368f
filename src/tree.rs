//! [`Octree`] implementation.

use core::fmt;
use std::sync::OnceLock;

use tracing::debug;

use crate::{
    bounding::{Aabb, Cube},
    node::{Node, Placement},
    pool::Pool,
    split::{DepthThreshold, SplitPolicy},
    ElementId, Insertable, TreeError,
};

/// Stored object together with the extent it was placed with.
///
/// Removal and queries reuse the cached extent, so an object's bounds are
/// computed exactly once.
pub(crate) struct Element<T> {
    pub(crate) value: T,
    pub(crate) extent: Aabb,
}

/// Adaptive octree over [`Insertable`] objects.
///
/// The root is "unborn" until the first non-empty object arrives, then sized
/// around it and doubled outward whenever an object falls outside.
///
/// ```rust
/// use glam::DVec3;
/// use spindex::prelude::*;
///
/// let mut tree = Octree::new(0.0);
/// assert!(tree.extent().is_none());
///
/// let id = tree.insert(Aabb::new(DVec3::ZERO, DVec3::ONE)).unwrap().unwrap();
/// assert!(tree.extent().unwrap().contains(&Aabb::new(DVec3::ZERO, DVec3::ONE)));
///
/// tree.insert(Aabb::new(DVec3::splat(100.0), DVec3::splat(101.0))).unwrap();
/// assert!(tree.extent().unwrap().radius() > 50.0);
/// assert!(tree.query_point(DVec3::splat(0.5)).contains(&id));
/// ```
pub struct Octree<T> {
    pub(crate) elements: Pool<Element<T>>,
    pub(crate) root: OnceLock<Node>,
    pub(crate) precision: f64,
    pub(crate) policy: Box<dyn SplitPolicy<T>>,
}

impl<T> Default for Octree<T> {
    fn default() -> Self {
        Octree::new(0.0)
    }
}

impl<T> fmt::Debug for Octree<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Octree")
            .field("precision", &self.precision)
            .field("len", &self.elements.len())
            .field("root", &self.root.get())
            .finish()
    }
}

/// Object's extent, or an error if the tree can't index it.
pub(crate) fn checked_extent<T: Insertable + ?Sized>(
    value: &T,
    precision: f64,
) -> Result<Aabb, TreeError> {
    let extent = value.extent(precision);
    if extent.is_empty() || extent.is_indexable() {
        Ok(extent)
    } else if !extent.is_finite() {
        Err(TreeError::InvalidExtent(format!(
            "{extent} has non-finite coordinates"
        )))
    } else {
        Err(TreeError::InvalidExtent(format!(
            "{extent} reaches past ±{:e}",
            Aabb::MAX_COORDINATE
        )))
    }
}

impl<T> Octree<T> {
    /// Creates an empty tree with the default [`DepthThreshold`] split policy.
    ///
    /// `precision` is passed to every geometric test performed on behalf of
    /// the tree.
    pub fn new(precision: f64) -> Self {
        Octree {
            elements: Default::default(),
            root: OnceLock::new(),
            precision,
            policy: Box::new(DepthThreshold),
        }
    }

    /// Creates a tree whose root already covers `cube`.
    ///
    /// Objects inside `cube` never trigger root extension.
    pub fn from_cube(cube: Cube, precision: f64) -> Self {
        Octree {
            root: OnceLock::from(Node::new(cube, 0, None)),
            ..Octree::new(precision)
        }
    }

    pub fn with_capacity(capacity: usize, precision: f64) -> Self {
        Octree {
            elements: Pool::with_capacity(capacity),
            ..Octree::new(precision)
        }
    }

    /// Replaces the split policy. See [`SplitPolicy`].
    pub fn with_split_policy(mut self, policy: impl SplitPolicy<T> + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    pub fn precision(&self) -> f64 {
        self.precision
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, element: ElementId) -> Option<&T> {
        self.elements.get(element).map(|e| &e.value)
    }

    /// Iterates over the stored objects in [`ElementId`] order.
    pub fn iter(&self) -> impl Iterator<Item = (ElementId, &T)> + '_ {
        self.elements
            .iter_elements()
            .map(|(element, e)| (element, &e.value))
    }

    /// Root node, [`None`] while the tree is unborn.
    pub fn root(&self) -> Option<&Node> {
        self.root.get()
    }

    /// Cube covered by the root.
    pub fn extent(&self) -> Option<Cube> {
        self.root.get().map(|root| root.cube)
    }

    /// Drops every object and node. The root becomes unborn again.
    pub fn clear(&mut self) {
        debug!(objects = self.elements.len(), "clearing tree");
        self.elements.clear();
        self.root = OnceLock::new();
    }

    /// Releases spare capacity of leaf lists and element storage.
    pub fn shrink(&mut self) {
        if let Some(root) = self.root.get_mut() {
            root.shrink();
        }
        self.elements.shrink();
    }

    /// Drops every node's extension data.
    pub fn clear_extensions(&mut self) {
        if let Some(root) = self.root.get_mut() {
            root.clear_extensions();
        }
    }

    pub(crate) fn placement(&self) -> Placement<'_, T> {
        Placement {
            elements: &self.elements,
            precision: self.precision,
            policy: &*self.policy,
        }
    }

    /// Root for exclusive mutation alongside the shared placement context.
    fn root_and_placement(&mut self) -> (Option<&mut Node>, Placement<'_, T>) {
        (
            self.root.get_mut(),
            Placement {
                elements: &self.elements,
                precision: self.precision,
                policy: &*self.policy,
            },
        )
    }

    /// Makes the root strictly contain `extent`, initializing it if unborn
    /// and doubling it outward as many times as needed.
    pub(crate) fn cover(&mut self, extent: &Aabb) {
        let mut root = match self.root.take() {
            Some(root) => root,
            None => {
                let cube = Cube::around(extent, self.precision);
                debug!(%cube, "root initialized");
                Node::new(cube, 0, None)
            }
        };

        while !root.cube.contains(extent) {
            let octant = root.cube.growth_octant(extent);
            root = Node::grown(root, octant);
            debug!(cube = %root.cube, octant, "root extended");
        }

        self.root = OnceLock::from(root);
    }
}

impl<T: Insertable> Octree<T> {
    /// Inserts an object.
    ///
    /// Returns [`None`] when the object's extent is empty, in which case it
    /// is dropped and nothing changes.
    ///
    /// ```rust
    /// use glam::DVec3;
    /// use spindex::prelude::*;
    ///
    /// let mut tree = Octree::new(0.0);
    /// assert_eq!(tree.insert(Aabb::EMPTY), Ok(None));
    ///
    /// let bad = Aabb::new(DVec3::ZERO, DVec3::splat(f64::NAN));
    /// assert!(matches!(tree.insert(bad), Err(TreeError::InvalidExtent(_))));
    /// ```
    pub fn insert(&mut self, value: T) -> Result<Option<ElementId>, TreeError> {
        let extent = checked_extent(&value, self.precision)?;
        if extent.is_empty() {
            return Ok(None);
        }

        self.cover(&extent);
        let element = self.elements.insert(Element { value, extent })?;

        let (root, ctx) = self.root_and_placement();
        if let Some(root) = root {
            root.add(&ctx, element, &extent);
        }
        Ok(Some(element))
    }

    /// Inserts objects one by one.
    ///
    /// Stops at the first invalid object. Objects inserted before it stay in
    /// the tree.
    pub fn insert_many<I>(&mut self, values: I) -> Result<Vec<Option<ElementId>>, TreeError>
    where
        I: IntoIterator<Item = T>,
    {
        values.into_iter().map(|value| self.insert(value)).collect()
    }

    /// Removes an object and returns it.
    ///
    /// Only leaf lists change. Nodes are never merged back.
    pub fn remove(&mut self, element: ElementId) -> Result<T, TreeError> {
        let not_found = || TreeError::ElementNotFound(format!("{element} is not in the tree"));

        let extent = self.elements.get(element).ok_or_else(not_found)?.extent;
        let (root, ctx) = self.root_and_placement();
        if let Some(root) = root {
            root.remove(&ctx, element, &extent);
        }

        self.elements
            .remove(element)
            .map(|e| e.value)
            .ok_or_else(not_found)
    }
}
