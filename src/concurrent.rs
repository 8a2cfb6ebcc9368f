//! Concurrent insertion.
//!
//! Both entry points take `&self`, so any number of threads may insert into
//! the same tree. Element slots are reserved through the pool, placement
//! only locks the leaf it splits. The root is initialized once, by whichever
//! insertion arrives first, and never grows here.

use rayon::prelude::*;
use tracing::debug;

use crate::{
    bounding::{Aabb, Cube},
    node::Node,
    tree::{checked_extent, Element, Octree},
    ElementId, Insertable, TreeError,
};

impl<T: Insertable + Send + Sync> Octree<T> {
    /// Inserts a batch of objects in parallel.
    ///
    /// Safe to call from several threads at once. An unborn root is sized
    /// around the first batch to arrive, an existing root must already
    /// contain the batch: presize it with [`from_cube`] or grow it with
    /// [`insert`] first. The batch is validated up-front: on error nothing is
    /// inserted.
    ///
    /// Called alone, hands out the same [`ElementId`]s as [`insert_many`].
    /// Queries running meanwhile may miss objects of the batch.
    ///
    /// ```rust
    /// use glam::DVec3;
    /// use spindex::prelude::*;
    ///
    /// let boxes = (0..1000).map(|i| {
    ///     let p = DVec3::new(i as f64, (i % 7) as f64, (i % 13) as f64);
    ///     Aabb::new(p, p + DVec3::splat(0.5))
    /// });
    ///
    /// let tree = Octree::new(0.01);
    /// let ids = tree.insert_async(boxes).unwrap();
    /// assert_eq!(ids.len(), 1000);
    /// assert_eq!(tree.all_objects().len(), 1000);
    /// ```
    ///
    /// [`from_cube`]: Octree::from_cube
    /// [`insert`]: Octree::insert
    /// [`insert_many`]: Octree::insert_many
    pub fn insert_async<I>(&self, values: I) -> Result<Vec<Option<ElementId>>, TreeError>
    where
        I: IntoIterator<Item = T>,
    {
        let values: Vec<T> = values.into_iter().collect();
        let precision = self.precision;
        let extents = values
            .par_iter()
            .map(|value| checked_extent(value, precision))
            .collect::<Result<Vec<Aabb>, TreeError>>()?;

        let bounds = extents
            .iter()
            .filter(|extent| !extent.is_empty())
            .fold(Aabb::EMPTY, |bounds, extent| bounds.union(extent));
        if bounds.is_empty() {
            return Ok(vec![None; values.len()]);
        }
        let root = self.shared_root(&bounds)?;

        // Registration stops at the first full pool, what got in is placed
        // anyway so the tree stays consistent.
        let mut ids = Vec::with_capacity(values.len());
        let mut failure = None;
        for (value, extent) in values.into_iter().zip(extents.iter()) {
            if extent.is_empty() {
                ids.push(None);
                continue;
            }
            match self.elements.insert(Element {
                value,
                extent: *extent,
            }) {
                Ok(element) => ids.push(Some(element)),
                Err(error) => {
                    failure = Some(error);
                    break;
                }
            }
        }
        debug!(objects = ids.len(), "placing batch");

        let ctx = self.placement();
        ids.par_iter()
            .zip(extents.par_iter())
            .filter_map(|(element, extent)| element.map(|element| (element, extent)))
            .for_each(|(element, extent)| root.add_shared(&ctx, element, extent));

        match failure {
            Some(error) => Err(error),
            None => Ok(ids),
        }
    }

    /// Inserts one object through the shared path.
    ///
    /// Same rules as [`insert_async`](Octree::insert_async), without the
    /// rayon fan-out.
    ///
    /// ```rust
    /// use glam::DVec3;
    /// use spindex::prelude::*;
    ///
    /// let tree = Octree::from_cube(Cube::new(DVec3::ZERO, 100.0), 0.0);
    /// std::thread::scope(|s| {
    ///     for i in 0..4 {
    ///         let tree = &tree;
    ///         s.spawn(move || {
    ///             let p = DVec3::splat(i as f64 * 10.0);
    ///             tree.insert_shared(Aabb::new(p, p + DVec3::ONE)).unwrap();
    ///         });
    ///     }
    /// });
    /// assert_eq!(tree.len(), 4);
    /// ```
    pub fn insert_shared(&self, value: T) -> Result<Option<ElementId>, TreeError> {
        let extent = checked_extent(&value, self.precision)?;
        if extent.is_empty() {
            return Ok(None);
        }

        let root = self.shared_root(&extent)?;
        let element = self.elements.insert(Element { value, extent })?;
        root.add_shared(&self.placement(), element, &extent);
        Ok(Some(element))
    }

    /// Root that strictly contains `extent`.
    ///
    /// An unborn root is initialized around `extent`. Racing initializations
    /// agree on whichever one wins.
    fn shared_root(&self, extent: &Aabb) -> Result<&Node, TreeError> {
        let root = self.root.get_or_init(|| {
            let cube = Cube::around(extent, self.precision);
            debug!(%cube, "root initialized");
            Node::new(cube, 0, None)
        });
        if root.cube.contains(extent) {
            Ok(root)
        } else {
            Err(TreeError::OutOfTreeBounds(format!(
                "{extent} is outside of {}",
                root.cube
            )))
        }
    }
}
