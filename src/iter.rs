//! Lazy traversal of the node graph.
//!
//! [`Nodes`], [`Leaves`] and [`Lists`] are depth-first, finite and
//! [`Clone`]: clone one to restart from the same point. Order is unspecified.

use core::fmt;
use std::{iter::FusedIterator, ops::Deref};

use smallvec::SmallVec;

use crate::{
    node::{List, Node},
    tree::Octree,
    ElementId,
};

/// Copy of a leaf's object list, taken under the leaf's read lock.
///
/// Dereferences to a slice of [`ElementId`]s. Holding one never blocks
/// queries or insertions on the same tree.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ObjectList {
    list: List,
}

impl ObjectList {
    pub(crate) fn new(list: List) -> Self {
        ObjectList { list }
    }
}

impl Deref for ObjectList {
    type Target = [ElementId];

    fn deref(&self) -> &Self::Target {
        &self.list
    }
}

impl fmt::Debug for ObjectList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Every node, internal ones included.
#[derive(Clone)]
pub struct Nodes<'a> {
    stack: SmallVec<[&'a Node; 32]>,
}

impl<'a> Nodes<'a> {
    fn new(root: Option<&'a Node>) -> Self {
        Nodes {
            stack: root.into_iter().collect(),
        }
    }
}

impl<'a> Iterator for Nodes<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        if let Some(children) = node.children.get() {
            self.stack.extend(children.iter().rev());
        }
        Some(node)
    }
}

impl FusedIterator for Nodes<'_> {}

/// Every leaf.
#[derive(Clone)]
pub struct Leaves<'a> {
    nodes: Nodes<'a>,
}

impl<'a> Iterator for Leaves<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        self.nodes.find(|node| node.is_leaf())
    }
}

impl FusedIterator for Leaves<'_> {}

/// Object list of every leaf.
#[derive(Clone)]
pub struct Lists<'a> {
    leaves: Leaves<'a>,
}

impl<'a> Iterator for Lists<'a> {
    type Item = ObjectList;

    fn next(&mut self) -> Option<Self::Item> {
        self.leaves.next().map(Node::objects)
    }
}

impl FusedIterator for Lists<'_> {}

impl<T> Octree<T> {
    pub fn nodes(&self) -> Nodes<'_> {
        Nodes::new(self.root.get())
    }

    /// ```rust
    /// use glam::DVec3;
    /// use spindex::prelude::*;
    ///
    /// let mut tree = Octree::new(0.0);
    /// for i in 0..10 {
    ///     let p = DVec3::splat(i as f64);
    ///     tree.insert(Aabb::new(p, p + DVec3::splat(0.5))).unwrap();
    /// }
    ///
    /// let leaves = tree.leaves();
    /// assert!(leaves.clone().all(|leaf| leaf.is_leaf()));
    /// assert_eq!(leaves.count(), tree.leaves().count());
    /// ```
    pub fn leaves(&self) -> Leaves<'_> {
        Leaves {
            nodes: self.nodes(),
        }
    }

    pub fn lists(&self) -> Lists<'_> {
        Lists {
            leaves: self.leaves(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{random_balls, PRECISION};
    use std::collections::HashSet;

    #[test]
    fn test_unborn_tree_has_no_nodes() {
        let tree: Octree<crate::tests::Ball> = Octree::new(PRECISION);
        assert_eq!(tree.nodes().count(), 0);
        assert_eq!(tree.leaves().count(), 0);
        assert_eq!(tree.lists().count(), 0);
    }

    #[test]
    fn test_counts() {
        let mut tree = Octree::new(PRECISION);
        tree.insert_many(random_balls(1000, 100.0, 0.5)).unwrap();

        let internal = tree.nodes().filter(|node| !node.is_leaf()).count();
        assert_eq!(tree.node_count(), internal * 8 + 1);
        assert_eq!(tree.leaves().count(), internal * 7 + 1);
        assert_eq!(tree.lists().count(), tree.leaves().count());

        for node in tree.nodes().filter(|node| !node.is_leaf()) {
            assert!(node.objects().is_empty());
        }
    }

    #[test]
    fn test_lists_cover_all_objects() {
        let mut tree = Octree::new(PRECISION);
        tree.insert_many(random_balls(500, 50.0, 2.0)).unwrap();

        let listed: HashSet<ElementId> = tree
            .lists()
            .flat_map(|list| list.to_vec())
            .collect();
        assert_eq!(listed, tree.all_objects());
        assert_eq!(listed.len(), 500);
    }

    #[test]
    fn test_queries_while_holding_lists() {
        let mut tree = Octree::new(PRECISION);
        tree.insert_many(random_balls(200, 20.0, 0.5)).unwrap();

        for list in tree.lists() {
            for id in list.iter() {
                let center = tree.get(*id).unwrap().center;
                assert!(tree.query_point(center).contains(id));
                assert!(tree.nearest(center, 1.0).is_some());
            }
        }

        let leaf = tree.find_node(tree.get(ElementId(0)).unwrap().center).unwrap();
        let held = leaf.objects();
        assert!(held.contains(&ElementId(0)));
        assert!(tree
            .insert_shared(crate::tests::Ball::new(leaf.cube().center(), 0.01))
            .unwrap()
            .is_some());
        assert!(tree.query_box(&leaf.cube().aabb()).len() > held.len());
        assert_eq!(tree.len(), 201);
    }

    #[test]
    fn test_restartable() {
        let mut tree = Octree::new(PRECISION);
        tree.insert_many(random_balls(300, 50.0, 0.5)).unwrap();

        let mut leaves = tree.leaves();
        leaves.next();
        let rest = leaves.clone();
        assert_eq!(leaves.count(), rest.count());
        assert_eq!(
            tree.leaves().map(|l| *l.cube()).collect::<Vec<_>>(),
            tree.leaves().map(|l| *l.cube()).collect::<Vec<_>>()
        );
    }
}
