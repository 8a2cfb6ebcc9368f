//! Helper functions with a custom intersection closure.
//!
//! Every query of the tree is a pruned traversal: a closure decides, per
//! node cube, whether the subtree may hold matches. Leaves that pass hand
//! their objects to the caller, once per object.

use std::collections::HashSet;

use heapless::Vec as HVec;

use crate::{bounding::Cube, node::Node, tree::Octree, ElementId};

/// Visits every leaf below `node` whose cube, and whose ancestors' cubes,
/// pass `what`.
pub(crate) fn visit_leaves<'a, F, V>(node: &'a Node, what: &F, visitor: &mut V)
where
    F: Fn(&Cube) -> bool,
    V: FnMut(&'a Node),
{
    // We use a heapless stack to loop through the nodes until we complete the intersect however
    // if the stack becomes full then we fallback on recursive calls.
    let mut stack = HVec::<&'a Node, 32>::new();
    // An empty stack always has room.
    let _ = stack.push(node);
    while let Some(node) = stack.pop() {
        if !what(&node.cube) {
            continue;
        }

        match node.children.get() {
            None => visitor(node),

            Some(children) => {
                for child in children.iter() {
                    // If we can't push to the stack (to be processed on the next loop
                    // iteration) then we fallback to recursive calls.
                    if stack.push(child).is_err() {
                        visit_leaves(child, what, visitor);
                    }
                }
            }
        }
    }
}

impl<T> Octree<T> {
    /// Intersect [`Octree`] with a custom intersection closure.
    ///
    /// Returns every [`element`](ElementId) referenced from a leaf whose
    /// cube, and all of its ancestors' cubes, pass `what`.
    ///
    /// ```rust
    /// use glam::DVec3;
    /// use spindex::prelude::*;
    ///
    /// let mut tree = Octree::new(0.0);
    /// let id = tree.insert(Aabb::new(DVec3::ZERO, DVec3::ONE)).unwrap().unwrap();
    ///
    /// assert!(tree.intersect_with(|_| true).contains(&id));
    /// assert!(tree.intersect_with(|cube| cube.min().x > 10.0).is_empty());
    /// ```
    pub fn intersect_with<F>(&self, what: F) -> HashSet<ElementId>
    where
        F: Fn(&Cube) -> bool,
    {
        let mut elements = HashSet::new();
        self.extend_intersect_with(what, &mut elements);
        elements
    }

    /// Intersect [`Octree`] with a custom intersection closure reusing a
    /// supplied [`set`](HashSet) rather than allocating a new one.
    pub fn extend_intersect_with<F>(&self, what: F, elements: &mut HashSet<ElementId>)
    where
        F: Fn(&Cube) -> bool,
    {
        if let Some(root) = self.root.get() {
            visit_leaves(root, &what, &mut |leaf: &Node| {
                elements.extend(leaf.list.read_recursive().iter().copied());
            });
        }
    }

    /// Intersect [`Octree`] with a custom intersection closure, then keep
    /// only the elements accepted by `filter`.
    ///
    /// `filter` runs once per element, however many accepted leaves
    /// reference it.
    pub fn intersect_with_filter<F, P>(&self, what: F, mut filter: P) -> HashSet<ElementId>
    where
        F: Fn(&Cube) -> bool,
        P: FnMut(ElementId, &T) -> bool,
    {
        let mut elements = HashSet::new();
        self.intersect_with_for_each(what, |element, value| {
            if filter(element, value) {
                elements.insert(element);
            }
        });
        elements
    }

    /// Intersect [`Octree`] with a custom intersection closure. Each element
    /// referenced from an accepted leaf is passed to `actor` exactly once.
    ///
    /// ```rust
    /// use glam::DVec3;
    /// use spindex::prelude::*;
    ///
    /// let mut tree = Octree::new(0.0);
    /// tree.insert(Aabb::new(DVec3::ZERO, DVec3::ONE)).unwrap();
    ///
    /// let mut boxes = Vec::new();
    /// tree.intersect_with_for_each(|_| true, |_, aabb| boxes.push(*aabb));
    /// assert_eq!(boxes, vec![Aabb::new(DVec3::ZERO, DVec3::ONE)]);
    /// ```
    pub fn intersect_with_for_each<F, A>(&self, what: F, mut actor: A)
    where
        F: Fn(&Cube) -> bool,
        A: FnMut(ElementId, &T),
    {
        let Some(root) = self.root.get() else {
            return;
        };

        let mut seen = HashSet::new();
        visit_leaves(root, &what, &mut |leaf: &Node| {
            // `actor` may query the tree, don't hold the lock while it runs.
            let list = leaf.list.read_recursive().clone();
            for &element in list.iter() {
                if seen.insert(element) {
                    actor(element, &self.elements[element].value);
                }
            }
        });
    }
}
