//! Structural invariant check.
//!
//! Not run on any hot path. Tests and debug builds of callers use it to
//! detect corruption such as duplicate references.

use std::collections::HashSet;

use crate::{
    node::Node,
    pool::Pool,
    tree::{Element, Octree},
    TreeError,
};

impl<T> Octree<T> {
    /// Walks the whole tree and reports the first broken invariant.
    ///
    /// Checks that:
    /// - the root has depth 0, no parent and strictly contains every extent,
    /// - internal nodes hold no objects,
    /// - children tile their parent exactly, with the right depth and parent,
    /// - leaves reference live objects, each at most once.
    pub fn validate(&self) -> Result<(), TreeError> {
        let Some(root) = self.root.get() else {
            if self.elements.is_empty() {
                return Ok(());
            }
            return Err(TreeError::Invariant(format!(
                "{} objects stored without a root",
                self.elements.len()
            )));
        };

        if root.depth != 0 || root.parent.is_some() {
            return Err(TreeError::Invariant(format!(
                "Root {} has depth {} and parent {:?}",
                root.cube, root.depth, root.parent
            )));
        }

        for (element, e) in self.elements.iter_elements() {
            if !root.cube.contains(&e.extent) {
                return Err(TreeError::Invariant(format!(
                    "{element} with extent {} sticks out of root {}",
                    e.extent, root.cube
                )));
            }
        }

        self.nodes()
            .try_for_each(|node| check_node(node, &self.elements))
    }
}

fn check_node<T>(node: &Node, elements: &Pool<Element<T>>) -> Result<(), TreeError> {
    let list = node.list.read_recursive();

    let Some(children) = node.children.get() else {
        let mut seen = HashSet::with_capacity(list.len());
        for &element in list.iter() {
            if !seen.insert(element) {
                return Err(TreeError::Invariant(format!(
                    "{element} referenced twice by leaf {}",
                    node.cube
                )));
            }
            if elements.is_garbage(element) {
                return Err(TreeError::Invariant(format!(
                    "Leaf {} references removed {element}",
                    node.cube
                )));
            }
        }
        return Ok(());
    };

    if !list.is_empty() {
        return Err(TreeError::Invariant(format!(
            "Internal node {} holds {} objects",
            node.cube,
            list.len()
        )));
    }

    for (i, child) in children.iter().enumerate() {
        if child.cube != node.cube.octant(i) {
            return Err(TreeError::Invariant(format!(
                "Child {i} of {} covers {}",
                node.cube, child.cube
            )));
        }
        if child.depth != node.depth + 1 {
            return Err(TreeError::Invariant(format!(
                "Child {} has depth {}, parent depth {}",
                child.cube, child.depth, node.depth
            )));
        }
        if child.parent != Some(node.cube) {
            return Err(TreeError::Invariant(format!(
                "Child {} points to parent {:?} instead of {}",
                child.cube, child.parent, node.cube
            )));
        }

        // Siblings must share the exact same boundary value.
        for axis in 0..3 {
            let bit = 1 << axis;
            if i & bit == 0 && child.cube.max()[axis] != children[i | bit].cube.min()[axis] {
                return Err(TreeError::Invariant(format!(
                    "Gap between {} and {}",
                    child.cube,
                    children[i | bit].cube
                )));
            }
        }
    }

    Ok(())
}
