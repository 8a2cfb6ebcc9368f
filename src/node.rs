use core::fmt;
use std::{any::Any, array::from_fn, sync::OnceLock};

use parking_lot::RwLock;
use smallvec::SmallVec;
use tracing::trace;

use crate::{
    bounding::{Aabb, Cube},
    iter::ObjectList,
    pool::Pool,
    split::{SplitContext, SplitPolicy, MAX_DEPTH},
    tree::Element,
    ElementId, Insertable,
};

pub(crate) type List = SmallVec<[ElementId; 4]>;

/// Cube-shaped region of the tree.
///
/// Either a leaf holding a list of [`ElementId`]s or an internal node owning
/// exactly 8 children, one per octant. Never both.
///
/// Leaf lists sit behind a per-node read-write lock and children are
/// published once, so concurrent insertions only serialize on the leaf they
/// split. Readers take the lock recursively and never hand it out.
pub struct Node {
    pub(crate) cube: Cube,
    pub(crate) depth: u32,
    pub(crate) parent: Option<Cube>,
    pub(crate) list: RwLock<List>,
    pub(crate) children: OnceLock<Box<[Node; 8]>>,
    extension: OnceLock<Box<dyn Any + Send + Sync>>,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Node");
        s.field("cube", &self.cube).field("depth", &self.depth);
        match self.children.get() {
            Some(children) => s.field("children", children),
            None => s.field("objects", &*self.list.read_recursive()),
        };
        s.finish()
    }
}

/// Everything a recursive insertion needs besides the node itself.
pub(crate) struct Placement<'a, T> {
    pub(crate) elements: &'a Pool<Element<T>>,
    pub(crate) precision: f64,
    pub(crate) policy: &'a dyn SplitPolicy<T>,
}

impl<T: Insertable> Placement<'_, T> {
    /// Quick reject: the extents don't overlap and the object says it
    /// doesn't touch the cube either.
    #[inline]
    fn accepts(&self, cube: &Cube, element: ElementId, extent: &Aabb) -> bool {
        !extent.disjoint(&cube.aabb())
            || self.elements[element]
                .value
                .hit_test_cube(cube, self.precision)
    }
}

impl Node {
    pub(crate) fn new(cube: Cube, depth: u32, parent: Option<Cube>) -> Self {
        Node {
            cube,
            depth,
            parent,
            list: RwLock::new(List::new()),
            children: OnceLock::new(),
            extension: OnceLock::new(),
        }
    }

    pub fn cube(&self) -> &Cube {
        &self.cube
    }

    /// Distance from the root.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Cube of the parent node. Resolve it with
    /// [`Octree::parent`](crate::tree::Octree::parent).
    pub fn parent_cube(&self) -> Option<&Cube> {
        self.parent.as_ref()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.get().is_none()
    }

    pub fn children(&self) -> Option<&[Node; 8]> {
        self.children.get().map(|children| &**children)
    }

    /// Objects referenced by this leaf. Always empty for internal nodes.
    pub fn objects(&self) -> ObjectList {
        ObjectList::new(self.list.read_recursive().clone())
    }

    /// Extension data attached by a derived index, if of type `E`.
    pub fn extension<E: Any>(&self) -> Option<&E> {
        self.extension.get()?.downcast_ref()
    }

    /// Attaches extension data on first call.
    ///
    /// Returns [`None`] when data of another type is already attached.
    pub fn get_or_init_extension<E, F>(&self, init: F) -> Option<&E>
    where
        E: Any + Send + Sync,
        F: FnOnce() -> E,
    {
        self.extension
            .get_or_init(|| Box::new(init()) as Box<dyn Any + Send + Sync>)
            .downcast_ref()
    }

    pub fn take_extension(&mut self) -> Option<Box<dyn Any + Send + Sync>> {
        self.extension.take()
    }

    /// Parent of a previous root, one level up.
    pub(crate) fn grown(mut old: Node, octant: usize) -> Node {
        let cube = old.cube.grown(octant);
        let mut children: Box<[Node; 8]> =
            Box::new(from_fn(|i| Node::new(cube.octant(i), 1, Some(cube))));
        old.parent = Some(cube);
        old.deepen();
        children[octant] = old;

        let mut root = Node::new(cube, 0, None);
        root.children = OnceLock::from(children);
        root
    }

    fn deepen(&mut self) {
        self.depth += 1;
        if let Some(children) = self.children.get_mut() {
            for child in children.iter_mut() {
                child.deepen();
            }
        }
    }

    fn should_split<T: Insertable>(
        &self,
        ctx: &Placement<'_, T>,
        len: usize,
        element: ElementId,
    ) -> bool {
        self.depth < MAX_DEPTH
            && self.cube.can_split()
            && ctx.policy.should_split(
                &SplitContext {
                    cube: &self.cube,
                    depth: self.depth,
                    len,
                },
                &ctx.elements[element].value,
            )
    }

    /// Fresh children holding every object of `list`.
    ///
    /// Children are not visible to other threads yet, so they are filled
    /// through the exclusive path.
    fn spawn_children<T: Insertable>(
        &self,
        ctx: &Placement<'_, T>,
        list: &[ElementId],
    ) -> Box<[Node; 8]> {
        trace!(depth = self.depth, objects = list.len(), "splitting leaf");
        let mut children: Box<[Node; 8]> = Box::new(from_fn(|i| {
            Node::new(self.cube.octant(i), self.depth + 1, Some(self.cube))
        }));
        for &element in list {
            let extent = ctx.elements[element].extent;
            for child in children.iter_mut() {
                child.add(ctx, element, &extent);
            }
        }
        children
    }

    /// Exclusive insertion, no locking.
    pub(crate) fn add<T: Insertable>(
        &mut self,
        ctx: &Placement<'_, T>,
        element: ElementId,
        extent: &Aabb,
    ) {
        if !ctx.accepts(&self.cube, element, extent) {
            return;
        }

        if let Some(children) = self.children.get_mut() {
            for child in children.iter_mut() {
                child.add(ctx, element, extent);
            }
            return;
        }

        self.list.get_mut().push(element);
        let len = self.list.get_mut().len();
        if self.should_split(ctx, len, element) {
            let list = std::mem::take(self.list.get_mut());
            let children = self.spawn_children(ctx, &list);
            self.children = OnceLock::from(children);
        }
    }

    /// Shared insertion, safe to race with other shared insertions.
    ///
    /// Only the leaf to internal transition takes the node's lock. Fan out
    /// into children happens after the lock is released.
    pub(crate) fn add_shared<T: Insertable>(
        &self,
        ctx: &Placement<'_, T>,
        element: ElementId,
        extent: &Aabb,
    ) {
        if !ctx.accepts(&self.cube, element, extent) {
            return;
        }

        let children = match self.children.get() {
            Some(children) => children,
            None => {
                let mut list = self.list.write();
                match self.children.get() {
                    // Lost the race to a split, descend like everybody else.
                    Some(children) => children,
                    None => {
                        list.push(element);
                        if self.should_split(ctx, list.len(), element) {
                            let children = self.spawn_children(ctx, &list);
                            *list = List::new();
                            if self.children.set(children).is_err() {
                                unreachable!("leaf split twice while holding its lock");
                            }
                        }
                        return;
                    }
                }
            }
        };

        for child in children.iter() {
            child.add_shared(ctx, element, extent);
        }
    }

    /// Unlinks `element` from every leaf reachable through nodes that accept
    /// it. Returns whether any leaf referenced it.
    pub(crate) fn remove<T: Insertable>(
        &mut self,
        ctx: &Placement<'_, T>,
        element: ElementId,
        extent: &Aabb,
    ) -> bool {
        if !ctx.accepts(&self.cube, element, extent) {
            return false;
        }

        match self.children.get_mut() {
            Some(children) => children
                .iter_mut()
                .fold(false, |found, child| child.remove(ctx, element, extent) | found),
            None => {
                let list = self.list.get_mut();
                let before = list.len();
                list.retain(|e| *e != element);
                list.len() != before
            }
        }
    }

    pub(crate) fn shrink(&mut self) {
        match self.children.get_mut() {
            Some(children) => children.iter_mut().for_each(Node::shrink),
            None => self.list.get_mut().shrink_to_fit(),
        }
    }

    pub(crate) fn clear_extensions(&mut self) {
        self.extension.take();
        if let Some(children) = self.children.get_mut() {
            children.iter_mut().for_each(Node::clear_extensions);
        }
    }
}
