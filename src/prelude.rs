//! Crate's core types reimports.

pub use crate::{
    bounding::{Aabb, Cube, Plane, Ray},
    node::Node,
    pick::{PickArea, Projection, Rect},
    query::{HitResult, Side},
    split::{DepthThreshold, MaxObjects, SplitContext, SplitPolicy},
    tree::Octree,
    ElementId, Insertable, TreeError,
};
