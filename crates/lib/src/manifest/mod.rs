//! Desired-state model.
//!
//! The [`DesiredState`] is the central data structure of rig.lua: an ordered
//! list of [`ResourceSpec`]s produced by evaluating the Lua configuration.
//! Order is meaningful and preserved all the way into the plan.

mod types;

pub use types::{
  DesiredState, DotfileSpec, MountSpec, PackageSetSpec, PackageSwapSpec, Precondition, RepoOp, RepositorySpec,
  ResourceId, ResourceKind, ResourceParams, ResourceSpec, ServiceSpec, ServiceTarget, SnapshotConfigSpec,
  SnapshotSpec,
};
