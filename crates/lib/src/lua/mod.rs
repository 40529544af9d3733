//! Lua runtime for configuration evaluation.
//!
//! Configuration files declare resources through the `rig` global; each
//! registration function appends a typed [`ResourceSpec`] to the shared
//! [`DesiredState`] being built.
//!
//! [`ResourceSpec`]: crate::manifest::ResourceSpec
//! [`DesiredState`]: crate::manifest::DesiredState

pub mod globals;
pub mod runtime;
