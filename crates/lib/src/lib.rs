//! riglua-lib: core types and logic for rig.lua
//!
//! rig.lua drives a Linux workstation from a declarative Lua config:
//! - `manifest`: the desired-state model ([`manifest::DesiredState`])
//! - `probe`: read-only queries of actual host state
//! - `plan`: the diff engine producing an ordered action plan
//! - `execute`: the sequential executor and `apply` orchestration
//! - `report`: the durable run log and end-of-run summary
//! - `system`: collaborator interfaces over the host's own tooling

pub mod consts;
pub mod context;
pub mod eval;
pub mod execute;
pub mod lua;
pub mod manifest;
pub mod placeholder;
pub mod plan;
pub mod platform;
pub mod probe;
pub mod report;
pub mod run_lock;
pub mod system;
