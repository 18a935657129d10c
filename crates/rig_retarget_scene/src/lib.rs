//! # Rig Retarget Scene
//!
//! In-memory reference implementation of the host accessor contracts from
//! `rig_retarget_core`: armature objects with rest bones, pose evaluation
//! driven by keyframed actions, binding evaluation, and visual/cycle-aware
//! keying. The integration tests for the whole retargeting pipeline run
//! against this host, and it doubles as a template for adapters to real
//! DCCs.

mod action;
mod armature;

pub use action::{Action, FCurve, Keyframe};
pub use armature::Armature;
