//! # Rig Retarget Core
//!
//! Retargeting of skeletal animation between humanoid rigs with different
//! bone names, bind poses and proportions. The pipeline has three stages:
//!
//! - [`schema`]: a [`RoleSchema`](schema::RoleSchema) assigns bone names to a
//!   fixed set of anatomical roles (spine chain, arms and legs with optional
//!   IK variants, fingers, simple face, root). Presets for common rigs live
//!   in [`schema::presets`] and can be loaded from RON.
//! - [`mapping`]: two filled-in schemas produce a
//!   [`ConversionMap`](mapping::ConversionMap), the ordered source-to-target
//!   bone-name correspondence.
//! - [`bind`]: consumes a conversion map and creates transform-corrected
//!   proxy bones (`{bone}_RET`) on the target armature, plus the
//!   constraint-equivalent bindings that make the source follow them.
//! - [`rebase`]: re-expresses root/world motion captured on one bone or
//!   object onto another, preserving the world transforms of bones that
//!   float free of the motion hierarchy.
//! - [`naming`]: renames bones between naming conventions and propagates the
//!   renames into driver expressions and action channels.
//!
//! The core never talks to a scene graph directly; all reads and writes go
//! through the accessor traits in [`host`]. `rig_retarget_scene` provides an
//! in-memory implementation used by the test suite.

pub mod bind;
pub mod errors;
pub mod host;
pub mod mapping;
pub mod math;
pub mod naming;
pub mod rebase;
pub mod schema;

pub mod prelude {
    pub use crate::bind::{
        BindOptions, BindReport, BindSkip, BindingStatus, ConstraintPolicy,
        DEFAULT_PROXY_COLLECTION, LOOK_SUFFIX, MatchTransform, PROXY_SUFFIX, RootBinding,
        RootMotionSettings, SkipReason, bind, constrained_control_names, finalize,
        set_binding_status,
    };
    pub use crate::errors::{BindError, HostError, MappingError, RebaseError};
    pub use crate::host::{
        ArmatureAccess, Binding, BindingKind, BindingTarget, KeyChannel, KeyingOptions,
        PosePosition, RestBone, SceneAccess,
    };
    pub use crate::mapping::{ConversionMap, detect_namespace};
    pub use crate::math::{AxisClamp, AxisFlags};
    pub use crate::naming::{rename_bones, revert_dot_names};
    pub use crate::rebase::{
        MotionTarget, OffsetPolicy, RebaseOptions, Rebaser, add_root_bone, is_bone_floating,
    };
    pub use crate::schema::{
        ArmSlot, FaceSlot, Finger, LegSlot, LimbVariant, RoleSchema, Side, Slot, SpineSlot,
        presets,
    };
}
