//! Accessor contracts expected from the hosting environment.
//!
//! The core owns no scene graph. Everything it reads or writes — bones,
//! bindings, keyframes, the frame pointer — goes through [`ArmatureAccess`]
//! and [`SceneAccess`]. `rig_retarget_scene` implements them in memory;
//! real DCC integrations supply their own adapters.

use glam::{Mat4, Vec3};

use crate::errors::HostError;
use crate::math::{self, AxisFlags};

/// Rest-pose (edit) data for one bone, in armature space.
#[derive(Clone, Debug, PartialEq)]
pub struct RestBone {
    pub head: Vec3,
    pub tail: Vec3,
    pub roll: f32,
    pub parent: Option<String>,
}

impl RestBone {
    pub fn length(&self) -> f32 {
        (self.tail - self.head).length()
    }

    /// Armature-space rest matrix.
    pub fn matrix(&self) -> Mat4 {
        math::bone_matrix(self.head, self.tail, self.roll)
    }

    pub fn z_axis(&self) -> Vec3 {
        math::bone_basis(self.head, self.tail, self.roll).z_axis
    }

    /// Apply an armature-space transform to head and tail, re-deriving the
    /// roll so the Z axis follows the rotation.
    pub fn transform(&mut self, matrix: Mat4) {
        let z_axis = self.z_axis();
        self.head = matrix.transform_point3(self.head);
        self.tail = matrix.transform_point3(self.tail);
        let rotated_z = matrix.transform_vector3(z_axis).normalize_or_zero();
        self.roll = math::roll_to_align(self.head, self.tail, rotated_z);
    }

    /// Place the bone on a posed matrix, keeping its current length.
    pub fn set_from_matrix(&mut self, matrix: Mat4) {
        let length = self.length().max(math::LENGTH_EPSILON);
        let head = matrix.w_axis.truncate();
        let y_axis = matrix.y_axis.truncate().normalize_or_zero();
        let z_axis = matrix.z_axis.truncate().normalize_or_zero();
        self.head = head;
        self.tail = head + y_axis * length;
        self.roll = math::roll_to_align(self.head, self.tail, z_axis);
    }
}

/// Transform channel a binding copies or limits.
///
/// `TrackTo` is a locked track: the owner's Y stays put while it yaws so
/// that its negative Z aims at the target point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingKind {
    CopyLocation,
    CopyRotation,
    CopyScale,
    LimitLocation,
    LimitRotation,
    LimitScale,
    TrackTo,
}

impl BindingKind {
    /// Kinds that make the owner follow another bone; these are what makes
    /// a bone count as "bound" for skip policies and floating
    /// classification.
    pub fn is_copy(self) -> bool {
        matches!(
            self,
            BindingKind::CopyLocation | BindingKind::CopyRotation | BindingKind::CopyScale
        )
    }
}

/// The driver end of a binding: an object, optionally narrowed to a bone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindingTarget {
    pub object: String,
    pub bone: Option<String>,
}

/// A constraint-equivalent binding. Per-axis fields are interpreted by
/// kind: copies honor `axes`, limits honor `min`/`max`, track-to honors
/// `head_tail`.
#[derive(Clone, Debug, PartialEq)]
pub struct Binding {
    pub kind: BindingKind,
    pub target: Option<BindingTarget>,
    pub axes: AxisFlags,
    pub min: [Option<f32>; 3],
    pub max: [Option<f32>; 3],
    pub head_tail: f32,
    pub muted: bool,
}

impl Binding {
    pub fn copy(kind: BindingKind, target: BindingTarget) -> Self {
        Self {
            kind,
            target: Some(target),
            axes: AxisFlags::ALL,
            min: [None; 3],
            max: [None; 3],
            head_tail: 0.0,
            muted: false,
        }
    }

    pub fn limit(kind: BindingKind, min: [Option<f32>; 3], max: [Option<f32>; 3]) -> Self {
        Self {
            kind,
            target: None,
            axes: AxisFlags::ALL,
            min,
            max,
            head_tail: 0.0,
            muted: false,
        }
    }

    pub fn track_to(target: BindingTarget, head_tail: f32) -> Self {
        Self {
            kind: BindingKind::TrackTo,
            target: Some(target),
            axes: AxisFlags::ALL,
            min: [None; 3],
            max: [None; 3],
            head_tail,
            muted: false,
        }
    }
}

/// REST shows the bind pose, POSE the animated/constrained pose.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PosePosition {
    Rest,
    Pose,
}

/// Keyframe insertion behavior.
///
/// `visual` records the final evaluated transform rather than the raw
/// channel values; `cycle_aware` coalesces keys at the two ends of a
/// looping range instead of duplicating them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeyingOptions {
    pub visual: bool,
    pub cycle_aware: bool,
}

impl KeyingOptions {
    pub const VISUAL_CYCLE: KeyingOptions = KeyingOptions { visual: true, cycle_aware: true };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyChannel {
    Location,
    Rotation,
    Scale,
}

/// Read/write access to one armature object: structure, rest pose, current
/// pose, bindings, collections and driver paths.
pub trait ArmatureAccess {
    fn name(&self) -> &str;

    fn world_matrix(&self) -> Mat4;
    fn set_world_matrix(&mut self, matrix: Mat4);
    /// Multiply the object's scale channels uniformly.
    fn scale_object(&mut self, factor: f32);
    /// Disable the object's keyed scale channels, if any.
    fn mute_object_scale_channels(&mut self);
    /// Multiply the values of the object's keyed location channels.
    fn scale_object_location_keys(&mut self, factor: f32);

    fn bone_names(&self) -> Vec<String>;
    fn has_bone(&self, name: &str) -> bool {
        self.rest_bone(name).is_some()
    }
    fn rest_bone(&self, name: &str) -> Option<RestBone>;
    fn set_rest_bone(&mut self, name: &str, bone: RestBone) -> Result<(), HostError>;
    fn create_bone(&mut self, name: &str, bone: RestBone) -> Result<(), HostError>;
    fn remove_bone(&mut self, name: &str) -> Result<(), HostError>;
    fn rename_bone(&mut self, old: &str, new: &str) -> Result<(), HostError>;
    fn bone_selected(&self, name: &str) -> bool;

    /// Armature-space rest matrix (`None` for a missing bone).
    fn rest_matrix(&self, name: &str) -> Option<Mat4> {
        self.rest_bone(name).map(|bone| bone.matrix())
    }
    /// Armature-space posed matrix, evaluated at the current frame.
    fn pose_matrix(&self, name: &str) -> Option<Mat4>;
    /// Set the posed matrix; channels are derived by inverting the rest and
    /// parent contributions.
    fn set_pose_matrix(&mut self, name: &str, matrix: Mat4) -> Result<(), HostError>;

    fn bindings(&self, bone: &str) -> Vec<Binding>;
    fn add_binding(&mut self, bone: &str, binding: Binding) -> Result<(), HostError>;
    fn set_binding(&mut self, bone: &str, index: usize, binding: Binding)
    -> Result<(), HostError>;
    fn set_binding_muted(&mut self, bone: &str, index: usize, muted: bool);
    fn remove_binding(&mut self, bone: &str, index: usize);

    fn object_bindings(&self) -> Vec<Binding>;
    fn add_object_binding(&mut self, binding: Binding);
    fn set_object_binding(&mut self, index: usize, binding: Binding);
    fn remove_object_binding(&mut self, index: usize);

    /// Create a bone collection if absent. Visibility only applies on
    /// creation.
    fn create_collection(&mut self, name: &str, visible: bool);
    fn remove_collection(&mut self, name: &str);
    /// Assign a bone to a collection, removing it from any other.
    fn assign_collection(&mut self, bone: &str, collection: &str) -> Result<(), HostError>;
    fn collection_bones(&self, name: &str) -> Vec<String>;

    /// Data-path strings of the armature's driver expressions.
    fn driver_paths(&self) -> Vec<String>;
    fn set_driver_path(&mut self, index: usize, path: String);
}

/// Scene-level animation services for an armature: the frame pointer, the
/// rest/pose switch, action channels and keyframe insertion.
pub trait SceneAccess {
    fn current_frame(&self) -> i32;
    /// Move the frame pointer; the pose is re-evaluated.
    fn set_frame(&mut self, frame: i32);

    fn pose_position(&self) -> PosePosition;
    fn set_pose_position(&mut self, position: PosePosition);

    /// First and last keyed frame of the active action.
    fn action_range(&self) -> Option<(i32, i32)>;

    fn key_bone(
        &mut self,
        bone: &str,
        channel: KeyChannel,
        frame: i32,
        options: KeyingOptions,
    ) -> Result<(), HostError>;
    fn key_object(&mut self, channel: KeyChannel, frame: i32, options: KeyingOptions);

    fn action_names(&self) -> Vec<String>;
    /// An action validates when at least one of its channels resolves
    /// against this object.
    fn action_validates(&self, action: &str) -> bool;
    fn action_groups(&self, action: &str) -> Vec<String>;
    /// Rename a channel group and substitute the name inside its channels'
    /// data paths.
    fn rename_action_group(&mut self, action: &str, old: &str, new: &str);
}
