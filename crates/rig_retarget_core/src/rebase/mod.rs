//! Root-motion rebasing: re-express the motion of one bone onto another
//! bone or onto the armature object, preserving the world transforms of
//! bones that float free of the motion hierarchy.
//!
//! One invocation runs two phases over the action's frame range: a
//! read-only sample pass that records every matrix the bake will need, then
//! a write pass that reconstructs and keys the target. The split keeps the
//! expensive set-frame/read round-trips batched.

use glam::{Mat3, Mat4, Vec3};
use tracing::{debug, warn};

use crate::errors::RebaseError;
use crate::host::{
    ArmatureAccess, KeyChannel, KeyingOptions, PosePosition, RestBone, SceneAccess,
};
use crate::mapping::detect_namespace;
use crate::math::{self, AxisClamp, AxisFlags};
use crate::schema::RoleSchema;

/// What receives the rebased motion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MotionTarget {
    Bone(String),
    Object,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TargetKind {
    Bone,
    Object,
}

impl MotionTarget {
    fn kind(&self) -> TargetKind {
        match self {
            MotionTarget::Bone(_) => TargetKind::Bone,
            MotionTarget::Object => TargetKind::Object,
        }
    }
}

/// Which pose the motion is offset against when `keep_offset` is set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OffsetPolicy {
    /// Offset to the pose at the action's first frame.
    Start,
    /// Offset to the pose at the action's last frame.
    End,
    /// Offset to the rest pose.
    #[default]
    Rest,
}

#[derive(Clone, Debug)]
pub struct RebaseOptions {
    /// The bone whose motion is transferred, usually the hips.
    pub motion_bone: String,
    pub target: MotionTarget,
    pub keep_offset: bool,
    pub offset: OffsetPolicy,
    pub copy_location: AxisFlags,
    pub location_clamp: [AxisClamp; 3],
    pub copy_rotation: AxisFlags,
    pub copy_scale: AxisFlags,
    /// Object target only: a bone that is counter-corrected so it stays put
    /// while the object takes over the motion.
    pub compensate_bone: Option<String>,
}

impl Default for RebaseOptions {
    fn default() -> Self {
        Self {
            motion_bone: String::new(),
            target: MotionTarget::Object,
            keep_offset: false,
            offset: OffsetPolicy::Rest,
            copy_location: AxisFlags::new(true, true, false),
            location_clamp: [AxisClamp::default(); 3],
            copy_rotation: AxisFlags::NONE,
            copy_scale: AxisFlags::NONE,
            compensate_bone: None,
        }
    }
}

/// Per-frame matrices captured by the sample phase and consumed by the
/// bake. Owned by the [`Rebaser`]; never persisted.
#[derive(Debug, Default)]
pub struct SampleCache {
    motion_bone: String,
    target_kind: Option<TargetKind>,
    start: i32,
    end: i32,
    motion: Vec<Mat4>,
    /// Motion relative to the start frame (`current * start⁻¹`).
    delta: Vec<Mat4>,
    /// The un-rebased target transform per frame.
    target: Vec<Mat4>,
    floating: Vec<Vec<Mat4>>,
    floating_bones: Vec<String>,
    start_matrix: Mat4,
    end_matrix: Mat4,
    rest_matrix: Mat4,
    stored: bool,
}

impl SampleCache {
    pub fn invalidate(&mut self) {
        *self = SampleCache::default();
    }

    fn dirty(&self, motion_bone: &str, kind: TargetKind) -> bool {
        !self.stored || self.motion_bone != motion_bone || self.target_kind != Some(kind)
    }
}

#[derive(Debug, Default)]
pub struct RebaseReport {
    pub frames: usize,
    pub floating_bones: Vec<String>,
}

/// Runs rebase operations, memoizing the sample cache between invocations.
/// Changing the motion bone or the target kind invalidates the cache and
/// forces a fresh sample pass.
#[derive(Debug, Default)]
pub struct Rebaser {
    cache: SampleCache,
}

impl Rebaser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(&mut self) -> &mut SampleCache {
        &mut self.cache
    }

    pub fn run<H>(
        &mut self,
        host: &mut H,
        schema: &RoleSchema,
        options: &RebaseOptions,
    ) -> Result<RebaseReport, RebaseError>
    where
        H: ArmatureAccess + SceneAccess,
    {
        let range = host
            .action_range()
            .ok_or_else(|| RebaseError::NoAction(host.name().to_string()))?;
        if !host.has_bone(&options.motion_bone) {
            return Err(RebaseError::MotionBoneMissing(options.motion_bone.clone()));
        }
        if let MotionTarget::Bone(name) = &options.target
            && !host.has_bone(name)
        {
            return Err(RebaseError::TargetBoneMissing(name.clone()));
        }

        if self.cache.dirty(&options.motion_bone, options.target.kind()) {
            debug!(motion_bone = %options.motion_bone, "sample cache stale, resampling");
            self.sample(host, schema, options, range)?;
        }
        self.bake(host, options)
    }

    /// Phase 1: one read-only pass over the frame range.
    fn sample<H>(
        &mut self,
        host: &mut H,
        schema: &RoleSchema,
        options: &RebaseOptions,
        (start, end): (i32, i32),
    ) -> Result<(), RebaseError>
    where
        H: ArmatureAccess + SceneAccess,
    {
        let cache = &mut self.cache;
        cache.invalidate();

        let exclude = match &options.target {
            MotionTarget::Bone(name) => Some(name.as_str()),
            MotionTarget::Object => options.compensate_bone.as_deref(),
        };
        cache.floating_bones = floating_bones(host, schema, &options.motion_bone, exclude);

        let motion_matrix = |host: &H| {
            host.pose_matrix(&options.motion_bone)
                .ok_or_else(|| RebaseError::MotionBoneMissing(options.motion_bone.clone()))
        };

        // Rest anchor, sampled under a scoped switch to the rest pose.
        let original_position = host.pose_position();
        host.set_pose_position(PosePosition::Rest);
        let rest_matrix = motion_matrix(host);
        host.set_pose_position(original_position);
        cache.rest_matrix = rest_matrix?;

        let original_frame = host.current_frame();

        host.set_frame(start);
        cache.start_matrix = motion_matrix(host)?;
        host.set_frame(end);
        cache.end_matrix = motion_matrix(host)?;

        let start_inverse = cache.start_matrix.inverse();
        for frame in start..=end {
            host.set_frame(frame);
            let motion = motion_matrix(host)?;
            cache.motion.push(motion);
            cache.delta.push(motion * start_inverse);
            cache.target.push(match &options.target {
                MotionTarget::Bone(name) => host.pose_matrix(name).unwrap_or(Mat4::IDENTITY),
                MotionTarget::Object => host.world_matrix(),
            });
            cache.floating.push(
                cache
                    .floating_bones
                    .iter()
                    .map(|bone| host.pose_matrix(bone).unwrap_or(Mat4::IDENTITY))
                    .collect(),
            );
        }

        host.set_frame(original_frame);

        cache.start = start;
        cache.end = end;
        cache.motion_bone = options.motion_bone.clone();
        cache.target_kind = Some(options.target.kind());
        cache.stored = true;
        Ok(())
    }

    /// Phase 2: reconstruct and key the target, then re-key floating bones.
    fn bake<H>(&self, host: &mut H, options: &RebaseOptions) -> Result<RebaseReport, RebaseError>
    where
        H: ArmatureAccess + SceneAccess,
    {
        let cache = &self.cache;
        if !cache.stored {
            warn!("no transforms stored, bake skipped");
            return Ok(RebaseReport::default());
        }
        let (start, end) = (cache.start, cache.end);
        let original_frame = host.current_frame();

        let offset_matrix = if options.keep_offset {
            match options.offset {
                OffsetPolicy::Start => cache.start_matrix.inverse(),
                OffsetPolicy::End => cache.end_matrix.inverse(),
                OffsetPolicy::Rest => cache.rest_matrix.inverse(),
            }
        } else {
            Mat4::IDENTITY
        };

        // The target's own transform, frozen at the range start; non-copied
        // axes read from here.
        let reference = cache.target.first().copied().unwrap_or(Mat4::IDENTITY);
        let reference_translation = reference.w_axis.truncate();

        let keying = KeyingOptions::VISUAL_CYCLE;
        let with_scale = options.copy_scale.any();

        host.set_frame(start);
        key_motion_target(host, &options.target, start, keying, with_scale)?;

        for (i, frame) in (start..=end).enumerate() {
            host.set_frame(frame);

            let mut transform = if options.keep_offset && options.offset == OffsetPolicy::Start {
                cache.delta[i]
            } else {
                cache.motion[i] * offset_matrix
            };

            let mut translation = transform.w_axis.truncate();
            for axis in 0..3 {
                if options.copy_location.get(axis) {
                    translation[axis] = options.location_clamp[axis].apply(translation[axis]);
                } else {
                    translation[axis] = reference_translation[axis];
                }
            }

            let rotation_axes = options.copy_rotation;
            if rotation_axes.all() {
                transform.w_axis = translation.extend(1.0);
            } else if rotation_axes.count() < 2 {
                // Rotation is not separable per axis; below two axes it
                // passes through from the un-rebased target.
                let sampled_target = cache.target[i];
                let mut passthrough = if options.keep_offset {
                    let mut offset = sampled_target * offset_matrix;
                    // Keep the original up vector, a sheared frame otherwise.
                    offset.z_axis = sampled_target.z_axis;
                    offset
                } else {
                    sampled_target
                };
                passthrough.w_axis = translation.extend(1.0);
                transform = passthrough;
            } else {
                let mut basis = math::reconstruct_rotation(
                    Mat3::from_mat4(transform),
                    Mat3::from_mat4(reference),
                    rotation_axes,
                );
                if with_scale {
                    basis =
                        math::apply_sampled_scale(basis, Mat3::from_mat4(cache.motion[i]), options.copy_scale);
                }
                transform = math::compose(basis, translation);
            }

            match &options.target {
                MotionTarget::Bone(name) => host.set_pose_matrix(name, transform)?,
                MotionTarget::Object => host.set_world_matrix(transform),
            }
            key_motion_target(host, &options.target, frame, keying, with_scale)?;
        }

        // Floating bones keep their pre-rebase transforms, keyed under the
        // new root motion.
        for (i, frame) in (start..=end).enumerate() {
            host.set_frame(frame);

            if let MotionTarget::Object = options.target {
                if let Some(bone) = options.compensate_bone.as_deref()
                    && host.has_bone(bone)
                {
                    let counter = host.world_matrix().inverse();
                    if let Some(matrix) = host.pose_matrix(bone) {
                        host.set_pose_matrix(bone, counter * matrix)?;
                    }
                }
            }

            let world_inverse = host.world_matrix().inverse();
            for (j, bone) in cache.floating_bones.iter().enumerate() {
                let mut matrix = cache.floating[i][j];
                if options.target.kind() == TargetKind::Object {
                    matrix = world_inverse * matrix;
                }
                host.set_pose_matrix(bone, matrix)?;
                host.key_bone(bone, KeyChannel::Location, frame, KeyingOptions::default())?;
                host.key_bone(bone, KeyChannel::Rotation, frame, KeyingOptions::default())?;
            }
        }

        host.set_frame(original_frame);
        Ok(RebaseReport {
            frames: (end - start + 1).max(0) as usize,
            floating_bones: cache.floating_bones.clone(),
        })
    }
}

fn key_motion_target<H>(
    host: &mut H,
    target: &MotionTarget,
    frame: i32,
    options: KeyingOptions,
    with_scale: bool,
) -> Result<(), RebaseError>
where
    H: ArmatureAccess + SceneAccess,
{
    match target {
        MotionTarget::Bone(name) => {
            host.key_bone(name, KeyChannel::Location, frame, options)?;
            host.key_bone(name, KeyChannel::Rotation, frame, options)?;
            if with_scale {
                host.key_bone(name, KeyChannel::Scale, frame, options)?;
            }
        }
        MotionTarget::Object => {
            host.key_object(KeyChannel::Location, frame, options);
            host.key_object(KeyChannel::Rotation, frame, options);
            if with_scale {
                host.key_object(KeyChannel::Scale, frame, options);
            }
        }
    }
    Ok(())
}

/// A bone floats when neither it nor any ancestor carries a copy binding
/// and its ancestor chain never reaches the motion bone. Floating bones
/// have no other source of positional correction, so the rebaser re-keys
/// them explicitly.
pub fn is_bone_floating<H: ArmatureAccess>(host: &H, bone: &str, motion_bone: &str) -> bool {
    let has_copy_binding =
        |name: &str| host.bindings(name).iter().any(|binding| binding.kind.is_copy());

    if has_copy_binding(bone) {
        return false;
    }
    let mut current = host.rest_bone(bone).and_then(|b| b.parent);
    while let Some(parent) = current {
        if parent == motion_bone {
            return false;
        }
        if has_copy_binding(&parent) {
            return false;
        }
        current = host.rest_bone(&parent).and_then(|b| b.parent);
    }
    true
}

/// Floating bones among the schema's bones, minus the rebase target.
pub fn floating_bones<H: ArmatureAccess>(
    host: &H,
    schema: &RoleSchema,
    motion_bone: &str,
    exclude: Option<&str>,
) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    schema
        .bone_names()
        .into_iter()
        .filter(|name| seen.insert(name.clone()))
        .filter(|name| Some(name.as_str()) != exclude)
        .filter(|name| host.has_bone(name))
        .filter(|name| is_bone_floating(host, name, motion_bone))
        .collect()
}

/// Create a root bone at the origin and reparent the hips under it. The
/// root is sized to three hip lengths; a detected namespace prefix carries
/// over to the new name.
pub fn add_root_bone<H: ArmatureAccess>(
    armature: &mut H,
    hips: &str,
    root_name: &str,
) -> Result<String, RebaseError> {
    let mut root_name =
        if root_name.is_empty() { "Root".to_string() } else { root_name.to_string() };

    let names = armature.bone_names();
    if let Some(prefix) = detect_namespace(names.iter().map(String::as_str))
        && !root_name.contains(':')
    {
        root_name = format!("{prefix}{root_name}");
    }

    let mut hips_bone = armature
        .rest_bone(hips)
        .ok_or_else(|| RebaseError::HipsMissing(hips.to_string()))?;

    let length = hips_bone.length() * 3.0;
    armature.create_bone(
        &root_name,
        RestBone { head: Vec3::ZERO, tail: Vec3::Y * length, roll: 0.0, parent: None },
    )?;

    hips_bone.parent = Some(root_name.clone());
    armature.set_rest_bone(hips, hips_bone)?;
    Ok(root_name)
}
