//! Transform-correcting binding of a source armature to a target armature.
//!
//! For every pair in a [`ConversionMap`] a proxy bone (`{bone}_RET`) is
//! created on the target, positioned under one of four transform-correction
//! policies, and the source bone is then bound to its proxy with
//! constraint-equivalent copy bindings. Proxies live in a dedicated hidden
//! bone collection until [`finalize`] tears them down.

mod status;

pub use status::{BindingStatus, set_binding_status};

use std::collections::HashSet;

use glam::Vec3;
use tracing::warn;

use crate::errors::BindError;
use crate::host::{ArmatureAccess, Binding, BindingKind, BindingTarget, RestBone};
use crate::mapping::ConversionMap;
use crate::math::{self, AxisClamp, AxisFlags};
use crate::rebase::is_bone_floating;
use crate::schema::{RoleSchema, Side, SpineSlot};

pub const PROXY_SUFFIX: &str = "_RET";
pub const LOOK_SUFFIX: &str = "_LOOK";
pub const DEFAULT_PROXY_COLLECTION: &str = "Retarget Bones";

/// How a proxy bone is oriented relative to the rest poses of the two rigs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MatchTransform {
    /// Reproject the source bone's Z axis, optionally carrying object
    /// transforms across.
    #[default]
    None,
    /// Counter the difference between control and deform rest poses.
    /// Assumes similar proportions and Y bone axes.
    BoneOffset,
    /// The source was posed by hand to match the target's rest pose; copy
    /// the posed matrix directly.
    PoseMatch,
    /// Bones share orientation and only position differs; copy
    /// head/tail/roll from the proxy's parent.
    WorldMatch,
}

/// What to do with copy bindings already present on a source bone.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConstraintPolicy {
    #[default]
    Skip,
    Mute,
    Remove,
}

/// Where root motion is taken from and driven to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum RootBinding {
    #[default]
    None,
    /// Drive a source root bone from a target bone. `source` empty means
    /// the schema's root slot.
    Bone { source: String, target: String },
    /// Drive the source armature object itself from a target bone.
    Object { target: String },
}

#[derive(Clone, Debug)]
pub struct RootMotionSettings {
    pub binding: RootBinding,
    pub copy_location: AxisFlags,
    pub location_clamp: [AxisClamp; 3],
    pub copy_rotation: AxisFlags,
}

impl Default for RootMotionSettings {
    fn default() -> Self {
        Self {
            binding: RootBinding::None,
            copy_location: AxisFlags::new(true, true, false),
            location_clamp: [AxisClamp::default(); 3],
            copy_rotation: AxisFlags::NONE,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BindOptions {
    pub match_transform: MatchTransform,
    /// Carry the two objects' world transforms into the proxy when they
    /// differ.
    pub match_object_transform: bool,
    pub only_selected: bool,
    pub location_bindings: bool,
    pub rotation_bindings: bool,
    /// Unparented bones always get location and rotation bindings; nothing
    /// else corrects their position.
    pub bind_floating: bool,
    /// Rotation-only bindings on fingers, so stretchy chains don't
    /// double-scale.
    pub no_finger_location: bool,
    pub constraint_policy: ConstraintPolicy,
    /// Synthesize `_LOOK` aim bones on IK limbs and drive the proxy with a
    /// track binding, correcting chain direction without IK solving.
    pub look_at: bool,
    pub copy_ik_roll_hands: bool,
    pub copy_ik_roll_feet: bool,
    pub proxy_collection: String,
    pub root: RootMotionSettings,
    /// Scale the target object so the named spine bone matches the source's
    /// height.
    pub fit_height: Option<SpineSlot>,
    pub adjust_location: bool,
    /// Control-to-deform bone correspondence used by
    /// [`MatchTransform::BoneOffset`]. A missing deform bone silently falls
    /// back to the control bone.
    pub deform_map: Option<ConversionMap>,
}

impl Default for BindOptions {
    fn default() -> Self {
        Self {
            match_transform: MatchTransform::None,
            match_object_transform: true,
            only_selected: false,
            location_bindings: false,
            rotation_bindings: true,
            bind_floating: true,
            no_finger_location: false,
            constraint_policy: ConstraintPolicy::Skip,
            look_at: false,
            copy_ik_roll_hands: false,
            copy_ik_roll_feet: false,
            proxy_collection: DEFAULT_PROXY_COLLECTION.into(),
            root: RootMotionSettings::default(),
            fit_height: None,
            adjust_location: true,
            deform_map: None,
        }
    }
}

impl BindOptions {
    fn copy_kinds(&self) -> Vec<BindingKind> {
        let mut kinds = vec![];
        if self.location_bindings {
            kinds.push(BindingKind::CopyLocation);
        }
        if self.rotation_bindings {
            kinds.push(BindingKind::CopyRotation);
        }
        kinds
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    SourceMissing,
    TargetMissing(String),
    AlreadyBound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindSkip {
    pub bone: String,
    pub reason: SkipReason,
}

/// Aggregate outcome of one bind run. Skips never abort the batch; they
/// accumulate here.
#[derive(Debug, Default)]
pub struct BindReport {
    /// Proxy bones created on the target.
    pub proxies: Vec<String>,
    /// Source bones that received bindings.
    pub bound: Vec<String>,
    pub skipped: Vec<BindSkip>,
}

enum RootOwner {
    Bone(String),
    Object,
}

/// Bind `source` to `target` through `map`.
///
/// Callers that deal with namespaced rigs should run
/// [`detect_namespace`](crate::mapping::detect_namespace) and
/// [`RoleSchema::apply_namespace`] before building the map.
pub fn bind<S, T>(
    source: &mut S,
    target: &mut T,
    src_schema: &RoleSchema,
    trg_schema: &RoleSchema,
    map: &ConversionMap,
    options: &BindOptions,
) -> Result<BindReport, BindError>
where
    S: ArmatureAccess,
    T: ArmatureAccess,
{
    let mut report = BindReport::default();
    let mut map = map.clone();

    if let Some(slot) = options.fit_height {
        fit_target_height(source, target, src_schema, trg_schema, slot, options)?;
    }

    // Root handling rewrites the map before anything is created.
    let schema_root = (!src_schema.root.is_empty()).then(|| src_schema.root.clone());
    let mut root_source: Option<String> = None;
    match &options.root.binding {
        RootBinding::None => {
            if let Some(root) = &schema_root {
                map.remove(root);
            }
        }
        RootBinding::Bone { source: src_root, target: trg_root } => {
            let src_root = if src_root.is_empty() {
                schema_root.clone()
            } else {
                Some(src_root.clone())
            };
            if let Some(src_root) = src_root {
                if let Some(old) = &schema_root
                    && *old != src_root
                {
                    map.remove(old);
                }
                map.insert_override(&src_root, trg_root);
                root_source = Some(src_root);
            }
        }
        RootBinding::Object { .. } => {
            // The source root bone still gets a proxy, parented to nothing.
            if let Some(root) = &schema_root {
                let mapped = map.get(root).unwrap_or_default().to_string();
                map.insert_override(root, mapped);
                root_source = Some(root.clone());
            }
        }
    }

    if options.only_selected {
        let selected: HashSet<String> = source
            .bone_names()
            .into_iter()
            .filter(|name| source.bone_selected(name))
            .collect();
        map.retain(|src, _| selected.contains(src));
    }

    let object_root = matches!(options.root.binding, RootBinding::Object { .. });
    let copy_kinds = options.copy_kinds();

    // Hold the target object in place while proxies are measured against it.
    let held = if options.match_transform == MatchTransform::PoseMatch {
        0
    } else {
        hold_in_place(target)
    };

    target.create_collection(&options.proxy_collection, false);

    let mut look_ats: Vec<(String, String)> = vec![];
    for (src_name, trg_name) in map.iter().map(|(s, t)| (s.to_string(), t.to_string())).collect::<Vec<_>>() {
        if options.constraint_policy == ConstraintPolicy::Skip
            && bone_bound_already(source, &src_name, &copy_kinds)
        {
            report.skipped.push(BindSkip { bone: src_name, reason: SkipReason::AlreadyBound });
            continue;
        }

        let is_object_root = object_root && Some(&src_name) == root_source.as_ref();
        if trg_name.is_empty() && !is_object_root {
            continue;
        }

        let Some(src_rest) = source.rest_bone(&src_name) else {
            report.skipped.push(BindSkip { bone: src_name.clone(), reason: SkipReason::SourceMissing });
            continue;
        };
        let mut proxy = src_rest.clone();
        proxy.parent = None;

        let trg_rest = target.rest_bone(&trg_name);
        if trg_rest.is_none() && !is_object_root {
            warn!(bone = %trg_name, "not found in target, pair skipped");
            report
                .skipped
                .push(BindSkip { bone: src_name.clone(), reason: SkipReason::TargetMissing(trg_name.clone()) });
            continue;
        }

        match options.match_transform {
            MatchTransform::BoneOffset => {
                let def_bone = options
                    .deform_map
                    .as_ref()
                    .and_then(|deform| deform.get(&src_name))
                    .and_then(|def_name| source.rest_bone(def_name))
                    .unwrap_or_else(|| src_rest.clone());
                let def_z = def_bone.z_axis();

                proxy.transform(def_bone.matrix().inverse());
                if options.match_object_transform {
                    proxy.transform(source.world_matrix());
                }
                proxy.transform(target.world_matrix().inverse());

                if let Some(trg_rest) = &trg_rest {
                    // Realign the target bone's roll to the deform Z axis
                    // only for this composition; the real bone keeps its
                    // roll.
                    let mut aligned = trg_rest.clone();
                    aligned.roll = math::roll_to_align(aligned.head, aligned.tail, def_z);
                    proxy.transform(aligned.matrix());
                    proxy.roll = math::roll_to_align(trg_rest.head, trg_rest.tail, def_z);
                }
            }
            MatchTransform::PoseMatch => {
                if let Some(posed) = source.pose_matrix(&src_name) {
                    proxy.set_from_matrix(posed);
                }
                if options.match_object_transform {
                    proxy.transform(source.world_matrix());
                }
                proxy.transform(target.world_matrix().inverse());
            }
            MatchTransform::WorldMatch => {
                if let Some(trg_rest) = &trg_rest {
                    proxy.head = trg_rest.head;
                    proxy.tail = trg_rest.tail;
                    proxy.roll = trg_rest.roll;
                }
                if options.match_object_transform {
                    proxy.transform(source.world_matrix());
                }
            }
            MatchTransform::None => {
                let src_local = proxy.matrix();
                let z_axis = glam::Mat3::from_mat4(src_local)
                    .inverse()
                    .transpose()
                    .mul_vec3(Vec3::Z)
                    .normalize_or_zero();
                proxy.roll = math::roll_to_align(proxy.head, proxy.tail, z_axis);

                if options.match_object_transform {
                    proxy.transform(source.world_matrix());
                    proxy.transform(target.world_matrix().inverse());
                }
            }
        }

        if (options.copy_ik_roll_hands && is_ik_hand(src_schema, &src_name))
            || (options.copy_ik_roll_feet && is_ik_foot(src_schema, &src_name))
        {
            // The IK target's own orientation wins over the computed one.
            proxy.roll = math::roll_to_align(proxy.head, proxy.tail, src_rest.z_axis());
        }

        proxy.parent = trg_rest.is_some().then(|| trg_name.clone());

        let proxy_name = format!("{src_name}{PROXY_SUFFIX}");
        if target.has_bone(&proxy_name) {
            target.remove_bone(&proxy_name)?;
        }
        target.create_bone(&proxy_name, proxy)?;
        target.assign_collection(&proxy_name, &options.proxy_collection)?;
        report.proxies.push(proxy_name);

        if options.look_at
            && let Some(mid_name) = look_at_mid_bone(src_schema, trg_schema, &src_name)
            && let Some(mid) = target.rest_bone(&mid_name)
        {
            // Aim helper at twice the distance from the mid joint, pointing
            // away from the chain.
            let look = RestBone {
                head: mid.head,
                tail: mid.head * 2.0 - mid.tail,
                roll: 0.0,
                parent: Some(mid_name.clone()),
            };
            let look_name = format!("{mid_name}{LOOK_SUFFIX}");
            if target.has_bone(&look_name) {
                target.remove_bone(&look_name)?;
            }
            target.create_bone(&look_name, look)?;
            target.assign_collection(&look_name, &options.proxy_collection)?;
            look_ats.push((src_name.clone(), look_name));
        }
    }

    release_hold(target, held);

    for (src_name, look_name) in look_ats {
        let proxy_name = format!("{src_name}{PROXY_SUFFIX}");
        if target.has_bone(&proxy_name) {
            target.add_binding(
                &proxy_name,
                Binding::track_to(
                    BindingTarget { object: target.name().to_string(), bone: Some(look_name) },
                    1.0,
                ),
            )?;
        }
    }

    let finger_bones = finger_bone_set(src_schema);
    let hips = src_schema.spine.hips.clone();
    let mut constrained_root: Option<RootOwner> = None;

    for src_name in map.sources().map(str::to_string).collect::<Vec<_>>() {
        if Some(&src_name) == root_source.as_ref() {
            match &options.root.binding {
                RootBinding::None => continue,
                RootBinding::Bone { target, .. } if target.is_empty() => continue,
                _ => {}
            }
        }

        if !source.has_bone(&src_name) {
            continue;
        }

        let existing = source.bindings(&src_name);
        let already = existing.iter().any(|b| copy_kinds.contains(&b.kind));
        if already {
            match options.constraint_policy {
                ConstraintPolicy::Skip => continue,
                ConstraintPolicy::Mute => {
                    for (index, binding) in existing.iter().enumerate() {
                        if copy_kinds.contains(&binding.kind) {
                            source.set_binding_muted(&src_name, index, true);
                        }
                    }
                }
                ConstraintPolicy::Remove => {
                    for (index, binding) in existing.iter().enumerate().rev() {
                        if copy_kinds.contains(&binding.kind) {
                            source.remove_binding(&src_name, index);
                        }
                    }
                }
            }
        }

        let kinds: Vec<BindingKind> = if !options.location_bindings
            && options.bind_floating
            && is_bone_floating(source, &src_name, &hips)
        {
            vec![BindingKind::CopyLocation, BindingKind::CopyRotation]
        } else if options.no_finger_location && finger_bones.contains(src_name.as_str()) {
            vec![BindingKind::CopyRotation]
        } else {
            copy_kinds.clone()
        };

        let proxy_name = format!("{src_name}{PROXY_SUFFIX}");
        let subtarget = target.has_bone(&proxy_name).then_some(proxy_name);
        for kind in kinds {
            source.add_binding(
                &src_name,
                Binding::copy(
                    kind,
                    BindingTarget { object: target.name().to_string(), bone: subtarget.clone() },
                ),
            )?;
        }
        report.bound.push(src_name.clone());

        if matches!(options.root.binding, RootBinding::Bone { .. })
            && Some(&src_name) == root_source.as_ref()
        {
            constrained_root = Some(RootOwner::Bone(src_name.clone()));
        }
    }

    if let RootBinding::Object { target: root_bone } = &options.root.binding
        && !root_bone.is_empty()
    {
        if !target.has_bone(root_bone) {
            return Err(BindError::RootBoneMissing(root_bone.clone()));
        }
        let binding_target =
            BindingTarget { object: target.name().to_string(), bone: Some(root_bone.clone()) };
        source.add_object_binding(Binding::copy(BindingKind::CopyLocation, binding_target.clone()));
        if options.root.copy_rotation.any() {
            source.add_object_binding(Binding::copy(BindingKind::CopyRotation, binding_target));
        }
        constrained_root = Some(RootOwner::Object);
    }

    if let Some(owner) = &constrained_root {
        apply_root_limits(source, target, owner, &options.root);
    }

    Ok(report)
}

/// Remove proxy-driven bindings from the source, then delete the proxy
/// bones and their collection from the target. Call after the driven pose
/// has been baked down to keyframes.
pub fn finalize<S, T>(source: &mut S, target: &mut T, collection: &str)
where
    S: ArmatureAccess,
    T: ArmatureAccess,
{
    let points_at_proxy = |binding: &Binding| {
        binding.target.as_ref().is_some_and(|t| {
            t.object == target.name()
                && t.bone.as_deref().is_none_or(|b| b.ends_with(PROXY_SUFFIX))
        })
    };

    for bone in source.bone_names() {
        let bindings = source.bindings(&bone);
        for (index, binding) in bindings.iter().enumerate().rev() {
            if binding.kind.is_copy() && points_at_proxy(binding) {
                source.remove_binding(&bone, index);
            }
        }
    }
    let object_bindings = source.object_bindings();
    for (index, binding) in object_bindings.iter().enumerate().rev() {
        if binding.kind.is_copy() && binding.target.as_ref().is_some_and(|t| t.object == target.name()) {
            source.remove_object_binding(index);
        }
    }

    for bone in target.collection_bones(collection) {
        if let Err(error) = target.remove_bone(&bone) {
            warn!(%bone, %error, "could not delete proxy bone");
        }
    }
    target.remove_collection(collection);
}

/// Bones carrying at least one copy binding; hosts use this to select the
/// controls worth baking.
pub fn constrained_control_names(armature: &impl ArmatureAccess) -> Vec<String> {
    armature
        .bone_names()
        .into_iter()
        .filter(|bone| armature.bindings(bone).iter().any(|binding| binding.kind.is_copy()))
        .collect()
}

fn bone_bound_already(
    armature: &impl ArmatureAccess,
    bone: &str,
    kinds: &[BindingKind],
) -> bool {
    armature.bindings(bone).iter().any(|binding| kinds.contains(&binding.kind))
}

/// Pin the target object with limit bindings while proxies are created,
/// returning how many were added.
fn hold_in_place(target: &mut impl ArmatureAccess) -> usize {
    let zero = [Some(0.0); 3];
    target.add_object_binding(Binding::limit(BindingKind::LimitRotation, zero, zero));
    target.add_object_binding(Binding::limit(BindingKind::LimitLocation, zero, zero));
    2
}

fn release_hold(target: &mut impl ArmatureAccess, count: usize) {
    let total = target.object_bindings().len();
    for index in (total - count..total).rev() {
        target.remove_object_binding(index);
    }
}

fn fit_target_height<S, T>(
    source: &mut S,
    target: &mut T,
    src_schema: &RoleSchema,
    trg_schema: &RoleSchema,
    slot: SpineSlot,
    options: &BindOptions,
) -> Result<(), BindError>
where
    S: ArmatureAccess,
    T: ArmatureAccess,
{
    let trg_name = trg_schema.spine.get(slot);
    let src_name = src_schema.spine.get(slot);
    let (Some(trg_rest), Some(src_rest)) = (target.rest_bone(trg_name), source.rest_bone(src_name))
    else {
        // Reference bone missing on either side: height fitting is skipped,
        // binding continues.
        return Ok(());
    };

    let trg_height = target.world_matrix().transform_point3(trg_rest.head).z;
    let src_height = source.world_matrix().transform_point3(src_rest.head).z;
    if trg_height.abs() < math::LENGTH_EPSILON {
        return Err(BindError::DegenerateHeight(trg_name.to_string()));
    }

    let ratio = src_height / trg_height;
    target.mute_object_scale_channels();
    target.scale_object(ratio);

    let (scale, _, _) = target.world_matrix().to_scale_rotation_translation();
    let min = [Some(scale.x), Some(scale.y), Some(scale.z)];
    target.add_object_binding(Binding::limit(BindingKind::LimitScale, min, min));

    if options.adjust_location {
        // Keep keyed object motion in place under the new scale.
        target.scale_object_location_keys(1.0 / ratio);
    }
    Ok(())
}

fn apply_root_limits<S, T>(
    source: &mut S,
    target: &T,
    owner: &RootOwner,
    settings: &RootMotionSettings,
) where
    S: ArmatureAccess,
    T: ArmatureAccess,
{
    let clamps_used = settings.location_clamp.iter().any(|c| c.min.is_some() || c.max.is_some())
        || !settings.copy_location.all();

    if clamps_used {
        let mut min = [None; 3];
        let mut max = [None; 3];
        for axis in 0..3 {
            let copied = settings.copy_location.get(axis);
            // A non-copied axis is pinned to zero instead of clamped.
            min[axis] = if copied { settings.location_clamp[axis].min } else { Some(0.0) };
            max[axis] = if copied { settings.location_clamp[axis].max } else { Some(0.0) };
        }
        let limit = Binding::limit(BindingKind::LimitLocation, min, max);
        upsert_binding(source, owner, BindingKind::LimitLocation, limit);
    }

    let existing = match owner {
        RootOwner::Bone(bone) => source.bindings(bone),
        RootOwner::Object => source.object_bindings(),
    };
    let rotation_index = existing.iter().rposition(|b| b.kind == BindingKind::CopyRotation);
    match rotation_index {
        Some(index) => {
            let mut binding = existing[index].clone();
            binding.axes = settings.copy_rotation;
            match owner {
                RootOwner::Bone(bone) => {
                    let _ = source.set_binding(bone, index, binding);
                }
                RootOwner::Object => source.set_object_binding(index, binding),
            }
        }
        None => {
            let mut binding = Binding::copy(
                BindingKind::CopyRotation,
                BindingTarget { object: target.name().to_string(), bone: None },
            );
            binding.axes = settings.copy_rotation;
            match owner {
                RootOwner::Bone(bone) => {
                    let _ = source.add_binding(bone, binding);
                }
                RootOwner::Object => source.add_object_binding(binding),
            }
        }
    }
}

fn upsert_binding(
    source: &mut impl ArmatureAccess,
    owner: &RootOwner,
    kind: BindingKind,
    binding: Binding,
) {
    let existing = match owner {
        RootOwner::Bone(bone) => source.bindings(bone),
        RootOwner::Object => source.object_bindings(),
    };
    match existing.iter().rposition(|b| b.kind == kind) {
        Some(index) => match owner {
            RootOwner::Bone(bone) => {
                let _ = source.set_binding(bone, index, binding);
            }
            RootOwner::Object => source.set_object_binding(index, binding),
        },
        None => match owner {
            RootOwner::Bone(bone) => {
                let _ = source.add_binding(bone, binding);
            }
            RootOwner::Object => source.add_object_binding(binding),
        },
    }
}

fn is_ik_hand(schema: &RoleSchema, bone: &str) -> bool {
    Side::BOTH
        .iter()
        .any(|side| schema.arm_ik(*side).is_some_and(|arm| arm.hand == bone))
}

fn is_ik_foot(schema: &RoleSchema, bone: &str) -> bool {
    Side::BOTH
        .iter()
        .any(|side| schema.leg_ik(*side).is_some_and(|leg| leg.foot == bone))
}

/// When `src` is the upper bone of an IK limb, the target-side mid bone the
/// aim helper should hang off.
fn look_at_mid_bone(
    src_schema: &RoleSchema,
    trg_schema: &RoleSchema,
    src: &str,
) -> Option<String> {
    for side in Side::BOTH {
        if src_schema.arm_ik(side).is_some_and(|arm| arm.upper == src) {
            let mid = trg_schema.arm_ik(side)?.forearm.clone();
            return (!mid.is_empty()).then_some(mid);
        }
        if src_schema.leg_ik(side).is_some_and(|leg| leg.upper == src) {
            let mid = trg_schema.leg_ik(side)?.lower.clone();
            return (!mid.is_empty()).then_some(mid);
        }
    }
    None
}

fn finger_bone_set(schema: &RoleSchema) -> HashSet<&str> {
    let mut bones = HashSet::new();
    for side in Side::BOTH {
        for finger in crate::schema::Finger::ALL {
            bones.extend(schema.fingers(side).get(finger).iter().map(String::as_str));
        }
    }
    bones
}
