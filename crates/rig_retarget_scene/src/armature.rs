//! In-memory armature object implementing the core host contracts.
//!
//! The model mirrors the accessor semantics the core expects from a DCC:
//! rest bones with head/tail/roll, per-bone pose channels driven by the
//! active action, hierarchy composition
//! (`pose = parent_pose * parent_rest⁻¹ * rest * basis`), binding
//! evaluation, and visual/cycle-aware keyframe insertion.
//!
//! Bindings targeting a different object are stored but not evaluated;
//! cross-object evaluation belongs to a real host.

use glam::{EulerRot, Mat3, Mat4, Quat, Vec3};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

use rig_retarget_core::errors::HostError;
use rig_retarget_core::host::{
    ArmatureAccess, Binding, BindingKind, KeyChannel, KeyingOptions, PosePosition, RestBone,
    SceneAccess,
};
use rig_retarget_core::math;

use crate::action::Action;

#[derive(Clone, Copy, Debug)]
struct Channels {
    location: Vec3,
    rotation: Quat,
    scale: Vec3,
}

impl Default for Channels {
    fn default() -> Self {
        Self { location: Vec3::ZERO, rotation: Quat::IDENTITY, scale: Vec3::ONE }
    }
}

impl Channels {
    fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.location)
    }

    fn from_matrix(matrix: Mat4) -> Self {
        let (scale, rotation, location) = matrix.to_scale_rotation_translation();
        Self { location, rotation, scale }
    }

    fn channel_values(&self, channel: KeyChannel) -> Vec<f32> {
        match channel {
            KeyChannel::Location => self.location.to_array().to_vec(),
            KeyChannel::Rotation => {
                vec![self.rotation.w, self.rotation.x, self.rotation.y, self.rotation.z]
            }
            KeyChannel::Scale => self.scale.to_array().to_vec(),
        }
    }
}

#[derive(Clone, Debug)]
struct BoneData {
    rest: RestBone,
    selected: bool,
    bindings: Vec<Binding>,
    channels: Channels,
}

#[derive(Clone, Debug, Default)]
struct Collection {
    visible: bool,
    bones: Vec<String>,
}

/// One armature object with its action state and scene-level frame state.
#[derive(Debug)]
pub struct Armature {
    name: String,
    bones: IndexMap<String, BoneData>,
    pose: HashMap<String, Mat4>,
    collections: IndexMap<String, Collection>,
    object_channels: Channels,
    object_bindings: Vec<Binding>,
    drivers: Vec<String>,
    actions: IndexMap<String, Action>,
    active_action: Option<String>,
    frame: i32,
    pose_position: PosePosition,
}

impl Armature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bones: IndexMap::new(),
            pose: HashMap::new(),
            collections: IndexMap::new(),
            object_channels: Channels::default(),
            object_bindings: vec![],
            drivers: vec![],
            actions: IndexMap::new(),
            active_action: None,
            frame: 1,
            pose_position: PosePosition::Pose,
        }
    }

    /// Add a rest bone. Convenience for building test rigs.
    pub fn add_bone(
        &mut self,
        name: &str,
        head: Vec3,
        tail: Vec3,
        parent: Option<&str>,
    ) -> &mut Self {
        self.bones.insert(
            name.to_string(),
            BoneData {
                rest: RestBone { head, tail, roll: 0.0, parent: parent.map(str::to_string) },
                selected: true,
                bindings: vec![],
                channels: Channels::default(),
            },
        );
        self.evaluate();
        self
    }

    pub fn select_bone(&mut self, name: &str, selected: bool) {
        if let Some(bone) = self.bones.get_mut(name) {
            bone.selected = selected;
        }
    }

    pub fn add_driver(&mut self, path: impl Into<String>) {
        self.drivers.push(path.into());
    }

    /// Insert an action and make it active.
    pub fn set_action(&mut self, action: Action) {
        self.active_action = Some(action.name.clone());
        self.actions.insert(action.name.clone(), action);
        self.set_frame(self.frame);
    }

    pub fn add_action(&mut self, action: Action) {
        self.actions.insert(action.name.clone(), action);
    }

    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.get(name)
    }

    pub fn active_action(&self) -> Option<&Action> {
        self.actions.get(self.active_action.as_deref()?)
    }

    fn active_action_mut(&mut self) -> &mut Action {
        let name = self
            .active_action
            .get_or_insert_with(|| "Action".to_string())
            .clone();
        self.actions.entry(name.clone()).or_insert_with(|| Action::new(name))
    }

    /// World matrix of a bone at the current frame.
    pub fn world_bone_matrix(&self, bone: &str) -> Option<Mat4> {
        Some(self.world_matrix() * *self.pose.get(bone)?)
    }

    pub fn collection_visible(&self, name: &str) -> bool {
        self.collections.get(name).is_some_and(|collection| collection.visible)
    }

    fn bone_path(bone: &str, channel: KeyChannel) -> String {
        let property = match channel {
            KeyChannel::Location => "location",
            KeyChannel::Rotation => "rotation_quaternion",
            KeyChannel::Scale => "scale",
        };
        format!("pose.bones[\"{bone}\"].{property}")
    }

    fn object_path(channel: KeyChannel) -> &'static str {
        match channel {
            KeyChannel::Location => "location",
            KeyChannel::Rotation => "rotation_quaternion",
            KeyChannel::Scale => "scale",
        }
    }

    /// Pull channel values from the active action at the current frame.
    fn sample_channels(&mut self) {
        let frame = self.frame as f32;
        let Some(action) = self.active_action.as_deref() else {
            return;
        };
        let Some(action) = self.actions.get(action) else {
            return;
        };

        let mut bone_channels: Vec<(String, Channels)> = vec![];
        for (name, bone) in &self.bones {
            let mut channels = bone.channels;
            sample_transform(action, &Self::bone_path(name, KeyChannel::Location), frame, &mut channels);
            bone_channels.push((name.clone(), channels));
        }
        for (name, channels) in bone_channels {
            if let Some(bone) = self.bones.get_mut(&name) {
                bone.channels = channels;
            }
        }

        let mut object = self.object_channels;
        sample_transform(action, "location", frame, &mut object);
        self.object_channels = object;
    }

    /// Recompute posed matrices for the whole hierarchy at the current
    /// channel state.
    pub fn evaluate(&mut self) {
        let order = self.topological_order();
        let mut pose: HashMap<String, Mat4> = HashMap::with_capacity(order.len());

        for name in order {
            let bone = &self.bones[&name];
            let rest = bone.rest.matrix();

            let matrix = if self.pose_position == PosePosition::Rest {
                rest
            } else {
                let parent_part = bone
                    .rest
                    .parent
                    .as_ref()
                    .and_then(|parent| {
                        let parent_rest = self.bones.get(parent)?.rest.matrix();
                        Some(*pose.get(parent)? * parent_rest.inverse())
                    })
                    .unwrap_or(Mat4::IDENTITY);
                let unconstrained = parent_part * rest * bone.channels.matrix();
                self.apply_bindings(unconstrained, &bone.bindings, &pose)
            };
            pose.insert(name, matrix);
        }

        self.pose = pose;
    }

    fn topological_order(&self) -> Vec<String> {
        let mut order = vec![];
        let mut visited = HashSet::new();
        for name in self.bones.keys() {
            self.visit(name, &mut visited, &mut order);
        }
        order
    }

    fn visit(&self, name: &str, visited: &mut HashSet<String>, order: &mut Vec<String>) {
        if visited.contains(name) || !self.bones.contains_key(name) {
            return;
        }
        visited.insert(name.to_string());
        if let Some(parent) = self.bones[name].rest.parent.clone() {
            self.visit(&parent, visited, order);
        }
        order.push(name.to_string());
    }

    /// Evaluate same-object bindings against already-computed pose
    /// matrices. Bindings targeting other objects are inert here.
    fn apply_bindings(
        &self,
        mut matrix: Mat4,
        bindings: &[Binding],
        pose: &HashMap<String, Mat4>,
    ) -> Mat4 {
        for binding in bindings {
            if binding.muted {
                continue;
            }
            let target_matrix = binding.target.as_ref().and_then(|target| {
                if target.object != self.name {
                    return None;
                }
                match &target.bone {
                    Some(bone) => pose.get(bone).copied().or_else(|| self.pose.get(bone).copied()),
                    None => Some(Mat4::IDENTITY),
                }
            });

            matrix = match binding.kind {
                BindingKind::CopyLocation => match target_matrix {
                    Some(target) => {
                        let mut translation = matrix.w_axis.truncate();
                        let source = target.w_axis.truncate();
                        for axis in 0..3 {
                            if binding.axes.get(axis) {
                                translation[axis] = source[axis];
                            }
                        }
                        math::compose(Mat3::from_mat4(matrix), translation)
                    }
                    None => matrix,
                },
                BindingKind::CopyRotation => match target_matrix {
                    Some(target) => {
                        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
                        let (_, target_rotation, _) = target.to_scale_rotation_translation();
                        let rotation = if binding.axes.all() {
                            target_rotation
                        } else {
                            mix_rotation_axes(rotation, target_rotation, binding.axes)
                        };
                        Mat4::from_scale_rotation_translation(scale, rotation, translation)
                    }
                    None => matrix,
                },
                BindingKind::CopyScale => match target_matrix {
                    Some(target) => {
                        let (mut scale, rotation, translation) =
                            matrix.to_scale_rotation_translation();
                        let (target_scale, _, _) = target.to_scale_rotation_translation();
                        for axis in 0..3 {
                            if binding.axes.get(axis) {
                                scale[axis] = target_scale[axis];
                            }
                        }
                        Mat4::from_scale_rotation_translation(scale, rotation, translation)
                    }
                    None => matrix,
                },
                BindingKind::LimitLocation => {
                    let mut translation = matrix.w_axis.truncate();
                    for axis in 0..3 {
                        if let Some(min) = binding.min[axis] {
                            translation[axis] = translation[axis].max(min);
                        }
                        if let Some(max) = binding.max[axis] {
                            translation[axis] = translation[axis].min(max);
                        }
                    }
                    math::compose(Mat3::from_mat4(matrix), translation)
                }
                BindingKind::LimitRotation => {
                    let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
                    let (mut x, mut y, mut z) = rotation.to_euler(EulerRot::XYZ);
                    let angles = [&mut x, &mut y, &mut z];
                    for (axis, angle) in angles.into_iter().enumerate() {
                        if let Some(min) = binding.min[axis] {
                            *angle = angle.max(min);
                        }
                        if let Some(max) = binding.max[axis] {
                            *angle = angle.min(max);
                        }
                    }
                    let rotation = Quat::from_euler(EulerRot::XYZ, x, y, z);
                    Mat4::from_scale_rotation_translation(scale, rotation, translation)
                }
                BindingKind::LimitScale => {
                    let (mut scale, rotation, translation) = matrix.to_scale_rotation_translation();
                    for axis in 0..3 {
                        if let Some(min) = binding.min[axis] {
                            scale[axis] = scale[axis].max(min);
                        }
                        if let Some(max) = binding.max[axis] {
                            scale[axis] = scale[axis].min(max);
                        }
                    }
                    Mat4::from_scale_rotation_translation(scale, rotation, translation)
                }
                BindingKind::TrackTo => match (target_matrix, &binding.target) {
                    (Some(target), Some(target_ref)) => {
                        let aim = match target_ref.bone.as_deref() {
                            Some(bone) => {
                                let length = self
                                    .bones
                                    .get(bone)
                                    .map(|b| b.rest.length())
                                    .unwrap_or_default();
                                target.transform_point3(Vec3::Y * length * binding.head_tail)
                            }
                            None => target.w_axis.truncate(),
                        };
                        locked_track(matrix, aim)
                    }
                    _ => matrix,
                },
            };
        }
        matrix
    }

    /// Channels a key would record for a bone: raw channel values, or the
    /// evaluated local transform for visual keying.
    fn bone_key_channels(&self, bone: &str, visual: bool) -> Option<Channels> {
        let data = self.bones.get(bone)?;
        if !visual {
            return Some(data.channels);
        }
        let matrix = *self.pose.get(bone)?;
        let rest = data.rest.matrix();
        let parent_part = data
            .rest
            .parent
            .as_ref()
            .and_then(|parent| {
                let parent_rest = self.bones.get(parent)?.rest.matrix();
                Some(*self.pose.get(parent)? * parent_rest.inverse())
            })
            .unwrap_or(Mat4::IDENTITY);
        Some(Channels::from_matrix((parent_part * rest).inverse() * matrix))
    }
}

fn sample_transform(action: &Action, location_path: &str, frame: f32, channels: &mut Channels) {
    let base = location_path.strip_suffix("location").unwrap_or_default();
    let rotation_path = format!("{base}rotation_quaternion");
    let scale_path = format!("{base}scale");

    for axis in 0..3 {
        if let Some(curve) = action.curve(location_path, axis)
            && !curve.muted
            && let Some(value) = curve.sample(frame)
        {
            channels.location[axis] = value;
        }
        if let Some(curve) = action.curve(&scale_path, axis)
            && !curve.muted
            && let Some(value) = curve.sample(frame)
        {
            channels.scale[axis] = value;
        }
    }

    let mut quat = [channels.rotation.w, channels.rotation.x, channels.rotation.y, channels.rotation.z];
    let mut any = false;
    for (index, slot) in quat.iter_mut().enumerate() {
        if let Some(curve) = action.curve(&rotation_path, index)
            && !curve.muted
            && let Some(value) = curve.sample(frame)
        {
            *slot = value;
            any = true;
        }
    }
    if any {
        channels.rotation =
            Quat::from_xyzw(quat[1], quat[2], quat[3], quat[0]).normalize();
    }
}

/// Per-axis rotation mix via Euler decomposition, matching how hosts blend
/// partially-enabled copy-rotation constraints.
fn mix_rotation_axes(own: Quat, target: Quat, axes: rig_retarget_core::math::AxisFlags) -> Quat {
    let own_euler = own.to_euler(EulerRot::XYZ);
    let target_euler = target.to_euler(EulerRot::XYZ);
    let pick = |axis: usize, own: f32, target: f32| if axes.get(axis) { target } else { own };
    Quat::from_euler(
        EulerRot::XYZ,
        pick(0, own_euler.0, target_euler.0),
        pick(1, own_euler.1, target_euler.1),
        pick(2, own_euler.2, target_euler.2),
    )
}

/// Yaw the owner about its own Y axis so its negative Z aims at `target`.
fn locked_track(matrix: Mat4, target: Vec3) -> Mat4 {
    let translation = matrix.w_axis.truncate();
    let y = matrix.y_axis.truncate().normalize_or_zero();
    let to_target = target - translation;
    let planar = to_target - y * y.dot(to_target);
    let Some(desired) = planar.try_normalize() else {
        return matrix;
    };
    let current = -(matrix.z_axis.truncate());
    let current_planar = current - y * y.dot(current);
    let Some(current) = current_planar.try_normalize() else {
        return matrix;
    };
    let angle = current.cross(desired).dot(y).atan2(current.dot(desired));
    let rotation = Mat4::from_axis_angle(y, angle);
    let mut rotated = rotation * Mat4::from_mat3(Mat3::from_mat4(matrix));
    rotated.w_axis = translation.extend(1.0);
    rotated
}

impl ArmatureAccess for Armature {
    fn name(&self) -> &str {
        &self.name
    }

    fn world_matrix(&self) -> Mat4 {
        let mut matrix = self.object_channels.matrix();
        for binding in &self.object_bindings {
            if binding.muted {
                continue;
            }
            // Only self-contained limits are evaluable at object level.
            match binding.kind {
                BindingKind::LimitLocation | BindingKind::LimitScale => {
                    let (mut scale, rotation, mut translation) =
                        matrix.to_scale_rotation_translation();
                    for axis in 0..3 {
                        let value = if binding.kind == BindingKind::LimitLocation {
                            &mut translation[axis]
                        } else {
                            &mut scale[axis]
                        };
                        if let Some(min) = binding.min[axis] {
                            *value = value.max(min);
                        }
                        if let Some(max) = binding.max[axis] {
                            *value = value.min(max);
                        }
                    }
                    matrix = Mat4::from_scale_rotation_translation(scale, rotation, translation);
                }
                _ => {}
            }
        }
        matrix
    }

    fn set_world_matrix(&mut self, matrix: Mat4) {
        self.object_channels = Channels::from_matrix(matrix);
        self.evaluate();
    }

    fn scale_object(&mut self, factor: f32) {
        self.object_channels.scale *= factor;
    }

    fn mute_object_scale_channels(&mut self) {
        let Some(action) = self.active_action.as_deref() else {
            return;
        };
        if let Some(action) = self.actions.get_mut(action) {
            for curve in &mut action.curves {
                if curve.data_path == "scale" {
                    curve.muted = true;
                }
            }
        }
    }

    fn scale_object_location_keys(&mut self, factor: f32) {
        let Some(action) = self.active_action.as_deref() else {
            return;
        };
        if let Some(action) = self.actions.get_mut(action) {
            for curve in &mut action.curves {
                if curve.data_path == "location" {
                    curve.scale_values(factor);
                }
            }
        }
    }

    fn bone_names(&self) -> Vec<String> {
        self.bones.keys().cloned().collect()
    }

    fn rest_bone(&self, name: &str) -> Option<RestBone> {
        self.bones.get(name).map(|bone| bone.rest.clone())
    }

    fn set_rest_bone(&mut self, name: &str, rest: RestBone) -> Result<(), HostError> {
        let bone = self
            .bones
            .get_mut(name)
            .ok_or_else(|| HostError::BoneNotFound(name.to_string()))?;
        bone.rest = rest;
        self.evaluate();
        Ok(())
    }

    fn create_bone(&mut self, name: &str, rest: RestBone) -> Result<(), HostError> {
        if self.bones.contains_key(name) {
            return Err(HostError::DuplicateBone(name.to_string()));
        }
        self.bones.insert(
            name.to_string(),
            BoneData { rest, selected: false, bindings: vec![], channels: Channels::default() },
        );
        self.evaluate();
        Ok(())
    }

    fn remove_bone(&mut self, name: &str) -> Result<(), HostError> {
        let removed = self
            .bones
            .shift_remove(name)
            .ok_or_else(|| HostError::BoneNotFound(name.to_string()))?;
        // Children inherit the removed bone's parent.
        for bone in self.bones.values_mut() {
            if bone.rest.parent.as_deref() == Some(name) {
                bone.rest.parent = removed.rest.parent.clone();
            }
        }
        for collection in self.collections.values_mut() {
            collection.bones.retain(|bone| bone != name);
        }
        self.pose.remove(name);
        self.evaluate();
        Ok(())
    }

    fn rename_bone(&mut self, old: &str, new: &str) -> Result<(), HostError> {
        if old == new {
            return Ok(());
        }
        if self.bones.contains_key(new) {
            return Err(HostError::DuplicateBone(new.to_string()));
        }
        let data = self
            .bones
            .shift_remove(old)
            .ok_or_else(|| HostError::BoneNotFound(old.to_string()))?;
        self.bones.insert(new.to_string(), data);

        for bone in self.bones.values_mut() {
            if bone.rest.parent.as_deref() == Some(old) {
                bone.rest.parent = Some(new.to_string());
            }
            for binding in &mut bone.bindings {
                if let Some(target) = &mut binding.target
                    && target.object == self.name
                    && target.bone.as_deref() == Some(old)
                {
                    target.bone = Some(new.to_string());
                }
            }
        }
        for collection in self.collections.values_mut() {
            for bone in &mut collection.bones {
                if bone == old {
                    *bone = new.to_string();
                }
            }
        }
        if let Some(matrix) = self.pose.remove(old) {
            self.pose.insert(new.to_string(), matrix);
        }
        Ok(())
    }

    fn bone_selected(&self, name: &str) -> bool {
        self.bones.get(name).is_some_and(|bone| bone.selected)
    }

    fn pose_matrix(&self, name: &str) -> Option<Mat4> {
        self.pose.get(name).copied()
    }

    fn set_pose_matrix(&mut self, name: &str, matrix: Mat4) -> Result<(), HostError> {
        let data = self
            .bones
            .get(name)
            .ok_or_else(|| HostError::BoneNotFound(name.to_string()))?;
        let rest = data.rest.matrix();
        let parent_part = data
            .rest
            .parent
            .as_ref()
            .and_then(|parent| {
                let parent_rest = self.bones.get(parent)?.rest.matrix();
                Some(*self.pose.get(parent)? * parent_rest.inverse())
            })
            .unwrap_or(Mat4::IDENTITY);
        let basis = (parent_part * rest).inverse() * matrix;
        if let Some(data) = self.bones.get_mut(name) {
            data.channels = Channels::from_matrix(basis);
        }
        self.evaluate();
        Ok(())
    }

    fn bindings(&self, bone: &str) -> Vec<Binding> {
        self.bones.get(bone).map(|data| data.bindings.clone()).unwrap_or_default()
    }

    fn add_binding(&mut self, bone: &str, binding: Binding) -> Result<(), HostError> {
        let data = self
            .bones
            .get_mut(bone)
            .ok_or_else(|| HostError::BoneNotFound(bone.to_string()))?;
        data.bindings.push(binding);
        self.evaluate();
        Ok(())
    }

    fn set_binding(&mut self, bone: &str, index: usize, binding: Binding) -> Result<(), HostError> {
        let data = self
            .bones
            .get_mut(bone)
            .ok_or_else(|| HostError::BoneNotFound(bone.to_string()))?;
        if let Some(slot) = data.bindings.get_mut(index) {
            *slot = binding;
        }
        self.evaluate();
        Ok(())
    }

    fn set_binding_muted(&mut self, bone: &str, index: usize, muted: bool) {
        if let Some(data) = self.bones.get_mut(bone)
            && let Some(binding) = data.bindings.get_mut(index)
        {
            binding.muted = muted;
        }
        self.evaluate();
    }

    fn remove_binding(&mut self, bone: &str, index: usize) {
        if let Some(data) = self.bones.get_mut(bone)
            && index < data.bindings.len()
        {
            data.bindings.remove(index);
        }
        self.evaluate();
    }

    fn object_bindings(&self) -> Vec<Binding> {
        self.object_bindings.clone()
    }

    fn add_object_binding(&mut self, binding: Binding) {
        self.object_bindings.push(binding);
    }

    fn set_object_binding(&mut self, index: usize, binding: Binding) {
        if let Some(slot) = self.object_bindings.get_mut(index) {
            *slot = binding;
        }
    }

    fn remove_object_binding(&mut self, index: usize) {
        if index < self.object_bindings.len() {
            self.object_bindings.remove(index);
        }
    }

    fn create_collection(&mut self, name: &str, visible: bool) {
        self.collections
            .entry(name.to_string())
            .or_insert_with(|| Collection { visible, bones: vec![] });
    }

    fn remove_collection(&mut self, name: &str) {
        self.collections.shift_remove(name);
    }

    fn assign_collection(&mut self, bone: &str, collection: &str) -> Result<(), HostError> {
        if !self.bones.contains_key(bone) {
            return Err(HostError::BoneNotFound(bone.to_string()));
        }
        if !self.collections.contains_key(collection) {
            return Err(HostError::CollectionNotFound(collection.to_string()));
        }
        for other in self.collections.values_mut() {
            other.bones.retain(|name| name != bone);
        }
        if let Some(data) = self.collections.get_mut(collection) {
            data.bones.push(bone.to_string());
        }
        Ok(())
    }

    fn collection_bones(&self, name: &str) -> Vec<String> {
        self.collections.get(name).map(|data| data.bones.clone()).unwrap_or_default()
    }

    fn driver_paths(&self) -> Vec<String> {
        self.drivers.clone()
    }

    fn set_driver_path(&mut self, index: usize, path: String) {
        if let Some(slot) = self.drivers.get_mut(index) {
            *slot = path;
        }
    }
}

impl SceneAccess for Armature {
    fn current_frame(&self) -> i32 {
        self.frame
    }

    fn set_frame(&mut self, frame: i32) {
        self.frame = frame;
        self.sample_channels();
        self.evaluate();
    }

    fn pose_position(&self) -> PosePosition {
        self.pose_position
    }

    fn set_pose_position(&mut self, position: PosePosition) {
        self.pose_position = position;
        self.evaluate();
    }

    fn action_range(&self) -> Option<(i32, i32)> {
        let (start, end) = self.active_action()?.frame_range()?;
        Some((start.round() as i32, end.round() as i32))
    }

    fn key_bone(
        &mut self,
        bone: &str,
        channel: KeyChannel,
        frame: i32,
        options: KeyingOptions,
    ) -> Result<(), HostError> {
        let channels = self
            .bone_key_channels(bone, options.visual)
            .ok_or_else(|| HostError::BoneNotFound(bone.to_string()))?;
        let path = Self::bone_path(bone, channel);
        let values = channels.channel_values(channel);
        let action = self.active_action_mut();
        for (index, value) in values.into_iter().enumerate() {
            action.insert_key(&path, index, Some(bone), frame as f32, value, options.cycle_aware);
        }
        Ok(())
    }

    fn key_object(&mut self, channel: KeyChannel, frame: i32, options: KeyingOptions) {
        let values = self.object_channels.channel_values(channel);
        let path = Self::object_path(channel).to_string();
        let action = self.active_action_mut();
        for (index, value) in values.into_iter().enumerate() {
            action.insert_key(&path, index, None, frame as f32, value, options.cycle_aware);
        }
    }

    fn action_names(&self) -> Vec<String> {
        self.actions.keys().cloned().collect()
    }

    fn action_validates(&self, action: &str) -> bool {
        let Some(action) = self.actions.get(action) else {
            return false;
        };
        action.curves.iter().any(|curve| self.resolves(&curve.data_path))
    }

    fn action_groups(&self, action: &str) -> Vec<String> {
        self.actions.get(action).map(|action| action.groups()).unwrap_or_default()
    }

    fn rename_action_group(&mut self, action: &str, old: &str, new: &str) {
        if let Some(action) = self.actions.get_mut(action) {
            action.rename_group(old, new);
        }
    }
}

impl Armature {
    fn resolves(&self, data_path: &str) -> bool {
        if matches!(data_path, "location" | "rotation_quaternion" | "scale") {
            return true;
        }
        let Some(rest) = data_path.strip_prefix("pose.bones[\"") else {
            return false;
        };
        let Some((bone, property)) = rest.split_once("\"].") else {
            return false;
        };
        self.bones.contains_key(bone)
            && matches!(property, "location" | "rotation_quaternion" | "scale")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn two_bone_rig() -> Armature {
        let mut armature = Armature::new("rig");
        armature.add_bone("a", Vec3::ZERO, Vec3::Y, None);
        armature.add_bone("b", Vec3::Y, Vec3::Y * 2.0, Some("a"));
        armature
    }

    #[test]
    fn rest_pose_matches_rest_matrices() {
        let mut armature = two_bone_rig();
        armature.set_pose_position(PosePosition::Rest);
        let rest = armature.rest_bone("b").unwrap().matrix();
        assert!((armature.pose_matrix("b").unwrap() - rest).abs().to_cols_array().iter().all(|v| *v < 1e-5));
    }

    #[test]
    fn child_follows_posed_parent() {
        let mut armature = two_bone_rig();
        // Push the parent one unit along X.
        let moved = Mat4::from_translation(Vec3::X) * armature.rest_bone("a").unwrap().matrix();
        armature.set_pose_matrix("a", moved).unwrap();

        let b = armature.pose_matrix("b").unwrap();
        let expected_head = Vec3::new(1.0, 1.0, 0.0);
        assert!((b.w_axis.truncate() - expected_head).length() < 1e-5);
    }

    #[test]
    fn set_pose_matrix_round_trips() {
        let mut armature = two_bone_rig();
        let target = Mat4::from_rotation_z(0.4) * armature.rest_bone("a").unwrap().matrix();
        armature.set_pose_matrix("a", target).unwrap();
        let result = armature.pose_matrix("a").unwrap();
        assert!((result - target).abs().to_cols_array().iter().all(|v| *v < 1e-5));
    }

    #[test]
    fn keyed_channels_drive_the_pose() {
        let mut armature = two_bone_rig();
        let mut action = Action::new("slide");
        action.insert_key("pose.bones[\"a\"].location", 0, Some("a"), 1.0, 0.0, false);
        action.insert_key("pose.bones[\"a\"].location", 0, Some("a"), 11.0, 2.0, false);
        armature.set_action(action);

        armature.set_frame(1);
        let at_start = armature.pose_matrix("a").unwrap().w_axis.x;
        armature.set_frame(6);
        let midway = armature.pose_matrix("a").unwrap().w_axis.x;
        armature.set_frame(11);
        let at_end = armature.pose_matrix("a").unwrap().w_axis.x;

        assert!(at_start.abs() < 1e-5);
        assert!((midway - 1.0).abs() < 1e-5);
        assert!((at_end - 2.0).abs() < 1e-5);
    }

    #[test]
    fn visual_keying_records_constrained_transform() {
        let mut armature = two_bone_rig();
        armature.add_bone("driver", Vec3::new(2.0, 0.0, 0.0), Vec3::new(2.0, 1.0, 0.0), None);
        armature
            .add_binding(
                "a",
                Binding::copy(
                    BindingKind::CopyLocation,
                    rig_retarget_core::host::BindingTarget {
                        object: "rig".into(),
                        bone: Some("driver".into()),
                    },
                ),
            )
            .unwrap();

        armature.set_action(Action::new("pose"));
        armature
            .key_bone("a", KeyChannel::Location, 1, KeyingOptions { visual: true, cycle_aware: false })
            .unwrap();

        // The visual key stores the driven X offset, a raw key would store 0.
        let action = armature.active_action().unwrap();
        let x = action.curve("pose.bones[\"a\"].location", 0).unwrap().key_at(1.0).unwrap();
        assert!((x - 2.0).abs() < 1e-5);
    }

    #[test]
    fn copy_rotation_follows_target_bone() {
        let mut armature = two_bone_rig();
        armature.add_bone("driver", Vec3::ZERO, Vec3::Y, None);
        let turned = Mat4::from_rotation_z(0.8) * armature.rest_bone("driver").unwrap().matrix();
        armature.set_pose_matrix("driver", turned).unwrap();
        armature
            .add_binding(
                "a",
                Binding::copy(
                    BindingKind::CopyRotation,
                    rig_retarget_core::host::BindingTarget {
                        object: "rig".into(),
                        bone: Some("driver".into()),
                    },
                ),
            )
            .unwrap();

        let a = armature.pose_matrix("a").unwrap();
        let driver = armature.pose_matrix("driver").unwrap();
        let (_, a_rot, _) = a.to_scale_rotation_translation();
        let (_, d_rot, _) = driver.to_scale_rotation_translation();
        assert!(a_rot.angle_between(d_rot) < 1e-4);
    }
}
