//! Bulk enable/disable/remove of bindings on an armature.

use crate::host::{ArmatureAccess, BindingKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingStatus {
    Enable,
    Disable,
    Remove,
}

/// Apply `status` to every binding on the armature's bones, optionally
/// restricted to selected bones and/or a single binding kind. Returns how
/// many bindings were affected.
pub fn set_binding_status(
    armature: &mut impl ArmatureAccess,
    only_selected: bool,
    kind: Option<BindingKind>,
    status: BindingStatus,
) -> usize {
    let mut affected = 0;
    for bone in armature.bone_names() {
        if only_selected && !armature.bone_selected(&bone) {
            continue;
        }
        let bindings = armature.bindings(&bone);
        for (index, binding) in bindings.iter().enumerate().rev() {
            if kind.is_some_and(|k| k != binding.kind) {
                continue;
            }
            match status {
                BindingStatus::Enable => armature.set_binding_muted(&bone, index, false),
                BindingStatus::Disable => armature.set_binding_muted(&bone, index, true),
                BindingStatus::Remove => armature.remove_binding(&bone, index),
            }
            affected += 1;
        }
    }
    affected
}
