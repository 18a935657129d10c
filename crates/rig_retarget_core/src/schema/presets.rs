//! Built-in role-schema presets for common rigs.
//!
//! Presets hold bare bone names; namespace prefixes (`"Char:"`) are detected
//! on the actual armature and applied via
//! [`RoleSchema::apply_namespace`](super::RoleSchema::apply_namespace).

use super::{Arm, Face, Fingers, Leg, RoleSchema, Side, Spine};

fn side_letter(side: Side) -> &'static str {
    match side {
        Side::Left => "L",
        Side::Right => "R",
    }
}

/// Rigify control rigs, addressed through their `DEF-` deform bones.
pub fn rigify() -> RoleSchema {
    let mut schema = RoleSchema {
        root: "root".into(),
        spine: Spine {
            head: "DEF-spine.006".into(),
            neck: "DEF-spine.004".into(),
            chest: "DEF-spine.003".into(),
            spine1: "DEF-spine.002".into(),
            spine: "DEF-spine.001".into(),
            hips: "DEF-spine".into(),
        },
        face: Face {
            jaw: "DEF-jaw".into(),
            left_eye: "DEF-eye.L".into(),
            right_eye: "DEF-eye.R".into(),
        },
        ..Default::default()
    };

    for side in Side::BOTH {
        let letter = side_letter(side);
        *schema.arm_mut(side) = Arm {
            shoulder: format!("DEF-shoulder.{letter}"),
            upper: format!("DEF-upper_arm.{letter}"),
            forearm: format!("DEF-forearm.{letter}"),
            hand: format!("DEF-hand.{letter}"),
        };
        *schema.leg_mut(side) = Leg {
            upper: format!("DEF-thigh.{letter}"),
            lower: format!("DEF-shin.{letter}"),
            foot: format!("DEF-foot.{letter}"),
            toe: format!("DEF-toe.{letter}"),
        };
        *schema.fingers_mut(side) = Fingers {
            thumb: phalanges("DEF-thumb", letter),
            index: phalanges("DEF-f_index", letter),
            middle: phalanges("DEF-f_middle", letter),
            ring: phalanges("DEF-f_ring", letter),
            pinky: phalanges("DEF-f_pinky", letter),
        };
    }

    schema
}

/// The Rigify metarig (the editable armature Rigify generates from).
pub fn rigify_metarig() -> RoleSchema {
    let mut schema = RoleSchema {
        spine: Spine {
            head: "spine.006".into(),
            neck: "spine.004".into(),
            chest: "spine.003".into(),
            spine1: "spine.002".into(),
            spine: "spine.001".into(),
            hips: "spine".into(),
        },
        face: Face {
            jaw: "jaw".into(),
            left_eye: "eye.L".into(),
            right_eye: "eye.R".into(),
        },
        ..Default::default()
    };

    for side in Side::BOTH {
        let letter = side_letter(side);
        *schema.arm_mut(side) = Arm {
            shoulder: format!("shoulder.{letter}"),
            upper: format!("upper_arm.{letter}"),
            forearm: format!("forearm.{letter}"),
            hand: format!("hand.{letter}"),
        };
        *schema.leg_mut(side) = Leg {
            upper: format!("thigh.{letter}"),
            lower: format!("shin.{letter}"),
            foot: format!("foot.{letter}"),
            toe: format!("toe.{letter}"),
        };
        *schema.fingers_mut(side) = Fingers {
            thumb: phalanges("thumb", letter),
            index: phalanges("f_index", letter),
            middle: phalanges("f_middle", letter),
            ring: phalanges("f_ring", letter),
            pinky: phalanges("f_pinky", letter),
        };
    }

    schema
}

/// Mixamo characters. Exported rigs usually carry the `mixamorig:` namespace,
/// which is detected at retarget time rather than baked into the preset.
pub fn mixamo() -> RoleSchema {
    let mut schema = RoleSchema {
        spine: Spine {
            head: "Head".into(),
            neck: "Neck".into(),
            chest: "Spine2".into(),
            spine1: "Spine1".into(),
            spine: "Spine".into(),
            hips: "Hips".into(),
        },
        ..Default::default()
    };

    for side in Side::BOTH {
        let prefix = match side {
            Side::Left => "Left",
            Side::Right => "Right",
        };
        *schema.arm_mut(side) = Arm {
            shoulder: format!("{prefix}Shoulder"),
            upper: format!("{prefix}Arm"),
            forearm: format!("{prefix}ForeArm"),
            hand: format!("{prefix}Hand"),
        };
        *schema.leg_mut(side) = Leg {
            upper: format!("{prefix}UpLeg"),
            lower: format!("{prefix}Leg"),
            foot: format!("{prefix}Foot"),
            toe: format!("{prefix}ToeBase"),
        };
        *schema.fingers_mut(side) = Fingers {
            thumb: hand_chain(prefix, "Thumb"),
            index: hand_chain(prefix, "Index"),
            middle: hand_chain(prefix, "Middle"),
            ring: hand_chain(prefix, "Ring"),
            pinky: hand_chain(prefix, "Pinky"),
        };
    }

    schema
}

fn phalanges(base: &str, letter: &str) -> Vec<String> {
    (1..=3).map(|i| format!("{base}.{i:02}.{letter}")).collect()
}

fn hand_chain(side: &str, finger: &str) -> Vec<String> {
    (1..=3).map(|i| format!("{side}Hand{finger}{i}")).collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::schema::{ArmSlot, LimbVariant, Slot};

    #[test]
    fn rigify_preset_fills_deform_names() {
        let schema = rigify();
        assert_eq!(schema.spine.hips, "DEF-spine");
        assert_eq!(schema.left_fingers.index[2], "DEF-f_index.03.L");
        assert_eq!(
            schema.get(Slot::Arm(Side::Right, LimbVariant::Fk, ArmSlot::Hand)),
            Some("DEF-hand.R")
        );
    }

    #[test]
    fn mixamo_preset_has_no_root() {
        let schema = mixamo();
        assert_eq!(schema.get(Slot::Root), None);
        assert_eq!(schema.right_leg.toe, "RightToeBase");
    }
}
