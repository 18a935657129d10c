//! Anatomical role schemas for humanoid skeletons.
//!
//! A [`RoleSchema`] is a fixed inventory of named slots, each holding the
//! bone name that plays the corresponding anatomical role on one specific
//! rig. Slot identity is closed ([`Slot`] and the per-limb slot enums);
//! only the bone-name values vary between rigs. A slot may be unset, which
//! is represented by the empty string internally and surfaced as `None`.

pub mod presets;

use serde::{Deserialize, Serialize};

/// Left or right half of the body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];
}

/// Whether a limb role refers to the FK chain or its IK counterpart.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LimbVariant {
    Fk,
    Ik,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpineSlot {
    Head,
    Neck,
    Chest,
    Spine1,
    Spine,
    Hips,
}

impl SpineSlot {
    pub const ALL: [SpineSlot; 6] = [
        SpineSlot::Head,
        SpineSlot::Neck,
        SpineSlot::Chest,
        SpineSlot::Spine1,
        SpineSlot::Spine,
        SpineSlot::Hips,
    ];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArmSlot {
    Shoulder,
    Upper,
    Forearm,
    Hand,
}

impl ArmSlot {
    pub const ALL: [ArmSlot; 4] = [
        ArmSlot::Shoulder,
        ArmSlot::Upper,
        ArmSlot::Forearm,
        ArmSlot::Hand,
    ];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LegSlot {
    Upper,
    Lower,
    Foot,
    Toe,
}

impl LegSlot {
    pub const ALL: [LegSlot; 4] = [LegSlot::Upper, LegSlot::Lower, LegSlot::Foot, LegSlot::Toe];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Finger {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl Finger {
    pub const ALL: [Finger; 5] = [
        Finger::Thumb,
        Finger::Index,
        Finger::Middle,
        Finger::Ring,
        Finger::Pinky,
    ];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaceSlot {
    Jaw,
    LeftEye,
    RightEye,
}

impl FaceSlot {
    pub const ALL: [FaceSlot; 3] = [FaceSlot::Jaw, FaceSlot::LeftEye, FaceSlot::RightEye];
}

/// Identifier for one single-bone slot of a [`RoleSchema`].
///
/// Finger chains hold an ordered list of bone names rather than a single
/// name and are accessed through [`RoleSchema::fingers`] instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Slot {
    Root,
    Spine(SpineSlot),
    Arm(Side, LimbVariant, ArmSlot),
    Leg(Side, LimbVariant, LegSlot),
    Face(FaceSlot),
}

/// The spine chain, hips up to head.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Spine {
    pub head: String,
    pub neck: String,
    pub chest: String,
    pub spine1: String,
    pub spine: String,
    pub hips: String,
}

impl Spine {
    pub fn get(&self, slot: SpineSlot) -> &str {
        match slot {
            SpineSlot::Head => &self.head,
            SpineSlot::Neck => &self.neck,
            SpineSlot::Chest => &self.chest,
            SpineSlot::Spine1 => &self.spine1,
            SpineSlot::Spine => &self.spine,
            SpineSlot::Hips => &self.hips,
        }
    }

    pub fn get_mut(&mut self, slot: SpineSlot) -> &mut String {
        match slot {
            SpineSlot::Head => &mut self.head,
            SpineSlot::Neck => &mut self.neck,
            SpineSlot::Chest => &mut self.chest,
            SpineSlot::Spine1 => &mut self.spine1,
            SpineSlot::Spine => &mut self.spine,
            SpineSlot::Hips => &mut self.hips,
        }
    }
}

/// One arm chain (FK or IK).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Arm {
    pub shoulder: String,
    pub upper: String,
    pub forearm: String,
    pub hand: String,
}

impl Arm {
    pub fn get(&self, slot: ArmSlot) -> &str {
        match slot {
            ArmSlot::Shoulder => &self.shoulder,
            ArmSlot::Upper => &self.upper,
            ArmSlot::Forearm => &self.forearm,
            ArmSlot::Hand => &self.hand,
        }
    }

    pub fn get_mut(&mut self, slot: ArmSlot) -> &mut String {
        match slot {
            ArmSlot::Shoulder => &mut self.shoulder,
            ArmSlot::Upper => &mut self.upper,
            ArmSlot::Forearm => &mut self.forearm,
            ArmSlot::Hand => &mut self.hand,
        }
    }

    /// True when no slot of the chain is filled.
    pub fn is_empty(&self) -> bool {
        ArmSlot::ALL.iter().all(|slot| self.get(*slot).is_empty())
    }
}

/// One leg chain (FK or IK).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Leg {
    pub upper: String,
    pub lower: String,
    pub foot: String,
    pub toe: String,
}

impl Leg {
    pub fn get(&self, slot: LegSlot) -> &str {
        match slot {
            LegSlot::Upper => &self.upper,
            LegSlot::Lower => &self.lower,
            LegSlot::Foot => &self.foot,
            LegSlot::Toe => &self.toe,
        }
    }

    pub fn get_mut(&mut self, slot: LegSlot) -> &mut String {
        match slot {
            LegSlot::Upper => &mut self.upper,
            LegSlot::Lower => &mut self.lower,
            LegSlot::Foot => &mut self.foot,
            LegSlot::Toe => &mut self.toe,
        }
    }

    pub fn is_empty(&self) -> bool {
        LegSlot::ALL.iter().all(|slot| self.get(*slot).is_empty())
    }
}

/// The five finger chains of one hand. Each chain is ordered proximal to
/// distal (three phalanges), optionally followed by the metacarpal.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fingers {
    pub thumb: Vec<String>,
    pub index: Vec<String>,
    pub middle: Vec<String>,
    pub ring: Vec<String>,
    pub pinky: Vec<String>,
}

impl Fingers {
    pub fn get(&self, finger: Finger) -> &[String] {
        match finger {
            Finger::Thumb => &self.thumb,
            Finger::Index => &self.index,
            Finger::Middle => &self.middle,
            Finger::Ring => &self.ring,
            Finger::Pinky => &self.pinky,
        }
    }

    pub fn get_mut(&mut self, finger: Finger) -> &mut Vec<String> {
        match finger {
            Finger::Thumb => &mut self.thumb,
            Finger::Index => &mut self.index,
            Finger::Middle => &mut self.middle,
            Finger::Ring => &mut self.ring,
            Finger::Pinky => &mut self.pinky,
        }
    }
}

/// Minimal face rig: jaw plus the two eyes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Face {
    pub jaw: String,
    pub left_eye: String,
    pub right_eye: String,
}

impl Face {
    pub fn get(&self, slot: FaceSlot) -> &str {
        match slot {
            FaceSlot::Jaw => &self.jaw,
            FaceSlot::LeftEye => &self.left_eye,
            FaceSlot::RightEye => &self.right_eye,
        }
    }

    pub fn get_mut(&mut self, slot: FaceSlot) -> &mut String {
        match slot {
            FaceSlot::Jaw => &mut self.jaw,
            FaceSlot::LeftEye => &mut self.left_eye,
            FaceSlot::RightEye => &mut self.right_eye,
        }
    }
}

/// Role assignment for one skeleton: which bone plays which anatomical role.
///
/// Rig "kinds" are plain data, produced by the constructors in [`presets`]
/// or deserialized from RON.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleSchema {
    pub root: String,
    pub spine: Spine,
    pub face: Face,
    pub left_arm: Arm,
    pub right_arm: Arm,
    pub left_arm_ik: Arm,
    pub right_arm_ik: Arm,
    pub left_leg: Leg,
    pub right_leg: Leg,
    pub left_leg_ik: Leg,
    pub right_leg_ik: Leg,
    pub left_fingers: Fingers,
    pub right_fingers: Fingers,
    /// When a side's IK chain has no slots filled, resolve the IK role to
    /// the FK chain instead of treating it as absent.
    pub ik_fallback: bool,
}

impl Default for RoleSchema {
    fn default() -> Self {
        Self {
            root: String::new(),
            spine: Spine::default(),
            face: Face::default(),
            left_arm: Arm::default(),
            right_arm: Arm::default(),
            left_arm_ik: Arm::default(),
            right_arm_ik: Arm::default(),
            left_leg: Leg::default(),
            right_leg: Leg::default(),
            left_leg_ik: Leg::default(),
            right_leg_ik: Leg::default(),
            left_fingers: Fingers::default(),
            right_fingers: Fingers::default(),
            ik_fallback: true,
        }
    }
}

impl RoleSchema {
    /// Bone name held by a single-bone slot, `None` when unset.
    ///
    /// IK slots resolve through the fallback rule: see [`RoleSchema::arm_ik`].
    pub fn get(&self, slot: Slot) -> Option<&str> {
        let name = match slot {
            Slot::Root => self.root.as_str(),
            Slot::Spine(s) => self.spine.get(s),
            Slot::Face(s) => self.face.get(s),
            Slot::Arm(side, LimbVariant::Fk, s) => self.arm(side).get(s),
            Slot::Arm(side, LimbVariant::Ik, s) => {
                return self.arm_ik(side).map(|arm| arm.get(s)).filter(|n| !n.is_empty());
            }
            Slot::Leg(side, LimbVariant::Fk, s) => self.leg(side).get(s),
            Slot::Leg(side, LimbVariant::Ik, s) => {
                return self.leg_ik(side).map(|leg| leg.get(s)).filter(|n| !n.is_empty());
            }
        };
        (!name.is_empty()).then_some(name)
    }

    /// Assign a bone name to a single-bone slot. IK slots write to the IK
    /// chain directly; the fallback rule only applies on read.
    pub fn set(&mut self, slot: Slot, name: impl Into<String>) {
        let name = name.into();
        let field = match slot {
            Slot::Root => &mut self.root,
            Slot::Spine(s) => self.spine.get_mut(s),
            Slot::Face(s) => self.face.get_mut(s),
            Slot::Arm(side, LimbVariant::Fk, s) => self.arm_mut(side).get_mut(s),
            Slot::Arm(side, LimbVariant::Ik, s) => match side {
                Side::Left => self.left_arm_ik.get_mut(s),
                Side::Right => self.right_arm_ik.get_mut(s),
            },
            Slot::Leg(side, LimbVariant::Fk, s) => self.leg_mut(side).get_mut(s),
            Slot::Leg(side, LimbVariant::Ik, s) => match side {
                Side::Left => self.left_leg_ik.get_mut(s),
                Side::Right => self.right_leg_ik.get_mut(s),
            },
        };
        *field = name;
    }

    pub fn arm(&self, side: Side) -> &Arm {
        match side {
            Side::Left => &self.left_arm,
            Side::Right => &self.right_arm,
        }
    }

    pub fn arm_mut(&mut self, side: Side) -> &mut Arm {
        match side {
            Side::Left => &mut self.left_arm,
            Side::Right => &mut self.right_arm,
        }
    }

    pub fn leg(&self, side: Side) -> &Leg {
        match side {
            Side::Left => &self.left_leg,
            Side::Right => &self.right_leg,
        }
    }

    pub fn leg_mut(&mut self, side: Side) -> &mut Leg {
        match side {
            Side::Left => &mut self.left_leg,
            Side::Right => &mut self.right_leg,
        }
    }

    /// The IK arm chain for `side`, substituting the FK chain when the IK
    /// chain is empty and [`ik_fallback`](Self::ik_fallback) is enabled.
    pub fn arm_ik(&self, side: Side) -> Option<&Arm> {
        let ik = match side {
            Side::Left => &self.left_arm_ik,
            Side::Right => &self.right_arm_ik,
        };
        if !ik.is_empty() {
            Some(ik)
        } else if self.ik_fallback {
            Some(self.arm(side))
        } else {
            None
        }
    }

    /// The IK leg chain for `side`, with the same fallback rule as
    /// [`RoleSchema::arm_ik`].
    pub fn leg_ik(&self, side: Side) -> Option<&Leg> {
        let ik = match side {
            Side::Left => &self.left_leg_ik,
            Side::Right => &self.right_leg_ik,
        };
        if !ik.is_empty() {
            Some(ik)
        } else if self.ik_fallback {
            Some(self.leg(side))
        } else {
            None
        }
    }

    pub fn fingers(&self, side: Side) -> &Fingers {
        match side {
            Side::Left => &self.left_fingers,
            Side::Right => &self.right_fingers,
        }
    }

    pub fn fingers_mut(&mut self, side: Side) -> &mut Fingers {
        match side {
            Side::Left => &mut self.left_fingers,
            Side::Right => &mut self.right_fingers,
        }
    }

    /// All single-bone slots in a stable order: root, spine, face, then the
    /// FK and IK limb chains of both sides.
    pub fn slots() -> Vec<Slot> {
        let mut slots = vec![Slot::Root];
        slots.extend(SpineSlot::ALL.map(Slot::Spine));
        slots.extend(FaceSlot::ALL.map(Slot::Face));
        for side in Side::BOTH {
            for variant in [LimbVariant::Ik, LimbVariant::Fk] {
                slots.extend(ArmSlot::ALL.map(|s| Slot::Arm(side, variant, s)));
                slots.extend(LegSlot::ALL.map(|s| Slot::Leg(side, variant, s)));
            }
        }
        slots
    }

    /// Every filled bone name in the schema, IK roles resolved, finger
    /// chains included.
    pub fn bone_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Self::slots()
            .into_iter()
            .filter_map(|slot| self.get(slot).map(str::to_owned))
            .collect();
        for side in Side::BOTH {
            for finger in Finger::ALL {
                names.extend(
                    self.fingers(side)
                        .get(finger)
                        .iter()
                        .filter(|name| !name.is_empty())
                        .cloned(),
                );
            }
        }
        names
    }

    /// Prepend a detected `"Namespace:"` prefix to the configured root role
    /// name, unless the root is already namespaced. Presets store bare
    /// names; the prefix comes from the actual armature at retarget time.
    pub fn apply_namespace(&mut self, prefix: &str) {
        if !self.root.is_empty() && !self.root.contains(':') {
            self.root = format!("{prefix}{}", self.root);
        }
    }

    pub fn from_ron(source: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(source)
    }

    pub fn to_ron(&self) -> Result<String, ron::Error> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unset_slots_read_as_none() {
        let mut schema = RoleSchema::default();
        assert_eq!(schema.get(Slot::Spine(SpineSlot::Hips)), None);

        schema.set(Slot::Spine(SpineSlot::Hips), "Hips");
        assert_eq!(schema.get(Slot::Spine(SpineSlot::Hips)), Some("Hips"));
    }

    #[test]
    fn ik_falls_back_to_fk_when_unset() {
        let mut schema = RoleSchema::default();
        schema.set(Slot::Arm(Side::Left, LimbVariant::Fk, ArmSlot::Hand), "hand.L");

        assert_eq!(
            schema.get(Slot::Arm(Side::Left, LimbVariant::Ik, ArmSlot::Hand)),
            Some("hand.L")
        );

        schema.ik_fallback = false;
        assert_eq!(schema.get(Slot::Arm(Side::Left, LimbVariant::Ik, ArmSlot::Hand)), None);

        schema.ik_fallback = true;
        schema.set(Slot::Arm(Side::Left, LimbVariant::Ik, ArmSlot::Hand), "hand_ik.L");
        assert_eq!(
            schema.get(Slot::Arm(Side::Left, LimbVariant::Ik, ArmSlot::Hand)),
            Some("hand_ik.L")
        );
    }

    #[test]
    fn bone_names_cover_fingers() {
        let mut schema = RoleSchema::default();
        schema.set(Slot::Root, "root");
        schema.fingers_mut(Side::Left).thumb = vec!["thumb.01.L".into(), "thumb.02.L".into()];

        let names = schema.bone_names();
        assert!(names.contains(&"root".to_string()));
        assert!(names.contains(&"thumb.02.L".to_string()));
    }

    #[test]
    fn ron_roundtrip() {
        let schema = presets::rigify();
        let text = schema.to_ron().unwrap();
        let back = RoleSchema::from_ron(&text).unwrap();
        assert_eq!(schema, back);
    }

    #[test]
    fn namespace_applies_to_bare_root_only() {
        let mut schema = RoleSchema::default();
        schema.root = "Root".into();
        schema.apply_namespace("Char:");
        assert_eq!(schema.root, "Char:Root");

        schema.apply_namespace("Char:");
        assert_eq!(schema.root, "Char:Root");
    }
}
