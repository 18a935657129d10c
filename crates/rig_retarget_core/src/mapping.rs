//! Bone-name correspondence between two role schemas.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::MappingError;
use crate::schema::{ArmSlot, FaceSlot, Finger, LegSlot, RoleSchema, Side, SpineSlot};

/// Ordered source-to-target bone-name map, built once per retarget.
/// Duplicate source names are forbidden; an absent key means unmapped.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionMap(IndexMap<String, String>);

impl ConversionMap {
    pub fn get(&self, source: &str) -> Option<&str> {
        self.0.get(source).map(String::as_str)
    }

    pub fn contains_source(&self, source: &str) -> bool {
        self.0.contains_key(source)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First insertion wins; duplicate source names are rejected so a bone
    /// appearing under two roles never gets rebound.
    fn insert(&mut self, source: impl Into<String>, target: impl Into<String>) {
        let source = source.into();
        if !self.0.contains_key(&source) {
            self.0.insert(source, target.into());
        }
    }

    /// Binder-internal adjustments (root remapping, selection filtering).
    pub(crate) fn insert_override(&mut self, source: impl Into<String>, target: impl Into<String>) {
        self.0.insert(source.into(), target.into());
    }

    pub(crate) fn remove(&mut self, source: &str) -> Option<String> {
        self.0.shift_remove(source)
    }

    pub(crate) fn retain(&mut self, keep: impl FnMut(&String, &mut String) -> bool) {
        self.0.retain(keep);
    }
}

impl FromIterator<(String, String)> for ConversionMap {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut map = ConversionMap::default();
        for (source, target) in iter {
            map.insert(source, target);
        }
        map
    }
}

impl<'a> IntoIterator for &'a ConversionMap {
    type Item = (&'a String, &'a String);
    type IntoIter = indexmap::map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Find a `"Namespace:"` bone-name prefix on an armature, if any bone
/// carries one.
pub fn detect_namespace<'a>(bone_names: impl IntoIterator<Item = &'a str>) -> Option<String> {
    bone_names
        .into_iter()
        .find_map(|name| name.split_once(':').map(|(prefix, _)| format!("{prefix}:")))
}

impl RoleSchema {
    /// Build the source-to-target bone-name map against another schema.
    ///
    /// Every slot filled on both sides yields exactly one entry. The root
    /// maps only when filled on both rigs. IK slots are skipped entirely
    /// with `skip_ik` (useful for rest-pose alignment), and otherwise only
    /// map when the IK bone actually differs from its FK counterpart.
    /// Finger chains map phalanx by phalanx and must have equal lengths.
    pub fn conversion_map(
        &self,
        target: &RoleSchema,
        skip_ik: bool,
    ) -> Result<ConversionMap, MappingError> {
        let mut map = ConversionMap::default();

        if let (Some(src), Some(trg)) = (root_of(self), root_of(target)) {
            map.insert(src, trg);
        }

        for slot in FaceSlot::ALL {
            let (src, trg) = (self.face.get(slot), target.face.get(slot));
            if !src.is_empty() && !trg.is_empty() {
                map.insert(src, trg);
            }
        }

        for slot in SpineSlot::ALL {
            let (src, trg) = (self.spine.get(slot), target.spine.get(slot));
            if !src.is_empty() && !trg.is_empty() {
                map.insert(src, trg);
            }
        }

        if !skip_ik {
            for side in Side::BOTH {
                if let Some(src_ik) = self.arm_ik(side) {
                    let trg_ik = target.arm_ik(side);
                    for slot in ArmSlot::ALL {
                        let src = src_ik.get(slot);
                        // No-op rebinding of the same physical bone under
                        // two roles.
                        if src.is_empty() || src == self.arm(side).get(slot) {
                            continue;
                        }
                        if let Some(trg) = trg_ik.map(|ik| ik.get(slot)).filter(|t| !t.is_empty())
                        {
                            map.insert(src, trg);
                        }
                    }
                }
                if let Some(src_ik) = self.leg_ik(side) {
                    let trg_ik = target.leg_ik(side);
                    for slot in LegSlot::ALL {
                        let src = src_ik.get(slot);
                        if src.is_empty() || src == self.leg(side).get(slot) {
                            continue;
                        }
                        if let Some(trg) = trg_ik.map(|ik| ik.get(slot)).filter(|t| !t.is_empty())
                        {
                            map.insert(src, trg);
                        }
                    }
                }
            }
        }

        for side in Side::BOTH {
            for slot in ArmSlot::ALL {
                let (src, trg) = (self.arm(side).get(slot), target.arm(side).get(slot));
                if !src.is_empty() && !trg.is_empty() {
                    map.insert(src, trg);
                }
            }
            for slot in LegSlot::ALL {
                let (src, trg) = (self.leg(side).get(slot), target.leg(side).get(slot));
                if !src.is_empty() && !trg.is_empty() {
                    map.insert(src, trg);
                }
            }
        }

        for side in Side::BOTH {
            for finger in Finger::ALL {
                let src_chain = self.fingers(side).get(finger);
                let trg_chain = target.fingers(side).get(finger);
                if src_chain.is_empty() || trg_chain.is_empty() {
                    continue;
                }
                if src_chain.len() != trg_chain.len() {
                    return Err(MappingError::FingerChainMismatch {
                        side,
                        finger,
                        source_bones: src_chain.len(),
                        target: trg_chain.len(),
                    });
                }
                for (src, trg) in src_chain.iter().zip(trg_chain) {
                    if !src.is_empty() && !trg.is_empty() {
                        map.insert(src, trg);
                    }
                }
            }
        }

        Ok(map)
    }
}

fn root_of(schema: &RoleSchema) -> Option<&str> {
    (!schema.root.is_empty()).then_some(schema.root.as_str())
}
