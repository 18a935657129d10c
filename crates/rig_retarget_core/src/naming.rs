//! Renaming bones between naming conventions, with propagation into driver
//! expressions and action channels.

use indexmap::IndexMap;
use regex::Regex;
use tracing::warn;

use crate::host::{ArmatureAccess, SceneAccess};
use crate::mapping::ConversionMap;

#[derive(Debug, Default)]
pub struct RenameReport {
    /// Old name to final (possibly namespaced) new name.
    pub renamed: IndexMap<String, String>,
    pub drivers_updated: usize,
    pub actions_updated: usize,
}

/// Rename every bone matched by `map` to its target name, optionally under
/// a namespace prefix, then substitute the new names into driver data
/// paths and into the channel groups of every action that validates
/// against the armature.
///
/// Bones already carrying a namespace prefix are first stripped back to
/// their base names, so repeated renames are idempotent.
pub fn rename_bones<H>(
    armature: &mut H,
    map: &ConversionMap,
    namespace: Option<&str>,
) -> RenameReport
where
    H: ArmatureAccess + SceneAccess,
{
    let mut report = RenameReport::default();

    // Validate actions against the pre-rename bone names; afterwards their
    // channels no longer resolve.
    let valid_actions: Vec<String> = armature
        .action_names()
        .into_iter()
        .filter(|action| armature.action_validates(action))
        .collect();

    // Reset pass: strip existing prefixes back to base names.
    for name in armature.bone_names() {
        if let Some((_, base)) = name.rsplit_once(':') {
            let base = base.to_string();
            if let Err(error) = armature.rename_bone(&name, &base) {
                warn!(bone = %name, %error, "prefix reset failed");
            }
        }
    }

    for (src_name, trg_name) in map.iter() {
        if trg_name.is_empty() || !armature.has_bone(src_name) {
            continue;
        }
        let new_name = match namespace {
            Some(prefix) => {
                let prefix = prefix.trim_end_matches(':');
                format!("{prefix}:{trg_name}")
            }
            None => trg_name.to_string(),
        };
        match armature.rename_bone(src_name, &new_name) {
            Ok(()) => {
                report.renamed.insert(src_name.to_string(), new_name);
            }
            Err(error) => warn!(bone = %src_name, %error, "rename failed"),
        }
    }

    report.drivers_updated = rewrite_driver_paths(armature, &report.renamed);
    report.actions_updated = rewrite_action_channels(armature, &valid_actions, &report.renamed);
    report
}

/// Substitute renamed bones into driver data paths
/// (`pose.bones["old"]...` becomes `pose.bones["new"]...`).
fn rewrite_driver_paths(
    armature: &mut impl ArmatureAccess,
    renamed: &IndexMap<String, String>,
) -> usize {
    let bone_ref = Regex::new(r#"bones\["([^"]+)"\]"#).expect("static pattern");
    let mut updated = 0;
    for (index, path) in armature.driver_paths().into_iter().enumerate() {
        let Some(captures) = bone_ref.captures(&path) else {
            continue;
        };
        let old = &captures[1];
        let Some(new) = renamed.get(old) else {
            continue;
        };
        let rewritten = path.replace(&format!("bones[\"{old}\""), &format!("bones[\"{new}\""));
        armature.set_driver_path(index, rewritten);
        updated += 1;
    }
    updated
}

fn rewrite_action_channels<H>(
    host: &mut H,
    actions: &[String],
    renamed: &IndexMap<String, String>,
) -> usize
where
    H: ArmatureAccess + SceneAccess,
{
    let mut updated = 0;
    for action in actions {
        let mut touched = false;
        for group in host.action_groups(action) {
            // Groups may still carry an old namespace prefix.
            let base = group.rsplit_once(':').map(|(_, base)| base).unwrap_or(group.as_str());
            if let Some(new_name) = renamed.get(base) {
                host.rename_action_group(action, &group, new_name);
                touched = true;
            }
        }
        if touched {
            updated += 1;
        }
    }
    updated
}

/// Undo game-engine underscore renaming: `_L`/`_R` suffixes (and their
/// `_L_001` numbered variants) go back to the dotted convention, or every
/// underscore when `side_letters_only` is off. Returns the number of bones
/// renamed.
pub fn revert_dot_names(armature: &mut impl ArmatureAccess, side_letters_only: bool) -> usize {
    let numbered = Regex::new(r"_([LR])_(\d+)$").expect("static pattern");
    let plain = Regex::new(r"_([LR])$").expect("static pattern");

    let mut renamed = 0;
    for name in armature.bone_names() {
        let new_name = if side_letters_only {
            if let Some(captures) = numbered.captures(&name) {
                let replaced = format!(".{}.{}", &captures[1], &captures[2]);
                numbered.replace(&name, replaced.as_str()).into_owned()
            } else if let Some(captures) = plain.captures(&name) {
                let replaced = format!(".{}", &captures[1]);
                plain.replace(&name, replaced.as_str()).into_owned()
            } else {
                continue;
            }
        } else {
            name.replace('_', ".")
        };

        if new_name != name && armature.rename_bone(&name, &new_name).is_ok() {
            renamed += 1;
        }
    }
    renamed
}
