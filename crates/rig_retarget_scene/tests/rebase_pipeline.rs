//! Root-motion rebasing against the in-memory host.

use glam::{Mat4, Vec3};
use rig_retarget_core::prelude::*;
use rig_retarget_scene::{Action, Armature};

const TOLERANCE: f32 = 1e-4;

fn assert_matrix_eq(a: Mat4, b: Mat4) {
    let difference = (a - b).abs().to_cols_array();
    assert!(
        difference.iter().all(|v| *v < TOLERANCE),
        "matrices differ:\n{a}\nvs\n{b}"
    );
}

/// Armature with an identity-rest hips bone, a root bone and a keyed
/// walk cycle on the hips.
fn walking_rig(x_keys: &[(f32, f32)]) -> (Armature, RoleSchema) {
    let mut armature = Armature::new("rig");
    armature.add_bone("root", Vec3::ZERO, Vec3::Y, None);
    armature.add_bone("hips", Vec3::ZERO, Vec3::Y, None);

    let mut action = Action::new("walk");
    for (frame, value) in x_keys {
        action.insert_key("pose.bones[\"hips\"].location", 0, Some("hips"), *frame, *value, false);
    }
    armature.set_action(action);

    let mut schema = RoleSchema::default();
    schema.root = "root".into();
    schema.spine.hips = "hips".into();
    (armature, schema)
}

#[test]
fn rest_offset_rebase_reproduces_sampled_motion() {
    let (mut armature, schema) = walking_rig(&[(1.0, 0.0), (5.0, 2.0), (10.0, 4.5)]);

    let mut original = vec![];
    for frame in 1..=10 {
        armature.set_frame(frame);
        original.push((
            armature.pose_matrix("hips").unwrap(),
            armature.pose_matrix("root").unwrap(),
        ));
    }

    let mut rebaser = Rebaser::new();
    let options = RebaseOptions {
        motion_bone: "hips".into(),
        target: MotionTarget::Bone("root".into()),
        keep_offset: true,
        offset: OffsetPolicy::Rest,
        copy_location: AxisFlags::ALL,
        copy_rotation: AxisFlags::ALL,
        ..Default::default()
    };
    let report = rebaser.run(&mut armature, &schema, &options).unwrap();
    assert_eq!(report.frames, 10);
    assert!(report.floating_bones.contains(&"hips".to_string()));

    // The hips animation was already rest-relative, so the root must
    // reproduce it frame for frame and the hips must not move.
    for (i, frame) in (1..=10).enumerate() {
        armature.set_frame(frame);
        assert_matrix_eq(armature.pose_matrix("root").unwrap(), original[i].0);
        assert_matrix_eq(armature.pose_matrix("hips").unwrap(), original[i].0);
    }
}

#[test]
fn floating_bones_keep_world_transforms_under_object_rebase() {
    let (mut armature, mut schema) = walking_rig(&[(1.0, 0.0), (6.0, 3.0)]);
    armature.add_bone("prop", Vec3::new(1.0, 0.0, 2.0), Vec3::new(1.0, 1.0, 2.0), None);
    schema.face.jaw = "prop".into();

    let mut world_before = vec![];
    for frame in 1..=6 {
        armature.set_frame(frame);
        world_before.push((
            armature.world_bone_matrix("prop").unwrap(),
            armature.world_bone_matrix("hips").unwrap(),
        ));
    }

    let mut rebaser = Rebaser::new();
    let options = RebaseOptions {
        motion_bone: "hips".into(),
        target: MotionTarget::Object,
        ..Default::default()
    };
    rebaser.run(&mut armature, &schema, &options).unwrap();

    for (i, frame) in (1..=6).enumerate() {
        armature.set_frame(frame);

        // The object took over the hips' X travel...
        let expected_x = world_before[i].1.w_axis.x;
        let world_x = armature.world_matrix().w_axis.x;
        assert!((world_x - expected_x).abs() < TOLERANCE);

        // ...while floating bones stay visually in place.
        assert_matrix_eq(armature.world_bone_matrix("prop").unwrap(), world_before[i].0);
        assert_matrix_eq(armature.world_bone_matrix("hips").unwrap(), world_before[i].1);
    }
}

#[test]
fn location_clamps_apply_per_axis() {
    let (mut armature, schema) = walking_rig(&[(1.0, -5.0), (2.0, 0.0), (3.0, 5.0)]);

    let mut rebaser = Rebaser::new();
    let mut options = RebaseOptions {
        motion_bone: "hips".into(),
        target: MotionTarget::Bone("root".into()),
        copy_location: AxisFlags::new(true, false, false),
        location_clamp: [
            AxisClamp::new(Some(-1.0), Some(1.0)),
            AxisClamp::default(),
            AxisClamp::default(),
        ],
        copy_rotation: AxisFlags::ALL,
        ..Default::default()
    };
    rebaser.run(&mut armature, &schema, &options).unwrap();

    let expected = [-1.0, 0.0, 1.0];
    for (i, frame) in (1..=3).enumerate() {
        armature.set_frame(frame);
        let x = armature.pose_matrix("root").unwrap().w_axis.x;
        assert!((x - expected[i]).abs() < TOLERANCE, "frame {frame}: {x}");
    }

    // Dropping the max clamp lets the peak through unclamped; the cache is
    // still warm, only the bake repeats.
    options.location_clamp[0] = AxisClamp::new(Some(-1.0), None);
    rebaser.run(&mut armature, &schema, &options).unwrap();

    let expected = [-1.0, 0.0, 5.0];
    for (i, frame) in (1..=3).enumerate() {
        armature.set_frame(frame);
        let x = armature.pose_matrix("root").unwrap().w_axis.x;
        assert!((x - expected[i]).abs() < TOLERANCE, "frame {frame}: {x}");
    }
}

#[test]
fn rebase_without_action_is_an_error() {
    let mut armature = Armature::new("rig");
    armature.add_bone("hips", Vec3::ZERO, Vec3::Y, None);
    let mut schema = RoleSchema::default();
    schema.spine.hips = "hips".into();

    let mut rebaser = Rebaser::new();
    let options = RebaseOptions { motion_bone: "hips".into(), ..Default::default() };
    assert!(matches!(
        rebaser.run(&mut armature, &schema, &options),
        Err(RebaseError::NoAction(_))
    ));
}

#[test]
fn add_root_bone_reparents_hips_under_namespaced_root() {
    let mut armature = Armature::new("rig");
    armature.add_bone(
        "mixamorig:Hips",
        Vec3::new(0.0, 0.0, 1.0),
        Vec3::new(0.0, 0.5, 1.0),
        None,
    );

    let root = add_root_bone(&mut armature, "mixamorig:Hips", "Root").unwrap();
    assert_eq!(root, "mixamorig:Root");

    let root_rest = armature.rest_bone(&root).unwrap();
    assert!((root_rest.length() - 1.5).abs() < TOLERANCE);
    assert_eq!(
        armature.rest_bone("mixamorig:Hips").unwrap().parent.as_deref(),
        Some("mixamorig:Root")
    );

    assert!(matches!(
        add_root_bone(&mut armature, "missing", "Root"),
        Err(RebaseError::HipsMissing(_))
    ));
}
