//! End-to-end binder scenarios against the in-memory host.

use glam::Vec3;
use rig_retarget_core::prelude::*;
use rig_retarget_core::schema::LegSlot;
use rig_retarget_scene::Armature;

fn leg_rig(name: &str, bones: [&str; 3]) -> Armature {
    let mut armature = Armature::new(name);
    armature.add_bone(bones[0], Vec3::new(0.0, 0.0, 1.0), Vec3::new(0.0, 0.0, 0.5), None);
    armature.add_bone(
        bones[1],
        Vec3::new(0.0, 0.0, 0.5),
        Vec3::new(0.0, 0.0, 0.1),
        Some(bones[0]),
    );
    armature.add_bone(
        bones[2],
        Vec3::new(0.0, 0.0, 0.1),
        Vec3::new(0.0, 0.2, 0.0),
        Some(bones[1]),
    );
    armature
}

fn leg_schema(bones: [&str; 3]) -> RoleSchema {
    let mut schema = RoleSchema::default();
    schema.set(Slot::Leg(Side::Left, LimbVariant::Fk, LegSlot::Upper), bones[0]);
    schema.set(Slot::Leg(Side::Left, LimbVariant::Fk, LegSlot::Lower), bones[1]);
    schema.set(Slot::Leg(Side::Left, LimbVariant::Fk, LegSlot::Foot), bones[2]);
    schema
}

fn loc_rot_options() -> BindOptions {
    BindOptions { location_bindings: true, rotation_bindings: true, ..Default::default() }
}

#[test]
fn three_bone_leg_binds_proxy_per_bone() {
    let mut source = leg_rig("src", ["A", "B", "C"]);
    let mut target = leg_rig("trg", ["X", "Y", "Z"]);
    let src_schema = leg_schema(["A", "B", "C"]);
    let trg_schema = leg_schema(["X", "Y", "Z"]);

    let map = src_schema.conversion_map(&trg_schema, false).unwrap();
    assert_eq!(map.len(), 3);

    let report =
        bind(&mut source, &mut target, &src_schema, &trg_schema, &map, &loc_rot_options())
            .unwrap();

    assert_eq!(report.proxies, vec!["A_RET", "B_RET", "C_RET"]);
    assert!(report.skipped.is_empty());

    for (bone, parent) in [("A_RET", "X"), ("B_RET", "Y"), ("C_RET", "Z")] {
        let rest = target.rest_bone(bone).expect("proxy exists");
        assert_eq!(rest.parent.as_deref(), Some(parent));
    }
    assert_eq!(target.collection_bones(DEFAULT_PROXY_COLLECTION).len(), 3);
    assert!(!target.collection_visible(DEFAULT_PROXY_COLLECTION));

    for bone in ["A", "B", "C"] {
        let bindings = source.bindings(bone);
        assert_eq!(bindings.len(), 2, "{bone} gets location and rotation");
        let kinds: Vec<BindingKind> = bindings.iter().map(|binding| binding.kind).collect();
        assert!(kinds.contains(&BindingKind::CopyLocation));
        assert!(kinds.contains(&BindingKind::CopyRotation));
        for binding in &bindings {
            let target_ref = binding.target.as_ref().unwrap();
            assert_eq!(target_ref.object, "trg");
            assert_eq!(target_ref.bone.as_deref(), Some(format!("{bone}_RET").as_str()));
        }
    }
}

#[test]
fn finalize_tears_down_proxies_and_bindings() {
    let mut source = leg_rig("src", ["A", "B", "C"]);
    let mut target = leg_rig("trg", ["X", "Y", "Z"]);
    let src_schema = leg_schema(["A", "B", "C"]);
    let trg_schema = leg_schema(["X", "Y", "Z"]);
    let map = src_schema.conversion_map(&trg_schema, false).unwrap();
    bind(&mut source, &mut target, &src_schema, &trg_schema, &map, &loc_rot_options()).unwrap();

    finalize(&mut source, &mut target, DEFAULT_PROXY_COLLECTION);

    for bone in ["A", "B", "C"] {
        assert!(source.bindings(bone).is_empty());
    }
    for proxy in ["A_RET", "B_RET", "C_RET"] {
        assert!(!target.has_bone(proxy), "{proxy} should be deleted");
    }
    assert!(target.collection_bones(DEFAULT_PROXY_COLLECTION).is_empty());
}

#[test]
fn skip_policy_leaves_already_bound_bones_alone() {
    let mut source = leg_rig("src", ["A", "B", "C"]);
    let mut target = leg_rig("trg", ["X", "Y", "Z"]);
    let src_schema = leg_schema(["A", "B", "C"]);
    let trg_schema = leg_schema(["X", "Y", "Z"]);
    let map = src_schema.conversion_map(&trg_schema, false).unwrap();

    source
        .add_binding(
            "B",
            Binding::copy(
                BindingKind::CopyRotation,
                BindingTarget { object: "elsewhere".into(), bone: None },
            ),
        )
        .unwrap();

    let report =
        bind(&mut source, &mut target, &src_schema, &trg_schema, &map, &loc_rot_options())
            .unwrap();

    assert_eq!(report.proxies, vec!["A_RET", "C_RET"]);
    assert_eq!(source.bindings("B").len(), 1, "pre-existing binding untouched");
}

#[test]
fn only_selected_filters_unselected_bones() {
    let mut source = leg_rig("src", ["A", "B", "C"]);
    let mut target = leg_rig("trg", ["X", "Y", "Z"]);
    source.select_bone("B", false);
    let src_schema = leg_schema(["A", "B", "C"]);
    let trg_schema = leg_schema(["X", "Y", "Z"]);
    let map = src_schema.conversion_map(&trg_schema, false).unwrap();

    let options = BindOptions { only_selected: true, ..loc_rot_options() };
    let report =
        bind(&mut source, &mut target, &src_schema, &trg_schema, &map, &options).unwrap();

    assert_eq!(report.proxies, vec!["A_RET", "C_RET"]);
    assert!(source.bindings("B").is_empty());
}

#[test]
fn missing_target_bone_skips_pair_without_aborting() {
    let mut source = leg_rig("src", ["A", "B", "C"]);
    let mut target = Armature::new("trg");
    target.add_bone("X", Vec3::ZERO, Vec3::Y, None);
    // Y and Z are missing on the target.
    let src_schema = leg_schema(["A", "B", "C"]);
    let trg_schema = leg_schema(["X", "Y", "Z"]);
    let map = src_schema.conversion_map(&trg_schema, false).unwrap();

    let report =
        bind(&mut source, &mut target, &src_schema, &trg_schema, &map, &loc_rot_options())
            .unwrap();

    assert_eq!(report.proxies, vec!["A_RET"]);
    let missing: Vec<&str> = report
        .skipped
        .iter()
        .filter(|skip| matches!(skip.reason, SkipReason::TargetMissing(_)))
        .map(|skip| skip.bone.as_str())
        .collect();
    assert_eq!(missing, vec!["B", "C"]);
}

#[test]
fn root_bone_binding_gets_clamped_limits() {
    let mut source = leg_rig("src", ["A", "B", "C"]);
    source.add_bone("rootS", Vec3::ZERO, Vec3::Y * 0.5, None);
    let mut target = leg_rig("trg", ["X", "Y", "Z"]);
    target.add_bone("rootT", Vec3::ZERO, Vec3::Y * 0.5, None);

    let mut src_schema = leg_schema(["A", "B", "C"]);
    src_schema.root = "rootS".into();
    let mut trg_schema = leg_schema(["X", "Y", "Z"]);
    trg_schema.root = "rootT".into();
    let map = src_schema.conversion_map(&trg_schema, false).unwrap();

    let options = BindOptions {
        root: RootMotionSettings {
            binding: RootBinding::Bone { source: String::new(), target: "rootT".into() },
            copy_location: AxisFlags::new(true, true, false),
            location_clamp: [
                AxisClamp::new(Some(-1.0), Some(1.0)),
                AxisClamp::default(),
                AxisClamp::default(),
            ],
            copy_rotation: AxisFlags::NONE,
        },
        ..loc_rot_options()
    };
    bind(&mut source, &mut target, &src_schema, &trg_schema, &map, &options).unwrap();

    let rest = target.rest_bone("rootS_RET").expect("root proxy exists");
    assert_eq!(rest.parent.as_deref(), Some("rootT"));

    let bindings = source.bindings("rootS");
    let limit = bindings
        .iter()
        .find(|binding| binding.kind == BindingKind::LimitLocation)
        .expect("clamp binding exists");
    assert_eq!(limit.min, [Some(-1.0), None, Some(0.0)]);
    assert_eq!(limit.max, [Some(1.0), None, Some(0.0)]);

    let rotation = bindings
        .iter()
        .find(|binding| binding.kind == BindingKind::CopyRotation)
        .expect("rotation binding exists");
    assert_eq!(rotation.axes, AxisFlags::NONE);
}

#[test]
fn world_match_proxies_copy_parent_geometry() {
    let mut source = leg_rig("src", ["A", "B", "C"]);
    let mut target = leg_rig("trg", ["X", "Y", "Z"]);
    let src_schema = leg_schema(["A", "B", "C"]);
    let trg_schema = leg_schema(["X", "Y", "Z"]);
    let map = src_schema.conversion_map(&trg_schema, false).unwrap();

    let options = BindOptions {
        match_transform: MatchTransform::WorldMatch,
        match_object_transform: false,
        ..loc_rot_options()
    };
    bind(&mut source, &mut target, &src_schema, &trg_schema, &map, &options).unwrap();

    let proxy = target.rest_bone("B_RET").unwrap();
    let parent = target.rest_bone("Y").unwrap();
    assert!((proxy.head - parent.head).length() < 1e-6);
    assert!((proxy.tail - parent.tail).length() < 1e-6);
    assert_eq!(proxy.roll, parent.roll);
}

#[test]
fn binding_status_and_control_selection() {
    let mut source = leg_rig("src", ["A", "B", "C"]);
    let mut target = leg_rig("trg", ["X", "Y", "Z"]);
    let src_schema = leg_schema(["A", "B", "C"]);
    let trg_schema = leg_schema(["X", "Y", "Z"]);
    let map = src_schema.conversion_map(&trg_schema, false).unwrap();
    bind(&mut source, &mut target, &src_schema, &trg_schema, &map, &loc_rot_options()).unwrap();

    let mut controls = constrained_control_names(&source);
    controls.sort();
    assert_eq!(controls, vec!["A", "B", "C"]);

    let muted = set_binding_status(&mut source, false, None, BindingStatus::Disable);
    assert_eq!(muted, 6);
    assert!(source.bindings("A").iter().all(|binding| binding.muted));

    let removed = set_binding_status(
        &mut source,
        false,
        Some(BindingKind::CopyLocation),
        BindingStatus::Remove,
    );
    assert_eq!(removed, 3);
    assert_eq!(source.bindings("A").len(), 1);
}

#[test]
fn zero_height_reference_bone_is_an_error() {
    let mut source = leg_rig("src", ["A", "B", "C"]);
    source.add_bone("hipsS", Vec3::new(0.0, 0.0, 1.0), Vec3::new(0.0, 0.5, 1.0), None);
    let mut target = leg_rig("trg", ["X", "Y", "Z"]);
    target.add_bone("hipsT", Vec3::ZERO, Vec3::new(0.0, 0.5, 0.0), None);

    let mut src_schema = leg_schema(["A", "B", "C"]);
    src_schema.spine.hips = "hipsS".into();
    let mut trg_schema = leg_schema(["X", "Y", "Z"]);
    trg_schema.spine.hips = "hipsT".into();
    let map = src_schema.conversion_map(&trg_schema, false).unwrap();

    let options = BindOptions {
        fit_height: Some(rig_retarget_core::schema::SpineSlot::Hips),
        ..loc_rot_options()
    };
    let result = bind(&mut source, &mut target, &src_schema, &trg_schema, &map, &options);
    assert!(matches!(result, Err(BindError::DegenerateHeight(bone)) if bone == "hipsT"));
}
