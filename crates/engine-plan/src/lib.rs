//! Decision matrix and plan assembly (component C5): turns detected
//! package states plus requested states into an ordered execution plan.

mod assemble;
mod decide;
mod error;
mod msp;
mod plan;

pub use assemble::build_plan;
pub use decide::{decide_execute, decide_related_bundle_action, decide_rollback};
pub use error::{Error, Result};
pub use msp::{coalesce_target_ops, filter_superseded_targets, MspTargetOp};
pub use plan::{PackagePlan, Plan, PlanStep, RelatedBundlePlan};

#[cfg(test)]
mod tests {
    use super::*;
    use engine_model::{
        ActionState, CurrentState, ExeSpec, DetectionType, IgnoreDependencies, InstallRegistrationState,
        MsiSpec, MspSpec, Package, PackageKind, PatchTarget, ProtocolType, RequestState,
    };

    fn exe_package(id: &str, current: CurrentState, requested: RequestState) -> Package {
        let mut pkg = Package::new(
            id,
            PackageKind::Exe(ExeSpec {
                detection: DetectionType::Condition,
                arp_display_version: None,
                arp_per_machine: true,
                install_arguments: String::new(),
                repair_arguments: None,
                uninstall_arguments: None,
                exit_codes: Vec::new(),
                protocol: ProtocolType::None,
                repairable: true,
                uninstallable: true,
            }),
        );
        pkg.current_state = current;
        pkg.requested = requested;
        pkg
    }

    #[test]
    fn absent_plus_present_request_installs() {
        assert_eq!(
            decide_execute(CurrentState::Absent, RequestState::Present, false, true, true),
            ActionState::Install
        );
    }

    #[test]
    fn present_plus_present_request_is_noop() {
        assert_eq!(
            decide_execute(CurrentState::Present, RequestState::Present, false, true, true),
            ActionState::None
        );
    }

    #[test]
    fn force_present_reinstalls_even_when_already_present() {
        assert_eq!(
            decide_execute(CurrentState::Present, RequestState::ForcePresent, false, true, true),
            ActionState::Install
        );
    }

    #[test]
    fn present_plus_absent_request_is_uninstall_unless_permanent() {
        assert_eq!(
            decide_execute(CurrentState::Present, RequestState::Absent, false, true, true),
            ActionState::Uninstall
        );
        assert_eq!(
            decide_execute(CurrentState::Present, RequestState::Absent, true, true, true),
            ActionState::None
        );
    }

    #[test]
    fn repair_request_is_a_noop_when_the_package_declares_itself_unrepairable() {
        assert_eq!(
            decide_execute(CurrentState::Present, RequestState::Repair, false, false, true),
            ActionState::None
        );
        assert_eq!(
            decide_execute(CurrentState::Present, RequestState::Repair, false, true, true),
            ActionState::Repair
        );
    }

    #[test]
    fn absent_and_force_absent_requests_are_noops_when_the_package_declares_itself_uninstallable_false() {
        assert_eq!(
            decide_execute(CurrentState::Present, RequestState::Absent, false, true, false),
            ActionState::None
        );
        assert_eq!(
            decide_execute(CurrentState::Present, RequestState::ForceAbsent, false, true, false),
            ActionState::None
        );
        assert_eq!(
            decide_execute(CurrentState::Present, RequestState::ForceAbsent, false, true, true),
            ActionState::Uninstall
        );
    }

    #[test]
    fn rollback_of_install_is_uninstall_unless_permanent() {
        assert_eq!(decide_rollback(ActionState::Install, false, false), ActionState::Uninstall);
        assert_eq!(decide_rollback(ActionState::Install, false, true), ActionState::None);
    }

    #[test]
    fn rollback_of_uninstall_restores_if_was_present() {
        assert_eq!(decide_rollback(ActionState::Uninstall, true, false), ActionState::Install);
        assert_eq!(decide_rollback(ActionState::Uninstall, false, false), ActionState::None);
    }

    #[test]
    fn plan_skips_noop_packages_and_opens_the_chain_boundary_on_the_first_real_one() {
        let packages = vec![
            exe_package("A", CurrentState::Present, RequestState::Present),
            exe_package("B", CurrentState::Absent, RequestState::Present),
        ];
        let plan = build_plan(&packages, &[], Some("Bundle1"), &IgnoreDependencies::None);

        let boundaries: Vec<_> = plan
            .steps
            .iter()
            .filter(|s| matches!(s, PlanStep::RollbackBoundary { .. }))
            .collect();
        assert_eq!(boundaries.len(), 1);
        assert!(matches!(
            boundaries[0],
            PlanStep::RollbackBoundary { id, vital: true } if id == "Bundle1-chain-boundary"
        ));
        assert!(plan
            .package_steps()
            .any(|p| p.package_id == "B" && p.execute == ActionState::Install));
        assert_eq!(plan.package_steps().count(), 1);
    }

    #[test]
    fn requires_elevation_is_true_only_when_a_per_machine_package_has_a_real_action() {
        let mut per_machine_noop = exe_package("A", CurrentState::Present, RequestState::Present);
        per_machine_noop.per_machine = true;
        let plan = build_plan(&[per_machine_noop], &[], Some("Bundle1"), &IgnoreDependencies::None);
        assert!(!plan.requires_elevation(), "a noop package shouldn't force elevation");

        let mut per_user = exe_package("A", CurrentState::Absent, RequestState::Present);
        per_user.per_machine = false;
        let plan = build_plan(&[per_user], &[], Some("Bundle1"), &IgnoreDependencies::None);
        assert!(!plan.requires_elevation(), "a per-user install shouldn't force elevation");

        let mut per_machine_install = exe_package("A", CurrentState::Absent, RequestState::Present);
        per_machine_install.per_machine = true;
        let plan = build_plan(&[per_machine_install], &[], Some("Bundle1"), &IgnoreDependencies::None);
        assert!(plan.requires_elevation(), "a per-machine install should force elevation");
    }

    #[test]
    fn undeclared_boundaries_wrap_the_whole_chain_so_a_mid_chain_failure_can_roll_everything_back() {
        let packages = vec![
            exe_package("A", CurrentState::Absent, RequestState::Present),
            exe_package("B", CurrentState::Absent, RequestState::Present),
            exe_package("C", CurrentState::Absent, RequestState::Present),
        ];
        let plan = build_plan(&packages, &[], Some("Bundle1"), &IgnoreDependencies::None);

        let boundaries: Vec<_> = plan
            .steps
            .iter()
            .filter(|s| matches!(s, PlanStep::RollbackBoundary { .. }))
            .collect();
        assert_eq!(boundaries.len(), 1, "no manifest declarations means one boundary for the whole chain");
        assert_eq!(plan.package_steps().count(), 3);
    }

    #[test]
    fn a_declared_boundary_starts_a_new_segment() {
        let mut packages = vec![
            exe_package("A", CurrentState::Absent, RequestState::Present),
            exe_package("B", CurrentState::Absent, RequestState::Present),
        ];
        packages[1].rollback_boundary = Some(engine_model::RollbackBoundary { id: "segment-2".to_string(), vital: false });
        let plan = build_plan(&packages, &[], Some("Bundle1"), &IgnoreDependencies::None);

        let boundary_ids: Vec<_> = plan
            .steps
            .iter()
            .filter_map(|s| match s {
                PlanStep::RollbackBoundary { id, vital } => Some((id.as_str(), *vital)),
                _ => None,
            })
            .collect();
        assert_eq!(boundary_ids, vec![("Bundle1-chain-boundary", true), ("segment-2", false)]);
    }

    #[test]
    fn install_schedules_cache_sync_and_dependency_registration() {
        let packages = vec![exe_package("B", CurrentState::Absent, RequestState::Present)];
        let plan = build_plan(&packages, &[], Some("Bundle1"), &IgnoreDependencies::None);

        let cache_index = plan.steps.iter().position(|s| matches!(s, PlanStep::CacheSync { .. })).unwrap();
        let register_index = plan
            .steps
            .iter()
            .position(|s| matches!(s, PlanStep::RegisterDependency { .. }))
            .unwrap();
        let execute_index = plan.steps.iter().position(|s| matches!(s, PlanStep::ExecutePackage(_))).unwrap();
        assert!(cache_index < register_index);
        assert!(register_index < execute_index);
    }

    #[test]
    fn msp_target_ops_are_grouped_and_sequence_ordered() {
        let mut patch_a = Package::new("PatchA", PackageKind::Msp(MspSpec::default()));
        patch_a.current_state = CurrentState::Absent;
        patch_a.requested = RequestState::Present;
        let PackageKind::Msp(spec_a) = &mut patch_a.kind else { unreachable!() };
        spec_a.patch_code = "{PatchA}".to_string();
        spec_a.target_products = vec![PatchTarget {
            product_code: "{Product}".to_string(),
            per_machine: true,
            sequence: 2,
            state: CurrentState::Present,
        slipstream: false,
        slipstream_required: false,
        }];

        let mut patch_b = Package::new("PatchB", PackageKind::Msp(MspSpec::default()));
        patch_b.current_state = CurrentState::Absent;
        patch_b.requested = RequestState::Present;
        let PackageKind::Msp(spec_b) = &mut patch_b.kind else { unreachable!() };
        spec_b.patch_code = "{PatchB}".to_string();
        spec_b.target_products = vec![PatchTarget {
            product_code: "{Product}".to_string(),
            per_machine: true,
            sequence: 1,
            state: CurrentState::Present,
        slipstream: false,
        slipstream_required: false,
        }];

        let ops = coalesce_target_ops(&[patch_a, patch_b]);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].product_code, "{Product}");
        assert_eq!(ops[0].patches, vec!["PatchB".to_string(), "PatchA".to_string()]);
    }

    #[test]
    fn build_plan_schedules_one_msp_target_op_per_product() {
        let mut patch_a = Package::new("PatchA", PackageKind::Msp(MspSpec::default()));
        patch_a.current_state = CurrentState::Absent;
        patch_a.requested = RequestState::Present;
        let PackageKind::Msp(spec_a) = &mut patch_a.kind else { unreachable!() };
        spec_a.patch_code = "{PatchA}".to_string();
        spec_a.target_products = vec![PatchTarget {
            product_code: "{Product}".to_string(),
            per_machine: true,
            sequence: 1,
            state: CurrentState::Present,
        slipstream: false,
        slipstream_required: false,
        }];

        let plan = build_plan(&[patch_a], &[], Some("Bundle1"), &IgnoreDependencies::None);
        assert!(!plan.is_noop());
        let ops: Vec<_> = plan
            .steps
            .iter()
            .filter_map(|s| match s {
                PlanStep::MspTargetOp(op) => Some(op),
                _ => None,
            })
            .collect();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].patches, vec!["PatchA".to_string()]);
        assert!(!plan.steps.iter().any(|s| matches!(s, PlanStep::ExecutePackage(_))));
    }

    #[test]
    fn superseded_targets_are_dropped_by_the_downgrade_rule() {
        let targets = vec![PatchTarget {
            product_code: "{Product}".to_string(),
            per_machine: true,
            sequence: 1,
            state: CurrentState::Superseded,
            slipstream: false,
            slipstream_required: false,
        }];
        assert!(filter_superseded_targets("PatchA", &targets).is_empty());
    }

    #[test]
    fn slipstream_required_target_is_dropped_until_its_msi_is_actually_requested_present() {
        let msi = Package::new(
            "MsiA",
            PackageKind::Msi(MsiSpec {
                product_code: "{Product}".to_string(),
                upgrade_codes: Vec::new(),
                features: Vec::new(),
                slipstream_patches: vec!["{Patch}".to_string()],
            }),
        );

        let mut patch = Package::new("PatchA", PackageKind::Msp(MspSpec::default()));
        patch.current_state = CurrentState::Absent;
        patch.requested = RequestState::Present;
        let PackageKind::Msp(spec) = &mut patch.kind else { unreachable!() };
        spec.patch_code = "{Patch}".to_string();
        spec.target_products = vec![PatchTarget {
            product_code: "{Product}".to_string(),
            per_machine: true,
            sequence: 1,
            state: CurrentState::Absent,
            slipstream: true,
            slipstream_required: true,
        }];

        // The MSI isn't requested present, so the patch has nothing to ride along with.
        let ops = coalesce_target_ops(&[msi.clone(), patch.clone()]);
        assert!(ops.is_empty());

        // Once the MSI is actually going in, the patch rides along with it.
        let mut msi_present = msi;
        msi_present.requested = RequestState::Present;
        let ops = coalesce_target_ops(&[msi_present, patch]);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].patches, vec!["PatchA".to_string()]);
    }

    fn related(id: &str, relation: engine_model::RelationType, current: CurrentState) -> engine_model::RelatedBundle {
        let mut package = Package::new(id, PackageKind::Exe(ExeSpec {
            detection: DetectionType::Condition,
            arp_display_version: None,
            arp_per_machine: true,
            install_arguments: String::new(),
            repair_arguments: None,
            uninstall_arguments: None,
            exit_codes: Vec::new(),
            protocol: ProtocolType::None,
            repairable: false,
            uninstallable: false,
        }));
        package.current_state = current;
        engine_model::RelatedBundle::new(package, relation)
    }

    #[test]
    fn chain_package_related_bundle_mirrors_the_primary_requested_operation() {
        let packages = vec![exe_package("A", CurrentState::Absent, RequestState::Present)];
        let bundles = vec![related("{Slave}", engine_model::RelationType::ChainPackage, CurrentState::Absent)];
        let plan = build_plan(&packages, &bundles, Some("Bundle1"), &IgnoreDependencies::None);

        let op = plan.steps.iter().find_map(|s| match s {
            PlanStep::RelatedBundleOp(op) => Some(op),
            _ => None,
        });
        let op = op.expect("expected a RelatedBundleOp for the chain package relation");
        assert_eq!(op.bundle_id, "{Slave}");
        assert_eq!(op.action, ActionState::Install);
        assert!(op.chain_package);
    }

    #[test]
    fn upgrade_related_bundle_is_uninstalled_when_present_during_a_fresh_install() {
        let packages = vec![exe_package("A", CurrentState::Absent, RequestState::Present)];
        let bundles = vec![related("{OldBundle}", engine_model::RelationType::Upgrade, CurrentState::Present)];
        let plan = build_plan(&packages, &bundles, Some("Bundle1"), &IgnoreDependencies::None);

        let op = plan
            .steps
            .iter()
            .find_map(|s| match s {
                PlanStep::RelatedBundleOp(op) => Some(op),
                _ => None,
            })
            .expect("expected a RelatedBundleOp for the upgrade relation");
        assert_eq!(op.action, ActionState::Uninstall);
        assert!(!op.chain_package);
    }

    #[test]
    fn detect_only_relations_never_produce_a_plan_step() {
        let packages = vec![exe_package("A", CurrentState::Absent, RequestState::Present)];
        let bundles = vec![related("{Other}", engine_model::RelationType::Detect, CurrentState::Present)];
        let plan = build_plan(&packages, &bundles, Some("Bundle1"), &IgnoreDependencies::None);

        assert!(!plan.steps.iter().any(|s| matches!(s, PlanStep::RelatedBundleOp(_))));
    }

    fn shared_package_still_registered_present() -> Package {
        let mut pkg = exe_package("Shared", CurrentState::Present, RequestState::Absent);
        pkg.install_registration_state = InstallRegistrationState::Present;
        pkg
    }

    #[test]
    fn uninstall_of_a_still_registered_package_is_refused_by_default() {
        let packages = vec![shared_package_still_registered_present()];
        let plan = build_plan(&packages, &[], Some("Bundle1"), &IgnoreDependencies::None);
        assert!(plan.is_noop());
    }

    #[test]
    fn ignore_dependencies_all_lets_the_uninstall_through() {
        let packages = vec![shared_package_still_registered_present()];
        let plan = build_plan(&packages, &[], Some("Bundle1"), &IgnoreDependencies::All);
        assert_eq!(plan.package_steps().next().unwrap().execute, ActionState::Uninstall);
    }

    #[test]
    fn ignore_dependencies_packages_only_bypasses_the_named_ones() {
        let packages = vec![shared_package_still_registered_present()];
        let ignore = IgnoreDependencies::Packages(vec!["Other".to_string()]);
        let plan = build_plan(&packages, &[], Some("Bundle1"), &ignore);
        assert!(plan.is_noop());

        let ignore = IgnoreDependencies::Packages(vec!["Shared".to_string()]);
        let plan = build_plan(&packages, &[], Some("Bundle1"), &ignore);
        assert_eq!(plan.package_steps().next().unwrap().execute, ActionState::Uninstall);
    }

    #[test]
    fn no_dependent_suppresses_dependency_registration_steps() {
        let packages = vec![exe_package("A", CurrentState::Absent, RequestState::Present)];
        let plan = build_plan(&packages, &[], None, &IgnoreDependencies::None);
        assert!(!plan
            .steps
            .iter()
            .any(|s| matches!(s, PlanStep::RegisterDependency { .. } | PlanStep::UnregisterDependency { .. })));
        assert!(plan
            .steps
            .iter()
            .any(|s| matches!(s, PlanStep::RollbackBoundary { id, .. } if id == "chain-chain-boundary")));
    }
}
