use crate::decide::{decide_execute, decide_related_bundle_action, decide_rollback};
use crate::msp::coalesce_target_ops;
use crate::plan::{PackagePlan, Plan, PlanStep, RelatedBundlePlan};
use engine_model::{
    ActionState, CurrentState, IgnoreDependencies, InstallRegistrationState, Package, PackageKind,
    RelatedBundle, RequestState,
};

/// The chain's overall intended operation, inferred from its packages so
/// related-bundle planning has a single direction to react to even though
/// a related bundle has no `requested` state of its own. Every package a
/// driving binary sets up for one run shares the same requested state (see
/// `bundle-engine`'s `cmd::run`), so the first non-`None` one found stands
/// in for the whole chain.
fn representative_request(packages: &[Package]) -> RequestState {
    packages
        .iter()
        .map(|p| p.requested)
        .find(|r| *r != RequestState::None)
        .unwrap_or(RequestState::None)
}

/// Builds the ordered execution plan for one chain. `dependent` is the id
/// this bundle registers dependents under (normally its own bundle id, but
/// `-parent` overrides it when this bundle is itself running as a chain
/// package of another bundle); `None` (`-parent:none`) suppresses
/// dependency registration entirely. Rollback-boundary markers are only
/// emitted where the manifest actually declares one
/// (`Package::rollback_boundary`); a chain that declares none at all gets
/// a single implicit boundary spanning every package, so a mid-chain
/// failure still rolls back everything that already succeeded instead of
/// leaving it committed. Each non-MSP package otherwise gets an optional
/// cache-sync ahead of an install/repair, the execute step itself, and a
/// dependency register/unregister to match — an uninstall of a package
/// still registered present for another dependent is refused unless
/// `ignore_dependencies` says to bypass it. MSP packages never get their
/// own `ExecutePackage` step; instead every patch that still needs action
/// is coalesced by target product into an `MspTargetOp`, so the executor
/// applies chained patches to a given product in one ordered pass
/// regardless of the patches' declaration order in the chain. Related
/// bundles plan their own action from the chain's overall requested
/// operation and their declared relation type.
pub fn build_plan(
    packages: &[Package],
    related: &[RelatedBundle],
    dependent: Option<&str>,
    ignore_dependencies: &IgnoreDependencies,
) -> Plan {
    let mut plan = Plan::new();
    let mut checkpoint_id = 0u32;
    let mut boundary_open = false;
    let boundary_name = dependent.unwrap_or("chain");

    for package in packages {
        if matches!(package.kind, PackageKind::Msp(_)) {
            continue;
        }
        let mut execute = decide_execute(
            package.current_state,
            package.requested,
            package.permanent,
            package.repairable(),
            package.uninstallable(),
        );

        if execute == ActionState::Uninstall
            && package.install_registration_state == InstallRegistrationState::Present
            && !ignore_dependencies.ignores(&package.id)
        {
            log::warn!(
                "refusing to uninstall '{}': still registered present for another dependent",
                package.id
            );
            execute = ActionState::None;
        }

        let was_present = matches!(
            package.current_state,
            CurrentState::Present | CurrentState::Superseded | CurrentState::Cached
        );
        let rollback = decide_rollback(execute, was_present, package.permanent);

        if execute == ActionState::None {
            continue;
        }

        if let Some(boundary) = &package.rollback_boundary {
            plan.push(PlanStep::RollbackBoundary { id: boundary.id.clone(), vital: boundary.vital });
            boundary_open = true;
        } else if !boundary_open {
            plan.push(PlanStep::RollbackBoundary { id: format!("{}-chain-boundary", boundary_name), vital: true });
            boundary_open = true;
        }

        if matches!(execute, ActionState::Install | ActionState::Repair) {
            plan.push(PlanStep::CacheSync { package_id: package.id.clone() });
        }

        if let Some(dependent) = dependent {
            if package.can_affect_registration && matches!(execute, ActionState::Install) {
                plan.push(PlanStep::RegisterDependency {
                    package_id: package.id.clone(),
                    dependent: dependent.to_string(),
                });
            }
        }

        plan.push(PlanStep::ExecutePackage(PackagePlan {
            package_id: package.id.clone(),
            per_machine: package.per_machine,
            execute,
            rollback,
        }));

        if let Some(dependent) = dependent {
            if package.can_affect_registration && matches!(execute, ActionState::Uninstall) {
                plan.push(PlanStep::UnregisterDependency {
                    package_id: package.id.clone(),
                    dependent: dependent.to_string(),
                });
            }
        }

        checkpoint_id += 1;
        plan.push(PlanStep::Checkpoint { id: checkpoint_id });
    }

    for op in coalesce_target_ops(packages) {
        let vital = !op
            .patches
            .iter()
            .all(|id| packages.iter().find(|p| p.id == *id).map(|p| p.permanent).unwrap_or(false));

        plan.push(PlanStep::RollbackBoundary {
            id: format!("{}-msp-boundary", op.product_code),
            vital,
        });
        log::debug!("msp target op for '{}' queues patches {:?}", op.product_code, op.patches);
        plan.push(PlanStep::MspTargetOp(op));

        checkpoint_id += 1;
        plan.push(PlanStep::Checkpoint { id: checkpoint_id });
    }

    let bundle_requested = representative_request(packages);
    for bundle in related {
        let action = decide_related_bundle_action(bundle.relation_type, bundle_requested, bundle.package.current_state);
        if action == ActionState::None {
            continue;
        }

        let chain_package = matches!(bundle.relation_type, engine_model::RelationType::ChainPackage);

        plan.push(PlanStep::RollbackBoundary {
            id: format!("{}-related-boundary", bundle.package.id),
            vital: false,
        });
        plan.push(PlanStep::RelatedBundleOp(RelatedBundlePlan {
            bundle_id: bundle.package.id.clone(),
            per_machine: bundle.package.per_machine,
            action,
            chain_package,
        }));

        checkpoint_id += 1;
        plan.push(PlanStep::Checkpoint { id: checkpoint_id });
    }

    plan
}
