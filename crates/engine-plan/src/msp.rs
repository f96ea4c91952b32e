use crate::decide::decide_execute;
use engine_model::{ActionState, CurrentState, Package, PackageKind, PatchTarget, RequestState};

/// One target product's coalesced patch queue. A single target can be hit
/// by several independent MSP packages in the chain; rather than letting
/// each apply itself in isolation, every patch that touches this product
/// lands in one op so the executor applies them against it in a single
/// ordered pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MspTargetOp {
    pub product_code: String,
    pub per_machine: bool,
    /// Patch package ids, ascending by sequence, with no duplicates.
    pub patches: Vec<String>,
}

/// The aggregate downgrade rule: installing a patch whose sequence is
/// lower than one already applied to a target (`Superseded`) is refused
/// for that target — the newer patch stays in charge. A patch is only
/// dropped from a target's op list, never from the whole plan, since it
/// may still apply cleanly to its other targets.
pub fn filter_superseded_targets(patch_id: &str, targets: &[PatchTarget]) -> Vec<&PatchTarget> {
    targets
        .iter()
        .filter(|t| t.state != CurrentState::Superseded)
        .inspect(|t| {
            log::debug!(
                "patch '{}' will target product '{}' (sequence {})",
                patch_id,
                t.product_code,
                t.sequence
            );
        })
        .collect()
}

struct BuildingOp {
    product_code: String,
    per_machine: bool,
    patches: Vec<(u32, String)>,
}

/// Groups every MSP package in the chain that still needs action into one
/// `MspTargetOp` per `(product_code, per_machine)` pair, with the ordered
/// list of patches that touch it. A package whose current/requested state
/// calls for no action (already at rest) never reaches a target op, the
/// same shortcut the rest of the plan takes for non-MSP packages.
pub fn coalesce_target_ops(packages: &[Package]) -> Vec<MspTargetOp> {
    let mut building: Vec<BuildingOp> = Vec::new();

    for package in packages {
        let PackageKind::Msp(spec) = &package.kind else { continue };
        if decide_execute(
            package.current_state,
            package.requested,
            package.permanent,
            package.repairable(),
            package.uninstallable(),
        ) == ActionState::None
        {
            continue;
        }

        for target in filter_superseded_targets(&package.id, &spec.target_products) {
            if target_forced_off(target, packages) {
                continue;
            }

            match building
                .iter_mut()
                .find(|op| op.product_code == target.product_code && op.per_machine == target.per_machine)
            {
                Some(op) => {
                    if !op.patches.iter().any(|(_, id)| id == &package.id) {
                        op.patches.push((target.sequence, package.id.clone()));
                    }
                }
                None => building.push(BuildingOp {
                    product_code: target.product_code.clone(),
                    per_machine: target.per_machine,
                    patches: vec![(target.sequence, package.id.clone())],
                }),
            }
        }
    }

    building.sort_by(|a, b| a.product_code.cmp(&b.product_code));
    building
        .into_iter()
        .map(|mut op| {
            op.patches.sort_by_key(|(sequence, _)| *sequence);
            MspTargetOp {
                product_code: op.product_code,
                per_machine: op.per_machine,
                patches: op.patches.into_iter().map(|(_, id)| id).collect(),
            }
        })
        .collect()
}

/// Mirrors `mspengine.cpp`'s `MspEnginePlanInitializePackage` forcing rule:
/// a target that only exists because it's slipstream-required (the MSI
/// lists this patch but the target-product scan never surfaced it, so
/// `engine_model::detect::link_slipstream_patches` synthesized it) and
/// that isn't installed yet has nothing to attach the patch to unless its
/// chain MSI is itself about to be installed. If that MSI's own requested
/// state doesn't call for `Present`, the target is dropped from this
/// round's plan instead of scheduling a patch against a product that will
/// never exist.
fn target_forced_off(target: &PatchTarget, packages: &[Package]) -> bool {
    if !target.slipstream_required {
        return false;
    }
    if matches!(target.state, CurrentState::Present | CurrentState::Superseded | CurrentState::Cached) {
        return false;
    }

    let chain_msi_becomes_present = packages.iter().any(|p| match &p.kind {
        PackageKind::Msi(spec) => {
            spec.product_code == target.product_code
                && matches!(p.requested, RequestState::Present | RequestState::ForcePresent)
        }
        _ => false,
    });

    !chain_msi_becomes_present
}
