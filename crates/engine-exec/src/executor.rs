use crate::backend::InstallerBackend;
use crate::commandline::{assemble, redact_for_log};
use crate::exitcode::{classify, is_error, requires_reboot};
use crate::runmode::RunMode;
use anyhow::{bail, Context, Result};
use engine_model::{ActionState, ExeSpec, Package, PackageKind, RegistrationBackend};
use engine_plan::{MspTargetOp, PackagePlan, Plan, PlanStep, RelatedBundlePlan};
use engine_vars::VariableStore;
use log::{debug, info, warn};

/// Runs every step of `plan` in order. A failure inside a vital rollback
/// segment rolls that segment back (in reverse order, using each
/// package's `rollback` action) before the error is returned; a failure
/// past a non-vital boundary is just propagated, since earlier segments
/// already committed. `bundle_id` is this bundle's own provider id,
/// passed as `-parent` to any chain-package related bundle we launch.
pub async fn run_plan(
    plan: &Plan,
    packages: &[Package],
    store: &VariableStore,
    backend: &dyn InstallerBackend,
    registration: &dyn RegistrationBackend,
    bundle_id: &str,
    mode: RunMode,
) -> Result<bool> {
    if !mode.may_execute() {
        bail!("run mode {:?} may not execute a plan", mode);
    }

    let mut segment: Vec<PackagePlan> = Vec::new();
    let mut vital = true;
    let mut reboot_required = false;

    for step in &plan.steps {
        match step {
            PlanStep::RollbackBoundary { id, vital: is_vital } => {
                debug!("entering rollback boundary '{}' (vital={})", id, is_vital);
                segment.clear();
                vital = *is_vital;
            }
            PlanStep::CacheSync { package_id } => {
                debug!("cache sync for '{}' (payload staging happens below this crate)", package_id);
            }
            PlanStep::RegisterDependency { package_id, dependent } => {
                if let Err(reason) = registration.register_dependency(package_id, dependent) {
                    warn!("registering '{}' as a dependent of '{}' failed: {}", dependent, package_id, reason);
                    if vital {
                        rollback_segment(&segment, packages, store, backend).await?;
                    }
                    bail!("registering '{}' as a dependent of '{}': {}", dependent, package_id, reason);
                }
                debug!("registered '{}' as a dependent of '{}'", dependent, package_id);
            }
            PlanStep::UnregisterDependency { package_id, dependent } => {
                if let Err(reason) = registration.unregister_dependency(package_id, dependent) {
                    warn!("unregistering '{}' as a dependent of '{}' failed: {}", dependent, package_id, reason);
                    if vital {
                        rollback_segment(&segment, packages, store, backend).await?;
                    }
                    bail!("unregistering '{}' as a dependent of '{}': {}", dependent, package_id, reason);
                }
                debug!("unregistered '{}' as a dependent of '{}'", dependent, package_id);
            }
            PlanStep::Checkpoint { id } => {
                info!("checkpoint {} reached", id);
            }
            PlanStep::ExecutePackage(action) => {
                match run_package(action, packages, store, backend).await {
                    Ok(reboot) => {
                        reboot_required |= reboot;
                        segment.push(action.clone());
                    }
                    Err(err) => {
                        warn!("package '{}' failed: {:#}", action.package_id, err);
                        if vital {
                            rollback_segment(&segment, packages, store, backend).await?;
                        }
                        return Err(err);
                    }
                }
            }
            PlanStep::MspTargetOp(op) => match run_msp_target_op(op, backend).await {
                Ok(reboot) => reboot_required |= reboot,
                Err(err) => {
                    warn!("msp target op for '{}' failed: {:#}", op.product_code, err);
                    if vital {
                        rollback_segment(&segment, packages, store, backend).await?;
                    }
                    return Err(err);
                }
            },
            PlanStep::RelatedBundleOp(op) => match run_related_bundle_op(op, bundle_id, backend).await {
                Ok(reboot) => reboot_required |= reboot,
                Err(err) => {
                    warn!("related bundle '{}' failed: {:#}", op.bundle_id, err);
                    if vital {
                        rollback_segment(&segment, packages, store, backend).await?;
                    }
                    return Err(err);
                }
            },
        }
    }

    Ok(reboot_required)
}

/// Applies every patch queued against one target product, in order.
/// A patch, once applied, is never rolled back individually here; the
/// op's enclosing rollback boundary governs whether earlier segments
/// unwind on failure.
async fn run_msp_target_op(op: &MspTargetOp, backend: &dyn InstallerBackend) -> Result<bool> {
    let mut reboot = false;
    for patch_id in &op.patches {
        let code = backend
            .run_msp(patch_id, &op.product_code, op.per_machine)
            .await
            .with_context(|| format!("applying patch '{}' to '{}'", patch_id, op.product_code))?;
        reboot |= ensure_msi_success(patch_id, code)?;
    }
    Ok(reboot)
}

/// Runs a related bundle's own chain as a child process. A chain-package
/// relation is a slave bundle of this same product, so it's launched with
/// `-chain`/`-ignoredependencies=ALL`/`-parent` in addition to the
/// operation switch; any other relation type is launched as an
/// independent bundle with just the operation switch.
async fn run_related_bundle_op(op: &RelatedBundlePlan, bundle_id: &str, backend: &dyn InstallerBackend) -> Result<bool> {
    let mut args = match op.action {
        ActionState::Uninstall => vec!["-uninstall".to_string()],
        ActionState::Repair => vec!["-repair".to_string()],
        _ => Vec::new(),
    };
    if op.chain_package {
        args.push("-chain".to_string());
        args.push("-ignoredependencies=ALL".to_string());
        args.push(format!("-parent={}", bundle_id));
    }
    let command_line = args.join(" ");

    let code = backend
        .run_exe(&op.bundle_id, &command_line, op.per_machine)
        .await
        .with_context(|| format!("launching related bundle '{}'", op.bundle_id))?;
    ensure_msi_success(&op.bundle_id, code)
}

async fn rollback_segment(
    segment: &[PackagePlan],
    packages: &[Package],
    store: &VariableStore,
    backend: &dyn InstallerBackend,
) -> Result<()> {
    for action in segment.iter().rev() {
        if action.rollback == ActionState::None {
            continue;
        }
        let rollback_action = PackagePlan {
            package_id: action.package_id.clone(),
            per_machine: action.per_machine,
            execute: action.rollback,
            rollback: ActionState::None,
        };
        run_package(&rollback_action, packages, store, backend)
            .await
            .with_context(|| format!("rolling back package '{}'", action.package_id))?;
    }
    Ok(())
}

/// Returns whether the package's exit code indicated a reboot is needed.
async fn run_package(
    action: &PackagePlan,
    packages: &[Package],
    store: &VariableStore,
    backend: &dyn InstallerBackend,
) -> Result<bool> {
    let package = packages
        .iter()
        .find(|p| p.id == action.package_id)
        .with_context(|| format!("package '{}' is not in the chain", action.package_id))?;

    match &package.kind {
        PackageKind::Exe(spec) => run_exe(action, spec, store, backend).await,
        PackageKind::Msi(_) => {
            let code = backend
                .run_msi(&action.package_id, action.execute, "", false)
                .await
                .with_context(|| format!("launching msiexec for '{}'", action.package_id))?;
            ensure_msi_success(&action.package_id, code)
        }
        PackageKind::Msp(_) => {
            bail!(
                "msp package '{}' must be scheduled through a target op, not run directly",
                action.package_id
            )
        }
        PackageKind::MsuLike => Ok(false),
        PackageKind::Bundle(spec) => {
            let code = backend
                .run_exe(&action.package_id, "", false)
                .await
                .with_context(|| format!("launching chained bundle '{}'", action.package_id))?;
            let result = classify(code, &spec.exit_codes);
            if is_error(result) {
                bail!(
                    "chained bundle '{}' exited with code {} classified as an error",
                    action.package_id,
                    code
                );
            }
            Ok(requires_reboot(result))
        }
    }
}

fn ensure_msi_success(package_id: &str, code: i32) -> Result<bool> {
    if code == 0 || code == 3010 {
        Ok(code == 3010)
    } else {
        bail!("package '{}' exited with code {}", package_id, code)
    }
}

async fn run_exe(
    action: &PackagePlan,
    spec: &ExeSpec,
    store: &VariableStore,
    backend: &dyn InstallerBackend,
) -> Result<bool> {
    let template = match action.execute {
        ActionState::Install | ActionState::MinorUpgrade => Some(spec.install_arguments.as_str()),
        ActionState::Repair => spec.repair_arguments.as_deref(),
        ActionState::Uninstall => spec.uninstall_arguments.as_deref(),
        ActionState::Modify | ActionState::None => None,
    };
    let Some(template) = template else {
        bail!("package '{}' has no argument template for {:?}", action.package_id, action.execute);
    };

    let (command_line, hidden) = assemble(template, store);
    debug!("launching '{}': {}", action.package_id, redact_for_log(&command_line, hidden));

    let elevated = action.per_machine;
    let code = backend
        .run_exe(&action.package_id, &command_line, elevated)
        .await
        .with_context(|| format!("launching '{}'", action.package_id))?;

    let result = classify(code, &spec.exit_codes);
    if is_error(result) {
        bail!("package '{}' exited with code {} classified as an error", action.package_id, code);
    }
    Ok(requires_reboot(result))
}
