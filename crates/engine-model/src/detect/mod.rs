use crate::backend::{DetectBackend, RegistrationBackend};
use crate::error::{ConditionSnafu, Error, Result};
use crate::package::{CurrentState, DetectionType, InstallRegistrationState, Package, PackageKind, PatchTarget};
use crate::related_bundle::{dedup_related_bundles, RelatedBundle};
use engine_vars::{VariableStore, Version};
use snafu::ResultExt;
use std::cmp::Ordering;

fn detect_exe(id: &str, package: &Package, store: &VariableStore, backend: &dyn DetectBackend) -> Result<CurrentState> {
    let PackageKind::Exe(spec) = &package.kind else {
        unreachable!("detect_exe called on a non-Exe package");
    };

    match spec.detection {
        DetectionType::None => Ok(CurrentState::Absent),
        DetectionType::Condition => match &package.condition {
            None => Ok(CurrentState::Absent),
            Some(condition) => {
                let present = engine_condition::evaluate(condition, store)
                    .context(ConditionSnafu { id: id.to_string() })?;
                Ok(if present { CurrentState::Present } else { CurrentState::Absent })
            }
        },
        DetectionType::Arp => {
            let found = backend
                .exe_arp_version(&package.cache_id)
                .map_err(|reason| Error::Backend { id: id.to_string(), reason })?;
            Ok(match (found, &spec.arp_display_version) {
                (None, _) => CurrentState::Absent,
                (Some(_), None) => CurrentState::Present,
                (Some(found), Some(declared)) => {
                    match Version::parse(&found).cmp(&Version::parse(declared)) {
                        Ordering::Less => CurrentState::Obsolete,
                        Ordering::Greater => CurrentState::Absent,
                        Ordering::Equal => CurrentState::Present,
                    }
                }
            })
        }
    }
}

fn detect_msi(id: &str, package: &Package, backend: &dyn DetectBackend) -> Result<CurrentState> {
    let PackageKind::Msi(spec) = &package.kind else {
        unreachable!("detect_msi called on a non-Msi package");
    };
    backend
        .msi_product_state(&spec.product_code)
        .map_err(|reason| Error::Backend { id: id.to_string(), reason })
}

/// Implements the chained-patch targeting algorithm: a patch can apply to
/// more than one product, and its effective state is the strongest state
/// observed across every target it actually touches. Targets are kept in
/// patch-sequence order so later planning stages can reason about
/// superseding patches without re-sorting.
fn detect_msp(id: &str, package: &mut Package, backend: &dyn DetectBackend) -> Result<CurrentState> {
    let PackageKind::Msp(spec) = &mut package.kind else {
        unreachable!("detect_msp called on a non-Msp package");
    };

    let raw_targets = backend
        .msp_targets(&spec.patch_code)
        .map_err(|reason| Error::Backend { id: id.to_string(), reason })?;

    let mut targets = Vec::with_capacity(raw_targets.len());
    for (product_code, per_machine, sequence) in raw_targets {
        let state = backend
            .msp_state_for_target(&spec.patch_code, &product_code)
            .map_err(|reason| Error::Backend { id: id.to_string(), reason })?;
        targets.push(PatchTarget {
            product_code,
            per_machine,
            sequence,
            state,
            slipstream: false,
            slipstream_required: false,
        });
    }
    targets.sort_by_key(|t| t.sequence);

    let overall = targets.iter().map(|t| t.state).max().unwrap_or(CurrentState::Absent);
    spec.target_products = targets;
    Ok(overall)
}

/// Implements the bundle self/newer detect matrix: enumerate every
/// bundle registered under any of this package's detect/upgrade/addon/
/// patch codes, note whether our own id turned up (`self_found`) and
/// whether anything newer than our own declared version turned up
/// (`newer_found`), then fold the two flags into a `CurrentState` via
/// the fixed map newer+self->Superseded, newer+not self->Obsolete,
/// not newer+self->Present, neither->Absent.
fn detect_bundle(id: &str, package: &Package, backend: &dyn DetectBackend) -> Result<CurrentState> {
    let PackageKind::Bundle(spec) = &package.kind else {
        unreachable!("detect_bundle called on a non-Bundle package");
    };

    let mut self_found = false;
    let mut newer_found = false;

    let all_codes = spec
        .detect_codes
        .iter()
        .chain(spec.upgrade_codes.iter())
        .chain(spec.addon_codes.iter())
        .chain(spec.patch_codes.iter());

    for code in all_codes {
        let sightings = backend
            .related_bundle_versions(code, package.per_machine)
            .map_err(|reason| Error::Backend { id: id.to_string(), reason })?;
        for (bundle_id, version_text) in sightings {
            if bundle_id == package.id {
                self_found = true;
            }
            if Version::parse(&version_text) > spec.own_version {
                newer_found = true;
            }
        }
    }

    Ok(match (newer_found, self_found) {
        (true, true) => CurrentState::Superseded,
        (true, false) => CurrentState::Obsolete,
        (false, true) => CurrentState::Present,
        (false, false) => CurrentState::Absent,
    })
}

fn detect_related_bundle(related: &mut RelatedBundle, backend: &dyn DetectBackend) -> Result<()> {
    let id = related.package.id.clone();
    let per_machine = related.package.per_machine;
    let state = backend
        .bundle_state(&id, per_machine)
        .map_err(|reason| Error::Backend { id: id.clone(), reason })?;
    let version = backend
        .bundle_version(&id, per_machine)
        .map_err(|reason| Error::Backend { id, reason })?;
    related.package.current_state = state;
    related.version = version;
    Ok(())
}

/// Links slipstreamed MSPs to the chain MSI that carries them. Mirrors
/// `mspengine.cpp`'s `DeterminePatchChainedTarget`/
/// `MspEngineAddMissingSlipstreamTarget`: an MSI's own `slipstream-patches`
/// list names the MSPs it carries inline at install time. A target
/// product `detect_msp` already surfaced gets `slipstream` set when the
/// owning MSI actually lists it; a patch the MSI lists but whose
/// target-product scan never turned up gets a synthetic, not-yet-
/// installed target so planning still has something to force off (see
/// `engine_plan::coalesce_target_ops`) if the MSI itself never installs.
fn link_slipstream_patches(packages: &mut [Package]) {
    struct ChainMsi {
        product_code: String,
        per_machine: bool,
        slipstream_patches: Vec<String>,
    }

    let chain_msis: Vec<ChainMsi> = packages
        .iter()
        .filter_map(|p| match &p.kind {
            PackageKind::Msi(spec) => Some(ChainMsi {
                product_code: spec.product_code.clone(),
                per_machine: p.per_machine,
                slipstream_patches: spec.slipstream_patches.clone(),
            }),
            _ => None,
        })
        .collect();

    for package in packages.iter_mut() {
        let id = package.id.clone();
        let PackageKind::Msp(spec) = &mut package.kind else { continue };

        for msi in &chain_msis {
            if !msi.slipstream_patches.iter().any(|patch_code| patch_code == &spec.patch_code) {
                continue;
            }

            match spec.target_products.iter_mut().find(|t| t.product_code == msi.product_code) {
                Some(target) => target.slipstream = true,
                None => {
                    log::debug!(
                        "patch '{}' is slipstreamed with '{}' but was never surfaced as a target; adding a synthetic one",
                        id,
                        msi.product_code
                    );
                    let sequence = spec.target_products.iter().map(|t| t.sequence).max().unwrap_or(0) + 1;
                    spec.target_products.push(PatchTarget {
                        product_code: msi.product_code.clone(),
                        per_machine: msi.per_machine,
                        sequence,
                        state: CurrentState::Absent,
                        slipstream: true,
                        slipstream_required: true,
                    });
                }
            }
        }
    }
}

/// Runs detection for every chain package and every related bundle,
/// writing `current_state` (and, for MSPs, `target_products`) in place.
/// Related bundles are then deduplicated by `(id, per_machine)`, keeping
/// the strongest observed state per bundle.
pub fn detect_all(
    packages: &mut [Package],
    related: Vec<RelatedBundle>,
    store: &VariableStore,
    backend: &dyn DetectBackend,
) -> Result<Vec<RelatedBundle>> {
    for package in packages.iter_mut() {
        let id = package.id.clone();
        let state = match &package.kind {
            PackageKind::Exe(_) => detect_exe(&id, package, store, backend)?,
            PackageKind::Msi(_) => detect_msi(&id, package, backend)?,
            PackageKind::Msp(_) => detect_msp(&id, package, backend)?,
            PackageKind::MsuLike => CurrentState::Unknown,
            PackageKind::Bundle(_) => detect_bundle(&id, package, backend)?,
        };
        package.current_state = state;
    }

    link_slipstream_patches(packages);

    let mut related = related;
    for rb in related.iter_mut() {
        detect_related_bundle(rb, backend)?;
    }
    Ok(dedup_related_bundles(related))
}

/// Runs after `detect_all`: transitions `install_registration_state` for
/// every package that can affect registration, reading the shared
/// dependency store through `backend`. Packages that never register
/// (`can_affect_registration == false`) are marked `Ignored` without
/// consulting the backend at all.
pub fn detect_registration(packages: &mut [Package], backend: &dyn RegistrationBackend) -> Result<()> {
    for package in packages.iter_mut() {
        package.install_registration_state = if package.can_affect_registration {
            backend
                .registration_state(&package.id)
                .map_err(|reason| Error::Backend { id: package.id.clone(), reason })?
        } else {
            InstallRegistrationState::Ignored
        };
    }
    Ok(())
}
