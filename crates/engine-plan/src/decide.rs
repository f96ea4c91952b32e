use engine_model::{ActionState, CurrentState, RelationType, RequestState};

/// The execute-direction decision matrix: what a package should do, given
/// what's currently observed on the machine and what was requested of it.
/// `ForcePresent`/`ForceAbsent` bypass the "already in the right state"
/// shortcut that `Present`/`Absent` take, since a force request exists
/// specifically to repeat an action the matrix would otherwise skip. A
/// `permanent` package is never uninstalled by a plain (non-forced)
/// absent/cache request — it can still be installed, just never removed
/// automatically. `uninstallable`/`repairable` are a package's own
/// capability flags (see `Package::uninstallable`/`Package::repairable`):
/// a package that declares it can't be uninstalled or repaired has every
/// arm that would otherwise schedule that action collapse to `None`
/// instead, the same way the BA-facing plan matrix refuses those requests
/// outright rather than handing the executor an action it can't carry out.
pub fn decide_execute(
    current: CurrentState,
    requested: RequestState,
    permanent: bool,
    repairable: bool,
    uninstallable: bool,
) -> ActionState {
    use ActionState::*;
    use CurrentState::*;
    use RequestState::*;

    match requested {
        None | Cache => ActionState::None,
        Present => match current {
            Absent | Obsolete | Unknown => Install,
            Cached => Install,
            Present | Superseded => ActionState::None,
        },
        ForcePresent => match current {
            Superseded => ActionState::None,
            _ => Install,
        },
        Absent => match current {
            Present | Superseded | Cached => {
                if permanent || !uninstallable {
                    ActionState::None
                } else {
                    Uninstall
                }
            }
            Absent | Obsolete | Unknown => ActionState::None,
        },
        ForceAbsent => {
            if uninstallable {
                Uninstall
            } else {
                ActionState::None
            }
        }
        Repair => match current {
            Present | Superseded => {
                if repairable {
                    Repair
                } else {
                    ActionState::None
                }
            }
            Absent | Obsolete | Cached | Unknown => Install,
        },
    }
}

/// The rollback-direction counterpart: what undoes `execute` if the
/// overall chain transaction fails after this package's action already
/// ran. A no-op execute needs no rollback; an install from an absent
/// state is undone by an uninstall, unless the package is `permanent`,
/// in which case rollback has nothing it's allowed to do; an uninstall
/// from a present state is undone by reinstalling; a repair and a minor
/// upgrade are both idempotent enough that reapplying the prior action
/// is sufficient.
pub fn decide_rollback(execute: ActionState, was_present_before: bool, permanent: bool) -> ActionState {
    use ActionState::*;
    match execute {
        ActionState::None => ActionState::None,
        Install => {
            if permanent {
                ActionState::None
            } else {
                Uninstall
            }
        }
        Uninstall => {
            if was_present_before {
                Install
            } else {
                ActionState::None
            }
        }
        Modify => Modify,
        Repair => ActionState::None,
        MinorUpgrade => {
            if was_present_before {
                MinorUpgrade
            } else {
                Uninstall
            }
        }
    }
}

/// What, if anything, to do about a related bundle once this bundle's own
/// requested operation is known. Unlike a chain package, a related bundle
/// never has its own requested state — its action is inferred from the
/// relation it was discovered under and the primary bundle's operation:
///
/// - `ChainPackage`: a slave bundle of this same product; always mirrors
///   whatever this bundle itself is doing.
/// - `Upgrade`: an older bundle this install supersedes; uninstalled when
///   we install and it's still present, otherwise left alone.
/// - `DependentAddon`/`DependentPatch`: addons/patches layered on top of
///   us; uninstalled ahead of our own uninstall so nothing is left
///   pointing at a bundle that's about to disappear.
/// - `Detect`/`Addon`/`Patch`/`Update`: informational relations this
///   engine only uses for detection, never for planning.
pub fn decide_related_bundle_action(
    relation: RelationType,
    bundle_requested: RequestState,
    related_current: CurrentState,
) -> ActionState {
    use RelationType::*;

    let present = matches!(related_current, CurrentState::Present | CurrentState::Superseded);

    match relation {
        ChainPackage => match bundle_requested {
            RequestState::Present | RequestState::ForcePresent => ActionState::Install,
            RequestState::Absent | RequestState::ForceAbsent => ActionState::Uninstall,
            RequestState::Repair => ActionState::Repair,
            RequestState::None | RequestState::Cache => ActionState::None,
        },
        Upgrade => {
            if present && matches!(bundle_requested, RequestState::Present | RequestState::ForcePresent) {
                ActionState::Uninstall
            } else {
                ActionState::None
            }
        }
        DependentAddon | DependentPatch => {
            if present && matches!(bundle_requested, RequestState::Absent | RequestState::ForceAbsent) {
                ActionState::Uninstall
            } else {
                ActionState::None
            }
        }
        Detect | Addon | Patch | Update => ActionState::None,
    }
}
