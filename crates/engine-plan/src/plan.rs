use crate::msp::MspTargetOp;
use engine_model::ActionState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagePlan {
    pub package_id: String,
    pub per_machine: bool,
    pub execute: ActionState,
    pub rollback: ActionState,
}

/// The action planned for one related bundle, decided against this
/// bundle's own requested operation rather than the related bundle's own
/// (it has none — a related bundle is never itself a chain member).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedBundlePlan {
    pub bundle_id: String,
    pub per_machine: bool,
    pub action: ActionState,
    /// True for a `ChainPackage` relation, which gets `-chain`,
    /// `-ignoredependencies=ALL` and `-parent` on its command line
    /// instead of being launched as a standalone bundle.
    pub chain_package: bool,
}

/// One entry in the ordered execution plan. A plan is a flat sequence:
/// the executor walks it top to bottom on the way forward, and bottom to
/// top (using each step's `rollback` half) when a vital action fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanStep {
    /// Marks a point past which a failure no longer rolls back earlier
    /// steps. `vital` mirrors the manifest's RollbackBoundary/@Vital.
    RollbackBoundary { id: String, vital: bool },
    ExecutePackage(PackagePlan),
    /// Applies a coalesced queue of MSP patches against one target
    /// product, in sequence order.
    MspTargetOp(MspTargetOp),
    /// Runs a related bundle's own chain (install/uninstall/repair),
    /// either as an independent bundle or, for `ChainPackage` relations,
    /// as a slave invocation of this same bundle's payload.
    RelatedBundleOp(RelatedBundlePlan),
    RegisterDependency { package_id: String, dependent: String },
    UnregisterDependency { package_id: String, dependent: String },
    /// Copies a package's payloads into the local cache without running
    /// it, used for `RequestState::Cache` and as a prerequisite step
    /// ahead of an `Install`/`Repair` execute action.
    CacheSync { package_id: String },
    /// A named point the engine reports progress against; inserted
    /// between logical groups of steps, not on every single one.
    Checkpoint { id: u32 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: PlanStep) {
        self.steps.push(step);
    }

    pub fn package_steps(&self) -> impl Iterator<Item = &PackagePlan> {
        self.steps.iter().filter_map(|step| match step {
            PlanStep::ExecutePackage(p) => Some(p),
            _ => None,
        })
    }

    pub fn is_noop(&self) -> bool {
        self.steps.iter().all(|step| match step {
            PlanStep::ExecutePackage(p) => p.execute == ActionState::None,
            PlanStep::MspTargetOp(_) => false,
            PlanStep::RelatedBundleOp(r) => r.action == ActionState::None,
            _ => true,
        })
    }

    /// True if applying this plan touches any per-machine package, which
    /// a driving binary running unprivileged must hand off to an elevated
    /// companion process rather than execute directly.
    pub fn requires_elevation(&self) -> bool {
        self.steps.iter().any(|step| match step {
            PlanStep::ExecutePackage(p) => p.per_machine && p.execute != ActionState::None,
            PlanStep::MspTargetOp(op) => op.per_machine,
            _ => false,
        })
    }
}
