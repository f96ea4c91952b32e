use crate::manifest::Manifest;
use anyhow::{Context, Result};
use engine_exec::{run_plan, InstallerBackend, RunMode};
use engine_model::{
    DependencyParent, DetectBackend, IgnoreDependencies, Package, RegistrationBackend, RelatedBundle,
};
use engine_plan::{build_plan, Plan};
use engine_search::{execute_all as run_searches, Search, SearchBackend};
use engine_vars::VariableStore;
use tracing::instrument;

/// Ties the seven components together into the one object a driving
/// binary actually holds: a variable store, the declared searches and
/// chain, and whatever plan the last `plan()` call produced.
pub struct Engine {
    pub bundle_id: String,
    store: VariableStore,
    searches: Vec<Search>,
    packages: Vec<Package>,
    related: Vec<RelatedBundle>,
    plan: Option<Plan>,
}

impl Engine {
    pub fn from_manifest(manifest: Manifest) -> Self {
        let mut store = VariableStore::new();
        for variable in manifest.variables {
            let value = variable.value.into_value();
            store.declare(&variable.name, value, variable.hidden, variable.persisted, variable.read_only);
        }

        Engine {
            bundle_id: manifest.bundle_id,
            store,
            searches: manifest.searches.into_iter().map(|s| s.into_search()).collect(),
            packages: manifest.packages.into_iter().map(|p| p.into_package()).collect(),
            related: manifest.related_bundles.into_iter().map(|r| r.into_related_bundle()).collect(),
            plan: None,
        }
    }

    pub fn store(&self) -> &VariableStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut VariableStore {
        &mut self.store
    }

    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    /// Mutable access to the chain, for a driving binary to set each
    /// package's `requested` state ahead of `build_plan`.
    pub fn packages_mut(&mut self) -> &mut [Package] {
        &mut self.packages
    }

    pub fn plan(&self) -> Option<&Plan> {
        self.plan.as_ref()
    }

    /// Related bundles discovered by the last `detect()` call.
    pub fn related(&self) -> &[RelatedBundle] {
        &self.related
    }

    /// Runs the declared searches, populating the variable store ahead of
    /// detect. Mirrors the original engine's ordering: search, then
    /// detect, since detect conditions may reference search results.
    #[instrument(skip(self, backend))]
    pub fn run_searches(&mut self, backend: &dyn SearchBackend) {
        let outcomes = run_searches(&self.searches, &mut self.store, backend);
        for (id, outcome) in outcomes {
            tracing::debug!(search = %id, outcome = ?outcome, "search completed");
        }
    }

    /// Detects current state for every package in the chain and every
    /// related bundle, replacing `self.related` with the deduplicated
    /// result.
    #[instrument(skip(self, backend))]
    pub fn detect(&mut self, backend: &dyn DetectBackend) -> Result<()> {
        self.store.set_engine_active(true);
        let related = std::mem::take(&mut self.related);
        let result = engine_model::detect_all(&mut self.packages, related, &self.store, backend);
        self.store.set_engine_active(false);
        self.related = result.context("detecting package and related-bundle state")?;
        Ok(())
    }

    /// Populates `install_registration_state` for every package that can
    /// affect registration. Run after `detect()`, mirroring the original
    /// engine's ordering: per-kind detection first, dependency
    /// registration detection second.
    #[instrument(skip(self, backend))]
    pub fn detect_registration(&mut self, backend: &dyn RegistrationBackend) -> Result<()> {
        engine_model::detect_registration(&mut self.packages, backend)
            .context("detecting package registration state")
    }

    /// Builds (and caches) the execution plan for the chain's current
    /// requested states. By default, packages register their dependents
    /// against this bundle's own provider id; `parent` (from
    /// `-parent`/`-parent:none`) overrides that when this bundle is itself
    /// running as a chain package of another bundle, recording dependents
    /// against that ancestor instead, or suppressing registration entirely
    /// on `-parent:none`. Uninstalls of a package still registered present
    /// for another dependent are refused unless `ignore_dependencies` says
    /// otherwise.
    #[instrument(skip(self))]
    pub fn build_plan_for(&mut self, parent: &DependencyParent, ignore_dependencies: &IgnoreDependencies) -> &Plan {
        let dependent = match parent {
            DependencyParent::Default => Some(self.bundle_id.as_str()),
            DependencyParent::Id(id) => Some(id.as_str()),
            DependencyParent::None => None,
        };
        let plan = build_plan(&self.packages, &self.related, dependent, ignore_dependencies);
        self.plan = Some(plan);
        self.plan.as_ref().unwrap()
    }

    /// Convenience wrapper over [`Self::build_plan_for`] for the common
    /// case: register dependents under this bundle's own id, ignoring no
    /// dependencies.
    pub fn build_plan(&mut self) -> &Plan {
        self.build_plan_for(&DependencyParent::Default, &IgnoreDependencies::None)
    }

    /// Runs the cached plan. Returns whether a reboot is required.
    /// Returns an error (without panicking) if `build_plan` was never
    /// called.
    #[instrument(skip(self, backend, registration))]
    pub async fn apply(
        &self,
        backend: &dyn InstallerBackend,
        registration: &dyn RegistrationBackend,
        mode: RunMode,
    ) -> Result<bool> {
        let plan = self.plan.as_ref().context("apply() called before build_plan()")?;
        self.store.set_engine_active(true);
        let result = run_plan(plan, &self.packages, &self.store, backend, registration, &self.bundle_id, mode).await;
        self.store.set_engine_active(false);
        result
    }
}
