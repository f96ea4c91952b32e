use crate::package::{CurrentState, InstallRegistrationState};

/// External collaborator for queries this crate has no business making
/// itself: MSI/MSP product state, feature/component state, and whatever
/// registration facility related bundles are recorded in. Mirrors
/// `engine_search::SearchBackend` — detection and search both bottom out
/// in the same kind of OS-specific lookups, so the boundary is drawn the
/// same way.
pub trait DetectBackend {
    /// Current install state of an MSI product, or `None` if the backend
    /// has no opinion (product genuinely absent).
    fn msi_product_state(&self, product_code: &str) -> Result<CurrentState, String>;

    fn msi_product_version(&self, product_code: &str) -> Result<Option<String>, String>;

    /// All products a patch is currently applicable to or applied to, as
    /// `(product_code, per_machine, sequence)` triples. Ordering is not
    /// guaranteed; the targeting algorithm sorts by sequence itself.
    fn msp_targets(&self, patch_code: &str) -> Result<Vec<(String, bool, u32)>, String>;

    fn msp_state_for_target(&self, patch_code: &str, product_code: &str) -> Result<CurrentState, String>;

    /// State of a related bundle recorded under the given provider
    /// (detect) code, keyed by the bundle's own per-machine flag.
    fn bundle_state(&self, provider_code: &str, per_machine: bool) -> Result<CurrentState, String>;

    fn bundle_version(&self, provider_code: &str, per_machine: bool) -> Result<Option<String>, String>;

    /// Every bundle registered under the given detect/upgrade/addon/patch
    /// code, as `(bundle_id, version)` pairs; more than one entry can
    /// come back when side-by-side versions of a family are installed.
    /// Drives the self/newer bundle detect matrix: a `Bundle`-kind
    /// package's own state isn't read off one registration the way an
    /// MSI's is, it's folded across every sighting under every code it
    /// declares.
    fn related_bundle_versions(&self, provider_code: &str, per_machine: bool) -> Result<Vec<(String, String)>, String>;

    /// Add/Remove Programs display version for an Exe package using ARP
    /// detection, keyed by the package's ARP registry key. `Ok(None)`
    /// means no matching entry was found.
    fn exe_arp_version(&self, arp_key: &str) -> Result<Option<String>, String>;
}

/// External collaborator for the shared-dependency registration facility:
/// whatever keeps track of which dependents have registered an interest
/// in a package so it survives as long as something still needs it.
/// Drawn as its own trait, separate from `DetectBackend`, because it's
/// consulted both during detect (to populate `install_registration_state`)
/// and during execute (to actually register/unregister), while
/// `DetectBackend` is detect-only.
pub trait RegistrationBackend {
    /// Current registration state of `package_id`, independent of which
    /// dependent is asking.
    fn registration_state(&self, package_id: &str) -> Result<InstallRegistrationState, String>;

    /// Records that `dependent` now depends on `package_id`.
    fn register_dependency(&self, package_id: &str, dependent: &str) -> Result<(), String>;

    /// Removes `dependent`'s previously recorded dependency on
    /// `package_id`.
    fn unregister_dependency(&self, package_id: &str, dependent: &str) -> Result<(), String>;
}
