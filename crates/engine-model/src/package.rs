/// Observed installation state of a package or related bundle.
/// `Unknown` is the pre-detect value; `Superseded` ranks "more installed
/// than" `Obsolete` when states need to be folded (e.g. across an MSP's
/// per-target states).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CurrentState {
    Unknown,
    Obsolete,
    Absent,
    Cached,
    Present,
    Superseded,
}

/// What the user (or the BA, on their behalf) asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestState {
    #[default]
    None,
    Present,
    Absent,
    Cache,
    Repair,
    ForcePresent,
    ForceAbsent,
}

/// The action the planner decided on for a package, in either the
/// execute or rollback direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActionState {
    #[default]
    None,
    Install,
    Uninstall,
    Modify,
    Repair,
    MinorUpgrade,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstallRegistrationState {
    #[default]
    Unknown,
    Ignored,
    Absent,
    Present,
}

/// `-ignoredependencies` as passed on the command line: bypasses the
/// dependents check that would otherwise refuse an uninstall of a
/// shared package still registered as present for another dependent.
#[derive(Debug, Clone, Default)]
pub enum IgnoreDependencies {
    #[default]
    None,
    All,
    Packages(Vec<String>),
}

impl IgnoreDependencies {
    pub fn ignores(&self, package_id: &str) -> bool {
        match self {
            IgnoreDependencies::None => false,
            IgnoreDependencies::All => true,
            IgnoreDependencies::Packages(ids) => ids.iter().any(|id| id == package_id),
        }
    }
}

/// `-parent <id>` / `-parent:none` as passed on the command line: the id
/// this bundle registers its packages' dependents under when it is itself
/// running as a chain package of another bundle.
#[derive(Debug, Clone, Default)]
pub enum DependencyParent {
    /// No `-parent` given: register dependents under this bundle's own id.
    #[default]
    Default,
    /// `-parent <id>`: register dependents under `id` instead.
    Id(String),
    /// `-parent:none`: suppress dependent registration entirely.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheType {
    Keep,
    Remove,
    Force,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionType {
    None,
    Condition,
    Arp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolType {
    None,
    Embedded,
    NetFx4,
}

/// An `(hresult_class, action)` row in an Exe/Bundle exit-code table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCodeAction {
    Success,
    Error,
    ScheduleReboot,
    ForceReboot,
    ErrorScheduleReboot,
    ErrorForceReboot,
}

#[derive(Debug, Clone)]
pub struct ExitCodeRule {
    /// `None` means "wildcard": applies when no exact code matches.
    pub code: Option<i32>,
    pub action: ExitCodeAction,
}

#[derive(Debug, Clone)]
pub struct ExeSpec {
    pub detection: DetectionType,
    pub arp_display_version: Option<String>,
    pub arp_per_machine: bool,
    pub install_arguments: String,
    pub repair_arguments: Option<String>,
    pub uninstall_arguments: Option<String>,
    pub exit_codes: Vec<ExitCodeRule>,
    pub protocol: ProtocolType,
    pub repairable: bool,
    pub uninstallable: bool,
}

#[derive(Debug, Clone)]
pub struct MsiSpec {
    pub product_code: String,
    pub upgrade_codes: Vec<String>,
    pub features: Vec<String>,
    /// Patch codes of MSPs slipstreamed with this MSI at install time.
    pub slipstream_patches: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MspSpec {
    pub patch_code: String,
    /// Populated during detect: products this patch was found to apply
    /// to, in the order the targeting algorithm discovered them.
    pub target_products: Vec<PatchTarget>,
}

#[derive(Debug, Clone)]
pub struct PatchTarget {
    pub product_code: String,
    pub per_machine: bool,
    pub sequence: u32,
    pub state: CurrentState,
    /// Set once the target MSI's own `slipstream_patches` list actually
    /// names this patch (`DeterminePatchChainedTarget`): the patch rides
    /// along with that MSI's own install/repair instead of being applied
    /// standalone.
    pub slipstream: bool,
    /// Set only for a target synthesized because the MSI's slipstream
    /// list named this patch but the target-product scan never surfaced
    /// it (`MspEngineAddMissingSlipstreamTarget`) — the product isn't
    /// registered yet, so the patch can only apply if the MSI is about to
    /// be installed.
    pub slipstream_required: bool,
}

#[derive(Debug, Clone)]
pub struct BundleSpec {
    pub detect_codes: Vec<String>,
    pub upgrade_codes: Vec<String>,
    pub addon_codes: Vec<String>,
    pub patch_codes: Vec<String>,
    pub exit_codes: Vec<ExitCodeRule>,
    /// This bundle's own declared version, compared against whatever
    /// related-bundle registrations the detect pass turns up under any
    /// of the code lists above, to tell a self-sighting from a newer one.
    pub own_version: engine_vars::Version,
}

/// A manifest-declared marker delimiting a transactional group of
/// packages. When a package carries one, plan assembly starts a fresh
/// rollback segment right before it; a chain with no declarations at all
/// gets a single implicit segment spanning every package, so a mid-chain
/// failure still rolls back everything that already succeeded.
#[derive(Debug, Clone)]
pub struct RollbackBoundary {
    pub id: String,
    pub vital: bool,
}

#[derive(Debug, Clone)]
pub enum PackageKind {
    Exe(ExeSpec),
    Msi(MsiSpec),
    Msp(MspSpec),
    MsuLike,
    Bundle(BundleSpec),
}

/// A single entry in the bundle's chain, or the template for a related
/// bundle discovered on the machine. Packages never own one another;
/// cross-references (MSI<->slipstreamed MSP, MSP target<->chain MSI)
/// are indices into the owning arena, kept alongside the package list
/// rather than inside `Package` itself.
#[derive(Debug, Clone)]
pub struct Package {
    pub id: String,
    pub permanent: bool,
    pub per_machine: bool,
    pub cache_type: CacheType,
    pub cache_id: String,
    pub payloads: Vec<String>,
    pub dependencies: Vec<String>,
    pub condition: Option<String>,
    pub kind: PackageKind,
    pub can_affect_registration: bool,
    /// `None` unless the manifest declares this package as the start of a
    /// new rollback boundary.
    pub rollback_boundary: Option<RollbackBoundary>,

    pub current_state: CurrentState,
    pub requested: RequestState,
    pub execute: ActionState,
    pub rollback: ActionState,
    pub install_registration_state: InstallRegistrationState,
}

impl Package {
    pub fn new(id: impl Into<String>, kind: PackageKind) -> Self {
        Package {
            id: id.into(),
            permanent: false,
            per_machine: true,
            cache_type: CacheType::Keep,
            cache_id: String::new(),
            payloads: Vec::new(),
            dependencies: Vec::new(),
            condition: None,
            kind,
            can_affect_registration: true,
            rollback_boundary: None,
            current_state: CurrentState::Unknown,
            requested: RequestState::None,
            execute: ActionState::None,
            rollback: ActionState::None,
            install_registration_state: InstallRegistrationState::Unknown,
        }
    }

    pub fn is_msp(&self) -> bool {
        matches!(self.kind, PackageKind::Msp(_))
    }

    /// An Exe package is uninstallable only if it declares uninstall
    /// arguments; MSI/MSP/Bundle are always uninstallable by the
    /// installer subsystem.
    pub fn uninstallable(&self) -> bool {
        match &self.kind {
            PackageKind::Exe(spec) => spec.uninstallable,
            _ => true,
        }
    }

    pub fn repairable(&self) -> bool {
        match &self.kind {
            PackageKind::Exe(spec) => spec.repairable,
            _ => true,
        }
    }
}
