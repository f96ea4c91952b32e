use engine_model::{
    ActionState, BundleSpec, CacheType, ExeSpec, ExitCodeAction, ExitCodeRule, MsiSpec, MspSpec, Package,
    PackageKind, ProtocolType, RelatedBundle, RelationType, RequestState, RollbackBoundary,
};
use engine_search::{Bitness, MsiComponentMeasure, MsiProductMeasure, RegistryRoot, Search, SearchKind};
use engine_vars::Value;
use serde::Deserialize;

/// The on-disk shape of a bundle's manifest: the declared variables,
/// searches and chain, in declaration order. Parsed with `toml`, the way
/// the rest of this stack's manifests are — no XML authoring surface is
/// part of this crate's scope.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Manifest {
    pub bundle_id: String,
    #[serde(default)]
    pub variables: Vec<ManifestVariable>,
    #[serde(default)]
    pub searches: Vec<ManifestSearch>,
    #[serde(default)]
    pub packages: Vec<ManifestPackage>,
    /// Other bundles declared as related to this one, seeding the
    /// related-bundle discovery pass detect runs alongside the chain.
    #[serde(default)]
    pub related_bundles: Vec<ManifestRelatedBundle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ManifestRelatedBundle {
    pub id: String,
    #[serde(default = "default_true")]
    pub per_machine: bool,
    pub relation: ManifestRelationType,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManifestRelationType {
    Detect,
    Upgrade,
    Addon,
    Patch,
    DependentAddon,
    DependentPatch,
    Update,
    ChainPackage,
}

impl From<ManifestRelationType> for RelationType {
    fn from(value: ManifestRelationType) -> Self {
        match value {
            ManifestRelationType::Detect => RelationType::Detect,
            ManifestRelationType::Upgrade => RelationType::Upgrade,
            ManifestRelationType::Addon => RelationType::Addon,
            ManifestRelationType::Patch => RelationType::Patch,
            ManifestRelationType::DependentAddon => RelationType::DependentAddon,
            ManifestRelationType::DependentPatch => RelationType::DependentPatch,
            ManifestRelationType::Update => RelationType::Update,
            ManifestRelationType::ChainPackage => RelationType::ChainPackage,
        }
    }
}

impl ManifestRelatedBundle {
    pub fn into_related_bundle(self) -> RelatedBundle {
        // Related-bundle entries are never run through `detect_bundle`'s
        // self/newer matrix (that's only for `Bundle`-kind chain
        // packages), so `own_version` is never consulted here.
        let kind = PackageKind::Bundle(BundleSpec {
            detect_codes: Vec::new(),
            upgrade_codes: Vec::new(),
            addon_codes: Vec::new(),
            patch_codes: Vec::new(),
            exit_codes: Vec::new(),
            own_version: engine_vars::Version::parse("0"),
        });
        let mut package = Package::new(self.id, kind);
        package.per_machine = self.per_machine;
        RelatedBundle::new(package, self.relation.into())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ManifestVariable {
    pub name: String,
    pub value: ManifestValue,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub persisted: bool,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ManifestValue {
    Numeric { value: i64 },
    String { value: String },
    Formatted { value: String },
    Version { value: String },
}

impl ManifestValue {
    pub fn into_value(self) -> Value {
        match self {
            ManifestValue::Numeric { value } => Value::Numeric(value),
            ManifestValue::String { value } => Value::String(value),
            ManifestValue::Formatted { value } => Value::Formatted(value),
            ManifestValue::Version { value } => Value::Version(engine_vars::Version::parse(&value)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ManifestSearch {
    pub id: String,
    pub variable: String,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(flatten)]
    pub kind: ManifestSearchKind,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ManifestSearchKind {
    DirectoryExists { path: String },
    DirectoryPath { path: String },
    FileExists { path: String },
    FileVersion { path: String },
    FilePath { path: String },
    RegistryExists {
        root: ManifestRegistryRoot,
        key: String,
        #[serde(default)]
        value: Option<String>,
        #[serde(default)]
        bitness: ManifestBitness,
    },
    RegistryValue {
        root: ManifestRegistryRoot,
        key: String,
        #[serde(default)]
        value: Option<String>,
        #[serde(default)]
        bitness: ManifestBitness,
        #[serde(default)]
        expand_environment: bool,
    },
    MsiComponent {
        product_code: String,
        component_id: String,
        measure: ManifestMsiComponentMeasure,
    },
    MsiProduct {
        code: String,
        #[serde(default)]
        by_upgrade_code: bool,
        measure: ManifestMsiProductMeasure,
    },
    ExtensionSearch { extension: String, payload: String },
    SetVariable { value: ManifestValue },
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManifestRegistryRoot {
    ClassesRoot,
    CurrentUser,
    #[default]
    LocalMachine,
    Users,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManifestBitness {
    #[default]
    Default,
    Force32,
    Force64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManifestMsiComponentMeasure {
    KeyPath,
    State,
    Directory,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManifestMsiProductMeasure {
    Version,
    Language,
    State,
    Assignment,
}

impl From<ManifestRegistryRoot> for RegistryRoot {
    fn from(root: ManifestRegistryRoot) -> Self {
        match root {
            ManifestRegistryRoot::ClassesRoot => RegistryRoot::ClassesRoot,
            ManifestRegistryRoot::CurrentUser => RegistryRoot::CurrentUser,
            ManifestRegistryRoot::LocalMachine => RegistryRoot::LocalMachine,
            ManifestRegistryRoot::Users => RegistryRoot::Users,
        }
    }
}

impl From<ManifestBitness> for Bitness {
    fn from(bitness: ManifestBitness) -> Self {
        match bitness {
            ManifestBitness::Default => Bitness::Default,
            ManifestBitness::Force32 => Bitness::Force32,
            ManifestBitness::Force64 => Bitness::Force64,
        }
    }
}

impl From<ManifestMsiComponentMeasure> for MsiComponentMeasure {
    fn from(measure: ManifestMsiComponentMeasure) -> Self {
        match measure {
            ManifestMsiComponentMeasure::KeyPath => MsiComponentMeasure::KeyPath,
            ManifestMsiComponentMeasure::State => MsiComponentMeasure::State,
            ManifestMsiComponentMeasure::Directory => MsiComponentMeasure::Directory,
        }
    }
}

impl From<ManifestMsiProductMeasure> for MsiProductMeasure {
    fn from(measure: ManifestMsiProductMeasure) -> Self {
        match measure {
            ManifestMsiProductMeasure::Version => MsiProductMeasure::Version,
            ManifestMsiProductMeasure::Language => MsiProductMeasure::Language,
            ManifestMsiProductMeasure::State => MsiProductMeasure::State,
            ManifestMsiProductMeasure::Assignment => MsiProductMeasure::Assignment,
        }
    }
}

impl ManifestSearch {
    pub fn into_search(self) -> Search {
        let kind = match self.kind {
            ManifestSearchKind::DirectoryExists { path } => SearchKind::DirectoryExists { path },
            ManifestSearchKind::DirectoryPath { path } => SearchKind::DirectoryPath { path },
            ManifestSearchKind::FileExists { path } => SearchKind::FileExists { path },
            ManifestSearchKind::FileVersion { path } => SearchKind::FileVersion { path },
            ManifestSearchKind::FilePath { path } => SearchKind::FilePath { path },
            ManifestSearchKind::RegistryExists { root, key, value, bitness } => SearchKind::RegistryExists {
                root: root.into(),
                key,
                value,
                bitness: bitness.into(),
            },
            ManifestSearchKind::RegistryValue { root, key, value, bitness, expand_environment } => {
                SearchKind::RegistryValue {
                    root: root.into(),
                    key,
                    value,
                    bitness: bitness.into(),
                    expand_environment,
                }
            }
            ManifestSearchKind::MsiComponent { product_code, component_id, measure } => {
                SearchKind::MsiComponent { product_code, component_id, measure: measure.into() }
            }
            ManifestSearchKind::MsiProduct { code, by_upgrade_code, measure } => {
                SearchKind::MsiProduct { code, by_upgrade_code, measure: measure.into() }
            }
            ManifestSearchKind::ExtensionSearch { extension, payload } => {
                SearchKind::ExtensionSearch { extension, payload }
            }
            ManifestSearchKind::SetVariable { value } => SearchKind::SetVariable { value: value.into_value() },
        };
        Search { id: self.id, variable: self.variable, condition: self.condition, kind }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ManifestPackage {
    pub id: String,
    #[serde(default)]
    pub permanent: bool,
    #[serde(default = "default_true")]
    pub per_machine: bool,
    #[serde(default)]
    pub cache_type: ManifestCacheType,
    #[serde(default)]
    pub cache_id: String,
    #[serde(default)]
    pub payloads: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default = "default_true")]
    pub can_affect_registration: bool,
    /// Present only on the package that opens a new transactional group;
    /// a chain with no declarations at all gets a single implicit group
    /// spanning every package (see `engine_plan::build_plan`).
    #[serde(default)]
    pub rollback_boundary: Option<ManifestRollbackBoundary>,
    #[serde(flatten)]
    pub kind: ManifestPackageKind,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ManifestRollbackBoundary {
    pub id: String,
    #[serde(default = "default_true")]
    pub vital: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManifestCacheType {
    #[default]
    Keep,
    Remove,
    Force,
}

impl From<ManifestCacheType> for CacheType {
    fn from(value: ManifestCacheType) -> Self {
        match value {
            ManifestCacheType::Keep => CacheType::Keep,
            ManifestCacheType::Remove => CacheType::Remove,
            ManifestCacheType::Force => CacheType::Force,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ManifestPackageKind {
    Exe {
        #[serde(default)]
        detection: ManifestDetectionType,
        #[serde(default)]
        arp_display_version: Option<String>,
        #[serde(default = "default_true")]
        arp_per_machine: bool,
        install_arguments: String,
        #[serde(default)]
        repair_arguments: Option<String>,
        #[serde(default)]
        uninstall_arguments: Option<String>,
        #[serde(default)]
        exit_codes: Vec<ManifestExitCodeRule>,
        #[serde(default)]
        repairable: bool,
        #[serde(default)]
        uninstallable: bool,
    },
    Msi {
        product_code: String,
        #[serde(default)]
        upgrade_codes: Vec<String>,
        #[serde(default)]
        features: Vec<String>,
        #[serde(default)]
        slipstream_patches: Vec<String>,
    },
    Msp {
        patch_code: String,
    },
    MsuLike,
    Bundle {
        #[serde(default)]
        detect_codes: Vec<String>,
        #[serde(default)]
        upgrade_codes: Vec<String>,
        #[serde(default)]
        addon_codes: Vec<String>,
        #[serde(default)]
        patch_codes: Vec<String>,
        #[serde(default)]
        exit_codes: Vec<ManifestExitCodeRule>,
        /// This bundle's own declared version, fed into the self/newer
        /// detect matrix. Defaults to `0` (anything registered compares
        /// as newer) when a manifest doesn't declare one.
        #[serde(default)]
        version: Option<String>,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManifestDetectionType {
    #[default]
    None,
    Condition,
    Arp,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ManifestExitCodeRule {
    pub code: Option<i32>,
    pub action: ManifestExitCodeAction,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManifestExitCodeAction {
    Success,
    Error,
    ScheduleReboot,
    ForceReboot,
    ErrorScheduleReboot,
    ErrorForceReboot,
}

impl From<ManifestExitCodeRule> for ExitCodeRule {
    fn from(rule: ManifestExitCodeRule) -> Self {
        let action = match rule.action {
            ManifestExitCodeAction::Success => ExitCodeAction::Success,
            ManifestExitCodeAction::Error => ExitCodeAction::Error,
            ManifestExitCodeAction::ScheduleReboot => ExitCodeAction::ScheduleReboot,
            ManifestExitCodeAction::ForceReboot => ExitCodeAction::ForceReboot,
            ManifestExitCodeAction::ErrorScheduleReboot => ExitCodeAction::ErrorScheduleReboot,
            ManifestExitCodeAction::ErrorForceReboot => ExitCodeAction::ErrorForceReboot,
        };
        ExitCodeRule { code: rule.code, action }
    }
}

impl ManifestPackage {
    pub fn into_package(self) -> Package {
        let kind = match self.kind {
            ManifestPackageKind::Exe {
                detection,
                arp_display_version,
                arp_per_machine,
                install_arguments,
                repair_arguments,
                uninstall_arguments,
                exit_codes,
                repairable,
                uninstallable,
            } => PackageKind::Exe(ExeSpec {
                detection: match detection {
                    ManifestDetectionType::None => engine_model::DetectionType::None,
                    ManifestDetectionType::Condition => engine_model::DetectionType::Condition,
                    ManifestDetectionType::Arp => engine_model::DetectionType::Arp,
                },
                arp_display_version,
                arp_per_machine,
                install_arguments,
                repair_arguments,
                uninstall_arguments,
                exit_codes: exit_codes.into_iter().map(Into::into).collect(),
                protocol: ProtocolType::None,
                repairable,
                uninstallable,
            }),
            ManifestPackageKind::Msi { product_code, upgrade_codes, features, slipstream_patches } => {
                PackageKind::Msi(MsiSpec { product_code, upgrade_codes, features, slipstream_patches })
            }
            ManifestPackageKind::Msp { patch_code } => {
                PackageKind::Msp(MspSpec { patch_code, target_products: Vec::new() })
            }
            ManifestPackageKind::MsuLike => PackageKind::MsuLike,
            ManifestPackageKind::Bundle { detect_codes, upgrade_codes, addon_codes, patch_codes, exit_codes, version } => {
                PackageKind::Bundle(BundleSpec {
                    detect_codes,
                    upgrade_codes,
                    addon_codes,
                    patch_codes,
                    exit_codes: exit_codes.into_iter().map(Into::into).collect(),
                    own_version: engine_vars::Version::parse(version.as_deref().unwrap_or("0")),
                })
            }
        };

        let mut package = Package::new(self.id, kind);
        package.permanent = self.permanent;
        package.per_machine = self.per_machine;
        package.cache_type = self.cache_type.into();
        package.cache_id = self.cache_id;
        package.payloads = self.payloads;
        package.dependencies = self.dependencies;
        package.condition = self.condition;
        package.can_affect_registration = self.can_affect_registration;
        package.rollback_boundary = self.rollback_boundary.map(|b| RollbackBoundary { id: b.id, vital: b.vital });
        package.requested = RequestState::Present;
        package.execute = ActionState::None;
        package
    }
}
