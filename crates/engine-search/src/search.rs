/// Which registry hive a registry-kind search reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryRoot {
    ClassesRoot,
    CurrentUser,
    LocalMachine,
    Users,
}

/// Target bitness for registry probes, mirroring the manifest's
/// `Win64` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bitness {
    Default,
    Force32,
    Force64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsiComponentMeasure {
    KeyPath,
    State,
    Directory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsiProductMeasure {
    Version,
    Language,
    State,
    Assignment,
}

#[derive(Debug, Clone)]
pub enum SearchKind {
    DirectoryExists { path: String },
    DirectoryPath { path: String },
    FileExists { path: String },
    FileVersion { path: String },
    FilePath { path: String },
    RegistryExists {
        root: RegistryRoot,
        key: String,
        value: Option<String>,
        bitness: Bitness,
    },
    RegistryValue {
        root: RegistryRoot,
        key: String,
        value: Option<String>,
        bitness: Bitness,
        expand_environment: bool,
    },
    MsiComponent {
        product_code: String,
        component_id: String,
        measure: MsiComponentMeasure,
    },
    MsiProduct {
        code: String,
        by_upgrade_code: bool,
        measure: MsiProductMeasure,
    },
    ExtensionSearch {
        extension: String,
        payload: String,
    },
    SetVariable {
        value: engine_vars::Value,
    },
}

/// A single declarative probe loaded from the manifest.
#[derive(Debug, Clone)]
pub struct Search {
    pub id: String,
    pub variable: String,
    pub condition: Option<String>,
    pub kind: SearchKind,
}

impl Search {
    pub fn is_exists_kind(&self) -> bool {
        matches!(
            self.kind,
            SearchKind::DirectoryExists { .. } | SearchKind::FileExists { .. } | SearchKind::RegistryExists { .. }
        )
    }
}
