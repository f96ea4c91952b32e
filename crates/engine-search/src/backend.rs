use crate::search::{Bitness, MsiComponentMeasure, MsiProductMeasure, RegistryRoot};

/// External collaborator providing the actual OS/MSI probes. The engine
/// core is deliberately ignorant of how these are implemented (registry
/// access, MSI API calls, extension dispatch); production wiring plugs
/// in a real implementation, tests plug in a fake.
pub trait SearchBackend {
    fn directory_exists(&self, path: &str) -> Result<bool, String>;

    fn file_exists(&self, path: &str) -> Result<bool, String>;

    /// `Ok(None)` means the file does not exist or carries no version
    /// resource; that is "variable unchanged", not a failure.
    fn file_version(&self, path: &str) -> Result<Option<String>, String>;

    fn registry_exists(
        &self,
        root: RegistryRoot,
        key: &str,
        value: Option<&str>,
        bitness: Bitness,
    ) -> Result<bool, String>;

    fn registry_value(
        &self,
        root: RegistryRoot,
        key: &str,
        value: Option<&str>,
        bitness: Bitness,
        expand_environment: bool,
    ) -> Result<Option<String>, String>;

    fn msi_component(
        &self,
        product_code: &str,
        component_id: &str,
        measure: MsiComponentMeasure,
    ) -> Result<Option<String>, String>;

    fn msi_product(
        &self,
        code: &str,
        by_upgrade_code: bool,
        measure: MsiProductMeasure,
    ) -> Result<Option<String>, String>;

    fn extension_search(&self, extension: &str, payload: &str) -> Result<Option<String>, String>;
}
