use async_trait::async_trait;
use engine_model::ActionState;

/// External collaborator that actually invokes the installer technology
/// (MSI/MSP/EXE subsystem) for a package. Out of scope for this crate the
/// same way `engine_search::SearchBackend` and `engine_model::DetectBackend`
/// draw the line: everything above this trait is pure decision-making,
/// everything below it is OS-specific plumbing.
#[async_trait]
pub trait InstallerBackend: Send + Sync {
    async fn run_exe(&self, package_id: &str, command_line: &str, elevated: bool) -> anyhow::Result<i32>;

    async fn run_msi(
        &self,
        package_id: &str,
        action: ActionState,
        properties: &str,
        elevated: bool,
    ) -> anyhow::Result<i32>;

    async fn run_msp(&self, package_id: &str, target_product: &str, elevated: bool) -> anyhow::Result<i32>;
}
