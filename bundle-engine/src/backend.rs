//! The OS-integration boundary: concrete implementations of the three
//! external-collaborator traits the lower crates define. Directory/file
//! existence is genuine, portable work; everything the spec carves out
//! as a Non-goal (registry, MSI/MSP invocation, ARP) returns a clear
//! "not supported" error instead of guessing at platform behavior.

use anyhow::{bail, Context, Result as AnyResult};
use async_trait::async_trait;
use engine_exec::InstallerBackend;
use engine_model::{ActionState, CurrentState, DetectBackend, InstallRegistrationState, RegistrationBackend};
use engine_rpc::{ElevatedRequest, ElevatedResponse, FramedTransport};
use engine_search::{Bitness, MsiComponentMeasure, MsiProductMeasure, RegistryRoot, SearchBackend};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::Instant;

pub struct OsSearchBackend;

impl SearchBackend for OsSearchBackend {
    fn directory_exists(&self, path: &str) -> Result<bool, String> {
        Ok(Path::new(path).is_dir())
    }

    fn file_exists(&self, path: &str) -> Result<bool, String> {
        Ok(Path::new(path).is_file())
    }

    fn file_version(&self, _path: &str) -> Result<Option<String>, String> {
        Err("file version resource queries are not implemented on this platform".to_string())
    }

    fn registry_exists(
        &self,
        _root: RegistryRoot,
        _key: &str,
        _value: Option<&str>,
        _bitness: Bitness,
    ) -> Result<bool, String> {
        Err("registry search is not implemented on this platform".to_string())
    }

    fn registry_value(
        &self,
        _root: RegistryRoot,
        _key: &str,
        _value: Option<&str>,
        _bitness: Bitness,
        _expand_environment: bool,
    ) -> Result<Option<String>, String> {
        Err("registry search is not implemented on this platform".to_string())
    }

    fn msi_component(
        &self,
        _product_code: &str,
        _component_id: &str,
        _measure: MsiComponentMeasure,
    ) -> Result<Option<String>, String> {
        Err("msi component search is not implemented on this platform".to_string())
    }

    fn msi_product(
        &self,
        _code: &str,
        _by_upgrade_code: bool,
        _measure: MsiProductMeasure,
    ) -> Result<Option<String>, String> {
        Err("msi product search is not implemented on this platform".to_string())
    }

    fn extension_search(&self, _extension: &str, _payload: &str) -> Result<Option<String>, String> {
        Err("extension search has no registered extensions on this platform".to_string())
    }
}

pub struct OsDetectBackend;

impl DetectBackend for OsDetectBackend {
    fn msi_product_state(&self, _product_code: &str) -> Result<CurrentState, String> {
        Err("msi product detection is not implemented on this platform".to_string())
    }

    fn msi_product_version(&self, _product_code: &str) -> Result<Option<String>, String> {
        Err("msi product detection is not implemented on this platform".to_string())
    }

    fn msp_targets(&self, _patch_code: &str) -> Result<Vec<(String, bool, u32)>, String> {
        Err("msp targeting is not implemented on this platform".to_string())
    }

    fn msp_state_for_target(&self, _patch_code: &str, _product_code: &str) -> Result<CurrentState, String> {
        Err("msp targeting is not implemented on this platform".to_string())
    }

    fn bundle_state(&self, _provider_code: &str, _per_machine: bool) -> Result<CurrentState, String> {
        Ok(CurrentState::Absent)
    }

    fn bundle_version(&self, _provider_code: &str, _per_machine: bool) -> Result<Option<String>, String> {
        Ok(None)
    }

    fn related_bundle_versions(&self, _provider_code: &str, _per_machine: bool) -> Result<Vec<(String, String)>, String> {
        // No related-bundle registry to enumerate on this platform; an
        // empty sighting list folds to Absent in the self/newer matrix.
        Ok(Vec::new())
    }

    fn exe_arp_version(&self, _arp_key: &str) -> Result<Option<String>, String> {
        Err("arp detection is not implemented on this platform".to_string())
    }
}

/// A dependent's registered interest in a shared package, tracked as one
/// file per package under a per-user state directory: each line is a
/// dependent's provider id. Stands in for the registry-backed dependency
/// store the original engine consults, the same way `OsDetectBackend`
/// stands in for ARP/MSI/MSP registry lookups elsewhere in this file.
pub struct FileRegistrationBackend {
    dir: PathBuf,
}

impl FileRegistrationBackend {
    pub fn new() -> anyhow::Result<Self> {
        let home = home::home_dir().ok_or_else(|| anyhow::anyhow!("could not determine the home directory"))?;
        let dir = home.join(".local").join("share").join("bundle-engine").join("dependents");
        std::fs::create_dir_all(&dir)?;
        Ok(FileRegistrationBackend { dir })
    }

    fn path_for(&self, package_id: &str) -> PathBuf {
        let safe: String = package_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.deps", safe))
    }

    fn read_dependents(&self, package_id: &str) -> Result<Vec<String>, String> {
        match std::fs::read_to_string(self.path_for(package_id)) {
            Ok(contents) => Ok(contents.lines().map(str::to_string).collect()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err.to_string()),
        }
    }

    fn write_dependents(&self, package_id: &str, dependents: &[String]) -> Result<(), String> {
        let path = self.path_for(package_id);
        if dependents.is_empty() {
            match std::fs::remove_file(&path) {
                Ok(()) | Err(_) => return Ok(()),
            }
        }
        std::fs::write(&path, dependents.join("\n")).map_err(|err| err.to_string())
    }
}

impl RegistrationBackend for FileRegistrationBackend {
    fn registration_state(&self, package_id: &str) -> Result<InstallRegistrationState, String> {
        let dependents = self.read_dependents(package_id)?;
        Ok(if dependents.is_empty() { InstallRegistrationState::Absent } else { InstallRegistrationState::Present })
    }

    fn register_dependency(&self, package_id: &str, dependent: &str) -> Result<(), String> {
        let mut dependents = self.read_dependents(package_id)?;
        if !dependents.iter().any(|d| d == dependent) {
            dependents.push(dependent.to_string());
        }
        self.write_dependents(package_id, &dependents)
    }

    fn unregister_dependency(&self, package_id: &str, dependent: &str) -> Result<(), String> {
        let mut dependents = self.read_dependents(package_id)?;
        dependents.retain(|d| d != dependent);
        self.write_dependents(package_id, &dependents)
    }
}

/// Runs an Exe package's assembled command line as a child process.
/// Argument splitting is naive (whitespace-separated) since the manifest
/// format this crate reads already stores arguments pre-quoted for the
/// target platform's shell; MSI/MSP invocation is out of scope here and
/// returns an error instead of shelling out to a guessed tool name.
pub struct ProcessInstallerBackend;

#[async_trait]
impl InstallerBackend for ProcessInstallerBackend {
    async fn run_exe(&self, package_id: &str, command_line: &str, _elevated: bool) -> anyhow::Result<i32> {
        let mut parts = command_line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| anyhow::anyhow!("package '{}' has an empty command line", package_id))?;

        let status = Command::new(program)
            .args(parts)
            .stdin(Stdio::null())
            .status()
            .await?;
        Ok(status.code().unwrap_or(-1))
    }

    async fn run_msi(
        &self,
        package_id: &str,
        _action: ActionState,
        _properties: &str,
        _elevated: bool,
    ) -> anyhow::Result<i32> {
        anyhow::bail!("msi execution for package '{}' is not implemented on this platform", package_id)
    }

    async fn run_msp(&self, package_id: &str, _target_product: &str, _elevated: bool) -> anyhow::Result<i32> {
        anyhow::bail!("msp execution for package '{}' is not implemented on this platform", package_id)
    }
}

fn elevated_rpc_dir() -> AnyResult<PathBuf> {
    let home = home::home_dir().ok_or_else(|| anyhow::anyhow!("could not determine the home directory"))?;
    Ok(home.join(".local").join("share").join("bundle-engine").join("rpc"))
}

/// Forwards per-machine package actions to a lazily-spawned elevated
/// companion process (this same executable, re-exec'd as
/// `elevated-companion`) over a Unix socket; per-user actions still run
/// directly through a local `ProcessInstallerBackend`. Mirrors the
/// original engine only crossing into its elevated process for the
/// subset of actions that actually need it, rather than elevating the
/// whole chain.
pub struct ElevatingInstallerBackend {
    local: ProcessInstallerBackend,
    transport: Mutex<FramedTransport>,
    child: Mutex<Child>,
    socket_path: PathBuf,
}

impl ElevatingInstallerBackend {
    /// Spawns the companion and waits for it to bind its socket and
    /// accept a connection. The companion owns the socket path (the more-
    /// privileged side binds, the caller connects), matching how a real
    /// elevated process would be the one trusted to create the pipe.
    pub async fn spawn() -> AnyResult<Self> {
        let dir = elevated_rpc_dir()?;
        std::fs::create_dir_all(&dir).context("creating elevated rpc directory")?;
        let socket_path = dir.join(format!("{}.sock", std::process::id()));
        if socket_path.exists() {
            std::fs::remove_file(&socket_path).context("removing stale elevated rpc socket")?;
        }

        let current = std::env::current_exe().context("resolving this executable's path")?;
        let mut child = Command::new(&current)
            .arg("elevated-companion")
            .arg("--rpc-socket")
            .arg(&socket_path)
            .stdin(Stdio::null())
            .spawn()
            .context("spawning elevated companion")?;

        let deadline = Instant::now() + Duration::from_secs(10);
        while !socket_path.exists() {
            if let Some(status) = child.try_wait().context("polling elevated companion")? {
                bail!("elevated companion exited before binding its socket ({})", status);
            }
            if Instant::now() >= deadline {
                bail!("elevated companion did not bind its socket within 10s");
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }

        let transport = FramedTransport::connect(&socket_path)
            .await
            .context("connecting to elevated companion")?;

        Ok(ElevatingInstallerBackend {
            local: ProcessInstallerBackend,
            transport: Mutex::new(transport),
            child: Mutex::new(child),
            socket_path,
        })
    }

    async fn call(&self, request: ElevatedRequest) -> AnyResult<i32> {
        let mut transport = self.transport.lock().await;
        transport.send(&request.encode()).await.context("forwarding request to elevated companion")?;
        let frame = transport
            .recv()
            .await
            .context("reading elevated companion response")?
            .ok_or_else(|| anyhow::anyhow!("elevated companion closed the connection"))?;
        Ok(ElevatedResponse::decode(&frame)?.exit_code)
    }

    /// Tells the companion there is nothing left to forward and waits for
    /// it to exit. Call once, after the last elevated action in a chain.
    pub async fn shutdown(&self) -> AnyResult<()> {
        {
            let mut transport = self.transport.lock().await;
            transport.send(&ElevatedRequest::Shutdown.encode()).await.context("requesting companion shutdown")?;
        }
        self.child.lock().await.wait().await.context("waiting for elevated companion to exit")?;
        let _ = std::fs::remove_file(&self.socket_path);
        Ok(())
    }
}

#[async_trait]
impl InstallerBackend for ElevatingInstallerBackend {
    async fn run_exe(&self, package_id: &str, command_line: &str, elevated: bool) -> anyhow::Result<i32> {
        if elevated && !engine_vars::is_privileged() {
            self.call(ElevatedRequest::RunExe {
                package_id: package_id.to_string(),
                command_line: command_line.to_string(),
            })
            .await
        } else {
            self.local.run_exe(package_id, command_line, elevated).await
        }
    }

    async fn run_msi(
        &self,
        package_id: &str,
        action: ActionState,
        properties: &str,
        elevated: bool,
    ) -> anyhow::Result<i32> {
        if elevated && !engine_vars::is_privileged() {
            self.call(ElevatedRequest::RunMsi {
                package_id: package_id.to_string(),
                action,
                properties: properties.to_string(),
            })
            .await
        } else {
            self.local.run_msi(package_id, action, properties, elevated).await
        }
    }

    async fn run_msp(&self, package_id: &str, target_product: &str, elevated: bool) -> anyhow::Result<i32> {
        if elevated && !engine_vars::is_privileged() {
            self.call(ElevatedRequest::RunMsp {
                package_id: package_id.to_string(),
                target_product: target_product.to_string(),
            })
            .await
        } else {
            self.local.run_msp(package_id, target_product, elevated).await
        }
    }
}

/// Directory an untrusted-launched copy of this binary gets staged into
/// before it relaunches itself. Per-user, since the clean-room contract
/// only needs a location the original (possibly world-writable download
/// directory) can't tamper with after the copy is made, not necessarily
/// a per-machine one.
fn clean_room_cache_dir() -> anyhow::Result<PathBuf> {
    let home = home::home_dir().ok_or_else(|| anyhow::anyhow!("could not determine the home directory"))?;
    Ok(home.join(".cache").join("bundle-engine").join("clean-room"))
}

/// Implements the untrusted-launch dance: copy this executable into a
/// location the original launch path can't write to, relaunch from
/// there, wait for it to finish, and propagate its exit code. `original`
/// is recorded for the relaunched copy's own logging; it does not affect
/// where the copy is staged.
pub async fn relaunch_from_clean_room(original: &Path, relaunch_args: &[String]) -> anyhow::Result<i32> {
    let cache_dir = clean_room_cache_dir()?;
    std::fs::create_dir_all(&cache_dir)?;

    let current = std::env::current_exe()?;
    let file_name = current
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("current executable path has no file name"))?;
    let cached = cache_dir.join(file_name);

    if !cached.exists() {
        std::fs::copy(&current, &cached)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&cached)?.permissions();
            perms.set_mode(0o700);
            std::fs::set_permissions(&cached, perms)?;
        }
    }

    log::info!("relaunching from clean room at {} (original: {})", cached.display(), original.display());

    let status = Command::new(&cached).args(relaunch_args).status().await?;
    Ok(status.code().unwrap_or(-1))
}
