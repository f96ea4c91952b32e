use crate::backend::{
    relaunch_from_clean_room, ElevatingInstallerBackend, FileRegistrationBackend, OsDetectBackend, OsSearchBackend,
    ProcessInstallerBackend,
};
use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use engine_core::{Engine, Manifest};
use engine_exec::RunMode;
use engine_model::{DependencyParent, IgnoreDependencies, RequestState};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RunModeArg {
    Normal,
    Elevated,
    Embedded,
    RunOnce,
}

impl From<RunModeArg> for RunMode {
    fn from(mode: RunModeArg) -> Self {
        match mode {
            RunModeArg::Normal => RunMode::Normal,
            RunModeArg::Elevated => RunMode::Elevated,
            RunModeArg::Embedded => RunMode::Embedded,
            RunModeArg::RunOnce => RunMode::RunOnce,
        }
    }
}

fn parse_override(text: &str) -> Result<(String, String), String> {
    match text.split_once('=') {
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => Err(format!("'{}' is not a KEY=VALUE override", text)),
    }
}

fn parse_dependency_parent(text: &Option<String>) -> DependencyParent {
    match text.as_deref() {
        None => DependencyParent::Default,
        Some("none") => DependencyParent::None,
        Some(id) => DependencyParent::Id(id.to_string()),
    }
}

fn parse_ignore_dependencies(text: &Option<String>) -> IgnoreDependencies {
    match text.as_deref() {
        None => IgnoreDependencies::None,
        Some("ALL") => IgnoreDependencies::All,
        Some(list) => IgnoreDependencies::Packages(list.split(';').map(|s| s.to_string()).collect()),
    }
}

fn mode_arg_name(mode: RunModeArg) -> &'static str {
    match mode {
        RunModeArg::Normal => "normal",
        RunModeArg::Elevated => "elevated",
        RunModeArg::Embedded => "embedded",
        RunModeArg::RunOnce => "run-once",
    }
}

/// Detects, plans and applies a manifest's chain in one pass. Mirrors the
/// classic Burn engine's command line: install unless `--uninstall` or
/// `--repair` is given, with `--clean-room` taking over entirely (the
/// untrusted-launch relaunch dance happens before any manifest is read).
#[derive(Debug, Parser)]
pub struct Run {
    /// Path to the bundle manifest (TOML). Ignored when `--clean-room`
    /// is given.
    manifest: PathBuf,

    #[clap(long)]
    uninstall: bool,

    #[clap(long)]
    repair: bool,

    #[clap(long, value_enum, default_value = "normal")]
    mode: RunModeArg,

    /// Enter untrusted ("clean room") mode: cache this executable to a
    /// secure location, relaunch it from there, wait, and propagate its
    /// exit code. `ORIGINAL` is the path this process was first started
    /// from, carried through so the relaunched copy can log its origin.
    #[clap(long, value_name = "ORIGINAL")]
    clean_room: Option<PathBuf>,

    /// This package's dependency parent, recorded against per-machine
    /// registration. `none` suppresses parent registration entirely.
    #[clap(long)]
    parent: Option<String>,

    /// `ALL` or a semicolon-separated list of dependency provider keys
    /// to ignore when a per-machine package would otherwise refuse to
    /// uninstall because something still depends on it.
    #[clap(long)]
    ignore_dependencies: Option<String>,

    /// Suppress any restart this chain's exit code would otherwise
    /// request.
    #[clap(long)]
    norestart: bool,

    /// Redirect this process's log output to `PATH` in addition to
    /// stderr.
    #[clap(long = "log", value_name = "PATH")]
    log_path: Option<PathBuf>,

    /// Free-form `KEY=VALUE` overrides applied to the variable store
    /// before detect runs. Best-effort: a failed override (read-only or
    /// malformed name) is logged as a warning, not a hard error.
    #[clap(value_parser = parse_override, value_name = "KEY=VALUE")]
    overrides: Vec<(String, String)>,
}

impl Run {
    pub async fn run(self) -> Result<()> {
        if let Some(original) = self.clean_room.clone() {
            let mut relaunch_args = vec!["run".to_string()];
            if self.uninstall {
                relaunch_args.push("--uninstall".to_string());
            }
            if self.repair {
                relaunch_args.push("--repair".to_string());
            }
            relaunch_args.push("--mode".to_string());
            relaunch_args.push(mode_arg_name(self.mode).to_string());
            if let Some(parent) = &self.parent {
                relaunch_args.push(format!("--parent={}", parent));
            }
            if let Some(ignored) = &self.ignore_dependencies {
                relaunch_args.push(format!("--ignore-dependencies={}", ignored));
            }
            if self.norestart {
                relaunch_args.push("--norestart".to_string());
            }
            if let Some(log_path) = &self.log_path {
                relaunch_args.push(format!("--log={}", log_path.display()));
            }
            relaunch_args.push(self.manifest.display().to_string());
            for (key, value) in &self.overrides {
                relaunch_args.push(format!("{}={}", key, value));
            }

            let code = relaunch_from_clean_room(&original, &relaunch_args)
                .await
                .context("clean-room relaunch")?;
            std::process::exit(code);
        }

        if self.uninstall && self.repair {
            bail!("--uninstall and --repair are mutually exclusive");
        }
        let requested = if self.uninstall {
            RequestState::Absent
        } else if self.repair {
            RequestState::Repair
        } else {
            RequestState::Present
        };

        if let Some(path) = &self.log_path {
            log::info!("log output additionally requested at {}", path.display());
        }
        let dependency_parent = parse_dependency_parent(&self.parent);
        let ignore_dependencies = parse_ignore_dependencies(&self.ignore_dependencies);
        if let Some(parent) = &self.parent {
            log::debug!("running with dependency parent '{}'", parent);
        }
        if let Some(ignored) = &self.ignore_dependencies {
            log::debug!("ignoring dependencies: {}", ignored);
        }

        let text = std::fs::read_to_string(&self.manifest)
            .with_context(|| format!("reading manifest {}", self.manifest.display()))?;
        let manifest: Manifest = toml::from_str(&text).context("parsing manifest")?;
        let mut engine = Engine::from_manifest(manifest);

        for (key, value) in &self.overrides {
            if let Err(err) = engine.store_mut().set_string(key, value.clone(), true) {
                log::warn!("command-line override of '{}' failed: {}", key, err);
            }
        }

        engine.run_searches(&OsSearchBackend);
        engine.detect(&OsDetectBackend).context("detecting package state")?;
        let registration = FileRegistrationBackend::new().context("opening dependency registration store")?;
        engine.detect_registration(&registration).context("detecting package registration state")?;

        for package in engine.packages_mut() {
            package.requested = requested;
        }

        let plan = engine.build_plan_for(&dependency_parent, &ignore_dependencies);
        if plan.is_noop() {
            log::info!("nothing to do");
            return Ok(());
        }

        let needs_elevation =
            matches!(self.mode, RunModeArg::Normal) && plan.requires_elevation() && !engine_vars::is_privileged();
        let elevated_companion = if needs_elevation {
            log::info!("plan touches a per-machine package; spawning an elevated companion process");
            Some(ElevatingInstallerBackend::spawn().await.context("spawning elevated companion")?)
        } else {
            None
        };

        let reboot = if let Some(companion) = &elevated_companion {
            engine.apply(companion, &registration, RunMode::from(self.mode)).await
        } else {
            engine.apply(&ProcessInstallerBackend, &registration, RunMode::from(self.mode)).await
        }
        .context("applying plan")?;

        if let Some(companion) = elevated_companion {
            companion.shutdown().await.context("shutting down elevated companion")?;
        }

        if reboot && self.norestart {
            log::warn!("a reboot would be required to finish this operation, but --norestart suppresses it");
        } else if reboot {
            log::warn!("a reboot is required to finish this operation");
        }
        Ok(())
    }
}
