mod detect;
mod elevated;
mod run;

use self::detect::Detect;
use self::elevated::ElevatedCompanion;
use self::run::Run;
use anyhow::Result;
use clap::Parser;
use env_logger::Builder;
use log::LevelFilter;

const DEFAULT_LEVEL_FILTER: LevelFilter = LevelFilter::Info;

/// Command-line entrypoint for the bundle installer engine core described
/// in this workspace: detect, plan and apply a chain of heterogeneous
/// packages (executables, MSI packages, MSP patches, nested bundles)
/// against a declarative manifest.
#[derive(Debug, Parser)]
#[clap(about, long_about = None, version)]
pub(crate) struct Args {
    /// Set the logging level. One of [off|error|warn|info|debug|trace].
    /// Defaults to info. You can also leave this unset and use the
    /// RUST_LOG env variable. See https://github.com/rust-cli/env_logger/
    #[clap(long = "log-level")]
    pub(crate) log_level: Option<LevelFilter>,

    #[clap(subcommand)]
    pub(crate) subcommand: Subcommand,
}

#[derive(Debug, Parser)]
pub(crate) enum Subcommand {
    /// Run search and detect against a manifest and print each package's
    /// resulting current state, without planning or applying anything.
    Detect(Detect),

    /// Detect, plan and apply a manifest's chain in one pass: install
    /// unless `--uninstall` or `--repair` is given.
    Run(Run),

    /// Internal role: a `run` process re-execs itself into this when its
    /// plan touches a per-machine package and it isn't already running
    /// with the `PRIVILEGED` identity. Not meant to be invoked directly.
    #[clap(hide = true)]
    ElevatedCompanion(ElevatedCompanion),
}

/// Entrypoint dispatching to whichever subcommand was requested.
pub(super) async fn run(args: Args) -> Result<()> {
    match args.subcommand {
        Subcommand::Detect(detect) => detect.run().await,
        Subcommand::Run(run) => run.run().await,
        Subcommand::ElevatedCompanion(companion) => companion.run().await,
    }
}

/// use `level` if present, or else use `RUST_LOG` if present, or else use a default.
pub(super) fn init_logger(level: Option<LevelFilter>) {
    match (std::env::var(env_logger::DEFAULT_FILTER_ENV).ok(), level) {
        (Some(_), None) => {
            // RUST_LOG exists and level does not; use the environment variable.
            Builder::from_default_env().init();
        }
        _ => {
            // use provided log level or default for this crate only.
            Builder::new()
                .filter(Some(env!("CARGO_CRATE_NAME")), level.unwrap_or(DEFAULT_LEVEL_FILTER))
                .init();
        }
    }
}
