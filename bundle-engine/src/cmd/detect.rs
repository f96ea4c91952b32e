use crate::backend::{FileRegistrationBackend, OsDetectBackend, OsSearchBackend};
use anyhow::{Context, Result};
use clap::Parser;
use engine_core::{Engine, Manifest};
use std::path::PathBuf;

/// Runs search and detect against a manifest and prints the resulting
/// state of every package in the chain, without planning or applying
/// anything.
#[derive(Debug, Parser)]
pub struct Detect {
    /// Path to the bundle manifest (TOML).
    manifest: PathBuf,
}

impl Detect {
    pub async fn run(self) -> Result<()> {
        let text = std::fs::read_to_string(&self.manifest)
            .with_context(|| format!("reading manifest {}", self.manifest.display()))?;
        let manifest: Manifest = toml::from_str(&text).context("parsing manifest")?;
        let mut engine = Engine::from_manifest(manifest);

        engine.run_searches(&OsSearchBackend);
        engine.detect(&OsDetectBackend).context("detecting package state")?;
        let registration = FileRegistrationBackend::new().context("opening dependency registration store")?;
        engine.detect_registration(&registration).context("detecting package registration state")?;

        for package in engine.packages() {
            println!("{}: {:?} (registration: {:?})", package.id, package.current_state, package.install_registration_state);
        }
        Ok(())
    }
}
