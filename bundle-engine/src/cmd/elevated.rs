use crate::backend::ProcessInstallerBackend;
use anyhow::{Context, Result};
use clap::Parser;
use engine_exec::InstallerBackend;
use engine_rpc::{bind_unix, ElevatedRequest, ElevatedResponse, FramedTransport};
use std::path::PathBuf;

/// Internal role a per-user `run` process re-execs itself into when a
/// plan touches a per-machine package: binds `--rpc-socket`, accepts one
/// connection from the parent, and executes whatever `ElevatedRequest`s
/// it forwards until told to shut down. Carries no manifest of its own —
/// every detect/plan decision already happened in the parent.
#[derive(Debug, Parser)]
pub struct ElevatedCompanion {
    #[clap(long)]
    rpc_socket: PathBuf,
}

impl ElevatedCompanion {
    pub async fn run(self) -> Result<()> {
        let listener = bind_unix(&self.rpc_socket).await.context("binding elevated companion socket")?;
        log::debug!("elevated companion listening on {}", self.rpc_socket.display());

        let (stream, _addr) = listener.accept().await.context("accepting parent connection")?;
        let mut transport = FramedTransport::new(stream);
        let backend = ProcessInstallerBackend;

        loop {
            let Some(frame) = transport.recv().await.context("reading elevated request")? else {
                log::warn!("elevated companion: parent closed the connection without requesting shutdown");
                break;
            };
            let request = ElevatedRequest::decode(&frame).context("decoding elevated request")?;

            let exit_code = match request {
                ElevatedRequest::RunExe { package_id, command_line } => {
                    run_and_log(&package_id, backend.run_exe(&package_id, &command_line, false).await)
                }
                ElevatedRequest::RunMsi { package_id, action, properties } => {
                    run_and_log(&package_id, backend.run_msi(&package_id, action, &properties, false).await)
                }
                ElevatedRequest::RunMsp { package_id, target_product } => {
                    run_and_log(&package_id, backend.run_msp(&package_id, &target_product, false).await)
                }
                ElevatedRequest::Shutdown => {
                    log::debug!("elevated companion: shutdown requested");
                    break;
                }
            };
            transport.send(&ElevatedResponse { exit_code }.encode()).await.context("sending elevated response")?;
        }

        Ok(())
    }
}

/// The wire format has no room for an error string, only an exit code, so
/// a backend failure (as opposed to a nonzero exit) is logged here and
/// folded into a generic failure code rather than silently eaten.
fn run_and_log(package_id: &str, result: anyhow::Result<i32>) -> i32 {
    match result {
        Ok(code) => code,
        Err(err) => {
            log::error!("elevated action for '{}' failed: {:#}", package_id, err);
            -1
        }
    }
}
