use crate::codec::{Reader, Writer};
use anyhow::{bail, Result};
use engine_model::ActionState;

fn encode_action_state(state: ActionState) -> u8 {
    match state {
        ActionState::None => 0,
        ActionState::Install => 1,
        ActionState::Uninstall => 2,
        ActionState::Modify => 3,
        ActionState::Repair => 4,
        ActionState::MinorUpgrade => 5,
    }
}

fn decode_action_state(tag: u8) -> Result<ActionState> {
    Ok(match tag {
        0 => ActionState::None,
        1 => ActionState::Install,
        2 => ActionState::Uninstall,
        3 => ActionState::Modify,
        4 => ActionState::Repair,
        5 => ActionState::MinorUpgrade,
        other => bail!("unknown action-state tag {}", other),
    })
}

/// What a per-user `Normal` process asks its elevated companion to run on
/// its behalf, one per-machine package action at a time. The companion
/// has no manifest or plan of its own — it is a pure executor of whatever
/// the parent already decided.
#[derive(Debug, Clone, PartialEq)]
pub enum ElevatedRequest {
    RunExe { package_id: String, command_line: String },
    RunMsi { package_id: String, action: ActionState, properties: String },
    RunMsp { package_id: String, target_product: String },
    /// Sent once the parent has no further per-machine actions left;
    /// the companion closes its socket and exits after replying.
    Shutdown,
}

impl ElevatedRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        match self {
            ElevatedRequest::RunExe { package_id, command_line } => {
                w.write_u8(0);
                w.write_string(package_id);
                w.write_string(command_line);
            }
            ElevatedRequest::RunMsi { package_id, action, properties } => {
                w.write_u8(1);
                w.write_string(package_id);
                w.write_u8(encode_action_state(*action));
                w.write_string(properties);
            }
            ElevatedRequest::RunMsp { package_id, target_product } => {
                w.write_u8(2);
                w.write_string(package_id);
                w.write_string(target_product);
            }
            ElevatedRequest::Shutdown => w.write_u8(3),
        }
        w.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        let request = match r.read_u8()? {
            0 => ElevatedRequest::RunExe { package_id: r.read_string()?, command_line: r.read_string()? },
            1 => ElevatedRequest::RunMsi {
                package_id: r.read_string()?,
                action: decode_action_state(r.read_u8()?)?,
                properties: r.read_string()?,
            },
            2 => ElevatedRequest::RunMsp { package_id: r.read_string()?, target_product: r.read_string()? },
            3 => ElevatedRequest::Shutdown,
            other => bail!("unknown elevated request tag {}", other),
        };
        if !r.finished() {
            bail!("trailing bytes after decoding elevated request");
        }
        Ok(request)
    }
}

/// The companion's reply to one `ElevatedRequest`. `Shutdown` has no
/// matching response; the companion just closes the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElevatedResponse {
    pub exit_code: i32,
}

impl ElevatedResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_i32(self.exit_code);
        w.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        let exit_code = r.read_i32()?;
        if !r.finished() {
            bail!("trailing bytes after decoding elevated response");
        }
        Ok(ElevatedResponse { exit_code })
    }
}
