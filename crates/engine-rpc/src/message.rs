use crate::codec::{Reader, Writer};
use anyhow::{bail, Result};
use engine_exec::{EmbeddedMessage, LogLevel};
use engine_model::CurrentState;

/// The BA-facing message catalog: what the engine reports to whatever is
/// hosting the bootstrapper application, over the same transport an
/// elevated companion speaks the embedded protocol on.
#[derive(Debug, Clone, PartialEq)]
pub enum BaMessage {
    DetectBegin,
    DetectPackageComplete { package_id: String, state: CurrentState },
    DetectComplete,
    PlanBegin,
    PlanComplete,
    ApplyBegin,
    ApplyPackageBegin { package_id: String },
    ApplyPackageComplete { package_id: String, code: i32 },
    Error { package_id: String, code: i32, message: String },
    ApplyComplete { restart_required: bool },
    Shutdown,
}

fn encode_current_state(state: CurrentState) -> u8 {
    match state {
        CurrentState::Unknown => 0,
        CurrentState::Obsolete => 1,
        CurrentState::Absent => 2,
        CurrentState::Cached => 3,
        CurrentState::Present => 4,
        CurrentState::Superseded => 5,
    }
}

fn decode_current_state(tag: u8) -> Result<CurrentState> {
    Ok(match tag {
        0 => CurrentState::Unknown,
        1 => CurrentState::Obsolete,
        2 => CurrentState::Absent,
        3 => CurrentState::Cached,
        4 => CurrentState::Present,
        5 => CurrentState::Superseded,
        other => bail!("unknown current-state tag {}", other),
    })
}

impl BaMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        match self {
            BaMessage::DetectBegin => w.write_u8(0),
            BaMessage::DetectPackageComplete { package_id, state } => {
                w.write_u8(1);
                w.write_string(package_id);
                w.write_u8(encode_current_state(*state));
            }
            BaMessage::DetectComplete => w.write_u8(2),
            BaMessage::PlanBegin => w.write_u8(3),
            BaMessage::PlanComplete => w.write_u8(4),
            BaMessage::ApplyBegin => w.write_u8(5),
            BaMessage::ApplyPackageBegin { package_id } => {
                w.write_u8(6);
                w.write_string(package_id);
            }
            BaMessage::ApplyPackageComplete { package_id, code } => {
                w.write_u8(7);
                w.write_string(package_id);
                w.write_i32(*code);
            }
            BaMessage::Error { package_id, code, message } => {
                w.write_u8(8);
                w.write_string(package_id);
                w.write_i32(*code);
                w.write_string(message);
            }
            BaMessage::ApplyComplete { restart_required } => {
                w.write_u8(9);
                w.write_u8(*restart_required as u8);
            }
            BaMessage::Shutdown => w.write_u8(10),
        }
        w.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        let message = match r.read_u8()? {
            0 => BaMessage::DetectBegin,
            1 => BaMessage::DetectPackageComplete {
                package_id: r.read_string()?,
                state: decode_current_state(r.read_u8()?)?,
            },
            2 => BaMessage::DetectComplete,
            3 => BaMessage::PlanBegin,
            4 => BaMessage::PlanComplete,
            5 => BaMessage::ApplyBegin,
            6 => BaMessage::ApplyPackageBegin { package_id: r.read_string()? },
            7 => BaMessage::ApplyPackageComplete {
                package_id: r.read_string()?,
                code: r.read_i32()?,
            },
            8 => BaMessage::Error {
                package_id: r.read_string()?,
                code: r.read_i32()?,
                message: r.read_string()?,
            },
            9 => BaMessage::ApplyComplete { restart_required: r.read_u8()? != 0 },
            10 => BaMessage::Shutdown,
            other => bail!("unknown ba message tag {}", other),
        };
        if !r.finished() {
            bail!("trailing bytes after decoding ba message");
        }
        Ok(message)
    }
}

/// Wire version of the BA→engine request surface this is currently
/// built against. A request carrying any other version decodes to
/// `BaRequest::UnsupportedVersion` instead of failing outright, mirroring
/// the original's per-request `E_NOTIMPL` rather than dropping the
/// connection.
pub const BA_API_VERSION: u32 = 1;

/// The BA→engine call surface, corresponding one-to-one with the public
/// BA-engine API: package/variable accessors, string formatting and
/// condition evaluation, embedded-bundle relay, source/update
/// configuration, and the five lifecycle verbs (`Detect`/`Plan`/
/// `Elevate`/`Apply`/`Quit`) plus the approved-exe launcher.
#[derive(Debug, Clone, PartialEq)]
pub enum BaRequest {
    GetPackageCount,
    GetVariableNumeric { name: String },
    GetVariableString { name: String },
    GetVariableVersion { name: String },
    SetVariableNumeric { name: String, value: i64 },
    SetVariableString { name: String, value: String },
    SetVariableVersion { name: String, value: String },
    FormatString { template: String },
    EscapeString { input: String },
    EvaluateCondition { condition: String },
    Log { level: u8, message: String },
    SendEmbeddedError { package_id: String, code: i32, message: String },
    SendEmbeddedProgress { progress_percentage: u32, overall_percentage: u32 },
    SetUpdate { local_source: String },
    SetLocalSource { package_id: String, path_source: String },
    SetDownloadSource { package_id: String, url: String },
    CloseSplashScreen,
    Detect,
    Plan { action: u8 },
    Elevate,
    Apply,
    Quit { exit_code: i32 },
    LaunchApprovedExe { approved_exe_id: String },
    SetUpdateSource { url: String },
    CompareVersions { left: String, right: String },
    GetRelatedBundleVariable { bundle_code: String, name: String },
    /// A request whose API-version prefix this catalog doesn't recognize.
    UnsupportedVersion { version: u32 },
}

impl BaRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_u32(BA_API_VERSION);
        match self {
            BaRequest::GetPackageCount => w.write_u8(0),
            BaRequest::GetVariableNumeric { name } => {
                w.write_u8(1);
                w.write_string(name);
            }
            BaRequest::GetVariableString { name } => {
                w.write_u8(2);
                w.write_string(name);
            }
            BaRequest::GetVariableVersion { name } => {
                w.write_u8(3);
                w.write_string(name);
            }
            BaRequest::SetVariableNumeric { name, value } => {
                w.write_u8(4);
                w.write_string(name);
                w.write_i32(*value as i32);
            }
            BaRequest::SetVariableString { name, value } => {
                w.write_u8(5);
                w.write_string(name);
                w.write_string(value);
            }
            BaRequest::SetVariableVersion { name, value } => {
                w.write_u8(6);
                w.write_string(name);
                w.write_string(value);
            }
            BaRequest::FormatString { template } => {
                w.write_u8(7);
                w.write_string(template);
            }
            BaRequest::EscapeString { input } => {
                w.write_u8(8);
                w.write_string(input);
            }
            BaRequest::EvaluateCondition { condition } => {
                w.write_u8(9);
                w.write_string(condition);
            }
            BaRequest::Log { level, message } => {
                w.write_u8(10);
                w.write_u8(*level);
                w.write_string(message);
            }
            BaRequest::SendEmbeddedError { package_id, code, message } => {
                w.write_u8(11);
                w.write_string(package_id);
                w.write_i32(*code);
                w.write_string(message);
            }
            BaRequest::SendEmbeddedProgress { progress_percentage, overall_percentage } => {
                w.write_u8(12);
                w.write_u32(*progress_percentage);
                w.write_u32(*overall_percentage);
            }
            BaRequest::SetUpdate { local_source } => {
                w.write_u8(13);
                w.write_string(local_source);
            }
            BaRequest::SetLocalSource { package_id, path_source } => {
                w.write_u8(14);
                w.write_string(package_id);
                w.write_string(path_source);
            }
            BaRequest::SetDownloadSource { package_id, url } => {
                w.write_u8(15);
                w.write_string(package_id);
                w.write_string(url);
            }
            BaRequest::CloseSplashScreen => w.write_u8(16),
            BaRequest::Detect => w.write_u8(17),
            BaRequest::Plan { action } => {
                w.write_u8(18);
                w.write_u8(*action);
            }
            BaRequest::Elevate => w.write_u8(19),
            BaRequest::Apply => w.write_u8(20),
            BaRequest::Quit { exit_code } => {
                w.write_u8(21);
                w.write_i32(*exit_code);
            }
            BaRequest::LaunchApprovedExe { approved_exe_id } => {
                w.write_u8(22);
                w.write_string(approved_exe_id);
            }
            BaRequest::SetUpdateSource { url } => {
                w.write_u8(23);
                w.write_string(url);
            }
            BaRequest::CompareVersions { left, right } => {
                w.write_u8(24);
                w.write_string(left);
                w.write_string(right);
            }
            BaRequest::GetRelatedBundleVariable { bundle_code, name } => {
                w.write_u8(25);
                w.write_string(bundle_code);
                w.write_string(name);
            }
            BaRequest::UnsupportedVersion { .. } => {
                unreachable!("UnsupportedVersion is a decode-only variant, never encoded")
            }
        }
        w.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        let version = r.read_u32()?;
        if version != BA_API_VERSION {
            return Ok(BaRequest::UnsupportedVersion { version });
        }
        let request = match r.read_u8()? {
            0 => BaRequest::GetPackageCount,
            1 => BaRequest::GetVariableNumeric { name: r.read_string()? },
            2 => BaRequest::GetVariableString { name: r.read_string()? },
            3 => BaRequest::GetVariableVersion { name: r.read_string()? },
            4 => BaRequest::SetVariableNumeric {
                name: r.read_string()?,
                value: r.read_i32()? as i64,
            },
            5 => BaRequest::SetVariableString {
                name: r.read_string()?,
                value: r.read_string()?,
            },
            6 => BaRequest::SetVariableVersion {
                name: r.read_string()?,
                value: r.read_string()?,
            },
            7 => BaRequest::FormatString { template: r.read_string()? },
            8 => BaRequest::EscapeString { input: r.read_string()? },
            9 => BaRequest::EvaluateCondition { condition: r.read_string()? },
            10 => BaRequest::Log { level: r.read_u8()?, message: r.read_string()? },
            11 => BaRequest::SendEmbeddedError {
                package_id: r.read_string()?,
                code: r.read_i32()?,
                message: r.read_string()?,
            },
            12 => BaRequest::SendEmbeddedProgress {
                progress_percentage: r.read_u32()?,
                overall_percentage: r.read_u32()?,
            },
            13 => BaRequest::SetUpdate { local_source: r.read_string()? },
            14 => BaRequest::SetLocalSource {
                package_id: r.read_string()?,
                path_source: r.read_string()?,
            },
            15 => BaRequest::SetDownloadSource {
                package_id: r.read_string()?,
                url: r.read_string()?,
            },
            16 => BaRequest::CloseSplashScreen,
            17 => BaRequest::Detect,
            18 => BaRequest::Plan { action: r.read_u8()? },
            19 => BaRequest::Elevate,
            20 => BaRequest::Apply,
            21 => BaRequest::Quit { exit_code: r.read_i32()? },
            22 => BaRequest::LaunchApprovedExe { approved_exe_id: r.read_string()? },
            23 => BaRequest::SetUpdateSource { url: r.read_string()? },
            24 => BaRequest::CompareVersions {
                left: r.read_string()?,
                right: r.read_string()?,
            },
            25 => BaRequest::GetRelatedBundleVariable {
                bundle_code: r.read_string()?,
                name: r.read_string()?,
            },
            other => bail!("unknown ba request tag {}", other),
        };
        if !r.finished() {
            bail!("trailing bytes after decoding ba request");
        }
        Ok(request)
    }
}

/// `(size, hresult, result)` response envelope for a `BaRequest`. `result`
/// is whatever typed payload the specific request promises (e.g. a
/// formatted string, a variable's numeric value); callers know the shape
/// from the request they sent, the same way the wire format never self-
/// describes response payloads beyond the leading size/hresult pair.
#[derive(Debug, Clone, PartialEq)]
pub struct BaResponse {
    pub hresult: i32,
    pub result: Vec<u8>,
}

impl BaResponse {
    pub fn ok(result: Vec<u8>) -> Self {
        BaResponse { hresult: 0, result }
    }

    pub fn failure(hresult: i32) -> Self {
        BaResponse { hresult, result: Vec::new() }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_u32(self.result.len() as u32);
        w.write_i32(self.hresult);
        let mut bytes = w.into_bytes();
        bytes.extend_from_slice(&self.result);
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        let size = r.read_u32()? as usize;
        let hresult = r.read_i32()?;
        let result = r.take_remaining()?.to_vec();
        if result.len() != size {
            bail!("ba response declared size {} but carried {} bytes", size, result.len());
        }
        Ok(BaResponse { hresult, result })
    }
}

fn encode_log_level(level: LogLevel) -> u8 {
    match level {
        LogLevel::Standard => 0,
        LogLevel::Verbose => 1,
        LogLevel::Debug => 2,
        LogLevel::Error => 3,
    }
}

fn decode_log_level(tag: u8) -> Result<LogLevel> {
    Ok(match tag {
        0 => LogLevel::Standard,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        3 => LogLevel::Error,
        other => bail!("unknown log level tag {}", other),
    })
}

/// Wire encoding for the embedded protocol spoken with an Elevated or
/// Embedded child process, over the same framed transport as `BaMessage`.
pub fn encode_embedded(message: &EmbeddedMessage) -> Vec<u8> {
    let mut w = Writer::new();
    match message {
        EmbeddedMessage::Log { level, message } => {
            w.write_u8(0);
            w.write_u8(encode_log_level(*level));
            w.write_string(message);
        }
        EmbeddedMessage::Error { package_id, code, message } => {
            w.write_u8(1);
            w.write_string(package_id);
            w.write_i32(*code);
            w.write_string(message);
        }
        EmbeddedMessage::Progress { progress_percentage, overall_percentage } => {
            w.write_u8(2);
            w.write_u32(*progress_percentage);
            w.write_u32(*overall_percentage);
        }
        EmbeddedMessage::DialogResult { result } => {
            w.write_u8(3);
            w.write_i32(*result);
        }
        EmbeddedMessage::Terminate => w.write_u8(4),
    }
    w.into_bytes()
}

pub fn decode_embedded(bytes: &[u8]) -> Result<EmbeddedMessage> {
    let mut r = Reader::new(bytes);
    let message = match r.read_u8()? {
        0 => EmbeddedMessage::Log { level: decode_log_level(r.read_u8()?)?, message: r.read_string()? },
        1 => EmbeddedMessage::Error {
            package_id: r.read_string()?,
            code: r.read_i32()?,
            message: r.read_string()?,
        },
        2 => EmbeddedMessage::Progress {
            progress_percentage: r.read_u32()?,
            overall_percentage: r.read_u32()?,
        },
        3 => EmbeddedMessage::DialogResult { result: r.read_i32()? },
        4 => EmbeddedMessage::Terminate,
        other => bail!("unknown embedded message tag {}", other),
    };
    if !r.finished() {
        bail!("trailing bytes after decoding embedded message");
    }
    Ok(message)
}
