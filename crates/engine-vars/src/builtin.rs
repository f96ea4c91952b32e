//! Built-in, read-only variables computed on demand from the host.
//!
//! Lookups against this table are case-insensitive, matching the
//! built-in set's behaviour called out in the store's module docs.

use crate::value::Value;
use nix::unistd::Uid;
use std::env;

/// Whether this process is already running with the elevated/"machine"
/// identity the original engine's `Privileged` variable reports. A
/// driving binary checks this before spawning an elevated companion for
/// a per-machine package action: already-privileged, nothing to elevate.
pub fn is_privileged() -> bool {
    Uid::effective().is_root()
}

/// Returns the value of a built-in variable, or `None` if `name` does
/// not name one. `name` is matched case-insensitively.
pub fn lookup(name: &str) -> Option<Value> {
    let upper = name.to_ascii_uppercase();
    match upper.as_str() {
        "PRIVILEGED" => Some(Value::Numeric(i64::from(is_privileged()))),
        "NTPRODUCTTYPE" => Some(Value::Numeric(1)),
        "VERSIONNT" => Some(Value::String(os_version_text())),
        "WINDOWSFOLDER" | "WINDOWSVOLUME" => Some(Value::String(windows_like_root())),
        "TEMPFOLDER" => Some(Value::String(with_trailing_sep(env::temp_dir().display().to_string()))),
        "SYSTEMFOLDER" | "SYSTEM64FOLDER" => Some(Value::String(with_trailing_sep(windows_like_root()))),
        "APPDATAFOLDER" => Some(Value::String(shell_folder("APPDATAFOLDER"))),
        "LOCALAPPDATAFOLDER" => Some(Value::String(shell_folder("LOCALAPPDATAFOLDER"))),
        "PROGRAMFILESFOLDER" | "PROGRAMFILES64FOLDER" => Some(Value::String(shell_folder("PROGRAMFILESFOLDER"))),
        "PROGRAMDATAFOLDER" => Some(Value::String(shell_folder("PROGRAMDATAFOLDER"))),
        "TARGETISMACHINE64BIT" | "TARGET_IS_64_BIT" => Some(Value::Numeric(i64::from(cfg!(target_pointer_width = "64")))),
        "LANGUAGEID" => Some(Value::Numeric(1033)),
        _ => None,
    }
}

pub fn is_builtin(name: &str) -> bool {
    lookup(name).is_some()
}

fn os_version_text() -> String {
    // Stand-in for the OS major/minor/build/SP quadruple the original
    // reads from the kernel; this core treats it as opaque text.
    format!("{}-{}", env::consts::OS, env::consts::ARCH)
}

fn windows_like_root() -> String {
    home::home_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "/".to_string())
}

fn shell_folder(name: &str) -> String {
    let base = home::home_dir().unwrap_or_else(|| "/".into());
    let sub = match name {
        "APPDATAFOLDER" => ".config",
        "LOCALAPPDATAFOLDER" => ".local/share",
        "PROGRAMFILESFOLDER" => ".local/opt",
        "PROGRAMDATAFOLDER" => ".local/share/data",
        _ => "",
    };
    with_trailing_sep(base.join(sub).display().to_string())
}

fn with_trailing_sep(mut path: String) -> String {
    if !path.ends_with(std::path::MAIN_SEPARATOR) {
        path.push(std::path::MAIN_SEPARATOR);
    }
    path
}
