/// Severity carried on an embedded `Log` message; distinct from the
/// engine's own `log` crate levels since these cross a process boundary
/// and are interpreted by whatever BA is hosting the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Standard,
    Verbose,
    Debug,
    Error,
}

/// The embedded protocol: every message an Embedded or Elevated child
/// exchanges with its parent over the RPC transport. `Progress` and
/// `Log` flow child-to-parent during execution; `DialogResult` flows
/// parent-to-child in answer to a child-raised `Error`.
#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddedMessage {
    Log { level: LogLevel, message: String },
    Error { package_id: String, code: i32, message: String },
    Progress { progress_percentage: u32, overall_percentage: u32 },
    DialogResult { result: i32 },
    Terminate,
}
