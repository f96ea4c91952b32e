/// The five states the executable itself runs under. The same binary
/// re-execs itself into `Elevated`/`Embedded`/`RunOnce` as needed; which
/// mode a given process is in decides whether it drives the plan itself
/// or speaks the embedded protocol to a parent that does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// First launch, before the manifest's trust/signature posture has
    /// been established. Only allowed to get as far as that check.
    Untrusted,
    Normal,
    /// A child process launched to perform per-machine actions on behalf
    /// of a per-user `Normal` parent.
    Elevated,
    /// A child process driven entirely over the embedded protocol, with
    /// no BA of its own — used for bundles chained inside another bundle.
    Embedded,
    /// Scheduled to run once more after a reboot to finish a pending
    /// action.
    RunOnce,
}

impl RunMode {
    pub fn is_child_process(self) -> bool {
        matches!(self, RunMode::Elevated | RunMode::Embedded)
    }

    pub fn can_request_elevation(self) -> bool {
        matches!(self, RunMode::Normal | RunMode::RunOnce)
    }

    /// Every mode but `Untrusted` may run the plan; `Untrusted` exists
    /// solely to get through the initial trust check before promoting
    /// itself to `Normal`.
    pub fn may_execute(self) -> bool {
        !matches!(self, RunMode::Untrusted)
    }
}
