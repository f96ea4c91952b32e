use engine_model::{ExitCodeAction, ExitCodeRule};

/// Maps a process's raw exit code to the action the executor should take,
/// using the package's declared exit-code table. An exact match wins;
/// otherwise the table's wildcard row (`code: None`) applies; otherwise
/// the conventional zero-is-success default applies.
pub fn classify(code: i32, rules: &[ExitCodeRule]) -> ExitCodeAction {
    if let Some(rule) = rules.iter().find(|r| r.code == Some(code)) {
        return rule.action;
    }
    if let Some(rule) = rules.iter().find(|r| r.code.is_none()) {
        return rule.action;
    }
    if code == 0 {
        ExitCodeAction::Success
    } else {
        ExitCodeAction::Error
    }
}

pub fn requires_reboot(action: ExitCodeAction) -> bool {
    matches!(
        action,
        ExitCodeAction::ScheduleReboot
            | ExitCodeAction::ForceReboot
            | ExitCodeAction::ErrorScheduleReboot
            | ExitCodeAction::ErrorForceReboot
    )
}

pub fn is_error(action: ExitCodeAction) -> bool {
    matches!(
        action,
        ExitCodeAction::Error | ExitCodeAction::ErrorScheduleReboot | ExitCodeAction::ErrorForceReboot
    )
}
