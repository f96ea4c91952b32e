use engine_vars::VariableStore;

/// Expands a package's argument template against the variable store. The
/// returned `hidden` flag is set if any variable consulted during
/// expansion is marked hidden, so the caller can redact the assembled
/// command line before logging it.
pub fn assemble(template: &str, store: &VariableStore) -> (String, bool) {
    let mut hidden = false;
    let expanded = store.format(template, &mut hidden);
    (expanded, hidden)
}

pub fn redact_for_log(command_line: &str, hidden: bool) -> String {
    if hidden {
        "********".to_string()
    } else {
        command_line.to_string()
    }
}
