use crate::backend::SearchBackend;
use crate::error::Error;
use crate::search::{Search, SearchKind};
use engine_vars::VariableStore;
use log::{debug, warn};

/// Outcome of a single search, surfaced to callers that want to observe
/// what happened without treating any of it as fatal.
#[derive(Debug)]
pub enum Outcome {
    Ran,
    ConditionFalse,
    ConditionInvalid,
    Failed(Error),
}

/// Runs every search in declared order. A search whose condition
/// evaluates false, or fails to parse, is skipped (logged, not fatal).
/// A search whose backend call fails is also logged and skipped; only
/// a caller explicitly checking the returned outcomes sees it. Nothing
/// here aborts the batch.
pub fn execute_all(
    searches: &[Search],
    store: &mut VariableStore,
    backend: &dyn SearchBackend,
) -> Vec<(String, Outcome)> {
    let mut results = Vec::with_capacity(searches.len());

    for search in searches {
        if let Some(condition) = &search.condition {
            match engine_condition::evaluate(condition, store) {
                Ok(true) => {}
                Ok(false) => {
                    debug!("search '{}' skipped: condition false", search.id);
                    results.push((search.id.clone(), Outcome::ConditionFalse));
                    continue;
                }
                Err(err) => {
                    warn!("search '{}' skipped: condition failed to parse: {}", search.id, err);
                    results.push((search.id.clone(), Outcome::ConditionInvalid));
                    continue;
                }
            }
        }

        match execute_one(search, store, backend) {
            Ok(()) => results.push((search.id.clone(), Outcome::Ran)),
            Err(err) => {
                warn!("search '{}' failed: {}", search.id, err);
                results.push((search.id.clone(), Outcome::Failed(err)));
            }
        }
    }

    results
}

fn execute_one(search: &Search, store: &mut VariableStore, backend: &dyn SearchBackend) -> crate::error::Result<()> {
    match &search.kind {
        SearchKind::DirectoryExists { path } => {
            let exists = backend
                .directory_exists(path)
                .map_err(|reason| Error::Backend { id: search.id.clone(), reason })?;
            write_bool(store, &search.variable, exists);
        }
        SearchKind::DirectoryPath { path } => {
            let exists = backend
                .directory_exists(path)
                .map_err(|reason| Error::Backend { id: search.id.clone(), reason })?;
            if exists {
                let _ = store.set_string(&search.variable, path.clone(), true);
            }
        }
        SearchKind::FileExists { path } => {
            let exists = backend
                .file_exists(path)
                .map_err(|reason| Error::Backend { id: search.id.clone(), reason })?;
            write_bool(store, &search.variable, exists);
        }
        SearchKind::FileVersion { path } => {
            if let Some(version) = backend
                .file_version(path)
                .map_err(|reason| Error::Backend { id: search.id.clone(), reason })?
            {
                let _ = store.set_string(&search.variable, version, true);
            }
        }
        SearchKind::FilePath { path } => {
            let exists = backend
                .file_exists(path)
                .map_err(|reason| Error::Backend { id: search.id.clone(), reason })?;
            if exists {
                let _ = store.set_string(&search.variable, path.clone(), true);
            }
        }
        SearchKind::RegistryExists { root, key, value, bitness } => {
            let exists = backend
                .registry_exists(*root, key, value.as_deref(), *bitness)
                .map_err(|reason| Error::Backend { id: search.id.clone(), reason })?;
            write_bool(store, &search.variable, exists);
        }
        SearchKind::RegistryValue { root, key, value, bitness, expand_environment } => {
            if let Some(text) = backend
                .registry_value(*root, key, value.as_deref(), *bitness, *expand_environment)
                .map_err(|reason| Error::Backend { id: search.id.clone(), reason })?
            {
                let _ = store.set_string(&search.variable, text, true);
            }
        }
        SearchKind::MsiComponent { product_code, component_id, measure } => {
            if let Some(text) = backend
                .msi_component(product_code, component_id, *measure)
                .map_err(|reason| Error::Backend { id: search.id.clone(), reason })?
            {
                let _ = store.set_string(&search.variable, text, true);
            }
        }
        SearchKind::MsiProduct { code, by_upgrade_code, measure } => {
            if let Some(text) = backend
                .msi_product(code, *by_upgrade_code, *measure)
                .map_err(|reason| Error::Backend { id: search.id.clone(), reason })?
            {
                let _ = store.set_string(&search.variable, text, true);
            }
        }
        SearchKind::ExtensionSearch { extension, payload } => {
            if let Some(text) = backend
                .extension_search(extension, payload)
                .map_err(|reason| Error::Backend { id: search.id.clone(), reason })?
            {
                let _ = store.set_string(&search.variable, text, true);
            }
        }
        SearchKind::SetVariable { value } => {
            set_literal(store, &search.variable, value.clone());
        }
    }
    Ok(())
}

fn write_bool(store: &mut VariableStore, variable: &str, value: bool) {
    let _ = store.set_numeric(variable, i64::from(value), true);
}

fn set_literal(store: &mut VariableStore, variable: &str, value: engine_vars::Value) {
    use engine_vars::Value;
    let _ = match value {
        Value::None => store.set_string(variable, "", true),
        Value::Numeric(n) => store.set_numeric(variable, n, true),
        Value::String(s) => store.set_string(variable, s, true),
        Value::Formatted(s) => store.set_formatted(variable, s, true),
        Value::Version(v) => store.set_version(variable, v, true),
    };
}
