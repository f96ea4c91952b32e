use crate::package::{CurrentState, Package};

/// How a related bundle's provider code was declared in the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationType {
    Detect,
    Upgrade,
    Addon,
    Patch,
    DependentAddon,
    DependentPatch,
    Update,
    ChainPackage,
}

/// A bundle other than this one, discovered on the machine (or declared
/// in the manifest as a relation to look for). Wraps a `Package` the same
/// way the chain does, so detection and state-folding code can treat
/// related bundles and chain packages uniformly where it matters.
#[derive(Debug, Clone)]
pub struct RelatedBundle {
    pub package: Package,
    pub relation_type: RelationType,
    pub version: Option<String>,
}

impl RelatedBundle {
    pub fn new(package: Package, relation_type: RelationType) -> Self {
        RelatedBundle { package, relation_type, version: None }
    }

    pub fn dedup_key(&self) -> (String, bool) {
        (self.package.id.clone(), self.package.per_machine)
    }

    pub fn is_present(&self) -> bool {
        matches!(self.package.current_state, CurrentState::Present | CurrentState::Superseded)
    }
}

/// Collapses related-bundle sightings from multiple declared relations
/// down to one entry per `(bundle_id, per_machine)`, keeping the entry
/// with the "most installed" state when the same bundle was found under
/// more than one relation. Mirrors the dedup the original engine performs
/// when folding related-bundle search results into the detect state.
pub fn dedup_related_bundles(bundles: Vec<RelatedBundle>) -> Vec<RelatedBundle> {
    use std::collections::HashMap;

    let mut by_key: HashMap<(String, bool), RelatedBundle> = HashMap::new();
    for bundle in bundles {
        let key = bundle.dedup_key();
        match by_key.get(&key) {
            Some(existing) if existing.package.current_state >= bundle.package.current_state => {}
            _ => {
                by_key.insert(key, bundle);
            }
        }
    }

    let mut out: Vec<RelatedBundle> = by_key.into_values().collect();
    out.sort_by(|a, b| a.package.id.cmp(&b.package.id));
    out
}
