//! Declarative search runtime (component C3): executes probes loaded
//! from the manifest and writes their results into the variable store.

mod backend;
mod error;
mod runtime;
mod search;

pub use backend::SearchBackend;
pub use error::{Error, Result};
pub use runtime::{execute_all, Outcome};
pub use search::{Bitness, MsiComponentMeasure, MsiProductMeasure, RegistryRoot, Search, SearchKind};
