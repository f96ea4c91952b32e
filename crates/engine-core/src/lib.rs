//! Facade (component core): loads a manifest into the seven lower
//! components and exposes the detect/plan/apply lifecycle as one type.

mod engine;
mod manifest;

pub use engine::Engine;
pub use manifest::Manifest;
