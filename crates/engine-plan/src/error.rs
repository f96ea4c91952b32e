use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("package '{}' requests an action it does not support: {}", id, reason))]
    UnsupportedAction { id: String, reason: String },

    #[snafu(display("plan would require an unsafe cross-scope dependency: {}", reason))]
    UnsafeDependency { reason: String },
}
