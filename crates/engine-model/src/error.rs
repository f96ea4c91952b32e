use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("package '{}' not found", id))]
    PackageNotFound { id: String },

    #[snafu(display("failed to evaluate detect condition for package '{}': {}", id, source))]
    Condition { id: String, source: engine_condition::Error },

    #[snafu(display("detect backend failed for package '{}': {}", id, reason))]
    Backend { id: String, reason: String },
}
