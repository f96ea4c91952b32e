use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("search '{}' failed: {}", id, reason))]
    Backend { id: String, reason: String },

    #[snafu(display("search '{}' has a malformed condition: {}", id, source))]
    Condition { id: String, source: engine_condition::Error },

    #[snafu(display("extension search '{}' references unknown extension '{}'", id, extension))]
    UnknownExtension { id: String, extension: String },
}
