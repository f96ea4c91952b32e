use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("invalid condition data at position {}: {}", position, reason))]
    InvalidData { position: usize, reason: String },

    #[snafu(display("condition references variable '{}': {}", name, source))]
    Variable {
        name: String,
        source: engine_vars::Error,
    },
}
