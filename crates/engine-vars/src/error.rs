use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("variable not found: {}", name))]
    NotFound { name: String },

    #[snafu(display("variable '{}' is not of the requested type", name))]
    TypeMismatch { name: String },

    #[snafu(display("invalid argument for variable '{}': {}", name, reason))]
    InvalidArg { name: String, reason: String },

    #[snafu(display("the engine is active; writes from the bootstrapper application are refused"))]
    EngineActive,

    #[snafu(display("failed to deserialize variable snapshot: {}", reason))]
    BadSnapshot { reason: String },
}
