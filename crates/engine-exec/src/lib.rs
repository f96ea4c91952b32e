//! Run-mode state machine, message pump and plan execution (component
//! C6): takes the plan assembled by `engine_plan` and actually carries it
//! out through an `InstallerBackend`.

mod backend;
mod commandline;
mod executor;
mod exitcode;
mod message;
mod pump;
mod runmode;

pub use backend::InstallerBackend;
pub use commandline::{assemble, redact_for_log};
pub use executor::run_plan;
pub use exitcode::classify;
pub use message::{EmbeddedMessage, LogLevel};
pub use pump::{pump, shutdown_elevated_companion, PumpSummary};
pub use runmode::RunMode;
