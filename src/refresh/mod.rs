//! One flush in flight: command expansion, the subprocess and its output.
mod command;
mod refresh_session;
mod subprocess;

pub use command::*;
pub use refresh_session::*;
pub use subprocess::*;
