//! CLI command handlers, one per file.

mod pause;
mod run;
mod submit;
mod watch;

pub use pause::run_pause;
pub use run::{run_agent, RunOverrides};
pub use submit::run_submit;
pub use watch::run_watch;
