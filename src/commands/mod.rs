//! Subcommand entry points. Each one resolves inputs, calls into the
//! library modules, and prints.
mod generate;
mod lighting;
mod status;

pub use generate::{run_generate, run_init};
pub use lighting::{run_blend, run_search, run_select};
pub use status::run_status;
