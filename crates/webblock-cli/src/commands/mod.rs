//! CLI subcommand implementations.

pub mod check;
pub mod hook;
pub mod status;
pub mod watch;
