//! Command-line entry points: the `serve` supervisor command and the hidden
//! `worker` subcommand the supervisor re-execs for each pool slot.

mod commands;

pub use commands::{run, Cli, Commands, LogReloadHandle};
