//! Subcommand implementations, one module per command group.

pub mod control;
pub mod orchestrate;
pub mod work;
