//! Utility modules shared by the subcommands.

pub mod exec;
pub mod path;
pub mod worker;
