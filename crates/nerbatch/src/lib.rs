//! # nerbatch
//!
//! Command line front end for [`nerbatch_core`]: flag parsing and logging
//! setup for the `nerbatch-predict` binary.

pub mod cli;
pub mod logging;

pub use cli::{Cli, LogLevel};
