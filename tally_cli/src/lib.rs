//! The `tally` command-line front end. Every invocation opens the channel store, runs one command and exits,
//! except `tally watch`, which keeps the timeout monitor running until interrupted.
pub mod commands;
pub mod config;
pub mod error;
pub mod formatting;
pub mod settings;
