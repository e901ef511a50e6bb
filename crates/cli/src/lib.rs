//! `pwb`: the command-line and tool front-end for the pw-bridge daemon.

pub mod cli;
pub mod commands;
pub mod context;
pub mod error;
pub mod frontend;
pub mod logging;
pub mod output;
