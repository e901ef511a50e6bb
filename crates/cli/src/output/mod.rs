//! Structured output envelope shared by every `pwb` subcommand.

mod format;
mod model;
mod result_builder;

pub use format::OutputFormat;
pub use model::*;
pub use result_builder::{ResultBuilder, print_result, render_result};
