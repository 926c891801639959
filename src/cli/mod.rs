//! Command-line interface for diagramforge.
//!
//! Provides commands for rendering a single question and for running a
//! batch of questions from a JSON file.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli};
