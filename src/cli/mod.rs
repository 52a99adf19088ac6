//! Command-line interface for debate-forge.
//!
//! Provides commands for running debate sessions and inspecting configuration.

mod commands;

pub use commands::{agent_ids, parse_cli, run, run_with_cli, AgentSpec, Cli, Commands};
