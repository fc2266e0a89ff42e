//! Command-line driver for the slide deck build pipeline.
//!
//! Wires the `deck-coordination` orchestrator to HTTP collaborators (or
//! offline stand-ins), plan documents on disk and an interactive console.

pub mod cli;
pub mod console;
pub mod http;
pub mod offline;
pub mod plan_file;
pub mod telemetry;
