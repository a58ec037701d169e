//! CLI command implementations.
//!
//! Each command writes its output to a caller-supplied writer so the binary
//! can send it to stdout and tests can capture it.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `analyze` | Score an inventory and report overlap clusters |
//! | `evaluate` | Run the three-role review and write a decision table |
//! | `approve` | Record approval of decision table rows |
//! | `apply` | Execute approved rows, then re-verify the inventory |
//! | `config` | Show the effective configuration |
//!
//! # Example Usage
//!
//! ```bash
//! curator analyze ~/.claude/skills --threshold 0.35
//! curator evaluate ~/.claude/skills --out table.json
//! curator approve table.json c-1a2b3c4d5e6f/email-body-writer+email-subject-writer
//! curator apply ~/.claude/skills table.json
//! ```

mod analyze;
mod apply;
mod approve;
mod config;
mod evaluate;

pub use analyze::AnalyzeCommand;
pub use apply::{ApplyCommand, ApplyOutcome};
pub use approve::ApproveCommand;
pub use config::ConfigCommand;
pub use evaluate::{EvaluateCommand, EvaluateOutcome};

use crate::{Error, Result};
use serde::Serialize;
use std::io::Write;

/// Writes `value` as pretty JSON followed by a newline.
pub(crate) fn write_json<T: Serialize>(out: &mut impl Write, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| Error::operation("serialize_output", e))?;
    writeln!(out, "{json}").map_err(output_error)
}

#[allow(clippy::needless_pass_by_value)]
pub(crate) fn output_error(e: std::io::Error) -> Error {
    Error::operation("write_output", e)
}
