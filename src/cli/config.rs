//! Config CLI command.

use super::output_error;
use crate::config::CuratorConfig;
use crate::{Error, Result};
use std::io::Write;

/// Shows the effective configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigCommand {
    /// Print the configuration as TOML.
    pub show: bool,
}

impl ConfigCommand {
    /// Writes the effective configuration, after file and environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized or written.
    pub fn run(&self, config: &CuratorConfig, out: &mut impl Write) -> Result<()> {
        if !self.show {
            writeln!(out, "Use --show to print the effective configuration.").map_err(output_error)?;
            return Ok(());
        }
        let toml = toml::to_string_pretty(config).map_err(|e| Error::operation("serialize_config", e))?;
        write!(out, "{toml}").map_err(output_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_show_round_trips_through_toml() {
        let config = CuratorConfig::default().with_threshold(0.25);
        let mut out = Vec::new();
        ConfigCommand { show: true }.run(&config, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("[analysis]"));
        let parsed = CuratorConfig::from_toml(&text).unwrap();
        assert!((parsed.analysis.threshold - 0.25).abs() < f64::EPSILON);
    }
}
