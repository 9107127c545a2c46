use crate::config::toml_config::TomlConfig;
use crate::config::Settings;
use crate::utils::error::Result;
use crate::utils::validation::Validate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Parser)]
#[command(name = "fingerprint-serial")]
#[command(about = "Talk to an Arduino fingerprint sensor over a serial port")]
pub struct CliConfig {
    #[arg(long, global = true, help = "Serial port, e.g. COM3 or /dev/ttyUSB0")]
    pub port: Option<String>,

    #[arg(long, global = true)]
    pub baud_rate: Option<u32>,

    #[arg(long, short = 'c', global = true, help = "TOML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, short, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Print results as JSON")]
    pub json: bool,

    #[arg(long, global = true, help = "Use a simulated sensor instead of a real port")]
    pub simulate: bool,

    #[arg(long, global = true, help = "Upper bound for blocking worker threads")]
    pub workers: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Serialize, Subcommand)]
pub enum Commands {
    /// List serial ports
    Ports,
    /// Connect and check the sensor answers
    Ping,
    /// Number of stored templates
    Count,
    /// Enroll a finger into a slot
    Enroll {
        #[arg(long)]
        slot: i64,
    },
    /// Match a finger against stored templates
    Verify,
    /// Delete one template
    Delete {
        #[arg(long)]
        slot: i64,
    },
    /// Erase every template
    Clear {
        #[arg(long, help = "Confirm erasing all templates")]
        yes: bool,
    },
    /// Run the sensor self-test
    Test,
    /// Connect, count and self-test in one go
    Diagnose,
}

impl CliConfig {
    /// 合併設定檔與命令列參數，命令列優先
    pub fn settings(&self) -> Result<Settings> {
        let file = match &self.config {
            Some(path) => {
                tracing::debug!("Loading configuration from {}", path.display());
                TomlConfig::from_file(path)?
            }
            None => TomlConfig::default(),
        };

        let settings = Settings::from_toml(file).with_overrides(
            self.port.clone(),
            self.baud_rate,
            self.workers,
        );
        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ConfigProvider;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_enroll_subcommand() {
        let cli = CliConfig::parse_from([
            "fingerprint-serial",
            "--port",
            "COM3",
            "enroll",
            "--slot",
            "42",
        ]);
        assert_eq!(cli.port.as_deref(), Some("COM3"));
        assert_eq!(cli.baud_rate, None);
        assert!(matches!(cli.command, Commands::Enroll { slot: 42 }));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = CliConfig::parse_from(["fingerprint-serial", "verify", "--json", "--simulate"]);
        assert!(cli.json);
        assert!(cli.simulate);
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[device]\nport = \"COM1\"\nbaud_rate = 9600\n\n[runtime]\nworker_threads = 3\n")
            .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let cli = CliConfig::parse_from([
            "fingerprint-serial",
            "--config",
            path.as_str(),
            "--port",
            "COM9",
            "count",
        ]);
        let settings = cli.settings().unwrap();

        assert_eq!(settings.port(), Some("COM9"));
        assert_eq!(settings.baud_rate(), 9600);
        assert_eq!(settings.worker_threads(), 3);
    }

    #[test]
    fn test_invalid_baud_rate_rejected() {
        let cli = CliConfig::parse_from(["fingerprint-serial", "--baud-rate", "1000", "ping"]);
        assert!(cli.settings().is_err());
    }
}
