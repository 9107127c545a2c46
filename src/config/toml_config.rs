use crate::config::timeouts::{ProtocolTimeouts, DEFAULT_BAUD_RATE};
use crate::config::Settings;
use crate::utils::error::{Result, SensorError};
use crate::utils::validation::Validate;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Upper bound for `runtime.worker_threads`.
pub const MAX_WORKER_THREADS: usize = 64;
pub const DEFAULT_WORKER_THREADS: usize = 4;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub device: DeviceSection,
    #[serde(default)]
    pub timeouts: ProtocolTimeouts,
    pub runtime: Option<RuntimeSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSection {
    pub port: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSection {
    pub worker_threads: Option<usize>,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| SensorError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${SENSOR_PORT})，未設定的保留原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| SensorError::ConfigError {
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn worker_threads(&self) -> usize {
        self.runtime
            .as_ref()
            .and_then(|r| r.worker_threads)
            .unwrap_or(DEFAULT_WORKER_THREADS)
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        Settings::from_toml(self.clone()).validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[device]
port = "/dev/ttyUSB0"
baud_rate = 115200

[timeouts]
enroll_ms = 45000
stabilization_ms = 0

[runtime]
worker_threads = 2
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(config.device.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.device.baud_rate, 115200);
        assert_eq!(config.timeouts.enroll_ms, 45000);
        assert_eq!(config.timeouts.stabilization_ms, 0);
        // 未指定的欄位使用預設值
        assert_eq!(config.timeouts.verify_ms, 15000);
        assert_eq!(config.worker_threads(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config.device.port.as_deref(), None);
        assert_eq!(config.device.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(config.timeouts, ProtocolTimeouts::default());
        assert_eq!(config.worker_threads(), DEFAULT_WORKER_THREADS);
        assert!(matches!(
            Settings::from_toml(config).require_port(),
            Err(SensorError::MissingConfigError { .. })
        ));
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("FP_TEST_SENSOR_PORT", "COM7");

        let toml_content = r#"
[device]
port = "${FP_TEST_SENSOR_PORT}"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.device.port.as_deref(), Some("COM7"));

        std::env::remove_var("FP_TEST_SENSOR_PORT");
    }

    #[test]
    fn test_config_validation() {
        let bad_baud = TomlConfig::from_toml_str("[device]\nbaud_rate = 1234\n").unwrap();
        assert!(bad_baud.validate().is_err());

        let bad_workers = TomlConfig::from_toml_str("[runtime]\nworker_threads = 0\n").unwrap();
        assert!(bad_workers.validate().is_err());

        let bad_budget = TomlConfig::from_toml_str("[timeouts]\nping_ms = 0\n").unwrap();
        assert!(bad_budget.validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[device]\nport = \"/dev/ttyACM0\"\n")
            .unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.device.port.as_deref(), Some("/dev/ttyACM0"));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let result = TomlConfig::from_toml_str("[device\nport = 1");
        assert!(matches!(
            result,
            Err(SensorError::ConfigValidationError { .. })
        ));
    }
}
