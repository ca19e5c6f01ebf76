use hook_runtime::{ResponseFailurePolicy, RunnerConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub hooks: HooksConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default = "default_script_file")]
    pub script_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hooks: HooksConfig::default(),
            logging: LoggingConfig::default(),
            script_file: default_script_file(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HooksConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub response_failure: ResponseFailurePolicy,
    #[serde(default = "default_true")]
    pub request_enabled: bool,
    #[serde(default = "default_true")]
    pub response_enabled: bool,
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            response_failure: ResponseFailurePolicy::default(),
            request_enabled: default_true(),
            response_enabled: default_true(),
        }
    }
}

impl HooksConfig {
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            timeout: Duration::from_millis(self.timeout_ms),
            response_failure: self.response_failure,
            request_enabled: self.request_enabled,
            response_enabled: self.response_enabled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "default_audit_path")]
    pub audit_log_path: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            audit_log_path: default_audit_path(),
        }
    }
}

fn default_script_file() -> PathBuf {
    PathBuf::from("script.yaml")
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_audit_path() -> PathBuf {
    PathBuf::from("audit.jsonl")
}

/// Load configuration from a YAML file.
///
/// If the file does not exist a default configuration is returned and a
/// warning is emitted.
pub fn load(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() {
        warn!(
            path = %path.display(),
            "configuration file not found; using defaults"
        );
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

    let config: Config = serde_yml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {e}", path.display()))?;

    if config.hooks.timeout_ms == 0 {
        anyhow::bail!("hooks.timeout_ms must be greater than 0");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("proxy-scripts-{}.yaml", uuid::Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = load(Path::new("/does/not/exist/config.yaml")).unwrap();
        assert_eq!(config.script_file, PathBuf::from("script.yaml"));
        assert_eq!(config.hooks.timeout_ms, 5000);
        assert!(config.hooks.request_enabled && config.hooks.response_enabled);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let path = write_temp(
            r#"
hooks:
  timeout_ms: 250
  response_failure: abort
  response_enabled: false
logging:
  format: pretty
"#,
        );
        let config = load(&path).unwrap();
        let runner = config.hooks.runner_config();
        assert_eq!(runner.timeout, Duration::from_millis(250));
        assert_eq!(runner.response_failure, ResponseFailurePolicy::Abort);
        assert!(runner.request_enabled);
        assert!(!runner.response_enabled);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.logging.level, "info");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let path = write_temp("hooks:\n  timeout_ms: 0\n");
        let err = load(&path).unwrap_err();
        assert!(err.to_string().contains("timeout_ms"), "{err}");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn unknown_failure_policy_is_a_parse_error() {
        let path = write_temp("hooks:\n  response_failure: retry\n");
        let err = load(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse config file"), "{err}");
        let _ = std::fs::remove_file(&path);
    }
}
