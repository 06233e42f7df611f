use serde::{Deserialize, Serialize};
use std::fmt;

mod callcontrol;
mod dialog;
mod kv;
mod llm;
mod observability;
mod server;
mod speech;

pub use callcontrol::{CallControlConfig, RecoveryPolicy};
pub use dialog::{DialogConfig, DtmfConfig};
pub use kv::KvConfig;
pub use llm::LlmConfig;
pub use observability::ObservabilityConfig;
pub use server::{CorsConfig, RateLimitConfig, ServerConfig};
pub use speech::SpeechConfig;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub call_control: CallControlConfig,
    #[serde(default)]
    pub kv: KvConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub dialog: DialogConfig,
}

impl Config {
    /// Load from a TOML file at `path`, falling back to defaults if the
    /// file does not exist. Mirrors the gateway's config-load contract:
    /// missing file is not fatal, malformed file is.
    pub fn load(path: &std::path::Path) -> crate::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Validate cross-cutting invariants the type system can't express.
    /// Mirrors the teacher's `Config::validate()` — collect every issue
    /// rather than failing fast, so `serve` can report them all at once.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut issues = Vec::new();

        if self.dialog.dtmf.expected_sequence.is_empty() {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                message: "dialog.dtmf.expected_sequence must not be empty".into(),
            });
        }
        if self.dialog.dtmf.expected_sequence.len() > self.dialog.dtmf.max_digits {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                message: format!(
                    "dialog.dtmf.expected_sequence ({} digits) exceeds max_digits ({})",
                    self.dialog.dtmf.expected_sequence.len(),
                    self.dialog.dtmf.max_digits
                ),
            });
        }
        if self.dialog.dtmf.max_attempts == 0 {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                message: "dialog.dtmf.max_attempts must be at least 1".into(),
            });
        }
        if self.dialog.boundary_chars.is_empty() {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                message: "dialog.boundary_chars must not be empty — sentence chunking would never flush".into(),
            });
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            issues.push(ConfigError {
                severity: ConfigSeverity::Warning,
                message: format!("llm.temperature {} is outside the usual 0.0-2.0 range", self.llm.temperature),
            });
        }
        if self.kv.op_timeout_ms < 100 {
            issues.push(ConfigError {
                severity: ConfigSeverity::Warning,
                message: "kv.op_timeout_ms below 100ms will starve most networked KV backends".into(),
            });
        }
        if std::env::var(&self.llm.api_key_env).is_err() {
            issues.push(ConfigError {
                severity: ConfigSeverity::Warning,
                message: format!(
                    "env var {} is not set — LLM calls will fail until it is",
                    self.llm.api_key_env
                ),
            });
        }
        if self.server.cors.allowed_origins.iter().any(|o| o == "*")
            && self.server.cors.allowed_origins.len() > 1
        {
            issues.push(ConfigError {
                severity: ConfigSeverity::Warning,
                message: "server.cors.allowed_origins mixes \"*\" with explicit origins — \"*\" wins".into(),
            });
        }
        if let Some(rl) = &self.server.rate_limit {
            if rl.requests_per_second == 0 || rl.burst_size == 0 {
                issues.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    message: "server.rate_limit.requests_per_second and burst_size must both be > 0".into(),
                });
            }
        }

        issues
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_errors() {
        // Warnings (missing env creds) are expected in a bare test env.
        let issues = Config::default().validate();
        assert!(issues.iter().all(|i| i.severity == ConfigSeverity::Warning));
    }

    #[test]
    fn empty_expected_sequence_is_an_error() {
        let mut cfg = Config::default();
        cfg.dialog.dtmf.expected_sequence = String::new();
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error && i.message.contains("expected_sequence")));
    }

    #[test]
    fn sequence_longer_than_max_digits_is_an_error() {
        let mut cfg = Config::default();
        cfg.dialog.dtmf.max_digits = 2;
        cfg.dialog.dtmf.expected_sequence = "1234".into();
        let issues = cfg.validate();
        assert!(issues.iter().any(|i| i.severity == ConfigSeverity::Error));
    }

    #[test]
    fn empty_boundary_chars_is_an_error() {
        let mut cfg = Config::default();
        cfg.dialog.boundary_chars.clear();
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|i| i.message.contains("boundary_chars")));
    }

    #[test]
    fn zero_rate_limit_values_are_an_error() {
        let mut cfg = Config::default();
        cfg.server.rate_limit = Some(RateLimitConfig { requests_per_second: 0, burst_size: 10 });
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error && i.message.contains("rate_limit")));
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let cfg = Config::load(std::path::Path::new("/nonexistent/path/config.toml")).unwrap();
        assert_eq!(cfg.server.port, 8080);
    }

    #[test]
    fn load_malformed_toml_is_an_error() {
        let dir = std::env::temp_dir().join(format!("va-config-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.toml");
        std::fs::write(&path, "not = [valid").unwrap();
        assert!(Config::load(&path).is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
