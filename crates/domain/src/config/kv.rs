use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session KV (shared store — interface + defaults only, §4.1)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
    /// Env var holding the KV credential, if any.
    #[serde(default = "d_cred_env")]
    pub credential_env: String,
    /// Per-call timeout, milliseconds. Spec range 500–2000ms.
    #[serde(default = "d_timeout_ms")]
    pub op_timeout_ms: u64,
    /// Optional TTL applied to persisted sessions, seconds. `None` = no expiry.
    #[serde(default)]
    pub session_ttl_sec: Option<u64>,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_port(),
            credential_env: d_cred_env(),
            op_timeout_ms: d_timeout_ms(),
            session_ttl_sec: None,
        }
    }
}

fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_port() -> u16 {
    6379
}
fn d_cred_env() -> String {
    "VA_KV_CREDENTIAL".into()
}
fn d_timeout_ms() -> u64 {
    800
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeout_within_spec_range() {
        let cfg = KvConfig::default();
        assert!((500..=2000).contains(&cfg.op_timeout_ms));
    }
}
