/*
[INPUT]:  YAML configuration file, environment variables for secrets
[OUTPUT]: Parsed tail configuration and the client configuration built from it
[POS]:    Configuration layer - endpoint, credentials, timings, subscriptions
[UPDATE]: When adding new configuration options
*/

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use venue_ws_adapter::{ChannelArg, ClientConfig, Credentials, PUBLIC_WS_URL, SignType};

/// Top-level configuration for the tail binary
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TailConfig {
    /// WebSocket endpoint
    #[serde(default = "default_url")]
    pub url: String,
    /// Login credentials; omit for public channels
    #[serde(default)]
    pub credentials: Option<CredentialsConfig>,
    #[serde(default)]
    pub timing: TimingConfig,
    /// Channels to subscribe, in order
    pub subscriptions: Vec<SubscriptionConfig>,
}

/// Credentials; each secret is given inline, by environment variable name, or
/// (for the key) by file path
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CredentialsConfig {
    pub api_key: Option<String>,
    pub api_key_env: Option<String>,
    pub secret: Option<String>,
    pub secret_env: Option<String>,
    /// PEM file holding an RSA private key
    pub secret_file: Option<PathBuf>,
    pub passphrase: Option<String>,
    pub passphrase_env: Option<String>,
    #[serde(default)]
    pub sign_type: SignType,
}

/// Optional timing overrides, in milliseconds
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TimingConfig {
    pub reconnect_initial_delay_ms: Option<u64>,
    pub reconnect_timeout_ms: Option<u64>,
    pub reconnect_jitter_ms: Option<u64>,
    pub health_check_interval_ms: Option<u64>,
    pub ping_interval_ms: Option<u64>,
    pub login_timeout_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    pub replay_batch_size: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubscriptionConfig {
    /// Product type (e.g., "SPOT", "USDT-FUTURES")
    pub inst_type: String,
    pub channel: String,
    /// Symbol, or "default" for account-wide channels
    #[serde(default = "default_inst_id")]
    pub inst_id: String,
    /// Account channel that needs a logged-in session
    #[serde(default)]
    pub private: bool,
}

impl SubscriptionConfig {
    pub fn arg(&self) -> ChannelArg {
        ChannelArg::new(self.inst_type.clone(), self.channel.clone(), self.inst_id.clone())
    }
}

fn default_url() -> String {
    PUBLIC_WS_URL.to_string()
}

fn default_inst_id() -> String {
    "default".to_string()
}

impl TailConfig {
    /// Load configuration from YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content).context("parse config yaml")?;
        if config.subscriptions.is_empty() {
            return Err(anyhow!("config must list at least one subscription"));
        }
        Ok(config)
    }

    /// Build and validate the client configuration
    pub fn client_config(&self) -> Result<ClientConfig> {
        let mut config = ClientConfig::public(self.url.clone());
        if let Some(credentials) = &self.credentials {
            config = config.with_credentials(credentials.resolve()?);
        }
        config = self.timing.apply(config);
        config.validate().context("invalid client configuration")?;
        Ok(config)
    }

    pub fn channel_args(&self) -> Vec<ChannelArg> {
        self.subscriptions.iter().map(SubscriptionConfig::arg).collect()
    }
}

impl CredentialsConfig {
    pub fn resolve(&self) -> Result<Credentials> {
        let api_key = resolve_field("api_key", &self.api_key, &self.api_key_env)?;
        let passphrase = resolve_field("passphrase", &self.passphrase, &self.passphrase_env)?;
        let secret = match &self.secret_file {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("read secret file {}", path.display()))?,
            None => resolve_field("secret", &self.secret, &self.secret_env)?,
        };
        Ok(Credentials::new(api_key, secret, passphrase, self.sign_type))
    }
}

fn resolve_field(name: &str, inline: &Option<String>, env: &Option<String>) -> Result<String> {
    match (inline, env) {
        (Some(value), _) => Ok(value.clone()),
        (None, Some(var)) => {
            std::env::var(var).with_context(|| format!("{name}: environment variable {var} not set"))
        }
        (None, None) => Err(anyhow!("{name} missing: set `{name}` or `{name}_env`")),
    }
}

impl TimingConfig {
    fn apply(&self, mut config: ClientConfig) -> ClientConfig {
        let ms = Duration::from_millis;
        if let Some(v) = self.reconnect_initial_delay_ms {
            config = config.with_reconnect_initial_delay(ms(v));
        }
        if let Some(v) = self.reconnect_timeout_ms {
            config = config.with_reconnect_timeout(ms(v));
        }
        if let Some(v) = self.reconnect_jitter_ms {
            config = config.with_reconnect_jitter(ms(v));
        }
        if let Some(v) = self.health_check_interval_ms {
            config = config.with_health_check_interval(ms(v));
        }
        if let Some(v) = self.ping_interval_ms {
            config = config.with_ping_interval(ms(v));
        }
        if let Some(v) = self.login_timeout_ms {
            config = config.with_login_timeout(ms(v));
        }
        if let Some(v) = self.connect_timeout_ms {
            config = config.with_connect_timeout(ms(v));
        }
        if let Some(v) = self.replay_batch_size {
            config = config.with_replay_batch_size(v);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUBLIC_YAML: &str = r#"
subscriptions:
  - inst_type: SPOT
    channel: ticker
    inst_id: BTCUSDT
  - inst_type: USDT-FUTURES
    channel: orders
"#;

    #[test]
    fn test_public_config_defaults() {
        let config = TailConfig::from_yaml(PUBLIC_YAML).unwrap();
        assert_eq!(config.url, PUBLIC_WS_URL);
        assert!(config.credentials.is_none());

        let args = config.channel_args();
        assert!(config.subscriptions.iter().all(|s| !s.private));
        assert_eq!(args[0], ChannelArg::new("SPOT", "ticker", "BTCUSDT"));
        assert_eq!(args[1], ChannelArg::account("USDT-FUTURES", "orders"));

        let client = config.client_config().unwrap();
        assert!(!client.requires_login());
        assert_eq!(client.ping_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_timing_overrides_apply() {
        let yaml = r#"
url: ws://127.0.0.1:9000
timing:
  ping_interval_ms: 500
  health_check_interval_ms: 2000
  replay_batch_size: 10
subscriptions:
  - inst_type: SPOT
    channel: books
    inst_id: ETHUSDT
"#;
        let client = TailConfig::from_yaml(yaml).unwrap().client_config().unwrap();
        assert_eq!(client.url, "ws://127.0.0.1:9000");
        assert_eq!(client.ping_interval, Duration::from_millis(500));
        assert_eq!(client.health_check_interval, Duration::from_secs(2));
        assert_eq!(client.replay_batch_size, 10);
    }

    #[test]
    fn test_inline_credentials() {
        let yaml = r#"
credentials:
  api_key: key
  secret: secret
  passphrase: pass
subscriptions:
  - inst_type: USDT-FUTURES
    channel: positions
    private: true
"#;
        let config = TailConfig::from_yaml(yaml).unwrap();
        assert!(config.subscriptions[0].private);
        let client = config.client_config().unwrap();
        let credentials = client.credentials.unwrap();
        assert_eq!(credentials.api_key, "key");
        assert_eq!(credentials.sign_type, SignType::HmacSha256);
    }

    #[test]
    fn test_missing_env_secret_is_reported() {
        let yaml = r#"
credentials:
  api_key: key
  secret_env: VENUE_WS_TAIL_TEST_UNSET_SECRET
  passphrase: pass
  sign_type: RSA
subscriptions:
  - inst_type: SPOT
    channel: ticker
"#;
        let config = TailConfig::from_yaml(yaml).unwrap();
        let err = config.client_config().unwrap_err();
        assert!(format!("{err:#}").contains("VENUE_WS_TAIL_TEST_UNSET_SECRET"));
    }

    #[test]
    fn test_empty_subscriptions_rejected() {
        assert!(TailConfig::from_yaml("subscriptions: []").is_err());
    }

    #[test]
    fn test_invalid_timing_rejected() {
        let yaml = r#"
timing:
  ping_interval_ms: 5000
  health_check_interval_ms: 1000
subscriptions:
  - inst_type: SPOT
    channel: ticker
"#;
        let config = TailConfig::from_yaml(yaml).unwrap();
        assert!(config.client_config().is_err());
    }
}
