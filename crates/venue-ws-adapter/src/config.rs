/*
[INPUT]:  Endpoint URL, optional credentials, reconnect and health-check timings
[OUTPUT]: Validated client configuration
[POS]:    Configuration layer - WebSocket client setup
[UPDATE]: When adding connection options or changing defaults
*/

use std::time::Duration;

use url::Url;

use crate::auth::Credentials;
use crate::error::{Result, WsError};

/// Public market channels endpoint
pub const PUBLIC_WS_URL: &str = "wss://ws.bitget.com/v2/ws/public";
/// Private account/order channels endpoint
pub const PRIVATE_WS_URL: &str = "wss://ws.bitget.com/v2/ws/private";

/// WebSocket client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: String,
    /// When set, every session logs in before replaying subscriptions
    pub credentials: Option<Credentials>,
    /// First reconnect delay, doubled on each consecutive failure
    pub reconnect_initial_delay: Duration,
    /// Upper bound of the reconnect delay
    pub reconnect_timeout: Duration,
    /// Random extra delay in `[0, reconnect_jitter]`
    pub reconnect_jitter: Duration,
    /// A session with no inbound frame for this long is declared dead
    pub health_check_interval: Duration,
    pub ping_interval: Duration,
    pub login_timeout: Duration,
    pub connect_timeout: Duration,
    /// Max subscription args per replayed subscribe request
    pub replay_batch_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: PUBLIC_WS_URL.to_string(),
            credentials: None,
            reconnect_initial_delay: Duration::from_secs(1),
            reconnect_timeout: Duration::from_secs(30),
            reconnect_jitter: Duration::from_millis(250),
            health_check_interval: Duration::from_secs(120),
            ping_interval: Duration::from_secs(30),
            login_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            replay_batch_size: 50,
        }
    }
}

impl ClientConfig {
    /// Configuration for the public endpoint at `url`
    pub fn public(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Configuration for the private endpoint at `url`
    pub fn private(url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            url: url.into(),
            credentials: Some(credentials),
            ..Self::default()
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_reconnect_initial_delay(mut self, delay: Duration) -> Self {
        self.reconnect_initial_delay = delay;
        self
    }

    pub fn with_reconnect_timeout(mut self, timeout: Duration) -> Self {
        self.reconnect_timeout = timeout;
        self
    }

    pub fn with_reconnect_jitter(mut self, jitter: Duration) -> Self {
        self.reconnect_jitter = jitter;
        self
    }

    pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_replay_batch_size(mut self, size: usize) -> Self {
        self.replay_batch_size = size;
        self
    }

    pub fn requires_login(&self) -> bool {
        self.credentials.is_some()
    }

    /// Reject configurations that could never produce a working session
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(WsError::Config(format!(
                "url scheme must be ws or wss, got {}",
                url.scheme()
            )));
        }

        let non_zero = [
            ("reconnect_initial_delay", self.reconnect_initial_delay),
            ("reconnect_timeout", self.reconnect_timeout),
            ("health_check_interval", self.health_check_interval),
            ("ping_interval", self.ping_interval),
            ("login_timeout", self.login_timeout),
            ("connect_timeout", self.connect_timeout),
        ];
        for (name, value) in non_zero {
            if value.is_zero() {
                return Err(WsError::Config(format!("{name} must be greater than zero")));
            }
        }

        if self.reconnect_timeout < self.reconnect_initial_delay {
            return Err(WsError::Config(
                "reconnect_timeout must not be smaller than reconnect_initial_delay".to_string(),
            ));
        }
        if self.ping_interval >= self.health_check_interval {
            return Err(WsError::Config(
                "ping_interval must be shorter than health_check_interval".to_string(),
            ));
        }
        if self.replay_batch_size == 0 {
            return Err(WsError::Config(
                "replay_batch_size must be greater than zero".to_string(),
            ));
        }

        if let Some(credentials) = &self.credentials
            && credentials.api_key.is_empty()
        {
            return Err(WsError::Config("api_key must not be empty".to_string()));
        }

        Ok(())
    }
}
