use std::time::Duration;

/// Runtime settings of the dashboard client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the dashboard backend, without a trailing slash.
    pub base_url: String,
    pub player: Option<String>,
    pub token: Option<String>,
    /// Shown in server addresses when a record carries no host of its own.
    pub hostname: String,
    pub poll_interval: Duration,
    pub release_refresh_interval: Duration,
    pub action_timeout: Duration,
    /// Consecutive snapshot failures tolerated before the operator is told.
    pub failure_threshold: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            player: None,
            token: None,
            hostname: "127.0.0.1".to_string(),
            poll_interval: Duration::from_millis(5000),
            release_refresh_interval: Duration::from_secs(15 * 60),
            action_timeout: Duration::from_secs(60),
            failure_threshold: 3,
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Session cookies the backend expects, if both halves are known.
    pub fn session_cookie(&self) -> Option<String> {
        match (&self.player, &self.token) {
            (Some(player), Some(token)) => Some(format!("player={}; token={}", player, token)),
            _ => None,
        }
    }
}
