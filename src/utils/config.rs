use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::socketio::DEFAULT_NAMESPACE;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid server url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported url scheme '{0}' (expected http, https, ws or wss)")]
    UnsupportedScheme(String),
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Reporter address, optionally with `?namespace=/ns` as in its page URL
    pub server_url: String,

    /// Namespace override; takes precedence over the URL query string
    pub namespace: Option<String>,

    /// Latency probe interval (ms)
    pub ping_interval_ms: u64,

    /// Window covered by the rolling latency average (ms)
    pub latency_window_ms: u64,

    /// Ended-test column rendered as a link to the test log
    pub log_link_column: usize,

    /// Upper bound for the reconnect backoff (ms)
    pub max_reconnect_delay_ms: u64,

    /// Limit on the websocket upgrade plus the engine.io open packet (ms)
    pub connect_timeout_ms: u64,

    /// Answer prompts with their default and don't wait on alerts
    pub non_interactive: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:9204".to_string(),
            namespace: None,
            ping_interval_ms: 1000,
            latency_window_ms: 30_000,
            log_link_column: 3,
            max_reconnect_delay_ms: 30_000,
            connect_timeout_ms: 10_000,
            non_interactive: false,
        }
    }
}

/// Where to connect: the websocket endpoint and the namespace to join.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub socket_url: Url,
    pub namespace: String,
}

impl Config {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms.max(1))
    }

    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.max_reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.max(1))
    }

    /// Number of latency samples kept for the rolling average.
    pub fn latency_capacity(&self) -> usize {
        (self.latency_window_ms / self.ping_interval_ms.max(1)).max(1) as usize
    }

    pub fn target(&self) -> Result<Target, ConfigError> {
        let raw = if self.server_url.contains("://") {
            self.server_url.clone()
        } else {
            format!("http://{}", self.server_url)
        };
        let mut url = Url::parse(&raw)?;

        let from_query = url
            .query_pairs()
            .find(|(key, _)| key == "namespace")
            .map(|(_, value)| value.into_owned());
        let namespace = normalize_namespace(self.namespace.as_deref().or(from_query.as_deref()));

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        };
        if url.scheme() != scheme {
            url.set_scheme(scheme)
                .map_err(|_| ConfigError::UnsupportedScheme(url.scheme().to_string()))?;
        }

        if !url.path().trim_end_matches('/').ends_with("socket.io") {
            url.set_path("/socket.io/");
        }
        url.set_query(Some("EIO=4&transport=websocket"));
        url.set_fragment(None);

        Ok(Target {
            socket_url: url,
            namespace,
        })
    }
}

fn normalize_namespace(raw: Option<&str>) -> String {
    let trimmed = raw.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() || trimmed == DEFAULT_NAMESPACE {
        DEFAULT_NAMESPACE.to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}
