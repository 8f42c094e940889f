//! Shared application state for Axum handlers.
//!
//! Everything here is read-only after construction: the configuration,
//! the proxy handler and the upstream connection pool behind it. Cloning
//! is cheap and requests never share mutable state.

use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::proxy::{ProxyHandler, UpstreamClient};

/// Shared application state for Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The request pipeline
    pub proxy: ProxyHandler,
    /// Timestamp when the application started
    pub started_at: Instant,
    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Create application state around an upstream client.
    ///
    /// The base URL and status policy are taken from `config`.
    pub fn new(upstream: Arc<dyn UpstreamClient>, config: Config) -> Self {
        let proxy = ProxyHandler::new(config.upstream_base_url.clone(), upstream)
            .with_status_policy(config.upstream_status_policy);

        Self {
            proxy,
            started_at: Instant::now(),
            config: Arc::new(config),
        }
    }

    /// Seconds since the state was created.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpstreamStatusPolicy;
    use crate::proxy::ScriptedUpstream;

    #[test]
    fn test_state_takes_upstream_settings_from_config() {
        let config = Config {
            upstream_base_url: "http://upstream.test".to_string(),
            upstream_status_policy: UpstreamStatusPolicy::Strict,
            ..Config::default()
        };

        let state = AppState::new(Arc::new(ScriptedUpstream::new()), config);

        assert_eq!(state.proxy.base_url(), "http://upstream.test");
        assert_eq!(state.proxy.status_policy(), UpstreamStatusPolicy::Strict);
        assert_eq!(state.uptime_seconds(), 0);
    }
}
