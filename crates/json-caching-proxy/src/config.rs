//! Configuration for the caching proxy.
//!
//! The core accepts a single, already-resolved [`Config`]. Merging of
//! command-line flags and options files happens in the binary wrapper; by the
//! time a `Config` reaches [`crate::proxy::ProxyServer`], every option is
//! final and immutable.

use hyper::header::HeaderName;
use hyper::Uri;
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_port() -> u16 {
    3001
}

fn default_true() -> bool {
    true
}

fn default_command_prefix() -> String {
    "proxy".to_string()
}

fn default_header_identifier() -> String {
    "x-cache".to_string()
}

fn default_upstream_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Base URL of the remote server every non-admin request is proxied to.
    pub remote_server_url: String,

    /// Port the local proxy listener binds. Port 0 binds an ephemeral port.
    #[serde(default = "default_port")]
    pub proxy_port: u16,

    /// Query parameter names stripped during cache-key normalization.
    #[serde(default)]
    pub cache_busting_params: Vec<String>,

    /// Regex patterns matched against `"METHOD path"`; matching requests
    /// bypass the cache entirely.
    #[serde(default)]
    pub excluded_route_matchers: Vec<String>,

    /// Cache every response instead of only JSON responses.
    #[serde(default)]
    pub cache_everything: bool,

    /// Initial playback flag (serve cache hits without contacting upstream).
    #[serde(default = "default_true")]
    pub data_playback: bool,

    /// Initial recording flag (persist fresh upstream responses).
    #[serde(default = "default_true")]
    pub data_record: bool,

    /// Path prefix for the admin endpoints, without the leading slash.
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,

    /// Response header used to mark responses as cache `HIT` or `MISS`.
    #[serde(default = "default_header_identifier")]
    pub proxy_header_identifier: String,

    /// Connect/read timeout for upstream calls, in seconds.
    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,
}

impl Config {
    /// Minimal configuration proxying to `remote_server_url` with defaults
    /// for everything else.
    pub fn new(remote_server_url: impl Into<String>) -> Self {
        Self {
            remote_server_url: remote_server_url.into(),
            proxy_port: default_port(),
            cache_busting_params: Vec::new(),
            excluded_route_matchers: Vec::new(),
            cache_everything: false,
            data_playback: true,
            data_record: true,
            command_prefix: default_command_prefix(),
            proxy_header_identifier: default_header_identifier(),
            upstream_timeout_secs: default_upstream_timeout_secs(),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(&path)?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration. Runs before any traffic is served; an invalid
    /// option is a startup error, not a runtime condition.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        let uri: Uri = self
            .remote_server_url
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid remoteServerUrl '{}': {e}", self.remote_server_url))?;

        match uri.scheme_str() {
            Some("http") | Some("https") => {}
            other => anyhow::bail!(
                "remoteServerUrl must be an absolute http or https URL, got scheme {:?}",
                other
            ),
        }
        if uri.authority().is_none() {
            anyhow::bail!("remoteServerUrl '{}' has no host", self.remote_server_url);
        }

        for pattern in &self.excluded_route_matchers {
            regex::Regex::new(pattern)
                .map_err(|e| anyhow::anyhow!("invalid excluded route pattern '{pattern}': {e}"))?;
        }

        HeaderName::from_bytes(self.proxy_header_identifier.as_bytes()).map_err(|e| {
            anyhow::anyhow!(
                "proxyHeaderIdentifier '{}' is not a valid header name: {e}",
                self.proxy_header_identifier
            )
        })?;

        if self.command_prefix.is_empty() || self.command_prefix.contains('/') {
            anyhow::bail!(
                "commandPrefix '{}' must be a single non-empty path segment",
                self.command_prefix
            );
        }

        Ok(())
    }

    /// Remote base URL without a trailing slash, ready to be joined with a
    /// request's path-and-query.
    pub fn remote_base(&self) -> &str {
        self.remote_server_url.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_with_defaults() {
        let json = r#"{ "remoteServerUrl": "http://localhost:8000" }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.remote_server_url, "http://localhost:8000");
        assert_eq!(config.proxy_port, 3001);
        assert!(config.data_playback);
        assert!(config.data_record);
        assert!(!config.cache_everything);
        assert_eq!(config.command_prefix, "proxy");
        assert_eq!(config.proxy_header_identifier, "x-cache");
        assert_eq!(config.upstream_timeout_secs, 30);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            "remoteServerUrl": "https://api.example.com",
            "proxyPort": 3100,
            "cacheBustingParams": ["_", "time", "dc"],
            "excludedRouteMatchers": ["GET /api/keep-alive/.*"],
            "cacheEverything": true,
            "dataPlayback": false,
            "dataRecord": false,
            "commandPrefix": "admin",
            "proxyHeaderIdentifier": "x-proxy-cache"
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.proxy_port, 3100);
        assert_eq!(config.cache_busting_params, vec!["_", "time", "dc"]);
        assert!(config.cache_everything);
        assert!(!config.data_playback);
        assert!(!config.data_record);
        assert_eq!(config.command_prefix, "admin");
        config.validate().unwrap();
    }

    #[test]
    fn test_from_file_reads_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");
        std::fs::write(
            &path,
            r#"{ "remoteServerUrl": "http://localhost:8000", "proxyPort": 3100 }"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.proxy_port, 3100);

        std::fs::write(&path, r#"{ "remoteServerUrl": "not a url" }"#).unwrap();
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn test_validate_rejects_relative_url() {
        let config = Config::new("localhost:8000/api");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_scheme() {
        let config = Config::new("ftp://example.com");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_invalid_exclusion_pattern() {
        let mut config = Config::new("http://localhost:8000");
        config.excluded_route_matchers = vec!["GET /api/(unclosed".to_string()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("excluded route pattern"));
    }

    #[test]
    fn test_validate_rejects_invalid_header_name() {
        let mut config = Config::new("http://localhost:8000");
        config.proxy_header_identifier = "not a header".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_slash_in_prefix() {
        let mut config = Config::new("http://localhost:8000");
        config.command_prefix = "proxy/admin".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_remote_base_trims_trailing_slash() {
        let config = Config::new("http://localhost:8000/");
        assert_eq!(config.remote_base(), "http://localhost:8000");
    }
}
